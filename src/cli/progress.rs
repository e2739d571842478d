//! Progress bar and summary reporting for the command line.

use console::style;
use indicatif::{HumanBytes, HumanDuration, ProgressBar, ProgressStyle};

use crate::{ActivateReport, AgentProgress, InstallReport, ResponseSource};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Progress receiver that drives a terminal progress bar during install.
pub struct InstallProgressBar {
    bar: ProgressBar,
}

impl InstallProgressBar {
    /// Creates an empty bar; it is sized when install starts.
    #[must_use]
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("progress template is valid")
                .progress_chars("━━╌"),
        );
        Self { bar }
    }

    /// Removes the bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for InstallProgressBar {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentProgress for InstallProgressBar {
    fn on_install_start(&self, cache_name: &str, total: usize) {
        self.bar.set_length(u64::try_from(total).unwrap_or(u64::MAX));
        self.bar.set_message(cache_name.to_string());
    }

    fn on_asset_cached(&self, path: &str, bytes: u64) {
        self.bar.println(format!(
            "  {} {path} ({})",
            style("cached").green(),
            HumanBytes(bytes)
        ));
        self.bar.inc(1);
    }

    fn on_asset_failed(&self, path: &str, error: &str) {
        self.bar
            .println(format!("  {} {path}: {error}", style("failed").red()));
        self.bar.inc(1);
    }

    fn on_cache_deleted(&self, cache_name: &str) {
        println!("  {} {cache_name}", style("deleted").yellow());
    }

    fn on_fallback(&self, url: &str, source: ResponseSource) {
        log::info!("Served {url} from {source}");
    }
}

/// Prints a summary of an install run.
pub fn print_install_summary(report: &InstallReport, total_assets: usize) {
    println!("\n{SEPARATOR}");
    println!("Install Summary ({})", style(&report.cache_name).bold());
    println!("{SEPARATOR}");
    println!(
        "  Assets cached:     {} of {total_assets}",
        report.cached_count()
    );
    println!("  Total size:        {}", HumanBytes(report.total_bytes));
    println!("  Total time:        {}", HumanDuration(report.elapsed));
    if !report.failed.is_empty() {
        println!("  Failed:");
        for (path, error) in &report.failed {
            println!("    {} {error}", style(path).red());
        }
    }
    println!("{SEPARATOR}");
}

/// Prints a summary of an activate run.
pub fn print_activate_summary(report: &ActivateReport) {
    println!("\n{SEPARATOR}");
    println!("Activate Summary");
    println!("{SEPARATOR}");
    match &report.kept {
        Some(name) => println!("  Current cache:     {}", style(name).green()),
        None => println!("  Current cache:     {}", style("not installed").yellow()),
    }
    println!("  Stale deleted:     {}", report.deleted.len());
    for (name, error) in &report.failed {
        println!("  {} {name}: {error}", style("not deleted").red());
    }
    println!(
        "  Controlling pages: {}",
        if report.claimed { "yes" } else { "no" }
    );
    println!("{SEPARATOR}");
}

/// Prints cache names, marking the current one.
pub fn print_cache_list(names: &[String], current: &str) {
    if names.is_empty() {
        println!("No caches found.");
        return;
    }
    for name in names {
        if name == current {
            println!("* {}", style(name).green());
        } else {
            println!("  {} {}", name, style("(stale)").dim());
        }
    }
}
