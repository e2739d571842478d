//! Command-line mode for flashai-offline.

mod progress;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use console::style;

use crate::{
    AgentProgress, AppConfig, CacheStorage, DiskCacheStorage, Error, HttpNetwork, NativeControl,
    OfflineAgent, Request, Result,
};

use progress::{InstallProgressBar, print_activate_summary, print_cache_list, print_install_summary};

/// Agent type used by the command line: disk caches, real network.
type CliAgent = OfflineAgent<DiskCacheStorage, HttpNetwork, NativeControl>;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the install handler.
    Install,
    /// Run the activate handler.
    Activate,
    /// Run the fetch handler for one URL or path.
    Fetch(String),
    /// List cache names.
    Keys,
    /// Install, activate, then run the offline proxy.
    Serve,
    /// Show usage.
    Help,
}

/// Parsed command-line arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    /// Command to run.
    pub command: Command,
    /// Configuration file.
    pub config: Option<PathBuf>,
    /// Overrides `storage.cache_dir`.
    pub cache_dir: Option<PathBuf>,
    /// Overrides `agent.origin`.
    pub origin: Option<String>,
    /// Enables debug logging.
    pub verbose: bool,
}

/// Prints usage to stderr.
pub fn print_usage() {
    eprintln!("Usage: flashai-offline [OPTIONS] <COMMAND>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  install             Cache the configured assets under the current version");
    eprintln!("  activate            Delete stale caches and take control");
    eprintln!("  fetch <URL|PATH>    Fetch one page, falling back to the caches when offline");
    eprintln!("  keys                List cache names");
    eprintln!("  serve               Install, activate, then run the offline proxy");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <FILE>   Configuration file (TOML)");
    eprintln!("  --cache-dir <DIR>     Cache directory");
    eprintln!("  --origin <URL>        Origin the assets are fetched from");
    eprintln!("  -v, --verbose         Debug logging");
    eprintln!("  -h, --help            Show this help");
}

/// Takes the value following an option.
fn option_value(args: &[String], i: &mut usize, flag: &str) -> Result<String> {
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| Error::Config(format!("{flag} requires a value")))
}

/// Parses arguments (without the program name).
///
/// # Errors
///
/// Returns [`Error::Config`] for unknown options or commands, missing option
/// values, or a missing `fetch` target.
pub fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut config = None;
    let mut cache_dir = None;
    let mut origin = None;
    let mut verbose = false;
    let mut help = false;
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => config = Some(PathBuf::from(option_value(args, &mut i, "--config")?)),
            "--cache-dir" => {
                cache_dir = Some(PathBuf::from(option_value(args, &mut i, "--cache-dir")?));
            }
            "--origin" => origin = Some(option_value(args, &mut i, "--origin")?),
            "-v" | "--verbose" => verbose = true,
            "-h" | "--help" => help = true,
            flag if flag.starts_with('-') => {
                return Err(Error::Config(format!("unknown option: {flag}")));
            }
            value => positional.push(value.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let command = if help {
        Command::Help
    } else {
        match positional.next().as_deref() {
            None => Command::Help,
            Some("install") => Command::Install,
            Some("activate") => Command::Activate,
            Some("keys") => Command::Keys,
            Some("serve") => Command::Serve,
            Some("fetch") => Command::Fetch(
                positional
                    .next()
                    .ok_or_else(|| Error::Config("fetch requires a URL or path".to_string()))?,
            ),
            Some(other) => return Err(Error::Config(format!("unknown command: {other}"))),
        }
    };

    Ok(CliArgs {
        command,
        config,
        cache_dir,
        origin,
        verbose,
    })
}

/// Loads the configuration and applies command-line overrides.
fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    if let Some(dir) = &args.cache_dir {
        config.storage.cache_dir.clone_from(dir);
    }
    if let Some(origin) = &args.origin {
        config.agent.origin.clone_from(origin);
    }
    config.agent.validate()?;
    Ok(config)
}

fn build_agent(config: &AppConfig, progress: Arc<dyn AgentProgress>) -> Result<CliAgent> {
    log::debug!("Cache directory: {}", config.storage.cache_dir.display());
    Ok(OfflineAgent::new(
        config.agent.clone(),
        DiskCacheStorage::new(&config.storage.cache_dir),
        HttpNetwork::new()?,
        NativeControl::new(),
    )
    .with_progress(progress))
}

/// Runs install with a progress bar and prints the summary.
async fn install(agent: &CliAgent, bar: &InstallProgressBar) -> Result<()> {
    println!(
        "Caching {} assets from {}",
        agent.config().assets.len(),
        agent.config().origin
    );
    let report = agent.install().await;
    bar.finish();
    let report = report?;
    print_install_summary(&report, agent.config().assets.len());
    Ok(())
}

async fn activate(agent: &CliAgent) -> Result<()> {
    let report = agent.activate().await?;
    print_activate_summary(&report);
    Ok(())
}

/// Runs the fetch handler for one target and writes the body to stdout.
async fn fetch(agent: &CliAgent, target: &str) -> Result<()> {
    let url = agent.config().resolve(target)?;
    let outcome = agent.fetch(&Request::get(url.as_str())).await;
    let (Some(source), Some(response)) = (outcome.source(), outcome.into_response()) else {
        return Err(Error::Network(format!(
            "{url}: offline and no cached copy is available"
        )));
    };
    log::debug!("{url} answered from {source}");
    eprintln!(
        "{} {} {}",
        style(source).cyan(),
        response.status,
        style(&url).dim()
    );
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&response.body)?;
    stdout.flush()?;
    Ok(())
}

async fn keys(agent: &CliAgent) -> Result<()> {
    let names = agent.caches().keys().await?;
    print_cache_list(&names, &agent.config().cache_name);
    Ok(())
}

#[cfg(feature = "server")]
async fn serve(agent: CliAgent, config: &AppConfig, bar: &InstallProgressBar) -> Result<()> {
    use tokio_util::sync::CancellationToken;

    install(&agent, bar).await?;
    activate(&agent).await?;

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    crate::server::serve(Arc::new(agent), &config.server, token).await
}

#[cfg(not(feature = "server"))]
async fn serve(_agent: CliAgent, _config: &AppConfig, _bar: &InstallProgressBar) -> Result<()> {
    Err(Error::Config(
        "serve requires the 'server' feature".to_string(),
    ))
}

/// Resolves on SIGINT, or SIGTERM on Unix.
#[cfg(feature = "server")]
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => log::info!("Received SIGINT"),
                    _ = sigterm.recv() => log::info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {e}");
                tokio::signal::ctrl_c().await.ok();
                log::info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        log::info!("Received SIGINT");
    }
}

/// Runs the command-line mode.
///
/// # Errors
///
/// Returns an error if configuration loading fails or the command fails.
pub async fn run(args: CliArgs) -> Result<()> {
    if args.command == Command::Help {
        print_usage();
        return Ok(());
    }

    let config = load_config(&args)?;
    let bar = Arc::new(InstallProgressBar::new());
    let agent = build_agent(&config, bar.clone())?;

    match args.command {
        Command::Install => install(&agent, &bar).await,
        Command::Activate => activate(&agent).await,
        Command::Fetch(target) => fetch(&agent, &target).await,
        Command::Keys => keys(&agent).await,
        Command::Serve => serve(agent, &config, &bar).await,
        Command::Help => Ok(()),
    }
}
