//! Outcome summaries for the install and activate handlers.

use std::time::{Duration, Instant};

/// Result of an install run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Cache the assets were stored in.
    pub cache_name: String,
    /// Asset paths that were fetched and stored, in completion order.
    pub cached: Vec<String>,
    /// Asset paths that failed, with the error message.
    pub failed: Vec<(String, String)>,
    /// Total body bytes stored.
    pub total_bytes: u64,
    /// Time from the start of install until every asset settled.
    pub elapsed: Duration,
}

impl InstallReport {
    /// Number of assets stored.
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cached.len()
    }

    /// Returns true if every asset was stored.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Builder for accumulating an install report while assets settle.
pub struct InstallReportBuilder {
    cache_name: String,
    cached: Vec<String>,
    failed: Vec<(String, String)>,
    total_bytes: u64,
    start_time: Instant,
}

impl InstallReportBuilder {
    /// Starts a report for the given cache; the clock starts now.
    #[must_use]
    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            cached: Vec::new(),
            failed: Vec::new(),
            total_bytes: 0,
            start_time: Instant::now(),
        }
    }

    /// Records a stored asset.
    pub fn add_cached(&mut self, path: impl Into<String>, bytes: u64) {
        self.cached.push(path.into());
        self.total_bytes += bytes;
    }

    /// Records a failed asset.
    pub fn add_failed(&mut self, path: impl Into<String>, error: impl Into<String>) {
        self.failed.push((path.into(), error.into()));
    }

    /// Builds the final report.
    #[must_use]
    pub fn build(self) -> InstallReport {
        InstallReport {
            cache_name: self.cache_name,
            cached: self.cached,
            failed: self.failed,
            total_bytes: self.total_bytes,
            elapsed: self.start_time.elapsed(),
        }
    }
}

/// Result of an activate run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    /// The current cache, if it existed at activation.
    pub kept: Option<String>,
    /// Stale caches that were deleted.
    pub deleted: Vec<String>,
    /// Stale caches whose deletion failed, with the error message.
    pub failed: Vec<(String, String)>,
    /// Whether control of open pages was taken.
    pub claimed: bool,
}

impl ActivateReport {
    /// Returns true if no stale cache was left behind.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
