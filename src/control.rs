//! Lifecycle requests the agent sends back to its host.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::Result;

/// Host controls for the worker lifecycle.
#[async_trait]
pub trait WorkerControl: Send + Sync {
    /// Asks the host to activate this version without waiting for pages
    /// controlled by an older version to close.
    async fn skip_waiting(&self) -> Result<()>;

    /// Takes control of every open page in scope, so they route requests
    /// through this version immediately.
    async fn claim_clients(&self) -> Result<()>;
}

/// Control for the native host, where the agent is the only worker.
///
/// Both requests always succeed; they are recorded so the host can tell
/// whether the agent has taken control yet.
#[derive(Debug, Default)]
pub struct NativeControl {
    skip_waiting: AtomicBool,
    controlling: AtomicBool,
}

impl NativeControl {
    /// Creates a control with neither request made yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            skip_waiting: AtomicBool::new(false),
            controlling: AtomicBool::new(false),
        }
    }

    /// Returns true once `skip_waiting` has been requested.
    #[must_use]
    pub fn skipped_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    /// Returns true once `claim_clients` has been requested.
    #[must_use]
    pub fn is_controlling(&self) -> bool {
        self.controlling.load(Ordering::Acquire)
    }
}

#[async_trait]
impl WorkerControl for NativeControl {
    async fn skip_waiting(&self) -> Result<()> {
        self.skip_waiting.store(true, Ordering::Release);
        Ok(())
    }

    async fn claim_clients(&self) -> Result<()> {
        self.controlling.store(true, Ordering::Release);
        Ok(())
    }
}
