//! Host event dispatch.
//!
//! A host delivers one of three named lifecycle events. [`OfflineAgent::dispatch`]
//! routes each to its handler.

use std::fmt;
use std::str::FromStr;

use crate::agent::{FetchOutcome, OfflineAgent};
use crate::cache::CacheStorage;
use crate::control::WorkerControl;
use crate::error::{Error, Result};
use crate::message::Request;
use crate::network::Network;
use crate::report::{ActivateReport, InstallReport};

/// Names of the events the agent subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new version was registered.
    Install,
    /// A controlled page issued a request.
    Fetch,
    /// This version is taking over from the previous one.
    Activate,
}

impl EventKind {
    /// All event kinds, in lifecycle order.
    pub const ALL: [Self; 3] = [Self::Install, Self::Activate, Self::Fetch];

    /// The host's name for this event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Fetch => "fetch",
            Self::Activate => "activate",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown event: {s}")))
    }
}

/// An event delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Run the install handler.
    Install,
    /// Run the fetch handler for the request.
    Fetch(Request),
    /// Run the activate handler.
    Activate,
}

impl Event {
    /// Returns the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Install => EventKind::Install,
            Self::Fetch(_) => EventKind::Fetch,
            Self::Activate => EventKind::Activate,
        }
    }
}

/// What a handler produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Install finished.
    Installed(InstallReport),
    /// Fetch finished.
    Fetched(FetchOutcome),
    /// Activate finished.
    Activated(ActivateReport),
}

impl<S: CacheStorage, N: Network, W: WorkerControl> OfflineAgent<S, N, W> {
    /// Routes an event to its handler and waits for it to settle.
    ///
    /// # Errors
    ///
    /// Returns whatever error the install or activate handler returns. Fetch
    /// never fails.
    pub async fn dispatch(&self, event: Event) -> Result<EventOutcome> {
        log::debug!("Dispatching {} event", event.kind());
        match event {
            Event::Install => self.install().await.map(EventOutcome::Installed),
            Event::Fetch(request) => Ok(EventOutcome::Fetched(self.fetch(&request).await)),
            Event::Activate => self.activate().await.map(EventOutcome::Activated),
        }
    }
}
