//! flashai-offline - Offline support for the FlashAI flashcard site.
//!
//! The agent answers three lifecycle events. `install` stores a fixed set of
//! pages under a versioned cache, `activate` deletes every other cache, and
//! `fetch` prefers the network and falls back to cached copies and finally
//! the offline page.
//!
//! # Example
//!
//! ```no_run
//! use flashai_offline::{
//!     AgentConfig, HttpNetwork, MemoryCacheStorage, NativeControl, OfflineAgent, Request,
//! };
//!
//! # async fn example() -> flashai_offline::Result<()> {
//! let config = AgentConfig::default().with_origin("http://127.0.0.1:8000");
//! let agent = OfflineAgent::new(
//!     config,
//!     MemoryCacheStorage::new(),
//!     HttpNetwork::new()?,
//!     NativeControl::new(),
//! );
//!
//! let installed = agent.install().await?;
//! println!("Cached {} pages", installed.cached_count());
//! agent.activate().await?;
//!
//! let outcome = agent.fetch(&Request::get("http://127.0.0.1:8000/flashcards/")).await;
//! if let Some(response) = outcome.into_response() {
//!     println!("{} bytes", response.body.len());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod agent;
pub mod cache;
pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod message;
pub mod network;
pub mod report;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "cli")]
pub mod cli;

pub use agent::{AgentProgress, FetchOutcome, NoProgress, OfflineAgent, ResponseSource};
pub use cache::{CacheStorage, DiskCacheStorage, MemoryCacheStorage};
pub use config::{AgentConfig, AppConfig, ServerConfig, StorageConfig, cache_name_for};
pub use control::{NativeControl, WorkerControl};
pub use error::{Error, Result};
pub use events::{Event, EventKind, EventOutcome};
pub use message::{Request, Response};
pub use network::{HttpNetwork, Network};
pub use report::{ActivateReport, InstallReport, InstallReportBuilder};
