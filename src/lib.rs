//! # Scanvault
//!
//! Scan-result history for antivirus scanning. Every scan result is kept as an
//! entry in a hierarchical resource store, filed under `year/month/day`
//! buckets, so that the most recent results can be paged through without an
//! index and whole days, months or years can be dropped once they age out.
//!
//! ## Modules
//!
//! - [`store`]: Hierarchical resource store abstraction and the file-backed
//!   [`TreeStore`](store::TreeStore)
//! - [`history`]: Entry writer, index-free traversal and retention purge
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scanvault::history::{HistoryService, ScanResult, DEFAULT_ROOT};
//! use scanvault::store::TreeStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = TreeStore::open("history.json", DEFAULT_ROOT)?;
//!     let history = HistoryService::new(Arc::new(store), DEFAULT_ROOT);
//!
//!     // Record a scan result
//!     history
//!         .create_history_entry(&ScanResult::new("Eicar-Test-Signature FOUND", false))
//!         .await?;
//!
//!     // Ten most recent entries
//!     for entry in history.get_history(0, 10).await? {
//!         println!("{} {} {}", entry.time, entry.clean, entry.output);
//!     }
//!
//!     // Drop everything older than 30 days
//!     let report = history.purge_history(30).await?;
//!     println!("{}", report);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod history;
pub mod store;

// Re-export top-level types for convenience
pub use history::{
    HealthReport, HealthStatus, HistoryEntry, HistoryError, HistoryResult, HistoryService,
    PurgeReport, ScanResult,
};

pub use store::{
    AttrValue, Attributes, Node, NodeType, ResourceStore, StoreError, StoreResult, StoreSession,
    TreeStore,
};

pub use config::{Config, ConfigError, HistoryConfig, LoggingConfig, StoreConfig};
