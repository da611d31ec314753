//! Scan History
//!
//! A log of scan results kept as a date-bucketed tree inside a
//! [`ResourceStore`](crate::store::ResourceStore):
//!
//! ```text
//! <root>/<year>/<month 1-12>/<day>/<millis><suffix>   { time, clean, output, path, userId }
//! ```
//!
//! - **writer**: appends entries, creating buckets on demand
//! - **traversal**: newest entry, previous entry, paging (no index)
//! - **purge**: deletes buckets older than a cutoff date
//! - **calendar**: bucket naming and the stored-month convention
//! - **reserved**: store-internal child names that are never history
//! - **service**: `HistoryService`, the facade used by callers
//! - **health**: self check results
//! - **types** / **error**: data and error types
//!
//! # Example
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
//!     history
//!         .create_history_entry(&ScanResult::new("OK", true).with_path("/content/a.pdf"))
//!         .await?;
//!
//!     for entry in history.get_history(0, 20).await? {
//!         println!("{} {} {}", entry.time, entry.clean, entry.path);
//!     }
//!
//!     history.purge_history(30).await?;
//!     Ok(())
//! }
//! ```

pub mod calendar;
pub mod error;
pub mod health;
pub mod purge;
pub mod reserved;
pub mod service;
pub mod traversal;
pub mod types;
pub mod writer;

#[cfg(test)]
mod testing;

pub use calendar::{bucket_value, cutoff_date, stored_month, BucketPath, CalendarField};
pub use error::{HistoryError, HistoryResult};
pub use health::{HealthReport, HealthStatus};
pub use purge::{classify, BucketClass, RetentionPurger, DEFAULT_BATCH_SIZE};
pub use reserved::{is_reserved, logical_children, RESERVED_NAMES};
pub use service::{HistoryService, DEFAULT_ROOT};
pub use traversal::TraversalEngine;
pub use types::{HistoryEntry, PurgeReport, ScanResult};
pub use writer::{entry_name, EntryWriter, MAX_NAME_ATTEMPTS};
