//! History Service
//!
//! The entry point used by the scan pipeline, reporting surfaces, the
//! maintenance trigger and health checks. Every call opens its own store
//! session and drops it on return, whatever the outcome.

use crate::history::calendar::cutoff_date;
use crate::history::error::{HistoryError, HistoryResult};
use crate::history::health::HealthReport;
use crate::history::purge::RetentionPurger;
use crate::history::traversal::TraversalEngine;
use crate::history::types::{HistoryEntry, PurgeReport, ScanResult};
use crate::history::writer::EntryWriter;
use crate::store::{
    is_descendant, normalize_path, validate_path, ResourceStore, StoreSession,
};
use chrono::{DateTime, Local, NaiveDate};
use std::sync::Arc;

/// Default location of the history in the store
pub const DEFAULT_ROOT: &str = "/var/avs/history";

/// Reads, writes and purges the scan history
pub struct HistoryService {
    store: Arc<dyn ResourceStore>,
    root: String,
    writer: EntryWriter,
    traversal: TraversalEngine,
    purger: RetentionPurger,
}

impl HistoryService {
    /// Create a service for the history below `root`
    pub fn new(store: Arc<dyn ResourceStore>, root: impl Into<String>) -> Self {
        let root = normalize_path(&root.into());
        Self {
            store,
            writer: EntryWriter::new(root.clone()),
            traversal: TraversalEngine::new(root.clone()),
            purger: RetentionPurger::new(root.clone()),
            root,
        }
    }

    /// Builder: nodes removed per store batch while purging
    pub fn purge_batch_size(mut self, batch_size: usize) -> Self {
        self.purger = self.purger.batch_size(batch_size);
        self
    }

    /// Builder: replace the entry writer (e.g. a custom name source)
    pub fn writer(mut self, writer: EntryWriter) -> Self {
        self.writer = writer;
        self
    }

    /// History root path
    pub fn root(&self) -> &str {
        &self.root
    }

    async fn open_session(&self) -> HistoryResult<Box<dyn StoreSession>> {
        self.store
            .open_session()
            .await
            .map_err(HistoryError::StoreUnavailable)
    }

    /// Record a completed scan, bucketed by the current local date
    pub async fn create_history_entry(&self, result: &ScanResult) -> HistoryResult<HistoryEntry> {
        self.create_history_entry_at(Local::now(), result).await
    }

    /// Record a completed scan at `now`
    pub async fn create_history_entry_at(
        &self,
        now: DateTime<Local>,
        result: &ScanResult,
    ) -> HistoryResult<HistoryEntry> {
        let mut session = self.open_session().await?;
        self.writer.create(session.as_mut(), now, result).await
    }

    /// Up to `count` entries, newest first, after skipping the `start` newest.
    /// An empty history yields an empty list.
    pub async fn get_history(&self, start: usize, count: usize) -> HistoryResult<Vec<HistoryEntry>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let session = self.open_session().await?;
        Ok(self.traversal.page(session.as_ref(), start, count).await?)
    }

    /// The newest entry
    pub async fn latest(&self) -> HistoryResult<Option<HistoryEntry>> {
        let session = self.open_session().await?;
        match self.traversal.latest(session.as_ref()).await? {
            Some(node) => Ok(Some(self.traversal.read_entry(session.as_ref(), &node).await?)),
            None => Ok(None),
        }
    }

    /// The entry recorded before the one stored at `node_path`. `None` at the
    /// start of history or if `node_path` no longer exists. Paths outside the
    /// history root are rejected.
    pub async fn previous(&self, node_path: &str) -> HistoryResult<Option<HistoryEntry>> {
        validate_path(node_path).map_err(|e| HistoryError::InvalidArgument(e.to_string()))?;
        if !is_descendant(node_path, &self.root) {
            return Err(HistoryError::InvalidArgument(format!(
                "{} is not below {}",
                node_path, self.root
            )));
        }
        let session = self.open_session().await?;
        let Some(node) = session.get(node_path).await? else {
            return Ok(None);
        };
        match self.traversal.previous(session.as_ref(), &node).await? {
            Some(prev) => Ok(Some(self.traversal.read_entry(session.as_ref(), &prev).await?)),
            None => Ok(None),
        }
    }

    /// Keep only the last `days_to_keep` days, counted from today
    pub async fn purge_history(&self, days_to_keep: u32) -> HistoryResult<PurgeReport> {
        self.purge_history_at(Local::now().date_naive(), days_to_keep)
            .await
    }

    /// Keep only the last `days_to_keep` days, counted from `today`
    pub async fn purge_history_at(
        &self,
        today: NaiveDate,
        days_to_keep: u32,
    ) -> HistoryResult<PurgeReport> {
        let cutoff = cutoff_date(today, days_to_keep).ok_or_else(|| {
            HistoryError::InvalidArgument(format!(
                "{} days before {} is out of range",
                days_to_keep, today
            ))
        })?;
        let mut session = self.open_session().await?;
        self.purger.purge(session.as_mut(), cutoff).await
    }

    /// Check that a session can be opened and the history root is reachable
    pub async fn self_check(&self) -> HealthReport {
        let mut report = HealthReport::new();

        let session = match self.store.open_session().await {
            Ok(session) => {
                report.info("Store session ok");
                session
            }
            Err(e) => {
                report.critical(format!("Unable to open store session: {}", e));
                return report;
            }
        };

        match session.get(&self.root).await {
            Ok(Some(_)) => report.info(format!("{} is accessible", self.root)),
            Ok(None) => report.critical(format!(
                "{} does not exist or is not accessible.",
                self.root
            )),
            Err(e) => report.critical(format!("Unable to read {}: {}", self.root, e)),
        }

        if !report.is_ok() {
            tracing::warn!("History self check failed: {:?}", report.messages);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::health::HealthStatus;
    use crate::history::testing::{date, noon, put_reserved, snapshot, Fault, FaultyStore, ROOT};
    use crate::store::TreeStore;

    fn service(store: &TreeStore) -> HistoryService {
        HistoryService::new(Arc::new(store.clone()), ROOT)
    }

    async fn record(service: &HistoryService, y: i32, m: u32, d: u32, output: &str) -> HistoryEntry {
        service
            .create_history_entry_at(noon(y, m, d), &ScanResult::new(output, true))
            .await
            .unwrap()
    }

    fn outputs(entries: &[HistoryEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.output.as_str()).collect()
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let store = TreeStore::new(ROOT).unwrap();
        let service = service(&store);
        record(&service, 2024, 1, 5, "0105").await;
        record(&service, 2024, 1, 6, "0106").await;
        record(&service, 2024, 2, 1, "0201").await;

        let page = service.get_history(0, 3).await.unwrap();
        assert_eq!(outputs(&page), vec!["0201", "0106", "0105"]);
        assert!(page[0].node_path.starts_with("/var/avs/history/2024/2/1/"));

        let page = service.get_history(1, 5).await.unwrap();
        assert_eq!(outputs(&page), vec!["0106", "0105"]);
    }

    #[tokio::test]
    async fn test_entries_on_one_day_keep_creation_order() {
        let store = TreeStore::new(ROOT).unwrap();
        let service = service(&store);
        for i in 0..20 {
            record(&service, 2024, 7, 1, &i.to_string()).await;
        }

        let page = service.get_history(0, 20).await.unwrap();
        let expected: Vec<String> = (0..20).rev().map(|i| i.to_string()).collect();
        assert_eq!(outputs(&page), expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_latest_and_previous() {
        let store = TreeStore::new(ROOT).unwrap();
        let service = service(&store);
        assert!(service.latest().await.unwrap().is_none());

        let first = record(&service, 2024, 1, 5, "first").await;
        let second = record(&service, 2024, 2, 1, "second").await;

        let latest = service.latest().await.unwrap().unwrap();
        assert_eq!(latest, second);

        let prev = service.previous(&second.node_path).await.unwrap().unwrap();
        assert_eq!(prev, first);
        assert!(service.previous(&first.node_path).await.unwrap().is_none());
        assert!(service
            .previous("/var/avs/history/1999/1/1/gone")
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            service.previous("relative/path").await,
            Err(HistoryError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_previous_rejects_paths_outside_root() {
        let store = TreeStore::new(ROOT).unwrap();
        let service = service(&store);
        record(&service, 2024, 1, 5, "inside").await;

        // Sibling of the root, listed after it
        put_reserved(&store, "/var/avs", "zzz").await;

        for path in ["/var/avs/zzz", "/var/avs", ROOT, "/var/avs/historyx"] {
            assert!(
                matches!(
                    service.previous(path).await,
                    Err(HistoryError::InvalidArgument(_))
                ),
                "{}",
                path
            );
        }
    }

    #[tokio::test]
    async fn test_custom_writer_name_collision() {
        fn fixed_name(_: &DateTime<Local>) -> String {
            "1700000000000".to_string()
        }

        let store = TreeStore::new(ROOT).unwrap();
        let service = service(&store).writer(EntryWriter::new(ROOT).name_source(fixed_name));

        let first = record(&service, 2024, 1, 5, "first").await;
        assert_eq!(first.node_path, "/var/avs/history/2024/1/5/1700000000000");

        let err = service
            .create_history_entry_at(noon(2024, 1, 5), &ScanResult::new("second", false))
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::NameCollision { .. }));
        assert_eq!(service.get_history(0, 10).await.unwrap(), vec![first]);
    }

    #[tokio::test]
    async fn test_empty_history_is_not_an_error() {
        let service = HistoryService::new(Arc::new(TreeStore::empty()), ROOT);
        assert!(service.get_history(0, 10).await.unwrap().is_empty());
        assert!(service.get_history(5, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_count_does_not_open_a_session() {
        let service = HistoryService::new(
            Arc::new(FaultyStore {
                inner: TreeStore::new(ROOT).unwrap(),
                fault: Fault::Open,
            }),
            ROOT,
        );
        assert!(service.get_history(3, 0).await.unwrap().is_empty());
        assert!(matches!(
            service.get_history(0, 1).await,
            Err(HistoryError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_old_year_empties_history() {
        let store = TreeStore::new(ROOT).unwrap();
        let service = service(&store);
        record(&service, 2023, 3, 1, "a").await;
        record(&service, 2023, 11, 30, "b").await;

        let report = service.purge_history_at(date(2024, 5, 1), 30).await.unwrap();
        assert_eq!(report.cutoff, Some(date(2024, 4, 1)));
        assert_eq!(report.deleted, vec!["/var/avs/history/2023".to_string()]);
        assert!(service.get_history(0, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purge_keeps_retention_window() {
        let store = TreeStore::new(ROOT).unwrap();
        let service = service(&store);
        record(&service, 2024, 1, 1, "old").await;
        record(&service, 2024, 1, 10, "edge").await;
        record(&service, 2024, 1, 11, "new").await;

        service.purge_history_at(date(2024, 1, 20), 10).await.unwrap();
        let page = service.get_history(0, 10).await.unwrap();
        assert_eq!(outputs(&page), vec!["new", "edge"]);

        // Running again changes nothing
        let before = snapshot(&store).await;
        service.purge_history_at(date(2024, 1, 20), 10).await.unwrap();
        assert_eq!(snapshot(&store).await, before);
    }

    #[tokio::test]
    async fn test_reserved_nodes_do_not_change_results() {
        let store = TreeStore::new(ROOT).unwrap();
        let service = service(&store);
        record(&service, 2023, 12, 31, "a").await;
        record(&service, 2024, 1, 1, "b").await;
        record(&service, 2024, 1, 2, "c").await;

        put_reserved(&store, ROOT, "rep:policy").await;
        put_reserved(&store, "/var/avs/history/2024/1", "oak:index").await;
        put_reserved(&store, "/var/avs/history/2024/1/2", "rep:policy").await;

        let page = service.get_history(0, 10).await.unwrap();
        assert_eq!(outputs(&page), vec!["c", "b", "a"]);

        service.purge_history_at(date(2024, 1, 2), 0).await.unwrap();
        let page = service.get_history(0, 10).await.unwrap();
        assert_eq!(outputs(&page), vec!["c"]);
        assert!(snapshot(&store)
            .await
            .contains(&"/var/avs/history/2024/1/oak:index".to_string()));
    }

    #[tokio::test]
    async fn test_create_surfaces_store_errors() {
        let unavailable = HistoryService::new(
            Arc::new(FaultyStore {
                inner: TreeStore::new(ROOT).unwrap(),
                fault: Fault::Open,
            }),
            ROOT,
        );
        let err = unavailable
            .create_history_entry(&ScanResult::new("", true))
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::StoreUnavailable(_)));

        let failing = HistoryService::new(
            Arc::new(FaultyStore {
                inner: TreeStore::new(ROOT).unwrap(),
                fault: Fault::Commit,
            }),
            ROOT,
        );
        let err = failing
            .create_history_entry(&ScanResult::new("", true))
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::PersistenceFailure { .. }));
    }

    #[tokio::test]
    async fn test_self_check() {
        let ok = service(&TreeStore::new(ROOT).unwrap()).self_check().await;
        assert_eq!(ok.status, HealthStatus::Ok);

        let missing = service(&TreeStore::empty()).self_check().await;
        assert_eq!(missing.status, HealthStatus::Critical);
        assert!(missing
            .messages
            .contains(&"/var/avs/history does not exist or is not accessible.".to_string()));

        let unavailable = HistoryService::new(
            Arc::new(FaultyStore {
                inner: TreeStore::new(ROOT).unwrap(),
                fault: Fault::Open,
            }),
            ROOT,
        )
        .self_check()
        .await;
        assert_eq!(unavailable.status, HealthStatus::Critical);
    }
}
