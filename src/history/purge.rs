//! Retention Purger
//!
//! Deletes whole date buckets that lie entirely before a cutoff date. Each
//! bucket is judged by its name alone, one calendar field at a time:
//!
//! ```text
//! year  < cutoff year   → EXPIRED    delete subtree, commit
//! year  > cutoff year   → TOO_YOUNG  leave alone
//! year == cutoff year   → AMBIGUOUS  look at its months, then days
//! day  == cutoff day    → kept (days are the finest level)
//! ```
//!
//! Every expired subtree is committed on its own. A failure aborts the pass;
//! subtrees deleted before it stay deleted and the rest is re-evaluated on the
//! next run, which makes the pass safe to repeat.

use crate::history::calendar::{bucket_value, CalendarField};
use crate::history::error::{HistoryError, HistoryResult};
use crate::history::reserved::is_reserved;
use crate::history::types::PurgeReport;
use crate::store::{normalize_path, Node, StoreSession};
use chrono::NaiveDate;

/// Nodes removed per store batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Verdict for one bucket during a purge pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketClass {
    /// Newer than the cutoff at this level
    TooYoung,
    /// Same value as the cutoff at this level
    Ambiguous,
    /// Entirely before the cutoff
    Expired,
}

/// Judge a bucket carrying `value` at `field` against `cutoff`
pub fn classify(value: i64, field: CalendarField, cutoff: &NaiveDate) -> BucketClass {
    let limit = field.value(cutoff);
    match value.cmp(&limit) {
        std::cmp::Ordering::Greater => BucketClass::TooYoung,
        std::cmp::Ordering::Equal => BucketClass::Ambiguous,
        std::cmp::Ordering::Less => BucketClass::Expired,
    }
}

/// Age-based deletion of date buckets below a history root
#[derive(Debug, Clone)]
pub struct RetentionPurger {
    root: String,
    batch_size: usize,
}

impl RetentionPurger {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: normalize_path(&root.into()),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Builder: nodes removed per store batch
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Delete every bucket dated strictly before `cutoff`
    pub async fn purge(
        &self,
        session: &mut dyn StoreSession,
        cutoff: NaiveDate,
    ) -> HistoryResult<PurgeReport> {
        let mut report = PurgeReport {
            cutoff: Some(cutoff),
            ..Default::default()
        };

        let Some(root) = session.get(&self.root).await? else {
            tracing::debug!("No history at {}, nothing to purge", self.root);
            return Ok(report);
        };

        tracing::info!("Starting purge with limit {}", cutoff);

        let mut pending = self
            .children_at(session, &root, CalendarField::Year)
            .await?;

        while let Some((node, field)) = pending.pop() {
            if is_reserved(&node.name) {
                tracing::debug!("Skipping purge of store node: {}", node.path);
                report.skipped_foreign += 1;
                continue;
            }
            let Some(value) = bucket_value(&node.name) else {
                tracing::debug!("Skipping purge of other node: {}", node.path);
                report.skipped_foreign += 1;
                continue;
            };

            match classify(value, field, &cutoff) {
                BucketClass::TooYoung => {
                    tracing::debug!("Skipping purge of too young node: {}", node.path);
                }
                BucketClass::Ambiguous => match field.finer() {
                    Some(finer) => {
                        tracing::debug!("Checking {} of node: {}", finer, node.path);
                        pending.extend(self.children_at(session, &node, finer).await?);
                    }
                    None => {
                        tracing::debug!("Keeping node at cutoff day: {}", node.path);
                    }
                },
                BucketClass::Expired => {
                    tracing::debug!("Purging node: {}", node.path);
                    self.delete(session, &node).await?;
                    report.deleted.push(node.path);
                }
            }
        }

        tracing::info!("Purge finished. {}", report);
        Ok(report)
    }

    /// Children of `node` tagged with `field`, ordered so that popping yields
    /// them in store order
    async fn children_at(
        &self,
        session: &dyn StoreSession,
        node: &Node,
        field: CalendarField,
    ) -> HistoryResult<Vec<(Node, CalendarField)>> {
        let children = session.list_children(node).await?;
        Ok(children.into_iter().rev().map(|c| (c, field)).collect())
    }

    async fn delete(&self, session: &mut dyn StoreSession, node: &Node) -> HistoryResult<()> {
        session
            .delete_subtree(node, self.batch_size)
            .await
            .map_err(|e| HistoryError::persistence(format!("Unable to delete {}", node.path), e))?;
        session
            .commit()
            .await
            .map_err(|e| HistoryError::persistence(format!("Unable to delete {}", node.path), e))
    }
}
