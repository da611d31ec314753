//! Entry Writer
//!
//! Appends one scan result to the history:
//!
//! ```text
//! now → BucketPath → ensure root/year/month/day → free name → create → attrs → commit
//! ```
//!
//! Missing buckets are created one level at a time as ordered folders; the
//! entry itself is an unstructured node. Everything goes through one session
//! and one commit, so either the whole entry appears or nothing does.

use crate::history::calendar::BucketPath;
use crate::history::error::{HistoryError, HistoryResult};
use crate::history::types::{
    HistoryEntry, ScanResult, ATTR_CLEAN, ATTR_OUTPUT, ATTR_PATH, ATTR_TIME, ATTR_USER_ID,
};
use crate::store::{
    join_path, normalize_path, AttrValue, Attributes, Node, NodeType, StoreSession,
};
use chrono::{DateTime, Local, Utc};
use uuid::Uuid;

/// How often a fresh name is tried before giving up
pub const MAX_NAME_ATTEMPTS: usize = 5;

/// Exclusive upper bound of the random name suffix
const NAME_SUFFIX_RANGE: u128 = 100_000;

/// Entry name: epoch millis followed by a suffix in `0..100000`. The suffix
/// comes from a fresh v4 UUID, so no generator state is shared between calls.
pub fn entry_name(now: &DateTime<Local>) -> String {
    let suffix = Uuid::new_v4().as_u128() % NAME_SUFFIX_RANGE;
    format!("{}{}", now.timestamp_millis(), suffix)
}

/// Creates history entries below a root path
#[derive(Clone)]
pub struct EntryWriter {
    root: String,
    name_source: fn(&DateTime<Local>) -> String,
}

impl std::fmt::Debug for EntryWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryWriter").field("root", &self.root).finish()
    }
}

impl EntryWriter {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: normalize_path(&root.into()),
            name_source: entry_name,
        }
    }

    /// Builder: replace the entry name generator
    pub fn name_source(mut self, source: fn(&DateTime<Local>) -> String) -> Self {
        self.name_source = source;
        self
    }

    /// Store `result` as a new entry in the day bucket of `now` and commit
    pub async fn create(
        &self,
        session: &mut dyn StoreSession,
        now: DateTime<Local>,
        result: &ScanResult,
    ) -> HistoryResult<HistoryEntry> {
        let bucket = BucketPath::from_date(&now);
        let day = self.ensure_bucket(session, &bucket).await?;
        let name = self.free_name(session, &day, &now).await?;

        let node = session
            .create(&day, &name, NodeType::Unstructured, Attributes::new())
            .await
            .map_err(|e| {
                let path = join_path(&day.path, &name);
                HistoryError::persistence(format!("Unable to create {}", path), e)
            })?;

        let time: DateTime<Utc> = now.with_timezone(&Utc);
        let path = result.path.clone().unwrap_or_default();
        let user_id = result.user_id.clone().unwrap_or_default();

        let mut attributes = Attributes::new();
        attributes.insert(ATTR_TIME.to_string(), AttrValue::Date(time));
        attributes.insert(ATTR_OUTPUT.to_string(), result.output.as_str().into());
        attributes.insert(ATTR_CLEAN.to_string(), result.clean.into());
        attributes.insert(ATTR_PATH.to_string(), path.as_str().into());
        attributes.insert(ATTR_USER_ID.to_string(), user_id.as_str().into());

        session
            .set_attributes(&node, attributes)
            .await
            .map_err(|e| HistoryError::persistence("Unable to store history entry", e))?;
        session
            .commit()
            .await
            .map_err(|e| HistoryError::persistence("Unable to store history entry", e))?;

        tracing::info!("Created history entry {}", node.path);

        Ok(HistoryEntry {
            time,
            output: result.output.clone(),
            clean: result.clean,
            path,
            node_path: node.path,
            user_id,
        })
    }

    /// Walk from `/` down to the day bucket, creating whatever is missing
    async fn ensure_bucket(
        &self,
        session: &mut dyn StoreSession,
        bucket: &BucketPath,
    ) -> HistoryResult<Node> {
        let mut current = session
            .get("/")
            .await?
            .ok_or_else(|| HistoryError::InvalidArgument("store has no root node".to_string()))?;

        let segments = self
            .root
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .chain(bucket.segments());

        for segment in segments {
            let path = join_path(&current.path, &segment);
            current = match session.get(&path).await? {
                Some(node) => node,
                None => {
                    tracing::debug!("Creating bucket {}", path);
                    session
                        .create(&current, &segment, NodeType::OrderedFolder, Attributes::new())
                        .await
                        .map_err(|e| {
                            HistoryError::persistence(format!("Unable to create {}", path), e)
                        })?
                }
            };
        }

        Ok(current)
    }

    async fn free_name(
        &self,
        session: &dyn StoreSession,
        day: &Node,
        now: &DateTime<Local>,
    ) -> HistoryResult<String> {
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let name = (self.name_source)(now);
            if session.get(&join_path(&day.path, &name)).await?.is_none() {
                return Ok(name);
            }
            tracing::warn!(
                "Entry name {} already taken in {} (attempt {})",
                name,
                day.path,
                attempt
            );
        }
        Err(HistoryError::NameCollision {
            bucket: day.path.clone(),
            attempts: MAX_NAME_ATTEMPTS,
        })
    }
}
