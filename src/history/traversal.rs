//! Traversal Engine
//!
//! Walks the bucket tree newest-first without any index. Order comes purely
//! from the store's insertion order of logical children:
//!
//! ```text
//! latest:    root → last child → last child → ... → first non-folder
//! previous:  preceding sibling of the entry, else climb until an ancestor
//!            has a preceding sibling, then descend "last child" from there
//! ```
//!
//! Both walks are loops over store handles. A bucket without logical children
//! behaves like a bucket that was never created: the walk moves on to the
//! next older sibling instead of stopping. Nodes that vanish mid-walk (a
//! concurrent purge) read as "nothing before this".
//!
//! Only non-folders at entry depth (`root/year/month/day/entry`) are entries.
//! Any other non-folder is a misplaced node: it is logged and stepped over
//! like an empty bucket. The walks never leave the history root.

use crate::history::calendar::CalendarField;
use crate::history::reserved::{is_reserved, last_logical_child};
use crate::history::types::{
    HistoryEntry, ATTR_CLEAN, ATTR_OUTPUT, ATTR_PATH, ATTR_TIME, ATTR_USER_ID,
};
use crate::store::{is_descendant, normalize_path, Node, StoreResult, StoreSession};
use chrono::{DateTime, Utc};

/// Path segments between the history root and an entry
const ENTRY_DEPTH: usize = CalendarField::LEVELS.len() + 1;

/// Newest-first navigation over a history root
#[derive(Debug, Clone)]
pub struct TraversalEngine {
    root: String,
}

impl TraversalEngine {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: normalize_path(&root.into()),
        }
    }

    /// The newest entry, or `None` for an empty or missing history
    pub async fn latest(&self, session: &dyn StoreSession) -> StoreResult<Option<Node>> {
        match session.get(&self.root).await? {
            Some(root) => self.rightmost_entry(session, root).await,
            None => Ok(None),
        }
    }

    /// The entry recorded immediately before `entry`, or `None` at the start
    /// of history
    pub async fn previous(
        &self,
        session: &dyn StoreSession,
        entry: &Node,
    ) -> StoreResult<Option<Node>> {
        match self.preceding(session, entry).await? {
            Some(older) => self.rightmost_entry(session, older).await,
            None => Ok(None),
        }
    }

    /// Up to `count` entries, newest first, skipping the `start` newest
    pub async fn page(
        &self,
        session: &dyn StoreSession,
        start: usize,
        count: usize,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let mut entries = Vec::new();
        if count == 0 {
            return Ok(entries);
        }

        let mut current = self.latest(session).await?;
        for _ in 0..start {
            let Some(node) = current else { break };
            current = self.previous(session, &node).await?;
        }

        while let Some(node) = current {
            entries.push(self.read_entry(session, &node).await?);
            if entries.len() == count {
                break;
            }
            current = self.previous(session, &node).await?;
        }

        Ok(entries)
    }

    /// Resolve an entry node into its attribute values
    pub async fn read_entry(
        &self,
        session: &dyn StoreSession,
        node: &Node,
    ) -> StoreResult<HistoryEntry> {
        let attributes = session.attributes(node).await?.unwrap_or_default();
        let text = |key: &str| {
            attributes
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        let time = match attributes.get(ATTR_TIME).and_then(|v| v.as_date()) {
            Some(time) => time,
            None => {
                tracing::warn!("History entry {} has no valid {}", node.path, ATTR_TIME);
                DateTime::<Utc>::UNIX_EPOCH
            }
        };

        Ok(HistoryEntry {
            time,
            output: text(ATTR_OUTPUT),
            clean: attributes
                .get(ATTR_CLEAN)
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            path: text(ATTR_PATH),
            node_path: node.path.clone(),
            user_id: text(ATTR_USER_ID),
        })
    }

    /// Descend via last logical children until an entry is reached. A folder
    /// without logical children, or a misplaced non-folder, is stepped over
    /// toward older history.
    async fn rightmost_entry(
        &self,
        session: &dyn StoreSession,
        start: Node,
    ) -> StoreResult<Option<Node>> {
        let mut current = start;
        loop {
            let next = if current.is_folder() {
                last_logical_child(session, &current).await?
            } else if self.is_entry(&current) {
                return Ok(Some(current));
            } else {
                tracing::warn!("Skipping misplaced node in history: {}", current.path);
                None
            };
            current = match next {
                Some(child) => child,
                None => match self.preceding(session, &current).await? {
                    Some(older) => older,
                    None => return Ok(None),
                },
            };
        }
    }

    /// Nearest logical node before `node` in newest-first order: its own
    /// preceding sibling, or the preceding sibling of the closest ancestor
    /// that has one. Stops at the history root.
    async fn preceding(
        &self,
        session: &dyn StoreSession,
        node: &Node,
    ) -> StoreResult<Option<Node>> {
        let mut current = node.clone();
        loop {
            if !is_descendant(&current.path, &self.root) {
                return Ok(None);
            }
            let Some(parent) = session.parent(&current).await? else {
                return Ok(None);
            };
            if let Some(sibling) = Self::preceding_sibling(session, &parent, &current).await? {
                return Ok(Some(sibling));
            }
            current = parent;
        }
    }

    /// True for a non-folder at entry depth below the root
    fn is_entry(&self, node: &Node) -> bool {
        if node.is_folder() || !is_descendant(&node.path, &self.root) {
            return false;
        }
        let depth = node
            .path
            .strip_prefix(self.root.as_str())
            .map(|rest| rest.split('/').filter(|s| !s.is_empty()).count());
        depth == Some(ENTRY_DEPTH)
    }

    /// Logical child of `parent` listed right before `node`
    async fn preceding_sibling(
        session: &dyn StoreSession,
        parent: &Node,
        node: &Node,
    ) -> StoreResult<Option<Node>> {
        let mut previous = None;
        for sibling in session.list_children(parent).await? {
            if sibling.name == node.name {
                return Ok(previous);
            }
            if !is_reserved(&sibling.name) {
                previous = Some(sibling);
            }
        }
        // `node` is gone from its parent
        Ok(None)
    }
}
