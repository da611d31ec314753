//! Test fixtures shared by the history tests

use crate::history::calendar::BucketPath;
use crate::history::types::ATTR_TIME;
use crate::store::{
    Attributes, AttrValue, Node, NodeType, ResourceStore, StoreError, StoreResult,
    StoreSession, TreeStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};

pub const ROOT: &str = "/var/avs/history";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Local noon of the given day
pub fn noon(y: i32, m: u32, d: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

/// Write an entry named `name` directly into its day bucket, bypassing the
/// writer, so tests control names and insertion order
pub async fn put_entry(store: &TreeStore, y: i32, m: u32, d: u32, name: &str) -> String {
    let mut session = store.open_session().await.unwrap();
    let bucket = BucketPath::from_date(&date(y, m, d));
    let mut current = session.get(ROOT).await.unwrap().unwrap();
    for segment in bucket.segments() {
        let path = format!("{}/{}", current.path, segment);
        current = match session.get(&path).await.unwrap() {
            Some(node) => node,
            None => session
                .create(&current, &segment, NodeType::OrderedFolder, Attributes::new())
                .await
                .unwrap(),
        };
    }
    let mut attrs = Attributes::new();
    attrs.insert(
        ATTR_TIME.to_string(),
        AttrValue::Date(Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()),
    );
    let node = session
        .create(&current, name, NodeType::Unstructured, attrs)
        .await
        .unwrap();
    session.commit().await.unwrap();
    node.path
}

/// Add a store-internal child below `parent`
pub async fn put_reserved(store: &TreeStore, parent: &str, name: &str) {
    let mut session = store.open_session().await.unwrap();
    let parent = session.get(parent).await.unwrap().unwrap();
    session
        .create(&parent, name, NodeType::Unstructured, Attributes::new())
        .await
        .unwrap();
    session.commit().await.unwrap();
}

/// Sorted list of every committed path below `ROOT`
pub async fn snapshot(store: &TreeStore) -> Vec<String> {
    let session = store.open_session().await.unwrap();
    let mut out = Vec::new();
    let mut pending = vec![session.get(ROOT).await.unwrap().unwrap()];
    while let Some(node) = pending.pop() {
        for child in session.list_children(&node).await.unwrap() {
            out.push(child.path.clone());
            pending.push(child);
        }
    }
    out.sort();
    out
}

/// Which operation a `FaultyStore` breaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Open,
    Commit,
    Delete,
}

/// A `TreeStore` with one operation made to fail
pub struct FaultyStore {
    pub inner: TreeStore,
    pub fault: Fault,
}

#[async_trait]
impl ResourceStore for FaultyStore {
    async fn open_session(&self) -> StoreResult<Box<dyn StoreSession>> {
        if self.fault == Fault::Open {
            return Err(StoreError::Unavailable("login refused".to_string()));
        }
        Ok(Box::new(FaultySession {
            inner: self.inner.open_session().await?,
            fault: self.fault,
        }))
    }
}

struct FaultySession {
    inner: Box<dyn StoreSession>,
    fault: Fault,
}

#[async_trait]
impl StoreSession for FaultySession {
    async fn get(&self, path: &str) -> StoreResult<Option<Node>> {
        self.inner.get(path).await
    }

    async fn list_children(&self, node: &Node) -> StoreResult<Vec<Node>> {
        self.inner.list_children(node).await
    }

    async fn parent(&self, node: &Node) -> StoreResult<Option<Node>> {
        self.inner.parent(node).await
    }

    async fn attributes(&self, node: &Node) -> StoreResult<Option<Attributes>> {
        self.inner.attributes(node).await
    }

    async fn create(
        &mut self,
        parent: &Node,
        name: &str,
        node_type: NodeType,
        attributes: Attributes,
    ) -> StoreResult<Node> {
        self.inner.create(parent, name, node_type, attributes).await
    }

    async fn set_attributes(&mut self, node: &Node, attributes: Attributes) -> StoreResult<()> {
        self.inner.set_attributes(node, attributes).await
    }

    async fn delete_subtree(&mut self, node: &Node, batch_size: usize) -> StoreResult<()> {
        if self.fault == Fault::Delete {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.delete_subtree(node, batch_size).await
    }

    async fn commit(&mut self) -> StoreResult<()> {
        if self.fault == Fault::Commit {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "commit rejected",
            )));
        }
        self.inner.commit().await
    }

    fn has_changes(&self) -> bool {
        self.inner.has_changes()
    }
}
