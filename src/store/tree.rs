//! Tree Store
//!
//! An in-memory hierarchical store with ordered children, optionally backed by
//! a JSON snapshot file that is rewritten on every successful commit.
//!
//! Sessions copy the shared tree on their first mutation and record every
//! mutation in a log. Commit replays the log onto a fresh copy of the shared
//! tree under the write lock, persists the result (if file-backed) and only
//! then swaps it in, so a failed commit leaves the shared tree untouched.
//!
//! Re-creating an ordered folder that already exists is a no-op at replay
//! time. Two writers that lazily create the same day bucket therefore both
//! commit; two writers creating the same leaf name do not.

use crate::store::error::{StoreError, StoreResult};
use crate::store::{
    join_path, parent_path, validate_name, validate_path, Attributes, Node, NodeType,
    ResourceStore, StoreSession,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A node as kept in the tree
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredNode {
    node_type: NodeType,
    #[serde(default)]
    attributes: Attributes,
    /// Child names in insertion order
    #[serde(default)]
    children: Vec<String>,
}

impl StoredNode {
    fn new(node_type: NodeType, attributes: Attributes) -> Self {
        Self {
            node_type,
            attributes,
            children: Vec::new(),
        }
    }
}

/// The whole tree, keyed by absolute path
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tree {
    nodes: BTreeMap<String, StoredNode>,
}

/// A buffered mutation
#[derive(Debug, Clone)]
enum Mutation {
    Create {
        parent: String,
        name: String,
        node_type: NodeType,
        attributes: Attributes,
    },
    SetAttributes {
        path: String,
        attributes: Attributes,
    },
    Remove {
        paths: Vec<String>,
    },
}

impl Tree {
    fn with_root() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            StoredNode::new(NodeType::OrderedFolder, Attributes::new()),
        );
        Self { nodes }
    }

    fn node(&self, path: &str) -> Option<Node> {
        self.nodes
            .get(path)
            .map(|stored| Node::new(path, stored.node_type))
    }

    fn children(&self, path: &str) -> Vec<Node> {
        let Some(stored) = self.nodes.get(path) else {
            return Vec::new();
        };
        stored
            .children
            .iter()
            .filter_map(|name| self.node(&join_path(path, name)))
            .collect()
    }

    /// Create every missing folder on the way to `path`. Returns true if
    /// anything was created.
    fn ensure_folders(&mut self, path: &str) -> StoreResult<bool> {
        validate_path(path)?;
        let mut created = false;
        let mut current = "/".to_string();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let child = join_path(&current, segment);
            if !self.nodes.contains_key(&child) {
                self.apply(&Mutation::Create {
                    parent: current.clone(),
                    name: segment.to_string(),
                    node_type: NodeType::OrderedFolder,
                    attributes: Attributes::new(),
                })?;
                created = true;
            }
            current = child;
        }
        Ok(created)
    }

    fn apply(&mut self, mutation: &Mutation) -> StoreResult<()> {
        match mutation {
            Mutation::Create {
                parent,
                name,
                node_type,
                attributes,
            } => {
                let path = join_path(parent, name);
                if let Some(existing) = self.nodes.get(&path) {
                    if existing.node_type == NodeType::OrderedFolder
                        && *node_type == NodeType::OrderedFolder
                    {
                        return Ok(());
                    }
                    return Err(StoreError::AlreadyExists(path));
                }
                let parent_node = self
                    .nodes
                    .get_mut(parent)
                    .ok_or_else(|| StoreError::NotFound(parent.clone()))?;
                parent_node.children.push(name.clone());
                self.nodes
                    .insert(path, StoredNode::new(*node_type, attributes.clone()));
                Ok(())
            }
            Mutation::SetAttributes { path, attributes } => {
                let node = self
                    .nodes
                    .get_mut(path)
                    .ok_or_else(|| StoreError::NotFound(path.clone()))?;
                node.attributes
                    .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(())
            }
            Mutation::Remove { paths } => {
                for path in paths {
                    self.remove_subtree(path);
                }
                Ok(())
            }
        }
    }

    /// Remove `path` and whatever is below it right now. Missing paths are
    /// ignored.
    fn remove_subtree(&mut self, path: &str) {
        if path == "/" || !self.nodes.contains_key(path) {
            return;
        }
        if let Some(parent) = parent_path(path) {
            let name = crate::store::node_name(path);
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.retain(|c| c != name);
            }
        }
        let mut pending = vec![path.to_string()];
        while let Some(current) = pending.pop() {
            if let Some(stored) = self.nodes.remove(&current) {
                pending.extend(stored.children.iter().map(|c| join_path(&current, c)));
            }
        }
    }

    /// Paths of the subtree below and including `path`, children before parents
    fn post_order(&self, path: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![(path.to_string(), false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                out.push(current);
                continue;
            }
            let Some(stored) = self.nodes.get(&current) else {
                continue;
            };
            let children: Vec<String> = stored
                .children
                .iter()
                .map(|c| join_path(&current, c))
                .collect();
            stack.push((current, true));
            stack.extend(children.into_iter().map(|c| (c, false)));
        }
        out
    }

    fn load(path: &Path) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let tree: Tree = serde_json::from_str(&content)?;
        if !tree.nodes.contains_key("/") {
            return Err(StoreError::Serialization(format!(
                "snapshot {:?} has no root node",
                path
            )));
        }
        Ok(tree)
    }

    /// Write the snapshot to a temp file, sync it, then move it into place
    fn save(&self, path: &Path) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("tmp");
        let content = serde_json::to_vec_pretty(self)?;
        {
            let mut file = std::fs::File::create(&tmp)?;
            std::io::Write::write_all(&mut file, &content)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// In-memory hierarchical store, optionally persisted to a JSON snapshot
#[derive(Clone)]
pub struct TreeStore {
    tree: Arc<RwLock<Tree>>,
    snapshot_path: Option<PathBuf>,
}

impl TreeStore {
    /// A store that contains only `/`
    pub fn empty() -> Self {
        Self {
            tree: Arc::new(RwLock::new(Tree::with_root())),
            snapshot_path: None,
        }
    }

    /// An in-memory store with `root_path` (and its ancestors) pre-created as
    /// ordered folders
    pub fn new(root_path: &str) -> StoreResult<Self> {
        let mut tree = Tree::with_root();
        tree.ensure_folders(root_path)?;
        Ok(Self {
            tree: Arc::new(RwLock::new(tree)),
            snapshot_path: None,
        })
    }

    /// Open a file-backed store, loading the snapshot at `path` if present and
    /// making sure `root_path` exists
    pub fn open(path: impl AsRef<Path>, root_path: &str) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let (mut tree, existed) = if path.exists() {
            (Tree::load(&path)?, true)
        } else {
            (Tree::with_root(), false)
        };

        let created = tree.ensure_folders(root_path)?;
        if created || !existed {
            tree.save(&path)?;
        }

        tracing::debug!("Opened tree store {:?} ({} nodes)", path, tree.nodes.len());

        Ok(Self {
            tree: Arc::new(RwLock::new(tree)),
            snapshot_path: Some(path),
        })
    }

    /// Snapshot file, if file-backed
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Number of committed nodes, `/` included
    pub async fn node_count(&self) -> usize {
        self.tree.read().await.nodes.len()
    }
}

#[async_trait]
impl ResourceStore for TreeStore {
    async fn open_session(&self) -> StoreResult<Box<dyn StoreSession>> {
        Ok(Box::new(TreeSession {
            shared: Arc::clone(&self.tree),
            snapshot_path: self.snapshot_path.clone(),
            working: None,
            pending: Vec::new(),
        }))
    }
}

/// Session over a `TreeStore`
struct TreeSession {
    shared: Arc<RwLock<Tree>>,
    snapshot_path: Option<PathBuf>,
    /// Private copy of the tree, taken on first mutation
    working: Option<Tree>,
    /// Mutations not yet committed
    pending: Vec<Mutation>,
}

impl TreeSession {
    async fn read<R>(&self, f: impl FnOnce(&Tree) -> R) -> R {
        match &self.working {
            Some(tree) => f(tree),
            None => f(&*self.shared.read().await),
        }
    }

    async fn record(&mut self, mutation: Mutation) -> StoreResult<()> {
        if self.working.is_none() {
            self.working = Some(self.shared.read().await.clone());
        }
        if let Some(tree) = self.working.as_mut() {
            tree.apply(&mutation)?;
        }
        self.pending.push(mutation);
        Ok(())
    }
}

#[async_trait]
impl StoreSession for TreeSession {
    async fn get(&self, path: &str) -> StoreResult<Option<Node>> {
        validate_path(path)?;
        Ok(self.read(|tree| tree.node(path)).await)
    }

    async fn list_children(&self, node: &Node) -> StoreResult<Vec<Node>> {
        Ok(self.read(|tree| tree.children(&node.path)).await)
    }

    async fn parent(&self, node: &Node) -> StoreResult<Option<Node>> {
        let Some(parent) = parent_path(&node.path) else {
            return Ok(None);
        };
        Ok(self
            .read(|tree| {
                // A vanished node has no parent
                tree.nodes.get(&node.path)?;
                tree.node(parent)
            })
            .await)
    }

    async fn attributes(&self, node: &Node) -> StoreResult<Option<Attributes>> {
        Ok(self
            .read(|tree| tree.nodes.get(&node.path).map(|n| n.attributes.clone()))
            .await)
    }

    async fn create(
        &mut self,
        parent: &Node,
        name: &str,
        node_type: NodeType,
        attributes: Attributes,
    ) -> StoreResult<Node> {
        validate_name(name)?;
        self.record(Mutation::Create {
            parent: parent.path.clone(),
            name: name.to_string(),
            node_type,
            attributes,
        })
        .await?;
        Ok(Node::new(join_path(&parent.path, name), node_type))
    }

    async fn set_attributes(&mut self, node: &Node, attributes: Attributes) -> StoreResult<()> {
        self.record(Mutation::SetAttributes {
            path: node.path.clone(),
            attributes,
        })
        .await
    }

    async fn delete_subtree(&mut self, node: &Node, batch_size: usize) -> StoreResult<()> {
        if node.path == "/" {
            return Err(StoreError::InvalidPath("cannot delete /".to_string()));
        }
        let paths = self.read(|tree| tree.post_order(&node.path)).await;
        if paths.is_empty() {
            return Ok(());
        }
        let batch_size = batch_size.max(1);
        tracing::trace!(
            "Removing {} nodes under {} in batches of {}",
            paths.len(),
            node.path,
            batch_size
        );
        for chunk in paths.chunks(batch_size) {
            self.record(Mutation::Remove {
                paths: chunk.to_vec(),
            })
            .await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut shared = self.shared.write().await;
        let mut next = shared.clone();
        for mutation in &self.pending {
            next.apply(mutation)?;
        }
        if let Some(path) = &self.snapshot_path {
            next.save(path)?;
        }
        *shared = next;
        drop(shared);

        self.pending.clear();
        self.working = None;
        Ok(())
    }

    fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }
}

impl Drop for TreeSession {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(
                "Discarding {} uncommitted mutations on session release",
                self.pending.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn folder(path: &str) -> Node {
        Node::new(path, NodeType::OrderedFolder)
    }

    async fn names(session: &dyn StoreSession, path: &str) -> Vec<String> {
        session
            .list_children(&folder(path))
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect()
    }

    #[tokio::test]
    async fn test_new_creates_root_chain() {
        let store = TreeStore::new("/var/avs/history").unwrap();
        let session = store.open_session().await.unwrap();

        let root = session.get("/var/avs/history").await.unwrap().unwrap();
        assert!(root.is_folder());
        assert_eq!(root.name, "history");
        assert_eq!(store.node_count().await, 4);
    }

    #[tokio::test]
    async fn test_children_keep_insertion_order() {
        let store = TreeStore::new("/h").unwrap();
        let mut session = store.open_session().await.unwrap();
        let root = folder("/h");

        for name in ["9", "10", "1"] {
            session
                .create(&root, name, NodeType::OrderedFolder, Attributes::new())
                .await
                .unwrap();
        }
        session.commit().await.unwrap();

        let session = store.open_session().await.unwrap();
        assert_eq!(names(session.as_ref(), "/h").await, vec!["9", "10", "1"]);
    }

    #[tokio::test]
    async fn test_uncommitted_changes_are_private_and_discarded() {
        let store = TreeStore::new("/h").unwrap();

        {
            let mut writer = store.open_session().await.unwrap();
            writer
                .create(&folder("/h"), "2024", NodeType::OrderedFolder, Attributes::new())
                .await
                .unwrap();
            // Visible to its own session
            assert!(writer.get("/h/2024").await.unwrap().is_some());
            assert!(writer.has_changes());

            // Not visible to others
            let reader = store.open_session().await.unwrap();
            assert!(reader.get("/h/2024").await.unwrap().is_none());
        }

        let reader = store.open_session().await.unwrap();
        assert!(reader.get("/h/2024").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_leaf_name_collision_fails() {
        let store = TreeStore::new("/h").unwrap();
        let mut session = store.open_session().await.unwrap();
        let root = folder("/h");

        session
            .create(&root, "x", NodeType::Unstructured, Attributes::new())
            .await
            .unwrap();
        let err = session
            .create(&root, "x", NodeType::Unstructured, Attributes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_concurrent_folder_creation_merges() {
        let store = TreeStore::new("/h").unwrap();
        let root = folder("/h");

        let mut a = store.open_session().await.unwrap();
        let mut b = store.open_session().await.unwrap();

        for (session, leaf) in [(&mut a, "a"), (&mut b, "b")] {
            let day = session
                .create(&root, "5", NodeType::OrderedFolder, Attributes::new())
                .await
                .unwrap();
            session
                .create(&day, leaf, NodeType::Unstructured, Attributes::new())
                .await
                .unwrap();
        }
        a.commit().await.unwrap();
        b.commit().await.unwrap();

        let session = store.open_session().await.unwrap();
        assert_eq!(names(session.as_ref(), "/h").await, vec!["5"]);
        assert_eq!(names(session.as_ref(), "/h/5").await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_tree_unchanged() {
        let store = TreeStore::new("/h").unwrap();
        let root = folder("/h");

        let mut a = store.open_session().await.unwrap();
        let mut b = store.open_session().await.unwrap();
        a.create(&root, "x", NodeType::Unstructured, Attributes::new())
            .await
            .unwrap();
        b.create(&root, "y", NodeType::Unstructured, Attributes::new())
            .await
            .unwrap();
        b.create(&root, "x", NodeType::Unstructured, Attributes::new())
            .await
            .unwrap();

        a.commit().await.unwrap();
        let err = b.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert!(b.has_changes());

        let session = store.open_session().await.unwrap();
        assert_eq!(names(session.as_ref(), "/h").await, vec!["x"]);
    }

    #[tokio::test]
    async fn test_delete_subtree_in_batches() {
        let store = TreeStore::new("/h").unwrap();
        let mut session = store.open_session().await.unwrap();
        let year = session
            .create(&folder("/h"), "2023", NodeType::OrderedFolder, Attributes::new())
            .await
            .unwrap();
        for month in 1..=3 {
            let m = session
                .create(&year, &month.to_string(), NodeType::OrderedFolder, Attributes::new())
                .await
                .unwrap();
            for leaf in 0..4 {
                session
                    .create(&m, &leaf.to_string(), NodeType::Unstructured, Attributes::new())
                    .await
                    .unwrap();
            }
        }
        session.commit().await.unwrap();
        assert_eq!(store.node_count().await, 2 + 1 + 3 + 12);

        let mut session = store.open_session().await.unwrap();
        session.delete_subtree(&year, 5).await.unwrap();
        assert!(session.get("/h/2023").await.unwrap().is_none());
        session.commit().await.unwrap();

        assert_eq!(store.node_count().await, 2);
        let session = store.open_session().await.unwrap();
        assert!(names(session.as_ref(), "/h").await.is_empty());
    }

    #[tokio::test]
    async fn test_vanished_node_has_no_parent() {
        let store = TreeStore::new("/h").unwrap();
        let session = store.open_session().await.unwrap();
        let ghost = folder("/h/2020");
        assert!(session.parent(&ghost).await.unwrap().is_none());
        assert!(session.list_children(&ghost).await.unwrap().is_empty());
        assert!(session.attributes(&ghost).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store").join("history.json");

        {
            let store = TreeStore::open(&path, "/var/avs/history").unwrap();
            assert_eq!(store.snapshot_path(), Some(path.as_path()));
            assert!(path.exists());
            assert!(TreeStore::new("/h").unwrap().snapshot_path().is_none());

            let mut session = store.open_session().await.unwrap();
            let mut attrs = Attributes::new();
            attrs.insert("clean".to_string(), true.into());
            session
                .create(
                    &folder("/var/avs/history"),
                    "entry",
                    NodeType::Unstructured,
                    attrs,
                )
                .await
                .unwrap();
            session.commit().await.unwrap();
        }

        let store = TreeStore::open(&path, "/var/avs/history").unwrap();
        let session = store.open_session().await.unwrap();
        let node = session
            .get("/var/avs/history/entry")
            .await
            .unwrap()
            .unwrap();
        let attrs = session.attributes(&node).await.unwrap().unwrap();
        assert_eq!(attrs.get("clean").and_then(|v| v.as_bool()), Some(true));
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_is_a_failed_commit() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        let path = sub.join("history.json");
        let store = TreeStore::open(&path, "/h").unwrap();

        // Replace the snapshot directory with a plain file
        std::fs::remove_dir_all(&sub).unwrap();
        std::fs::write(&sub, b"not a directory").unwrap();

        let mut session = store.open_session().await.unwrap();
        session
            .create(&folder("/h"), "x", NodeType::Unstructured, Attributes::new())
            .await
            .unwrap();
        assert!(session.commit().await.is_err());
        assert_eq!(store.node_count().await, 2);
    }
}
