//! Hierarchical Resource Store
//!
//! The history lives inside a generic tree of named nodes. This module defines
//! the surface the history layer consumes from such a store:
//!
//! - **ResourceStore**: hands out scoped sessions
//! - **StoreSession**: reads, buffered mutations, atomic commit
//! - **Node / NodeType / Attributes**: what a session returns
//! - **tree**: `TreeStore`, an in-memory (optionally file-backed) implementation
//! - **error**: Error types
//!
//! # Session discipline
//!
//! ```text
//! open_session() → reads / create / delete (buffered) → commit() → drop
//! ```
//!
//! A session is owned by one logical operation. Dropping it releases it;
//! anything not committed by then is discarded.

pub mod error;
pub mod tree;

pub use error::{StoreError, StoreResult};
pub use tree::TreeStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structural type of a node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Folder whose children keep insertion order
    OrderedFolder,
    /// Generic leaf-style node carrying attributes
    Unstructured,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeType::OrderedFolder => write!(f, "ordered_folder"),
            NodeType::Unstructured => write!(f, "unstructured"),
        }
    }
}

/// A resolved handle to a node in the store
///
/// Handles are snapshots: the node may disappear after it was resolved, in
/// which case subsequent lookups through it simply find nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Absolute path, e.g. `/var/avs/history/2024/1/5`
    pub path: String,
    /// Last path segment (empty for `/`)
    pub name: String,
    /// Structural type
    pub node_type: NodeType,
}

impl Node {
    pub fn new(path: impl Into<String>, node_type: NodeType) -> Self {
        let path = path.into();
        let name = node_name(&path).to_string();
        Self {
            path,
            name,
            node_type,
        }
    }

    /// True for ordered folders
    pub fn is_folder(&self) -> bool {
        self.node_type == NodeType::OrderedFolder
    }
}

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AttrValue {
    String(String),
    Bool(bool),
    Long(i64),
    Date(DateTime<Utc>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            AttrValue::Date(d) => Some(*d),
            // Stored as epoch millis by some writers
            AttrValue::Long(ms) => DateTime::from_timestamp_millis(*ms),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Long(value)
    }
}

impl From<DateTime<Utc>> for AttrValue {
    fn from(value: DateTime<Utc>) -> Self {
        AttrValue::Date(value)
    }
}

/// Attribute map of a node
pub type Attributes = BTreeMap<String, AttrValue>;

/// Factory for scoped store sessions
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Open a session. Fails with `StoreError::Unavailable` when the store
    /// cannot be reached or the caller cannot log in.
    async fn open_session(&self) -> StoreResult<Box<dyn StoreSession>>;
}

/// One logical unit of work against the store
///
/// Reads observe this session's own pending mutations. Mutations are buffered
/// until `commit`, which applies all of them or none.
#[async_trait]
pub trait StoreSession: Send + Sync {
    /// Resolve a node by absolute path
    async fn get(&self, path: &str) -> StoreResult<Option<Node>>;

    /// Children of `node` in store order (insertion order for ordered folders).
    /// A node that no longer exists has no children.
    async fn list_children(&self, node: &Node) -> StoreResult<Vec<Node>>;

    /// Parent of `node`, or `None` for `/` and for vanished nodes
    async fn parent(&self, node: &Node) -> StoreResult<Option<Node>>;

    /// Attributes of `node`, or `None` if it no longer exists
    async fn attributes(&self, node: &Node) -> StoreResult<Option<Attributes>>;

    /// Create a child node under `parent`
    async fn create(
        &mut self,
        parent: &Node,
        name: &str,
        node_type: NodeType,
        attributes: Attributes,
    ) -> StoreResult<Node>;

    /// Merge `attributes` into the node's attribute map
    async fn set_attributes(&mut self, node: &Node, attributes: Attributes) -> StoreResult<()>;

    /// Remove `node` and everything below it, in removal batches of `batch_size`
    async fn delete_subtree(&mut self, node: &Node, batch_size: usize) -> StoreResult<()>;

    /// Apply all pending mutations atomically
    async fn commit(&mut self) -> StoreResult<()>;

    /// True if there are uncommitted mutations
    fn has_changes(&self) -> bool;
}

/// Join a parent path and a child name
pub fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}

/// Parent path of `path`; `None` for `/`
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" || path.is_empty() {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of `path`
pub fn node_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// `path` without trailing slashes; `/` stays `/`
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// True if `path` lies strictly below `ancestor`
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return path.len() > 1 && path.starts_with('/');
    }
    match path.strip_prefix(ancestor) {
        Some(rest) => rest.len() > 1 && rest.starts_with('/'),
        None => false,
    }
}

/// Validate a single node name
pub fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(StoreError::InvalidPath(format!("invalid node name {:?}", name)));
    }
    Ok(())
}

/// Validate an absolute path
pub fn validate_path(path: &str) -> StoreResult<()> {
    if !path.starts_with('/') {
        return Err(StoreError::InvalidPath(format!("{} is not absolute", path)));
    }
    if path == "/" {
        return Ok(());
    }
    path[1..].split('/').try_for_each(validate_name)
}
