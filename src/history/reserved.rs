//! Store-internal children
//!
//! Buckets may carry children the store keeps for itself (access control
//! policies, index definitions). They are not part of the history and every
//! child listing in this crate goes through `logical_children`.

use crate::store::{Node, StoreResult, StoreSession};

/// Names of store-internal nodes
pub const RESERVED_NAMES: &[&str] = &["rep:policy", "oak:index"];

/// True if `name` belongs to the store, not the history
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Children of `node` in store order, without reserved nodes
pub async fn logical_children(
    session: &dyn StoreSession,
    node: &Node,
) -> StoreResult<Vec<Node>> {
    let mut children = session.list_children(node).await?;
    children.retain(|child| !is_reserved(&child.name));
    Ok(children)
}

/// Last logical child of `node`, if any
pub async fn last_logical_child(
    session: &dyn StoreSession,
    node: &Node,
) -> StoreResult<Option<Node>> {
    Ok(logical_children(session, node).await?.pop())
}
