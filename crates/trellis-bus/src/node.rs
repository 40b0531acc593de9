//! The resource trie.
//!
//! Every topic resolves to a [`ResourceNode`]: the routing entity that
//! hosts at most one service, any number of subscribers, and a table of
//! child nodes. Nodes are cooperative; ownership flows *upward*:
//!
//! - a child holds a strong reference to its parent,
//! - services and subscriptions hold a strong reference to their node,
//! - outside code holds strong references through `Topic`.
//!
//! The node's own references (child table, service slot, subscriber
//! pool) are all weak. A node therefore exists exactly as long as
//! something below or beside it needs it, and vanishes with its last
//! member. There is no explicit removal API anywhere in the trie.

use std::sync::Arc;

use tracing::debug;
use trellis_coop::{Pool, PoolIter, Slot, WeakTable};

use crate::path::Segments;
use crate::receiver::{Service, Subscription};

/// One node of the resource trie.
///
/// See the [module documentation](self) for the ownership model. Node
/// handles are always `Arc<ResourceNode>`; the constructors enforce
/// this.
pub struct ResourceNode {
    /// Strong parent reference: the child owns the parent.
    parent: Option<Arc<ResourceNode>>,
    /// Full path from the root; the root's path is its id.
    path: String,
    /// Offset of this node's own id within `path`.
    id_start: usize,
    /// Separator for the whole subtree, fixed at root creation.
    separator: char,
    children: WeakTable<String, ResourceNode>,
    service: Slot<Service>,
    subscribers: Pool<Subscription>,
}

impl ResourceNode {
    /// Creates a root node.
    ///
    /// The global bus root uses an empty id and `/`; independent tries
    /// may pick anything.
    #[must_use]
    pub fn new_root(id: impl Into<String>, separator: char) -> Arc<ResourceNode> {
        let path = id.into();
        Arc::new(ResourceNode {
            parent: None,
            path,
            id_start: 0,
            separator,
            children: WeakTable::new(),
            service: Slot::new(),
            subscribers: Pool::new(),
        })
    }

    fn new_child(parent: Arc<ResourceNode>, id: &str) -> Arc<ResourceNode> {
        let mut path = parent.path.clone();
        if !path.is_empty() {
            path.push(parent.separator);
        }
        let id_start = path.len();
        path.push_str(id);
        let separator = parent.separator;
        Arc::new(ResourceNode {
            parent: Some(parent),
            path,
            id_start,
            separator,
            children: WeakTable::new(),
            service: Slot::new(),
            subscribers: Pool::new(),
        })
    }

    /// This node's leaf identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.path[self.id_start..]
    }

    /// Full path from the root.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The parent node; `None` for a root.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<ResourceNode>> {
        self.parent.as_ref()
    }

    /// Separator character for this subtree.
    #[must_use]
    pub fn separator(&self) -> char {
        self.separator
    }

    /// Returns an existing child, or `None`.
    #[must_use]
    pub fn try_child(&self, id: &str) -> Option<Arc<ResourceNode>> {
        self.children.find(id)
    }

    /// Returns the child under `id`, creating it if missing or
    /// expired.
    #[must_use]
    pub fn get_child(self: &Arc<Self>, id: &str) -> Arc<ResourceNode> {
        self.children.find_or_create(id.to_owned(), || {
            debug!(parent = %self.path, id, "resource node created");
            ResourceNode::new_child(self.clone(), id)
        })
    }

    /// Walks `path`, creating missing nodes.
    #[must_use]
    pub fn get(self: &Arc<Self>, path: &str) -> Arc<ResourceNode> {
        let mut node = self.clone();
        for segment in Segments::with_separator(path, self.separator) {
            node = node.get_child(segment);
        }
        node
    }

    /// Walks `path`; returns `None` at the first missing segment.
    #[must_use]
    pub fn find(self: &Arc<Self>, path: &str) -> Option<Arc<ResourceNode>> {
        let mut node = self.clone();
        for segment in Segments::with_separator(path, self.separator) {
            node = node.try_child(segment)?;
        }
        Some(node)
    }

    /// Walks `path` as far as it exists; returns the deepest node
    /// found.
    #[must_use]
    pub fn nearest(self: &Arc<Self>, path: &str) -> Arc<ResourceNode> {
        let mut node = self.clone();
        for segment in Segments::with_separator(path, self.separator) {
            match node.try_child(segment) {
                Some(child) => node = child,
                None => break,
            }
        }
        node
    }

    /// Installs `target` as this node's child under `id`, like a
    /// symlink. Fails if `id` already maps to a live node.
    ///
    /// The alias holds only a weak reference: it persists exactly as
    /// long as the target does.
    pub fn make_link(&self, id: &str, target: &Arc<ResourceNode>) -> bool {
        self.children.try_insert(id.to_owned(), target)
    }

    /// Visits each live child. The child table is read-locked for the
    /// duration; the callback must not mutate this node's children.
    pub fn visit_children(&self, mut callback: impl FnMut(&str, &Arc<ResourceNode>)) {
        self.children.visit(|id, child| callback(id, child));
    }

    /// The currently registered service, if any.
    #[must_use]
    pub fn service(&self) -> Option<Arc<Service>> {
        self.service.lock()
    }

    pub(crate) fn try_emplace_service(&self, service: Service) -> Option<Arc<Service>> {
        self.service.try_emplace(service).ok()
    }

    pub(crate) fn emplace_subscriber(&self, subscription: Subscription) -> Arc<Subscription> {
        self.subscribers.emplace(subscription)
    }

    pub(crate) fn subscriptions(&self) -> PoolIter<'_, Subscription> {
        self.subscribers.iter()
    }

    /// Number of live subscriptions on this node. A snapshot.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl std::fmt::Debug for ResourceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceNode")
            .field("path", &self.path)
            .field("has_service", &self.service().is_some())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Arc<ResourceNode> {
        ResourceNode::new_root("", '/')
    }

    #[test]
    fn path_composition() {
        let root = root();
        let apple = root.get_child("apple");
        let seed = apple.get_child("seed");

        assert_eq!(root.path(), "");
        assert_eq!(apple.path(), "apple");
        assert_eq!(apple.id(), "apple");
        assert_eq!(seed.path(), "apple/seed");
        assert_eq!(seed.id(), "seed");
    }

    #[test]
    fn named_root_prefixes_children() {
        let root = ResourceNode::new_root("top", '.');
        let child = root.get_child("leaf");
        assert_eq!(child.path(), "top.leaf");
        assert_eq!(child.id(), "leaf");
    }

    #[test]
    fn get_child_reuses_live_nodes() {
        let root = root();
        let a = root.get_child("a");
        let again = root.get_child("a");
        assert!(Arc::ptr_eq(&a, &again));
    }

    #[test]
    fn children_expire_without_owners() {
        let root = root();
        drop(root.get_child("ephemeral"));
        assert!(root.try_child("ephemeral").is_none());
        // Recreation works fine.
        let again = root.get_child("ephemeral");
        assert_eq!(again.path(), "ephemeral");
    }

    #[test]
    fn child_keeps_parent_alive() {
        let root = root();
        let leaf = root.get(&"a/b/c".to_string());
        let a = root.try_child("a").expect("kept alive by grandchild");
        assert_eq!(a.path(), "a");
        assert_eq!(leaf.parent().expect("has parent").path(), "a/b");
    }

    #[test]
    fn walk_variants() {
        let root = root();
        let made = root.get("x/y/z");
        assert_eq!(made.path(), "x/y/z");

        assert_eq!(root.find("x/y/z").expect("exists").path(), "x/y/z");
        assert!(root.find("x/missing").is_none());

        assert_eq!(root.nearest("x/y/nope/deeper").path(), "x/y");
        assert_eq!(root.nearest("completely/new").path(), "");
    }

    #[test]
    fn walk_skips_redundant_separators() {
        let root = root();
        let node = root.get("//a//b/");
        assert_eq!(node.path(), "a/b");
        assert_eq!(root.get("a/b").path(), "a/b");
        assert!(Arc::ptr_eq(&node, &root.get("/a/b//")));
    }

    #[test]
    fn links_alias_existing_nodes() {
        let root = root();
        let target = root.get("real/thing");

        assert!(root.make_link("alias", &target));
        let via_alias = root.try_child("alias").expect("alias resolves");
        assert!(Arc::ptr_eq(&via_alias, &target));

        // Occupied id refuses.
        assert!(!root.make_link("alias", &root.get("other")));
    }

    #[test]
    fn links_expire_with_target() {
        let root = root();
        {
            let target = root.get("short/lived");
            assert!(root.make_link("alias", &target));
        }
        assert!(root.try_child("alias").is_none());
    }

    #[test]
    fn visit_children_sees_live_nodes() {
        let root = root();
        let _a = root.get_child("a");
        let _b = root.get_child("b");
        drop(root.get_child("gone"));

        let mut ids = Vec::new();
        root.visit_children(|id, _| ids.push(id.to_owned()));
        ids.sort();
        assert_eq!(ids, ["a", "b"]);
    }
}
