//! Group engine.
//!
//! Builds a (possibly multi-level) tree of named groups from the filtered,
//! sorted sequence. Nodes live in a slotmap arena and are addressed by
//! stable handles; each node stores a non-owning parent handle, so count
//! propagation walks parent handles explicitly instead of chasing
//! references.
//!
//! Two construction modes exist: a single linear pass when the incoming
//! data is already ordered by the group key sequence, and a stable
//! partition into first-seen-key order otherwise. Single adds and removes
//! patch the tree incrementally: counts are bumped along the leaf-to-root
//! path and empty groups collapse upward, without touching unaffected
//! siblings.

use slotmap::{SlotMap, new_key_type};

use crate::descriptions::GroupDescription;
use crate::item::ViewItem;
use crate::key::KeyValue;
use crate::sort::SortState;

new_key_type! {
    /// Stable handle of a group node in the arena.
    pub(crate) struct GroupNodeId;
}

/// A structural change on the group tree, as observed through the
/// root-level groups stream.
///
/// Observers of the root-level groups see `Added`/`Removed` only for whole
/// top-level groups appearing or disappearing, plus a `Reset` whenever the
/// group descriptions themselves change. Deeper structural changes surface
/// only through `CountChanged` notifications bubbling up the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupChange {
    /// The group descriptions changed; the whole tree was rebuilt.
    Reset,
    /// A top-level group appeared.
    Added {
        /// Position among the top-level groups.
        index: usize,
        /// The new group's key.
        key: KeyValue,
    },
    /// A top-level group disappeared (its last item was removed).
    Removed {
        /// Position the group previously occupied.
        index: usize,
        /// The removed group's key.
        key: KeyValue,
    },
    /// A node's item count changed.
    CountChanged {
        /// Key path from the root-level group down to the affected node.
        path: Vec<KeyValue>,
        /// The node's new item count.
        item_count: usize,
    },
}

/// Read-only snapshot of one group node, exposed to observers.
///
/// Leaf-level groups carry their member items in `items`; interior groups
/// carry `groups`. `item_count` is the number of leaf items beneath the
/// node at any depth.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupView<T> {
    /// The group's key value.
    pub key: KeyValue,
    /// Total leaf items beneath this node.
    pub item_count: usize,
    /// Subgroups (empty at leaf level).
    pub groups: Vec<GroupView<T>>,
    /// Member items (empty above leaf level).
    pub items: Vec<T>,
}

enum Children<T> {
    Groups(Vec<GroupNodeId>),
    Items(Vec<T>),
}

struct GroupNode<T> {
    key: KeyValue,
    parent: Option<GroupNodeId>,
    children: Children<T>,
    item_count: usize,
}

/// The materialized group tree. The root is implicit; `roots` holds the
/// top-level groups in order.
pub(crate) struct GroupTree<T> {
    arena: SlotMap<GroupNodeId, GroupNode<T>>,
    roots: Vec<GroupNodeId>,
    depth: usize,
}

impl<T: ViewItem> GroupTree<T> {
    /// Builds the tree from an ordered sequence.
    ///
    /// `ordered` selects the single-pass mode for data that is already
    /// ordered by the group key sequence; otherwise items are
    /// stable-partitioned into first-seen-key order.
    pub(crate) fn build(
        descriptions: &[GroupDescription<T>],
        items: &[T],
        ordered: bool,
    ) -> Self {
        debug_assert!(!descriptions.is_empty());
        let mut tree = Self {
            arena: SlotMap::with_key(),
            roots: Vec::new(),
            depth: descriptions.len(),
        };
        tree.roots = if ordered {
            tree.build_ordered(descriptions, 0, None, items)
        } else {
            tree.build_partition(descriptions, 0, None, items)
        };
        tracing::debug!(
            target: "prism_view::group",
            groups = tree.roots.len(),
            depth = tree.depth,
            ordered,
            "group tree built"
        );
        tree
    }

    /// Single linear pass over data pre-ordered by group keys: a new
    /// sibling starts whenever the key changes at this depth.
    fn build_ordered(
        &mut self,
        descriptions: &[GroupDescription<T>],
        depth: usize,
        parent: Option<GroupNodeId>,
        items: &[T],
    ) -> Vec<GroupNodeId> {
        let mut nodes = Vec::new();
        let mut start = 0;
        while start < items.len() {
            let key = descriptions[depth].key_of(&items[start]);
            let mut end = start + 1;
            while end < items.len() && descriptions[depth].key_of(&items[end]).same_key(&key) {
                end += 1;
            }
            let node = self.arena.insert(GroupNode {
                key,
                parent,
                children: Children::Items(Vec::new()),
                item_count: end - start,
            });
            let children = if depth + 1 < descriptions.len() {
                Children::Groups(self.build_ordered(
                    descriptions,
                    depth + 1,
                    Some(node),
                    &items[start..end],
                ))
            } else {
                Children::Items(items[start..end].to_vec())
            };
            self.arena[node].children = children;
            nodes.push(node);
            start = end;
        }
        nodes
    }

    /// Stable partition into first-seen-key order, recursing per partition.
    fn build_partition(
        &mut self,
        descriptions: &[GroupDescription<T>],
        depth: usize,
        parent: Option<GroupNodeId>,
        items: &[T],
    ) -> Vec<GroupNodeId> {
        let mut buckets: Vec<(KeyValue, Vec<T>)> = Vec::new();
        for item in items {
            let key = descriptions[depth].key_of(item);
            match buckets.iter_mut().find(|(existing, _)| existing.same_key(&key)) {
                Some((_, bucket)) => bucket.push(item.clone()),
                None => buckets.push((key, vec![item.clone()])),
            }
        }

        let mut nodes = Vec::new();
        for (key, bucket) in buckets {
            let node = self.arena.insert(GroupNode {
                key,
                parent,
                children: Children::Items(Vec::new()),
                item_count: bucket.len(),
            });
            let children = if depth + 1 < descriptions.len() {
                Children::Groups(self.build_partition(
                    descriptions,
                    depth + 1,
                    Some(node),
                    &bucket,
                ))
            } else {
                Children::Items(bucket)
            };
            self.arena[node].children = children;
            nodes.push(node);
        }
        nodes
    }

    /// Total leaf items in the tree.
    pub(crate) fn item_count(&self) -> usize {
        self.roots.iter().map(|&root| self.arena[root].item_count).sum()
    }

    /// Flattened leaf order: the view sequence the pager slices.
    pub(crate) fn flatten(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.item_count());
        for &root in &self.roots {
            self.flatten_into(root, &mut out);
        }
        out
    }

    fn flatten_into(&self, node: GroupNodeId, out: &mut Vec<T>) {
        match &self.arena[node].children {
            Children::Groups(children) => {
                for &child in children {
                    self.flatten_into(child, out);
                }
            }
            Children::Items(items) => out.extend(items.iter().cloned()),
        }
    }

    /// Key path from the root-level group down to `node`.
    fn path_of(&self, node: GroupNodeId) -> Vec<KeyValue> {
        let mut path = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            path.push(self.arena[id].key.clone());
            current = self.arena[id].parent;
        }
        path.reverse();
        path
    }

    /// Inserts one item, creating missing groups along its key path.
    ///
    /// Returns the item's position in the flattened sequence and the
    /// resulting group notifications. Within its leaf group the item lands
    /// at the position the sort chain dictates (or at the end when
    /// unsorted).
    pub(crate) fn insert(
        &mut self,
        descriptions: &[GroupDescription<T>],
        sort: &SortState<T>,
        item: &T,
    ) -> (usize, Vec<GroupChange>) {
        let mut changes = Vec::new();
        let mut parent: Option<GroupNodeId> = None;
        let mut flat = 0usize;
        let mut path: Vec<GroupNodeId> = Vec::new();

        for depth in 0..descriptions.len() {
            let key = descriptions[depth].key_of(item);
            let siblings: Vec<GroupNodeId> = match parent {
                None => self.roots.clone(),
                Some(p) => match &self.arena[p].children {
                    Children::Groups(children) => children.clone(),
                    Children::Items(_) => Vec::new(),
                },
            };

            let mut found = None;
            for &sibling in &siblings {
                if self.arena[sibling].key.same_key(&key) {
                    found = Some(sibling);
                    break;
                }
                flat += self.arena[sibling].item_count;
            }

            let node = match found {
                Some(existing) => existing,
                None => {
                    // New groups join the end of their sibling list,
                    // preserving first-seen order.
                    let children = if depth + 1 < descriptions.len() {
                        Children::Groups(Vec::new())
                    } else {
                        Children::Items(Vec::new())
                    };
                    let node = self.arena.insert(GroupNode {
                        key: key.clone(),
                        parent,
                        children,
                        item_count: 0,
                    });
                    match parent {
                        None => {
                            let index = self.roots.len();
                            self.roots.push(node);
                            changes.push(GroupChange::Added { index, key });
                        }
                        Some(p) => {
                            if let Children::Groups(children) = &mut self.arena[p].children {
                                children.push(node);
                            }
                        }
                    }
                    node
                }
            };
            path.push(node);
            parent = Some(node);
        }

        let leaf = *path.last().expect("grouping requires at least one description");
        let position = match &mut self.arena[leaf].children {
            Children::Items(items) => {
                let position = sort.insertion_index(items, item);
                items.insert(position, item.clone());
                position
            }
            Children::Groups(_) => unreachable!("leaf node holds items"),
        };
        flat += position;

        // Count propagation: leaf to root.
        for &node in path.iter().rev() {
            self.arena[node].item_count += 1;
            changes.push(GroupChange::CountChanged {
                path: self.path_of(node),
                item_count: self.arena[node].item_count,
            });
        }

        (flat, changes)
    }

    /// Removes one item, collapsing group nodes that become empty.
    ///
    /// Returns the item's former position in the flattened sequence and the
    /// resulting notifications, or `None` if the item is not in the tree.
    pub(crate) fn remove(&mut self, item: &T) -> Option<(usize, Vec<GroupChange>)> {
        let (leaf, position, flat) = self.locate(item)?;

        if let Children::Items(items) = &mut self.arena[leaf].children {
            items.remove(position);
        }

        // Decrement counts along the leaf-to-root path.
        let mut chain = Vec::new();
        let mut current = Some(leaf);
        while let Some(node) = current {
            self.arena[node].item_count -= 1;
            chain.push(node);
            current = self.arena[node].parent;
        }

        // Collapse empty nodes upward.
        let mut changes = Vec::new();
        let mut removed_root = None;
        let mut node = leaf;
        while self.arena[node].item_count == 0 {
            match self.arena[node].parent {
                Some(parent) => {
                    if let Children::Groups(children) = &mut self.arena[parent].children {
                        children.retain(|&child| child != node);
                    }
                    self.arena.remove(node);
                    node = parent;
                }
                None => {
                    let index = self
                        .roots
                        .iter()
                        .position(|&root| root == node)
                        .expect("root node is registered");
                    let key = self.arena[node].key.clone();
                    self.roots.remove(index);
                    self.arena.remove(node);
                    removed_root = Some(GroupChange::Removed { index, key });
                    break;
                }
            }
        }

        // Count notifications for the surviving ancestors.
        for survivor in chain {
            if self.arena.contains_key(survivor) {
                changes.push(GroupChange::CountChanged {
                    path: self.path_of(survivor),
                    item_count: self.arena[survivor].item_count,
                });
            }
        }
        if let Some(removed) = removed_root {
            changes.push(removed);
        }

        Some((flat, changes))
    }

    /// Finds the leaf holding `item`, its position within the leaf, and its
    /// flattened position.
    fn locate(&self, item: &T) -> Option<(GroupNodeId, usize, usize)> {
        let mut flat = 0;
        for &root in &self.roots {
            if let Some((leaf, position)) = self.locate_in(root, item, &mut flat) {
                return Some((leaf, position, flat));
            }
        }
        None
    }

    fn locate_in(
        &self,
        node: GroupNodeId,
        item: &T,
        flat: &mut usize,
    ) -> Option<(GroupNodeId, usize)> {
        match &self.arena[node].children {
            Children::Groups(children) => {
                for &child in children {
                    if let Some(found) = self.locate_in(child, item, flat) {
                        return Some(found);
                    }
                }
                None
            }
            Children::Items(items) => match items.iter().position(|other| other == item) {
                Some(position) => {
                    *flat += position;
                    Some((node, position))
                }
                None => {
                    *flat += items.len();
                    None
                }
            },
        }
    }

    /// Read-only snapshot of the top-level groups.
    pub(crate) fn to_views(&self) -> Vec<GroupView<T>> {
        self.roots.iter().map(|&root| self.view_of(root)).collect()
    }

    fn view_of(&self, node: GroupNodeId) -> GroupView<T> {
        let entry = &self.arena[node];
        match &entry.children {
            Children::Groups(children) => GroupView {
                key: entry.key.clone(),
                item_count: entry.item_count,
                groups: children.iter().map(|&child| self.view_of(child)).collect(),
                items: Vec::new(),
            },
            Children::Items(items) => GroupView {
                key: entry.key.clone(),
                item_count: entry.item_count,
                groups: Vec::new(),
                items: items.clone(),
            },
        }
    }
}
