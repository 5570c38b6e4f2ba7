//! Arena-backed mirror of a watched directory.
//!
//! Nodes live in a slot vector and are addressed by [`NodeId`]. An id carries
//! the generation of its slot, so a handle kept across a removal resolves to
//! nothing instead of to whatever node reused the slot later.
//!
//! Children of every node are kept sorted by path and unique, and each
//! child's path is a direct child path of its parent's. All mutating
//! operations check these invariants before touching the arena.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::file_info::FileInfo;

/// Stable handle to a node of one [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("node handle is stale or belongs to another tree")]
    StaleNode,

    #[error("{child} is not a direct child of {parent}")]
    NotAChild { parent: PathBuf, child: PathBuf },

    #[error("{0} is already tracked")]
    DuplicatePath(PathBuf),

    #[error("cannot replace {existing} with an entry for {replacement}")]
    PathMismatch {
        existing: PathBuf,
        replacement: PathBuf,
    },

    #[error("{0} changed between file and directory; remove and re-add it")]
    KindChange(PathBuf),

    #[error("cannot insert an empty subtree")]
    EmptySubtree,
}

#[derive(Debug, Clone)]
struct Node {
    info: FileInfo,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Debug, Clone, Default)]
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<usize>,
    root: Option<NodeId>,
    len: usize,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(info: FileInfo) -> Self {
        let mut tree = Self::new();
        let root = tree.allocate(Node {
            info,
            parent: None,
            children: Vec::new(),
        });
        tree.root = Some(root);
        tree
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn root_info(&self) -> Option<&FileInfo> {
        self.root.and_then(|id| self.get(id))
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&FileInfo> {
        self.node(id).map(|node| &node.info)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.parent)
    }

    /// Children of `id` in path order. Empty for stale handles.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Looks up a tracked entry by absolute path.
    ///
    /// Walks down from the root one path component at a time, binary
    /// searching each level.
    pub fn find(&self, path: &Path) -> Option<NodeId> {
        let root = self.root?;
        let root_path = self.get(root)?.path();
        let relative = path.strip_prefix(root_path).ok()?;

        let mut current = root;
        let mut current_path = root_path.to_path_buf();
        for component in relative.components() {
            current_path.push(component);
            current = self.find_child(current, &current_path)?;
        }
        Some(current)
    }

    pub fn find_child(&self, parent: NodeId, path: &Path) -> Option<NodeId> {
        let position = self.locate_child(parent, path)?.ok()?;
        self.children(parent).get(position).copied()
    }

    /// Inserts a leaf under `parent` at its sorted position.
    pub fn append_child(&mut self, parent: NodeId, info: FileInfo) -> Result<NodeId, TreeError> {
        let position = self.insert_position(parent, &info)?;
        let id = self.allocate(Node {
            info,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.attach(parent, position, id);
        Ok(id)
    }

    /// Moves every node of `subtree` under `parent` in one structural update.
    ///
    /// Returns the id the subtree's root received in this tree.
    pub fn insert_subtree(&mut self, parent: NodeId, mut subtree: Tree) -> Result<NodeId, TreeError> {
        let source_root = subtree.root.ok_or(TreeError::EmptySubtree)?;
        let info = subtree.get(source_root).ok_or(TreeError::EmptySubtree)?;
        let position = self.insert_position(parent, info)?;

        let id = self
            .graft(&mut subtree, source_root, Some(parent))
            .ok_or(TreeError::EmptySubtree)?;
        self.attach(parent, position, id);
        Ok(id)
    }

    /// Detaches `id` and its descendants and hands them back as their own tree.
    ///
    /// Removing the root leaves this tree empty.
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<Tree, TreeError> {
        let parent = self.node(id).ok_or(TreeError::StaleNode)?.parent;
        match parent {
            Some(parent) => {
                if let Some(node) = self.node_mut(parent) {
                    node.children.retain(|child| *child != id);
                }
            }
            None => self.root = None,
        }

        let mut removed = Tree::new();
        removed.root = removed.graft(self, id, None);
        Ok(removed)
    }

    /// Replaces the metadata of an existing node, returning the old value.
    pub fn update_node(&mut self, id: NodeId, info: FileInfo) -> Result<FileInfo, TreeError> {
        let node = self.node_mut(id).ok_or(TreeError::StaleNode)?;
        if node.info.path() != info.path() {
            return Err(TreeError::PathMismatch {
                existing: node.info.path().to_path_buf(),
                replacement: info.path().to_path_buf(),
            });
        }
        if node.info.is_directory() != info.is_directory() {
            return Err(TreeError::KindChange(info.path().to_path_buf()));
        }
        Ok(std::mem::replace(&mut node.info, info))
    }

    /// Depth-first, parents before children, siblings in path order.
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder {
            tree: self,
            stack: self.root.into_iter().collect(),
        }
    }

    /// Pre-order walk of the subtree rooted at `id`, `id` included.
    pub fn descendants(&self, id: NodeId) -> PreOrder<'_> {
        let stack = if self.contains(id) { vec![id] } else { Vec::new() };
        PreOrder { tree: self, stack }
    }

    /// Children before parents; the reverse of the order entries were added in.
    pub fn post_order(&self, id: NodeId) -> Vec<&FileInfo> {
        let mut out = Vec::new();
        self.collect_post_order(id, &mut out);
        out
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.iter().map(|info| info.path().to_path_buf()).collect()
    }

    fn collect_post_order<'a>(&'a self, id: NodeId, out: &mut Vec<&'a FileInfo>) {
        if let Some(node) = self.node(id) {
            for child in &node.children {
                self.collect_post_order(*child, out);
            }
            out.push(&node.info);
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn locate_child(&self, parent: NodeId, path: &Path) -> Option<Result<usize, usize>> {
        let node = self.node(parent)?;
        Some(node.children.binary_search_by(|child| {
            self.get(*child)
                .map_or(Ordering::Less, |info| info.path().cmp(path))
        }))
    }

    fn insert_position(&self, parent: NodeId, info: &FileInfo) -> Result<usize, TreeError> {
        let parent_info = self.get(parent).ok_or(TreeError::StaleNode)?;
        if !info.is_child_of(parent_info.path()) {
            return Err(TreeError::NotAChild {
                parent: parent_info.path().to_path_buf(),
                child: info.path().to_path_buf(),
            });
        }

        match self.locate_child(parent, info.path()) {
            Some(Ok(_)) => Err(TreeError::DuplicatePath(info.path().to_path_buf())),
            Some(Err(position)) => Ok(position),
            None => Err(TreeError::StaleNode),
        }
    }

    fn attach(&mut self, parent: NodeId, position: usize, child: NodeId) {
        if let Some(node) = self.node_mut(parent) {
            node.children.insert(position, child);
        }
    }

    fn allocate(&mut self, node: Node) -> NodeId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index: self.slots.len() - 1,
                generation: 0,
            }
        }
    }

    fn release(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(node)
    }

    /// Moves `source_id` and its descendants out of `source` into `self`.
    /// Children are already sorted in `source`, so they are appended as-is.
    fn graft(&mut self, source: &mut Tree, source_id: NodeId, parent: Option<NodeId>) -> Option<NodeId> {
        let node = source.release(source_id)?;
        let id = self.allocate(Node {
            info: node.info,
            parent,
            children: Vec::with_capacity(node.children.len()),
        });
        for child in node.children {
            if let Some(grafted) = self.graft(source, child, Some(id)) {
                if let Some(new_node) = self.node_mut(id) {
                    new_node.children.push(grafted);
                }
            }
        }
        Some(id)
    }
}

/// Two trees are equal when they track the same entries with the same kinds.
/// Metadata is not compared.
impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| a == b && a.is_directory() == b.is_directory())
    }
}

impl Eq for Tree {}

pub struct PreOrder<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a FileInfo;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if let Some(node) = self.tree.node(id) {
                self.stack.extend(node.children.iter().rev().copied());
                return Some(&node.info);
            }
        }
        None
    }
}
