//! Arena storage for scene nodes.
//!
//! Nodes sit in a flat vector of slots. Parent, child and z-context links
//! are plain [`NodeId`] handles, so neither the parent/child graph nor the
//! z-context graph needs shared ownership. Freed slots are chained into an
//! intrusive free list and reused; every reuse bumps the slot's generation,
//! which turns handles kept past a removal into detectable misses instead
//! of aliases of the new occupant.

use std::ops::{Index, IndexMut};

use crate::node::Node;

/// Handle to a node in a [`Tree`]: slot position plus the generation the
/// slot had when the node was stored.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeId {
    slot: u32,
    generation: u32,
}

impl NodeId {
    /// Packed form, generation in the upper half. Handy as a key on the
    /// backend side.
    pub fn as_u64(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.slot)
    }
}

enum Entry {
    Occupied { generation: u32, node: Node },
    /// `next_free` chains vacant slots; `generation` is the one the next
    /// occupant gets.
    Vacant { generation: u32, next_free: Option<u32> },
}

/// Arena of nodes addressed by [`NodeId`].
///
/// Lookups with a stale handle return `None` from [`Tree::get`]; indexing
/// with one panics, since it means the caller kept a handle past removal.
#[derive(Default)]
pub struct Tree {
    entries: Vec<Entry>,
    free_head: Option<u32>,
    len: usize,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a node and return its handle.
    pub fn insert(&mut self, node: Node) -> NodeId {
        self.len += 1;
        if let Some(slot) = self.free_head {
            let entry = &mut self.entries[slot as usize];
            if let Entry::Vacant {
                generation,
                next_free,
            } = *entry
            {
                self.free_head = next_free;
                *entry = Entry::Occupied { generation, node };
                return NodeId { slot, generation };
            }
        }
        let slot = self.entries.len() as u32;
        self.entries.push(Entry::Occupied {
            generation: 0,
            node,
        });
        NodeId {
            slot,
            generation: 0,
        }
    }

    /// Remove a node and hand it back. Links held by other nodes are not
    /// touched; the scene graph unlinks before removing.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.get(id)?;
        let vacant = Entry::Vacant {
            generation: id.generation.wrapping_add(1),
            next_free: self.free_head,
        };
        let Entry::Occupied { node, .. } =
            std::mem::replace(&mut self.entries[id.slot as usize], vacant)
        else {
            return None;
        };
        self.free_head = Some(id.slot);
        self.len -= 1;
        Some(node)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        match self.entries.get(id.slot as usize)? {
            Entry::Occupied { generation, node } if *generation == id.generation => Some(node),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        match self.entries.get_mut(id.slot as usize)? {
            Entry::Occupied { generation, node } if *generation == id.generation => Some(node),
            _ => None,
        }
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Index<NodeId> for Tree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale or foreign node handle {:?}", id),
        }
    }
}

impl IndexMut<NodeId> for Tree {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("stale or foreign node handle {:?}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_at(x: f32) -> Node {
        let mut node = Node::new();
        node.x = x;
        node
    }

    #[test]
    fn test_insert_and_remove() {
        let mut tree = Tree::new();
        let id = tree.insert(Node::new());
        assert!(tree.contains(id));
        assert_eq!(tree.len(), 1);

        assert!(tree.remove(id).is_some());
        assert!(!tree.contains(id));
        assert!(tree.is_empty());
        assert!(tree.remove(id).is_none());
    }

    #[test]
    fn test_reused_slot_gets_new_generation() {
        let mut tree = Tree::new();
        let old = tree.insert(Node::new());
        tree.remove(old);

        let new = tree.insert(Node::new());
        assert_eq!(old.slot, new.slot);
        assert_ne!(old.generation, new.generation);
        assert!(tree.get(old).is_none());
        assert!(tree.contains(new));
    }

    #[test]
    fn test_stale_handles_never_alias() {
        let mut tree = Tree::new();
        let mut previous = Vec::new();
        for _ in 0..4 {
            let id = tree.insert(Node::new());
            tree.remove(id);
            previous.push(id);
        }
        let id = tree.insert(Node::new());
        for old in previous {
            assert_ne!(old, id);
            assert!(!tree.contains(old));
        }
    }

    #[test]
    fn test_free_slots_are_reused_last_in_first_out() {
        let mut tree = Tree::new();
        let a = tree.insert(node_at(1.0));
        let b = tree.insert(node_at(2.0));
        let c = tree.insert(node_at(3.0));
        tree.remove(a);
        tree.remove(c);

        assert_eq!(tree.insert(Node::new()).slot, c.slot);
        assert_eq!(tree.insert(Node::new()).slot, a.slot);
        assert_eq!(tree[b].x, 2.0);
        assert_eq!(tree.len(), 3);

        tree[b].x = 20.0;
        assert_eq!(tree.get(b).map(|n| n.x), Some(20.0));
    }

    #[test]
    #[should_panic(expected = "stale or foreign node handle")]
    fn test_indexing_with_stale_handle_panics() {
        let mut tree = Tree::new();
        let id = tree.insert(Node::new());
        tree.remove(id);
        let _ = &tree[id];
    }

    #[test]
    fn test_as_u64_packs_generation_high() {
        let mut tree = Tree::new();
        let first = tree.insert(Node::new());
        tree.remove(first);
        let id = tree.insert(Node::new());
        assert_eq!(id.as_u64(), 1u64 << 32);
    }
}
