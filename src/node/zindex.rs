//! Z-context bookkeeping.
//!
//! Nodes with a nonzero z-index are drawn out of tree order. Each one
//! registers with its nearest z-context ancestor (`z_parent`), which keeps
//! them in a sorted list. Removal from that list is lazy: leaving a context
//! only flags it for a re-sort, and the sort drops entries that no longer
//! belong there.

use std::cmp::Ordering;

use super::RENDER_UPDATE_MINOR;
use crate::scene::SceneGraph;
use crate::tree::{NodeId, Tree};

/// Sort key of a z-indexed entry: z-index first, then tree order.
fn z_order(nodes: &Tree, a: NodeId, b: NodeId) -> Ordering {
    let (na, nb) = (&nodes[a], &nodes[b]);
    na.z_index
        .cmp(&nb.z_index)
        .then(na.update_tree_order.cmp(&nb.update_tree_order))
}

fn push_unique(list: &mut Vec<NodeId>, id: NodeId) {
    if list.last() != Some(&id) {
        list.push(id);
    }
}

impl SceneGraph {
    /// Nearest z-context at or above `id`.
    pub fn find_z_context(&self, id: NodeId) -> NodeId {
        let mut current = id;
        loop {
            let node = &self.nodes[current];
            match node.parent {
                Some(parent) if !node.is_z_context() => current = parent,
                _ => return current,
            }
        }
    }

    pub fn is_z_context(&self, id: NodeId) -> bool {
        self.nodes[id].is_z_context()
    }

    pub fn set_z_index(&mut self, id: NodeId, z_index: i32) {
        let node = &self.nodes[id];
        let previous = node.z_index;
        if previous == z_index {
            return;
        }
        self.mark_render_updates(id, RENDER_UPDATE_MINOR);

        if previous != 0 && z_index != 0 {
            // Same context, new position in its list.
            let node = &mut self.nodes[id];
            node.z_index = z_index;
            node.z_index_resort = true;
            if let Some(z_parent) = node.z_parent {
                self.enable_z_sort(z_parent, false);
            }
            return;
        }

        let node = &self.nodes[id];
        let was_z_context = node.is_z_context();
        let parent = node.parent;
        if previous != 0 {
            self.set_z_parent(id, None);
        }
        self.nodes[id].z_index = z_index;
        if z_index != 0
            && let Some(parent) = parent
        {
            let context = self.find_z_context(parent);
            self.set_z_parent(id, Some(context));
        }

        if was_z_context != self.nodes[id].is_z_context() {
            if self.nodes[id].is_z_context() {
                let previous_context = parent.map(|p| self.find_z_context(p));
                self.enable_z_context(id, previous_context);
            } else {
                self.disable_z_context(id);
            }
        }
        self.nodes[id].z_index_resort = true;
    }

    /// Make a node a z-context even with a zero z-index.
    pub fn set_force_z_context(&mut self, id: NodeId, force: bool) {
        let node = &mut self.nodes[id];
        if node.force_z_context == force {
            return;
        }
        let was_z_context = node.is_z_context();
        node.force_z_context = force;
        let parent = node.parent;
        let is_z_context = node.is_z_context();
        if was_z_context != is_z_context {
            if is_z_context {
                let previous_context = parent.map(|p| self.find_z_context(p));
                self.enable_z_context(id, previous_context);
            } else {
                self.disable_z_context(id);
            }
            self.mark_render_updates(id, RENDER_UPDATE_MINOR);
        }
    }

    /// Move a z-indexed node from its current context to `z_parent`.
    pub(crate) fn set_z_parent(&mut self, id: NodeId, z_parent: Option<NodeId>) {
        let previous = self.nodes[id].z_parent;
        if previous == z_parent {
            return;
        }

        if let Some(old) = previous
            && let Some(context) = self.nodes.get_mut(old)
        {
            context.z_context_usage = context.z_context_usage.saturating_sub(1);
            if context.z_context_usage == 0 {
                context.z_indexed_children.clear();
                context.z_sort = false;
            } else {
                // The stale entry is only dropped by a sort.
                self.enable_z_sort(old, true);
            }
        }

        if let Some(new) = z_parent {
            let context = &mut self.nodes[new];
            context.z_context_usage += 1;
            context.z_indexed_children.push(id);
            self.enable_z_sort(new, false);
        }

        let node = &mut self.nodes[id];
        node.z_parent = z_parent;
        node.z_index_resort = true;
    }

    /// Request a sort of a context's list before it is next rendered.
    ///
    /// A forced sort also happens when the context is not reached by the
    /// render pass, so that stale entries do not linger in culled branches.
    pub(crate) fn enable_z_sort(&mut self, context: NodeId, force: bool) {
        let node = &mut self.nodes[context];
        if node.z_context_usage == 0 {
            return;
        }
        node.z_sort = true;
        if force && !self.forced_z_sorts.contains(&context) {
            self.forced_z_sorts.push(context);
        }
    }

    /// Z-indexed descendants registered with the context above `id`: the
    /// descent stops at nested z-contexts, which track their own.
    pub(crate) fn collect_z_region(&self, id: NodeId) -> Vec<NodeId> {
        let mut region = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            if node.z_index != 0 {
                region.push(current);
            } else if !node.is_z_context() {
                stack.extend(node.children.iter().rev());
            }
        }
        region
    }

    /// `id` became a z-context: take over the z-indexed descendants that
    /// were registered with `previous`.
    pub(crate) fn enable_z_context(&mut self, id: NodeId, previous: Option<NodeId>) {
        // Collected up front: moving entries mutates the lists being walked.
        let region = self.collect_z_region(id);
        if !region.is_empty() {
            log::trace!("{:?} takes over {} z-indexed nodes from {:?}", id, region.len(), previous);
        }
        for entry in region {
            debug_assert_eq!(
                self.nodes[entry].z_parent, previous,
                "z-indexed node {:?} registered with an unexpected context",
                entry
            );
            self.set_z_parent(entry, Some(id));
        }
    }

    /// `id` stopped being a z-context: hand its entries to the context above.
    pub(crate) fn disable_z_context(&mut self, id: NodeId) {
        let Some(parent) = self.nodes[id].parent else {
            debug_assert!(false, "{:?} without parent is always a z-context", id);
            return;
        };
        let target = self.find_z_context(parent);

        // Copied: set_z_parent pushes into and clears lists.
        let entries: Vec<NodeId> = self.nodes[id]
            .z_indexed_children
            .iter()
            .copied()
            .filter(|&entry| self.nodes.get(entry).is_some_and(|n| n.z_parent == Some(id)))
            .collect();
        if !entries.is_empty() {
            log::trace!("{:?} hands {} z-indexed nodes to {:?}", id, entries.len(), target);
        }
        for entry in entries {
            self.set_z_parent(entry, Some(target));
        }

        let node = &mut self.nodes[id];
        debug_assert_eq!(node.z_context_usage, 0, "z-context usage leaked on {:?}", id);
        node.z_indexed_children.clear();
        node.z_context_usage = 0;
        node.z_sort = false;
    }

    /// Re-register the z-indexed descendants of a non-context node that
    /// moved from one context to another.
    pub(crate) fn transfer_z_region(&mut self, id: NodeId, to: NodeId) {
        for entry in self.collect_z_region(id) {
            self.set_z_parent(entry, Some(to));
        }
    }

    /// Flag the z-indexed nodes in and below `id` for re-placement, e.g.
    /// after `id` moved among its siblings.
    pub(crate) fn flag_z_resort(&mut self, id: NodeId) {
        let node = &self.nodes[id];
        let entries = if node.z_index != 0 {
            vec![id]
        } else if node.is_z_context() {
            Vec::new()
        } else {
            self.collect_z_region(id)
        };
        for entry in entries {
            let node = &mut self.nodes[entry];
            node.z_index_resort = true;
            if let Some(z_parent) = node.z_parent {
                self.enable_z_sort(z_parent, true);
            }
        }
    }

    /// Bring a context's list up to date without a full sort.
    ///
    /// Entries that are still registered here and not flagged keep their
    /// relative order. Flagged entries are sorted by `(z_index, tree order)`
    /// and merged in with the same ordering. Entries that left the context
    /// are dropped, and an entry never appears twice.
    pub fn sort_z_indexed_children(&mut self, context: NodeId) {
        let list = std::mem::take(&mut self.nodes[context].z_indexed_children);
        let mut kept = Vec::with_capacity(list.len());
        let mut resort = Vec::new();
        for entry in list {
            let Some(node) = self.nodes.get(entry) else {
                continue;
            };
            if node.z_parent != Some(context) {
                continue;
            }
            if node.z_index_resort {
                resort.push(entry);
            } else {
                kept.push(entry);
            }
        }
        for &entry in &resort {
            self.nodes[entry].z_index_resort = false;
        }

        let nodes = &self.nodes;
        resort.sort_by(|&a, &b| z_order(nodes, a, b).then(a.cmp(&b)));
        resort.dedup();

        let mut merged = Vec::with_capacity(kept.len() + resort.len());
        let (mut i, mut j) = (0, 0);
        while i < kept.len() && j < resort.len() {
            if z_order(nodes, kept[i], resort[j]) != Ordering::Greater {
                push_unique(&mut merged, kept[i]);
                i += 1;
            } else {
                push_unique(&mut merged, resort[j]);
                j += 1;
            }
        }
        for &entry in kept[i..].iter().chain(&resort[j..]) {
            push_unique(&mut merged, entry);
        }

        let node = &mut self.nodes[context];
        node.z_indexed_children = merged;
        node.z_sort = false;
        self.stats.z_sorts += 1;
    }

    /// Sort the contexts queued for a forced sort.
    pub(crate) fn process_forced_z_sorts(&mut self) {
        for context in std::mem::take(&mut self.forced_z_sorts) {
            if self.nodes.get(context).is_some_and(|n| n.z_sort) {
                self.sort_z_indexed_children(context);
            }
        }
    }
}
