//! The scene graph facade: node arena, tree edits and the per-frame passes.

use crate::backend::{RenderTargetPool, TexturePool};
use crate::config::SceneConfig;
use crate::context::Context;
use crate::geometry::Rect;
use crate::node::{Node, OutOfBounds, ParentFrame, RecalcFlags, RenderFrame};
use crate::render_state::RenderSink;
use crate::stats::FrameStats;
use crate::texturizer::FULL_RENDER_UPDATE;
use crate::tree::{NodeId, Tree};

/// A tree of [`Node`]s with incremental update and render passes.
///
/// Nodes are addressed by [`NodeId`] handles. The root is created with the
/// graph, sized to the stage, and can neither be detached nor removed.
/// Created nodes stay detached until added below the root; only attached
/// nodes take part in [`update`](Self::update) and [`render`](Self::render).
pub struct SceneGraph {
    pub(crate) nodes: Tree,
    root: NodeId,
    config: SceneConfig,
    pub(crate) pool: Box<dyn RenderTargetPool>,
    pub(crate) stats: FrameStats,
    /// Tree-order counter of the running update pass.
    pub(crate) tree_order: u32,
    /// Z-contexts whose list must be sorted even if render does not reach them.
    pub(crate) forced_z_sorts: Vec<NodeId>,
}

impl SceneGraph {
    pub fn new(config: SceneConfig, pool: Box<dyn RenderTargetPool>) -> Self {
        let mut nodes = Tree::new();
        let root = nodes.insert(Node {
            is_root: true,
            enabled: true,
            w: config.width,
            h: config.height,
            dims_explicit: true,
            ..Node::new()
        });
        let mut graph = Self {
            nodes,
            root,
            config,
            pool,
            stats: FrameStats::default(),
            tree_order: 0,
            forced_z_sorts: Vec::new(),
        };
        graph.nodes[root].recalc_local_translate();
        graph.set_recalc(
            root,
            RecalcFlags::ALPHA | RecalcFlags::TRANSLATE | RecalcFlags::TRANSFORM,
        );
        log::debug!(
            "Scene graph created with a {}x{} stage",
            graph.config.width,
            graph.config.height
        );
        graph
    }

    /// A graph backed by a [`TexturePool`] built from `config.pool`.
    pub fn with_default_pool(config: SceneConfig) -> Self {
        let pool = TexturePool::new(config.pool);
        Self::new(config, Box::new(pool))
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Counters of the most recent frame.
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn pool(&self) -> &dyn RenderTargetPool {
        self.pool.as_ref()
    }

    pub fn pool_mut(&mut self) -> &mut dyn RenderTargetPool {
        self.pool.as_mut()
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    /// # Panics
    ///
    /// Panics if `id` was removed or belongs to another graph.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Resize the stage. The root follows and the root scissor is rebuilt
    /// on the next update.
    pub fn set_stage_size(&mut self, width: f32, height: f32) {
        self.config.width = width;
        self.config.height = height;
        let root = self.root;
        self.set_size(root, width, height);
        self.set_recalc(root, RecalcFlags::TRANSLATE);
    }
}

// Tree edits
impl SceneGraph {
    /// A new detached node with default properties.
    pub fn create_node(&mut self) -> NodeId {
        self.nodes.insert(Node::new())
    }

    /// Append `child` to `parent`, detaching it from its previous parent.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        let index = self.nodes[parent].children.len();
        self.insert_child_at(parent, child, index);
    }

    /// Insert `child` among the children of `parent` at `index` (clamped).
    ///
    /// # Panics
    ///
    /// Panics when `child` is the root or an ancestor of `parent`.
    pub fn insert_child_at(&mut self, parent: NodeId, child: NodeId, index: usize) {
        assert!(child != self.root, "the root node cannot be reparented");
        assert!(
            !self.is_ancestor_or_self(child, parent),
            "adding {:?} below {:?} would create a cycle",
            child,
            parent
        );

        let old_parent = self.nodes[child].parent;
        if old_parent == Some(parent) {
            if let Some(from) = self.child_index(parent, child) {
                let to = if index > from { index - 1 } else { index };
                self.move_child(parent, from, to);
            }
            return;
        }

        if let Some(old) = old_parent {
            self.nodes[old].children.retain(|&c| c != child);
        }
        let siblings = &mut self.nodes[parent].children;
        let index = index.min(siblings.len());
        siblings.insert(index, child);
        self.set_parent(child, Some(parent));
    }

    /// Move the child at `from` to position `to` among its siblings.
    pub fn move_child(&mut self, parent: NodeId, from: usize, to: usize) {
        let siblings = &mut self.nodes[parent].children;
        if from >= siblings.len() || from == to {
            return;
        }
        let child = siblings.remove(from);
        let to = to.min(siblings.len());
        siblings.insert(to, child);

        // Sibling order decides z ties: the affected entries need new slots.
        for sibling in self.nodes[parent].children.clone() {
            self.flag_z_resort(sibling);
        }
        self.mark_render_updates(parent, FULL_RENDER_UPDATE);
        self.set_recalc(child, RecalcFlags::ALPHA);
    }

    /// Detach `child` from its parent. The node and its subtree stay alive.
    pub fn detach(&mut self, child: NodeId) {
        assert!(child != self.root, "the root node cannot be detached");
        let Some(parent) = self.nodes[child].parent else {
            return;
        };
        self.nodes[parent].children.retain(|&c| c != child);
        self.set_parent(child, None);
    }

    /// Detach and drop `id` with its whole subtree. Render targets held by
    /// the subtree go back to the pool.
    pub fn remove(&mut self, id: NodeId) {
        assert!(id != self.root, "the root node cannot be removed");
        self.detach(id);

        let mut stack = vec![id];
        let mut removed = 0usize;
        while let Some(current) = stack.pop() {
            let Some(mut node) = self.nodes.remove(current) else {
                continue;
            };
            if let Some(texturizer) = node.texturizer.as_mut() {
                texturizer.release_render_texture(self.pool.as_mut());
            }
            stack.extend(node.children.iter().copied());
            removed += 1;
        }
        self.forced_z_sorts.retain(|&c| self.nodes.contains(c));
        log::debug!("Removed {:?} with {} nodes", id, removed);
    }

    fn child_index(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.nodes[parent].children.iter().position(|&c| c == child)
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == ancestor {
                return true;
            }
            current = self.nodes[cur].parent;
        }
        false
    }

    /// Rewire the parent link of a node whose sibling lists were already
    /// updated.
    fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) {
        let node = &self.nodes[child];
        let old_parent = node.parent;
        if old_parent == parent {
            return;
        }
        let was_z_context = node.is_z_context();
        let old_context = old_parent.map(|p| self.find_z_context(p));

        if let Some(old) = old_parent {
            self.mark_render_updates(old, FULL_RENDER_UPDATE);
            if self.nodes[old].has_flex_layout() {
                self.request_layout(old);
            }
        }

        self.nodes[child].parent = parent;
        let new_context = parent.map(|p| self.find_z_context(p));

        if self.nodes[child].z_index != 0 {
            self.set_z_parent(child, new_context);
        }
        let is_z_context = self.nodes[child].is_z_context();
        match (was_z_context, is_z_context) {
            (true, false) => self.disable_z_context(child),
            (false, true) => self.enable_z_context(child, old_context),
            (false, false) => {
                if let Some(to) = new_context
                    && old_context != new_context
                {
                    self.transfer_z_region(child, to);
                }
            }
            (true, true) => {}
        }

        match parent {
            Some(parent) => {
                self.flag_z_resort(child);
                let owner = if self.nodes[child].shader.is_some() {
                    Some(child)
                } else {
                    self.inherited_shader_owner(Some(parent))
                };
                self.set_shader_owner_recursive(child, owner);
                self.set_recalc(
                    child,
                    RecalcFlags::ALPHA | RecalcFlags::TRANSLATE | RecalcFlags::TRANSFORM,
                );
                if self.nodes[parent].has_flex_layout() {
                    self.request_layout(parent);
                }
            }
            None => {
                let owner = self.nodes[child].shader.is_some().then_some(child);
                self.set_shader_owner_recursive(child, owner);
                self.leave_bounds_margin(child);
            }
        }

        self.refresh_enabled(child);
    }

    /// Notify a detached subtree that it is no longer near the screen.
    fn leave_bounds_margin(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if node.within_bounds_margin {
            node.within_bounds_margin = false;
            self.notify_within_bounds_margin(id, false);
        }
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        for child in node.children.clone() {
            self.leave_bounds_margin(child);
        }
    }
}

// Frame passes
impl SceneGraph {
    /// Recompute contexts, scissors and culling for every node with pending
    /// changes.
    pub fn update(&mut self) {
        self.stats.reset();
        self.tree_order = 0;
        let frame = ParentFrame {
            world: Context::IDENTITY,
            render: None,
            scissor: Some(Rect::new(0.0, 0.0, self.config.width, self.config.height)),
            out_of_bounds: OutOfBounds::Visible,
            bounds_margin: self.config.bounds_margin,
            strict_bounds: self.config.strict_bounds,
            recalc: RecalcFlags::empty(),
            width: self.config.width,
            height: self.config.height,
        };
        let root = self.root;
        self.update_node(root, &frame);
    }

    /// Walk the visible tree and report draw state and quads to `sink`.
    /// Must follow an [`update`](Self::update).
    pub fn render(&mut self, sink: &mut dyn RenderSink) {
        self.process_forced_z_sorts();
        let mut frame = RenderFrame::new(sink);
        let root = self.root;
        self.render_node(root, &mut frame);
        self.stats.quads += frame.quads();
    }

    /// Update and render one frame and return its counters.
    pub fn frame(&mut self, sink: &mut dyn RenderSink) -> FrameStats {
        self.update();
        self.render(sink);
        self.stats.clone()
    }
}

// Coordinate queries
impl SceneGraph {
    pub fn world_context(&self, id: NodeId) -> Context {
        self.nodes[id].world
    }

    pub fn render_context(&self, id: NodeId) -> Context {
        self.nodes[id].render_context()
    }

    pub fn scissor(&self, id: NodeId) -> Option<Rect> {
        self.nodes[id].scissor
    }

    pub fn bbox(&self, id: NodeId) -> Rect {
        self.nodes[id].bbox
    }

    pub fn out_of_bounds(&self, id: NodeId) -> OutOfBounds {
        self.nodes[id].out_of_bounds
    }

    /// World-space corners: top-left, top-right, bottom-right, bottom-left.
    pub fn corner_points(&self, id: NodeId) -> [(f32, f32); 4] {
        let node = &self.nodes[id];
        node.world.corner_points(node.w, node.h)
    }

    /// Map a point in the node's local space to world space.
    pub fn world_coords(&self, id: NodeId, x: f32, y: f32) -> (f32, f32) {
        self.nodes[id].world.transform_point(x, y)
    }
}

impl std::fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneGraph")
            .field("root", &self.root)
            .field("nodes", &self.nodes.len())
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> SceneGraph {
        SceneGraph::with_default_pool(SceneConfig::default())
    }

    #[test]
    fn test_root_is_sized_to_stage() {
        let g = graph();
        let root = g.node(g.root());
        assert!(root.is_root());
        assert!(root.is_enabled());
        assert_eq!((root.w(), root.h()), (1920.0, 1080.0));
    }

    #[test]
    fn test_add_and_detach() {
        let mut g = graph();
        let root = g.root();
        let a = g.create_node();
        let b = g.create_node();
        g.add_child(root, a);
        g.add_child(a, b);
        assert_eq!(g.children(root), &[a]);
        assert_eq!(g.parent(b), Some(a));
        assert!(g.node(b).is_enabled());

        g.detach(a);
        assert_eq!(g.children(root), &[] as &[NodeId]);
        assert_eq!(g.parent(a), None);
        assert!(!g.node(a).is_enabled());
        assert!(!g.node(b).is_enabled());
    }

    #[test]
    fn test_insert_child_at_and_move() {
        let mut g = graph();
        let root = g.root();
        let [a, b, c] = [g.create_node(), g.create_node(), g.create_node()];
        g.add_child(root, a);
        g.add_child(root, c);
        g.insert_child_at(root, b, 1);
        assert_eq!(g.children(root), &[a, b, c]);

        g.move_child(root, 0, 2);
        assert_eq!(g.children(root), &[b, c, a]);

        // Re-inserting under the same parent moves instead of duplicating.
        g.insert_child_at(root, a, 0);
        assert_eq!(g.children(root), &[a, b, c]);
    }

    #[test]
    fn test_reparent_moves_between_parents() {
        let mut g = graph();
        let root = g.root();
        let [a, b, c] = [g.create_node(), g.create_node(), g.create_node()];
        g.add_child(root, a);
        g.add_child(root, b);
        g.add_child(a, c);
        g.add_child(b, c);
        assert!(g.children(a).is_empty());
        assert_eq!(g.children(b), &[c]);
        assert_eq!(g.parent(c), Some(b));
    }

    #[test]
    #[should_panic(expected = "cycle")]
    fn test_cycle_is_rejected() {
        let mut g = graph();
        let root = g.root();
        let a = g.create_node();
        let b = g.create_node();
        g.add_child(root, a);
        g.add_child(a, b);
        g.add_child(b, a);
    }

    #[test]
    #[should_panic(expected = "root")]
    fn test_root_cannot_be_detached() {
        let mut g = graph();
        let root = g.root();
        g.detach(root);
    }

    #[test]
    fn test_remove_drops_subtree() {
        let mut g = graph();
        let root = g.root();
        let a = g.create_node();
        let b = g.create_node();
        g.add_child(root, a);
        g.add_child(a, b);
        assert_eq!(g.len(), 3);

        g.remove(a);
        assert_eq!(g.len(), 1);
        assert!(!g.contains(a));
        assert!(!g.contains(b));
        assert!(g.children(root).is_empty());
    }

    #[test]
    fn test_world_coords_follow_position() {
        let mut g = graph();
        let root = g.root();
        let a = g.create_node();
        g.add_child(root, a);
        g.set_position(a, 100.0, 50.0);
        g.set_size(a, 10.0, 10.0);
        g.update();

        assert_eq!(g.world_coords(a, 1.0, 2.0), (101.0, 52.0));
        assert_eq!(
            g.corner_points(a),
            [(100.0, 50.0), (110.0, 50.0), (110.0, 60.0), (100.0, 60.0)]
        );
        assert_eq!(g.bbox(a), Rect::new(100.0, 50.0, 10.0, 10.0));
    }

    #[test]
    fn test_unchanged_frame_skips_subtrees() {
        let mut g = graph();
        let root = g.root();
        let a = g.create_node();
        let b = g.create_node();
        g.add_child(root, a);
        g.add_child(a, b);
        g.update();
        assert_eq!(g.stats().nodes_updated, 3);

        g.update();
        assert_eq!(g.stats().nodes_updated, 0);
        assert_eq!(g.stats().nodes_skipped, 1);
    }

    #[test]
    fn test_stage_resize_rebuilds_root_scissor() {
        let mut g = graph();
        g.update();
        g.set_stage_size(800.0, 600.0);
        g.update();
        let root = g.root();
        assert_eq!(g.scissor(root), Some(Rect::new(0.0, 0.0, 800.0, 600.0)));
    }
}
