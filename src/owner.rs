use crate::scene::SceneGraph;
use crate::tree::NodeId;

/// Upward notifications from a node to the logic that owns it.
///
/// This is the only way the scene graph calls back into higher level code,
/// typically to start or cancel resource loading. Every method has a no-op
/// default so owners implement only what they care about.
///
/// The owner is taken out of its node for the duration of the call, so the
/// graph may be mutated freely, including the node itself.
pub trait NodeOwner {
    /// The node became enabled (attached, visible, under an enabled parent)
    /// or stopped being so.
    fn on_enabled_changed(&mut self, _graph: &mut SceneGraph, _node: NodeId, _enabled: bool) {}

    /// The node entered (`true`) or left the margin-expanded scissor.
    fn on_within_bounds_margin(&mut self, _graph: &mut SceneGraph, _node: NodeId, _within: bool) {}

    /// Width or height changed.
    fn on_dimensions_changed(
        &mut self,
        _graph: &mut SceneGraph,
        _node: NodeId,
        _width: f32,
        _height: f32,
    ) {
    }
}

impl SceneGraph {
    /// Run `f` with the node's owner temporarily detached from the node.
    pub(crate) fn with_owner(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut dyn NodeOwner, &mut SceneGraph),
    ) {
        let Some(mut owner) = self.nodes.get_mut(id).and_then(|n| n.owner.take()) else {
            return;
        };
        f(owner.as_mut(), self);
        // The callback may have removed the node or installed another owner.
        if let Some(node) = self.nodes.get_mut(id)
            && node.owner.is_none()
        {
            node.owner = Some(owner);
        }
    }

    pub(crate) fn notify_within_bounds_margin(&mut self, id: NodeId, within: bool) {
        log::trace!("{:?} within bounds margin: {}", id, within);
        self.with_owner(id, |owner, graph| {
            owner.on_within_bounds_margin(graph, id, within)
        });
    }

    pub(crate) fn notify_enabled_changed(&mut self, id: NodeId, enabled: bool) {
        self.with_owner(id, |owner, graph| owner.on_enabled_changed(graph, id, enabled));
    }

    pub(crate) fn notify_dimensions_changed(&mut self, id: NodeId, width: f32, height: f32) {
        self.with_owner(id, |owner, graph| {
            owner.on_dimensions_changed(graph, id, width, height)
        });
    }
}
