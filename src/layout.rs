//! Hooks for size and position computed outside the node itself.

use crate::scene::SceneGraph;
use crate::tree::NodeId;

/// External flex layout engine attached to a node.
///
/// The scene graph never lays anything out on its own. When a node carrying
/// an enabled layout has the layout bit set, the update pass hands the
/// subtree to [`FlexLayout::layout_flex_tree`], which is expected to write
/// positions and sizes back through the regular setters.
pub trait FlexLayout {
    fn is_enabled(&self) -> bool;

    fn layout_flex_tree(&mut self, graph: &mut SceneGraph, node: NodeId);

    /// Width as specified by the user, before layout stretched or shrank it.
    fn original_width(&self) -> f32;

    /// Height as specified by the user.
    fn original_height(&self) -> f32;
}

/// Position or size derived from the parent's size: `f(parent_w, parent_h)`.
pub type RelativeFn = Box<dyn Fn(f32, f32) -> f32>;

/// Relative functions for each of the four box properties.
#[derive(Default)]
pub struct RelativeFunctions {
    pub x: Option<RelativeFn>,
    pub y: Option<RelativeFn>,
    pub w: Option<RelativeFn>,
    pub h: Option<RelativeFn>,
}

impl RelativeFunctions {
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.w.is_none() && self.h.is_none()
    }
}

impl std::fmt::Debug for RelativeFunctions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelativeFunctions")
            .field("x", &self.x.is_some())
            .field("y", &self.y.is_some())
            .field("w", &self.w.is_some())
            .field("h", &self.h.is_some())
            .finish()
    }
}
