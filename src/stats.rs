//! Per-frame counters for debugging and performance analysis.
//!
//! Counters are reset at the start of every [`SceneGraph::update`] and keep
//! accumulating through the following render, so a snapshot taken after
//! [`SceneGraph::frame`] describes exactly one frame.
//!
//! [`SceneGraph::update`]: crate::SceneGraph::update
//! [`SceneGraph::frame`]: crate::SceneGraph::frame

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrameStats {
    /// Nodes whose computed state was refreshed.
    pub nodes_updated: u64,
    /// Nodes visited but left untouched.
    pub nodes_skipped: u64,
    /// Nodes with a pending margin callback that required a second pass.
    pub margin_redos: u64,
    /// Draw quads submitted to the sink.
    pub quads: u64,
    /// Offscreen passes opened.
    pub render_texture_passes: u64,
    /// Render-to-texture nodes that presented their previous result.
    pub cached_passes: u64,
    /// Render targets that could not be allocated.
    pub allocation_failures: u64,
    /// Z-indexed lists re-sorted.
    pub z_sorts: u64,
}

impl FrameStats {
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
