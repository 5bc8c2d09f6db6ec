/// Convenience result type used across the scene graph.
pub type SceneResult<T> = Result<T, SceneError>;

/// Recoverable failures surfaced by the scene graph.
///
/// Broken tree invariants are not represented here; they panic.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The render-target pool could not provide a target.
    #[error("failed to allocate {width}x{height} render target: {reason}")]
    RenderTargetAllocation {
        width: u32,
        height: u32,
        reason: String,
    },

    /// A render target was requested without any area.
    #[error("invalid render target size {width}x{height}")]
    InvalidRenderTargetSize { width: u32, height: u32 },
}

impl SceneError {
    /// Build a [`SceneError::RenderTargetAllocation`] value.
    pub fn allocation(width: u32, height: u32, reason: impl Into<String>) -> Self {
        Self::RenderTargetAllocation {
            width,
            height,
            reason: reason.into(),
        }
    }

    /// Whether retrying on a later frame may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RenderTargetAllocation { .. })
    }
}
