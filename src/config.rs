use crate::backend::TexturePoolConfig;
use crate::geometry::{BoundsMargin, DEFAULT_BOUNDS_MARGIN};

/// Configuration for a [`SceneGraph`](crate::SceneGraph).
///
/// # Example
///
/// ```
/// use strata::SceneConfig;
///
/// let config = SceneConfig::default()
///     .with_stage_size(1280.0, 720.0)
///     .with_strict_bounds(false);
/// assert_eq!(config.width, 1280.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SceneConfig {
    /// Stage width; the root node and the root scissor take this size.
    pub width: f32,
    /// Stage height.
    pub height: f32,
    /// Margin used by nodes without an ancestor override.
    pub bounds_margin: BoundsMargin,
    /// Cull nodes that are outside the margin-expanded scissor even when
    /// their bounds are not opaque.
    pub strict_bounds: bool,
    /// Limits for the default render-target pool.
    pub pool: TexturePoolConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
            bounds_margin: BoundsMargin::uniform(DEFAULT_BOUNDS_MARGIN),
            strict_bounds: true,
            pool: TexturePoolConfig::default(),
        }
    }
}

impl SceneConfig {
    pub fn with_stage_size(mut self, width: f32, height: f32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_bounds_margin(mut self, margin: BoundsMargin) -> Self {
        self.bounds_margin = margin;
        self
    }

    pub fn with_strict_bounds(mut self, strict: bool) -> Self {
        self.strict_bounds = strict;
        self
    }

    pub fn with_pool(mut self, pool: TexturePoolConfig) -> Self {
        self.pool = pool;
        self
    }
}
