//! Offscreen render target management for render-to-texture nodes.

use crate::backend::{RenderTarget, RenderTargetPool, RenderTargetRef};
use crate::error::SceneResult;
use crate::texture::ResultTexture;

/// Invalidation level at which a node's offscreen content is considered
/// fully stale.
pub const FULL_RENDER_UPDATE: u8 = 3;

/// Who is responsible for returning the current target to the pool.
#[derive(Debug, Default)]
enum RenderTextureSlot {
    #[default]
    None,
    /// Allocated by this texturizer; released by it.
    Owned(RenderTarget),
    /// Another texturizer's output, borrowed for reading. Never released
    /// here, and empty as soon as the owner lets go of its target.
    Reused(ResultTexture),
}

impl RenderTextureSlot {
    fn target(&self) -> Option<RenderTargetRef> {
        match self {
            RenderTextureSlot::None => None,
            RenderTextureSlot::Owned(target) => Some(target.target_ref()),
            RenderTextureSlot::Reused(source) => source.target(),
        }
    }

    fn bind(&self, result: &ResultTexture) {
        match self {
            RenderTextureSlot::Reused(source) => result.set_alias(source.clone()),
            _ => result.set_target(self.target()),
        }
    }
}

/// Per-node render-to-texture state.
#[derive(Debug, Default)]
pub struct Texturizer {
    pub(crate) enabled: bool,
    /// Only render offscreen while the content is static.
    pub(crate) lazy: bool,
    /// Apply the node's corner colors to the result quad.
    pub(crate) colorize: bool,
    /// Build the target but never composite it into the parent.
    pub(crate) render_offscreen: bool,
    /// The last pass drew nothing.
    pub(crate) empty: bool,
    slot: RenderTextureSlot,
    result: Option<ResultTexture>,
}

impl Texturizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn colorize(&self) -> bool {
        self.colorize
    }

    pub fn render_offscreen(&self) -> bool {
        self.render_offscreen
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Whether this frame should go through an offscreen pass.
    ///
    /// Lazy texturizers only kick in once the owner's content stopped
    /// changing, so that animating content is not cached every frame.
    pub fn must_render_to_texture(&self, has_render_updates: u8) -> bool {
        if !self.enabled {
            return false;
        }
        !self.lazy || has_render_updates < FULL_RENDER_UPDATE
    }

    pub fn has_render_texture(&self) -> bool {
        self.slot.target().is_some()
    }

    /// The current target is borrowed from another node.
    pub fn render_texture_reused(&self) -> bool {
        matches!(self.slot, RenderTextureSlot::Reused(_))
    }

    /// Current render target, owned or borrowed.
    pub fn render_texture(&self) -> Option<RenderTargetRef> {
        self.slot.target()
    }

    /// Allocate a target if none is held. Idempotent while one is held.
    pub fn get_render_texture(
        &mut self,
        pool: &mut dyn RenderTargetPool,
        width: u32,
        height: u32,
    ) -> SceneResult<RenderTargetRef> {
        if let Some(target) = self.slot.target() {
            return Ok(target);
        }
        let target = pool.allocate(width, height)?;
        let target_ref = target.target_ref();
        self.slot = RenderTextureSlot::Owned(target);
        Ok(target_ref)
    }

    /// Give up the current target. Owned targets go back to the pool,
    /// borrowed ones are just forgotten.
    pub fn release_render_texture(&mut self, pool: &mut dyn RenderTargetPool) {
        match std::mem::take(&mut self.slot) {
            RenderTextureSlot::None => return,
            RenderTextureSlot::Owned(target) => {
                log::trace!("Releasing render target #{}", target.id());
                pool.release(target);
            }
            RenderTextureSlot::Reused(_) => {}
        }
        self.update_result_texture();
    }

    /// Whether `source` can be borrowed without reading back our own output.
    pub fn can_reuse(&self, source: &ResultTexture) -> bool {
        self.result
            .as_ref()
            .is_none_or(|own| !source.resolves_through(own))
    }

    /// Point at another texturizer's output instead of rendering a copy.
    pub fn reuse_texture_as_render_texture(
        &mut self,
        source: ResultTexture,
        pool: &mut dyn RenderTargetPool,
    ) {
        if let RenderTextureSlot::Reused(current) = &self.slot
            && current.same_as(&source)
        {
            return;
        }
        self.release_render_texture(pool);
        self.slot = RenderTextureSlot::Reused(source);
    }

    pub fn has_result_texture(&self) -> bool {
        self.result.is_some()
    }

    /// The output handle, if one was handed out or created by a pass.
    pub fn result(&self) -> Option<&ResultTexture> {
        self.result.as_ref()
    }

    /// Stable handle to this texturizer's output, created on first use.
    pub fn result_texture(&mut self) -> ResultTexture {
        self.result
            .get_or_insert_with(|| {
                let result = ResultTexture::new();
                self.slot.bind(&result);
                result
            })
            .clone()
    }

    /// Re-point the result handle at the current backing target.
    pub fn update_result_texture(&self) {
        if let Some(result) = &self.result {
            self.slot.bind(result);
        }
    }
}
