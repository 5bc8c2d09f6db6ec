//! Textures displayed by nodes.
//!
//! Decoding and uploading images is the embedder's job; the scene graph only
//! carries opaque [`TextureId`]s and their pixel size. The one texture kind it
//! produces itself is a [`ResultTexture`]: the output of a node that renders
//! its subtree to an offscreen target.

use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::RenderTargetRef;

/// Opaque handle to an uploaded texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

#[derive(Debug, Default)]
enum Backing {
    #[default]
    Empty,
    Target(RenderTargetRef),
    /// Output borrowed from another texturizer; resolved on every read.
    Alias(ResultTexture),
}

/// Stable indirection to a texturizer's current render target.
///
/// Nodes that display another node's offscreen result hold a clone of this
/// handle. When the texturizer reallocates or releases its target only the
/// shared backing changes, so holders never need to be told. A texturizer
/// that borrows another one's target aliases that one's handle, so a release
/// by the owner empties every borrower at once.
#[derive(Clone, Debug, Default)]
pub struct ResultTexture {
    backing: Rc<RefCell<Backing>>,
}

impl ResultTexture {
    pub fn new() -> Self {
        Self::default()
    }

    /// The render target currently backing this texture, if any.
    pub fn target(&self) -> Option<RenderTargetRef> {
        match &*self.backing.borrow() {
            Backing::Empty => None,
            Backing::Target(target) => Some(*target),
            Backing::Alias(source) => source.target(),
        }
    }

    pub(crate) fn set_target(&self, target: Option<RenderTargetRef>) {
        *self.backing.borrow_mut() = match target {
            Some(target) => Backing::Target(target),
            None => Backing::Empty,
        };
    }

    /// Follow `source` instead of holding a target of our own.
    pub(crate) fn set_alias(&self, source: ResultTexture) {
        debug_assert!(!source.resolves_through(self), "result texture alias cycle");
        *self.backing.borrow_mut() = Backing::Alias(source);
    }

    /// Whether resolving this handle reads `other`, directly or through
    /// aliases.
    pub fn resolves_through(&self, other: &ResultTexture) -> bool {
        if self.same_as(other) {
            return true;
        }
        match &*self.backing.borrow() {
            Backing::Alias(source) => source.resolves_through(other),
            _ => false,
        }
    }

    /// Whether both handles share the same backing slot.
    pub fn same_as(&self, other: &ResultTexture) -> bool {
        Rc::ptr_eq(&self.backing, &other.backing)
    }
}

/// What a node draws for itself.
#[derive(Clone, Debug)]
pub enum Texture {
    /// An uploaded image with its pixel size.
    Image {
        id: TextureId,
        width: f32,
        height: f32,
    },
    /// Another node's render-to-texture output.
    Result(ResultTexture),
}

impl Texture {
    pub fn image(id: TextureId, width: f32, height: f32) -> Self {
        Self::Image { id, width, height }
    }

    /// Pixel size, when known.
    pub fn size(&self) -> Option<(f32, f32)> {
        match self {
            Texture::Image { width, height, .. } => Some((*width, *height)),
            Texture::Result(result) => result
                .target()
                .map(|t| (t.width as f32, t.height as f32)),
        }
    }

    /// Resolve to something drawable right now.
    pub fn resolve(&self) -> Option<QuadTexture> {
        match self {
            Texture::Image { id, .. } => Some(QuadTexture::Image(*id)),
            Texture::Result(result) => result.target().map(QuadTexture::Target),
        }
    }
}

/// Texture as seen by a single draw submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuadTexture {
    Image(TextureId),
    Target(RenderTargetRef),
}
