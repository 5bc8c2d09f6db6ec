//! Draw submissions and the sink that receives them.
//!
//! The scene graph does not batch or execute anything. During
//! [`SceneGraph::render`](crate::SceneGraph::render) it walks the visible
//! tree and reports state changes and quads to a [`RenderSink`], in the
//! order a backend must replay them.

use crate::backend::RenderTargetRef;
use crate::context::Context;
use crate::geometry::{Color, Rect};
use crate::texture::QuadTexture;
use crate::tree::NodeId;

/// Opaque shader handle. `None` wherever a shader is expected means the
/// backend's default shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u32);

/// A single textured quad.
#[derive(Clone, Debug, PartialEq)]
pub struct Quad {
    pub node: NodeId,
    /// Transform and alpha in the coordinate space of the active target.
    pub context: Context,
    pub width: f32,
    pub height: f32,
    pub texture: QuadTexture,
    /// Corner colors: top-left, top-right, bottom-left, bottom-right.
    pub colors: [Color; 4],
    /// Presents a render-to-texture result rather than the node's own texture.
    pub result: bool,
}

impl Quad {
    /// Whether the quad copies `width`×`height` texels of a render target
    /// unchanged onto a target of the same size.
    pub(crate) fn is_plain_copy(&self, width: f32, height: f32) -> bool {
        let QuadTexture::Target(target) = self.texture else {
            return false;
        };
        target.width as f32 == width
            && target.height as f32 == height
            && self.width == width
            && self.height == height
            && self.context.is_identity()
            && self.context.alpha >= 1.0
            && self.colors.iter().all(Color::is_white)
    }
}

/// Opening parameters of an offscreen pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderTextureInfo {
    pub node: NodeId,
    pub width: f32,
    pub height: f32,
    /// The backend may keep the result around for the next frame.
    pub cache: bool,
}

/// How an offscreen pass ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderTextureOutcome {
    /// The recorded quads are to be drawn into this target.
    Rendered(RenderTargetRef),
    /// The pass held a single plain copy of this target; nothing needs drawing.
    Reused(RenderTargetRef),
    /// Nothing was drawn.
    Empty,
    /// No target could be allocated; the pass must be discarded.
    Failed,
}

/// Receiver of render-state changes and draw submissions.
pub trait RenderSink {
    fn set_shader(&mut self, shader: Option<ShaderId>, owner: Option<NodeId>);

    /// `None` disables scissoring.
    fn set_scissor(&mut self, scissor: Option<Rect>);

    /// Bind the texturizer of `node` for the next quads. `cache` allows the
    /// backend to keep filtered results of that texturizer.
    fn set_texturizer(&mut self, node: Option<NodeId>, cache: bool);

    fn add_quad(&mut self, quad: Quad);

    /// Subsequent quads go to an offscreen target until the matching
    /// [`RenderSink::finish_render_texture`].
    fn start_render_texture(&mut self, info: RenderTextureInfo);

    fn finish_render_texture(&mut self, outcome: RenderTextureOutcome);
}

/// Every call made on a [`RecordingSink`].
#[derive(Clone, Debug, PartialEq)]
pub enum RenderCommand {
    SetShader {
        shader: Option<ShaderId>,
        owner: Option<NodeId>,
    },
    SetScissor(Option<Rect>),
    SetTexturizer {
        node: Option<NodeId>,
        cache: bool,
    },
    Quad(Quad),
    StartRenderTexture(RenderTextureInfo),
    FinishRenderTexture(RenderTextureOutcome),
}

/// Sink that keeps a log of everything it is told. Used by tests and for
/// debugging frame output.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub commands: Vec<RenderCommand>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn quads(&self) -> impl Iterator<Item = &Quad> {
        self.commands.iter().filter_map(|c| match c {
            RenderCommand::Quad(q) => Some(q),
            _ => None,
        })
    }

    /// Nodes of all submitted quads, in submission order.
    pub fn quad_nodes(&self) -> Vec<NodeId> {
        self.quads().map(|q| q.node).collect()
    }

    pub fn render_texture_outcomes(&self) -> Vec<RenderTextureOutcome> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                RenderCommand::FinishRenderTexture(outcome) => Some(*outcome),
                _ => None,
            })
            .collect()
    }
}

impl RenderSink for RecordingSink {
    fn set_shader(&mut self, shader: Option<ShaderId>, owner: Option<NodeId>) {
        self.commands.push(RenderCommand::SetShader { shader, owner });
    }

    fn set_scissor(&mut self, scissor: Option<Rect>) {
        self.commands.push(RenderCommand::SetScissor(scissor));
    }

    fn set_texturizer(&mut self, node: Option<NodeId>, cache: bool) {
        self.commands.push(RenderCommand::SetTexturizer { node, cache });
    }

    fn add_quad(&mut self, quad: Quad) {
        self.commands.push(RenderCommand::Quad(quad));
    }

    fn start_render_texture(&mut self, info: RenderTextureInfo) {
        self.commands.push(RenderCommand::StartRenderTexture(info));
    }

    fn finish_render_texture(&mut self, outcome: RenderTextureOutcome) {
        self.commands.push(RenderCommand::FinishRenderTexture(outcome));
    }
}
