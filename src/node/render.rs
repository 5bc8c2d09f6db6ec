//! The render pass.

use super::OutOfBounds;
use crate::context::Context;
use crate::geometry::Color;
use crate::render_state::{Quad, RenderSink, RenderTextureInfo, RenderTextureOutcome, ShaderId};
use crate::scene::SceneGraph;
use crate::texture::{QuadTexture, ResultTexture, Texture};
use crate::texturizer::FULL_RENDER_UPDATE;
use crate::tree::NodeId;

/// An offscreen pass that is currently collecting quads.
#[derive(Debug)]
struct OpenPass {
    node: NodeId,
    width: f32,
    height: f32,
    empty: bool,
    /// Output the pass can borrow instead of being drawn, while its only
    /// quad is a plain copy of that output.
    reusable: Option<ResultTexture>,
}

/// Render-state tracking for one render pass.
pub(crate) struct RenderFrame<'a> {
    sink: &'a mut dyn RenderSink,
    passes: Vec<OpenPass>,
    shader: Option<ShaderId>,
    /// An enclosing render-to-texture node caches its result this frame.
    is_caching_texturizer: bool,
    quads: u64,
}

impl<'a> RenderFrame<'a> {
    pub(crate) fn new(sink: &'a mut dyn RenderSink) -> Self {
        Self {
            sink,
            passes: Vec::new(),
            shader: None,
            is_caching_texturizer: false,
            quads: 0,
        }
    }

    pub(crate) fn quads(&self) -> u64 {
        self.quads
    }

    fn set_shader(&mut self, shader: Option<ShaderId>, owner: Option<NodeId>) {
        self.shader = shader;
        self.sink.set_shader(shader, owner);
    }

    /// Submit a quad. `source` is the result handle the quad's target was
    /// resolved from, if any.
    fn add_quad(&mut self, quad: Quad, source: Option<&ResultTexture>) {
        if let Some(pass) = self.passes.last_mut() {
            let first = pass.empty && self.shader.is_none();
            pass.reusable = match (quad.texture, source) {
                (QuadTexture::Target(target), Some(source))
                    if first
                        && quad.is_plain_copy(pass.width, pass.height)
                        && source.target() == Some(target) =>
                {
                    Some(source.clone())
                }
                _ => None,
            };
            pass.empty = false;
        }
        self.quads += 1;
        self.sink.add_quad(quad);
    }
}

impl SceneGraph {
    pub(crate) fn render_node(&mut self, id: NodeId, frame: &mut RenderFrame<'_>) {
        if self.nodes[id].z_sort {
            self.sort_z_indexed_children(id);
        }

        let node = &mut self.nodes[id];
        if node.out_of_bounds == OutOfBounds::Culled {
            return;
        }
        let has_render_updates = std::mem::take(&mut node.has_render_updates);
        if node.render_context().alpha <= 0.0 {
            return;
        }

        if node.use_render_to_texture {
            self.render_advanced(id, has_render_updates, frame);
        } else {
            self.render_simple(id, frame);
        }
    }

    fn render_simple(&mut self, id: NodeId, frame: &mut RenderFrame<'_>) {
        let node = &self.nodes[id];
        if node.out_of_bounds == OutOfBounds::Visible
            && let Some(quad) = self.own_quad(id, node.render_context())
        {
            let scissor = node.scissor;
            frame.set_shader(self.active_shader(id), node.shader_owner);
            frame.sink.set_scissor(scissor);
            frame.add_quad(quad, self.displayed_result(id));
        }

        // A lazy texturizer switched itself off because its content was
        // changing. Revisit the node next frame to see whether it settled.
        if self.nodes[id]
            .texturizer
            .as_ref()
            .is_some_and(|t| t.enabled && t.lazy)
        {
            self.set_has_updates(id);
        }

        self.render_children(id, frame);
    }

    fn render_advanced(&mut self, id: NodeId, has_render_updates: u8, frame: &mut RenderFrame<'_>) {
        let node = &mut self.nodes[id];
        let (width, height) = (node.w, node.h);
        if width <= 0.0 || height <= 0.0 {
            return;
        }
        let Some(texturizer) = node.texturizer.as_mut() else {
            debug_assert!(false, "{:?} renders to texture without a texturizer", id);
            return;
        };

        let must_render_children =
            !texturizer.has_render_texture() || has_render_updates >= FULL_RENDER_UPDATE;
        let was_caching = frame.is_caching_texturizer;
        // Presenting an unchanged result can always use the backend cache.
        let mut cache = true;

        if must_render_children {
            self.stats.render_texture_passes += 1;
            let has_result = texturizer.has_result_texture();
            cache = has_result
                && (has_render_updates < FULL_RENDER_UPDATE || !frame.is_caching_texturizer);
            if cache {
                frame.is_caching_texturizer = true;
            }
            if !has_result {
                // Nobody depends on the previous content; give the target
                // back before descendants allocate theirs.
                texturizer.release_render_texture(self.pool.as_mut());
            }

            frame.set_shader(None, Some(id));
            frame.passes.push(OpenPass {
                node: id,
                width,
                height,
                empty: true,
                reusable: None,
            });
            frame.sink.start_render_texture(RenderTextureInfo {
                node: id,
                width,
                height,
                cache,
            });
            frame.sink.set_scissor(None);
            if let Some(quad) = self.own_quad(id, Context::IDENTITY) {
                frame.add_quad(quad, self.displayed_result(id));
            }

            log::trace!("{:?} rendering {}x{} offscreen", id, width, height);
            self.render_children(id, frame);
            cache = self.finish_render_texture(id, frame, cache);
        } else {
            self.stats.cached_passes += 1;
        }

        let node = &self.nodes[id];
        let Some(texturizer) = node.texturizer.as_ref() else {
            return;
        };
        if !texturizer.is_empty()
            && !texturizer.render_offscreen()
            && node.out_of_bounds == OutOfBounds::Visible
            && let Some(target) = texturizer.render_texture()
        {
            let colors = if texturizer.colorize() {
                node.colors
            } else {
                [Color::WHITE; 4]
            };
            let quad = Quad {
                node: id,
                context: node.render_context(),
                width,
                height,
                texture: QuadTexture::Target(target),
                colors,
                result: true,
            };
            let scissor = node.scissor;
            frame.set_shader(self.active_shader(id), Some(id));
            frame.sink.set_scissor(scissor);
            frame.sink.set_texturizer(Some(id), cache);
            frame.add_quad(quad, texturizer.result());
            frame.sink.set_texturizer(None, false);
        }

        frame.is_caching_texturizer = was_caching;
    }

    /// Close the pass opened by `id` and decide what backs its result.
    /// Returns whether the backend may cache the result.
    fn finish_render_texture(&mut self, id: NodeId, frame: &mut RenderFrame<'_>, cache: bool) -> bool {
        let pass = frame.passes.pop();
        debug_assert!(
            pass.as_ref().is_some_and(|p| p.node == id),
            "unbalanced render texture passes"
        );
        let Some(pass) = pass else {
            return false;
        };

        let node = &mut self.nodes[id];
        let Some(texturizer) = node.texturizer.as_mut() else {
            return false;
        };
        let pool = self.pool.as_mut();
        let mut cache = cache;

        let outcome = if pass.empty {
            texturizer.empty = true;
            texturizer.release_render_texture(pool);
            RenderTextureOutcome::Empty
        } else if let Some(source) = pass.reusable.filter(|s| texturizer.can_reuse(s))
            && let Some(target) = source.target()
        {
            texturizer.empty = false;
            texturizer.reuse_texture_as_render_texture(source, pool);
            RenderTextureOutcome::Reused(target)
        } else {
            texturizer.empty = false;
            let w = pass.width.ceil() as u32;
            let h = pass.height.ceil() as u32;
            // Quads must be drawn into an owned target of the right size.
            if texturizer.render_texture_reused()
                || texturizer
                    .render_texture()
                    .is_some_and(|t| t.width != w || t.height != h)
            {
                texturizer.release_render_texture(pool);
            }
            match texturizer.get_render_texture(pool, w, h) {
                Ok(target) => RenderTextureOutcome::Rendered(target),
                Err(err) => {
                    log::warn!("Skipping render to texture of {:?}: {}", id, err);
                    texturizer.empty = true;
                    node.has_render_updates = FULL_RENDER_UPDATE;
                    cache = false;
                    self.stats.allocation_failures += 1;
                    RenderTextureOutcome::Failed
                }
            }
        };
        frame.sink.finish_render_texture(outcome);

        if !texturizer.empty {
            texturizer.result_texture();
            texturizer.update_result_texture();
        }
        cache
    }

    fn render_children(&mut self, id: NodeId, frame: &mut RenderFrame<'_>) {
        let node = &self.nodes[id];
        let children = node.children.clone();
        if node.z_context_usage > 0 && !node.z_indexed_children.is_empty() {
            let sorted = node.z_indexed_children.clone();
            let split = sorted
                .iter()
                .position(|&c| self.nodes[c].z_index > 0)
                .unwrap_or(sorted.len());
            for &child in &sorted[..split] {
                self.render_node(child, frame);
            }
            self.render_plain_children(&children, frame);
            for &child in &sorted[split..] {
                self.render_node(child, frame);
            }
        } else {
            self.render_plain_children(&children, frame);
        }
    }

    /// Children in tree order, leaving out the ones drawn by a z-context.
    fn render_plain_children(&mut self, children: &[NodeId], frame: &mut RenderFrame<'_>) {
        for &child in children {
            if self.nodes[child].z_index == 0 {
                self.render_node(child, frame);
            }
        }
    }

    /// Quad for the node's own texture, if it has anything to show.
    fn own_quad(&self, id: NodeId, context: Context) -> Option<Quad> {
        let node = &self.nodes[id];
        let texture = node.texture.as_ref()?.resolve()?;
        Some(Quad {
            node: id,
            context,
            width: node.w,
            height: node.h,
            texture,
            colors: node.colors,
            result: false,
        })
    }

    /// The result handle behind the node's own texture, when it displays
    /// another node's output.
    fn displayed_result(&self, id: NodeId) -> Option<&ResultTexture> {
        match self.nodes[id].texture.as_ref()? {
            Texture::Result(result) => Some(result),
            Texture::Image { .. } => None,
        }
    }
}
