//! The scene-graph element.
//!
//! A [`Node`] is plain data stored in the [`Tree`](crate::tree::Tree) arena.
//! All behaviour that needs to look at other nodes (dirty propagation, the
//! update and render passes, z-context bookkeeping) lives on
//! [`SceneGraph`](crate::SceneGraph) and is split across the submodules:
//!
//! - `properties`: setters and the dirty-flag plumbing they trigger
//! - `update`: the per-frame context, scissor and culling computation
//! - `zindex`: z-context membership and partial re-sorting
//! - `render`: quad emission and render-to-texture passes

mod properties;
mod render;
mod update;
mod zindex;

pub(crate) use render::RenderFrame;
pub(crate) use update::ParentFrame;

use bitflags::bitflags;

use crate::context::Context;
use crate::geometry::{BoundsMargin, Color, Rect};
use crate::layout::{FlexLayout, RelativeFunctions};
use crate::owner::NodeOwner;
use crate::render_state::ShaderId;
use crate::scene::SceneGraph;
use crate::texture::Texture;
use crate::texturizer::Texturizer;
use crate::tree::NodeId;

bitflags! {
    /// What part of a node's computed state is stale.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RecalcFlags: u16 {
        /// World alpha must be recomputed.
        const ALPHA = 1;
        /// Translation terms must be recomputed.
        const TRANSLATE = 2;
        /// The full matrix must be recomputed.
        const TRANSFORM = 4;
        /// The node just went from invisible to visible.
        const BECAME_VISIBLE = 128;
        /// The flex layout collaborator must run.
        const LAYOUT = 256;

        /// Bits handed down to children. TRANSFORM is included because a
        /// child's world matrix is composed from its parent's.
        const INHERITED = Self::ALPHA.bits()
            | Self::TRANSLATE.bits()
            | Self::TRANSFORM.bits()
            | Self::BECAME_VISIBLE.bits()
            | Self::LAYOUT.bits();
    }
}

/// Culling classification computed by the update pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum OutOfBounds {
    /// Inside the scissor; drawn.
    #[default]
    Visible = 0,
    /// Outside the scissor but within the bounds margin; kept alive, not drawn.
    WithinMargin = 1,
    /// Fully culled; the subtree is skipped.
    Culled = 2,
}

/// Callback run by the update pass on a node.
pub type NodeCallback = Box<dyn FnMut(&mut SceneGraph, NodeId)>;

/// Invalidation level meaning "something inside changed".
pub(crate) const RENDER_UPDATE_MINOR: u8 = 1;

pub struct Node {
    // Tree links
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) is_root: bool,
    pub(crate) enabled: bool,

    // Local properties
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) w: f32,
    pub(crate) h: f32,
    /// Dimensions are an estimate (e.g. texture not loaded yet).
    pub(crate) dims_unknown: bool,
    /// Dimensions were set explicitly and must not follow the texture.
    pub(crate) dims_explicit: bool,
    pub(crate) relative: Option<Box<RelativeFunctions>>,
    pub(crate) scale_x: f32,
    pub(crate) scale_y: f32,
    pub(crate) pivot_x: f32,
    pub(crate) pivot_y: f32,
    pub(crate) mount_x: f32,
    pub(crate) mount_y: f32,
    pub(crate) rotation: f32,
    pub(crate) alpha: f32,
    pub(crate) visible: bool,
    pub(crate) colors: [Color; 4],
    pub(crate) texture: Option<Texture>,
    pub(crate) shader: Option<ShaderId>,
    pub(crate) shader_owner: Option<NodeId>,

    /// Local transform; `alpha` holds the effective local alpha.
    pub(crate) local: Context,

    // Computed state
    pub(crate) world: Context,
    /// `None` while no render-to-texture ancestor exists: the world context
    /// doubles as the render context.
    pub(crate) render: Option<Context>,
    pub(crate) recalc: RecalcFlags,
    pub(crate) last_recalc: RecalcFlags,
    pub(crate) has_updates: bool,
    pub(crate) has_render_updates: u8,
    pub(crate) update_tree_order: u32,
    /// Highest tree order assigned within the subtree during its last visit.
    pub(crate) subtree_tree_order: u32,

    // Z-index bookkeeping
    pub(crate) z_index: i32,
    pub(crate) force_z_context: bool,
    pub(crate) z_parent: Option<NodeId>,
    pub(crate) z_context_usage: u32,
    pub(crate) z_indexed_children: Vec<NodeId>,
    pub(crate) z_index_resort: bool,
    pub(crate) z_sort: bool,

    // Bounds
    pub(crate) clipping: bool,
    pub(crate) clipbox: bool,
    pub(crate) bounds_margin: Option<BoundsMargin>,
    pub(crate) strict_bounds: Option<bool>,
    pub(crate) rec_bounds_margin: BoundsMargin,
    pub(crate) rec_strict_bounds: bool,
    pub(crate) bbox: Rect,
    pub(crate) scissor: Option<Rect>,
    pub(crate) viewport: Option<Rect>,
    pub(crate) out_of_bounds: OutOfBounds,
    pub(crate) within_bounds_margin: bool,

    // Render to texture
    pub(crate) texturizer: Option<Texturizer>,
    pub(crate) use_render_to_texture: bool,

    // Collaborators
    pub(crate) on_update: Option<NodeCallback>,
    pub(crate) on_after_update: Option<NodeCallback>,
    pub(crate) owner: Option<Box<dyn NodeOwner>>,
    pub(crate) layout: Option<Box<dyn FlexLayout>>,
}

impl Node {
    /// A detached node with default properties.
    pub fn new() -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            is_root: false,
            enabled: false,
            x: 0.0,
            y: 0.0,
            w: 0.0,
            h: 0.0,
            dims_unknown: false,
            dims_explicit: false,
            relative: None,
            scale_x: 1.0,
            scale_y: 1.0,
            pivot_x: 0.5,
            pivot_y: 0.5,
            mount_x: 0.0,
            mount_y: 0.0,
            rotation: 0.0,
            alpha: 1.0,
            visible: true,
            colors: [Color::WHITE; 4],
            texture: None,
            shader: None,
            shader_owner: None,
            local: Context::IDENTITY,
            world: Context {
                alpha: 0.0,
                ..Context::IDENTITY
            },
            render: None,
            recalc: RecalcFlags::empty(),
            last_recalc: RecalcFlags::empty(),
            has_updates: false,
            has_render_updates: 0,
            update_tree_order: 0,
            subtree_tree_order: 0,
            z_index: 0,
            force_z_context: false,
            z_parent: None,
            z_context_usage: 0,
            z_indexed_children: Vec::new(),
            z_index_resort: false,
            z_sort: false,
            clipping: false,
            clipbox: false,
            bounds_margin: None,
            strict_bounds: None,
            rec_bounds_margin: BoundsMargin::default(),
            rec_strict_bounds: true,
            bbox: Rect::default(),
            scissor: None,
            viewport: None,
            out_of_bounds: OutOfBounds::Visible,
            within_bounds_margin: false,
            texturizer: None,
            use_render_to_texture: false,
            on_update: None,
            on_after_update: None,
            owner: None,
            layout: None,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Attached under the root, visible and under an enabled parent.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn w(&self) -> f32 {
        self.w
    }

    pub fn h(&self) -> f32 {
        self.h
    }

    pub fn dims_unknown(&self) -> bool {
        self.dims_unknown
    }

    pub fn scale(&self) -> (f32, f32) {
        (self.scale_x, self.scale_y)
    }

    pub fn pivot(&self) -> (f32, f32) {
        (self.pivot_x, self.pivot_y)
    }

    pub fn mount(&self) -> (f32, f32) {
        (self.mount_x, self.mount_y)
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Alpha as set, regardless of visibility.
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Alpha actually applied: zero while invisible.
    pub fn local_alpha(&self) -> f32 {
        self.local.alpha
    }

    pub fn colors(&self) -> [Color; 4] {
        self.colors
    }

    pub fn texture(&self) -> Option<&Texture> {
        self.texture.as_ref()
    }

    pub fn shader(&self) -> Option<ShaderId> {
        self.shader
    }

    /// Nearest node (self included) whose shader applies to this node.
    pub fn shader_owner(&self) -> Option<NodeId> {
        self.shader_owner
    }

    pub fn local_context(&self) -> Context {
        self.local
    }

    pub fn world_context(&self) -> Context {
        self.world
    }

    /// Context relative to the enclosing render target.
    pub fn render_context(&self) -> Context {
        self.render.unwrap_or(self.world)
    }

    /// Whether the render context differs from the world context.
    pub fn has_render_context(&self) -> bool {
        self.render.is_some()
    }

    pub fn recalc(&self) -> RecalcFlags {
        self.recalc
    }

    /// Bits processed by the most recent update of this node.
    pub fn last_recalc(&self) -> RecalcFlags {
        self.last_recalc
    }

    pub fn has_updates(&self) -> bool {
        self.has_updates
    }

    pub fn has_render_updates(&self) -> u8 {
        self.has_render_updates
    }

    pub fn update_tree_order(&self) -> u32 {
        self.update_tree_order
    }

    pub fn z_index(&self) -> i32 {
        self.z_index
    }

    pub fn force_z_context(&self) -> bool {
        self.force_z_context
    }

    /// Z-context this node is registered with (nonzero z-index only).
    pub fn z_parent(&self) -> Option<NodeId> {
        self.z_parent
    }

    pub fn z_context_usage(&self) -> u32 {
        self.z_context_usage
    }

    pub fn z_indexed_children(&self) -> &[NodeId] {
        &self.z_indexed_children
    }

    pub fn clipping(&self) -> bool {
        self.clipping
    }

    pub fn clipbox(&self) -> bool {
        self.clipbox
    }

    pub fn bounds_margin(&self) -> Option<BoundsMargin> {
        self.bounds_margin
    }

    pub fn bbox(&self) -> Rect {
        self.bbox
    }

    pub fn scissor(&self) -> Option<Rect> {
        self.scissor
    }

    /// Own texture area while rendering to texture.
    pub fn viewport(&self) -> Option<Rect> {
        self.viewport
    }

    pub fn out_of_bounds(&self) -> OutOfBounds {
        self.out_of_bounds
    }

    pub fn within_bounds_margin(&self) -> bool {
        self.within_bounds_margin
    }

    pub fn texturizer(&self) -> Option<&Texturizer> {
        self.texturizer.as_ref()
    }

    pub fn render_to_texture_enabled(&self) -> bool {
        self.texturizer.as_ref().is_some_and(Texturizer::is_enabled)
    }

    /// Rendering to texture during the current frame.
    pub fn uses_render_to_texture(&self) -> bool {
        self.use_render_to_texture
    }

    pub(crate) fn has_flex_layout(&self) -> bool {
        self.layout.as_ref().is_some_and(|l| l.is_enabled())
    }

    /// Whether the node owns a sorted list of z-indexed descendants.
    pub fn is_z_context(&self) -> bool {
        self.force_z_context
            || self.render_to_texture_enabled()
            || self.z_index != 0
            || self.is_root
            || self.parent.is_none()
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("parent", &self.parent)
            .field("children", &self.children.len())
            .field("x", &self.x)
            .field("y", &self.y)
            .field("w", &self.w)
            .field("h", &self.h)
            .field("alpha", &self.local.alpha)
            .field("z_index", &self.z_index)
            .field("world", &self.world)
            .field("out_of_bounds", &self.out_of_bounds)
            .field("recalc", &self.recalc)
            .field("has_updates", &self.has_updates)
            .finish_non_exhaustive()
    }
}
