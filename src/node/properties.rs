use std::f32::consts::TAU;

use super::{Node, NodeCallback, RENDER_UPDATE_MINOR, RecalcFlags};
use crate::context::clamp_alpha;
use crate::geometry::{BoundsMargin, Color};
use crate::layout::{FlexLayout, RelativeFn, RelativeFunctions};
use crate::owner::NodeOwner;
use crate::render_state::ShaderId;
use crate::scene::SceneGraph;
use crate::texture::Texture;
use crate::texturizer::{FULL_RENDER_UPDATE, Texturizer};
use crate::tree::NodeId;

impl Node {
    /// Recompute the translation terms of the local transform from position,
    /// pivot and mount.
    pub(crate) fn recalc_local_translate(&mut self) {
        let pivot_x = self.pivot_x * self.w;
        let pivot_y = self.pivot_y * self.h;
        let l = self.local;
        let (mut px, mut py) = if l.is_complex() {
            (
                self.x - (pivot_x * l.ta + pivot_y * l.tb) + pivot_x,
                self.y - (pivot_x * l.tc + pivot_y * l.td) + pivot_y,
            )
        } else {
            (
                self.x - pivot_x * l.ta + pivot_x,
                self.y - pivot_y * l.td + pivot_y,
            )
        };
        px -= self.mount_x * self.w;
        py -= self.mount_y * self.h;
        self.local.px = px;
        self.local.py = py;
    }

    /// Recompute the 2×2 part of the local transform from scale and rotation.
    fn recalc_local_matrix(&mut self) {
        let (a, b, c, d) = if self.rotation != 0.0 && self.rotation % TAU != 0.0 {
            let (sin, cos) = self.rotation.sin_cos();
            (
                cos * self.scale_x,
                -sin * self.scale_y,
                sin * self.scale_x,
                cos * self.scale_y,
            )
        } else {
            (self.scale_x, 0.0, 0.0, self.scale_y)
        };
        self.local.ta = a;
        self.local.tb = b;
        self.local.tc = c;
        self.local.td = d;
    }

    fn relative_mut(&mut self) -> &mut RelativeFunctions {
        self.relative.get_or_insert_with(Default::default)
    }

    fn clear_relative(&mut self, f: impl FnOnce(&mut RelativeFunctions)) {
        if let Some(rel) = self.relative.as_mut() {
            f(rel);
            if rel.is_empty() {
                self.relative = None;
            }
        }
    }
}

// Dirty-flag plumbing
impl SceneGraph {
    /// Flag parts of a node's computed state as stale.
    ///
    /// The node and its ancestors are marked as having updates so the next
    /// update pass reaches it, and every enclosing render-to-texture layer is
    /// fully invalidated.
    pub fn set_recalc(&mut self, id: NodeId, bits: RecalcFlags) {
        self.nodes[id].recalc |= bits;
        self.set_has_updates(id);
        if let Some(parent) = self.nodes[id].parent {
            self.mark_render_updates(parent, FULL_RENDER_UPDATE);
        }
    }

    /// Mark a node and its ancestors, stopping at the first ancestor that
    /// is already marked.
    pub(crate) fn set_has_updates(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(cur) = current {
            let node = &mut self.nodes[cur];
            if node.has_updates {
                return;
            }
            node.has_updates = true;
            current = node.parent;
        }
    }

    /// Raise the render invalidation level of a node and fully invalidate
    /// every ancestor. Ignored while the node is not visible in the world;
    /// nodes that become visible are fully invalidated anyway.
    pub(crate) fn mark_render_updates(&mut self, id: NodeId, level: u8) {
        let node = &mut self.nodes[id];
        if node.world.alpha <= 0.0 {
            return;
        }
        node.has_render_updates = node.has_render_updates.max(level);
        let mut current = node.parent;
        while let Some(cur) = current {
            let ancestor = &mut self.nodes[cur];
            ancestor.has_render_updates = FULL_RENDER_UPDATE;
            current = ancestor.parent;
        }
    }

    fn update_local_transform(&mut self, id: NodeId) {
        let node = &mut self.nodes[id];
        node.recalc_local_matrix();
        node.recalc_local_translate();
        self.set_recalc(id, RecalcFlags::TRANSFORM | RecalcFlags::TRANSLATE);
    }

    fn update_local_translate(&mut self, id: NodeId) {
        self.nodes[id].recalc_local_translate();
        self.set_recalc(id, RecalcFlags::TRANSLATE);
    }

    /// Recompute whether a node is enabled and notify owners of changes in
    /// the subtree.
    pub(crate) fn refresh_enabled(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let enabled = node.local.alpha > 0.0
            && (node.is_root || node.parent.is_some_and(|p| self.nodes[p].enabled));
        if node.enabled == enabled {
            return;
        }
        self.nodes[id].enabled = enabled;
        self.notify_enabled_changed(id, enabled);

        let children = match self.nodes.get(id) {
            Some(node) => node.children.clone(),
            None => return,
        };
        for child in children {
            self.refresh_enabled(child);
        }
    }
}

// Position and size
impl SceneGraph {
    pub fn set_x(&mut self, id: NodeId, x: f32) {
        let node = &mut self.nodes[id];
        node.clear_relative(|r| r.x = None);
        self.apply_x(id, x);
    }

    pub fn set_y(&mut self, id: NodeId, y: f32) {
        let node = &mut self.nodes[id];
        node.clear_relative(|r| r.y = None);
        self.apply_y(id, y);
    }

    pub fn set_position(&mut self, id: NodeId, x: f32, y: f32) {
        self.set_x(id, x);
        self.set_y(id, y);
    }

    fn apply_x(&mut self, id: NodeId, x: f32) {
        let node = &mut self.nodes[id];
        if node.x == x {
            return;
        }
        node.local.px += x - node.x;
        node.x = x;
        self.set_recalc(id, RecalcFlags::TRANSLATE);
    }

    fn apply_y(&mut self, id: NodeId, y: f32) {
        let node = &mut self.nodes[id];
        if node.y == y {
            return;
        }
        node.local.py += y - node.y;
        node.y = y;
        self.set_recalc(id, RecalcFlags::TRANSLATE);
    }

    pub fn set_w(&mut self, id: NodeId, w: f32) {
        let h = self.nodes[id].h;
        self.set_size(id, w, h);
    }

    pub fn set_h(&mut self, id: NodeId, h: f32) {
        let w = self.nodes[id].w;
        self.set_size(id, w, h);
    }

    /// Set explicit dimensions. The node stops following its texture size.
    pub fn set_size(&mut self, id: NodeId, w: f32, h: f32) {
        let node = &mut self.nodes[id];
        node.dims_explicit = true;
        node.clear_relative(|r| {
            r.w = None;
            r.h = None;
        });
        self.set_dimensions(id, w, h, false);
    }

    /// Update the dimensions used for transforms and culling.
    ///
    /// `estimate` marks them as provisional, in which case the bounding box
    /// also covers the node origin. Returns whether anything changed.
    pub fn set_dimensions(&mut self, id: NodeId, w: f32, h: f32, estimate: bool) -> bool {
        let node = &mut self.nodes[id];
        if node.w == w && node.h == h && node.dims_unknown == estimate {
            return false;
        }
        node.w = w;
        node.h = h;
        node.dims_unknown = estimate;
        let relayout = node.has_flex_layout();
        self.update_local_translate(id);
        self.mark_render_updates(id, FULL_RENDER_UPDATE);
        if relayout {
            self.set_recalc(id, RecalcFlags::LAYOUT);
        }
        self.notify_dimensions_changed(id, w, h);
        true
    }

    /// Dimensions as specified before any flex layout was applied.
    pub fn original_dimensions(&self, id: NodeId) -> (f32, f32) {
        let node = &self.nodes[id];
        match node.layout.as_ref() {
            Some(layout) if layout.is_enabled() => {
                (layout.original_width(), layout.original_height())
            }
            _ => (node.w, node.h),
        }
    }

    pub fn set_relative_x(&mut self, id: NodeId, f: Option<RelativeFn>) {
        let node = &mut self.nodes[id];
        match f {
            Some(f) => node.relative_mut().x = Some(f),
            None => node.clear_relative(|r| r.x = None),
        }
        self.set_recalc(id, RecalcFlags::TRANSLATE);
    }

    pub fn set_relative_y(&mut self, id: NodeId, f: Option<RelativeFn>) {
        let node = &mut self.nodes[id];
        match f {
            Some(f) => node.relative_mut().y = Some(f),
            None => node.clear_relative(|r| r.y = None),
        }
        self.set_recalc(id, RecalcFlags::TRANSLATE);
    }

    pub fn set_relative_w(&mut self, id: NodeId, f: Option<RelativeFn>) {
        let node = &mut self.nodes[id];
        match f {
            Some(f) => {
                node.relative_mut().w = Some(f);
                node.dims_explicit = true;
            }
            None => node.clear_relative(|r| r.w = None),
        }
        self.set_recalc(id, RecalcFlags::TRANSLATE);
    }

    pub fn set_relative_h(&mut self, id: NodeId, f: Option<RelativeFn>) {
        let node = &mut self.nodes[id];
        match f {
            Some(f) => {
                node.relative_mut().h = Some(f);
                node.dims_explicit = true;
            }
            None => node.clear_relative(|r| r.h = None),
        }
        self.set_recalc(id, RecalcFlags::TRANSLATE);
    }

    /// Evaluate relative functions against the parent size. Runs inside the
    /// update pass, so changes are recorded on the node without walking up.
    pub(crate) fn apply_relative_functions(&mut self, id: NodeId, parent_w: f32, parent_h: f32) {
        let node = &mut self.nodes[id];
        let Some(rel) = node.relative.as_ref() else {
            return;
        };
        let x = rel.x.as_ref().map(|f| f(parent_w, parent_h));
        let y = rel.y.as_ref().map(|f| f(parent_w, parent_h));
        let w = rel.w.as_ref().map(|f| f(parent_w, parent_h));
        let h = rel.h.as_ref().map(|f| f(parent_w, parent_h));

        if let Some(x) = x
            && x != node.x
        {
            node.local.px += x - node.x;
            node.x = x;
        }
        if let Some(y) = y
            && y != node.y
        {
            node.local.py += y - node.y;
            node.y = y;
        }

        let new_w = w.unwrap_or(node.w);
        let new_h = h.unwrap_or(node.h);
        if new_w != node.w || new_h != node.h {
            node.w = new_w;
            node.h = new_h;
            node.recalc_local_translate();
            self.notify_dimensions_changed(id, new_w, new_h);
        }
    }
}

// Transform
impl SceneGraph {
    pub fn set_scale(&mut self, id: NodeId, scale: f32) {
        self.set_scale_xy(id, scale, scale);
    }

    pub fn set_scale_xy(&mut self, id: NodeId, scale_x: f32, scale_y: f32) {
        let node = &mut self.nodes[id];
        if node.scale_x == scale_x && node.scale_y == scale_y {
            return;
        }
        node.scale_x = scale_x;
        node.scale_y = scale_y;
        self.update_local_transform(id);
    }

    /// Rotation in radians around the pivot.
    pub fn set_rotation(&mut self, id: NodeId, rotation: f32) {
        let node = &mut self.nodes[id];
        if node.rotation == rotation {
            return;
        }
        node.rotation = rotation;
        self.update_local_transform(id);
    }

    /// Pivot for scale and rotation, relative to the node size.
    pub fn set_pivot(&mut self, id: NodeId, pivot_x: f32, pivot_y: f32) {
        let node = &mut self.nodes[id];
        if node.pivot_x == pivot_x && node.pivot_y == pivot_y {
            return;
        }
        node.pivot_x = pivot_x;
        node.pivot_y = pivot_y;
        self.update_local_translate(id);
    }

    /// Point of the node placed at its position, relative to the node size.
    pub fn set_mount(&mut self, id: NodeId, mount_x: f32, mount_y: f32) {
        let node = &mut self.nodes[id];
        if node.mount_x == mount_x && node.mount_y == mount_y {
            return;
        }
        node.mount_x = mount_x;
        node.mount_y = mount_y;
        self.update_local_translate(id);
    }
}

// Visibility
impl SceneGraph {
    pub fn set_alpha(&mut self, id: NodeId, alpha: f32) {
        self.nodes[id].alpha = alpha;
        self.apply_local_alpha(id);
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        self.nodes[id].visible = visible;
        self.apply_local_alpha(id);
    }

    fn apply_local_alpha(&mut self, id: NodeId) {
        let node = &self.nodes[id];
        let alpha = if node.visible {
            clamp_alpha(node.alpha)
        } else {
            0.0
        };
        let previous = node.local.alpha;
        if alpha == previous {
            return;
        }
        let parent_visible = node
            .parent
            .is_some_and(|p| self.nodes[p].world.alpha > 0.0);
        let becomes_visible = node.world.alpha == 0.0 && parent_visible && alpha > 0.0;

        self.nodes[id].local.alpha = alpha;
        let bits = if becomes_visible {
            RecalcFlags::ALPHA | RecalcFlags::BECAME_VISIBLE
        } else {
            RecalcFlags::ALPHA
        };
        self.set_recalc(id, bits);

        if (previous > 0.0) != (alpha > 0.0) {
            self.refresh_enabled(id);
        }
    }
}

// Bounds
impl SceneGraph {
    /// Clip descendants to this node's bounding box.
    pub fn set_clipping(&mut self, id: NodeId, clipping: bool) {
        let node = &mut self.nodes[id];
        if node.clipping == clipping {
            return;
        }
        node.clipping = clipping;
        self.set_recalc(id, RecalcFlags::ALPHA | RecalcFlags::TRANSLATE);
    }

    /// Treat the bounding box as opaque for culling without clipping.
    pub fn set_clipbox(&mut self, id: NodeId, clipbox: bool) {
        let node = &mut self.nodes[id];
        if node.clipbox == clipbox {
            return;
        }
        node.clipbox = clipbox;
        self.set_recalc(id, RecalcFlags::ALPHA | RecalcFlags::TRANSLATE);
    }

    /// Override the bounds margin for this subtree. `None` inherits.
    pub fn set_bounds_margin(&mut self, id: NodeId, margin: Option<BoundsMargin>) {
        let node = &mut self.nodes[id];
        if node.bounds_margin == margin {
            return;
        }
        node.bounds_margin = margin;
        self.set_recalc(id, RecalcFlags::TRANSLATE);
    }

    /// Override strict bounds for this subtree. `None` inherits.
    pub fn set_strict_bounds(&mut self, id: NodeId, strict: Option<bool>) {
        let node = &mut self.nodes[id];
        if node.strict_bounds == strict {
            return;
        }
        node.strict_bounds = strict;
        self.set_recalc(id, RecalcFlags::TRANSLATE);
    }
}

// Appearance
impl SceneGraph {
    /// Set all four corner colors at once.
    pub fn set_color(&mut self, id: NodeId, color: Color) {
        self.set_colors(id, [color; 4]);
    }

    /// Corner colors: top-left, top-right, bottom-left, bottom-right.
    pub fn set_colors(&mut self, id: NodeId, colors: [Color; 4]) {
        let node = &mut self.nodes[id];
        if node.colors == colors {
            return;
        }
        node.colors = colors;
        self.mark_render_updates(id, RENDER_UPDATE_MINOR);
    }

    /// Set the displayed texture. Nodes without explicit dimensions take the
    /// texture size.
    pub fn set_texture(&mut self, id: NodeId, texture: Option<Texture>) {
        let node = &mut self.nodes[id];
        let size = texture.as_ref().and_then(Texture::size);
        let follow = !node.dims_explicit;
        node.texture = texture;
        if follow && let Some((w, h)) = size {
            self.set_dimensions(id, w, h, false);
        }
        self.mark_render_updates(id, FULL_RENDER_UPDATE);
    }

    pub fn set_shader(&mut self, id: NodeId, shader: Option<ShaderId>) {
        let node = &mut self.nodes[id];
        if node.shader == shader {
            return;
        }
        node.shader = shader;
        let parent = node.parent;
        let owner = if shader.is_some() {
            Some(id)
        } else {
            self.inherited_shader_owner(parent)
        };
        self.set_shader_owner_recursive(id, owner);
        self.mark_render_updates(id, RENDER_UPDATE_MINOR);
    }

    /// Shader owner a shaderless child of `parent` inherits.
    pub(crate) fn inherited_shader_owner(&self, parent: Option<NodeId>) -> Option<NodeId> {
        let parent = &self.nodes[parent?];
        if parent.render_to_texture_enabled() {
            None
        } else {
            parent.shader_owner
        }
    }

    pub(crate) fn set_shader_owner_recursive(&mut self, id: NodeId, owner: Option<NodeId>) {
        self.nodes[id].shader_owner = owner;
        if !self.nodes[id].render_to_texture_enabled() {
            self.set_shader_owner_children(id, owner);
        }
    }

    fn set_shader_owner_children(&mut self, id: NodeId, owner: Option<NodeId>) {
        for child in self.nodes[id].children.clone() {
            if self.nodes[child].shader.is_none() {
                self.set_shader_owner_recursive(child, owner);
            }
        }
    }

    /// Shader used for the node's quads; `None` is the default shader.
    pub fn active_shader(&self, id: NodeId) -> Option<ShaderId> {
        self.nodes[id]
            .shader_owner
            .and_then(|owner| self.nodes.get(owner))
            .and_then(|owner| owner.shader)
    }
}

// Render to texture
impl SceneGraph {
    /// Render the subtree into an offscreen target and present the result.
    pub fn set_render_to_texture(&mut self, id: NodeId, enabled: bool) {
        if self.nodes[id].render_to_texture_enabled() == enabled {
            return;
        }
        if enabled {
            let node = &mut self.nodes[id];
            let was_z_context = node.is_z_context();
            node.texturizer.get_or_insert_with(Texturizer::new).enabled = true;
            self.set_shader_owner_children(id, None);
            if !was_z_context {
                let previous = self.nodes[id].parent.map(|p| self.find_z_context(p));
                self.enable_z_context(id, previous);
            }
            self.mark_render_updates(id, FULL_RENDER_UPDATE);
            self.set_recalc(id, RecalcFlags::ALPHA | RecalcFlags::TRANSLATE | RecalcFlags::TRANSFORM);
            log::debug!("Render to texture enabled on {:?}", id);
        } else {
            let node = &mut self.nodes[id];
            if let Some(texturizer) = node.texturizer.as_mut() {
                texturizer.enabled = false;
                texturizer.release_render_texture(self.pool.as_mut());
            }
            node.use_render_to_texture = false;
            node.viewport = None;
            let owner = node.shader_owner;
            self.set_shader_owner_children(id, owner);
            if !self.nodes[id].is_z_context() {
                self.disable_z_context(id);
            }
            self.mark_render_updates(id, FULL_RENDER_UPDATE);
            self.set_recalc(id, RecalcFlags::ALPHA | RecalcFlags::TRANSLATE | RecalcFlags::TRANSFORM);
            log::debug!("Render to texture disabled on {:?}", id);
        }
    }

    /// Only render to texture while the subtree content is unchanged.
    pub fn set_render_to_texture_lazy(&mut self, id: NodeId, lazy: bool) {
        self.nodes[id]
            .texturizer
            .get_or_insert_with(Texturizer::new)
            .lazy = lazy;
        self.mark_render_updates(id, FULL_RENDER_UPDATE);
        self.set_has_updates(id);
    }

    /// Tint the presented result with the node's corner colors.
    pub fn set_render_to_texture_colorize(&mut self, id: NodeId, colorize: bool) {
        self.nodes[id]
            .texturizer
            .get_or_insert_with(Texturizer::new)
            .colorize = colorize;
        self.mark_render_updates(id, RENDER_UPDATE_MINOR);
    }

    /// Keep the offscreen result without compositing it into the parent.
    pub fn set_render_offscreen(&mut self, id: NodeId, offscreen: bool) {
        self.nodes[id]
            .texturizer
            .get_or_insert_with(Texturizer::new)
            .render_offscreen = offscreen;
        self.set_recalc(id, RecalcFlags::TRANSLATE);
    }

    /// Stable handle to the node's offscreen result, for display by other
    /// nodes through [`Texture::Result`].
    pub fn result_texture(&mut self, id: NodeId) -> crate::texture::ResultTexture {
        self.nodes[id]
            .texturizer
            .get_or_insert_with(Texturizer::new)
            .result_texture()
    }
}

// Collaborators
impl SceneGraph {
    pub fn set_on_update(&mut self, id: NodeId, callback: Option<NodeCallback>) {
        self.nodes[id].on_update = callback;
        self.set_recalc(id, RecalcFlags::ALPHA | RecalcFlags::TRANSLATE | RecalcFlags::TRANSFORM);
    }

    pub fn set_on_after_update(&mut self, id: NodeId, callback: Option<NodeCallback>) {
        self.nodes[id].on_after_update = callback;
        self.set_recalc(id, RecalcFlags::ALPHA | RecalcFlags::TRANSLATE | RecalcFlags::TRANSFORM);
    }

    pub fn set_owner(&mut self, id: NodeId, owner: Option<Box<dyn NodeOwner>>) {
        self.nodes[id].owner = owner;
    }

    pub fn set_layout(&mut self, id: NodeId, layout: Option<Box<dyn FlexLayout>>) {
        self.nodes[id].layout = layout;
        self.request_layout(id);
    }

    /// Run the flex layout of this node during the next update.
    pub fn request_layout(&mut self, id: NodeId) {
        self.set_recalc(id, RecalcFlags::LAYOUT);
    }
}
