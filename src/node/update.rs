//! The update pass.
//!
//! Walks the tree top-down once per frame. A node does work only when it or
//! a descendant has pending updates, when it has inherited dirty bits and is
//! visible, or when it just became invisible. Everything else is skipped
//! without touching its subtree.

use super::{OutOfBounds, RecalcFlags};
use crate::context::{Context, clamp_alpha};
use crate::geometry::{BoundsMargin, Rect};
use crate::scene::SceneGraph;
use crate::texturizer::FULL_RENDER_UPDATE;
use crate::tree::NodeId;

/// Bounding box size used while dimensions are only estimated.
const ESTIMATE_BBOX_SIZE: f32 = 2048.0;

/// What a node needs to know about its parent during the update pass.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ParentFrame {
    pub world: Context,
    /// Base for the render context; `None` while render equals world.
    pub render: Option<Context>,
    /// Parent scissor, or the parent viewport when it renders to texture.
    pub scissor: Option<Rect>,
    pub out_of_bounds: OutOfBounds,
    pub bounds_margin: BoundsMargin,
    pub strict_bounds: bool,
    /// Dirty bits children inherit.
    pub recalc: RecalcFlags,
    pub width: f32,
    pub height: f32,
}

/// `world = parent * local`, translation terms only.
fn compose_translate(target: &mut Context, local: &Context, parent: &Context) {
    target.px = parent.px + local.px * parent.ta + local.py * parent.tb;
    target.py = parent.py + local.px * parent.tc + local.py * parent.td;
}

/// `world = parent * local`, 2×2 terms only. Skips the cross terms when the
/// local matrix is a plain positive scale.
fn compose_matrix(target: &mut Context, local: &Context, parent: &Context) {
    target.ta = local.ta * parent.ta;
    target.tb = local.td * parent.tb;
    target.tc = local.ta * parent.tc;
    target.td = local.td * parent.td;
    if local.is_complex() {
        target.ta += local.tc * parent.tb;
        target.tb += local.tb * parent.ta;
        target.tc += local.tc * parent.td;
        target.td += local.tb * parent.tc;
    }
}

impl SceneGraph {
    pub(crate) fn update_node(&mut self, id: NodeId, pf: &ParentFrame) {
        // Callbacks of earlier siblings may have removed this node.
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.recalc |= pf.recalc;

        self.run_layout(id, pf);

        if let Some(mut callback) = self.nodes.get_mut(id).and_then(|n| n.on_update.take()) {
            // Mutations made by the callback inside this subtree must not
            // propagate past this node: it is revisited right now.
            self.nodes[id].has_updates = true;
            callback(self, id);
            match self.nodes.get_mut(id) {
                Some(node) if node.on_update.is_none() => node.on_update = Some(callback),
                Some(_) => {}
                None => return,
            }
        }

        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let visible = pf.world.alpha > 0.0 && node.local.alpha > 0.0;
        let must_update = node.has_updates
            || (!node.recalc.is_empty() && visible)
            || (node.world.alpha > 0.0 && !visible);

        if must_update {
            self.stats.nodes_updated += 1;
            self.update_computed(id, pf, true);
        } else {
            self.stats.nodes_skipped += 1;
            self.skip_tree_order(id);
        }
    }

    fn run_layout(&mut self, id: NodeId, pf: &ParentFrame) {
        let node = &mut self.nodes[id];
        if node.has_flex_layout() {
            if node.recalc.contains(RecalcFlags::LAYOUT)
                && let Some(mut layout) = node.layout.take()
            {
                layout.layout_flex_tree(self, id);
                if let Some(node) = self.nodes.get_mut(id)
                    && node.layout.is_none()
                {
                    node.layout = Some(layout);
                }
            }
        } else if node.recalc.contains(RecalcFlags::TRANSLATE) && node.relative.is_some() {
            self.apply_relative_functions(id, pf.width, pf.height);
        }
    }

    /// Recompute contexts, bounds and culling for a node, then visit its
    /// children. `allow_redo` permits one re-run when entering the bounds
    /// margin dirtied the node again.
    fn update_computed(&mut self, id: NodeId, pf: &ParentFrame, allow_redo: bool) {
        let node = &mut self.nodes[id];
        let mut recalc = node.recalc;
        let local = node.local;
        let visible = pf.world.alpha > 0.0 && local.alpha > 0.0;

        if recalc.contains(RecalcFlags::ALPHA) {
            if node.world.alpha == 0.0 && visible {
                node.has_render_updates = FULL_RENDER_UPDATE;
            }
            node.world.alpha = clamp_alpha(pf.world.alpha * local.alpha);
        }
        if recalc.contains(RecalcFlags::BECAME_VISIBLE) {
            node.has_render_updates = FULL_RENDER_UPDATE;
        }
        if recalc.intersects(RecalcFlags::TRANSLATE | RecalcFlags::TRANSFORM) {
            compose_translate(&mut node.world, &local, &pf.world);
        }
        if recalc.contains(RecalcFlags::TRANSFORM) {
            compose_matrix(&mut node.world, &local, &pf.world);
        }

        match pf.render {
            Some(pr) => {
                let init = node.render.is_none();
                let render = node.render.get_or_insert(Context::IDENTITY);
                if init || recalc.contains(RecalcFlags::ALPHA) {
                    render.alpha = clamp_alpha(pr.alpha * local.alpha);
                }
                if init || recalc.intersects(RecalcFlags::TRANSLATE | RecalcFlags::TRANSFORM) {
                    compose_translate(render, &local, &pr);
                }
                if init || recalc.contains(RecalcFlags::TRANSFORM) {
                    compose_matrix(render, &local, &pr);
                }
                if init {
                    // The scissor must follow the new coordinate space.
                    recalc |= RecalcFlags::TRANSLATE;
                }
            }
            None => node.render = None,
        }

        node.update_tree_order = self.tree_order;
        self.tree_order += 1;

        let use_rtt = node
            .texturizer
            .as_ref()
            .is_some_and(|t| t.must_render_to_texture(node.has_render_updates));
        if use_rtt != node.use_render_to_texture {
            node.recalc |= RecalcFlags::TRANSLATE | RecalcFlags::TRANSFORM;
            recalc |= RecalcFlags::TRANSLATE;
            if !use_rtt && let Some(texturizer) = node.texturizer.as_mut() {
                texturizer.release_render_texture(self.pool.as_mut());
            }
            log::trace!("{:?} render to texture in use: {}", id, use_rtt);
        }
        node.use_render_to_texture = use_rtt;

        let (bbox_w, bbox_h) = if node.dims_unknown {
            (ESTIMATE_BBOX_SIZE, ESTIMATE_BBOX_SIZE)
        } else {
            (node.w, node.h)
        };
        let r = node.render.unwrap_or(node.world);
        let mut bbox = if r.is_complex() {
            let corners = r.corner_points(bbox_w, bbox_h);
            let (mut sx, mut sy) = corners[0];
            let (mut ex, mut ey) = corners[0];
            for &(x, y) in &corners[1..] {
                sx = sx.min(x);
                sy = sy.min(y);
                ex = ex.max(x);
                ey = ey.max(y);
            }
            Rect::from_edges(sx, sy, ex, ey)
        } else {
            Rect::new(r.px, r.py, r.ta * bbox_w, r.td * bbox_h)
        };
        if node.dims_unknown {
            // The estimate may be far off: make sure the node origin is
            // covered no matter how the real dimensions turn out.
            let pr = pf.render.unwrap_or(pf.world);
            let (nx, ny) = pr.transform_point(node.x, node.y);
            bbox = Rect::from_edges(
                bbox.x.min(nx),
                bbox.y.min(ny),
                bbox.right().max(nx),
                bbox.bottom().max(ny),
            );
        }
        node.bbox = bbox;

        let moved = recalc.intersects(RecalcFlags::TRANSLATE | RecalcFlags::TRANSFORM);
        if moved || node.scissor.is_none() {
            node.scissor = if node.clipping && r.is_square() {
                Some(match pf.scissor {
                    Some(area) => area.intersection(&bbox),
                    None => bbox,
                })
            } else {
                pf.scissor
            };
        }

        node.rec_bounds_margin = node.bounds_margin.unwrap_or(pf.bounds_margin);
        node.rec_strict_bounds = node.strict_bounds.unwrap_or(pf.strict_bounds);

        if pf.out_of_bounds == OutOfBounds::Culled {
            node.out_of_bounds = OutOfBounds::Culled;
            if node.within_bounds_margin {
                node.within_bounds_margin = false;
                self.notify_within_bounds_margin(id, false);
            }
        } else if moved {
            let opaque = node.clipping
                || use_rtt
                || (node.clipbox && bbox_w > 0.0 && bbox_h > 0.0);
            let offscreen = node
                .texturizer
                .as_ref()
                .is_some_and(|t| t.enabled && t.render_offscreen);

            let mut out_of_bounds = OutOfBounds::Visible;
            let mut within_margin = true;
            if !offscreen && let Some(scissor) = node.scissor {
                if scissor.is_empty() {
                    out_of_bounds = OutOfBounds::Culled;
                    within_margin = false;
                } else if !bbox.touches(&scissor) {
                    within_margin = bbox.touches(&scissor.expand(&node.rec_bounds_margin));
                    out_of_bounds = if within_margin {
                        // Descendants may still be visible or within margin.
                        OutOfBounds::WithinMargin
                    } else if opaque || node.rec_strict_bounds {
                        OutOfBounds::Culled
                    } else {
                        OutOfBounds::WithinMargin
                    };
                }
            }
            node.out_of_bounds = out_of_bounds;

            if node.within_bounds_margin != within_margin {
                node.within_bounds_margin = within_margin;
                if within_margin {
                    // The owner may mutate this node. Park the pending bits so
                    // that new ones can be told apart.
                    node.has_updates = true;
                    let saved = std::mem::take(&mut node.recalc);
                    self.notify_within_bounds_margin(id, true);
                    let Some(node) = self.nodes.get_mut(id) else {
                        return;
                    };
                    let added = node.recalc;
                    node.recalc = saved | added;
                    if !added.is_empty() && allow_redo {
                        self.stats.margin_redos += 1;
                        log::trace!("{:?} changed on entering bounds margin, updating again", id);
                        return self.update_computed(id, pf, false);
                    }
                } else {
                    self.notify_within_bounds_margin(id, false);
                }
            }
        }

        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.viewport = use_rtt.then(|| Rect::new(0.0, 0.0, bbox_w, bbox_h));

        let p_recalc = node.recalc & RecalcFlags::INHERITED;
        node.last_recalc = recalc | node.recalc;
        node.recalc = RecalcFlags::empty();
        node.has_updates = false;

        let frame = ParentFrame {
            world: node.world,
            render: if use_rtt {
                if node.world.is_identity() && node.world.alpha == 1.0 {
                    None
                } else {
                    Some(Context::IDENTITY)
                }
            } else {
                node.render
            },
            scissor: if use_rtt { node.viewport } else { node.scissor },
            out_of_bounds: node.out_of_bounds,
            bounds_margin: node.rec_bounds_margin,
            strict_bounds: node.rec_strict_bounds,
            recalc: p_recalc,
            width: node.w,
            height: node.h,
        };
        let children = node.children.clone();

        if frame.out_of_bounds < OutOfBounds::Culled {
            for child in children {
                self.update_node(child, &frame);
            }
        } else {
            for child in children {
                let Some(node) = self.nodes.get_mut(child) else {
                    continue;
                };
                if node.has_updates {
                    self.update_node(child, &frame);
                } else {
                    // Keep the inherited bits for when the branch comes back.
                    node.recalc |= p_recalc;
                    self.propagate_culled(child);
                }
            }
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.subtree_tree_order = self.tree_order - 1;
        }

        if let Some(mut callback) = self.nodes.get_mut(id).and_then(|n| n.on_after_update.take()) {
            callback(self, id);
            if let Some(node) = self.nodes.get_mut(id)
                && node.on_after_update.is_none()
            {
                node.on_after_update = Some(callback);
            }
        }
    }

    /// Mark a skipped subtree as culled without recomputing geometry.
    fn propagate_culled(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if node.out_of_bounds == OutOfBounds::Culled {
            return;
        }
        node.out_of_bounds = OutOfBounds::Culled;
        if node.within_bounds_margin {
            node.within_bounds_margin = false;
            self.notify_within_bounds_margin(id, false);
        }
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        for child in node.children.clone() {
            self.propagate_culled(child);
        }
    }

    /// Keep tree orders monotonic across a subtree that did no work.
    ///
    /// Orders still ahead of the counter are kept as they are and the
    /// counter jumps past the subtree. Orders that fell behind are renumbered.
    fn skip_tree_order(&mut self, id: NodeId) {
        let node = &self.nodes[id];
        if node.update_tree_order >= self.tree_order {
            self.tree_order = node.subtree_tree_order.max(node.update_tree_order) + 1;
        } else {
            self.assign_tree_order(id);
        }
    }

    fn assign_tree_order(&mut self, id: NodeId) {
        let node = &mut self.nodes[id];
        if node.local.alpha <= 0.0 || node.out_of_bounds == OutOfBounds::Culled {
            return;
        }
        node.update_tree_order = self.tree_order;
        self.tree_order += 1;
        for child in node.children.clone() {
            self.assign_tree_order(child);
        }
        self.nodes[id].subtree_tree_order = self.tree_order - 1;
    }
}
