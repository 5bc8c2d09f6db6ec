mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{OwnerEvent, OwnerLog, add_image, add_node, approx_eq, scene, scene_with};
use strata::prelude::*;

fn count_entered(events: &[OwnerEvent]) -> usize {
    events
        .iter()
        .filter(|e| **e == OwnerEvent::WithinBoundsMargin(true))
        .count()
}

#[test]
fn test_world_alpha_is_product_of_ancestors() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let a = add_node(&mut scene, root, 0.0, 0.0, 0.0, 0.0);
    let b = add_node(&mut scene, a, 0.0, 0.0, 10.0, 10.0);
    scene.set_alpha(a, 0.5);
    scene.set_alpha(b, 0.6);
    scene.update();

    assert!((scene.world_context(b).alpha - 0.3).abs() < 1e-6);
    assert_eq!(scene.out_of_bounds(b), OutOfBounds::Visible);
}

#[test]
fn test_alpha_product_over_deep_chain() {
    let (mut scene, _) = scene();
    let mut parent = scene.root();
    let alphas = [0.9, 0.8, 0.5, 1.0, 0.25];
    let mut nodes = Vec::new();
    for &alpha in &alphas {
        let id = add_node(&mut scene, parent, 1.0, 1.0, 10.0, 10.0);
        scene.set_alpha(id, alpha);
        nodes.push(id);
        parent = id;
    }
    scene.update();

    let mut expected = 1.0;
    for (&id, &alpha) in nodes.iter().zip(&alphas) {
        expected *= alpha;
        assert!(approx_eq(scene.world_context(id).alpha, expected));
    }

    // Changing a middle node only touches its subtree.
    scene.set_alpha(nodes[2], 1.0);
    scene.update();
    assert!(approx_eq(scene.world_context(nodes[4]).alpha, 0.9 * 0.8 * 0.25));
    assert!(approx_eq(scene.world_context(nodes[1]).alpha, 0.9 * 0.8));
}

#[test]
fn test_tiny_alpha_snaps_to_zero() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let a = add_node(&mut scene, root, 0.0, 0.0, 10.0, 10.0);
    let b = add_node(&mut scene, a, 0.0, 0.0, 10.0, 10.0);
    scene.set_alpha(a, 1e-8);
    scene.set_alpha(b, 1e-8);
    scene.update();
    assert_eq!(scene.world_context(b).alpha, 0.0);
}

#[test]
fn test_hidden_parent_zeroes_descendants_and_reshow_is_flagged() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let r = add_node(&mut scene, root, 0.0, 0.0, 100.0, 100.0);
    scene.set_render_to_texture(r, true);
    let a = add_node(&mut scene, r, 0.0, 0.0, 0.0, 0.0);
    let b = add_node(&mut scene, a, 0.0, 0.0, 10.0, 10.0);
    scene.set_alpha(a, 0.5);
    scene.set_alpha(b, 0.6);
    let mut sink = RecordingSink::new();
    scene.frame(&mut sink);

    scene.set_visible(a, false);
    scene.frame(&mut sink);
    assert_eq!(scene.world_context(b).alpha, 0.0);
    assert_eq!(scene.world_context(a).alpha, 0.0);

    scene.set_visible(a, true);
    assert!(scene.node(a).recalc().contains(RecalcFlags::BECAME_VISIBLE));
    assert_eq!(scene.node(r).has_render_updates(), 3);

    scene.update();
    assert!(scene.node(a).last_recalc().contains(RecalcFlags::BECAME_VISIBLE));
    assert_eq!(scene.node(a).has_render_updates(), 3);
    assert!(approx_eq(scene.world_context(b).alpha, 0.3));
}

#[test]
fn test_far_offscreen_node_is_culled() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let x = add_node(&mut scene, root, 10000.0, 0.0, 50.0, 50.0);
    scene.update();
    assert_eq!(scene.out_of_bounds(x), OutOfBounds::Culled);
    assert!(!scene.node(x).within_bounds_margin());
}

#[test]
fn test_node_in_margin_notifies_once() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let y = scene.create_node();
    let events = OwnerLog::install(&mut scene, y);
    scene.add_child(root, y);
    scene.set_position(y, 1950.0, 0.0);
    scene.set_size(y, 20.0, 20.0);
    scene.update();

    assert_eq!(scene.out_of_bounds(y), OutOfBounds::WithinMargin);
    assert_eq!(count_entered(&events.borrow()), 1);

    scene.update();
    scene.set_alpha(y, 0.5);
    scene.update();
    assert_eq!(count_entered(&events.borrow()), 1);
}

#[test]
fn test_leaving_margin_notifies() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let n = scene.create_node();
    let events = OwnerLog::install(&mut scene, n);
    scene.add_child(root, n);
    scene.set_size(n, 20.0, 20.0);
    scene.update();
    assert!(scene.node(n).within_bounds_margin());

    scene.set_x(n, 5000.0);
    scene.update();
    assert!(!scene.node(n).within_bounds_margin());
    assert_eq!(
        events.borrow().last(),
        Some(&OwnerEvent::WithinBoundsMargin(false))
    );
}

#[test]
fn test_margin_enter_mutation_reruns_node_once() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let n = scene.create_node();
    let events = OwnerLog::install_loader(
        &mut scene,
        n,
        Some(Texture::image(TextureId(7), 50.0, 40.0)),
    );
    scene.add_child(root, n);
    scene.set_position(n, 1950.0, 10.0);
    scene.update();

    assert_eq!(scene.stats().margin_redos, 1);
    assert_eq!((scene.node(n).w(), scene.node(n).h()), (50.0, 40.0));
    // The redo picked up the loaded size.
    assert_eq!(scene.bbox(n), Rect::new(1950.0, 10.0, 50.0, 40.0));
    assert_eq!(count_entered(&events.borrow()), 1);

    scene.update();
    assert_eq!(scene.stats().margin_redos, 0);
}

#[test]
fn test_culled_parent_culls_every_descendant() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let p = add_node(&mut scene, root, 10000.0, 0.0, 100.0, 100.0);
    scene.set_clipping(p, true);
    // Would be on screen on its own.
    let c = add_node(&mut scene, p, -10000.0, 0.0, 100.0, 100.0);
    let g = add_node(&mut scene, c, 10.0, 10.0, 10.0, 10.0);
    scene.update();

    assert_eq!(scene.out_of_bounds(p), OutOfBounds::Culled);
    assert_eq!(scene.out_of_bounds(c), OutOfBounds::Culled);
    assert_eq!(scene.out_of_bounds(g), OutOfBounds::Culled);

    // Pending work below a culled node is still visited and stays culled.
    scene.set_x(g, 20.0);
    scene.update();
    assert_eq!(scene.out_of_bounds(g), OutOfBounds::Culled);
    assert!(!scene.node(g).has_updates());

    // Coming back into view restores the subtree, which is still far off
    // on its own.
    scene.set_x(p, 0.0);
    scene.update();
    assert_eq!(scene.out_of_bounds(p), OutOfBounds::Visible);
    assert_eq!(scene.out_of_bounds(c), OutOfBounds::Culled);
    assert_eq!(scene.out_of_bounds(g), OutOfBounds::Culled);
    scene.set_x(c, 0.0);
    scene.update();
    assert_eq!(scene.out_of_bounds(g), OutOfBounds::Visible);
}

#[test]
fn test_non_strict_bounds_keep_descendants_reachable() {
    let (mut scene, _) = scene_with(SceneConfig::default().with_strict_bounds(false));
    let root = scene.root();
    let p = add_node(&mut scene, root, 10000.0, 0.0, 100.0, 100.0);
    let c = add_node(&mut scene, p, -10000.0, 0.0, 100.0, 100.0);
    scene.update();

    assert_eq!(scene.out_of_bounds(p), OutOfBounds::WithinMargin);
    assert!(!scene.node(p).within_bounds_margin());
    assert_eq!(scene.out_of_bounds(c), OutOfBounds::Visible);

    // Strict bounds can be switched on for a subtree only.
    scene.set_strict_bounds(p, Some(true));
    scene.update();
    assert_eq!(scene.out_of_bounds(p), OutOfBounds::Culled);
    assert_eq!(scene.out_of_bounds(c), OutOfBounds::Culled);
}

#[test]
fn test_clipbox_makes_bounds_opaque() {
    let (mut scene, _) = scene_with(SceneConfig::default().with_strict_bounds(false));
    let root = scene.root();
    let p = add_node(&mut scene, root, 10000.0, 0.0, 100.0, 100.0);
    scene.set_clipbox(p, true);
    let c = add_node(&mut scene, p, -10000.0, 0.0, 100.0, 100.0);
    scene.update();

    assert_eq!(scene.out_of_bounds(p), OutOfBounds::Culled);
    assert_eq!(scene.out_of_bounds(c), OutOfBounds::Culled);
    // No clipping: the scissor is passed through.
    assert_eq!(scene.scissor(c), scene.scissor(root));
}

#[test]
fn test_custom_bounds_margin_is_inherited() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let p = add_node(&mut scene, root, 0.0, 0.0, 10.0, 10.0);
    scene.set_bounds_margin(p, Some(BoundsMargin::new(0.0, 0.0, 500.0, 0.0)));
    let c = add_node(&mut scene, p, 2300.0, 0.0, 10.0, 10.0);
    let outside = add_node(&mut scene, root, 2300.0, 0.0, 10.0, 10.0);
    scene.update();

    assert_eq!(scene.out_of_bounds(c), OutOfBounds::WithinMargin);
    assert_eq!(scene.out_of_bounds(outside), OutOfBounds::Culled);
}

#[test]
fn test_estimated_dimensions_widen_bbox() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let n = scene.create_node();
    scene.add_child(root, n);
    scene.set_position(n, -2000.0, 0.0);
    scene.set_dimensions(n, 10.0, 10.0, true);
    scene.update();
    assert!(scene.node(n).dims_unknown());
    assert_eq!(scene.out_of_bounds(n), OutOfBounds::Visible);

    scene.set_dimensions(n, 10.0, 10.0, false);
    scene.update();
    assert_eq!(scene.out_of_bounds(n), OutOfBounds::Culled);
}

#[test]
fn test_clipping_scissor_is_contained_in_parent() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let p = add_node(&mut scene, root, 100.0, 100.0, 200.0, 200.0);
    scene.set_clipping(p, true);
    let c = add_node(&mut scene, p, 150.0, 150.0, 400.0, 400.0);
    scene.set_clipping(c, true);
    let g = add_node(&mut scene, c, 0.0, 0.0, 10.0, 10.0);
    let far = add_node(&mut scene, p, 5000.0, 5000.0, 10.0, 10.0);
    scene.set_clipping(far, true);
    scene.update();

    let ps = scene.scissor(p).unwrap();
    let cs = scene.scissor(c).unwrap();
    assert_eq!(ps, Rect::new(100.0, 100.0, 200.0, 200.0));
    assert!(ps.contains_rect(&cs));
    assert_eq!(cs, Rect::new(250.0, 250.0, 50.0, 50.0));
    assert_eq!(scene.scissor(g), Some(cs));

    let fs = scene.scissor(far).unwrap();
    assert!(ps.contains_rect(&fs));
    assert!(fs.is_empty());
    assert_eq!(scene.out_of_bounds(far), OutOfBounds::Culled);
}

#[test]
fn test_rotated_clipping_passes_scissor_through() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let p = add_node(&mut scene, root, 100.0, 100.0, 200.0, 200.0);
    scene.set_rotation(p, 0.5);
    scene.set_clipping(p, true);
    scene.update();
    assert_eq!(scene.scissor(p), scene.scissor(root));
}

#[test]
fn test_transform_changes_reach_descendants() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let p = add_node(&mut scene, root, 100.0, 100.0, 100.0, 100.0);
    let c = add_node(&mut scene, p, 10.0, 0.0, 10.0, 10.0);
    scene.update();
    assert_eq!(scene.world_coords(c, 0.0, 0.0), (110.0, 100.0));

    scene.set_pivot(p, 0.0, 0.0);
    scene.set_scale(p, 2.0);
    scene.update();
    assert_eq!(scene.world_coords(c, 0.0, 0.0), (120.0, 100.0));
    assert_eq!(scene.world_context(c).ta, 2.0);

    scene.set_rotation(p, std::f32::consts::FRAC_PI_2);
    scene.update();
    let (x, y) = scene.world_coords(c, 0.0, 0.0);
    assert!((x - 100.0).abs() < 1e-3 && (y - 120.0).abs() < 1e-3, "({x}, {y})");
}

#[test]
fn test_mount_offsets_position() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let n = add_node(&mut scene, root, 100.0, 100.0, 40.0, 20.0);
    scene.set_mount(n, 0.5, 1.0);
    scene.update();
    assert_eq!(scene.world_coords(n, 0.0, 0.0), (80.0, 80.0));
}

#[test]
fn test_relative_functions_follow_parent_size() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let p = add_node(&mut scene, root, 0.0, 0.0, 200.0, 100.0);
    let c = scene.create_node();
    scene.add_child(p, c);
    scene.set_relative_w(c, Some(Box::new(|w: f32, _: f32| w * 0.5)));
    scene.set_relative_x(c, Some(Box::new(|w: f32, _: f32| w - 10.0)));
    scene.update();
    assert_eq!(scene.node(c).w(), 100.0);
    assert_eq!(scene.world_coords(c, 0.0, 0.0), (190.0, 0.0));

    scene.set_size(p, 400.0, 100.0);
    scene.update();
    assert_eq!(scene.node(c).w(), 200.0);
    assert_eq!(scene.world_coords(c, 0.0, 0.0), (390.0, 0.0));

    // A plain setter replaces the function.
    scene.set_x(c, 5.0);
    scene.set_size(p, 800.0, 100.0);
    scene.update();
    assert_eq!(scene.world_coords(c, 0.0, 0.0), (5.0, 0.0));
    assert_eq!(scene.node(c).w(), 400.0);
}

#[test]
fn test_enabled_notifications() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let p = add_node(&mut scene, root, 0.0, 0.0, 10.0, 10.0);
    let c = scene.create_node();
    let events = OwnerLog::install(&mut scene, c);

    scene.add_child(p, c);
    scene.set_visible(p, false);
    scene.set_alpha(p, 0.5);
    scene.set_visible(p, true);
    scene.detach(p);

    assert_eq!(
        *events.borrow(),
        vec![
            OwnerEvent::Enabled(true),
            OwnerEvent::Enabled(false),
            OwnerEvent::Enabled(true),
            OwnerEvent::Enabled(false),
        ]
    );
}

#[test]
fn test_dimension_notifications_follow_texture() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let n = scene.create_node();
    let events = OwnerLog::install(&mut scene, n);
    scene.add_child(root, n);
    scene.set_texture(n, Some(Texture::image(TextureId(3), 64.0, 32.0)));
    assert!(events.borrow().contains(&OwnerEvent::Dimensions(64.0, 32.0)));

    // Explicit dimensions win over the texture size.
    scene.set_size(n, 10.0, 10.0);
    scene.set_texture(n, Some(Texture::image(TextureId(4), 128.0, 128.0)));
    assert_eq!((scene.node(n).w(), scene.node(n).h()), (10.0, 10.0));
}

#[test]
fn test_update_callbacks_run_in_order() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let n = add_node(&mut scene, root, 0.0, 0.0, 10.0, 10.0);
    let c = add_node(&mut scene, n, 0.0, 0.0, 10.0, 10.0);
    let calls = Rc::new(Cell::new(0));
    let seen_child_x = Rc::new(Cell::new(f32::NAN));

    let counter = calls.clone();
    scene.set_on_update(
        n,
        Some(Box::new(move |graph: &mut SceneGraph, id: NodeId| {
            counter.set(counter.get() + 1);
            graph.set_x(id, 42.0);
        })),
    );
    let seen = seen_child_x.clone();
    scene.set_on_after_update(
        n,
        Some(Box::new(move |graph: &mut SceneGraph, _: NodeId| {
            seen.set(graph.world_coords(c, 0.0, 0.0).0);
        })),
    );
    scene.update();

    assert_eq!(calls.get(), 1);
    // The mutation made by the callback is applied in the same pass.
    assert_eq!(scene.world_coords(n, 0.0, 0.0), (42.0, 0.0));
    assert_eq!(seen_child_x.get(), 42.0);
    assert!(!scene.node(n).has_updates());
}

#[test]
fn test_callbacks_may_remove_later_siblings() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let a = add_image(&mut scene, root, 0.0, 0.0, 10.0, 10.0);
    let b = add_image(&mut scene, root, 0.0, 0.0, 10.0, 10.0);
    let c = add_image(&mut scene, root, 0.0, 0.0, 10.0, 10.0);
    add_image(&mut scene, c, 0.0, 0.0, 10.0, 10.0);
    let d = add_image(&mut scene, root, 0.0, 0.0, 10.0, 10.0);

    scene.set_on_update(
        a,
        Some(Box::new(move |graph: &mut SceneGraph, _: NodeId| {
            if graph.contains(b) {
                graph.remove(b);
            }
        })),
    );
    scene.set_on_after_update(
        a,
        Some(Box::new(move |graph: &mut SceneGraph, _: NodeId| {
            if graph.contains(c) {
                graph.remove(c);
            }
        })),
    );

    let mut sink = RecordingSink::new();
    scene.frame(&mut sink);
    assert!(!scene.contains(b));
    assert!(!scene.contains(c));
    assert_eq!(scene.children(root), &[a, d]);
    assert_eq!(sink.quad_nodes(), vec![a, d]);
    assert!(scene.world_context(d).alpha > 0.0);
}

#[test]
fn test_callback_may_remove_sibling_of_culled_branch() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let far = add_node(&mut scene, root, 9000.0, 0.0, 10.0, 10.0);
    let a = add_node(&mut scene, far, 0.0, 0.0, 10.0, 10.0);
    let b = add_node(&mut scene, far, 0.0, 0.0, 10.0, 10.0);
    scene.update();
    assert_eq!(scene.out_of_bounds(a), OutOfBounds::Culled);

    scene.set_on_update(
        a,
        Some(Box::new(move |graph: &mut SceneGraph, _: NodeId| {
            if graph.contains(b) {
                graph.remove(b);
            }
        })),
    );
    scene.update();
    assert!(!scene.contains(b));
    assert_eq!(scene.children(far), &[a]);
}

#[test]
fn test_detached_nodes_are_not_updated() {
    let (mut scene, _) = scene();
    let n = scene.create_node();
    scene.set_position(n, 10.0, 10.0);
    scene.update();
    assert_eq!(scene.world_context(n).alpha, 0.0);
    assert_eq!(scene.stats().nodes_updated, 1);
}

#[test]
fn test_stale_handles_are_detected() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let n = add_node(&mut scene, root, 0.0, 0.0, 10.0, 10.0);
    scene.remove(n);
    assert!(scene.get(n).is_none());

    let m = scene.create_node();
    assert_ne!(m, n);
    assert!(scene.get(n).is_none());
}

#[test]
fn test_images_are_drawn_in_tree_order() {
    let (mut scene, _) = scene();
    let root = scene.root();
    let a = add_image(&mut scene, root, 0.0, 0.0, 10.0, 10.0);
    let b = add_image(&mut scene, a, 0.0, 0.0, 10.0, 10.0);
    let hidden = add_image(&mut scene, root, 0.0, 0.0, 10.0, 10.0);
    scene.set_alpha(hidden, 0.0);
    let culled = add_image(&mut scene, root, 9000.0, 0.0, 10.0, 10.0);
    let c = add_image(&mut scene, root, 0.0, 0.0, 10.0, 10.0);

    let mut sink = RecordingSink::new();
    let stats = scene.frame(&mut sink);
    assert_eq!(sink.quad_nodes(), vec![a, b, c]);
    assert_eq!(stats.quads, 3);
    assert_eq!(scene.out_of_bounds(culled), OutOfBounds::Culled);
}
