#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use strata::prelude::*;
use strata::{RenderTarget, SceneError, SceneResult};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-6
}

/// Counters shared between a test and the pool owned by its scene.
#[derive(Debug, Default)]
pub struct PoolCounters {
    pub allocations: u32,
    pub releases: u32,
    pub failures: u32,
    /// Make every allocation fail while set.
    pub fail: bool,
}

/// Pool that counts calls and can be told to fail.
pub struct CountingPool {
    inner: TexturePool,
    counters: Rc<RefCell<PoolCounters>>,
}

impl RenderTargetPool for CountingPool {
    fn allocate(&mut self, width: u32, height: u32) -> SceneResult<RenderTarget> {
        let mut counters = self.counters.borrow_mut();
        if counters.fail {
            counters.failures += 1;
            return Err(SceneError::allocation(width, height, "out of video memory"));
        }
        counters.allocations += 1;
        self.inner.allocate(width, height)
    }

    fn release(&mut self, target: RenderTarget) {
        self.counters.borrow_mut().releases += 1;
        self.inner.release(target);
    }
}

/// A 1920×1080 scene with a counting pool.
pub fn scene() -> (SceneGraph, Rc<RefCell<PoolCounters>>) {
    scene_with(SceneConfig::default())
}

pub fn scene_with(config: SceneConfig) -> (SceneGraph, Rc<RefCell<PoolCounters>>) {
    init_logger();
    let counters = Rc::new(RefCell::new(PoolCounters::default()));
    let pool = CountingPool {
        inner: TexturePool::default(),
        counters: counters.clone(),
    };
    (SceneGraph::new(config, Box::new(pool)), counters)
}

/// Attach a node without texture.
pub fn add_node(scene: &mut SceneGraph, parent: NodeId, x: f32, y: f32, w: f32, h: f32) -> NodeId {
    let id = scene.create_node();
    scene.add_child(parent, id);
    scene.set_position(id, x, y);
    scene.set_size(id, w, h);
    id
}

/// Attach a node displaying an image of its own size.
pub fn add_image(scene: &mut SceneGraph, parent: NodeId, x: f32, y: f32, w: f32, h: f32) -> NodeId {
    let id = add_node(scene, parent, x, y, w, h);
    scene.set_texture(id, Some(Texture::image(TextureId(id.as_u64()), w, h)));
    id
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OwnerEvent {
    Enabled(bool),
    WithinBoundsMargin(bool),
    Dimensions(f32, f32),
}

/// Owner that logs every notification.
pub struct OwnerLog {
    pub events: Rc<RefCell<Vec<OwnerEvent>>>,
    /// Texture set on the node when it first enters the bounds margin,
    /// like an image loader would.
    pub load_on_enter: Option<Texture>,
}

impl OwnerLog {
    pub fn install(scene: &mut SceneGraph, node: NodeId) -> Rc<RefCell<Vec<OwnerEvent>>> {
        Self::install_loader(scene, node, None)
    }

    pub fn install_loader(
        scene: &mut SceneGraph,
        node: NodeId,
        load_on_enter: Option<Texture>,
    ) -> Rc<RefCell<Vec<OwnerEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        scene.set_owner(
            node,
            Some(Box::new(OwnerLog {
                events: events.clone(),
                load_on_enter,
            })),
        );
        events
    }
}

impl NodeOwner for OwnerLog {
    fn on_enabled_changed(&mut self, _graph: &mut SceneGraph, _node: NodeId, enabled: bool) {
        self.events.borrow_mut().push(OwnerEvent::Enabled(enabled));
    }

    fn on_within_bounds_margin(&mut self, graph: &mut SceneGraph, node: NodeId, within: bool) {
        self.events
            .borrow_mut()
            .push(OwnerEvent::WithinBoundsMargin(within));
        if within && let Some(texture) = self.load_on_enter.take() {
            graph.set_texture(node, Some(texture));
        }
    }

    fn on_dimensions_changed(&mut self, _graph: &mut SceneGraph, _node: NodeId, w: f32, h: f32) {
        self.events.borrow_mut().push(OwnerEvent::Dimensions(w, h));
    }
}

/// Shader active when the quad of `node` was submitted.
pub fn shader_for(sink: &RecordingSink, node: NodeId, result: bool) -> Option<Option<ShaderId>> {
    let mut shader = None;
    for command in &sink.commands {
        match command {
            RenderCommand::SetShader { shader: s, .. } => shader = *s,
            RenderCommand::Quad(q) if q.node == node && q.result == result => return Some(shader),
            _ => {}
        }
    }
    None
}

/// Opening parameters of every offscreen pass, in order.
pub fn render_texture_passes(sink: &RecordingSink) -> Vec<RenderTextureInfo> {
    sink.commands
        .iter()
        .filter_map(|c| match c {
            RenderCommand::StartRenderTexture(info) => Some(*info),
            _ => None,
        })
        .collect()
}
