//! A retained 2D scene graph with incremental updates.
//!
//! [`SceneGraph`] owns a tree of [`Node`]s. Property setters only record
//! what became stale; [`SceneGraph::update`] then recomputes world and
//! render contexts, scissors and culling for the dirty parts of the tree,
//! and [`SceneGraph::render`] reports the visible quads in draw order to a
//! [`RenderSink`]. Subtrees can be rendered to offscreen targets obtained
//! from a [`RenderTargetPool`] and z-indexed nodes are drawn out of tree
//! order within their z-context.
//!
//! ```
//! use strata::prelude::*;
//!
//! let mut scene = SceneGraph::with_default_pool(SceneConfig::default());
//! let root = scene.root();
//! let node = scene.create_node();
//! scene.add_child(root, node);
//! scene.set_position(node, 10.0, 20.0);
//! scene.set_texture(node, Some(Texture::image(TextureId(1), 64.0, 64.0)));
//!
//! let mut sink = RecordingSink::new();
//! let stats = scene.frame(&mut sink);
//! assert_eq!(stats.quads, 1);
//! assert_eq!(scene.world_coords(node, 0.0, 0.0), (10.0, 20.0));
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod node;
pub mod owner;
pub mod render_state;
pub mod scene;
pub mod stats;
pub mod texture;
pub mod texturizer;
pub mod tree;

pub use backend::{
    RenderTarget, RenderTargetPool, RenderTargetRef, TexturePool, TexturePoolConfig,
    TexturePoolStats,
};
pub use config::SceneConfig;
pub use context::Context;
pub use error::{SceneError, SceneResult};
pub use geometry::{BoundsMargin, Color, Rect};
pub use node::{Node, OutOfBounds, RecalcFlags};
pub use render_state::{Quad, RecordingSink, RenderCommand, RenderSink, ShaderId};
pub use scene::SceneGraph;
pub use stats::FrameStats;
pub use texture::{QuadTexture, ResultTexture, Texture, TextureId};
pub use tree::NodeId;

pub mod prelude {
    pub use crate::backend::{RenderTargetPool, TexturePool, TexturePoolConfig};
    pub use crate::geometry::{BoundsMargin, Color, Rect};
    pub use crate::layout::{FlexLayout, RelativeFn};
    pub use crate::node::{OutOfBounds, RecalcFlags};
    pub use crate::owner::NodeOwner;
    pub use crate::render_state::{
        Quad, RecordingSink, RenderCommand, RenderSink, RenderTextureInfo, RenderTextureOutcome,
        ShaderId,
    };
    pub use crate::texture::{QuadTexture, Texture, TextureId};
    pub use crate::{FrameStats, NodeId, SceneConfig, SceneGraph};
}
