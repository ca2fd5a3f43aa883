//! # Scene Engine
//!
//! Retained-mode scene graph core: a per-frame cull traversal that turns a
//! tree of nodes into render-state-sorted buckets, with lazily created and
//! cached device resources.
//!
//! ## Features
//!
//! - **Scene Graph**: Groups, transforms, drawables, billboards and text nodes
//! - **Frustum Culling**: Hierarchical bounding-box tests with per-primitive-set culling
//! - **State Batching**: Opaque and transparent render groups keyed by pipeline state
//! - **Resource Caching**: Pipelines, uniform buffers and geometry built once per device
//! - **Headless Backend**: In-memory device for tests and tooling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     scene_engine::foundation::logging::init_from_config(&config);
//!
//!     let positions = [
//!         Vec3::new(-1.0, -1.0, 0.0),
//!         Vec3::new(1.0, -1.0, 0.0),
//!         Vec3::new(0.0, 1.0, 0.0),
//!     ];
//!     let triangle = Drawable::whole(
//!         Geometry::from_positions(&positions, IndexData::U16(vec![0, 1, 2])),
//!         PrimitiveTopology::TriangleList,
//!     );
//!     let root = Node::transform(Mat4::translation(5.0, 0.0, 0.0))
//!         .with_child(Node::drawable(triangle));
//!
//!     let camera = Camera::perspective_look_at(
//!         Vec3::new(0.0, 0.0, 20.0),
//!         Vec3::zeros(),
//!         Vec3::y(),
//!         1.0,
//!         Viewport::new(800, 600),
//!         0.1,
//!         100.0,
//!     );
//!
//!     let device = HeadlessDevice::new();
//!     let context = DeviceContext::new(&device, &device);
//!     let mut renderer = SceneRenderer::new(&config)?;
//!     let mut commands = HeadlessCommandList::new();
//!
//!     let stats = renderer.render_frame(&root, &camera, &context, &mut commands)?;
//!     println!("{} draw calls", stats.draw_calls);
//!
//!     renderer.release_resources(&device);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]
#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

pub mod config;
pub mod cull;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, CullingConfig, EngineConfig, RenderGroupConfig},
        cull::{CullError, CullResult, CullStats, CullVisitor},
        foundation::math::{Mat4, Mat4Ext, Vec3},
        render::{
            backends::{HeadlessCommandList, HeadlessDevice},
            Camera, CommandList, DeviceContext, FrameStats, GraphicsDevice, PipelineState,
            RenderGroup, RenderGroupKind, ResourceFactory, SceneRenderer, Viewport,
        },
        scene::{
            BillboardMode, BoundingBox, Drawable, Geometry, IndexData, Node, PrimitiveSet,
            PrimitiveTopology, TextNode,
        },
    };
}
