//! Rendering module
//!
//! Everything between a culled scene and the device: pipeline states, the
//! camera boundary, device traits and backends, and the render groups the
//! cull visitor fills.
//!
//! ## Architecture
//!
//! ```text
//! CullVisitor ─▶ RenderGroup (opaque / transparent)
//!                 └─ StateKey ─▶ [RenderGroupState; n]   (capacity-bounded buckets)
//!                                   └─ BucketResources per DeviceKey
//!                                        (layout, uniform buffer, resource set, pipeline)
//! SceneRenderer ─▶ CommandList
//! ```
//!
//! Device objects are only ever created through [`ResourceFactory`] and
//! released explicitly by their owner.

pub mod backends;
mod camera;
mod device;
mod geometry_buffers;
mod pipeline_state;
mod render_group;
mod scene_renderer;

pub use camera::{Camera, Viewport};
pub use device::{
    BoundResource, BufferHandle, BufferUsage, CommandList, DeviceContext, DeviceId, DeviceKey,
    FactoryId, FilterMode, GraphicsDevice, GraphicsPipelineDescription, OutputDescription,
    PipelineHandle, ResourceFactory, ResourceKind, ResourceLayoutDescription,
    ResourceLayoutElement, ResourceLayoutHandle, ResourceSetDescription, ResourceSetHandle,
    SamplerDescription, SamplerHandle, ShaderStages, TextureDescription, TextureFormat,
    TextureHandle,
};
pub use geometry_buffers::{GeometryBufferCache, GeometryBuffers};
pub use pipeline_state::{
    BlendFactor, BlendOperation, BlendState, ColorWriteMask, CompareFunction, CullMode,
    DepthStencilState, FrontFace, PipelineState, PolygonMode, RasterizerState, ShaderSet,
    TextureBinding, UniformBinding,
};
pub use render_group::{
    BucketId, BucketResources, RenderGroup, RenderGroupElement, RenderGroupKind, RenderGroupState,
    StateKey,
};
pub use scene_renderer::{FrameStats, SceneRenderer};

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::Mat4;

/// Per-instance uniform record written into a bucket's uniform buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceUniforms {
    /// Model-view matrix, column major
    pub model_view: [[f32; 4]; 4],
    /// Inverse transpose of the model-view, column major
    pub normal: [[f32; 4]; 4],
}

impl InstanceUniforms {
    /// Record from a model-view and its normal matrix
    pub fn new(model_view: &Mat4, normal: &Mat4) -> Self {
        Self {
            model_view: (*model_view).into(),
            normal: (*normal).into(),
        }
    }
}

/// Per-frame uniform record shared by every bucket
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    /// World to eye space
    pub view: [[f32; 4]; 4],
    /// Eye to clip space
    pub projection: [[f32; 4]; 4],
}

impl FrameUniforms {
    /// Record from a camera
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            view: (*camera.view_matrix()).into(),
            projection: (*camera.projection_matrix()).into(),
        }
    }
}

/// Errors reported by devices and device-resource caches
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// Resource creation failed
    ///
    /// Occurs when the device cannot create a buffer, texture, sampler,
    /// resource layout, resource set or pipeline.
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Writing into a device buffer failed
    #[error("Buffer update failed: {0}")]
    BufferUpdateFailed(String),

    /// The device cannot satisfy a configured requirement
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A handle does not name a live resource
    #[error("Unknown resource: {0}")]
    UnknownResource(String),
}

/// Result type for device operations
pub type RenderResult<T> = Result<T, RenderError>;
