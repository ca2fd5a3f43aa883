//! Device and resource-factory boundary
//!
//! The engine treats the GPU backend as opaque: it creates resources through
//! [`ResourceFactory`], writes buffers through [`GraphicsDevice`] and
//! records draws into a [`CommandList`]. Methods on the factory and device
//! take `&self`; backends use interior mutability for their bookkeeping.

use std::fmt;

use bitflags::bitflags;

use crate::render::{PipelineState, RenderResult};
use crate::scene::{IndexFormat, PrimitiveTopology, VertexLayout};

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }
    };
}

handle_type!(
    /// Handle to a device buffer
    BufferHandle
);
handle_type!(
    /// Handle to a device texture
    TextureHandle
);
handle_type!(
    /// Handle to a device sampler
    SamplerHandle
);
handle_type!(
    /// Handle to a resource layout
    ResourceLayoutHandle
);
handle_type!(
    /// Handle to a resource set bound against a layout
    ResourceSetHandle
);
handle_type!(
    /// Handle to a graphics pipeline
    PipelineHandle
);

/// Identity of a graphics device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u64);

/// Identity of a resource factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactoryId(pub u64);

/// Device-resource caches are keyed by the device/factory pair that built them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey {
    /// Device that writes and draws
    pub device: DeviceId,
    /// Factory that created the resources
    pub factory: FactoryId,
}

bitflags! {
    /// How a buffer is used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Vertex data
        const VERTEX = 1 << 0;
        /// Index data
        const INDEX = 1 << 1;
        /// Uniform data
        const UNIFORM = 1 << 2;
        /// Rewritten every frame
        const DYNAMIC = 1 << 3;
    }
}

bitflags! {
    /// Shader stages a resource is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Vertex stage
        const VERTEX = 1 << 0;
        /// Fragment stage
        const FRAGMENT = 1 << 1;
    }
}

/// Kind of a resource slot in a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Uniform buffer bound at a fixed offset
    UniformBuffer,
    /// Uniform buffer bound with a per-draw dynamic offset
    DynamicUniformBuffer,
    /// Texture read through a sampler
    TextureSampler,
}

/// One slot of a resource layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLayoutElement {
    /// Binding name
    pub name: String,
    /// Slot kind
    pub kind: ResourceKind,
    /// Visible stages
    pub stages: ShaderStages,
}

/// Ordered resource slots
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ResourceLayoutDescription {
    /// Slots in binding order
    pub elements: Vec<ResourceLayoutElement>,
}

/// A concrete resource bound into a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundResource {
    /// Buffer range
    Buffer {
        /// Buffer
        buffer: BufferHandle,
        /// Start of the range
        offset: u64,
        /// Bytes visible per bind
        size: u64,
    },
    /// Texture and sampler pair
    TextureSampler {
        /// Texture
        texture: TextureHandle,
        /// Sampler
        sampler: SamplerHandle,
    },
}

/// Resources bound against a layout, one per slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSetDescription {
    /// Layout the set satisfies
    pub layout: ResourceLayoutHandle,
    /// Resources in slot order
    pub resources: Vec<BoundResource>,
}

/// Pixel format of a texture or attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    /// 8-bit RGBA, linear
    #[default]
    Rgba8Unorm,
    /// 8-bit BGRA, linear
    Bgra8Unorm,
    /// 32-bit float depth
    Depth32Float,
    /// 24-bit depth with 8-bit stencil
    Depth24Stencil8,
}

/// Texture creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDescription {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Texel format
    pub format: TextureFormat,
    /// Mip level count
    pub mip_levels: u32,
}

/// Texture filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Nearest texel
    Nearest,
    /// Linear interpolation
    #[default]
    Linear,
}

/// Sampler creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerDescription {
    /// Magnification and minification filter
    pub filter: FilterMode,
    /// Repeat outside 0..1 instead of clamping
    pub repeat: bool,
}

/// Attachments a pipeline renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputDescription {
    /// Color attachment format
    pub color_format: TextureFormat,
    /// Depth attachment format, if any
    pub depth_format: Option<TextureFormat>,
    /// MSAA sample count
    pub sample_count: u32,
}

impl Default for OutputDescription {
    fn default() -> Self {
        Self {
            color_format: TextureFormat::Bgra8Unorm,
            depth_format: Some(TextureFormat::Depth32Float),
            sample_count: 1,
        }
    }
}

/// Everything a device needs to build a graphics pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsPipelineDescription {
    /// Shaders, blend, rasterizer and depth-stencil configuration
    pub pipeline_state: PipelineState,
    /// Primitive assembly
    pub topology: PrimitiveTopology,
    /// Vertex input layout
    pub vertex_layout: VertexLayout,
    /// Resource layouts in set order
    pub resource_layouts: Vec<ResourceLayoutHandle>,
    /// Render target formats
    pub output: OutputDescription,
}

/// Creates and destroys device resources
pub trait ResourceFactory {
    /// Identity used to key caches
    fn id(&self) -> FactoryId;

    /// Create a buffer of `size` bytes
    fn create_buffer(&self, size: u64, usage: BufferUsage) -> RenderResult<BufferHandle>;

    /// Create a texture
    fn create_texture(&self, description: &TextureDescription) -> RenderResult<TextureHandle>;

    /// Create a sampler
    fn create_sampler(&self, description: &SamplerDescription) -> RenderResult<SamplerHandle>;

    /// Create a resource layout
    fn create_resource_layout(
        &self,
        description: &ResourceLayoutDescription,
    ) -> RenderResult<ResourceLayoutHandle>;

    /// Create a resource set
    fn create_resource_set(&self, description: &ResourceSetDescription) -> RenderResult<ResourceSetHandle>;

    /// Create a graphics pipeline
    fn create_graphics_pipeline(
        &self,
        description: &GraphicsPipelineDescription,
    ) -> RenderResult<PipelineHandle>;

    /// Destroy a buffer
    fn destroy_buffer(&self, buffer: BufferHandle);

    /// Destroy a texture
    fn destroy_texture(&self, texture: TextureHandle);

    /// Destroy a sampler
    fn destroy_sampler(&self, sampler: SamplerHandle);

    /// Destroy a resource layout
    fn destroy_resource_layout(&self, layout: ResourceLayoutHandle);

    /// Destroy a resource set
    fn destroy_resource_set(&self, set: ResourceSetHandle);

    /// Destroy a pipeline
    fn destroy_pipeline(&self, pipeline: PipelineHandle);
}

/// Writes device memory
pub trait GraphicsDevice {
    /// Identity used to key caches
    fn id(&self) -> DeviceId;

    /// Copy `data` into `buffer` starting at `offset`
    fn update_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()>;

    /// Required alignment of dynamic uniform offsets
    fn uniform_buffer_alignment(&self) -> u64;
}

/// Records draw commands
pub trait CommandList {
    /// Bind a pipeline
    fn set_pipeline(&mut self, pipeline: PipelineHandle);

    /// Bind the vertex buffer
    fn set_vertex_buffer(&mut self, buffer: BufferHandle);

    /// Bind the index buffer
    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat);

    /// Bind a resource set at `slot`, with one offset per dynamic slot
    fn set_resource_set(&mut self, slot: u32, set: ResourceSetHandle, dynamic_offsets: &[u32]);

    /// Draw indexed primitives
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
}

/// The device and factory a traversal or frame works against
#[derive(Clone, Copy)]
pub struct DeviceContext<'a> {
    /// Device that writes buffers
    pub device: &'a dyn GraphicsDevice,
    /// Factory that creates resources
    pub factory: &'a dyn ResourceFactory,
}

impl<'a> DeviceContext<'a> {
    /// Pair a device with a factory
    pub fn new(device: &'a dyn GraphicsDevice, factory: &'a dyn ResourceFactory) -> Self {
        Self { device, factory }
    }

    /// Cache key of this pair
    pub fn key(&self) -> DeviceKey {
        DeviceKey {
            device: self.device.id(),
            factory: self.factory.id(),
        }
    }
}

impl fmt::Debug for DeviceContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext").field("key", &self.key()).finish()
    }
}
