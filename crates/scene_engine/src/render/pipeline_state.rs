//! Pipeline state descriptions
//!
//! The full rendering configuration of a drawable apart from its geometry.
//! Every field is a plain value so two states built the same way hash and
//! compare equal, and share one device pipeline.

use bitflags::bitflags;

/// Face culling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// No culling
    None,
    /// Cull front faces
    Front,
    /// Cull back faces
    #[default]
    Back,
}

/// Winding order of front faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Counter-clockwise
    #[default]
    CounterClockwise,
    /// Clockwise
    Clockwise,
}

/// Polygon rendering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    /// Solid rendering
    #[default]
    Fill,
    /// Wireframe
    Line,
    /// Points at vertices
    Point,
}

/// Depth and stencil comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    /// Never passes
    Never,
    /// Passes when less
    #[default]
    Less,
    /// Passes when equal
    Equal,
    /// Passes when less or equal
    LessEqual,
    /// Passes when greater
    Greater,
    /// Always passes
    Always,
}

/// Blend factor applied to source or destination color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// 0
    Zero,
    /// 1
    One,
    /// Source alpha
    SourceAlpha,
    /// 1 - source alpha
    InverseSourceAlpha,
    /// Destination alpha
    DestinationAlpha,
    /// 1 - destination alpha
    InverseDestinationAlpha,
}

/// How blended source and destination combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperation {
    /// src + dst
    #[default]
    Add,
    /// src - dst
    Subtract,
    /// dst - src
    ReverseSubtract,
    /// min(src, dst)
    Min,
    /// max(src, dst)
    Max,
}

bitflags! {
    /// Color channels written by the pipeline
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u8 {
        /// Red channel
        const RED = 1 << 0;
        /// Green channel
        const GREEN = 1 << 1;
        /// Blue channel
        const BLUE = 1 << 2;
        /// Alpha channel
        const ALPHA = 1 << 3;
    }
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        Self::all()
    }
}

/// Blend configuration
///
/// `alpha_blending` is the bit that routes drawables to the transparent
/// render group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    /// Enable alpha blending
    pub alpha_blending: bool,
    /// Source factor
    pub source_factor: BlendFactor,
    /// Destination factor
    pub destination_factor: BlendFactor,
    /// Combination operation
    pub operation: BlendOperation,
    /// Channels written
    pub write_mask: ColorWriteMask,
}

impl BlendState {
    /// Replace destination color
    pub const fn opaque() -> Self {
        Self {
            alpha_blending: false,
            source_factor: BlendFactor::One,
            destination_factor: BlendFactor::Zero,
            operation: BlendOperation::Add,
            write_mask: ColorWriteMask::all(),
        }
    }

    /// Standard non-premultiplied alpha blending
    pub const fn alpha() -> Self {
        Self {
            alpha_blending: true,
            source_factor: BlendFactor::SourceAlpha,
            destination_factor: BlendFactor::InverseSourceAlpha,
            operation: BlendOperation::Add,
            write_mask: ColorWriteMask::all(),
        }
    }

    /// Whether geometry using this blend belongs in the transparent group
    pub const fn is_transparent(&self) -> bool {
        self.alpha_blending
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self::opaque()
    }
}

/// Rasterizer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RasterizerState {
    /// Backface culling
    pub cull_mode: CullMode,
    /// Front face winding
    pub front_face: FrontFace,
    /// Fill mode
    pub polygon_mode: PolygonMode,
    /// Clip against the depth range instead of clamping
    pub depth_clip: bool,
    /// Enable scissor testing
    pub scissor_test: bool,
}

/// Depth and stencil configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    /// Enable depth testing
    pub depth_test: bool,
    /// Enable depth writing
    pub depth_write: bool,
    /// Depth comparison
    pub compare: CompareFunction,
    /// Enable stencil testing
    pub stencil_test: bool,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            compare: CompareFunction::Less,
            stencil_test: false,
        }
    }
}

/// Vertex and fragment shader pair, by name
///
/// Shader source generation and compilation happen outside this crate; the
/// names are handed to the device when the pipeline is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderSet {
    /// Vertex shader name
    pub vertex: String,
    /// Fragment shader name
    pub fragment: String,
}

impl ShaderSet {
    /// Shader pair from two names
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }
}

impl Default for ShaderSet {
    fn default() -> Self {
        Self::new("scene_engine.vert", "scene_engine.frag")
    }
}

/// A texture and the sampler that reads it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureBinding {
    /// Device texture
    pub texture: crate::render::TextureHandle,
    /// Device sampler
    pub sampler: crate::render::SamplerHandle,
}

/// A uniform buffer shared by every drawable using the state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformBinding {
    /// Device buffer
    pub buffer: crate::render::BufferHandle,
    /// Bytes bound from the start of the buffer
    pub size: u64,
}

/// Complete rendering configuration of a drawable, excluding geometry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PipelineState {
    /// Shader pair
    pub shaders: ShaderSet,
    /// Blend configuration
    pub blend: BlendState,
    /// Rasterizer configuration
    pub rasterizer: RasterizerState,
    /// Depth and stencil configuration
    pub depth_stencil: DepthStencilState,
    /// Texture/sampler pairs, one resource slot each
    pub textures: Vec<TextureBinding>,
    /// Shared uniform buffers, one resource slot each
    pub uniforms: Vec<UniformBinding>,
}

impl PipelineState {
    /// Depth-tested, depth-written, backface-culled, no blending
    pub fn opaque() -> Self {
        Self::default()
    }

    /// Alpha blended, depth-tested without depth writes, no face culling
    pub fn transparent() -> Self {
        Self {
            blend: BlendState::alpha(),
            rasterizer: RasterizerState {
                cull_mode: CullMode::None,
                ..RasterizerState::default()
            },
            depth_stencil: DepthStencilState {
                depth_write: false,
                ..DepthStencilState::default()
            },
            ..Self::default()
        }
    }

    /// Add a texture/sampler pair
    #[must_use]
    pub fn with_texture(mut self, binding: TextureBinding) -> Self {
        self.textures.push(binding);
        self
    }

    /// Add a shared uniform buffer
    #[must_use]
    pub fn with_uniform(mut self, binding: UniformBinding) -> Self {
        self.uniforms.push(binding);
        self
    }

    /// Whether drawables using this state render in the transparent group
    pub const fn is_transparent(&self) -> bool {
        self.blend.is_transparent()
    }
}
