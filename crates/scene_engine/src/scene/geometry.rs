//! Vertex and index data owned by drawables
//!
//! Geometry is stored as raw bytes described by a [`VertexLayout`], which is
//! also the vertex-layout signature used in render-state keys.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::Vec3;
use crate::scene::{BoundingBox, SceneError, SceneResult};

/// How indices are assembled into primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Independent points
    PointList,
    /// Independent line segments
    LineList,
    /// Connected line segments
    LineStrip,
    /// Independent triangles
    #[default]
    TriangleList,
    /// Connected triangles
    TriangleStrip,
}

/// Meaning of a vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    /// Object-space position, required for bounds
    Position,
    /// Surface normal
    Normal,
    /// Texture coordinate
    TextureCoordinate,
    /// Vertex color
    Color,
}

/// Storage format of a vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// Two 32-bit floats
    Float2,
    /// Three 32-bit floats
    Float3,
    /// Four 32-bit floats
    Float4,
    /// Four normalized unsigned bytes
    UByte4Norm,
}

impl VertexFormat {
    /// Size of one attribute in bytes
    pub const fn size(self) -> u32 {
        match self {
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
            Self::UByte4Norm => 4,
        }
    }
}

/// One attribute within a vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElement {
    /// Attribute meaning
    pub semantic: VertexSemantic,
    /// Attribute format
    pub format: VertexFormat,
    /// Byte offset within the vertex
    pub offset: u32,
}

/// Vertex-layout signature
///
/// Two drawables with equal layouts can share a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    elements: Vec<VertexElement>,
    stride: u32,
}

impl VertexLayout {
    /// Build a tightly packed layout from attributes in order
    pub fn new(attributes: &[(VertexSemantic, VertexFormat)]) -> Self {
        let mut offset = 0;
        let elements = attributes
            .iter()
            .map(|&(semantic, format)| {
                let element = VertexElement { semantic, format, offset };
                offset += format.size();
                element
            })
            .collect();
        Self { elements, stride: offset }
    }

    /// Layout matching [`Vertex`]
    pub fn position_normal_texture() -> Self {
        Self::new(&[
            (VertexSemantic::Position, VertexFormat::Float3),
            (VertexSemantic::Normal, VertexFormat::Float3),
            (VertexSemantic::TextureCoordinate, VertexFormat::Float2),
        ])
    }

    /// Layout with positions only
    pub fn position_only() -> Self {
        Self::new(&[(VertexSemantic::Position, VertexFormat::Float3)])
    }

    /// Bytes between consecutive vertices
    pub const fn stride(&self) -> u32 {
        self.stride
    }

    /// Attributes in declaration order
    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    /// Find the attribute with the given meaning
    pub fn element(&self, semantic: VertexSemantic) -> Option<&VertexElement> {
        self.elements.iter().find(|e| e.semantic == semantic)
    }
}

/// Standard vertex: position, normal, texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    /// 3D position
    pub position: [f32; 3],
    /// Surface normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Vertex at a position with a +Z normal
    pub const fn at(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: [x, y, z],
            normal: [0.0, 0.0, 1.0],
            tex_coord: [0.0, 0.0],
        }
    }
}

/// Width of index values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit indices
    U16,
    /// 32-bit indices
    U32,
}

/// Index buffer contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexData {
    /// 16-bit indices
    U16(Vec<u16>),
    /// 32-bit indices
    U32(Vec<u32>),
}

impl IndexData {
    /// Number of indices
    pub fn len(&self) -> usize {
        match self {
            Self::U16(indices) => indices.len(),
            Self::U32(indices) => indices.len(),
        }
    }

    /// Whether there are no indices
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index value at position `i`
    pub fn get(&self, i: usize) -> Option<u32> {
        match self {
            Self::U16(indices) => indices.get(i).map(|&v| u32::from(v)),
            Self::U32(indices) => indices.get(i).copied(),
        }
    }

    /// Index width
    pub const fn format(&self) -> IndexFormat {
        match self {
            Self::U16(_) => IndexFormat::U16,
            Self::U32(_) => IndexFormat::U32,
        }
    }

    /// Raw bytes for upload
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::U16(indices) => bytemuck::cast_slice(indices),
            Self::U32(indices) => bytemuck::cast_slice(indices),
        }
    }
}

/// Vertex and index data of a drawable
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    layout: VertexLayout,
    vertex_data: Vec<u8>,
    indices: IndexData,
}

impl Geometry {
    /// Wrap raw vertex bytes described by `layout`
    ///
    /// The layout must carry a `Float3` position and the data must be a whole
    /// number of vertices.
    pub fn new(layout: VertexLayout, vertex_data: Vec<u8>, indices: IndexData) -> SceneResult<Self> {
        match layout.element(VertexSemantic::Position) {
            Some(e) if e.format == VertexFormat::Float3 => {}
            Some(e) => {
                return Err(SceneError::InvalidVertexData(format!(
                    "position attribute must be Float3, found {:?}",
                    e.format
                )))
            }
            None => {
                return Err(SceneError::InvalidVertexData(
                    "vertex layout has no position attribute".to_string(),
                ))
            }
        }
        let stride = layout.stride() as usize;
        if stride == 0 || vertex_data.len() % stride != 0 {
            return Err(SceneError::InvalidVertexData(format!(
                "{} bytes is not a multiple of the {stride}-byte vertex stride",
                vertex_data.len()
            )));
        }
        Ok(Self { layout, vertex_data, indices })
    }

    /// Geometry from standard vertices
    pub fn from_vertices(vertices: &[Vertex], indices: IndexData) -> Self {
        Self {
            layout: VertexLayout::position_normal_texture(),
            vertex_data: bytemuck::cast_slice(vertices).to_vec(),
            indices,
        }
    }

    /// Geometry from bare positions
    pub fn from_positions(positions: &[Vec3], indices: IndexData) -> Self {
        let packed: Vec<[f32; 3]> = positions.iter().map(|p| [p.x, p.y, p.z]).collect();
        Self {
            layout: VertexLayout::position_only(),
            vertex_data: bytemuck::cast_slice(&packed).to_vec(),
            indices,
        }
    }

    /// Vertex-layout signature
    pub const fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    /// Raw vertex bytes
    pub fn vertex_data(&self) -> &[u8] {
        &self.vertex_data
    }

    /// Index data
    pub const fn indices(&self) -> &IndexData {
        &self.indices
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertex_data.len() / self.layout.stride() as usize
    }

    /// Position of vertex `i`
    pub fn position(&self, i: usize) -> Option<Vec3> {
        let element = self.layout.element(VertexSemantic::Position)?;
        let start = i * self.layout.stride() as usize + element.offset as usize;
        let bytes = self.vertex_data.get(start..start + 12)?;
        let [x, y, z] = bytemuck::pod_read_unaligned::<[f32; 3]>(bytes);
        Some(Vec3::new(x, y, z))
    }

    /// Bound of every vertex
    pub fn compute_bound(&self) -> BoundingBox {
        let mut bound = BoundingBox::empty();
        for i in 0..self.vertex_count() {
            if let Some(p) = self.position(i) {
                bound.expand_by_point(&p);
            }
        }
        bound
    }

    /// Bound of the vertices referenced by `count` indices starting at `start`
    pub fn compute_index_range_bound(&self, start: usize, count: usize) -> BoundingBox {
        let mut bound = BoundingBox::empty();
        for i in start..start.saturating_add(count) {
            if let Some(p) = self.indices.get(i).and_then(|v| self.position(v as usize)) {
                bound.expand_by_point(&p);
            }
        }
        bound
    }
}
