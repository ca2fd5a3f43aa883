//! Scene graph data
//!
//! The scene is a tree of [`Node`]s owned from the root down. Scene
//! construction code builds the tree; the cull visitor walks it once per frame.
//!
//! ## Architecture
//!
//! ```text
//! Node (Group | Transform | Drawable | Billboard | Text)
//!  ├─ bound: BoundingBox, cached until the subtree changes
//!  └─ Drawable: Geometry + PrimitiveSets + PrimitiveTopology
//!            ↓
//!      CullVisitor (cull module)
//! ```

mod bounds;
mod drawable;
mod geometry;
mod node;
pub mod orientation;
mod polytope;

pub use bounds::BoundingBox;
pub use drawable::{Drawable, DrawableId, MatrixCallback, MatrixContext, MatrixHook, PrimitiveSet};
pub use geometry::{
    Geometry, IndexData, IndexFormat, PrimitiveTopology, Vertex, VertexElement, VertexFormat,
    VertexLayout, VertexSemantic,
};
pub use node::{Billboard, BillboardMode, CullCallback, Node, NodeKind, ReferenceFrame, TextNode, TransformNode};
pub use polytope::{Containment, DepthRange, Plane, Polytope};

use thiserror::Error;

/// Configuration errors in scene content
///
/// These are programming errors in the scene that was handed to the engine;
/// they are reported loudly and never clamped or skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    /// A primitive set reads past the end of its drawable's index buffer
    #[error("{drawable}: primitive set {set} covers indices {start}..{end} but the index buffer holds {index_count}")]
    PrimitiveSetOutOfRange {
        /// Node or drawable that owns the set
        drawable: String,
        /// Position of the set within the drawable
        set: usize,
        /// First index read
        start: u64,
        /// One past the last index read
        end: u64,
        /// Number of indices available
        index_count: usize,
    },

    /// A matrix had to be inverted but is singular
    #[error("{node}: matrix is not invertible while computing {query}")]
    NonInvertibleMatrix {
        /// Node whose transform failed to invert
        node: String,
        /// What needed the inverse
        query: &'static str,
    },

    /// Vertex data does not match its layout
    #[error("Invalid vertex data: {0}")]
    InvalidVertexData(String),
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;
