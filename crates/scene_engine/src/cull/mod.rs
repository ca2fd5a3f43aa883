//! Cull and batch traversal
//!
//! [`CullVisitor`] walks a scene graph once per frame, culls it against the
//! camera frustum and fills the opaque and transparent render groups.
//!
//! ## Architecture
//!
//! ```text
//! Node ─▶ CullVisitor ──┬─ MatrixStack         (accumulated model matrix)
//!                       ├─ PipelineStateStack  (nearest override)
//!                       ├─ GeometryBufferCache (per-drawable device buffers)
//!                       └─▶ RenderGroup × 2    (opaque, transparent)
//! ```

mod stack;
mod visitor;

#[cfg(test)]
mod tests;

pub use stack::{MatrixStack, PipelineStateStack};
pub use visitor::CullVisitor;

use crate::render::RenderError;
use crate::scene::SceneError;

/// Errors returned by a traversal or a frame
///
/// Scene configuration errors and device failures stay distinct so callers
/// can tell a broken scene from a broken device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CullError {
    /// The scene is misconfigured
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// The device failed to create or update a resource
    #[error("Device error: {0}")]
    Device(#[from] RenderError),
}

/// Result type for traversals and frames
pub type CullResult<T> = Result<T, CullError>;

/// Counters for one traversal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CullStats {
    /// Nodes entered
    pub nodes_visited: usize,
    /// Nodes pruned by a cull callback or the frustum
    pub nodes_culled: usize,
    /// Drawable, billboard and text leaves reached
    pub drawables_visited: usize,
    /// Primitive sets skipped on their own bound
    pub primitive_sets_culled: usize,
    /// Elements appended to render groups
    pub elements_emitted: usize,
}
