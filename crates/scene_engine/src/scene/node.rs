//! Scene graph nodes
//!
//! A closed set of node kinds behind one [`Node`] struct. Parents own their
//! children; a node's bound is cached and recomputed lazily after any
//! mutation reachable through `&mut` access.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use crate::foundation::math::{Mat4, Vec3};
use crate::render::PipelineState;
use crate::scene::{BoundingBox, Drawable};

/// Decides per traversal whether a node is visited
///
/// Receives the node and the accumulated model matrix of its parent frame;
/// returning `false` prunes the node and its subtree.
pub type CullCallback = Arc<dyn Fn(&Node, &Mat4) -> bool + Send + Sync>;

/// How a transform combines with its ancestors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceFrame {
    /// Compose with the parent's accumulated matrix
    #[default]
    Relative,
    /// Replace the accumulated matrix (content placed in world space directly)
    Absolute,
}

/// Node carrying a local transform
#[derive(Debug)]
pub struct TransformNode {
    /// Local-to-parent matrix
    pub matrix: Mat4,
    /// Composition rule
    pub reference_frame: ReferenceFrame,
    /// Child nodes in draw order
    pub children: Vec<Node>,
}

/// How a billboard turns towards the camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BillboardMode {
    /// Face the view plane
    ScreenAligned,
    /// Rotate about this local axis towards the eye
    AxisAligned(Vec3),
}

/// Drawable that faces the camera
#[derive(Debug)]
pub struct Billboard {
    /// Facing rule
    pub mode: BillboardMode,
    /// Geometry drawn facing the camera
    pub drawable: Drawable,
}

/// Pre-tessellated text geometry with sizing rules
///
/// Glyph layout happens elsewhere; this node only controls how the glyph
/// quads are oriented and scaled.
#[derive(Debug)]
pub struct TextNode {
    /// Glyph quads
    pub drawable: Drawable,
    /// Keep glyphs this many pixels tall per unit, regardless of distance
    pub pixel_height: Option<f32>,
    /// Turn the glyphs to face the view plane
    pub face_camera: bool,
}

/// The variant-specific payload of a node
#[derive(Debug)]
pub enum NodeKind {
    /// Plain grouping node
    Group(Vec<Node>),
    /// Transform node
    Transform(TransformNode),
    /// Leaf geometry
    Drawable(Drawable),
    /// Camera-facing leaf geometry
    Billboard(Billboard),
    /// Text leaf
    Text(TextNode),
}

/// A node in the scene graph
pub struct Node {
    name: Option<String>,
    kind: NodeKind,
    pipeline_state: Option<Arc<PipelineState>>,
    cull_callback: Option<CullCallback>,
    culling_active: bool,
    bound: Cell<Option<BoundingBox>>,
    absolute_content: Cell<Option<bool>>,
}

impl Node {
    /// Create a node of the given kind
    pub const fn new(kind: NodeKind) -> Self {
        Self {
            name: None,
            kind,
            pipeline_state: None,
            cull_callback: None,
            culling_active: true,
            bound: Cell::new(None),
            absolute_content: Cell::new(None),
        }
    }

    /// Empty group
    pub const fn group() -> Self {
        Self::new(NodeKind::Group(Vec::new()))
    }

    /// Empty relative transform
    pub const fn transform(matrix: Mat4) -> Self {
        Self::new(NodeKind::Transform(TransformNode {
            matrix,
            reference_frame: ReferenceFrame::Relative,
            children: Vec::new(),
        }))
    }

    /// Empty absolute transform
    pub const fn absolute_transform(matrix: Mat4) -> Self {
        Self::new(NodeKind::Transform(TransformNode {
            matrix,
            reference_frame: ReferenceFrame::Absolute,
            children: Vec::new(),
        }))
    }

    /// Drawable leaf
    pub const fn drawable(drawable: Drawable) -> Self {
        Self::new(NodeKind::Drawable(drawable))
    }

    /// Billboard leaf
    pub const fn billboard(mode: BillboardMode, drawable: Drawable) -> Self {
        Self::new(NodeKind::Billboard(Billboard { mode, drawable }))
    }

    /// Text leaf
    pub const fn text(text: TextNode) -> Self {
        Self::new(NodeKind::Text(text))
    }

    /// Set a diagnostic name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the pipeline state for this subtree
    #[must_use]
    pub fn with_pipeline_state(mut self, state: Arc<PipelineState>) -> Self {
        self.pipeline_state = Some(state);
        self
    }

    /// Install a cull callback
    #[must_use]
    pub fn with_cull_callback(mut self, callback: CullCallback) -> Self {
        self.cull_callback = Some(callback);
        self
    }

    /// Enable or disable bound culling for this node
    #[must_use]
    pub const fn with_culling(mut self, active: bool) -> Self {
        self.culling_active = active;
        self
    }

    /// Builder form of [`Node::add_child`]
    ///
    /// Leaves drop the child with a warning; see [`Node::add_child`].
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        let _ = self.add_child(child);
        self
    }

    /// Diagnostic name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name for error messages: the node name, else the drawable id, else the kind
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match &self.kind {
            NodeKind::Group(_) => "group".to_string(),
            NodeKind::Transform(_) => "transform".to_string(),
            NodeKind::Drawable(d) => d.id().to_string(),
            NodeKind::Billboard(b) => b.drawable.id().to_string(),
            NodeKind::Text(t) => t.drawable.id().to_string(),
        }
    }

    /// Variant payload
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Mutable variant payload; invalidates the cached bound
    pub fn kind_mut(&mut self) -> &mut NodeKind {
        self.dirty_bound();
        &mut self.kind
    }

    /// Pipeline-state override
    pub const fn pipeline_state(&self) -> Option<&Arc<PipelineState>> {
        self.pipeline_state.as_ref()
    }

    /// Set or clear the pipeline-state override
    pub fn set_pipeline_state(&mut self, state: Option<Arc<PipelineState>>) {
        self.pipeline_state = state;
    }

    /// Cull callback
    pub const fn cull_callback(&self) -> Option<&CullCallback> {
        self.cull_callback.as_ref()
    }

    /// Whether bound culling applies to this node
    pub const fn culling_active(&self) -> bool {
        self.culling_active
    }

    /// Enable or disable bound culling for this node
    pub fn set_culling_active(&mut self, active: bool) {
        self.culling_active = active;
    }

    /// Child nodes (empty for leaves)
    pub fn children(&self) -> &[Self] {
        match &self.kind {
            NodeKind::Group(children) => children,
            NodeKind::Transform(transform) => &transform.children,
            NodeKind::Drawable(_) | NodeKind::Billboard(_) | NodeKind::Text(_) => &[],
        }
    }

    /// Append a child in document order
    ///
    /// Leaves cannot own children; the child is handed back in that case.
    pub fn add_child(&mut self, child: Self) -> Option<Self> {
        match &mut self.kind {
            NodeKind::Group(children) => children.push(child),
            NodeKind::Transform(transform) => transform.children.push(child),
            NodeKind::Drawable(_) | NodeKind::Billboard(_) | NodeKind::Text(_) => {
                log::warn!("leaf nodes cannot own children, rejected {}", child.label());
                return Some(child);
            }
        }
        self.dirty_bound();
        None
    }

    /// Mutable access to a child; invalidates this node's cached bound
    pub fn child_mut(&mut self, index: usize) -> Option<&mut Self> {
        self.dirty_bound();
        match &mut self.kind {
            NodeKind::Group(children) => children.get_mut(index),
            NodeKind::Transform(transform) => transform.children.get_mut(index),
            NodeKind::Drawable(_) | NodeKind::Billboard(_) | NodeKind::Text(_) => None,
        }
    }

    /// Mutable access to the leaf drawable; invalidates the cached bound
    pub fn drawable_mut(&mut self) -> Option<&mut Drawable> {
        self.dirty_bound();
        match &mut self.kind {
            NodeKind::Drawable(drawable) => Some(drawable),
            NodeKind::Billboard(billboard) => Some(&mut billboard.drawable),
            NodeKind::Text(text) => Some(&mut text.drawable),
            NodeKind::Group(_) | NodeKind::Transform(_) => None,
        }
    }

    /// Replace a transform node's matrix; no effect on other kinds
    pub fn set_matrix(&mut self, matrix: Mat4) {
        if let NodeKind::Transform(transform) = &mut self.kind {
            transform.matrix = matrix;
            self.dirty_bound();
        }
    }

    /// Drop the cached bound so the next query recomputes it
    pub fn dirty_bound(&self) {
        self.bound.set(None);
        self.absolute_content.set(None);
    }

    /// Whether a cached bound is present
    pub fn bound_is_cached(&self) -> bool {
        self.bound.get().is_some()
    }

    /// Bound of the subtree in this node's parent frame
    ///
    /// Absolute transforms report an empty bound: their content does not
    /// move with the parent, so ancestors must not cull it.
    pub fn bound(&self) -> BoundingBox {
        if let Some(bound) = self.bound.get() {
            return bound;
        }
        let bound = self.compute_bound();
        self.bound.set(Some(bound));
        bound
    }

    fn compute_bound(&self) -> BoundingBox {
        match &self.kind {
            NodeKind::Group(children) => union_of(children),
            NodeKind::Transform(transform) => match transform.reference_frame {
                ReferenceFrame::Relative => {
                    union_of(&transform.children).transformed(&transform.matrix)
                }
                ReferenceFrame::Absolute => BoundingBox::empty(),
            },
            NodeKind::Drawable(drawable) => drawable.bound(),
            // Un-rotated bound; the camera-facing rotation is ignored
            NodeKind::Billboard(billboard) => billboard.drawable.bound(),
            NodeKind::Text(text) => text.drawable.bound(),
        }
    }

    /// Whether this node or a descendant is an absolute transform
    ///
    /// Such subtrees are not fully described by [`Node::bound`] and must not
    /// be culled on it. Cached alongside the bound.
    pub fn has_absolute_content(&self) -> bool {
        if let Some(absolute) = self.absolute_content.get() {
            return absolute;
        }
        let absolute = match &self.kind {
            NodeKind::Transform(t) if t.reference_frame == ReferenceFrame::Absolute => true,
            _ => self.children().iter().any(Self::has_absolute_content),
        };
        self.absolute_content.set(Some(absolute));
        absolute
    }
}

fn union_of(children: &[Node]) -> BoundingBox {
    children
        .iter()
        .fold(BoundingBox::empty(), |bound, child| bound.union(&child.bound()))
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("pipeline_state", &self.pipeline_state)
            .field("cull_callback", &self.cull_callback.is_some())
            .field("culling_active", &self.culling_active)
            .finish_non_exhaustive()
    }
}
