//! Drawables and primitive sets
//!
//! A drawable is the unit of rendering: geometry plus one or more primitive
//! sets, each describing one indexed draw.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::foundation::math::Mat4;
use crate::render::Viewport;
use crate::scene::{orientation, BoundingBox, Geometry, PrimitiveTopology, SceneError, SceneResult};

static NEXT_DRAWABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a drawable, used to key its device buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawableId(pub u64);

impl DrawableId {
    fn next() -> Self {
        Self(NEXT_DRAWABLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DrawableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "drawable#{}", self.0)
    }
}

/// A sub-range of the index buffer drawn with one indexed draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveSet {
    /// First index
    pub start: u32,
    /// Number of indices
    pub count: u32,
    /// Number of instances to draw
    pub instance_count: u32,
    /// Overrides the drawable's topology for this set
    pub topology: Option<PrimitiveTopology>,
}

impl PrimitiveSet {
    /// A single-instance set over `count` indices from `start`
    pub const fn new(start: u32, count: u32) -> Self {
        Self {
            start,
            count,
            instance_count: 1,
            topology: None,
        }
    }

    /// Draw the range `instance_count` times
    #[must_use]
    pub const fn with_instances(mut self, instance_count: u32) -> Self {
        self.instance_count = instance_count;
        self
    }

    /// Interpret the range with a different topology
    #[must_use]
    pub const fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = Some(topology);
        self
    }

    /// One past the last index read
    pub const fn end(&self) -> u64 {
        self.start as u64 + self.count as u64
    }
}

/// Inputs available to a matrix hook
#[derive(Debug, Clone, Copy)]
pub struct MatrixContext<'a> {
    /// Accumulated model-view of the instance
    pub model_view: &'a Mat4,
    /// Camera projection
    pub projection: &'a Mat4,
    /// Camera viewport
    pub viewport: Viewport,
}

/// User-supplied model-view rewrite
pub type MatrixCallback = Arc<dyn Fn(&MatrixContext<'_>) -> Mat4 + Send + Sync>;

/// Rewrites an instance's model-view before it is queued
#[derive(Clone)]
pub enum MatrixHook {
    /// Drop rotation so the geometry faces the view plane
    ScreenAligned,
    /// Scale so one unit of geometry spans this many pixels
    FixedPixelSize(f32),
    /// Arbitrary rewrite
    Custom(MatrixCallback),
}

impl MatrixHook {
    /// Compute the rewritten model-view
    pub fn apply(&self, context: &MatrixContext<'_>) -> Mat4 {
        match self {
            Self::ScreenAligned => orientation::screen_aligned(context.model_view),
            Self::FixedPixelSize(pixels) => {
                let scale = orientation::pixel_scale(
                    context.model_view,
                    context.projection,
                    context.viewport,
                    *pixels,
                );
                context.model_view * Mat4::new_scaling(scale)
            }
            Self::Custom(callback) => callback(context),
        }
    }
}

impl fmt::Debug for MatrixHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScreenAligned => write!(f, "ScreenAligned"),
            Self::FixedPixelSize(pixels) => f.debug_tuple("FixedPixelSize").field(pixels).finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Geometry, its topology and the primitive sets to draw
#[derive(Debug)]
pub struct Drawable {
    id: DrawableId,
    geometry: Geometry,
    topology: PrimitiveTopology,
    primitive_sets: Vec<PrimitiveSet>,
    matrix_hook: Option<MatrixHook>,
    revision: u64,
    bound: Cell<Option<BoundingBox>>,
    set_bounds: Vec<Cell<Option<BoundingBox>>>,
}

impl Drawable {
    /// Drawable without primitive sets
    pub fn new(geometry: Geometry, topology: PrimitiveTopology) -> Self {
        Self {
            id: DrawableId::next(),
            geometry,
            topology,
            primitive_sets: Vec::new(),
            matrix_hook: None,
            revision: 0,
            bound: Cell::new(None),
            set_bounds: Vec::new(),
        }
    }

    /// Drawable with one primitive set covering every index
    pub fn whole(geometry: Geometry, topology: PrimitiveTopology) -> Self {
        let count = u32::try_from(geometry.indices().len()).unwrap_or(u32::MAX);
        let mut drawable = Self::new(geometry, topology);
        drawable.primitive_sets.push(PrimitiveSet::new(0, count));
        drawable.set_bounds.push(Cell::new(None));
        drawable
    }

    /// Builder form of [`Drawable::add_primitive_set`]
    pub fn with_primitive_set(mut self, set: PrimitiveSet) -> SceneResult<Self> {
        self.add_primitive_set(set)?;
        Ok(self)
    }

    /// Builder form of [`Drawable::set_matrix_hook`]
    #[must_use]
    pub fn with_matrix_hook(mut self, hook: MatrixHook) -> Self {
        self.matrix_hook = Some(hook);
        self
    }

    /// Append a primitive set, rejecting ranges past the index buffer
    pub fn add_primitive_set(&mut self, set: PrimitiveSet) -> SceneResult<()> {
        if !self.fits(&set) {
            return Err(self.out_of_range(self.id.to_string(), self.primitive_sets.len(), &set));
        }
        self.primitive_sets.push(set);
        self.set_bounds.push(Cell::new(None));
        Ok(())
    }

    /// Re-check every primitive set against the current index buffer
    ///
    /// `owner` names the offending node in the error and is only evaluated
    /// on failure.
    pub fn validate(&self, owner: impl FnOnce() -> String) -> SceneResult<()> {
        match self
            .primitive_sets
            .iter()
            .enumerate()
            .find(|(_, set)| !self.fits(set))
        {
            Some((index, set)) => Err(self.out_of_range(owner(), index, set)),
            None => Ok(()),
        }
    }

    fn fits(&self, set: &PrimitiveSet) -> bool {
        set.end() <= self.geometry.indices().len() as u64
    }

    fn out_of_range(&self, owner: String, index: usize, set: &PrimitiveSet) -> SceneError {
        SceneError::PrimitiveSetOutOfRange {
            drawable: owner,
            set: index,
            start: u64::from(set.start),
            end: set.end(),
            index_count: self.geometry.indices().len(),
        }
    }

    /// Stable identity
    pub const fn id(&self) -> DrawableId {
        self.id
    }

    /// Geometry data
    pub const fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Replace the geometry; device buffers are rebuilt on next use
    ///
    /// Existing primitive sets are kept and re-checked when the drawable is
    /// next traversed.
    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
        self.revision += 1;
        self.bound.set(None);
        for cached in &self.set_bounds {
            cached.set(None);
        }
    }

    /// Bumped each time the geometry is replaced
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Default topology of the primitive sets
    pub const fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    /// Effective topology of a set
    pub fn topology_of(&self, set: &PrimitiveSet) -> PrimitiveTopology {
        set.topology.unwrap_or(self.topology)
    }

    /// Primitive sets in draw order
    pub fn primitive_sets(&self) -> &[PrimitiveSet] {
        &self.primitive_sets
    }

    /// Optional model-view rewrite
    pub const fn matrix_hook(&self) -> Option<&MatrixHook> {
        self.matrix_hook.as_ref()
    }

    /// Install or clear the model-view rewrite
    pub fn set_matrix_hook(&mut self, hook: Option<MatrixHook>) {
        self.matrix_hook = hook;
    }

    /// Bound of all vertices, computed once and cached
    pub fn bound(&self) -> BoundingBox {
        if let Some(bound) = self.bound.get() {
            return bound;
        }
        let bound = self.geometry.compute_bound();
        self.bound.set(Some(bound));
        bound
    }

    /// Bound of the vertices one primitive set references, cached
    pub fn primitive_set_bound(&self, index: usize) -> Option<BoundingBox> {
        let set = self.primitive_sets.get(index)?;
        let cached = self.set_bounds.get(index)?;
        if let Some(bound) = cached.get() {
            return Some(bound);
        }
        let bound = self
            .geometry
            .compute_index_range_bound(set.start as usize, set.count as usize);
        cached.set(Some(bound));
        Some(bound)
    }
}
