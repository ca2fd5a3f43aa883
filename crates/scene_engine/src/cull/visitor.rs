//! # Cull Visitor
//!
//! Single-pass depth-first traversal that culls the scene against the camera
//! frustum and routes visible primitive sets into render-group buckets.
//!
//! ## Frame contract
//!
//! ```text
//! reset() → set_camera() → prepare_frustum() → traverse(root)
//!         → opaque_group() / transparent_group()
//! ```
//!
//! Children are visited in document order and elements land in their
//! buckets in visitation order. Transparent elements are not depth sorted.

use std::sync::Arc;

use crate::config::{ConfigError, CullingConfig, EngineConfig, RenderGroupConfig};
use crate::cull::{CullResult, CullStats, MatrixStack, PipelineStateStack};
use crate::foundation::math::{transform_point, try_invert, Mat4, Vec3};
use crate::render::{
    BucketId, Camera, DeviceContext, GeometryBufferCache, PipelineState, RenderGroup,
    RenderGroupElement, RenderGroupKind, RenderGroupState, ResourceFactory, StateKey,
};
use crate::scene::{
    orientation, Billboard, BillboardMode, Containment, Drawable, DrawableId, MatrixContext, Node,
    NodeKind, Polytope, PrimitiveTopology, ReferenceFrame, SceneError, TextNode,
};

/// Traversal engine producing populated render groups from a scene and a camera
#[derive(Debug)]
pub struct CullVisitor {
    culling: CullingConfig,
    opaque: RenderGroup,
    transparent: RenderGroup,
    default_state: Arc<PipelineState>,
    geometry_buffers: GeometryBufferCache,
    camera: Camera,
    frustum: Option<Polytope>,
    matrices: MatrixStack,
    states: PipelineStateStack,
    stats: CullStats,
}

impl CullVisitor {
    /// Visitor with empty render groups sized by `render_groups`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a bucket could not hold a
    /// single element.
    pub fn new(render_groups: &RenderGroupConfig, culling: CullingConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            culling,
            opaque: RenderGroup::new(RenderGroupKind::Opaque, render_groups)?,
            transparent: RenderGroup::new(RenderGroupKind::Transparent, render_groups)?,
            default_state: Arc::new(PipelineState::default()),
            geometry_buffers: GeometryBufferCache::new(),
            camera: Camera::default(),
            frustum: None,
            matrices: MatrixStack::new(),
            states: PipelineStateStack::new(),
            stats: CullStats::default(),
        })
    }

    /// Visitor configured from engine settings
    ///
    /// # Errors
    ///
    /// Returns the first error reported by [`EngineConfig::validate`].
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::new(&config.render_groups, config.culling)
    }

    /// Replace the state used when no node on the path overrides it
    #[must_use]
    pub fn with_default_state(mut self, state: Arc<PipelineState>) -> Self {
        self.default_state = state;
        self
    }

    /// Fallback pipeline state
    pub const fn default_state(&self) -> &Arc<PipelineState> {
        &self.default_state
    }

    /// Clear last frame's elements, stacks and counters
    ///
    /// Keys, buckets and device resources survive.
    pub fn reset(&mut self) {
        self.opaque.reset();
        self.transparent.reset();
        self.matrices.reset();
        self.states.clear();
        self.stats = CullStats::default();
    }

    /// Camera for the next traversal; invalidates the prepared frustum
    pub fn set_camera(&mut self, camera: &Camera) {
        self.camera = camera.clone();
        self.frustum = None;
    }

    /// Current camera
    pub const fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Build the world-space frustum from the camera
    pub fn prepare_frustum(&mut self) {
        self.frustum = Some(self.camera.frustum());
    }

    /// Frustum of the last [`CullVisitor::prepare_frustum`]
    pub const fn frustum(&self) -> Option<&Polytope> {
        self.frustum.as_ref()
    }

    /// Walk the scene from `root`, appending to the render groups
    ///
    /// Stops at the first scene or device error. Elements queued before the
    /// error stay in the groups until the next [`CullVisitor::reset`].
    pub fn traverse(&mut self, root: &Node, context: &DeviceContext<'_>) -> CullResult<()> {
        let frustum = *self.frustum.get_or_insert_with(|| self.camera.frustum());
        let result = self.visit(root, context, &frustum, false);
        log::debug!(
            "Cull traversal: {} nodes visited, {} culled, {} drawables, {} primitive sets culled, {} elements",
            self.stats.nodes_visited,
            self.stats.nodes_culled,
            self.stats.drawables_visited,
            self.stats.primitive_sets_culled,
            self.stats.elements_emitted
        );
        result
    }

    /// Opaque elements
    pub const fn opaque_group(&self) -> &RenderGroup {
        &self.opaque
    }

    /// Transparent elements
    pub const fn transparent_group(&self) -> &RenderGroup {
        &self.transparent
    }

    /// Mutable opaque group
    pub fn opaque_group_mut(&mut self) -> &mut RenderGroup {
        &mut self.opaque
    }

    /// Mutable transparent group
    pub fn transparent_group_mut(&mut self) -> &mut RenderGroup {
        &mut self.transparent
    }

    /// Counters since the last reset
    pub const fn stats(&self) -> &CullStats {
        &self.stats
    }

    /// Per-drawable device buffers
    pub const fn geometry_buffers(&self) -> &GeometryBufferCache {
        &self.geometry_buffers
    }

    /// Destroy one drawable's buffers, e.g. after removing it from the scene
    pub fn release_drawable(&mut self, drawable: DrawableId, factory: &dyn ResourceFactory) {
        self.geometry_buffers.release_drawable(drawable, factory);
    }

    /// Destroy every device object `factory` created for this visitor
    pub fn release_resources(&mut self, factory: &dyn ResourceFactory) {
        self.opaque.release_resources(factory);
        self.transparent.release_resources(factory);
        self.geometry_buffers.release_all(factory);
    }

    fn visit(
        &mut self,
        node: &Node,
        context: &DeviceContext<'_>,
        frustum: &Polytope,
        parent_inside: bool,
    ) -> CullResult<()> {
        self.stats.nodes_visited += 1;

        if let Some(callback) = node.cull_callback() {
            if !callback(node, self.matrices.top()) {
                log::trace!("{}: pruned by cull callback", node.label());
                self.stats.nodes_culled += 1;
                return Ok(());
            }
        }

        let inside = match self.classify(node, frustum, parent_inside) {
            Containment::Outside => {
                log::trace!("{}: outside the frustum", node.label());
                self.stats.nodes_culled += 1;
                return Ok(());
            }
            Containment::Inside => true,
            Containment::Intersecting => false,
        };

        self.with_pipeline_state(node.pipeline_state(), |visitor| {
            visitor.dispatch(node, context, frustum, inside)
        })
    }

    /// Containment of the node's bound, in its parent's frame
    fn classify(&self, node: &Node, frustum: &Polytope, parent_inside: bool) -> Containment {
        if parent_inside {
            return Containment::Inside;
        }
        if !self.culling.enabled || !node.culling_active() || node.has_absolute_content() {
            return Containment::Intersecting;
        }
        frustum.transformed(self.matrices.top()).classify(&node.bound())
    }

    fn dispatch(
        &mut self,
        node: &Node,
        context: &DeviceContext<'_>,
        frustum: &Polytope,
        inside: bool,
    ) -> CullResult<()> {
        match node.kind() {
            NodeKind::Group(children) => self.visit_children(children, context, frustum, inside),
            NodeKind::Transform(transform) => {
                // Absolute content left the frame the ancestors were tested in
                let inside = inside && transform.reference_frame == ReferenceFrame::Relative;
                self.with_matrix(&transform.matrix, transform.reference_frame, |visitor| {
                    visitor.visit_children(&transform.children, context, frustum, inside)
                })
            }
            NodeKind::Drawable(drawable) => {
                let model_view = self.camera.view_matrix() * self.matrices.top();
                self.queue_drawable(node, drawable, model_view, context, frustum, inside)
            }
            NodeKind::Billboard(billboard) => {
                let model_view = self.billboard_model_view(node, billboard)?;
                self.queue_drawable(node, &billboard.drawable, model_view, context, frustum, inside)
            }
            NodeKind::Text(text) => {
                let model_view = self.text_model_view(text);
                self.queue_drawable(node, &text.drawable, model_view, context, frustum, inside)
            }
        }
    }

    fn visit_children(
        &mut self,
        children: &[Node],
        context: &DeviceContext<'_>,
        frustum: &Polytope,
        inside: bool,
    ) -> CullResult<()> {
        children
            .iter()
            .try_for_each(|child| self.visit(child, context, frustum, inside))
    }

    fn with_matrix<F>(&mut self, matrix: &Mat4, frame: ReferenceFrame, scope: F) -> CullResult<()>
    where
        F: FnOnce(&mut Self) -> CullResult<()>,
    {
        match frame {
            ReferenceFrame::Relative => self.matrices.push_relative(matrix),
            ReferenceFrame::Absolute => self.matrices.push_absolute(*matrix),
        }
        let result = scope(self);
        self.matrices.pop();
        result
    }

    fn with_pipeline_state<F>(&mut self, state: Option<&Arc<PipelineState>>, scope: F) -> CullResult<()>
    where
        F: FnOnce(&mut Self) -> CullResult<()>,
    {
        let Some(state) = state else {
            return scope(self);
        };
        self.states.push(Arc::clone(state));
        let result = scope(self);
        self.states.pop();
        result
    }

    /// Camera-facing model-view for a billboard
    fn billboard_model_view(&self, node: &Node, billboard: &Billboard) -> CullResult<Mat4> {
        let model_view = self.camera.view_matrix() * self.matrices.top();
        match billboard.mode {
            BillboardMode::ScreenAligned => Ok(orientation::screen_aligned(&model_view)),
            BillboardMode::AxisAligned(axis) => {
                let inverse = try_invert(&model_view).ok_or_else(|| SceneError::NonInvertibleMatrix {
                    node: node.label(),
                    query: "billboard eye position",
                })?;
                let eye_local = transform_point(&inverse, &Vec3::zeros());
                Ok(orientation::axis_aligned(&model_view, &axis, &eye_local))
            }
        }
    }

    fn text_model_view(&self, text: &TextNode) -> Mat4 {
        let mut model_view = self.camera.view_matrix() * self.matrices.top();
        if text.face_camera {
            model_view = orientation::screen_aligned(&model_view);
        }
        if let Some(pixels) = text.pixel_height {
            let scale = orientation::pixel_scale(
                &model_view,
                self.camera.projection_matrix(),
                self.camera.viewport(),
                pixels,
            );
            model_view *= Mat4::new_scaling(scale);
        }
        model_view
    }

    /// Queue a drawable's visible primitive sets
    ///
    /// The node itself already passed culling; each primitive set is tested
    /// again on its own bound when the drawable has more than one.
    fn queue_drawable(
        &mut self,
        node: &Node,
        drawable: &Drawable,
        model_view: Mat4,
        context: &DeviceContext<'_>,
        frustum: &Polytope,
        inside: bool,
    ) -> CullResult<()> {
        self.stats.drawables_visited += 1;
        drawable.validate(|| node.label())?;

        let state = Arc::clone(self.states.resolve(node.pipeline_state(), &self.default_state));
        let buffers = self.geometry_buffers.ensure(drawable, context)?;

        let model = *self.matrices.top();
        let model_view = match drawable.matrix_hook() {
            Some(hook) => hook.apply(&MatrixContext {
                model_view: &model_view,
                projection: self.camera.projection_matrix(),
                viewport: self.camera.viewport(),
            }),
            None => model_view,
        };

        let sets = drawable.primitive_sets();
        let test_sets = self.culling.enabled
            && self.culling.primitive_set_culling
            && node.culling_active()
            && !inside
            && sets.len() > 1;
        let local_frustum = test_sets.then(|| frustum.transformed(&model));

        let group = if state.is_transparent() {
            &mut self.transparent
        } else {
            &mut self.opaque
        };
        // One element per bucket; within a drawable only the topology can differ
        let mut touched: Vec<(PrimitiveTopology, BucketId)> = Vec::new();
        let mut key = StateKey {
            pipeline_state: state,
            topology: drawable.topology(),
            vertex_layout: drawable.geometry().layout().clone(),
        };

        for (index, set) in sets.iter().enumerate() {
            if let Some(local) = &local_frustum {
                let outside = drawable
                    .primitive_set_bound(index)
                    .is_some_and(|bound| local.classify(&bound) == Containment::Outside);
                if outside {
                    self.stats.primitive_sets_culled += 1;
                    continue;
                }
            }

            let topology = drawable.topology_of(set);
            if let Some(&(_, bucket)) = touched.iter().find(|(t, _)| *t == topology) {
                if let Some(element) = group.state_mut(bucket).and_then(RenderGroupState::last_element_mut) {
                    element.primitive_sets.push(*set);
                }
                continue;
            }

            key.topology = topology;
            let bucket = group.push_element(
                &key,
                RenderGroupElement {
                    model,
                    model_view,
                    buffers,
                    primitive_sets: vec![*set],
                    source: drawable.id(),
                },
            );
            touched.push((topology, bucket));
        }

        self.stats.elements_emitted += touched.len();
        Ok(())
    }
}
