//! # Render Groups
//!
//! A render group maps a [`StateKey`] to a list of capacity-bounded
//! [`RenderGroupState`] buckets. The cull visitor fills one opaque and one
//! transparent group per frame; the frame driver drains them in key
//! insertion order.
//!
//! ## Lifetimes
//!
//! - Element lists are per frame and cleared by [`RenderGroup::reset`].
//! - Keys, buckets and each bucket's device resources persist across frames
//!   and are only released by [`RenderGroup::release_resources`].

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ConfigError, RenderGroupConfig};
use crate::foundation::math::{try_invert, Mat4};
use crate::render::{
    BoundResource, BufferHandle, BufferUsage, DeviceContext, DeviceKey, GeometryBuffers,
    GraphicsPipelineDescription, InstanceUniforms, OutputDescription, PipelineHandle, PipelineState,
    RenderError, RenderResult, ResourceFactory, ResourceKind, ResourceLayoutDescription,
    ResourceLayoutElement, ResourceLayoutHandle, ResourceSetDescription, ResourceSetHandle,
    ShaderStages,
};
use crate::scene::{DrawableId, PrimitiveSet, PrimitiveTopology, VertexLayout};

/// Everything that decides which pipeline draws a primitive set
///
/// Compared and hashed by value: two pipeline states with equal fields
/// share buckets and device pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    /// Effective pipeline state
    pub pipeline_state: Arc<PipelineState>,
    /// Primitive assembly
    pub topology: PrimitiveTopology,
    /// Vertex-layout signature
    pub vertex_layout: VertexLayout,
}

/// Which of the two per-frame groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderGroupKind {
    /// No alpha blending
    Opaque,
    /// Alpha blended, drawn after opaque geometry
    Transparent,
}

/// One drawable instance queued for drawing
#[derive(Debug, Clone, PartialEq)]
pub struct RenderGroupElement {
    /// Accumulated model matrix
    pub model: Mat4,
    /// Model-view after any billboard or sizing rewrite
    pub model_view: Mat4,
    /// Device buffers of the drawable
    pub buffers: GeometryBuffers,
    /// Primitive sets drawn with this bucket's pipeline
    pub primitive_sets: Vec<PrimitiveSet>,
    /// Drawable the element came from
    pub source: DrawableId,
}

impl RenderGroupElement {
    /// Inverse transpose of the model-view
    ///
    /// A singular model-view (e.g. a zero scale) falls back to identity.
    pub fn normal_matrix(&self) -> Mat4 {
        try_invert(&self.model_view).map_or_else(
            || {
                log::warn!("{}: singular model-view, using identity normal matrix", self.source);
                Mat4::identity()
            },
            |inverse| inverse.transpose(),
        )
    }

    /// Uniform record for this element
    pub fn instance_uniforms(&self) -> InstanceUniforms {
        InstanceUniforms::new(&self.model_view, &self.normal_matrix())
    }
}

/// Device objects one bucket draws with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketResources {
    /// Layout of the bucket's resource set
    pub layout: ResourceLayoutHandle,
    /// Instance uniform buffer, one slot per element
    pub uniform_buffer: BufferHandle,
    /// Textures, shared uniforms and the instance buffer
    pub resource_set: ResourceSetHandle,
    /// Pipeline for the bucket's key
    pub pipeline: PipelineHandle,
}

/// A capacity-bounded bucket of elements sharing one pipeline
#[derive(Debug)]
pub struct RenderGroupState {
    key: StateKey,
    capacity: usize,
    slot_bytes: u64,
    elements: Vec<RenderGroupElement>,
    device_resources: HashMap<DeviceKey, BucketResources>,
}

impl RenderGroupState {
    fn new(key: StateKey, capacity: usize, slot_bytes: u64) -> Self {
        Self {
            key,
            capacity,
            slot_bytes,
            elements: Vec::with_capacity(capacity.min(16)),
            device_resources: HashMap::new(),
        }
    }

    /// Key shared by every element
    pub const fn key(&self) -> &StateKey {
        &self.key
    }

    /// Queued elements in traversal order
    pub fn elements(&self) -> &[RenderGroupElement] {
        &self.elements
    }

    /// Most recently queued element
    pub fn last_element_mut(&mut self) -> Option<&mut RenderGroupElement> {
        self.elements.last_mut()
    }

    /// Queue an element; returns its index or hands it back when full
    pub fn push_element(&mut self, element: RenderGroupElement) -> Result<usize, RenderGroupElement> {
        if self.is_full() {
            return Err(element);
        }
        self.elements.push(element);
        Ok(self.elements.len() - 1)
    }

    /// Number of queued elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether no element is queued
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Whether the bucket holds `capacity` elements
    pub fn is_full(&self) -> bool {
        self.elements.len() >= self.capacity
    }

    /// Maximum number of elements
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop the queued elements; device resources stay
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Dynamic uniform offset of element `index`
    ///
    /// # Panics
    ///
    /// Debug builds panic when `index` lies outside the bucket.
    pub fn dynamic_offset(&self, index: usize) -> u32 {
        debug_assert!(index < self.capacity, "slot {index} outside bucket of {}", self.capacity);
        // Validated budgets fit in u32, so every in-bucket offset does too
        (index as u64 * self.slot_bytes) as u32
    }

    /// Device objects already built for `device`
    pub fn resources_for(&self, device: DeviceKey) -> Option<&BucketResources> {
        self.device_resources.get(&device)
    }

    /// Number of devices this bucket holds resources for
    pub fn device_count(&self) -> usize {
        self.device_resources.len()
    }

    /// Device objects for this bucket, built on first use per device
    ///
    /// `frame_layout` is the per-frame resource layout bound at set 0; the
    /// bucket's own layout is set 1. Nothing is cached when any step fails
    /// and the steps that succeeded are destroyed again.
    pub fn device_resources(
        &mut self,
        context: &DeviceContext<'_>,
        frame_layout: ResourceLayoutHandle,
        output: &OutputDescription,
    ) -> RenderResult<&BucketResources> {
        match self.device_resources.entry(context.key()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let built = build_resources(&self.key, self.capacity, self.slot_bytes, context, frame_layout, output)?;
                log::debug!(
                    "Built bucket resources for {:?}/{:?} on {:?}: {} slots of {} bytes",
                    self.key.topology,
                    self.key.pipeline_state.shaders,
                    context.key(),
                    self.capacity,
                    self.slot_bytes
                );
                Ok(entry.insert(built))
            }
        }
    }

    /// Upload every element's instance record at its slot
    pub fn write_instances(&self, context: &DeviceContext<'_>) -> RenderResult<()> {
        if self.elements.is_empty() {
            return Ok(());
        }
        let resources = self.resources_for(context.key()).ok_or_else(|| {
            RenderError::UnknownResource(format!("bucket resources for {:?}", context.key()))
        })?;

        let slot = usize::try_from(self.slot_bytes)
            .ok()
            .filter(|&slot| slot >= std::mem::size_of::<InstanceUniforms>())
            .ok_or_else(|| RenderError::Unsupported(format!("{}-byte instance slot", self.slot_bytes)))?;
        let mut bytes = vec![0u8; slot * self.elements.len()];
        for (chunk, element) in bytes.chunks_exact_mut(slot).zip(&self.elements) {
            let record = element.instance_uniforms();
            let record = bytemuck::bytes_of(&record);
            chunk[..record.len()].copy_from_slice(record);
        }
        context.device.update_buffer(resources.uniform_buffer, 0, &bytes)
    }

    /// Destroy the device objects built for one device
    pub fn release_device(&mut self, device: DeviceKey, factory: &dyn ResourceFactory) {
        if let Some(resources) = self.device_resources.remove(&device) {
            destroy_resources(factory, &resources);
        }
    }

    /// Destroy every device object `factory` created for this bucket
    pub fn release_resources(&mut self, factory: &dyn ResourceFactory) {
        let factory_id = factory.id();
        self.device_resources.retain(|key, resources| {
            if key.factory == factory_id {
                destroy_resources(factory, resources);
                false
            } else {
                true
            }
        });
    }
}

fn bucket_layout(state: &PipelineState) -> ResourceLayoutDescription {
    let mut elements = Vec::with_capacity(state.textures.len() + state.uniforms.len() + 1);
    elements.push(ResourceLayoutElement {
        name: "instance".to_string(),
        kind: ResourceKind::DynamicUniformBuffer,
        stages: ShaderStages::VERTEX,
    });
    elements.extend(state.uniforms.iter().enumerate().map(|(i, _)| ResourceLayoutElement {
        name: format!("uniform{i}"),
        kind: ResourceKind::UniformBuffer,
        stages: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
    }));
    elements.extend(state.textures.iter().enumerate().map(|(i, _)| ResourceLayoutElement {
        name: format!("texture{i}"),
        kind: ResourceKind::TextureSampler,
        stages: ShaderStages::FRAGMENT,
    }));
    ResourceLayoutDescription { elements }
}

fn build_resources(
    key: &StateKey,
    capacity: usize,
    slot_bytes: u64,
    context: &DeviceContext<'_>,
    frame_layout: ResourceLayoutHandle,
    output: &OutputDescription,
) -> RenderResult<BucketResources> {
    let alignment = context.device.uniform_buffer_alignment();
    if alignment > 0 && slot_bytes % alignment != 0 {
        return Err(RenderError::Unsupported(format!(
            "instance slot of {slot_bytes} bytes is not a multiple of the device's {alignment}-byte uniform alignment"
        )));
    }
    let factory = context.factory;
    let state = &key.pipeline_state;

    let layout = factory.create_resource_layout(&bucket_layout(state))?;
    let uniform_buffer = match factory.create_buffer(capacity as u64 * slot_bytes, BufferUsage::UNIFORM | BufferUsage::DYNAMIC) {
        Ok(buffer) => buffer,
        Err(e) => {
            factory.destroy_resource_layout(layout);
            return Err(e);
        }
    };

    let mut resources = vec![BoundResource::Buffer {
        buffer: uniform_buffer,
        offset: 0,
        size: slot_bytes,
    }];
    resources.extend(state.uniforms.iter().map(|u| BoundResource::Buffer {
        buffer: u.buffer,
        offset: 0,
        size: u.size,
    }));
    resources.extend(state.textures.iter().map(|t| BoundResource::TextureSampler {
        texture: t.texture,
        sampler: t.sampler,
    }));
    let resource_set = match factory.create_resource_set(&ResourceSetDescription { layout, resources }) {
        Ok(set) => set,
        Err(e) => {
            factory.destroy_buffer(uniform_buffer);
            factory.destroy_resource_layout(layout);
            return Err(e);
        }
    };

    let description = GraphicsPipelineDescription {
        pipeline_state: PipelineState::clone(state),
        topology: key.topology,
        vertex_layout: key.vertex_layout.clone(),
        resource_layouts: vec![frame_layout, layout],
        output: *output,
    };
    let pipeline = match factory.create_graphics_pipeline(&description) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            factory.destroy_resource_set(resource_set);
            factory.destroy_buffer(uniform_buffer);
            factory.destroy_resource_layout(layout);
            return Err(e);
        }
    };

    Ok(BucketResources {
        layout,
        uniform_buffer,
        resource_set,
        pipeline,
    })
}

fn destroy_resources(factory: &dyn ResourceFactory, resources: &BucketResources) {
    factory.destroy_pipeline(resources.pipeline);
    factory.destroy_resource_set(resources.resource_set);
    factory.destroy_buffer(resources.uniform_buffer);
    factory.destroy_resource_layout(resources.layout);
}

/// Position of a bucket within a render group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketId {
    /// Index of the key in insertion order
    pub key: usize,
    /// Index of the bucket under that key
    pub bucket: usize,
}

#[derive(Debug)]
struct KeyEntry {
    buckets: Vec<RenderGroupState>,
    /// First bucket that may still have room
    current: usize,
}

/// Buckets of one group, keyed by render state in insertion order
#[derive(Debug)]
pub struct RenderGroup {
    kind: RenderGroupKind,
    capacity: usize,
    slot_bytes: u64,
    keys: Vec<StateKey>,
    entries: Vec<KeyEntry>,
    index: HashMap<StateKey, usize>,
}

impl RenderGroup {
    /// Empty group sized from `config`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `config` fails validation.
    pub fn new(kind: RenderGroupKind, config: &RenderGroupConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            kind,
            capacity: config.capacity(),
            slot_bytes: config.instance_slot_bytes,
            keys: Vec::new(),
            entries: Vec::new(),
            index: HashMap::new(),
        })
    }

    /// Opaque or transparent
    pub const fn kind(&self) -> RenderGroupKind {
        self.kind
    }

    /// Maximum elements per bucket
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// A bucket for `key` with room for one more element
    ///
    /// Creates the key on first sight and appends a sibling bucket when
    /// every bucket under the key is full.
    pub fn get_or_create_state(&mut self, key: &StateKey) -> BucketId {
        let key_index = match self.index.get(key) {
            Some(&index) => index,
            None => {
                let index = self.entries.len();
                log::trace!("{:?} group: new state key #{index} ({:?})", self.kind, key.topology);
                self.keys.push(key.clone());
                self.index.insert(key.clone(), index);
                self.entries.push(KeyEntry {
                    buckets: Vec::new(),
                    current: 0,
                });
                index
            }
        };

        let entry = &mut self.entries[key_index];
        while entry.buckets.get(entry.current).is_some_and(RenderGroupState::is_full) {
            entry.current += 1;
        }
        if entry.current == entry.buckets.len() {
            log::trace!(
                "{:?} group: bucket {} under key #{key_index}",
                self.kind,
                entry.buckets.len()
            );
            entry
                .buckets
                .push(RenderGroupState::new(key.clone(), self.capacity, self.slot_bytes));
        }
        BucketId {
            key: key_index,
            bucket: entry.current,
        }
    }

    /// Queue an element under `key`, spilling into a new bucket when full
    pub fn push_element(&mut self, key: &StateKey, element: RenderGroupElement) -> BucketId {
        let id = self.get_or_create_state(key);
        let bucket = &mut self.entries[id.key].buckets[id.bucket];
        // get_or_create_state only returns buckets with room
        let _ = bucket.push_element(element);
        id
    }

    /// Bucket by id
    pub fn state(&self, id: BucketId) -> Option<&RenderGroupState> {
        self.entries.get(id.key)?.buckets.get(id.bucket)
    }

    /// Mutable bucket by id
    pub fn state_mut(&mut self, id: BucketId) -> Option<&mut RenderGroupState> {
        self.entries.get_mut(id.key)?.buckets.get_mut(id.bucket)
    }

    /// Clear every bucket's elements; keys, buckets and device resources stay
    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            entry.buckets.iter_mut().for_each(RenderGroupState::clear);
            entry.current = 0;
        }
    }

    /// Non-empty buckets, by key insertion order then bucket order
    pub fn states(&self) -> impl Iterator<Item = &RenderGroupState> {
        self.entries
            .iter()
            .flat_map(|entry| entry.buckets.iter())
            .filter(|bucket| !bucket.is_empty())
    }

    /// Mutable form of [`RenderGroup::states`]
    pub fn states_mut(&mut self) -> impl Iterator<Item = &mut RenderGroupState> {
        self.entries
            .iter_mut()
            .flat_map(|entry| entry.buckets.iter_mut())
            .filter(|bucket| !bucket.is_empty())
    }

    /// Every key seen so far, in insertion order
    pub fn keys(&self) -> &[StateKey] {
        &self.keys
    }

    /// Buckets under `key`, empty ones included
    pub fn buckets_for(&self, key: &StateKey) -> &[RenderGroupState] {
        match self.index.get(key) {
            Some(&index) => &self.entries[index].buckets,
            None => &[],
        }
    }

    /// Queued elements across all buckets
    pub fn element_count(&self) -> usize {
        self.states().map(RenderGroupState::len).sum()
    }

    /// Buckets ever allocated, empty ones included
    pub fn bucket_count(&self) -> usize {
        self.entries.iter().map(|entry| entry.buckets.len()).sum()
    }

    /// Whether no element is queued
    pub fn is_empty(&self) -> bool {
        self.states().next().is_none()
    }

    /// Destroy the device objects of one device in every bucket
    pub fn release_device(&mut self, device: DeviceKey, factory: &dyn ResourceFactory) {
        for bucket in self.entries.iter_mut().flat_map(|entry| entry.buckets.iter_mut()) {
            bucket.release_device(device, factory);
        }
    }

    /// Destroy every device object `factory` created for this group
    pub fn release_resources(&mut self, factory: &dyn ResourceFactory) {
        let mut released = 0;
        for bucket in self.entries.iter_mut().flat_map(|entry| entry.buckets.iter_mut()) {
            released += bucket.device_count();
            bucket.release_resources(factory);
            released -= bucket.device_count();
        }
        log::info!("{:?} group: released device resources of {released} buckets", self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::{FailurePoint, HeadlessDevice};
    use crate::render::{GraphicsDevice, ResourceFactory};
    use crate::scene::IndexFormat;

    fn config(capacity: u64) -> RenderGroupConfig {
        RenderGroupConfig {
            uniform_budget_bytes: capacity * 256,
            instance_slot_bytes: 256,
        }
    }

    fn key(state: PipelineState) -> StateKey {
        StateKey {
            pipeline_state: Arc::new(state),
            topology: PrimitiveTopology::TriangleList,
            vertex_layout: VertexLayout::position_only(),
        }
    }

    fn element(x: f32) -> RenderGroupElement {
        let model = Mat4::new_translation(&crate::foundation::math::Vec3::new(x, 0.0, 0.0));
        RenderGroupElement {
            model,
            model_view: model,
            buffers: GeometryBuffers {
                vertex: BufferHandle(1),
                index: BufferHandle(2),
                index_format: IndexFormat::U16,
            },
            primitive_sets: vec![PrimitiveSet::new(0, 3)],
            source: DrawableId(0),
        }
    }

    #[test]
    fn test_buckets_never_exceed_capacity() {
        let mut group = RenderGroup::new(RenderGroupKind::Opaque, &config(3)).unwrap();
        let key = key(PipelineState::opaque());

        let mut previous = None;
        for i in 0..7 {
            let id = group.get_or_create_state(&key);
            let bucket = group.state(id).unwrap();
            assert!(bucket.len() < 3);
            if let Some(prev) = previous {
                if group.state(prev).unwrap().is_full() {
                    assert_ne!(id, prev);
                }
            }
            group.state_mut(id).unwrap().push_element(element(i as f32)).unwrap();
            previous = Some(id);
        }
        assert_eq!(group.bucket_count(), 3);
        assert_eq!(group.element_count(), 7);
        assert!(group.states().all(|bucket| bucket.len() <= 3));
    }

    #[test]
    fn test_full_bucket_rejects_element() {
        let mut bucket = RenderGroupState::new(key(PipelineState::opaque()), 1, 256);
        assert_eq!(bucket.push_element(element(0.0)), Ok(0));
        assert!(bucket.push_element(element(1.0)).is_err());
    }

    #[test]
    fn test_equal_states_share_a_key() {
        let mut group = RenderGroup::new(RenderGroupKind::Opaque, &config(4)).unwrap();
        let a = group.push_element(&key(PipelineState::opaque()), element(0.0));
        let b = group.push_element(&key(PipelineState::opaque()), element(1.0));
        assert_eq!(a, b);
        assert_eq!(group.keys().len(), 1);
    }

    #[test]
    fn test_reset_keeps_buckets() {
        let mut group = RenderGroup::new(RenderGroupKind::Opaque, &config(1)).unwrap();
        let key = key(PipelineState::opaque());
        group.push_element(&key, element(0.0));
        group.push_element(&key, element(1.0));
        assert_eq!(group.bucket_count(), 2);

        group.reset();
        assert!(group.is_empty());
        assert_eq!(group.bucket_count(), 2);
        assert_eq!(group.get_or_create_state(&key), BucketId { key: 0, bucket: 0 });
    }

    #[test]
    fn test_states_follow_key_insertion_order() {
        let mut group = RenderGroup::new(RenderGroupKind::Opaque, &config(4)).unwrap();
        let first = key(PipelineState::opaque());
        let mut wireframe = PipelineState::opaque();
        wireframe.rasterizer.polygon_mode = crate::render::PolygonMode::Line;
        let second = key(wireframe);

        group.push_element(&second, element(0.0));
        group.push_element(&first, element(1.0));
        let order: Vec<_> = group.states().map(|b| b.key().clone()).collect();
        assert_eq!(order, vec![second, first]);
    }

    #[test]
    fn test_device_resources_built_once_per_device() {
        let device = HeadlessDevice::new();
        let context = DeviceContext::new(&device, &device);
        let frame_layout = device
            .create_resource_layout(&ResourceLayoutDescription::default())
            .unwrap();
        let mut bucket = RenderGroupState::new(key(PipelineState::transparent()), 4, 256);

        let first = *bucket
            .device_resources(&context, frame_layout, &OutputDescription::default())
            .unwrap();
        let second = *bucket
            .device_resources(&context, frame_layout, &OutputDescription::default())
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(device.pipelines_created(), 1);

        let pipeline = device.pipeline_description(first.pipeline).unwrap();
        assert!(pipeline.pipeline_state.is_transparent());
        assert_eq!(pipeline.resource_layouts, vec![frame_layout, first.layout]);
        assert_eq!(device.buffer_contents(first.uniform_buffer).unwrap().len(), 4 * 256);

        bucket.release_resources(&device);
        assert_eq!(bucket.device_count(), 0);
        assert_eq!(device.live_pipelines(), 0);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_resource_layouts(), 1);
    }

    #[test]
    fn test_failed_pipeline_creation_caches_nothing() {
        let device = HeadlessDevice::new();
        let context = DeviceContext::new(&device, &device);
        let frame_layout = device
            .create_resource_layout(&ResourceLayoutDescription::default())
            .unwrap();
        let mut bucket = RenderGroupState::new(key(PipelineState::opaque()), 4, 256);

        device.fail_on(FailurePoint::CreatePipeline);
        let err = bucket
            .device_resources(&context, frame_layout, &OutputDescription::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::ResourceCreationFailed(_)));
        assert_eq!(bucket.device_count(), 0);
        assert_eq!(device.live_resources(), 1);
    }

    #[test]
    fn test_slot_must_respect_device_alignment() {
        let device = HeadlessDevice::with_alignment(512);
        let context = DeviceContext::new(&device, &device);
        let frame_layout = device
            .create_resource_layout(&ResourceLayoutDescription::default())
            .unwrap();
        let mut bucket = RenderGroupState::new(key(PipelineState::opaque()), 4, 256);
        assert!(matches!(
            bucket.device_resources(&context, frame_layout, &OutputDescription::default()),
            Err(RenderError::Unsupported(_))
        ));
        assert_eq!(device.uniform_buffer_alignment(), 512);
    }

    #[test]
    fn test_bound_textures_and_uniforms_get_slots() {
        let device = HeadlessDevice::new();
        let context = DeviceContext::new(&device, &device);
        let frame_layout = device
            .create_resource_layout(&ResourceLayoutDescription::default())
            .unwrap();
        let texture = device
            .create_texture(&crate::render::TextureDescription {
                width: 4,
                height: 4,
                format: crate::render::TextureFormat::Rgba8Unorm,
                mip_levels: 1,
            })
            .unwrap();
        let sampler = device.create_sampler(&crate::render::SamplerDescription::default()).unwrap();
        let material = device.create_buffer(64, BufferUsage::UNIFORM).unwrap();
        let state = PipelineState::opaque()
            .with_texture(crate::render::TextureBinding { texture, sampler })
            .with_uniform(crate::render::UniformBinding {
                buffer: material,
                size: 64,
            });
        let mut bucket = RenderGroupState::new(key(state), 4, 256);

        let resources = *bucket
            .device_resources(&context, frame_layout, &OutputDescription::default())
            .unwrap();

        let layout = device.resource_layout_description(resources.layout).unwrap();
        let kinds: Vec<_> = layout.elements.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::DynamicUniformBuffer,
                ResourceKind::UniformBuffer,
                ResourceKind::TextureSampler
            ]
        );
        let set = device.resource_set_description(resources.resource_set).unwrap();
        assert_eq!(set.resources[2], BoundResource::TextureSampler { texture, sampler });

        // Shared bindings belong to the caller and survive the release
        bucket.release_resources(&device);
        assert_eq!(device.live_buffers(), 1);
    }

    #[test]
    fn test_write_instances_places_records_at_slots() {
        let device = HeadlessDevice::new();
        let context = DeviceContext::new(&device, &device);
        let frame_layout = device
            .create_resource_layout(&ResourceLayoutDescription::default())
            .unwrap();
        let mut bucket = RenderGroupState::new(key(PipelineState::opaque()), 4, 256);
        bucket.push_element(element(1.0)).unwrap();
        bucket.push_element(element(2.0)).unwrap();

        assert!(bucket.write_instances(&context).is_err());
        let resources = *bucket
            .device_resources(&context, frame_layout, &OutputDescription::default())
            .unwrap();
        bucket.write_instances(&context).unwrap();

        let bytes = device.buffer_contents(resources.uniform_buffer).unwrap();
        let second: InstanceUniforms = bytemuck::pod_read_unaligned(&bytes[256..256 + 128]);
        assert_eq!(second.model_view[3], [2.0, 0.0, 0.0, 1.0]);
        assert_eq!(bucket.dynamic_offset(1), 256);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "outside bucket")]
    fn test_offset_past_capacity_is_rejected() {
        let bucket = RenderGroupState::new(key(PipelineState::opaque()), 2, 256);
        let _ = bucket.dynamic_offset(2);
    }

    #[test]
    fn test_unusable_config_is_rejected() {
        // Budget below one slot would give zero-capacity buckets
        let config = RenderGroupConfig {
            uniform_budget_bytes: 128,
            instance_slot_bytes: 256,
        };
        assert_eq!(config.capacity(), 0);
        assert!(matches!(
            RenderGroup::new(RenderGroupKind::Opaque, &config),
            Err(ConfigError::Invalid(_))
        ));
    }
}
