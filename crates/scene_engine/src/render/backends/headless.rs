//! Host-memory device
//!
//! [`HeadlessDevice`] implements both [`GraphicsDevice`] and
//! [`ResourceFactory`]. Resources live in slot maps; handles are the slot
//! keys' FFI form, so a stale handle is detected rather than aliasing a new
//! resource. Creation and buffer writes can be made to fail on demand.

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use slotmap::{new_key_type, Key, KeyData, SlotMap};

use crate::render::{
    BoundResource, BufferHandle, BufferUsage, CommandList, DeviceId, FactoryId, GraphicsDevice,
    GraphicsPipelineDescription, PipelineHandle, RenderError, RenderResult, ResourceFactory,
    ResourceLayoutDescription, ResourceLayoutHandle, ResourceSetDescription, ResourceSetHandle,
    SamplerDescription, SamplerHandle, TextureDescription, TextureHandle,
};
use crate::scene::IndexFormat;

new_key_type! { struct BufferKey; }
new_key_type! { struct TextureKey; }
new_key_type! { struct SamplerKey; }
new_key_type! { struct LayoutKey; }
new_key_type! { struct SetKey; }
new_key_type! { struct PipelineKey; }

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Operation that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    /// `create_buffer`
    CreateBuffer,
    /// `create_texture`
    CreateTexture,
    /// `create_sampler`
    CreateSampler,
    /// `create_resource_layout`
    CreateResourceLayout,
    /// `create_resource_set`
    CreateResourceSet,
    /// `create_graphics_pipeline`
    CreatePipeline,
    /// `update_buffer`
    UpdateBuffer,
}

#[derive(Debug)]
struct HeadlessBuffer {
    usage: BufferUsage,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct Resources {
    buffers: SlotMap<BufferKey, HeadlessBuffer>,
    textures: SlotMap<TextureKey, TextureDescription>,
    samplers: SlotMap<SamplerKey, SamplerDescription>,
    layouts: SlotMap<LayoutKey, ResourceLayoutDescription>,
    sets: SlotMap<SetKey, ResourceSetDescription>,
    pipelines: SlotMap<PipelineKey, GraphicsPipelineDescription>,
    pipelines_created: usize,
    buffer_writes: usize,
}

/// Device and factory backed by host memory
#[derive(Debug)]
pub struct HeadlessDevice {
    device_id: DeviceId,
    factory_id: FactoryId,
    alignment: u64,
    resources: RefCell<Resources>,
    failures: RefCell<HashSet<FailurePoint>>,
}

impl HeadlessDevice {
    /// Device with a 256-byte uniform alignment
    pub fn new() -> Self {
        Self::with_alignment(256)
    }

    /// Device with a custom uniform alignment
    pub fn with_alignment(alignment: u64) -> Self {
        let id = NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!("Created headless device {id} (uniform alignment {alignment})");
        Self {
            device_id: DeviceId(id),
            factory_id: FactoryId(id),
            alignment,
            resources: RefCell::new(Resources::default()),
            failures: RefCell::new(HashSet::new()),
        }
    }

    /// Make every subsequent call of `point` fail
    pub fn fail_on(&self, point: FailurePoint) {
        self.failures.borrow_mut().insert(point);
    }

    /// Stop injecting failures
    pub fn clear_failures(&self) {
        self.failures.borrow_mut().clear();
    }

    fn check(&self, point: FailurePoint) -> RenderResult<()> {
        if !self.failures.borrow().contains(&point) {
            return Ok(());
        }
        log::debug!("Injected failure at {point:?}");
        Err(match point {
            FailurePoint::UpdateBuffer => RenderError::BufferUpdateFailed(format!("injected failure at {point:?}")),
            _ => RenderError::ResourceCreationFailed(format!("injected failure at {point:?}")),
        })
    }

    /// Copy of a buffer's contents
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        let resources = self.resources.borrow();
        resources.buffers.get(key_of(buffer.0)).map(|b| b.data.clone())
    }

    /// Usage flags a buffer was created with
    pub fn buffer_usage(&self, buffer: BufferHandle) -> Option<BufferUsage> {
        let resources = self.resources.borrow();
        resources.buffers.get(key_of(buffer.0)).map(|b| b.usage)
    }

    /// Description a pipeline was created from
    pub fn pipeline_description(&self, pipeline: PipelineHandle) -> Option<GraphicsPipelineDescription> {
        let resources = self.resources.borrow();
        resources.pipelines.get(key_of(pipeline.0)).cloned()
    }

    /// Description a resource set was created from
    pub fn resource_set_description(&self, set: ResourceSetHandle) -> Option<ResourceSetDescription> {
        let resources = self.resources.borrow();
        resources.sets.get(key_of(set.0)).cloned()
    }

    /// Description a resource layout was created from
    pub fn resource_layout_description(&self, layout: ResourceLayoutHandle) -> Option<ResourceLayoutDescription> {
        let resources = self.resources.borrow();
        resources.layouts.get(key_of(layout.0)).cloned()
    }

    /// Live buffers
    pub fn live_buffers(&self) -> usize {
        self.resources.borrow().buffers.len()
    }

    /// Live pipelines
    pub fn live_pipelines(&self) -> usize {
        self.resources.borrow().pipelines.len()
    }

    /// Live resource sets
    pub fn live_resource_sets(&self) -> usize {
        self.resources.borrow().sets.len()
    }

    /// Live resource layouts
    pub fn live_resource_layouts(&self) -> usize {
        self.resources.borrow().layouts.len()
    }

    /// Every live resource of every kind
    pub fn live_resources(&self) -> usize {
        let r = self.resources.borrow();
        r.buffers.len() + r.textures.len() + r.samplers.len() + r.layouts.len() + r.sets.len() + r.pipelines.len()
    }

    /// Pipelines created since the device was made, including destroyed ones
    pub fn pipelines_created(&self) -> usize {
        self.resources.borrow().pipelines_created
    }

    /// Successful `update_buffer` calls
    pub fn buffer_writes(&self) -> usize {
        self.resources.borrow().buffer_writes
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn handle_of(key: impl Key) -> u64 {
    key.data().as_ffi()
}

fn key_of<K: Key>(raw: u64) -> K {
    K::from(KeyData::from_ffi(raw))
}

impl ResourceFactory for HeadlessDevice {
    fn id(&self) -> FactoryId {
        self.factory_id
    }

    fn create_buffer(&self, size: u64, usage: BufferUsage) -> RenderResult<BufferHandle> {
        self.check(FailurePoint::CreateBuffer)?;
        let len = usize::try_from(size)
            .map_err(|_| RenderError::ResourceCreationFailed(format!("buffer of {size} bytes")))?;
        let key = self.resources.borrow_mut().buffers.insert(HeadlessBuffer {
            usage,
            data: vec![0; len],
        });
        Ok(BufferHandle(handle_of(key)))
    }

    fn create_texture(&self, description: &TextureDescription) -> RenderResult<TextureHandle> {
        self.check(FailurePoint::CreateTexture)?;
        let key = self.resources.borrow_mut().textures.insert(*description);
        Ok(TextureHandle(handle_of(key)))
    }

    fn create_sampler(&self, description: &SamplerDescription) -> RenderResult<SamplerHandle> {
        self.check(FailurePoint::CreateSampler)?;
        let key = self.resources.borrow_mut().samplers.insert(*description);
        Ok(SamplerHandle(handle_of(key)))
    }

    fn create_resource_layout(
        &self,
        description: &ResourceLayoutDescription,
    ) -> RenderResult<ResourceLayoutHandle> {
        self.check(FailurePoint::CreateResourceLayout)?;
        let key = self.resources.borrow_mut().layouts.insert(description.clone());
        Ok(ResourceLayoutHandle(handle_of(key)))
    }

    fn create_resource_set(&self, description: &ResourceSetDescription) -> RenderResult<ResourceSetHandle> {
        self.check(FailurePoint::CreateResourceSet)?;
        let mut resources = self.resources.borrow_mut();
        let layout = resources
            .layouts
            .get(key_of::<LayoutKey>(description.layout.0))
            .ok_or_else(|| RenderError::UnknownResource(description.layout.to_string()))?;
        if layout.elements.len() != description.resources.len() {
            return Err(RenderError::ResourceCreationFailed(format!(
                "layout has {} slots but {} resources were bound",
                layout.elements.len(),
                description.resources.len()
            )));
        }
        for resource in &description.resources {
            let live = match resource {
                BoundResource::Buffer { buffer, .. } => resources.buffers.contains_key(key_of(buffer.0)),
                BoundResource::TextureSampler { texture, sampler } => {
                    resources.textures.contains_key(key_of(texture.0))
                        && resources.samplers.contains_key(key_of(sampler.0))
                }
            };
            if !live {
                return Err(RenderError::UnknownResource(format!("{resource:?}")));
            }
        }
        let key = resources.sets.insert(description.clone());
        Ok(ResourceSetHandle(handle_of(key)))
    }

    fn create_graphics_pipeline(
        &self,
        description: &GraphicsPipelineDescription,
    ) -> RenderResult<PipelineHandle> {
        self.check(FailurePoint::CreatePipeline)?;
        let mut resources = self.resources.borrow_mut();
        if let Some(missing) = description
            .resource_layouts
            .iter()
            .find(|layout| !resources.layouts.contains_key(key_of(layout.0)))
        {
            return Err(RenderError::UnknownResource(missing.to_string()));
        }
        resources.pipelines_created += 1;
        let key = resources.pipelines.insert(description.clone());
        Ok(PipelineHandle(handle_of(key)))
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        if self.resources.borrow_mut().buffers.remove(key_of(buffer.0)).is_none() {
            log::warn!("destroy of unknown {buffer}");
        }
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        if self.resources.borrow_mut().textures.remove(key_of(texture.0)).is_none() {
            log::warn!("destroy of unknown {texture}");
        }
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        if self.resources.borrow_mut().samplers.remove(key_of(sampler.0)).is_none() {
            log::warn!("destroy of unknown {sampler}");
        }
    }

    fn destroy_resource_layout(&self, layout: ResourceLayoutHandle) {
        if self.resources.borrow_mut().layouts.remove(key_of(layout.0)).is_none() {
            log::warn!("destroy of unknown {layout}");
        }
    }

    fn destroy_resource_set(&self, set: ResourceSetHandle) {
        if self.resources.borrow_mut().sets.remove(key_of(set.0)).is_none() {
            log::warn!("destroy of unknown {set}");
        }
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        if self.resources.borrow_mut().pipelines.remove(key_of(pipeline.0)).is_none() {
            log::warn!("destroy of unknown {pipeline}");
        }
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn id(&self) -> DeviceId {
        self.device_id
    }

    fn update_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()> {
        self.check(FailurePoint::UpdateBuffer)?;
        let mut resources = self.resources.borrow_mut();
        let target = resources
            .buffers
            .get_mut(key_of(buffer.0))
            .ok_or_else(|| RenderError::UnknownResource(buffer.to_string()))?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = start.saturating_add(data.len());
        let size = target.data.len();
        let range = target.data.get_mut(start..end).ok_or_else(|| {
            RenderError::BufferUpdateFailed(format!("write of {start}..{end} into {buffer} of {size} bytes"))
        })?;
        range.copy_from_slice(data);
        resources.buffer_writes += 1;
        Ok(())
    }

    fn uniform_buffer_alignment(&self) -> u64 {
        self.alignment
    }
}

/// A command recorded by [`HeadlessCommandList`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    /// `set_pipeline`
    SetPipeline(PipelineHandle),
    /// `set_vertex_buffer`
    SetVertexBuffer(BufferHandle),
    /// `set_index_buffer`
    SetIndexBuffer(BufferHandle, IndexFormat),
    /// `set_resource_set`
    SetResourceSet {
        /// Set slot
        slot: u32,
        /// Bound set
        set: ResourceSetHandle,
        /// Dynamic offsets
        dynamic_offsets: Vec<u32>,
    },
    /// `draw_indexed`
    DrawIndexed {
        /// Indices per instance
        index_count: u32,
        /// Instances
        instance_count: u32,
        /// First index read
        first_index: u32,
        /// Added to each index
        vertex_offset: i32,
        /// First instance id
        first_instance: u32,
    },
}

/// Command list that keeps what was recorded
#[derive(Debug, Default)]
pub struct HeadlessCommandList {
    commands: Vec<RecordedCommand>,
}

impl HeadlessCommandList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded commands in order
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Number of recorded draws
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::DrawIndexed { .. }))
            .count()
    }

    /// Forget everything recorded
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl CommandList for HeadlessCommandList {
    fn set_pipeline(&mut self, pipeline: PipelineHandle) {
        self.commands.push(RecordedCommand::SetPipeline(pipeline));
    }

    fn set_vertex_buffer(&mut self, buffer: BufferHandle) {
        self.commands.push(RecordedCommand::SetVertexBuffer(buffer));
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat) {
        self.commands.push(RecordedCommand::SetIndexBuffer(buffer, format));
    }

    fn set_resource_set(&mut self, slot: u32, set: ResourceSetHandle, dynamic_offsets: &[u32]) {
        self.commands.push(RecordedCommand::SetResourceSet {
            slot,
            set,
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.commands.push(RecordedCommand::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }
}
