//! Scene Renderer - drives one frame from scene graph to command list
//!
//! Resets and runs the cull visitor, prepares the device resources of every
//! populated bucket, then records opaque buckets followed by transparent
//! ones. All fallible device work happens before the first command is
//! recorded, so a failed frame leaves the command list untouched.

use std::collections::HashMap;

use crate::config::{ConfigError, EngineConfig};
use crate::cull::{CullResult, CullStats, CullVisitor};
use crate::render::{
    BoundResource, BufferHandle, BufferUsage, Camera, CommandList, DeviceContext, DeviceKey,
    FrameUniforms, OutputDescription, RenderGroup, RenderResult, ResourceFactory, ResourceKind,
    ResourceLayoutDescription, ResourceLayoutElement, ResourceLayoutHandle, ResourceSetDescription,
    ResourceSetHandle, ShaderStages,
};
use crate::scene::Node;

/// Counters for one rendered frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Traversal counters
    pub cull: CullStats,
    /// Populated opaque buckets
    pub opaque_buckets: usize,
    /// Populated transparent buckets
    pub transparent_buckets: usize,
    /// `draw_indexed` calls recorded
    pub draw_calls: usize,
}

/// Per-device resources shared by every bucket
#[derive(Debug, Clone, Copy)]
struct FrameResources {
    layout: ResourceLayoutHandle,
    buffer: BufferHandle,
    set: ResourceSetHandle,
}

/// Frame driver around a [`CullVisitor`]
#[derive(Debug)]
pub struct SceneRenderer {
    visitor: CullVisitor,
    output: OutputDescription,
    frame_resources: HashMap<DeviceKey, FrameResources>,
}

impl SceneRenderer {
    /// Renderer configured from engine settings
    ///
    /// # Errors
    ///
    /// Returns the first error reported by [`EngineConfig::validate`].
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            visitor: CullVisitor::from_config(config)?,
            output: OutputDescription::default(),
            frame_resources: HashMap::new(),
        })
    }

    /// Render into attachments with these formats
    #[must_use]
    pub const fn with_output(mut self, output: OutputDescription) -> Self {
        self.output = output;
        self
    }

    /// The visitor and its render groups
    pub const fn visitor(&self) -> &CullVisitor {
        &self.visitor
    }

    /// Mutable visitor, e.g. to change its default state
    pub fn visitor_mut(&mut self) -> &mut CullVisitor {
        &mut self.visitor
    }

    /// Cull, batch and record one frame
    pub fn render_frame(
        &mut self,
        root: &Node,
        camera: &Camera,
        context: &DeviceContext<'_>,
        commands: &mut dyn CommandList,
    ) -> CullResult<FrameStats> {
        self.visitor.reset();
        self.visitor.set_camera(camera);
        self.visitor.prepare_frustum();
        self.visitor.traverse(root, context)?;

        let frame = self.frame_resources(context)?;
        let uniforms = FrameUniforms::from_camera(camera);
        context.device.update_buffer(frame.buffer, 0, bytemuck::bytes_of(&uniforms))?;

        prepare_group(self.visitor.opaque_group_mut(), context, frame.layout, &self.output)?;
        prepare_group(self.visitor.transparent_group_mut(), context, frame.layout, &self.output)?;

        let device = context.key();
        let mut stats = FrameStats {
            cull: *self.visitor.stats(),
            ..FrameStats::default()
        };
        let (buckets, draws) = record_group(self.visitor.opaque_group(), device, frame.set, commands);
        stats.opaque_buckets = buckets;
        stats.draw_calls += draws;
        let (buckets, draws) = record_group(self.visitor.transparent_group(), device, frame.set, commands);
        stats.transparent_buckets = buckets;
        stats.draw_calls += draws;

        log::debug!(
            "Frame recorded: {} opaque buckets, {} transparent buckets, {} draws",
            stats.opaque_buckets,
            stats.transparent_buckets,
            stats.draw_calls
        );
        Ok(stats)
    }

    fn frame_resources(&mut self, context: &DeviceContext<'_>) -> RenderResult<FrameResources> {
        let key = context.key();
        if let Some(frame) = self.frame_resources.get(&key) {
            return Ok(*frame);
        }
        let frame = create_frame_resources(context.factory)?;
        log::debug!("Created frame resources for {key:?}");
        self.frame_resources.insert(key, frame);
        Ok(frame)
    }

    /// Destroy every device object `factory` created for this renderer
    pub fn release_resources(&mut self, factory: &dyn ResourceFactory) {
        self.visitor.release_resources(factory);
        let factory_id = factory.id();
        self.frame_resources.retain(|key, frame| {
            if key.factory != factory_id {
                return true;
            }
            factory.destroy_resource_set(frame.set);
            factory.destroy_buffer(frame.buffer);
            factory.destroy_resource_layout(frame.layout);
            false
        });
        log::info!("Released scene renderer resources for {factory_id:?}");
    }
}

fn frame_layout() -> ResourceLayoutDescription {
    ResourceLayoutDescription {
        elements: vec![ResourceLayoutElement {
            name: "frame".to_string(),
            kind: ResourceKind::UniformBuffer,
            stages: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
        }],
    }
}

fn create_frame_resources(factory: &dyn ResourceFactory) -> RenderResult<FrameResources> {
    let size = std::mem::size_of::<FrameUniforms>() as u64;
    let layout = factory.create_resource_layout(&frame_layout())?;
    let buffer = match factory.create_buffer(size, BufferUsage::UNIFORM | BufferUsage::DYNAMIC) {
        Ok(buffer) => buffer,
        Err(e) => {
            factory.destroy_resource_layout(layout);
            return Err(e);
        }
    };
    let set = match factory.create_resource_set(&ResourceSetDescription {
        layout,
        resources: vec![BoundResource::Buffer {
            buffer,
            offset: 0,
            size,
        }],
    }) {
        Ok(set) => set,
        Err(e) => {
            factory.destroy_buffer(buffer);
            factory.destroy_resource_layout(layout);
            return Err(e);
        }
    };
    Ok(FrameResources { layout, buffer, set })
}

fn prepare_group(
    group: &mut RenderGroup,
    context: &DeviceContext<'_>,
    frame_layout: ResourceLayoutHandle,
    output: &OutputDescription,
) -> RenderResult<()> {
    for bucket in group.states_mut() {
        bucket.device_resources(context, frame_layout, output)?;
        bucket.write_instances(context)?;
    }
    Ok(())
}

/// Returns the buckets and draws recorded
fn record_group(
    group: &RenderGroup,
    device: DeviceKey,
    frame_set: ResourceSetHandle,
    commands: &mut dyn CommandList,
) -> (usize, usize) {
    let mut buckets = 0;
    let mut draws = 0;
    for bucket in group.states() {
        // Prepared for every populated bucket before recording starts
        let Some(resources) = bucket.resources_for(device) else {
            continue;
        };
        buckets += 1;
        commands.set_pipeline(resources.pipeline);
        commands.set_resource_set(0, frame_set, &[]);
        for (index, element) in bucket.elements().iter().enumerate() {
            commands.set_resource_set(1, resources.resource_set, &[bucket.dynamic_offset(index)]);
            commands.set_vertex_buffer(element.buffers.vertex);
            commands.set_index_buffer(element.buffers.index, element.buffers.index_format);
            for set in &element.primitive_sets {
                commands.draw_indexed(set.count, set.instance_count, set.start, 0, 0);
                draws += 1;
            }
        }
    }
    (buckets, draws)
}
