//! Per-drawable device buffers
//!
//! Vertex and index data are uploaded the first time a drawable is queued
//! on a device and reused every frame after that. Replacing a drawable's
//! geometry bumps its revision, which makes the next frame rebuild them.

use std::collections::HashMap;

use crate::foundation::math::utils::align_up;
use crate::render::{BufferHandle, BufferUsage, DeviceContext, DeviceKey, RenderResult, ResourceFactory};
use crate::scene::{Drawable, DrawableId, IndexFormat};

/// Device buffers holding one drawable's geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryBuffers {
    /// Vertex buffer
    pub vertex: BufferHandle,
    /// Index buffer
    pub index: BufferHandle,
    /// Width of the indices in `index`
    pub index_format: IndexFormat,
}

#[derive(Debug)]
struct CachedBuffers {
    buffers: GeometryBuffers,
    revision: u64,
}

/// Cache of geometry buffers keyed by device and drawable
#[derive(Debug, Default)]
pub struct GeometryBufferCache {
    entries: HashMap<(DeviceKey, DrawableId), CachedBuffers>,
}

impl GeometryBufferCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers for `drawable` on this device, created and filled on first use
    pub fn ensure(&mut self, drawable: &Drawable, context: &DeviceContext<'_>) -> RenderResult<GeometryBuffers> {
        let key = (context.key(), drawable.id());
        if let Some(cached) = self.entries.get(&key) {
            if cached.revision == drawable.revision() {
                return Ok(cached.buffers);
            }
        }
        if let Some(stale) = self.entries.remove(&key) {
            log::debug!("Rebuilding buffers for {} (revision {})", drawable.id(), drawable.revision());
            destroy(context.factory, &stale.buffers);
        }

        let buffers = upload(drawable, context)?;
        self.entries.insert(
            key,
            CachedBuffers {
                buffers,
                revision: drawable.revision(),
            },
        );
        Ok(buffers)
    }

    /// Buffers already built for `drawable` on a device, if any
    pub fn get(&self, device: DeviceKey, drawable: DrawableId) -> Option<GeometryBuffers> {
        self.entries.get(&(device, drawable)).map(|cached| cached.buffers)
    }

    /// Destroy one drawable's buffers on every device of `factory`
    pub fn release_drawable(&mut self, drawable: DrawableId, factory: &dyn ResourceFactory) {
        self.release_where(factory, |(_, id)| *id == drawable);
    }

    /// Destroy every buffer `factory` created through this cache
    pub fn release_all(&mut self, factory: &dyn ResourceFactory) {
        self.release_where(factory, |_| true);
    }

    fn release_where(
        &mut self,
        factory: &dyn ResourceFactory,
        mut predicate: impl FnMut(&(DeviceKey, DrawableId)) -> bool,
    ) {
        let factory_id = factory.id();
        let mut released = 0;
        self.entries.retain(|key, cached| {
            if key.0.factory == factory_id && predicate(key) {
                destroy(factory, &cached.buffers);
                released += 1;
                false
            } else {
                true
            }
        });
        if released > 0 {
            log::debug!("Released geometry buffers of {released} drawables");
        }
    }

    /// Number of cached buffer pairs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn upload(drawable: &Drawable, context: &DeviceContext<'_>) -> RenderResult<GeometryBuffers> {
    let geometry = drawable.geometry();
    let vertex_bytes = geometry.vertex_data();
    let index_bytes = geometry.indices().as_bytes();

    let vertex = context
        .factory
        .create_buffer(buffer_size(vertex_bytes.len()), BufferUsage::VERTEX)?;
    let index = match context
        .factory
        .create_buffer(buffer_size(index_bytes.len()), BufferUsage::INDEX)
    {
        Ok(index) => index,
        Err(e) => {
            context.factory.destroy_buffer(vertex);
            return Err(e);
        }
    };
    let buffers = GeometryBuffers {
        vertex,
        index,
        index_format: geometry.indices().format(),
    };

    let written = write_if_any(context, vertex, vertex_bytes).and_then(|()| write_if_any(context, index, index_bytes));
    if let Err(e) = written {
        destroy(context.factory, &buffers);
        return Err(e);
    }

    log::debug!(
        "Created geometry buffers for {}: {} vertex bytes, {} index bytes",
        drawable.id(),
        vertex_bytes.len(),
        index_bytes.len()
    );
    Ok(buffers)
}

/// Zero-sized buffers are rounded up to one word
fn buffer_size(len: usize) -> u64 {
    align_up((len as u64).max(1), 4)
}

fn write_if_any(context: &DeviceContext<'_>, buffer: BufferHandle, data: &[u8]) -> RenderResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    context.device.update_buffer(buffer, 0, data)
}

fn destroy(factory: &dyn ResourceFactory, buffers: &GeometryBuffers) {
    factory.destroy_buffer(buffers.vertex);
    factory.destroy_buffer(buffers.index);
}
