//! Scenario tests for the cull visitor against the headless device

mod culling;
mod traversal;

use crate::config::{CullingConfig, RenderGroupConfig};
use crate::cull::{CullResult, CullVisitor};
use crate::foundation::math::Vec3;
use crate::render::backends::HeadlessDevice;
use crate::render::{Camera, DeviceContext, RenderGroupElement, Viewport};
use crate::scene::{Drawable, Geometry, IndexData, Node, PrimitiveSet, PrimitiveTopology};

/// Two triangles over the square -1..1 in the XY plane, one primitive set each
pub(super) fn quad() -> Drawable {
    let positions = [
        Vec3::new(-1.0, -1.0, 0.0),
        Vec3::new(1.0, -1.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(-1.0, 1.0, 0.0),
    ];
    Drawable::new(
        Geometry::from_positions(&positions, IndexData::U16(vec![0, 1, 2, 0, 2, 3])),
        PrimitiveTopology::TriangleList,
    )
    .with_primitive_set(PrimitiveSet::new(0, 3))
    .unwrap()
    .with_primitive_set(PrimitiveSet::new(3, 3))
    .unwrap()
}

/// Looks down -Z from z=10 and sees x and y in -10..10, world z in -90..9
pub(super) fn camera() -> Camera {
    Camera::orthographic_look_at(
        Vec3::new(0.0, 0.0, 10.0),
        Vec3::zeros(),
        Vec3::y(),
        10.0,
        Viewport::new(100, 100),
        1.0,
        100.0,
    )
}

pub(super) fn visitor() -> CullVisitor {
    CullVisitor::new(&RenderGroupConfig::default(), CullingConfig::default()).unwrap()
}

/// One full frame of traversal on `device`
pub(super) fn run(visitor: &mut CullVisitor, root: &Node, device: &HeadlessDevice) -> CullResult<()> {
    run_with_camera(visitor, root, device, &camera())
}

pub(super) fn run_with_camera(
    visitor: &mut CullVisitor,
    root: &Node,
    device: &HeadlessDevice,
    camera: &Camera,
) -> CullResult<()> {
    let context = DeviceContext::new(device, device);
    visitor.reset();
    visitor.set_camera(camera);
    visitor.prepare_frustum();
    visitor.traverse(root, &context)
}

/// Opaque elements in bucket order
pub(super) fn opaque_elements(visitor: &CullVisitor) -> Vec<&RenderGroupElement> {
    visitor
        .opaque_group()
        .states()
        .flat_map(|state| state.elements())
        .collect()
}
