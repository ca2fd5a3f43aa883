//! Frustum, callback and primitive-set culling plus camera-facing leaves

use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;

use super::{camera, opaque_elements, quad, run, run_with_camera, visitor};
use crate::config::{CullingConfig, RenderGroupConfig};
use crate::cull::CullVisitor;
use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::render::backends::HeadlessDevice;
use crate::render::{Camera, Viewport};
use crate::scene::{
    BillboardMode, Drawable, Geometry, IndexData, MatrixContext, MatrixHook, Node, PrimitiveSet,
    PrimitiveTopology, TextNode,
};

fn far_away() -> Node {
    Node::transform(Mat4::translation(50.0, 0.0, 0.0)).with_child(Node::drawable(quad()))
}

/// One triangle at the origin and one at x=50
fn split_drawable() -> Drawable {
    let positions = [
        Vec3::new(-1.0, -1.0, 0.0),
        Vec3::new(1.0, -1.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(49.0, -1.0, 0.0),
        Vec3::new(51.0, -1.0, 0.0),
        Vec3::new(50.0, 1.0, 0.0),
    ];
    Drawable::new(
        Geometry::from_positions(&positions, IndexData::U32(vec![0, 1, 2, 3, 4, 5])),
        PrimitiveTopology::TriangleList,
    )
    .with_primitive_set(PrimitiveSet::new(0, 3))
    .unwrap()
    .with_primitive_set(PrimitiveSet::new(3, 3))
    .unwrap()
}

#[test]
fn test_outside_subtree_is_culled() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();

    run(&mut visitor, &far_away(), &device).unwrap();

    assert!(visitor.opaque_group().is_empty());
    assert!(visitor.transparent_group().is_empty());
    assert_eq!(visitor.stats().nodes_culled, 1);
    assert_eq!(visitor.stats().drawables_visited, 0);
    // Culled drawables never reach the device
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_camera_turned_away_culls_the_scene() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let root = Node::transform(Mat4::translation(5.0, 0.0, 0.0)).with_child(Node::drawable(quad()));

    run(&mut visitor, &root, &device).unwrap();
    assert_eq!(visitor.opaque_group().element_count(), 1);

    // Same eye, now looking down +Z with the scene behind it
    let away = Camera::orthographic_look_at(
        Vec3::new(0.0, 0.0, 10.0),
        Vec3::new(0.0, 0.0, 20.0),
        Vec3::y(),
        10.0,
        Viewport::new(100, 100),
        1.0,
        100.0,
    );
    run_with_camera(&mut visitor, &root, &device, &away).unwrap();

    assert!(visitor.opaque_group().is_empty());
    assert_eq!(visitor.stats().nodes_culled, 1);
    assert_eq!(visitor.stats().drawables_visited, 0);
}

#[test]
fn test_disabled_culling_keeps_everything() {
    let device = HeadlessDevice::new();
    let culling = CullingConfig {
        enabled: false,
        ..CullingConfig::default()
    };
    let mut visitor = CullVisitor::new(&RenderGroupConfig::default(), culling).unwrap();

    run(&mut visitor, &far_away(), &device).unwrap();

    assert_eq!(visitor.opaque_group().element_count(), 1);
}

#[test]
fn test_inactive_node_is_not_frustum_tested() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let root = Node::transform(Mat4::translation(50.0, 0.0, 0.0))
        .with_culling(false)
        .with_child(Node::drawable(quad()).with_culling(false));

    run(&mut visitor, &root, &device).unwrap();

    assert_eq!(visitor.opaque_group().element_count(), 1);
    assert_eq!(visitor.stats().nodes_culled, 0);
}

#[test]
fn test_cull_callback_prunes_and_sees_parent_matrix() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let root = Node::transform(Mat4::translation(3.0, 0.0, 0.0))
        .with_child(Node::drawable(quad()).with_name("kept"))
        .with_child(Node::drawable(quad()).with_name("hidden").with_cull_callback(Arc::new(
            move |_: &Node, matrix: &Mat4| {
                if let Ok(mut seen) = recorder.lock() {
                    seen.push(*matrix);
                }
                false
            },
        )));

    run(&mut visitor, &root, &device).unwrap();

    assert_eq!(visitor.opaque_group().element_count(), 1);
    assert_eq!(visitor.stats().nodes_culled, 1);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_relative_eq!(seen[0], Mat4::translation(3.0, 0.0, 0.0));
}

#[test]
fn test_primitive_sets_are_culled_on_their_own_bounds() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();

    run(&mut visitor, &Node::drawable(split_drawable()), &device).unwrap();

    let elements = opaque_elements(&visitor);
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].primitive_sets, vec![PrimitiveSet::new(0, 3)]);
    assert_eq!(visitor.stats().primitive_sets_culled, 1);
}

#[test]
fn test_primitive_set_culling_can_be_switched_off() {
    let device = HeadlessDevice::new();
    let culling = CullingConfig {
        primitive_set_culling: false,
        ..CullingConfig::default()
    };
    let mut visitor = CullVisitor::new(&RenderGroupConfig::default(), culling).unwrap();

    run(&mut visitor, &Node::drawable(split_drawable()), &device).unwrap();

    assert_eq!(opaque_elements(&visitor)[0].primitive_sets.len(), 2);
    assert_eq!(visitor.stats().primitive_sets_culled, 0);
}

#[test]
fn test_fully_inside_parent_skips_set_tests() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    // Both sets visible; the drawable is wholly inside so no set is tested
    run(&mut visitor, &Node::group().with_child(Node::drawable(quad())), &device).unwrap();

    assert_eq!(opaque_elements(&visitor)[0].primitive_sets.len(), 2);
    assert_eq!(visitor.stats().primitive_sets_culled, 0);
}

#[test]
fn test_absolute_transform_escapes_culled_parent() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let root = Node::transform(Mat4::translation(50.0, 0.0, 0.0))
        .with_child(Node::drawable(quad()).with_name("relative"))
        .with_child(Node::absolute_transform(Mat4::identity()).with_child(Node::drawable(quad())));

    run(&mut visitor, &root, &device).unwrap();

    let elements = opaque_elements(&visitor);
    assert_eq!(elements.len(), 1);
    assert_relative_eq!(elements[0].model, Mat4::identity());
    // The relative sibling still moved with the parent and was culled
    assert_eq!(visitor.stats().nodes_culled, 1);
}

#[test]
fn test_screen_aligned_billboard_drops_rotation() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let root = Node::transform(Mat4::translation(2.0, 0.0, 0.0) * Mat4::rotation_y(0.7))
        .with_child(Node::billboard(BillboardMode::ScreenAligned, quad()));

    run(&mut visitor, &root, &device).unwrap();

    let model_view = opaque_elements(&visitor)[0].model_view;
    assert_relative_eq!(model_view, Mat4::translation(2.0, 0.0, -10.0), epsilon = 1e-5);
}

#[test]
fn test_axis_billboard_turns_towards_eye() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let root = Node::transform(Mat4::rotation_y(0.7))
        .with_child(Node::billboard(BillboardMode::AxisAligned(Vec3::y()), quad()));

    run(&mut visitor, &root, &device).unwrap();

    // The camera sits on +Z, so local +Z must point back along +Z in eye space
    let model_view = opaque_elements(&visitor)[0].model_view;
    let facing = model_view.fixed_view::<3, 1>(0, 2).normalize();
    assert_relative_eq!(facing, Vec3::z(), epsilon = 1e-5);
}

#[test]
fn test_text_keeps_pixel_height() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let root = Node::text(TextNode {
        drawable: quad(),
        pixel_height: Some(10.0),
        face_camera: false,
    });

    run(&mut visitor, &root, &device).unwrap();

    // 20 world units over 100 pixels: ten pixels span two units
    let model_view = opaque_elements(&visitor)[0].model_view;
    assert_relative_eq!(
        model_view,
        camera().view_matrix() * Mat4::uniform_scale(2.0),
        epsilon = 1e-5
    );
}

#[test]
fn test_matrix_hook_rewrites_model_view_only() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let hook = MatrixHook::Custom(Arc::new(|context: &MatrixContext<'_>| {
        context.model_view * Mat4::uniform_scale(3.0)
    }));
    let root = Node::transform(Mat4::translation(1.0, 0.0, 0.0))
        .with_child(Node::drawable(quad().with_matrix_hook(hook)));

    run(&mut visitor, &root, &device).unwrap();

    let element = opaque_elements(&visitor)[0];
    assert_relative_eq!(element.model, Mat4::translation(1.0, 0.0, 0.0));
    assert_relative_eq!(
        element.model_view,
        camera().view_matrix() * Mat4::translation(1.0, 0.0, 0.0) * Mat4::uniform_scale(3.0),
        epsilon = 1e-5
    );
}
