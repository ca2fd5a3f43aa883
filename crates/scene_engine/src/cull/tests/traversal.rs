//! Matrix composition, state routing, bucketing and error propagation

use std::sync::Arc;

use approx::assert_relative_eq;

use super::{camera, opaque_elements, quad, run, visitor};
use crate::config::{CullingConfig, RenderGroupConfig};
use crate::cull::{CullError, CullVisitor};
use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::render::backends::{FailurePoint, HeadlessDevice};
use crate::render::{PipelineState, RenderGroup, RenderGroupElement};
use crate::scene::{
    BillboardMode, Geometry, IndexData, Node, PrimitiveSet, PrimitiveTopology, SceneError,
};

fn all_elements(group: &RenderGroup) -> Vec<RenderGroupElement> {
    group.states().flat_map(|state| state.elements()).cloned().collect()
}

#[test]
fn test_translated_drawable_lands_in_one_opaque_bucket() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let drawable = quad();
    let set_count = drawable.primitive_sets().len();
    let root = Node::transform(Mat4::translation(5.0, 0.0, 0.0)).with_child(Node::drawable(drawable));

    run(&mut visitor, &root, &device).unwrap();

    assert_eq!(visitor.opaque_group().bucket_count(), 1);
    assert!(visitor.transparent_group().is_empty());
    let elements = opaque_elements(&visitor);
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].primitive_sets.len(), set_count);
    assert_relative_eq!(elements[0].model, Mat4::translation(5.0, 0.0, 0.0));
    assert_relative_eq!(
        elements[0].model_view,
        camera().view_matrix() * Mat4::translation(5.0, 0.0, 0.0)
    );
}

#[test]
fn test_nested_transforms_compose_parent_first() {
    let device = HeadlessDevice::new();
    let chain = [
        Mat4::translation(1.0, 0.0, 0.0),
        Mat4::rotation_y(0.3),
        Mat4::uniform_scale(0.5),
        Mat4::translation(0.0, 2.0, -1.0),
    ];

    for depth in 0..=chain.len() {
        let matrices = &chain[..depth];
        let mut node = Node::drawable(quad());
        for matrix in matrices.iter().rev() {
            node = Node::transform(*matrix).with_child(node);
        }
        let expected = matrices.iter().fold(Mat4::identity(), |acc, m| acc * m);

        let mut visitor = visitor();
        run(&mut visitor, &node, &device).unwrap();
        let elements = opaque_elements(&visitor);
        assert_eq!(elements.len(), 1, "depth {depth}");
        assert_relative_eq!(elements[0].model, expected, epsilon = 1e-5);
    }
}

#[test]
fn test_transparent_state_routes_to_transparent_group() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let root = Node::group().with_child(Node::drawable(quad())).with_child(
        Node::transform(Mat4::translation(2.0, 0.0, 0.0))
            .with_pipeline_state(Arc::new(PipelineState::transparent()))
            .with_child(Node::drawable(quad())),
    );

    run(&mut visitor, &root, &device).unwrap();

    assert_eq!(visitor.opaque_group().element_count(), 1);
    assert_eq!(visitor.transparent_group().element_count(), 1);
    let key = &visitor.transparent_group().keys()[0];
    assert!(key.pipeline_state.is_transparent());
}

#[test]
fn test_nearest_state_override_wins() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    // Transparent ancestor, opaque override closer to the leaf
    let root = Node::group()
        .with_pipeline_state(Arc::new(PipelineState::transparent()))
        .with_child(
            Node::group()
                .with_pipeline_state(Arc::new(PipelineState::opaque()))
                .with_child(Node::drawable(quad())),
        )
        .with_child(Node::drawable(quad()));

    run(&mut visitor, &root, &device).unwrap();

    assert_eq!(visitor.opaque_group().element_count(), 1);
    assert_eq!(visitor.transparent_group().element_count(), 1);
}

#[test]
fn test_equal_states_share_a_key() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let root = Node::group()
        .with_child(Node::drawable(quad()).with_pipeline_state(Arc::new(PipelineState::opaque())))
        .with_child(Node::drawable(quad()).with_pipeline_state(Arc::new(PipelineState::opaque())));

    run(&mut visitor, &root, &device).unwrap();

    assert_eq!(visitor.opaque_group().keys().len(), 1);
    assert_eq!(visitor.opaque_group().element_count(), 2);
}

#[test]
fn test_topology_override_splits_buckets() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let positions = [Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)];
    let drawable = crate::scene::Drawable::new(
        Geometry::from_positions(&positions, IndexData::U16(vec![0, 1, 2, 0, 1, 1, 2])),
        PrimitiveTopology::TriangleList,
    )
    .with_primitive_set(PrimitiveSet::new(0, 3))
    .unwrap()
    .with_primitive_set(PrimitiveSet::new(3, 4).with_topology(PrimitiveTopology::LineList))
    .unwrap();

    run(&mut visitor, &Node::drawable(drawable), &device).unwrap();

    let group = visitor.opaque_group();
    assert_eq!(group.keys().len(), 2);
    assert_eq!(group.keys()[0].topology, PrimitiveTopology::TriangleList);
    assert_eq!(group.keys()[1].topology, PrimitiveTopology::LineList);
    assert_eq!(visitor.stats().elements_emitted, 2);
}

#[test]
fn test_alternating_topologies_gather_per_bucket() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let positions = [Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)];
    let drawable = crate::scene::Drawable::new(
        Geometry::from_positions(&positions, IndexData::U16(vec![0, 1, 2, 0, 1, 0, 1, 2])),
        PrimitiveTopology::TriangleList,
    )
    .with_primitive_set(PrimitiveSet::new(0, 3))
    .unwrap()
    .with_primitive_set(PrimitiveSet::new(3, 2).with_topology(PrimitiveTopology::LineList))
    .unwrap()
    .with_primitive_set(PrimitiveSet::new(5, 3))
    .unwrap();

    run(&mut visitor, &Node::drawable(drawable), &device).unwrap();

    let group = visitor.opaque_group();
    assert_eq!(group.keys().len(), 2);
    let triangles: Vec<_> = group.buckets_for(&group.keys()[0]).iter().flat_map(|b| b.elements()).collect();
    let lines: Vec<_> = group.buckets_for(&group.keys()[1]).iter().flat_map(|b| b.elements()).collect();
    assert_eq!(triangles.len(), 1);
    assert_eq!(
        triangles[0].primitive_sets,
        vec![PrimitiveSet::new(0, 3), PrimitiveSet::new(5, 3)]
    );
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].primitive_sets.len(), 1);
    assert_eq!(group.keys()[1].vertex_layout, group.keys()[0].vertex_layout);
    assert_eq!(visitor.stats().elements_emitted, 2);
}

#[test]
fn test_full_buckets_spill_into_siblings() {
    let device = HeadlessDevice::new();
    let config = RenderGroupConfig {
        uniform_budget_bytes: 512,
        instance_slot_bytes: 256,
    };
    let mut visitor = CullVisitor::new(&config, CullingConfig::default()).unwrap();
    let mut root = Node::group();
    for _ in 0..5 {
        root = root.with_child(Node::drawable(quad()));
    }

    run(&mut visitor, &root, &device).unwrap();

    let group = visitor.opaque_group();
    let sizes: Vec<usize> = group.buckets_for(&group.keys()[0]).iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(group.bucket_count(), 3);
}

#[test]
fn test_reset_repeats_the_same_frame() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let root = Node::group()
        .with_child(Node::drawable(quad()))
        .with_child(Node::drawable(quad()).with_pipeline_state(Arc::new(PipelineState::transparent())));

    run(&mut visitor, &root, &device).unwrap();
    let first = (*visitor.stats(), visitor.opaque_group().bucket_count());
    let first_elements = (all_elements(visitor.opaque_group()), all_elements(visitor.transparent_group()));
    let buffers = visitor.geometry_buffers().len();

    run(&mut visitor, &root, &device).unwrap();
    assert_eq!((*visitor.stats(), visitor.opaque_group().bucket_count()), first);
    assert_eq!(visitor.opaque_group().element_count(), 1);
    assert_eq!(visitor.transparent_group().element_count(), 1);
    assert_eq!(
        (all_elements(visitor.opaque_group()), all_elements(visitor.transparent_group())),
        first_elements
    );
    // Geometry is uploaded once
    assert_eq!(visitor.geometry_buffers().len(), buffers);

    visitor.reset();
    assert_eq!(visitor.opaque_group().element_count(), 0);
    assert_eq!(visitor.opaque_group().keys().len(), 1);
}

#[test]
fn test_out_of_range_set_names_the_node() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let mut node = Node::drawable(quad()).with_name("broken");
    let shrunk = Geometry::from_positions(
        &[Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
        IndexData::U16(vec![0, 1, 2]),
    );
    if let Some(drawable) = node.drawable_mut() {
        drawable.set_geometry(shrunk);
    }

    let err = run(&mut visitor, &node, &device).unwrap_err();
    match err {
        CullError::Scene(SceneError::PrimitiveSetOutOfRange { drawable, set, index_count, .. }) => {
            assert_eq!(drawable, "broken");
            assert_eq!(set, 1);
            assert_eq!(index_count, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(visitor.opaque_group().is_empty());
}

#[test]
fn test_singular_axis_billboard_is_an_error() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let root = Node::transform(Mat4::uniform_scale(0.0)).with_culling(false).with_child(
        Node::billboard(BillboardMode::AxisAligned(Vec3::y()), quad())
            .with_name("sign")
            .with_culling(false),
    );

    let err = run(&mut visitor, &root, &device).unwrap_err();
    assert_eq!(
        err,
        CullError::Scene(SceneError::NonInvertibleMatrix {
            node: "sign".to_string(),
            query: "billboard eye position",
        })
    );
}

#[test]
fn test_device_failure_surfaces_as_device_error() {
    let device = HeadlessDevice::new();
    device.fail_on(FailurePoint::CreateBuffer);
    let mut visitor = visitor();

    let err = run(&mut visitor, &Node::drawable(quad()), &device).unwrap_err();
    assert!(matches!(err, CullError::Device(_)));
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_release_resources_frees_geometry() {
    let device = HeadlessDevice::new();
    let mut visitor = visitor();
    let drawable = quad();
    let id = drawable.id();
    let root = Node::group().with_child(Node::drawable(drawable)).with_child(Node::drawable(quad()));

    run(&mut visitor, &root, &device).unwrap();
    assert_eq!(device.live_buffers(), 4);

    visitor.release_drawable(id, &device);
    assert_eq!(device.live_buffers(), 2);
    visitor.release_resources(&device);
    assert_eq!(device.live_buffers(), 0);
    assert!(visitor.geometry_buffers().is_empty());
}
