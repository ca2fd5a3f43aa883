//! View frustum as a six-plane polytope
//!
//! The frustum is extracted once per frame from the camera's combined
//! view-projection matrix. During traversal it is re-expressed in each
//! node's local frame by transforming the planes with the accumulated model
//! matrix, so bounding boxes are tested in the space they were computed in.

use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::scene::BoundingBox;

/// Clip-space depth convention of a projection matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthRange {
    /// OpenGL style: `-w <= z <= w`
    #[default]
    NegativeOneToOne,
    /// Vulkan / D3D style: `0 <= z <= w`
    ZeroToOne,
}

/// Result of testing a bounding box against a polytope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// Entirely outside at least one plane
    Outside,
    /// Straddles or touches one or more planes
    Intersecting,
    /// Entirely inside every plane
    Inside,
}

/// Plane defined by normal and distance from origin
///
/// Points with a non-negative signed distance are on the inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (normalized for extracted planes, not after transforms)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub const fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    fn from_coefficients(coefficients: Vec4) -> Self {
        Self {
            normal: coefficients.xyz(),
            distance: coefficients.w,
        }
    }

    fn coefficients(&self) -> Vec4 {
        Vec4::new(self.normal.x, self.normal.y, self.normal.z, self.distance)
    }

    /// Scale the plane so its normal has unit length
    #[must_use]
    pub fn normalized(&self) -> Self {
        let length = self.normal.magnitude();
        if length > f32::EPSILON {
            Self::new(self.normal / length, self.distance / length)
        } else {
            *self
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    /// Re-express a plane from a parent frame in the child frame of `model`
    ///
    /// `model` maps child coordinates to parent coordinates; the plane
    /// coefficients transform by its transpose, so no inverse is needed.
    #[must_use]
    pub fn transformed_by(&self, model: &Mat4) -> Self {
        Self::from_coefficients(model.transpose() * self.coefficients())
    }

    /// Corner of `bound` furthest along the normal
    fn positive_vertex(&self, bound: &BoundingBox) -> Vec3 {
        Vec3::new(
            if self.normal.x >= 0.0 { bound.max.x } else { bound.min.x },
            if self.normal.y >= 0.0 { bound.max.y } else { bound.min.y },
            if self.normal.z >= 0.0 { bound.max.z } else { bound.min.z },
        )
    }

    /// Corner of `bound` furthest against the normal
    fn negative_vertex(&self, bound: &BoundingBox) -> Vec3 {
        Vec3::new(
            if self.normal.x >= 0.0 { bound.min.x } else { bound.max.x },
            if self.normal.y >= 0.0 { bound.min.y } else { bound.max.y },
            if self.normal.z >= 0.0 { bound.min.z } else { bound.max.z },
        )
    }
}

/// Frustum for visibility culling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Polytope {
    /// Six planes defining the frustum (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl Polytope {
    /// Create a frustum from six planes
    pub const fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb-Hartmann extraction: each plane is a sum or difference of the
    /// fourth row with one of the first three rows.
    pub fn from_view_projection(view_projection: &Mat4, depth_range: DepthRange) -> Self {
        let row = |i: usize| -> Vec4 { view_projection.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let near = match depth_range {
            DepthRange::NegativeOneToOne => r3 + r2,
            DepthRange::ZeroToOne => r2,
        };

        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, near, r3 - r2]
            .map(|coefficients| Plane::from_coefficients(coefficients).normalized());
        Self { planes }
    }

    /// Express this frustum in the local frame of a node with accumulated `model`
    #[must_use]
    pub fn transformed(&self, model: &Mat4) -> Self {
        Self {
            planes: self.planes.map(|plane| plane.transformed_by(model)),
        }
    }

    /// Classify a box against every plane
    ///
    /// A box touching a plane counts as intersecting, never outside, and
    /// empty boxes are outside.
    pub fn classify(&self, bound: &BoundingBox) -> Containment {
        if !bound.is_valid() {
            return Containment::Outside;
        }

        let mut inside = true;
        for plane in &self.planes {
            if plane.distance_to_point(&plane.positive_vertex(bound)) < 0.0 {
                return Containment::Outside;
            }
            if plane.distance_to_point(&plane.negative_vertex(bound)) < 0.0 {
                inside = false;
            }
        }

        if inside {
            Containment::Inside
        } else {
            Containment::Intersecting
        }
    }

    /// Check if a box is inside or intersects the frustum
    pub fn contains(&self, bound: &BoundingBox) -> bool {
        self.classify(bound) != Containment::Outside
    }

    /// Check a box given in the local frame of `model` against this frustum
    pub fn intersects_transformed(&self, bound: &BoundingBox, model: &Mat4) -> bool {
        self.transformed(model).contains(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;
    use approx::assert_relative_eq;

    fn unit_box_at(x: f32, y: f32, z: f32) -> BoundingBox {
        BoundingBox::from_center_extents(Vec3::new(x, y, z), Vec3::new(0.5, 0.5, 0.5))
    }

    /// Orthographic frustum covering [-8, 8] on x/y and depth 1..100 along -z
    fn ortho_frustum() -> Polytope {
        let projection = Mat4::orthographic(-8.0, 8.0, -8.0, 8.0, 1.0, 100.0);
        Polytope::from_view_projection(&projection, DepthRange::NegativeOneToOne)
    }

    #[test]
    fn test_extracted_planes_are_normalized() {
        let projection = Mat4::perspective(1.0, 1.5, 0.1, 50.0);
        let view = Mat4::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros(), Vec3::y());
        let frustum = Polytope::from_view_projection(&(projection * view), DepthRange::default());
        for plane in &frustum.planes {
            assert_relative_eq!(plane.normal.magnitude(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_inside_box_is_never_culled() {
        let frustum = ortho_frustum();
        assert_eq!(frustum.classify(&unit_box_at(0.0, 0.0, -10.0)), Containment::Inside);
    }

    #[test]
    fn test_outside_one_plane_is_always_culled() {
        let frustum = ortho_frustum();
        assert_eq!(frustum.classify(&unit_box_at(20.0, 0.0, -10.0)), Containment::Outside);
        assert_eq!(frustum.classify(&unit_box_at(0.0, 0.0, 10.0)), Containment::Outside);
        assert_eq!(frustum.classify(&unit_box_at(0.0, 0.0, -200.0)), Containment::Outside);
    }

    #[test]
    fn test_straddling_box_is_never_culled() {
        let frustum = ortho_frustum();
        assert_eq!(frustum.classify(&unit_box_at(8.0, 0.0, -10.0)), Containment::Intersecting);
        assert_eq!(frustum.classify(&unit_box_at(0.0, -8.0, -10.0)), Containment::Intersecting);
    }

    #[test]
    fn test_touching_box_counts_as_visible() {
        let frustum = ortho_frustum();
        let touching = BoundingBox::new(Vec3::new(8.0, 0.0, -11.0), Vec3::new(9.0, 1.0, -10.0));
        assert!(frustum.contains(&touching));
    }

    #[test]
    fn test_zero_to_one_near_plane() {
        // Maps view depth -near..-far to clip depth 0..1 with w = 1
        let (near, far) = (1.0_f32, 11.0_f32);
        let mut projection = Mat4::identity();
        projection[(2, 2)] = -1.0 / (far - near);
        projection[(2, 3)] = -near / (far - near);
        let frustum = Polytope::from_view_projection(&projection, DepthRange::ZeroToOne);

        let in_range = unit_box_at(0.0, 0.0, -5.0);
        let too_close = BoundingBox::new(Vec3::new(-0.1, -0.1, -0.5), Vec3::new(0.1, 0.1, -0.2));
        assert!(frustum.contains(&in_range));
        assert!(!frustum.contains(&too_close));
    }

    #[test]
    fn test_transformed_frustum_matches_world_test() {
        let frustum = ortho_frustum();
        let local = unit_box_at(0.0, 0.0, 0.0);

        let visible_model = Mat4::translation(5.0, 0.0, -10.0);
        let hidden_model = Mat4::translation(50.0, 0.0, -10.0);

        assert!(frustum.intersects_transformed(&local, &visible_model));
        assert!(!frustum.intersects_transformed(&local, &hidden_model));
        assert_eq!(
            frustum.contains(&local.transformed(&visible_model)),
            frustum.intersects_transformed(&local, &visible_model)
        );
    }

    #[test]
    fn test_empty_box_is_outside() {
        assert_eq!(ortho_frustum().classify(&BoundingBox::empty()), Containment::Outside);
    }
}
