//! Camera-facing matrix calculations for billboards and screen-sized content

use crate::foundation::math::{Mat3, Mat4, Mat4Ext, Vec3, Vec4};
use crate::render::Viewport;

/// Replace the rotation of a model-view with its per-axis scale
///
/// The geometry keeps its eye-space position and size but its local axes
/// line up with the view axes, so it always faces the view plane.
pub fn screen_aligned(model_view: &Mat4) -> Mat4 {
    let scale = Vec3::new(
        model_view.fixed_view::<3, 1>(0, 0).magnitude(),
        model_view.fixed_view::<3, 1>(0, 1).magnitude(),
        model_view.fixed_view::<3, 1>(0, 2).magnitude(),
    );
    let mut result = Mat4::new_nonuniform_scaling(&scale);
    result.fixed_view_mut::<3, 1>(0, 3).copy_from(&model_view.translation_part());
    result
}

/// Rotate about a local axis so local +Z points at the eye
///
/// `eye_local` is the eye position expressed in the billboard's local
/// frame. When the eye lies on the axis there is no unique facing and the
/// model-view is returned unchanged.
pub fn axis_aligned(model_view: &Mat4, axis: &Vec3, eye_local: &Vec3) -> Mat4 {
    let up = axis.normalize();
    // Project the direction to the eye onto the plane perpendicular to the axis
    let to_eye = eye_local - up * up.dot(eye_local);
    if to_eye.magnitude_squared() <= f32::EPSILON || !up.iter().all(|v| v.is_finite()) {
        return *model_view;
    }
    let forward = to_eye.normalize();
    let right = up.cross(&forward).normalize();

    let rotation = Mat3::from_columns(&[right, up, forward]).to_homogeneous();
    model_view * rotation
}

/// World units that span `pixels` screen pixels at the instance's depth
///
/// Works for perspective and orthographic projections. Degenerate inputs
/// (zero-height viewport, flat projection) yield a scale of 1.
pub fn pixel_scale(model_view: &Mat4, projection: &Mat4, viewport: Viewport, pixels: f32) -> f32 {
    let eye_position = model_view.translation_part();
    let clip = projection * Vec4::new(eye_position.x, eye_position.y, eye_position.z, 1.0);
    let vertical = projection[(1, 1)];
    let height = viewport.height as f32;
    if height <= 0.0 || vertical.abs() <= f32::EPSILON {
        return 1.0;
    }
    // One pixel spans 2 / height in NDC; undo the projection's y scale and the divide
    let units_per_pixel = 2.0 * clip.w.abs() / (vertical.abs() * height);
    units_per_pixel * pixels
}
