//! # Camera boundary
//!
//! Supplies the view and projection matrices, the viewport and the
//! combined view-projection the cull visitor builds its frustum from.
//!
//! Matrices are produced by the caller or by the look-at constructors and
//! stored as-is; nothing is recomputed per query apart from the product.

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::scene::{DepthRange, Polytope};

/// Render target size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Viewport {
    /// Viewport of the given size
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height, 1 for a degenerate viewport
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// View, projection and viewport for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    view: Mat4,
    projection: Mat4,
    viewport: Viewport,
    depth_range: DepthRange,
}

impl Camera {
    /// Camera from explicit matrices
    ///
    /// `depth_range` must match the convention the projection was built
    /// for, otherwise the near and far planes are misplaced.
    pub const fn from_matrices(view: Mat4, projection: Mat4, viewport: Viewport, depth_range: DepthRange) -> Self {
        Self {
            view,
            projection,
            viewport,
            depth_range,
        }
    }

    /// Perspective camera at `eye` looking at `target`
    ///
    /// # Arguments
    /// * `fov_y` - Vertical field of view in radians
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    pub fn perspective_look_at(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y: f32,
        viewport: Viewport,
        near: f32,
        far: f32,
    ) -> Self {
        Self::from_matrices(
            Mat4::look_at(eye, target, up),
            Mat4::perspective(fov_y, viewport.aspect_ratio(), near, far),
            viewport,
            DepthRange::NegativeOneToOne,
        )
    }

    /// Orthographic camera at `eye` looking at `target`, `half_height` units
    /// above and below the view axis
    pub fn orthographic_look_at(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        half_height: f32,
        viewport: Viewport,
        near: f32,
        far: f32,
    ) -> Self {
        let half_width = half_height * viewport.aspect_ratio();
        Self::from_matrices(
            Mat4::look_at(eye, target, up),
            Mat4::orthographic(-half_width, half_width, -half_height, half_height, near, far),
            viewport,
            DepthRange::NegativeOneToOne,
        )
    }

    /// World to eye space
    pub const fn view_matrix(&self) -> &Mat4 {
        &self.view
    }

    /// Eye to clip space
    pub const fn projection_matrix(&self) -> &Mat4 {
        &self.projection
    }

    /// `projection * view`
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Render target size
    pub const fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Clip-space depth convention of the projection
    pub const fn depth_range(&self) -> DepthRange {
        self.depth_range
    }

    /// Replace the view matrix
    pub fn set_view_matrix(&mut self, view: Mat4) {
        self.view = view;
    }

    /// Replace the viewport, keeping the projection
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// World-space frustum
    pub fn frustum(&self) -> Polytope {
        Polytope::from_view_projection(&self.view_projection_matrix(), self.depth_range)
    }
}

impl Default for Camera {
    /// Identity view and projection: the visible region is the -1..1 cube
    fn default() -> Self {
        Self::from_matrices(
            Mat4::identity(),
            Mat4::identity(),
            Viewport::new(1, 1),
            DepthRange::NegativeOneToOne,
        )
    }
}
