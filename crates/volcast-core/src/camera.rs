use glam::{Mat3, Mat4, Vec3};

/// Look-at camera. View space is right handed, looking down -Z; projection
/// maps depth to `[0, 1]` as wgpu expects.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub focal_point: Vec3,
    pub view_up: Vec3,
    /// Vertical field of view in degrees (perspective only).
    pub view_angle: f32,
    pub parallel_projection: bool,
    /// Half height of the view in world units (parallel only).
    pub parallel_scale: f32,
    /// Near and far distances from the camera along the view direction.
    pub clipping_range: [f32; 2],
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 1.0),
            focal_point: Vec3::ZERO,
            view_up: Vec3::Y,
            view_angle: 30.0,
            parallel_projection: false,
            parallel_scale: 1.0,
            clipping_range: [0.01, 1000.01],
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// World to view transform.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.focal_point, self.view_up)
    }

    /// View to clip transform for a viewport of the given aspect ratio.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let [near, far] = self.clipping_range;
        if self.parallel_projection {
            let h = self.parallel_scale;
            let w = h * aspect;
            Mat4::orthographic_rh(-w, w, -h, h, near, far)
        } else {
            Mat4::perspective_rh(self.view_angle.to_radians(), aspect, near, far)
        }
    }

    /// Rotation applied to normals going from world to view space.
    pub fn normal_matrix(&self) -> Mat3 {
        Mat3::from_mat4(self.view_matrix()).inverse().transpose()
    }

    pub fn direction_of_projection(&self) -> Vec3 {
        (self.focal_point - self.position).normalize_or_zero()
    }

    /// Far minus near clip distance.
    pub fn thickness(&self) -> f32 {
        self.clipping_range[1] - self.clipping_range[0]
    }

    /// Fit the clipping range around an axis-aligned world box.
    pub fn reset_clipping_range(&mut self, min: Vec3, max: Vec3) {
        let dop = self.direction_of_projection();
        let mut near = f32::INFINITY;
        let mut far = f32::NEG_INFINITY;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            );
            let d = (corner - self.position).dot(dop);
            near = near.min(d);
            far = far.max(d);
        }
        far = (far * 1.01).max(1e-3);
        near = (near * 0.99).max(far * 1e-3);
        self.clipping_range = [near, far];
    }
}
