//! Per-frame uniform binder: view-space geometry, transfer-function
//! shift/scale factors and light parameters, laid out for the generated
//! program.

use bytemuck::Zeroable;
use glam::{Mat3, Mat4, Vec3, Vec4};
use volcast_core::constants::MAX_LIGHTS;
use volcast_core::transfer::lookup_range;
use volcast_core::{
    Camera, Light, LightType, TransferFunction, VolcastError, VolumeActor,
};

use crate::resource_cache::ScalarTextureInfo;

/// GPU-uploadable light. Must match LightUniforms in the generated WGSL.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniforms {
    /// Color times intensity.
    pub color: [f32; 4],
    pub direction_vc: [f32; 4],
    pub half_angle_vc: [f32; 4],
    /// w = 1 for positional lights.
    pub position_vc: [f32; 4],
    /// Constant, linear, quadratic; w = cosine of the cone angle, or -2 with no cone.
    pub attenuation: [f32; 4],
    /// x = spot exponent.
    pub exponent: [f32; 4],
}

/// GPU-uploadable frame state. Must match FrameUniforms in the generated WGSL.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub dc_to_vc: [[f32; 4]; 4],
    /// Full target width, height and their reciprocals.
    pub viewport: [f32; 4],
    /// Near, far, thickness, 1 if parallel.
    pub camera: [f32; 4],
    /// Sample distance, combined table width in texels, depth scale, light count.
    pub sampling: [f32; 4],
    pub lights: [LightUniforms; MAX_LIGHTS],
}

/// GPU-uploadable per-volume state. Must match VolumeUniforms in the generated WGSL.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VolumeUniforms {
    /// Voxel dimensions; w = component count.
    pub dimensions: [i32; 4],
    /// View-space position of voxel (0, 0, 0).
    pub origin_vc: [f32; 4],
    /// View-space length of one index step along each axis.
    pub spacing: [f32; 4],
    pub vc_to_ijk: [f32; 4],
    /// Half a texel in texture coordinates.
    pub texel_offset: [f32; 4],
    /// Box faces +x, -x, +y, -y, +z, -z as (normal, distance).
    pub plane_normals: [[f32; 4]; 6],
    pub opacity_shift: [f32; 4],
    pub opacity_scale: [f32; 4],
    pub color_shift: [f32; 4],
    pub color_scale: [f32; 4],
    pub gradient_scale: [f32; 4],
    pub gradient_shift: [f32; 4],
    pub gradient_min: [f32; 4],
    pub gradient_max: [f32; 4],
    pub component_mix: [f32; 4],
    /// Ambient, diffuse, specular, specular power.
    pub shading: [f32; 4],
    /// x = texture row center of this volume.
    pub table: [f32; 4],
}

/// Camera matrices and clip values of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewParams {
    pub view: Mat4,
    pub projection: Mat4,
    pub normal_matrix: Mat3,
    pub viewport: [u32; 2],
    pub near: f32,
    pub far: f32,
    pub parallel: bool,
    pub direction_of_projection: Vec3,
}

impl ViewParams {
    pub fn new(camera: &Camera, viewport: [u32; 2]) -> Self {
        let aspect = if viewport[1] > 0 {
            viewport[0] as f32 / viewport[1] as f32
        } else {
            1.0
        };
        Self {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(aspect),
            normal_matrix: camera.normal_matrix(),
            viewport,
            near: camera.clipping_range[0],
            far: camera.clipping_range[1],
            parallel: camera.parallel_projection,
            direction_of_projection: camera.direction_of_projection(),
        }
    }

    pub fn thickness(&self) -> f32 {
        self.far - self.near
    }
}

fn vec4(v: Vec3, w: f32) -> [f32; 4] {
    [v.x, v.y, v.z, w]
}

/// Express one light in view coordinates.
pub fn light_uniforms(light: &Light, view: &ViewParams) -> LightUniforms {
    let (direction, position) = match light.light_type {
        LightType::HeadLight => (Vec3::NEG_Z, Vec3::ZERO),
        LightType::CameraLight => (light.direction(), light.position),
        LightType::SceneLight => (
            (view.normal_matrix * light.direction()).normalize_or_zero(),
            view.view.transform_point3(light.position),
        ),
    };
    let half_angle = (-direction + Vec3::Z).normalize_or_zero();
    let cone = if light.cone_angle < 90.0 {
        light.cone_angle.to_radians().cos()
    } else {
        -2.0
    };

    LightUniforms {
        color: vec4(light.scaled_color(), 1.0),
        direction_vc: vec4(direction, 0.0),
        half_angle_vc: vec4(half_angle, 0.0),
        position_vc: vec4(position, if light.positional { 1.0 } else { 0.0 }),
        attenuation: vec4(light.attenuation, cone),
        exponent: [light.exponent, 0.0, 0.0, 0.0],
    }
}

/// Frame block for the given view and light list.
pub fn frame_uniforms(
    view: &ViewParams,
    lights: &[&Light],
    sample_distance: f32,
    table_texels: usize,
    depth_scale: f32,
) -> FrameUniforms {
    let [width, height] = view.viewport;
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);

    let mut light_block = [LightUniforms::zeroed(); MAX_LIGHTS];
    for (slot, light) in light_block.iter_mut().zip(lights) {
        *slot = light_uniforms(light, view);
    }

    FrameUniforms {
        dc_to_vc: view.projection.inverse().to_cols_array_2d(),
        viewport: [w, h, 1.0 / w, 1.0 / h],
        camera: [
            view.near,
            view.far,
            view.thickness(),
            if view.parallel { 1.0 } else { 0.0 },
        ],
        sampling: [
            sample_distance,
            table_texels as f32,
            depth_scale,
            lights.len().min(MAX_LIGHTS) as f32,
        ],
        lights: light_block,
    }
}

/// Compile-time loop bound: the volume diagonal in physical units divided
/// by the sample distance.
pub fn max_samples(volume: &dyn VolumeActor, sample_distance: f32) -> u32 {
    let Some(image) = volume.input_data() else {
        return 1;
    };
    let m = volume.matrix() * image.index_to_world();
    let [dx, dy, dz] = image.dimensions();
    let size = Vec3::new(
        m.x_axis.truncate().length() * dx.saturating_sub(1) as f32,
        m.y_axis.truncate().length() * dy.saturating_sub(1) as f32,
        m.z_axis.truncate().length() * dz.saturating_sub(1) as f32,
    );
    ((size.length() / sample_distance).ceil() as u32).max(1)
}

/// Shift and scale so `texel * scale + shift` lands in `[0, 1]` over `range`.
fn shift_scale(texel_scale: f32, texel_offset: f32, range: [f64; 2]) -> (f32, f32) {
    let [r0, r1] = lookup_range(range);
    let width = r1 - r0;
    (
        ((texel_offset as f64 - r0) / width) as f32,
        (texel_scale as f64 / width) as f32,
    )
}

/// Per-volume block. `row` is the volume's position in the active list.
pub fn volume_uniforms(
    volume: &dyn VolumeActor,
    info: &ScalarTextureInfo,
    view: &ViewParams,
    row: usize,
    rows: usize,
) -> Result<VolumeUniforms, VolcastError> {
    let image = volume.input_data().ok_or(VolcastError::MissingInput(row))?;
    let property = volume.property();
    let [dx, dy, dz] = image.dimensions();
    let dims = Vec3::new(dx as f32, dy as f32, dz as f32);

    let model = volume.matrix();
    let idx_to_view = view.view * model * image.index_to_world();
    let model_normal = if volume.is_identity() {
        Mat3::IDENTITY
    } else {
        Mat3::from_mat4(model).inverse().transpose()
    };
    let idx_normal = view.normal_matrix * model_normal * image.direction();

    let spacing = Vec3::new(
        idx_to_view.x_axis.truncate().length(),
        idx_to_view.y_axis.truncate().length(),
        idx_to_view.z_axis.truncate().length(),
    );
    let origin = idx_to_view.transform_point3(Vec3::ZERO);
    let far_corner = idx_to_view.transform_point3(dims - Vec3::ONE);

    let mut plane_normals = [[0.0f32; 4]; 6];
    for (axis, unit) in [Vec3::X, Vec3::Y, Vec3::Z].into_iter().enumerate() {
        let normal = (idx_normal * unit).normalize_or_zero();
        plane_normals[2 * axis] = vec4(normal, -far_corner.dot(normal));
        plane_normals[2 * axis + 1] = vec4(-normal, origin.dot(normal));
    }

    let components = info.components;
    let independent = property.independent_components();
    let mut uniforms = VolumeUniforms {
        dimensions: [dx as i32, dy as i32, dz as i32, components as i32],
        origin_vc: vec4(origin, 1.0),
        spacing: vec4(spacing, 0.0),
        vc_to_ijk: vec4(Vec3::ONE / (spacing * dims), 0.0),
        texel_offset: vec4(Vec3::splat(0.5) / dims, 0.0),
        plane_normals,
        component_mix: [1.0, 0.0, 0.0, 0.0],
        shading: [
            property.ambient() as f32,
            property.diffuse() as f32,
            property.specular() as f32,
            property.specular_power() as f32,
        ],
        table: [(row as f32 + 0.5) / rows.max(1) as f32, 0.0, 0.0, 0.0],
        ..VolumeUniforms::zeroed()
    };

    for c in 0..components.min(4) {
        let target = if independent { c } else { 0 };
        let (scale, offset) = (info.scale[c], info.offset[c]);

        let (shift, s) = shift_scale(scale, offset, property.scalar_opacity(target).range());
        uniforms.opacity_shift[c] = shift;
        uniforms.opacity_scale[c] = s;

        let (shift, s) = shift_scale(scale, offset, property.rgb_transfer_function(target).range());
        uniforms.color_shift[c] = shift;
        uniforms.color_scale[c] = s;

        let go = property.gradient_opacity(target);
        if go.enabled {
            let range = go.max_value - go.min_value;
            let range = if range > 0.0 { range } else { 1.0 };
            let span = go.max_opacity - go.min_opacity;
            uniforms.gradient_scale[c] = (scale as f64 * span / range) as f32;
            uniforms.gradient_shift[c] = (-go.min_value * span / range + go.min_opacity) as f32;
            uniforms.gradient_min[c] = go.min_opacity as f32;
            uniforms.gradient_max[c] = go.max_opacity as f32;
        } else {
            uniforms.gradient_scale[c] = 0.0;
            uniforms.gradient_shift[c] = 1.0;
            uniforms.gradient_min[c] = 1.0;
            uniforms.gradient_max[c] = 1.0;
        }
    }

    if independent && components >= 2 {
        let total: f64 = (0..components).map(|c| property.component_weight(c)).sum();
        for c in 0..components.min(4) {
            uniforms.component_mix[c] = if total > 0.0 {
                (property.component_weight(c) / total) as f32
            } else {
                1.0 / components as f32
            };
        }
    }

    Ok(uniforms)
}

impl VolumeUniforms {
    pub fn plane(&self, index: usize) -> (Vec3, f32) {
        let p = Vec4::from_array(self.plane_normals[index]);
        (p.truncate(), p.w)
    }

    pub fn dims(&self) -> Vec3 {
        Vec3::new(
            self.dimensions[0] as f32,
            self.dimensions[1] as f32,
            self.dimensions[2] as f32,
        )
    }
}
