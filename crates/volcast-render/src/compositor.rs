//! CPU reference of the generated fragment program.
//!
//! Runs over the same [`FrameUniforms`] / [`VolumeUniforms`] the GPU sees, so
//! tests can check the marching and compositing arithmetic without an
//! adapter. Colors come from a [`VolumeSampler`]; lighting and gradient
//! opacity are the sampler's business.

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};
use volcast_core::constants::SATURATION_ALPHA;
use volcast_core::ImageData;

use crate::resource_cache::ScalarTextureInfo;
use crate::tables::{ColorTable, OpacityTable};
use crate::uniforms::{FrameUniforms, VolumeUniforms};

/// Straight-alpha color of one volume at a normalized index-space position.
/// Alpha is the per-step opacity, as stored in the opacity table.
pub trait VolumeSampler {
    fn sample(&self, volume: usize, uniforms: &VolumeUniforms, pos_is: Vec3) -> Vec4;
}

/// One volume as the tracer sees it.
#[derive(Debug, Clone, Copy)]
pub struct TracedVolume {
    pub uniforms: VolumeUniforms,
    /// Loop bound, the same value baked into the program.
    pub max_samples: u32,
}

/// Entry, exit and step length of a ray through one volume in index space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexSpaceRay {
    pub start_is: Vec3,
    pub end_is: Vec3,
    pub sample_distance_is: f32,
}

fn xyz(v: [f32; 4]) -> Vec3 {
    Vec3::new(v[0], v[1], v[2])
}

/// `sign` with a zero result for zero, as the shading language defines it.
fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn attenuate(alpha: f32, steps: f32) -> f32 {
    1.0 - (1.0 - alpha).max(0.0).powf(steps)
}

/// Front-to-back "under" step on a premultiplied accumulator.
pub fn composite_sample(color: Vec4, sample: Vec4) -> Vec4 {
    let remaining = 1.0 - color.w;
    color + Vec4::from((sample.xyz() * sample.w, sample.w)) * remaining
}

/// View-space point on the near plane under normalized device coordinates.
pub fn vertex_vc_at(frame: &FrameUniforms, ndc: Vec2) -> Vec3 {
    let dc_to_vc = glam::Mat4::from_cols_array_2d(&frame.dc_to_vc);
    let p = dc_to_vc * Vec4::new(ndc.x, ndc.y, 0.0, 1.0);
    p.xyz() / p.w
}

pub fn ray_direction(frame: &FrameUniforms, vertex_vc: Vec3) -> Vec3 {
    if frame.camera[3] > 0.5 {
        Vec3::NEG_Z
    } else {
        vertex_vc.normalize_or_zero()
    }
}

#[allow(clippy::too_many_arguments)]
fn ray_plane_bounds(
    ray_pos: Vec3,
    ray_dir: Vec3,
    plane: (Vec3, f32),
    bounds: Vec2,
    plane_x: Vec3,
    plane_y: Vec3,
    size_x: f32,
    size_y: f32,
    origin: Vec3,
) -> Vec2 {
    let (normal, distance) = plane;
    let denom = ray_dir.dot(normal);
    if denom == 0.0 {
        return bounds;
    }
    let t = -(ray_pos.dot(normal) + distance) / denom;
    let offset = ray_pos + ray_dir * t - origin;
    let p = Vec2::new(offset.dot(plane_x), offset.dot(plane_y));
    let x_check = (p.x * (p.x - size_x)).max(0.0);
    let check = sign(x_check.max(p.y * (p.y - size_y)));
    let widened = Vec2::new(bounds.x.min(t), bounds.y.max(t));
    widened.lerp(bounds, check)
}

/// Entry and exit distance along `ray_dir`; exit <= entry means a miss.
pub fn ray_distances(
    frame: &FrameUniforms,
    volume: &VolumeUniforms,
    ray_dir: Vec3,
    vertex_vc: Vec3,
) -> Vec2 {
    let size = xyz(volume.spacing) * (volume.dims() - Vec3::ONE);
    let origin = xyz(volume.origin_vc);
    let n0 = volume.plane(0).0;
    let n2 = volume.plane(2).0;
    let n4 = volume.plane(4).0;

    let mut dists = Vec2::new(100.0 * frame.camera[1], -1.0);
    for (index, (px, py, sx, sy)) in [
        (n2, n4, size.y, size.z),
        (n2, n4, size.y, size.z),
        (n0, n4, size.x, size.z),
        (n0, n4, size.x, size.z),
        (n0, n2, size.x, size.y),
        (n0, n2, size.x, size.y),
    ]
    .into_iter()
    .enumerate()
    {
        dists = ray_plane_bounds(vertex_vc, ray_dir, volume.plane(index), dists, px, py, sx, sy, origin);
    }

    dists.x = dists.x.max(0.0);
    dists.y = dists.y.min(-frame.camera[2] / ray_dir.z);
    dists
}

pub fn index_space_ray(
    frame: &FrameUniforms,
    volume: &VolumeUniforms,
    ray_dir: Vec3,
    vertex_vc: Vec3,
    dists: Vec2,
) -> IndexSpaceRay {
    let origin = xyz(volume.origin_vc);
    let basis = [volume.plane(0).0, volume.plane(2).0, volume.plane(4).0];
    let project = |p: Vec3| {
        let rel = p - origin;
        Vec3::new(rel.dot(basis[0]), rel.dot(basis[1]), rel.dot(basis[2]))
    };
    let start = project(vertex_vc + dists.x * ray_dir);
    let end = project(vertex_vc + dists.y * ray_dir);
    let delta = (end - start).length();

    let to_ijk = xyz(volume.vc_to_ijk);
    let start_is = start * to_ijk;
    let end_is = end * to_ijk;
    let delta_is = (end_is - start_is).length();

    IndexSpaceRay {
        start_is,
        end_is,
        sample_distance_is: frame.sampling[0] * delta_is / delta,
    }
}

/// March one volume into `color_in`: thin-volume shortcut, jittered boundary
/// sample, fixed steps, then the exit sample weighted by the leftover steps.
///
/// A ray longer than `max_samples` steps is walked with proportionally
/// wider steps, each sample's opacity attenuated over the widened step, so
/// the capped loop still reaches the exit.
pub fn apply_blend(
    index: usize,
    volume: &TracedVolume,
    sampler: &dyn VolumeSampler,
    ray: &IndexSpaceRay,
    jitter: f32,
    color_in: Vec4,
) -> Vec4 {
    let uniforms = &volume.uniforms;
    let delta = ray.end_is - ray.start_is;
    let full_steps = delta.length() / ray.sample_distance_is;

    let mut color = color_in;
    let mut pos = ray.start_is;
    let mut sample = sampler.sample(index, uniforms, pos);
    if full_steps <= 1.0 {
        sample.w = attenuate(sample.w, full_steps);
        return composite_sample(color, sample);
    }

    let cap = volume.max_samples.max(1) as f32;
    let stretch = if full_steps > cap { full_steps / cap } else { 1.0 };
    let step = delta.normalize_or_zero() * ray.sample_distance_is * stretch;
    let ray_steps = full_steps / stretch;

    sample.w = attenuate(sample.w, jitter * stretch);
    color = composite_sample(color, sample);
    pos += jitter * step;
    let mut steps = jitter;

    for _ in 0..volume.max_samples {
        if steps + 1.0 >= ray_steps {
            break;
        }
        let mut sample = sampler.sample(index, uniforms, pos);
        sample.w = attenuate(sample.w, stretch);
        color = composite_sample(color, sample);
        steps += 1.0;
        pos += step;
        if color.w > SATURATION_ALPHA {
            color.w = 1.0;
            break;
        }
    }

    if color.w < SATURATION_ALPHA && ray_steps - steps > 0.0 {
        let mut sample = sampler.sample(index, uniforms, ray.end_is);
        sample.w = attenuate(sample.w, (ray_steps - steps) * stretch);
        color = composite_sample(color, sample);
    }
    color
}

/// Shade one fragment. `None` is a discarded fragment; otherwise the
/// straight-alpha result.
pub fn trace(
    frame: &FrameUniforms,
    volumes: &[TracedVolume],
    sampler: &dyn VolumeSampler,
    vertex_vc: Vec3,
    jitter: f32,
) -> Option<Vec4> {
    let ray_dir = ray_direction(frame, vertex_vc);
    let dists: Vec<Vec2> = volumes
        .iter()
        .map(|v| ray_distances(frame, &v.uniforms, ray_dir, vertex_vc))
        .collect();

    let mut order: Vec<usize> = (0..volumes.len()).filter(|&i| dists[i].y > dists[i].x).collect();
    if order.is_empty() {
        return None;
    }
    // Stable, so equal entries keep list order like the generated selection loop.
    order.sort_by(|&a, &b| dists[a].x.total_cmp(&dists[b].x));

    let jitter = 0.01 + 0.99 * jitter;
    let mut color = Vec4::ZERO;
    for index in order {
        let volume = &volumes[index];
        let ray = index_space_ray(frame, &volume.uniforms, ray_dir, vertex_vc, dists[index]);
        color = apply_blend(index, volume, sampler, &ray, jitter, color);
        if color.w > SATURATION_ALPHA {
            break;
        }
    }

    if color.w <= 0.0 {
        return Some(Vec4::ZERO);
    }
    Some(Vec4::from((color.xyz() / color.w, color.w)))
}

/// Nearest-neighbour sampler over single-component volumes and the combined
/// lookup tables. Unshaded, without gradient opacity.
pub struct TableSampler<'a> {
    volumes: Vec<(&'a ImageData, ScalarTextureInfo)>,
    opacity: &'a OpacityTable,
    color: &'a ColorTable,
    table_width: usize,
}

impl<'a> TableSampler<'a> {
    pub fn new(opacity: &'a OpacityTable, color: &'a ColorTable, table_width: usize) -> Self {
        Self {
            volumes: Vec::new(),
            opacity,
            color,
            table_width,
        }
    }

    /// Append the next volume of the active list.
    pub fn with_volume(mut self, image: &'a ImageData, info: ScalarTextureInfo) -> Self {
        self.volumes.push((image, info));
        self
    }

    fn texel_value(&self, volume: usize, uniforms: &VolumeUniforms, pos_is: Vec3) -> f32 {
        let Some((image, info)) = self.volumes.get(volume) else {
            return 0.0;
        };
        let dims = uniforms.dims();
        let index = |axis: usize| {
            let max = dims[axis] - 1.0;
            (pos_is[axis] * dims[axis] + uniforms.texel_offset[axis] * dims[axis] - 0.5)
                .round()
                .clamp(0.0, max) as usize
        };
        let [dx, dy, _] = image.dimensions();
        let (dx, dy) = (dx as usize, dy as usize);
        let voxel = index(0) + dx * (index(1) + dy * index(2));
        let raw = image.scalars().get(voxel * image.components());
        ((raw - info.offset[0] as f64) / info.scale[0] as f64) as f32
    }

    fn column(&self, x: f32) -> usize {
        (x.clamp(0.0, 1.0) * (self.table_width - 1) as f32).round() as usize
    }
}

impl VolumeSampler for TableSampler<'_> {
    fn sample(&self, volume: usize, uniforms: &VolumeUniforms, pos_is: Vec3) -> Vec4 {
        let value = self.texel_value(volume, uniforms, pos_is);
        let opacity_x = value * uniforms.opacity_scale[0] + uniforms.opacity_shift[0];
        let color_x = value * uniforms.color_scale[0] + uniforms.color_shift[0];
        let alpha = self.opacity.value(volume, self.column(opacity_x));
        let [r, g, b] = self.color.rgb(volume, self.column(color_x));
        Vec4::new(r, g, b, alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_cache::encode_scalars;
    use crate::tables::{build_color_table, build_opacity_table};
    use crate::test_harness::{constant_property, uniform_cube_volume, HalfSlabSampler};
    use crate::uniforms::{frame_uniforms, max_samples, volume_uniforms, ViewParams};
    use bytemuck::Zeroable;
    use volcast_core::{Camera, Renderable, Volume, VolumeActor};

    const TABLE_WIDTH: usize = 256;

    fn ortho_camera(x: f32, y: f32) -> Camera {
        Camera {
            position: Vec3::new(x, y, 50.0),
            focal_point: Vec3::new(x, y, 0.0),
            parallel_projection: true,
            parallel_scale: 10.0,
            clipping_range: [1.0, 100.0],
            ..Default::default()
        }
    }

    struct Prepared {
        frame: FrameUniforms,
        traced: Vec<TracedVolume>,
        opacity: OpacityTable,
        color: ColorTable,
        infos: Vec<ScalarTextureInfo>,
    }

    fn prepare(volumes: &[Volume], camera: &Camera) -> Prepared {
        let actors: Vec<&dyn VolumeActor> = volumes.iter().map(|v| v as &dyn VolumeActor).collect();
        let view = ViewParams::new(camera, [64, 64]);
        let opacity = build_opacity_table(&actors, TABLE_WIDTH, 1.0);
        let color = build_color_table(&actors, TABLE_WIDTH);
        let frame = frame_uniforms(&view, &[], 1.0, opacity.width, 1.0);

        let mut traced = Vec::new();
        let mut infos = Vec::new();
        for (row, volume) in volumes.iter().enumerate() {
            let image = volume.input_data().expect("fixture input");
            let (_, info) = encode_scalars(image, &Default::default());
            let uniforms = volume_uniforms(volume, &info, &view, row, volumes.len()).expect("bind");
            traced.push(TracedVolume {
                uniforms,
                max_samples: max_samples(volume, 1.0),
            });
            infos.push(info);
        }
        Prepared {
            frame,
            traced,
            opacity,
            color,
            infos,
        }
    }

    fn shade_center(volumes: &[Volume], camera: &Camera, jitter: f32) -> Option<Vec4> {
        let p = prepare(volumes, camera);
        let mut sampler = TableSampler::new(&p.opacity, &p.color, TABLE_WIDTH);
        for (volume, info) in volumes.iter().zip(&p.infos) {
            sampler = sampler.with_volume(volume.input_data().expect("fixture input"), *info);
        }
        let vertex = vertex_vc_at(&p.frame, Vec2::ZERO);
        trace(&p.frame, &p.traced, &sampler, vertex, jitter)
    }

    #[test]
    fn test_no_volumes_discards() {
        let camera = ortho_camera(0.0, 0.0);
        assert_eq!(shade_center(&[], &camera, 0.5), None);
    }

    #[test]
    fn test_ray_missing_every_box_discards() {
        let mut a = uniform_cube_volume(0, 10, 1, constant_property(0.5, [1.0; 3], 1.0));
        a.set_position(Vec3::new(30.0, 0.0, 0.0));
        let mut b = uniform_cube_volume(1, 10, 1, constant_property(0.5, [1.0; 3], 1.0));
        b.set_position(Vec3::new(-30.0, 0.0, 0.0));
        let camera = ortho_camera(4.5, 4.5);
        assert_eq!(shade_center(&[a, b], &camera, 0.5), None);
    }

    #[test]
    fn test_uniform_slab_matches_closed_form() {
        // opacity 0.3 per 2 units through 9 units of data
        let volume = uniform_cube_volume(0, 10, 1, constant_property(0.3, [1.0, 0.5, 0.25], 2.0));
        let camera = ortho_camera(4.5, 4.5);
        let expected = 1.0 - 0.7f32.powf(4.5);
        for jitter in [0.0, 0.37, 1.0] {
            let color = shade_center(std::slice::from_ref(&volume), &camera, jitter)
                .expect("ray hits the cube");
            assert!(
                (color.w - expected).abs() < 1e-3,
                "jitter {jitter}: alpha {} vs closed form {expected}",
                color.w
            );
            assert!((color.x - 1.0).abs() < 1e-3 && (color.y - 0.5).abs() < 1e-2, "straight color {color}");
        }
    }

    #[test]
    fn test_entry_and_exit_through_slab() {
        let volume = uniform_cube_volume(0, 10, 1, constant_property(0.3, [1.0; 3], 1.0));
        let camera = ortho_camera(4.5, 4.5);
        let p = prepare(std::slice::from_ref(&volume), &camera);
        let vertex = vertex_vc_at(&p.frame, Vec2::ZERO);
        let ray_dir = ray_direction(&p.frame, vertex);
        let dists = ray_distances(&p.frame, &p.traced[0].uniforms, ray_dir, vertex);
        // near plane sits at z = 49 in world space, box spans z 0..9
        assert!((dists.x - 40.0).abs() < 1e-3, "entry {}", dists.x);
        assert!((dists.y - 49.0).abs() < 1e-3, "exit {}", dists.y);

        let ray = index_space_ray(&p.frame, &p.traced[0].uniforms, ray_dir, vertex, dists);
        assert!((ray.start_is.z - 0.9).abs() < 1e-4, "entry at the far face, got {}", ray.start_is);
        assert!(ray.end_is.z.abs() < 1e-4);
        assert!((ray.sample_distance_is - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_overlap_exceeds_single_volume_alpha() {
        let property = constant_property(0.5, [1.0; 3], 10.0);
        let a = uniform_cube_volume(0, 10, 1, property.clone());
        let mut b = uniform_cube_volume(1, 10, 1, property);
        b.set_position(Vec3::new(5.0, 0.0, 0.0));
        let camera = ortho_camera(7.5, 5.0);

        let alone_a = shade_center(std::slice::from_ref(&a), &camera, 0.5).expect("hits a");
        let alone_b = shade_center(std::slice::from_ref(&b), &camera, 0.5).expect("hits b");
        let both = shade_center(&[a, b], &camera, 0.5).expect("hits both");
        assert!(both.w > alone_a.w, "{} vs {}", both.w, alone_a.w);
        assert!(both.w > alone_b.w, "{} vs {}", both.w, alone_b.w);
        assert!(both.w < 1.0);
    }

    #[test]
    fn test_nearer_volume_composites_first() {
        let mut front = uniform_cube_volume(0, 10, 1, constant_property(0.9, [1.0, 0.0, 0.0], 1.0));
        front.set_position(Vec3::new(0.0, 0.0, 20.0));
        let back = uniform_cube_volume(1, 10, 1, constant_property(0.9, [0.0, 0.0, 1.0], 1.0));
        let camera = ortho_camera(4.5, 4.5);

        let color = shade_center(&[back.clone(), front.clone()], &camera, 0.5).expect("hits");
        assert!(color.x > 0.9 && color.z < 0.1, "red front volume dominates, got {color}");

        let swapped = shade_center(&[front, back], &camera, 0.5).expect("hits");
        assert!((swapped - color).length() < 1e-5, "list order does not matter");
    }

    #[test]
    fn test_thin_volume_single_attenuated_sample() {
        let volume = uniform_cube_volume(0, 10, 1, constant_property(0.3, [1.0; 3], 1.0));
        let p = prepare(std::slice::from_ref(&volume), &ortho_camera(4.5, 4.5));
        let sampler = TableSampler::new(&p.opacity, &p.color, TABLE_WIDTH)
            .with_volume(volume.input_data().expect("fixture input"), p.infos[0]);
        let ray = IndexSpaceRay {
            start_is: Vec3::new(0.5, 0.5, 0.5),
            end_is: Vec3::new(0.5, 0.5, 0.55),
            sample_distance_is: 0.1,
        };
        let color = apply_blend(0, &p.traced[0], &sampler, &ray, 0.5, Vec4::ZERO);
        let expected = 1.0 - 0.7f32.powf(0.5);
        assert!((color.w - expected).abs() < 1e-4, "half a step of opacity, got {}", color.w);
    }

    #[test]
    fn test_capped_loop_still_covers_whole_ray() {
        // 100 steps through a slab filled in only one half
        let ray = IndexSpaceRay {
            start_is: Vec3::new(0.5, 0.5, 0.0),
            end_is: Vec3::new(0.5, 0.5, 1.0),
            sample_distance_is: 0.01,
        };
        for near_half in [true, false] {
            let sampler = HalfSlabSampler {
                alpha: 0.05,
                near_half,
            };
            let alpha = |max_samples| {
                let volume = TracedVolume {
                    uniforms: VolumeUniforms::zeroed(),
                    max_samples,
                };
                apply_blend(0, &volume, &sampler, &ray, 0.5, Vec4::ZERO).w
            };
            let full = alpha(1000);
            let capped = alpha(10);
            assert!(full > 0.9, "near_half {near_half}: reference alpha {full}");
            assert!(
                (full - capped).abs() < 0.03,
                "near_half {near_half}: capped alpha {capped} drifts from {full}"
            );
        }
    }

    #[test]
    fn test_sign_of_zero_is_zero() {
        assert_eq!(sign(0.0), 0.0);
        assert_eq!(sign(-0.0), 0.0);
        assert_eq!(sign(2.0), 1.0);
    }
}
