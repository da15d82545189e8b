//! Ray-casting fragment stage.
//!
//! Per fragment: intersect the ray with every volume box, discard if none is
//! hit, then composite the hit volumes front to back (by entry distance) into
//! one accumulator. Each volume runs the boundary / fixed-step / tail
//! sequence of `apply_blend_i` until the accumulator saturates.

use super::key::{LightComplexity, ShaderKey, VolumeShaderConfig};
use super::{
    preamble, scalar_sampler_binding, scalar_texture_binding, COLOR_SAMPLER_BINDING,
    COLOR_TABLE_BINDING, DEPTH_TEXTURE_BINDING, FRAME_BINDING, JITTER_SAMPLER_BINDING,
    JITTER_TEXTURE_BINDING, OPACITY_SAMPLER_BINDING, OPACITY_TABLE_BINDING,
    VOLUME_UNIFORM_BINDING,
};

const LANES: [char; 4] = ['x', 'y', 'z', 'w'];
const CHANNELS: [char; 4] = ['r', 'g', 'b', 'a'];

/// Helpers that do not depend on a volume index.
const SHARED_HELPERS: &str = r#"struct IndexSpaceRay {
    start_is: vec3<f32>,
    end_is: vec3<f32>,
    sample_distance_is: f32,
    start_vc: vec3<f32>,
    end_vc: vec3<f32>,
}

fn table_coord(value: f32, component: u32, row: f32) -> vec2<f32> {
    let segment = f32(component) * 2.0 * TABLE_WIDTH;
    let x = (segment + clamp(value, 0.0, 1.0) * (TABLE_WIDTH - 1.0) + 0.5) / frame.sampling.y;
    return vec2<f32>(x, row);
}

fn lookup_opacity(value: f32, component: u32, row: f32) -> f32 {
    return textureSampleLevel(opacity_table, opacity_sampler, table_coord(value, component, row), 0.0).r;
}

fn lookup_color(value: f32, component: u32, row: f32) -> vec3<f32> {
    return textureSampleLevel(color_table, color_sampler, table_coord(value, component, row), 0.0).rgb;
}

// Front-to-back "under" operator on a premultiplied accumulator.
fn composite_sample(color: vec4<f32>, sample_color: vec4<f32>) -> vec4<f32> {
    let remaining = 1.0 - color.a;
    return color + vec4<f32>(sample_color.rgb * sample_color.a, sample_color.a) * remaining;
}

fn attenuate(alpha: f32, steps: f32) -> f32 {
    return 1.0 - pow(max(1.0 - alpha, 0.0), steps);
}

// Widen `bounds` by the hit on one box face if the hit lies inside the face.
// The in/out test folds into one sign() because some drivers mishandle the
// direct edge comparisons.
fn ray_plane_bounds(
    ray_pos: vec3<f32>,
    ray_dir: vec3<f32>,
    plane: vec4<f32>,
    bounds: vec2<f32>,
    plane_x: vec3<f32>,
    plane_y: vec3<f32>,
    size_x: f32,
    size_y: f32,
    origin: vec3<f32>,
) -> vec2<f32> {
    let denom = dot(ray_dir, plane.xyz);
    if (denom == 0.0) {
        return bounds;
    }
    let t = -(dot(ray_pos, plane.xyz) + plane.w) / denom;
    let offset = ray_pos + ray_dir * t - origin;
    let p = vec2<f32>(dot(offset, plane_x), dot(offset, plane_y));
    let x_check = max(0.0, p.x * (p.x - size_x));
    let check = sign(max(x_check, p.y * (p.y - size_y)));
    return mix(vec2<f32>(min(bounds.x, t), max(bounds.y, t)), bounds, check);
}

"#;

/// Ray distance to the opaque surface recorded in the depth buffer.
const OPAQUE_DISTANCE: &str = r#"fn opaque_distance(ray_dir: vec3<f32>, frag_coord: vec4<f32>) -> f32 {
    let pixel = frag_coord.xy * frame.sampling.z;
    let texel = vec2<i32>(clamp(pixel, vec2<f32>(0.0), frame.viewport.xy - vec2<f32>(1.0)));
    let depth = textureLoad(depth_texture, texel, 0);
    let ndc = vec2<f32>(pixel.x * frame.viewport.z * 2.0 - 1.0, 1.0 - pixel.y * frame.viewport.w * 2.0);
    let surface = frame.dc_to_vc * vec4<f32>(ndc, depth, 1.0);
    let z = surface.z / surface.w;
    return (z + frame.camera.x) / ray_dir.z;
}

"#;

pub fn fragment_source(key: &ShaderKey) -> String {
    let mut src = preamble(key);
    src.push_str(&bindings(key));
    src.push_str(SHARED_HELPERS);
    if key.zbuffer_intermix {
        src.push_str(OPAQUE_DISTANCE);
    }
    for (i, volume) in key.volumes.iter().enumerate() {
        let lit = volume.shade && key.light_complexity != LightComplexity::None;
        src.push_str(&texture_value(i, volume));
        if lit || volume.gradient_opacity {
            src.push_str(&normals(i, volume));
        }
        if lit {
            src.push_str(&lighting(i, key.light_complexity));
        }
        src.push_str(&color_for_value(i, volume, lit));
        src.push_str(&ray_distances(i, key.zbuffer_intermix));
        src.push_str(&index_space_values(i));
        src.push_str(&apply_blend(i));
    }
    src.push_str(&main_function(key));
    src
}

fn bindings(key: &ShaderKey) -> String {
    let mut src = format!(
        "@group(0) @binding({FRAME_BINDING}) var<uniform> frame: FrameUniforms;\n\
         @group(0) @binding({JITTER_TEXTURE_BINDING}) var jitter_texture: texture_2d<f32>;\n\
         @group(0) @binding({JITTER_SAMPLER_BINDING}) var jitter_sampler: sampler;\n\
         @group(0) @binding({OPACITY_TABLE_BINDING}) var opacity_table: texture_2d<f32>;\n\
         @group(0) @binding({OPACITY_SAMPLER_BINDING}) var opacity_sampler: sampler;\n\
         @group(0) @binding({COLOR_TABLE_BINDING}) var color_table: texture_2d<f32>;\n\
         @group(0) @binding({COLOR_SAMPLER_BINDING}) var color_sampler: sampler;\n"
    );
    if key.zbuffer_intermix {
        src.push_str(&format!(
            "@group(0) @binding({DEPTH_TEXTURE_BINDING}) var depth_texture: texture_depth_2d;\n"
        ));
    }
    src.push_str(&format!(
        "@group(1) @binding({VOLUME_UNIFORM_BINDING}) var<uniform> volumes: array<VolumeUniforms, VOLUME_COUNT>;\n"
    ));
    for i in 0..key.volume_count() {
        src.push_str(&format!(
            "@group(1) @binding({}) var scalar_texture_{i}: texture_3d<f32>;\n\
             @group(1) @binding({}) var scalar_sampler_{i}: sampler;\n",
            scalar_texture_binding(i),
            scalar_sampler_binding(i),
        ));
    }
    src.push('\n');
    src
}

/// Sample the scalar texture and collapse dependent components into `.a`.
fn texture_value(i: usize, volume: &VolumeShaderConfig) -> String {
    let collapse = match (volume.components, volume.independent) {
        (1, _) => "    value.a = value.r;\n",
        (2, false) => "    value.a = value.g;\n",
        (3, false) => "    value.a = length(value.rgb);\n",
        _ => "",
    };
    format!(
        "fn get_texture_value_{i}(pos: vec3<f32>) -> vec4<f32> {{\n\
         \x20   var value = textureSampleLevel(scalar_texture_{i}, scalar_sampler_{i}, pos + volumes[{i}].texel_offset.xyz, 0.0);\n\
         {collapse}\
         \x20   return value;\n\
         }}\n\n"
    )
}

/// Forward-difference gradients rotated into view space by the box basis
/// (planes 0, 2 and 4).
fn normals(i: usize, volume: &VolumeShaderConfig) -> String {
    let mut src = format!(
        "fn rotate_gradient_{i}(g: vec3<f32>) -> vec4<f32> {{\n\
         \x20   let planes = volumes[{i}].plane_normals;\n\
         \x20   let magnitude = length(g);\n\
         \x20   var n = g.x * planes[0].xyz + g.y * planes[2].xyz + g.z * planes[4].xyz;\n\
         \x20   if (magnitude > 0.0) {{\n\
         \x20       n = n / magnitude;\n\
         \x20   }}\n\
         \x20   return vec4<f32>(n, magnitude);\n\
         }}\n\n\
         fn compute_normal_{i}(pos: vec3<f32>, scalar: f32, tstep: vec3<f32>) -> vec4<f32> {{\n\
         \x20   let g = vec3<f32>(\n\
         \x20       get_texture_value_{i}(pos + vec3<f32>(tstep.x, 0.0, 0.0)).a - scalar,\n\
         \x20       get_texture_value_{i}(pos + vec3<f32>(0.0, tstep.y, 0.0)).a - scalar,\n\
         \x20       get_texture_value_{i}(pos + vec3<f32>(0.0, 0.0, tstep.z)).a - scalar,\n\
         \x20   ) / volumes[{i}].spacing.xyz;\n\
         \x20   return rotate_gradient_{i}(g);\n\
         }}\n\n"
    );

    if volume.independent && volume.components > 1 {
        src.push_str(&format!(
            "fn compute_mat4_normal_{i}(pos: vec3<f32>, t_value: vec4<f32>, tstep: vec3<f32>) -> mat4x4<f32> {{\n\
             \x20   let spacing = volumes[{i}].spacing;\n\
             \x20   let dist_x = (get_texture_value_{i}(pos + vec3<f32>(tstep.x, 0.0, 0.0)) - t_value) / spacing.x;\n\
             \x20   let dist_y = (get_texture_value_{i}(pos + vec3<f32>(0.0, tstep.y, 0.0)) - t_value) / spacing.y;\n\
             \x20   let dist_z = (get_texture_value_{i}(pos + vec3<f32>(0.0, 0.0, tstep.z)) - t_value) / spacing.z;\n\
             \x20   var result = mat4x4<f32>();\n"
        ));
        for (c, ch) in CHANNELS.iter().enumerate().take(volume.components) {
            src.push_str(&format!(
                "    result[{c}] = rotate_gradient_{i}(vec3<f32>(dist_x.{ch}, dist_y.{ch}, dist_z.{ch}));\n"
            ));
        }
        src.push_str("    return result;\n}\n\n");
    }
    src
}

/// Phong terms summed over the lights the complexity level admits.
/// Diffuse and specular use `abs` so back-facing gradients still light.
fn lighting(i: usize, complexity: LightComplexity) -> String {
    let mut src = format!(
        "fn apply_lighting_{i}(color: vec3<f32>, normal: vec4<f32>, pos_vc: vec3<f32>) -> vec3<f32> {{\n\
         \x20   let shading = volumes[{i}].shading;\n\
         \x20   var diffuse = vec3<f32>(0.0);\n\
         \x20   var specular = vec3<f32>(0.0);\n"
    );

    match complexity {
        LightComplexity::None => {}
        LightComplexity::Headlight => src.push_str(
            "    let light = frame.lights[0];\n\
             \x20   let df = abs(dot(normal.xyz, -light.direction_vc.xyz));\n\
             \x20   let sf = pow(abs(dot(light.half_angle_vc.xyz, normal.xyz)), shading.w);\n\
             \x20   diffuse = df * light.color.rgb;\n\
             \x20   specular = sf * light.color.rgb;\n",
        ),
        LightComplexity::Directional | LightComplexity::Positional => {
            src.push_str(
                "    let light_count = u32(frame.sampling.w);\n\
                 \x20   for (var l = 0u; l < MAX_LIGHTS; l = l + 1u) {\n\
                 \x20       if (l >= light_count) {\n\
                 \x20           break;\n\
                 \x20       }\n\
                 \x20       let light = frame.lights[l];\n\
                 \x20       var light_dir = light.direction_vc.xyz;\n\
                 \x20       var half_angle = light.half_angle_vc.xyz;\n\
                 \x20       var attenuation = 1.0;\n",
            );
            if complexity == LightComplexity::Positional {
                src.push_str(
                    "        if (light.position_vc.w > 0.5) {\n\
                     \x20           let to_sample = pos_vc - light.position_vc.xyz;\n\
                     \x20           let light_distance = length(to_sample);\n\
                     \x20           light_dir = to_sample / max(light_distance, 1e-6);\n\
                     \x20           let view_dir = select(-normalize(pos_vc), vec3<f32>(0.0, 0.0, 1.0), frame.camera.w > 0.5);\n\
                     \x20           half_angle = normalize(view_dir - light_dir);\n\
                     \x20           attenuation = 1.0 / (light.attenuation.x\n\
                     \x20               + light.attenuation.y * light_distance\n\
                     \x20               + light.attenuation.z * light_distance * light_distance);\n\
                     \x20           if (light.attenuation.w >= -1.0) {\n\
                     \x20               let cone_dot = dot(light_dir, light.direction_vc.xyz);\n\
                     \x20               if (cone_dot >= light.attenuation.w) {\n\
                     \x20                   attenuation = attenuation * pow(cone_dot, light.exponent.x);\n\
                     \x20               } else {\n\
                     \x20                   attenuation = 0.0;\n\
                     \x20               }\n\
                     \x20           }\n\
                     \x20       }\n",
                );
            }
            src.push_str(
                "        let df = attenuation * abs(dot(normal.xyz, -light_dir));\n\
                 \x20       let sf = attenuation * pow(abs(dot(half_angle, normal.xyz)), shading.w);\n\
                 \x20       diffuse = diffuse + df * light.color.rgb;\n\
                 \x20       specular = specular + sf * light.color.rgb;\n\
                 \x20   }\n",
            );
        }
    }

    src.push_str(
        "    return color * (diffuse * shading.y + shading.x) + specular * shading.z;\n}\n\n",
    );
    src
}

/// Map a sampled value through the tables, gradient opacity and lighting.
fn color_for_value(i: usize, volume: &VolumeShaderConfig, lit: bool) -> String {
    let components = volume.components.clamp(1, 4);
    let independent_multi = volume.independent && components > 1;
    let mut body = String::from(
        "    let vol = volumes[INDEX];\n\
         \x20   let row = vol.table.x;\n\
         \x20   var go_factor = vec4<f32>(1.0);\n",
    );

    if lit || volume.gradient_opacity {
        if independent_multi {
            body.push_str("    let normal_mat = compute_mat4_normal_INDEX(pos, t_value, tstep);\n");
            for c in 0..components {
                body.push_str(&format!("    let normal{c} = normal_mat[{c}];\n"));
            }
        } else {
            body.push_str("    let normal0 = compute_normal_INDEX(pos, t_value.a, tstep);\n");
        }
    }

    if volume.gradient_opacity {
        let factors = if independent_multi { components } else { 1 };
        for (c, l) in LANES.iter().enumerate().take(factors) {
            body.push_str(&format!(
                "    go_factor.{l} = clamp(normal{c}.w * vol.gradient_scale.{l} + vol.gradient_shift.{l}, \
                 vol.gradient_min.{l}, vol.gradient_max.{l});\n"
            ));
        }
    }

    if components == 1 {
        body.push_str(
            "    var t_color = vec4<f32>(lookup_color(t_value.r * vol.color_scale.x + vol.color_shift.x, 0u, row), 1.0);\n\
             \x20   t_color.a = go_factor.x * lookup_opacity(t_value.r * vol.opacity_scale.x + vol.opacity_shift.x, 0u, row);\n",
        );
    } else if independent_multi {
        body.push_str(
            "    var t_color = vec4<f32>(vol.component_mix.x * lookup_color(t_value.r * vol.color_scale.x + vol.color_shift.x, 0u, row), 0.0);\n\
             \x20   t_color.a = go_factor.x * vol.component_mix.x * lookup_opacity(t_value.r * vol.opacity_scale.x + vol.opacity_shift.x, 0u, row);\n",
        );
        for c in 1..components {
            let (l, ch) = (LANES[c], CHANNELS[c]);
            body.push_str(&format!(
                "    var t_color{c} = vol.component_mix.{l} * lookup_color(t_value.{ch} * vol.color_scale.{l} + vol.color_shift.{l}, {c}u, row);\n\
                 \x20   t_color.a = t_color.a + go_factor.{l} * vol.component_mix.{l} * lookup_opacity(t_value.{ch} * vol.opacity_scale.{l} + vol.opacity_shift.{l}, {c}u, row);\n"
            ));
        }
    } else if components == 2 {
        body.push_str(
            "    let lum = t_value.r * vol.color_scale.x + vol.color_shift.x;\n\
             \x20   let alpha = go_factor.x * lookup_opacity(t_value.a * vol.opacity_scale.y + vol.opacity_shift.y, 0u, row);\n\
             \x20   var t_color = vec4<f32>(lum, lum, lum, alpha);\n",
        );
    } else {
        let lane = if components == 3 { 'x' } else { 'w' };
        body.push_str(&format!(
            "    var t_color = vec4<f32>(clamp(t_value.rgb * vol.color_scale.xyz + vol.color_shift.xyz, vec3<f32>(0.0), vec3<f32>(1.0)), 0.0);\n\
             \x20   t_color.a = go_factor.x * lookup_opacity(t_value.a * vol.opacity_scale.{lane} + vol.opacity_shift.{lane}, 0u, row);\n"
        ));
    }

    if lit {
        body.push_str(
            "    t_color = vec4<f32>(apply_lighting_INDEX(t_color.rgb, normal0, pos_vc), t_color.a);\n",
        );
        if independent_multi {
            for c in 1..components {
                body.push_str(&format!(
                    "    t_color{c} = apply_lighting_INDEX(t_color{c}, normal{c}, pos_vc);\n"
                ));
            }
        }
    }

    if independent_multi {
        let extra: Vec<String> = (1..components).map(|c| format!(" + t_color{c}")).collect();
        body.push_str(&format!(
            "    t_color = vec4<f32>(t_color.rgb{}, t_color.a);\n",
            extra.concat()
        ));
    }

    let body = body.replace("INDEX", &i.to_string());
    format!(
        "fn get_color_for_value_{i}(t_value: vec4<f32>, pos: vec3<f32>, tstep: vec3<f32>, pos_vc: vec3<f32>) -> vec4<f32> {{\n\
         {body}\
         \x20   return t_color;\n\
         }}\n\n"
    )
}

/// Entry and exit distances of the ray through box `i`, clipped to the
/// near/far planes and optionally the opaque depth.
fn ray_distances(i: usize, intermix: bool) -> String {
    let zbuffer = if intermix {
        "    dists.y = min(opaque_distance(ray_dir, frag_coord), dists.y);\n"
    } else {
        ""
    };
    format!(
        "fn compute_ray_distances_{i}(ray_dir: vec3<f32>, vertex_vc: vec3<f32>, frag_coord: vec4<f32>) -> vec2<f32> {{\n\
         \x20   let vol = volumes[{i}];\n\
         \x20   let size = vol.spacing.xyz * (vec3<f32>(vol.dimensions.xyz) - vec3<f32>(1.0));\n\
         \x20   let origin = vol.origin_vc.xyz;\n\
         \x20   let n0 = vol.plane_normals[0].xyz;\n\
         \x20   let n2 = vol.plane_normals[2].xyz;\n\
         \x20   let n4 = vol.plane_normals[4].xyz;\n\
         \x20   var dists = vec2<f32>(100.0 * frame.camera.y, -1.0);\n\
         \x20   dists = ray_plane_bounds(vertex_vc, ray_dir, vol.plane_normals[0], dists, n2, n4, size.y, size.z, origin);\n\
         \x20   dists = ray_plane_bounds(vertex_vc, ray_dir, vol.plane_normals[1], dists, n2, n4, size.y, size.z, origin);\n\
         \x20   dists = ray_plane_bounds(vertex_vc, ray_dir, vol.plane_normals[2], dists, n0, n4, size.x, size.z, origin);\n\
         \x20   dists = ray_plane_bounds(vertex_vc, ray_dir, vol.plane_normals[3], dists, n0, n4, size.x, size.z, origin);\n\
         \x20   dists = ray_plane_bounds(vertex_vc, ray_dir, vol.plane_normals[4], dists, n0, n2, size.x, size.y, origin);\n\
         \x20   dists = ray_plane_bounds(vertex_vc, ray_dir, vol.plane_normals[5], dists, n0, n2, size.x, size.y, origin);\n\
         \x20   dists.x = max(0.0, dists.x);\n\
         \x20   dists.y = min(-frame.camera.z / ray_dir.z, dists.y);\n\
         {zbuffer}\
         \x20   return dists;\n\
         }}\n\n"
    )
}

/// View-space entry/exit to normalized index space, with the step length
/// rescaled so a step still covers `sample_distance` view units.
fn index_space_values(i: usize) -> String {
    format!(
        "fn compute_index_space_values_{i}(ray_dir: vec3<f32>, vertex_vc: vec3<f32>, dists: vec2<f32>) -> IndexSpaceRay {{\n\
         \x20   let vol = volumes[{i}];\n\
         \x20   let n0 = vol.plane_normals[0].xyz;\n\
         \x20   let n2 = vol.plane_normals[2].xyz;\n\
         \x20   let n4 = vol.plane_normals[4].xyz;\n\
         \x20   let start_vc = vertex_vc + dists.x * ray_dir;\n\
         \x20   let end_vc = vertex_vc + dists.y * ray_dir;\n\
         \x20   let start_rel = start_vc - vol.origin_vc.xyz;\n\
         \x20   let end_rel = end_vc - vol.origin_vc.xyz;\n\
         \x20   var start_is = vec3<f32>(dot(start_rel, n0), dot(start_rel, n2), dot(start_rel, n4));\n\
         \x20   var end_is = vec3<f32>(dot(end_rel, n0), dot(end_rel, n2), dot(end_rel, n4));\n\
         \x20   let delta = length(end_is - start_is);\n\
         \x20   start_is = start_is * vol.vc_to_ijk.xyz;\n\
         \x20   end_is = end_is * vol.vc_to_ijk.xyz;\n\
         \x20   let delta_is = length(end_is - start_is);\n\
         \x20   return IndexSpaceRay(start_is, end_is, frame.sampling.x * delta_is / delta, start_vc, end_vc);\n\
         }}\n\n"
    )
}

/// Boundary sample with jitter, fixed steps up to the compile-time cap,
/// then a tail sample at the exit weighted by the leftover fraction. Rays
/// longer than the cap walk wider steps with opacity attenuated to match.
fn apply_blend(i: usize) -> String {
    format!(
        "fn apply_blend_{i}(ray: IndexSpaceRay, jitter: f32, color_in: vec4<f32>) -> vec4<f32> {{\n\
         \x20   let tstep = 1.0 / vec3<f32>(volumes[{i}].dimensions.xyz);\n\
         \x20   let delta = ray.end_is - ray.start_is;\n\
         \x20   let full_steps = length(delta) / ray.sample_distance_is;\n\
         \x20   var color = color_in;\n\
         \x20   var pos = ray.start_is;\n\
         \x20   var pos_vc = ray.start_vc;\n\
         \n\
         \x20   var t_value = get_texture_value_{i}(pos);\n\
         \x20   var t_color = get_color_for_value_{i}(t_value, pos, tstep, pos_vc);\n\
         \x20   if (full_steps <= 1.0) {{\n\
         \x20       t_color.a = attenuate(t_color.a, full_steps);\n\
         \x20       return composite_sample(color, t_color);\n\
         \x20   }}\n\
         \n\
         \x20   let stretch = max(full_steps / f32(MAX_SAMPLES_{i}), 1.0);\n\
         \x20   let ray_steps = full_steps / stretch;\n\
         \x20   let step_is = normalize(delta) * ray.sample_distance_is * stretch;\n\
         \x20   let step_vc = (ray.end_vc - ray.start_vc) / ray_steps;\n\
         \x20   t_color.a = attenuate(t_color.a, jitter * stretch);\n\
         \x20   color = composite_sample(color, t_color);\n\
         \x20   pos = pos + jitter * step_is;\n\
         \x20   pos_vc = pos_vc + jitter * step_vc;\n\
         \x20   var steps = jitter;\n\
         \n\
         \x20   for (var s = 0; s < MAX_SAMPLES_{i}; s = s + 1) {{\n\
         \x20       if (steps + 1.0 >= ray_steps) {{\n\
         \x20           break;\n\
         \x20       }}\n\
         \x20       t_value = get_texture_value_{i}(pos);\n\
         \x20       t_color = get_color_for_value_{i}(t_value, pos, tstep, pos_vc);\n\
         \x20       t_color.a = attenuate(t_color.a, stretch);\n\
         \x20       color = composite_sample(color, t_color);\n\
         \x20       steps = steps + 1.0;\n\
         \x20       pos = pos + step_is;\n\
         \x20       pos_vc = pos_vc + step_vc;\n\
         \x20       if (color.a > SATURATION) {{\n\
         \x20           color.a = 1.0;\n\
         \x20           break;\n\
         \x20       }}\n\
         \x20   }}\n\
         \n\
         \x20   if (color.a < SATURATION && (ray_steps - steps) > 0.0) {{\n\
         \x20       pos = ray.end_is;\n\
         \x20       pos_vc = ray.end_vc;\n\
         \x20       t_value = get_texture_value_{i}(pos);\n\
         \x20       t_color = get_color_for_value_{i}(t_value, pos, tstep, pos_vc);\n\
         \x20       t_color.a = attenuate(t_color.a, (ray_steps - steps) * stretch);\n\
         \x20       color = composite_sample(color, t_color);\n\
         \x20   }}\n\
         \x20   return color;\n\
         }}\n\n\
         fn composite_volume_{i}(ray_dir: vec3<f32>, vertex_vc: vec3<f32>, dists: vec2<f32>, jitter: f32, color_in: vec4<f32>) -> vec4<f32> {{\n\
         \x20   let ray = compute_index_space_values_{i}(ray_dir, vertex_vc, dists);\n\
         \x20   return apply_blend_{i}(ray, jitter, color_in);\n\
         }}\n\n"
    )
}

fn main_function(key: &ShaderKey) -> String {
    let count = key.volume_count();
    let mut distances = String::new();
    let mut dispatch = String::new();
    for i in 0..count {
        distances.push_str(&format!(
            "    dists[{i}] = compute_ray_distances_{i}(ray_dir, input.vertex_vc, input.frag_coord);\n\
             \x20   covered = covered || dists[{i}].y > dists[{i}].x;\n"
        ));
        dispatch.push_str(&format!(
            "            case {i}: {{\n\
             \x20               color = composite_volume_{i}(ray_dir, input.vertex_vc, dists[{i}], jitter, color);\n\
             \x20           }}\n"
        ));
    }

    format!(
        "struct FragmentInput {{\n\
         \x20   @builtin(position) frag_coord: vec4<f32>,\n\
         \x20   @location(0) vertex_vc: vec3<f32>,\n\
         }}\n\n\
         @fragment\n\
         fn fs_main(input: FragmentInput) -> @location(0) vec4<f32> {{\n\
         \x20   var ray_dir = normalize(input.vertex_vc);\n\
         \x20   if (frame.camera.w > 0.5) {{\n\
         \x20       ray_dir = vec3<f32>(0.0, 0.0, -1.0);\n\
         \x20   }}\n\
         \n\
         \x20   var dists: array<vec2<f32>, VOLUME_COUNT>;\n\
         \x20   var covered = false;\n\
         {distances}\
         \x20   if (!covered) {{\n\
         \x20       discard;\n\
         \x20   }}\n\
         \n\
         \x20   let jitter = 0.01 + 0.99 * textureSampleLevel(jitter_texture, jitter_sampler, input.frag_coord.xy / JITTER_SIZE, 0.0).r;\n\
         \x20   var color = vec4<f32>(0.0);\n\
         \x20   var visited: array<bool, VOLUME_COUNT>;\n\
         \x20   for (var visit = 0u; visit < VOLUME_COUNT; visit = visit + 1u) {{\n\
         \x20       var chosen = -1;\n\
         \x20       var nearest = 0.0;\n\
         \x20       for (var k = 0u; k < VOLUME_COUNT; k = k + 1u) {{\n\
         \x20           let d = dists[k];\n\
         \x20           if (!visited[k] && d.y > d.x && (chosen < 0 || d.x < nearest)) {{\n\
         \x20               chosen = i32(k);\n\
         \x20               nearest = d.x;\n\
         \x20           }}\n\
         \x20       }}\n\
         \x20       if (chosen < 0) {{\n\
         \x20           break;\n\
         \x20       }}\n\
         \x20       visited[chosen] = true;\n\
         \x20       switch chosen {{\n\
         {dispatch}\
         \x20           default: {{}}\n\
         \x20       }}\n\
         \x20       if (color.a > SATURATION) {{\n\
         \x20           break;\n\
         \x20       }}\n\
         \x20   }}\n\
         \n\
         \x20   if (color.a <= 0.0) {{\n\
         \x20       return vec4<f32>(0.0);\n\
         \x20   }}\n\
         \x20   return vec4<f32>(color.rgb / color.a, color.a);\n\
         }}\n"
    )
}
