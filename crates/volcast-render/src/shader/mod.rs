//! Volume program synthesis.
//!
//! The fragment program is generated per [`ShaderKey`]: one function set per
//! volume (suffix `_i`) plus shared helpers. Constants come from
//! `volcast_core::constants` and are injected into every preamble.

pub mod fragment;
pub mod key;
pub mod vertex;

pub use key::{compute_light_complexity, LightComplexity, ShaderKey, VolumeShaderConfig};

use volcast_core::constants::{JITTER_SIZE, MAX_LIGHTS, SATURATION_ALPHA};

/// Group 0: frame uniforms, jitter tile, lookup tables, optional depth.
pub const FRAME_BINDING: u32 = 0;
pub const JITTER_TEXTURE_BINDING: u32 = 1;
pub const JITTER_SAMPLER_BINDING: u32 = 2;
pub const OPACITY_TABLE_BINDING: u32 = 3;
pub const OPACITY_SAMPLER_BINDING: u32 = 4;
pub const COLOR_TABLE_BINDING: u32 = 5;
pub const COLOR_SAMPLER_BINDING: u32 = 6;
pub const DEPTH_TEXTURE_BINDING: u32 = 7;

/// Group 1: the volume uniform array, then a texture/sampler pair per volume.
pub const VOLUME_UNIFORM_BINDING: u32 = 0;

pub fn scalar_texture_binding(volume: usize) -> u32 {
    1 + 2 * volume as u32
}

pub fn scalar_sampler_binding(volume: usize) -> u32 {
    2 + 2 * volume as u32
}

/// Resource shape a compiled program expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramLayout {
    pub volume_count: usize,
    pub depth_texture: bool,
}

/// Generated program sources plus the layout they bind against.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderSource {
    pub label: String,
    pub vertex: String,
    pub fragment: String,
    pub layout: ProgramLayout,
}

/// Generate vertex and fragment sources for `key`.
pub fn synthesize(key: &ShaderKey) -> ShaderSource {
    ShaderSource {
        label: format!("multi-volume-{:016x}", key.hash_value()),
        vertex: vertex::vertex_source(key),
        fragment: fragment::fragment_source(key),
        layout: ProgramLayout {
            volume_count: key.volume_count(),
            depth_texture: key.zbuffer_intermix,
        },
    }
}

/// Constants and uniform struct declarations shared by both stages.
pub(crate) fn preamble(key: &ShaderKey) -> String {
    let mut src = format!(
        "const MAX_LIGHTS: u32 = {}u;\n\
         const VOLUME_COUNT: u32 = {}u;\n\
         const TABLE_WIDTH: f32 = {:?};\n\
         const SATURATION: f32 = {:?};\n\
         const JITTER_SIZE: f32 = {:?};\n",
        MAX_LIGHTS,
        key.volume_count().max(1),
        key.table_width as f32,
        SATURATION_ALPHA,
        JITTER_SIZE as f32,
    );
    for (i, volume) in key.volumes.iter().enumerate() {
        src.push_str(&format!(
            "const MAX_SAMPLES_{i}: i32 = {};\n",
            volume.max_samples.min(i32::MAX as u32)
        ));
    }
    src.push('\n');
    src.push_str(UNIFORM_STRUCTS);
    src
}

const UNIFORM_STRUCTS: &str = r#"struct LightUniforms {
    color: vec4<f32>,
    direction_vc: vec4<f32>,
    half_angle_vc: vec4<f32>,
    position_vc: vec4<f32>,
    attenuation: vec4<f32>,
    exponent: vec4<f32>,
}

struct FrameUniforms {
    dc_to_vc: mat4x4<f32>,
    viewport: vec4<f32>,
    camera: vec4<f32>,
    sampling: vec4<f32>,
    lights: array<LightUniforms, MAX_LIGHTS>,
}

struct VolumeUniforms {
    dimensions: vec4<i32>,
    origin_vc: vec4<f32>,
    spacing: vec4<f32>,
    vc_to_ijk: vec4<f32>,
    texel_offset: vec4<f32>,
    plane_normals: array<vec4<f32>, 6>,
    opacity_shift: vec4<f32>,
    opacity_scale: vec4<f32>,
    color_shift: vec4<f32>,
    color_scale: vec4<f32>,
    gradient_scale: vec4<f32>,
    gradient_shift: vec4<f32>,
    gradient_min: vec4<f32>,
    gradient_max: vec4<f32>,
    component_mix: vec4<f32>,
    shading: vec4<f32>,
    table: vec4<f32>,
}

"#;

#[cfg(test)]
mod tests {
    use super::*;
    use volcast_core::{Interpolation, ModifiedStamp, VolumeId};

    pub(crate) fn config(id: u32, components: usize, independent: bool) -> VolumeShaderConfig {
        VolumeShaderConfig {
            volume_id: VolumeId(id),
            components,
            independent,
            interpolation: Interpolation::Linear,
            gradient_opacity: false,
            shade: false,
            max_samples: 18,
            data_stamp: ModifiedStamp::new(),
            property_stamp: ModifiedStamp::new(),
        }
    }

    fn key(volumes: Vec<VolumeShaderConfig>) -> ShaderKey {
        ShaderKey {
            volumes,
            light_complexity: LightComplexity::None,
            zbuffer_intermix: false,
            table_width: 1024,
        }
    }

    #[test]
    fn test_binding_slots_interleave() {
        assert_eq!(scalar_texture_binding(0), 1);
        assert_eq!(scalar_sampler_binding(0), 2);
        assert_eq!(scalar_texture_binding(3), 7);
        assert_eq!(scalar_sampler_binding(3), 8);
    }

    #[test]
    fn test_preamble_injects_constants() {
        let src = preamble(&key(vec![config(0, 1, true), config(1, 1, true)]));
        assert!(src.contains("const MAX_LIGHTS: u32 = 8u;"));
        assert!(src.contains("const VOLUME_COUNT: u32 = 2u;"));
        assert!(src.contains("const TABLE_WIDTH: f32 = 1024.0;"));
        assert!(src.contains("const SATURATION: f32 = 0.99;"));
        assert!(src.contains("const JITTER_SIZE: f32 = 32.0;"));
        assert!(src.contains("const MAX_SAMPLES_1: i32 = 18;"));
    }

    fn validate_wgsl(src: &str, stage: &str) {
        let module = naga::front::wgsl::parse_str(src)
            .unwrap_or_else(|e| panic!("{stage} failed to parse:\n{}", e.emit_to_string(src)));
        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        if let Err(e) = validator.validate(&module) {
            panic!("{stage} failed validation: {e:?}");
        }
    }

    #[test]
    fn test_generated_programs_validate() {
        let complexities = [
            LightComplexity::None,
            LightComplexity::Headlight,
            LightComplexity::Directional,
            LightComplexity::Positional,
        ];
        for complexity in complexities {
            for components in 1..=4 {
                for independent in [true, false] {
                    for intermix in [false, true] {
                        let mut lit = config(0, components, independent);
                        lit.shade = true;
                        lit.gradient_opacity = true;
                        let mut k = key(vec![lit, config(1, 1, true)]);
                        k.light_complexity = complexity;
                        k.zbuffer_intermix = intermix;
                        let source = synthesize(&k);
                        let stage = format!(
                            "{complexity:?}, {components} components, independent {independent}, intermix {intermix}"
                        );
                        validate_wgsl(&source.vertex, &format!("vertex ({stage})"));
                        validate_wgsl(&source.fragment, &format!("fragment ({stage})"));
                    }
                }
            }
        }
    }

    #[test]
    fn test_synthesize_label_and_layout() {
        let mut k = key(vec![config(0, 1, true)]);
        k.zbuffer_intermix = true;
        let source = synthesize(&k);
        assert!(source.label.starts_with("multi-volume-"));
        assert_eq!(
            source.layout,
            ProgramLayout {
                volume_count: 1,
                depth_texture: true
            }
        );
        assert!(source.vertex.contains("fn vs_main"));
        assert!(source.fragment.contains("fn fs_main"));
    }
}
