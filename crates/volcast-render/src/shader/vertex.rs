//! Full-viewport quad vertex stage.
//!
//! Emits two triangles at the near plane and hands the view-space position
//! of each corner to the fragment stage, where it is both the ray origin and
//! (for perspective cameras) the ray direction.

use super::{preamble, ShaderKey, FRAME_BINDING};

const VERTEX_BODY: &str = r#"struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) vertex_vc: vec3<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let dc = corners[vertex_index];
    let vc = frame.dc_to_vc * vec4<f32>(dc, 0.0, 1.0);

    var result: VertexOutput;
    result.position = vec4<f32>(dc, 0.0, 1.0);
    result.vertex_vc = vc.xyz / vc.w;
    return result;
}
"#;

pub fn vertex_source(key: &ShaderKey) -> String {
    let mut src = preamble(key);
    src.push_str(&format!(
        "@group(0) @binding({FRAME_BINDING}) var<uniform> frame: FrameUniforms;\n\n"
    ));
    src.push_str(VERTEX_BODY);
    src
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::LightComplexity;

    #[test]
    fn test_vertex_source_draws_six_vertex_quad() {
        let key = ShaderKey {
            volumes: Vec::new(),
            light_complexity: LightComplexity::None,
            zbuffer_intermix: false,
            table_width: 1024,
        };
        let src = vertex_source(&key);
        assert!(src.contains("array<vec2<f32>, 6>"));
        assert!(src.contains("@group(0) @binding(0) var<uniform> frame: FrameUniforms;"));
        assert!(!src.contains("scalar_texture_"), "vertex stage binds no volume textures");
    }
}
