//! Single source of truth for shared constants.
//! These values are used by both Rust and the generated WGSL; the shader
//! synthesizer injects them into every program preamble.

/// Default number of samples per transfer-function table row segment.
pub const DEFAULT_TABLE_WIDTH: u32 = 1024;

/// Accumulated opacity above which a ray stops marching.
pub const SATURATION_ALPHA: f32 = 0.99;

/// Side length of the square jitter tile in texels.
pub const JITTER_SIZE: u32 = 32;

/// Maximum number of lights injected into a fragment program.
pub const MAX_LIGHTS: usize = 8;

/// Maximum number of volumes composited by one program.
/// Bounded by the per-stage sampled texture limit (16): 4 shared + 8 scalar.
pub const MAX_VOLUMES: usize = 8;

/// Maximum number of scalar components per voxel.
pub const MAX_COMPONENTS: usize = 4;

/// Step count above which a volume is reported as likely too expensive.
pub const DEFAULT_MAX_SAMPLES_WARNING: u32 = 1000;

/// Image sample distances at or below this value render at full resolution.
pub const IMAGE_SAMPLE_DISTANCE_THRESHOLD: f32 = 1.43;

/// Vertices in the full-viewport quad (two triangles).
pub const QUAD_VERTEX_COUNT: u32 = 6;
