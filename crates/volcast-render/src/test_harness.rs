//! Deterministic test infrastructure for the mapper.
//!
//! `RecordingContext` stands in for the GPU: it hands out handles, checks
//! upload sizes, and counts every allocation, release, compile and draw.
//! Tests that need a real adapter are gated behind the `gpu_tests` feature.

use std::collections::HashSet;

use glam::{Vec3, Vec4};

use volcast_core::{
    ColorTransferFunction, ImageData, PiecewiseFunction, ScalarData, VolcastError, Volume,
    VolumeId, VolumeProperty,
};

use crate::gpu::{
    Capabilities, DrawCall, GpuContext, ProgramHandle, TexelFormat, TextureDescriptor,
    TextureExtent, TextureFilter, TextureHandle,
};
use crate::compositor::VolumeSampler;
use crate::shader::ShaderSource;
use crate::uniforms::VolumeUniforms;

#[derive(Debug, Clone)]
pub struct CreatedTexture {
    pub handle: TextureHandle,
    pub label: String,
    pub extent: TextureExtent,
    pub format: TexelFormat,
    pub filter: TextureFilter,
}

#[derive(Debug, Clone)]
pub struct RecordedDraw {
    pub program: ProgramHandle,
    pub scalar_textures: Vec<TextureHandle>,
    pub depth: Option<TextureHandle>,
    pub frame_bytes: usize,
    pub volume_bytes: usize,
    pub image_sample_distance: f32,
}

#[derive(Debug)]
pub struct RecordingContext {
    pub caps: Capabilities,
    pub size: [u32; 2],
    next_handle: u64,
    live: HashSet<u64>,
    pub created: Vec<CreatedTexture>,
    pub textures_created: usize,
    pub textures_released: usize,
    pub filter_changes: usize,
    pub programs_compiled: usize,
    pub programs_released: usize,
    pub sources: Vec<ShaderSource>,
    pub draws: Vec<RecordedDraw>,
    /// Make the next compile fail with this message.
    pub fail_next_compile: Option<String>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self {
            caps: Capabilities::default(),
            size: [64, 48],
            next_handle: 1,
            live: HashSet::new(),
            created: Vec::new(),
            textures_created: 0,
            textures_released: 0,
            filter_changes: 0,
            programs_compiled: 0,
            programs_released: 0,
            sources: Vec::new(),
            draws: Vec::new(),
            fail_next_compile: None,
        }
    }

    pub fn with_float32_filtering() -> Self {
        let mut ctx = Self::new();
        ctx.caps.float32_filterable = true;
        ctx
    }

    pub fn live_textures(&self) -> usize {
        self.live.len()
    }

    /// Texture handle registered from outside, like an opaque depth buffer.
    pub fn external_texture(&mut self) -> TextureHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        TextureHandle(handle)
    }

    fn allocate(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.live.insert(handle);
        handle
    }
}

impl GpuContext for RecordingContext {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn target_size(&self) -> [u32; 2] {
        self.size
    }

    fn create_texture(&mut self, desc: &TextureDescriptor<'_>) -> Result<TextureHandle, VolcastError> {
        if desc.data.len() != desc.expected_bytes() {
            return Err(VolcastError::TextureCreationFailed(format!(
                "{}: {} bytes for {} expected",
                desc.label,
                desc.data.len(),
                desc.expected_bytes()
            )));
        }
        let handle = TextureHandle(self.allocate());
        self.textures_created += 1;
        self.created.push(CreatedTexture {
            handle,
            label: desc.label.to_string(),
            extent: desc.extent,
            format: desc.format,
            filter: desc.filter,
        });
        Ok(handle)
    }

    fn set_texture_filter(
        &mut self,
        handle: TextureHandle,
        _filter: TextureFilter,
    ) -> Result<(), VolcastError> {
        if !self.live.contains(&handle.0) {
            return Err(VolcastError::UnknownHandle(handle.0));
        }
        self.filter_changes += 1;
        Ok(())
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        if self.live.remove(&handle.0) {
            self.textures_released += 1;
        }
    }

    fn compile_program(&mut self, source: &ShaderSource) -> Result<ProgramHandle, VolcastError> {
        if let Some(message) = self.fail_next_compile.take() {
            return Err(VolcastError::ShaderCompilationFailed(message));
        }
        self.programs_compiled += 1;
        self.sources.push(source.clone());
        Ok(ProgramHandle(self.allocate()))
    }

    fn release_program(&mut self, handle: ProgramHandle) {
        if self.live.remove(&handle.0) {
            self.programs_released += 1;
        }
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), VolcastError> {
        for handle in call
            .scalar_textures
            .iter()
            .chain([&call.jitter, &call.opacity_table, &call.color_table])
        {
            if !self.live.contains(&handle.0) {
                return Err(VolcastError::UnknownHandle(handle.0));
            }
        }
        if !self.live.contains(&call.program.0) {
            return Err(VolcastError::UnknownHandle(call.program.0));
        }
        self.draws.push(RecordedDraw {
            program: call.program,
            scalar_textures: call.scalar_textures.to_vec(),
            depth: call.depth,
            frame_bytes: call.frame_uniforms.len(),
            volume_bytes: call.volume_uniforms.len(),
            image_sample_distance: call.image_sample_distance,
        });
        Ok(())
    }
}

/// Cube of `size`^3 unit-spaced voxels all holding `value`.
pub fn uniform_cube_volume(id: u32, size: u32, value: u8, property: VolumeProperty) -> Volume {
    let count = (size * size * size) as usize;
    let image = ImageData::new([size, size, size], 1, ScalarData::U8(vec![value; count]));
    Volume::new(VolumeId(id), Some(image), property)
}

/// Opacity `opacity` at scalar 1 (and everywhere else), solid `rgb`.
pub fn constant_property(opacity: f64, rgb: [f64; 3], unit_distance: f64) -> VolumeProperty {
    let mut property = VolumeProperty::new();
    let mut ofun = PiecewiseFunction::new();
    ofun.add_point(1.0, opacity);
    property.set_scalar_opacity(0, ofun);
    property.set_scalar_opacity_unit_distance(0, unit_distance);
    let mut cfun = ColorTransferFunction::new();
    cfun.add_rgb_point(1.0, rgb[0], rgb[1], rgb[2]);
    property.set_rgb_transfer_function(0, cfun);
    property
}

/// White, with per-step opacity `alpha` in one half of the index-space z
/// range and clear in the other.
pub struct HalfSlabSampler {
    pub alpha: f32,
    pub near_half: bool,
}

impl VolumeSampler for HalfSlabSampler {
    fn sample(&self, _volume: usize, _uniforms: &VolumeUniforms, pos_is: Vec3) -> Vec4 {
        let filled = (pos_is.z < 0.5) == self.near_half;
        Vec4::new(1.0, 1.0, 1.0, if filled { self.alpha } else { 0.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_context_rejects_short_upload() {
        let mut ctx = RecordingContext::new();
        let result = ctx.create_texture(&TextureDescriptor {
            label: "short",
            extent: TextureExtent::D2 {
                width: 4,
                height: 4,
            },
            format: TexelFormat::R8Unorm,
            filter: TextureFilter::Linear,
            wrap: crate::gpu::TextureWrap::ClampToEdge,
            data: &[0; 3],
        });
        assert!(result.is_err());
        assert_eq!(ctx.textures_created, 0);
    }

    #[test]
    fn test_cube_fixture_is_valid() {
        use volcast_core::Renderable;
        let volume = uniform_cube_volume(0, 10, 1, VolumeProperty::new());
        let image = volume.input_data().expect("fixture has input");
        assert!(image.validate().is_ok());
    }
}
