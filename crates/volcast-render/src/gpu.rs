//! The GPU primitives the mapper relies on: build a texture from raw texels,
//! compile a program from generated sources, and draw one full-viewport quad.
//!
//! [`crate::wgpu_context::WgpuContext`] implements them on wgpu; tests use a
//! recording double.

use volcast_core::VolcastError;

use crate::shader::ShaderSource;

/// Opaque texture identifier issued by a [`GpuContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Opaque program identifier issued by a [`GpuContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

/// Texel formats used by scalar volumes, lookup tables and the jitter tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    R8Snorm,
    Rg8Snorm,
    Rgba8Snorm,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgba32Float,
}

impl TexelFormat {
    pub fn channels(self) -> usize {
        match self {
            TexelFormat::R8Unorm
            | TexelFormat::R8Snorm
            | TexelFormat::R16Float
            | TexelFormat::R32Float => 1,
            TexelFormat::Rg8Unorm
            | TexelFormat::Rg8Snorm
            | TexelFormat::Rg16Float
            | TexelFormat::Rg32Float => 2,
            TexelFormat::Rgba8Unorm
            | TexelFormat::Rgba8Snorm
            | TexelFormat::Rgba16Float
            | TexelFormat::Rgba32Float => 4,
        }
    }

    pub fn bytes_per_channel(self) -> usize {
        match self {
            TexelFormat::R8Unorm
            | TexelFormat::Rg8Unorm
            | TexelFormat::Rgba8Unorm
            | TexelFormat::R8Snorm
            | TexelFormat::Rg8Snorm
            | TexelFormat::Rgba8Snorm => 1,
            TexelFormat::R16Float | TexelFormat::Rg16Float | TexelFormat::Rgba16Float => 2,
            TexelFormat::R32Float | TexelFormat::Rg32Float | TexelFormat::Rgba32Float => 4,
        }
    }

    pub fn bytes_per_texel(self) -> usize {
        self.channels() * self.bytes_per_channel()
    }

    /// 32-bit float formats are only filterable with the matching device feature.
    pub fn is_float32(self) -> bool {
        self.bytes_per_channel() == 4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureWrap {
    ClampToEdge,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureExtent {
    D2 { width: u32, height: u32 },
    D3 { width: u32, height: u32, depth: u32 },
}

impl TextureExtent {
    pub fn texel_count(self) -> usize {
        match self {
            TextureExtent::D2 { width, height } => width as usize * height as usize,
            TextureExtent::D3 {
                width,
                height,
                depth,
            } => width as usize * height as usize * depth as usize,
        }
    }
}

/// Everything needed to build and fill one texture.
#[derive(Debug, Clone, Copy)]
pub struct TextureDescriptor<'a> {
    pub label: &'a str,
    pub extent: TextureExtent,
    pub format: TexelFormat,
    pub filter: TextureFilter,
    pub wrap: TextureWrap,
    /// Tightly packed texels, x fastest.
    pub data: &'a [u8],
}

impl TextureDescriptor<'_> {
    pub fn expected_bytes(&self) -> usize {
        self.extent.texel_count() * self.format.bytes_per_texel()
    }
}

/// Device features and limits that change which formats the mapper picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub float32_filterable: bool,
    pub max_texture_dimension_2d: u32,
    pub max_texture_dimension_3d: u32,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            float32_filterable: false,
            max_texture_dimension_2d: 8192,
            max_texture_dimension_3d: 2048,
        }
    }
}

/// One draw of the full-viewport quad with the volume program.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub program: ProgramHandle,
    pub frame_uniforms: &'a [u8],
    pub volume_uniforms: &'a [u8],
    pub jitter: TextureHandle,
    pub opacity_table: TextureHandle,
    pub color_table: TextureHandle,
    /// One scalar texture per volume, in volume order.
    pub scalar_textures: &'a [TextureHandle],
    pub depth: Option<TextureHandle>,
    pub vertex_count: u32,
    /// Reduced-resolution factor; 1.0 draws straight into the target.
    pub image_sample_distance: f32,
}

/// Black-box GPU operations. All calls block until the driver accepts them.
pub trait GpuContext {
    fn capabilities(&self) -> Capabilities;

    /// Size of the render target in pixels.
    fn target_size(&self) -> [u32; 2];

    fn create_texture(&mut self, desc: &TextureDescriptor<'_>) -> Result<TextureHandle, VolcastError>;

    /// Change the sampling filter without re-uploading texels.
    fn set_texture_filter(
        &mut self,
        handle: TextureHandle,
        filter: TextureFilter,
    ) -> Result<(), VolcastError>;

    fn release_texture(&mut self, handle: TextureHandle);

    fn compile_program(&mut self, source: &ShaderSource) -> Result<ProgramHandle, VolcastError>;

    fn release_program(&mut self, handle: ProgramHandle);

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), VolcastError>;
}
