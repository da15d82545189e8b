pub mod compositor;
pub mod gpu;
pub mod jitter;
pub mod mapper;
pub mod resource_cache;
pub mod shader;
pub mod tables;
pub mod uniforms;
pub mod wgpu_context;

#[cfg(test)]
mod test_harness;

pub use compositor::{trace, TableSampler, VolumeSampler};
pub use gpu::{
    Capabilities, DrawCall, GpuContext, ProgramHandle, TexelFormat, TextureDescriptor,
    TextureExtent, TextureFilter, TextureHandle, TextureWrap,
};
pub use mapper::{FrameReport, MultiVolumeMapper, RenderPassState, ViewNode};
pub use shader::{ShaderKey, ShaderSource};
pub use wgpu_context::WgpuContext;
