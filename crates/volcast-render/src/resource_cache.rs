//! Per-volume GPU state: the 3-D scalar texture and the stamps it was built from.

use half::f16;
use volcast_core::image::{ImageData, ScalarData};
use volcast_core::{Interpolation, ModifiedStamp, VolcastError, VolumeActor, VolumeId};

use crate::gpu::{
    Capabilities, GpuContext, TexelFormat, TextureDescriptor, TextureExtent, TextureFilter,
    TextureHandle, TextureWrap,
};

/// How texels relate to data values: `data = texel * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarTextureInfo {
    pub format: TexelFormat,
    pub dimensions: [u32; 3],
    pub components: usize,
    pub scale: [f32; 4],
    pub offset: [f32; 4],
}

/// GPU state kept for the volume at one index of the active list.
#[derive(Debug)]
pub struct VolumeRenderState {
    pub volume_id: VolumeId,
    pub scalar_texture: Option<TextureHandle>,
    pub scalar_stamp: Option<ModifiedStamp>,
    pub info: Option<ScalarTextureInfo>,
    pub filter: TextureFilter,
    /// Step count last reported as too large, so each change warns once.
    pub warned_samples: Option<u32>,
}

impl VolumeRenderState {
    fn new(volume_id: VolumeId) -> Self {
        Self {
            volume_id,
            scalar_texture: None,
            scalar_stamp: None,
            info: None,
            filter: TextureFilter::Linear,
            warned_samples: None,
        }
    }

    fn release(&mut self, ctx: &mut dyn GpuContext) {
        if let Some(handle) = self.scalar_texture.take() {
            log::debug!("Releasing scalar texture {:?} of volume {:?}", handle, self.volume_id);
            ctx.release_texture(handle);
        }
        self.scalar_stamp = None;
        self.info = None;
    }
}

pub fn filter_for(interpolation: Interpolation) -> TextureFilter {
    match interpolation {
        Interpolation::Nearest => TextureFilter::Nearest,
        Interpolation::Linear => TextureFilter::Linear,
    }
}

/// Owns every per-volume state of one mapper, indexed like the active list.
#[derive(Debug, Default)]
pub struct VolumeResourceCache {
    states: Vec<VolumeRenderState>,
}

impl VolumeResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, index: usize) -> Option<&VolumeRenderState> {
        self.states.get(index)
    }

    pub fn state_mut(&mut self, index: usize) -> Option<&mut VolumeRenderState> {
        self.states.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Drop state for volumes that left the active list. Entries whose index
    /// now holds a different volume are released too.
    pub fn retain_active(&mut self, ctx: &mut dyn GpuContext, active: &[VolumeId]) {
        for (index, state) in self.states.iter_mut().enumerate() {
            if active.get(index) != Some(&state.volume_id) {
                state.release(ctx);
            }
        }
        self.states.truncate(active.len());
        for (state, &id) in self.states.iter_mut().zip(active) {
            state.volume_id = id;
        }
    }

    /// Bring the scalar texture of `volume` (at `index`) up to date. Returns
    /// true if a texture was (re)built.
    pub fn sync(
        &mut self,
        ctx: &mut dyn GpuContext,
        index: usize,
        volume: &dyn VolumeActor,
    ) -> Result<bool, VolcastError> {
        let image = volume
            .input_data()
            .ok_or(VolcastError::MissingInput(index))?;

        while self.states.len() <= index {
            self.states.push(VolumeRenderState::new(volume.volume_id()));
        }
        let state = &mut self.states[index];
        if state.volume_id != volume.volume_id() {
            state.release(ctx);
            state.volume_id = volume.volume_id();
        }

        let filter = filter_for(volume.property().interpolation());
        let mut rebuilt = false;

        if image.stamp().is_newer_than(state.scalar_stamp) {
            image.validate()?;
            state.release(ctx);

            let (texels, info) = encode_scalars(image, &ctx.capabilities());
            let [width, height, depth] = info.dimensions;
            let handle = ctx.create_texture(&TextureDescriptor {
                label: "scalar-texture",
                extent: TextureExtent::D3 {
                    width,
                    height,
                    depth,
                },
                format: info.format,
                filter,
                wrap: TextureWrap::ClampToEdge,
                data: &texels,
            })?;
            log::debug!(
                "Uploaded scalar texture for volume {:?}: {}x{}x{} {:?}",
                state.volume_id,
                width,
                height,
                depth,
                info.format
            );

            state.scalar_texture = Some(handle);
            state.scalar_stamp = Some(image.stamp());
            state.info = Some(info);
            state.filter = filter;
            rebuilt = true;
        } else if state.filter != filter {
            if let Some(handle) = state.scalar_texture {
                ctx.set_texture_filter(handle, filter)?;
            }
            state.filter = filter;
        }

        Ok(rebuilt)
    }

    /// Release every texture (mapper teardown).
    pub fn release_all(&mut self, ctx: &mut dyn GpuContext) {
        for state in &mut self.states {
            state.release(ctx);
        }
        self.states.clear();
    }
}

fn format_for(channels: usize, kind: TexelKind) -> TexelFormat {
    match (kind, channels) {
        (TexelKind::Unorm8, 1) => TexelFormat::R8Unorm,
        (TexelKind::Unorm8, 2) => TexelFormat::Rg8Unorm,
        (TexelKind::Unorm8, _) => TexelFormat::Rgba8Unorm,
        (TexelKind::Snorm8, 1) => TexelFormat::R8Snorm,
        (TexelKind::Snorm8, 2) => TexelFormat::Rg8Snorm,
        (TexelKind::Snorm8, _) => TexelFormat::Rgba8Snorm,
        (TexelKind::Float16, 1) => TexelFormat::R16Float,
        (TexelKind::Float16, 2) => TexelFormat::Rg16Float,
        (TexelKind::Float16, _) => TexelFormat::Rgba16Float,
        (TexelKind::Float32, 1) => TexelFormat::R32Float,
        (TexelKind::Float32, 2) => TexelFormat::Rg32Float,
        (TexelKind::Float32, _) => TexelFormat::Rgba32Float,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TexelKind {
    Unorm8,
    Snorm8,
    Float16,
    Float32,
}

/// Convert a scalar buffer into texels, keeping the raw element type where
/// the GPU can filter it. Three components are padded to four channels.
///
/// Without float32 filtering, wide integers and floats are normalized per
/// component into f16, so values keep about 11 bits of the component range.
pub fn encode_scalars(image: &ImageData, caps: &Capabilities) -> (Vec<u8>, ScalarTextureInfo) {
    let components = image.components();
    let channels = if components == 3 { 4 } else { components };
    let voxels = image.voxel_count();
    let scalars = image.scalars();

    let kind = match scalars {
        ScalarData::U8(_) => TexelKind::Unorm8,
        ScalarData::I8(_) => TexelKind::Snorm8,
        _ if caps.float32_filterable => TexelKind::Float32,
        _ => TexelKind::Float16,
    };

    let mut scale = [1.0f32; 4];
    let mut offset = [0.0f32; 4];
    let format = format_for(channels, kind);
    let mut texels = Vec::with_capacity(voxels * format.bytes_per_texel());

    match (kind, scalars) {
        (TexelKind::Unorm8, ScalarData::U8(values)) => {
            scale = [255.0; 4];
            for voxel in values.chunks_exact(components) {
                texels.extend_from_slice(voxel);
                if channels > components {
                    texels.push(0);
                }
            }
        }
        (TexelKind::Snorm8, ScalarData::I8(values)) => {
            scale = [127.0; 4];
            for voxel in values.chunks_exact(components) {
                // -128 and -127 both map to -1.0 in snorm.
                texels.extend(voxel.iter().map(|&v| v as u8));
                if channels > components {
                    texels.push(0);
                }
            }
        }
        (TexelKind::Float32, _) => {
            for i in 0..voxels {
                for c in 0..channels {
                    let v = if c < components {
                        scalars.get(i * components + c) as f32
                    } else {
                        0.0
                    };
                    texels.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
        _ => {
            let ranges: Vec<[f64; 2]> = (0..components).map(|c| image.component_range(c)).collect();
            for (c, range) in ranges.iter().enumerate() {
                let width = range[1] - range[0];
                scale[c] = if width > 0.0 { width as f32 } else { 1.0 };
                offset[c] = range[0] as f32;
            }
            for i in 0..voxels {
                for c in 0..channels {
                    let v = if c < components {
                        let raw = scalars.get(i * components + c);
                        ((raw - offset[c] as f64) / scale[c] as f64) as f32
                    } else {
                        0.0
                    };
                    texels.extend_from_slice(&f16::from_f32(v).to_le_bytes());
                }
            }
        }
    }

    (
        texels,
        ScalarTextureInfo {
            format,
            dimensions: image.dimensions(),
            components,
            scale,
            offset,
        },
    )
}
