//! Ray-start jitter tile.
//!
//! A `JITTER_SIZE` x `JITTER_SIZE` single-channel texture of hashed noise,
//! tiled over the screen with repeat wrapping. Each fragment offsets its
//! first sample by the tile value so neighbouring rays do not band.

use volcast_core::constants::JITTER_SIZE;
use volcast_core::VolcastError;

use crate::gpu::{
    GpuContext, TexelFormat, TextureDescriptor, TextureExtent, TextureFilter, TextureHandle,
    TextureWrap,
};

/// Hash a tile texel and seed into a well-mixed u32 (PCG-style rounds).
pub fn jitter_hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut state = x
        .wrapping_mul(0x9E3779B9)
        .wrapping_add(y.wrapping_mul(0x517CC1B7))
        .wrapping_add(seed.wrapping_mul(0x2545F491));

    state = state ^ (state >> 16);
    state = state.wrapping_mul(0x45D9F3B);
    state = state ^ (state >> 16);
    state = state.wrapping_mul(0x45D9F3B);
    state = state ^ (state >> 16);

    state
}

/// Map a hash to `[0, 1)` using its top 24 bits.
pub fn hash_to_unit(hash: u32) -> f32 {
    (hash >> 8) as f32 / 16_777_216.0
}

/// Tile texels, row-major, quantized to bytes.
pub fn jitter_texels(seed: u32) -> Vec<u8> {
    let size = JITTER_SIZE;
    let mut texels = Vec::with_capacity((size * size) as usize);
    for y in 0..size {
        for x in 0..size {
            let v = hash_to_unit(jitter_hash(x, y, seed));
            texels.push((v * 255.0).round() as u8);
        }
    }
    texels
}

/// GPU copy of the tile, rebuilt only when the seed changes.
#[derive(Debug, Default)]
pub struct JitterTexture {
    handle: Option<TextureHandle>,
    seed: Option<u32>,
}

impl JitterTexture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Option<TextureHandle> {
        self.handle
    }

    pub fn ensure(&mut self, ctx: &mut dyn GpuContext, seed: u32) -> Result<TextureHandle, VolcastError> {
        if let (Some(handle), Some(current)) = (self.handle, self.seed) {
            if current == seed {
                return Ok(handle);
            }
        }
        self.release(ctx);

        let texels = jitter_texels(seed);
        let handle = ctx.create_texture(&TextureDescriptor {
            label: "jitter-texture",
            extent: TextureExtent::D2 {
                width: JITTER_SIZE,
                height: JITTER_SIZE,
            },
            format: TexelFormat::R8Unorm,
            filter: TextureFilter::Linear,
            wrap: TextureWrap::Repeat,
            data: &texels,
        })?;
        log::debug!("Built jitter tile with seed {}", seed);
        self.handle = Some(handle);
        self.seed = Some(seed);
        Ok(handle)
    }

    pub fn release(&mut self, ctx: &mut dyn GpuContext) {
        if let Some(handle) = self.handle.take() {
            ctx.release_texture(handle);
        }
        self.seed = None;
    }
}
