//! Combined transfer-function lookup tables.
//!
//! Row `v` belongs to volume `v`. Each independent component `c` owns columns
//! `[c * 2W, (c + 1) * 2W)`: the W samples followed by a copy of them, so
//! linear filtering at a segment edge never reaches the next component.

use volcast_core::transfer::lookup_range;
use volcast_core::{ModifiedStamp, TransferFunction, VolcastError, VolumeActor, VolumeId};

use crate::gpu::{
    GpuContext, TexelFormat, TextureDescriptor, TextureExtent, TextureFilter, TextureHandle,
    TextureWrap,
};

/// Opacity samples, one float per texel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct OpacityTable {
    pub width: usize,
    pub rows: usize,
    pub values: Vec<f32>,
}

impl OpacityTable {
    pub fn value(&self, row: usize, column: usize) -> f32 {
        self.values[row * self.width + column]
    }

    pub fn to_f32_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.values).to_vec()
    }

    pub fn to_u8(&self) -> Vec<u8> {
        self.values.iter().map(|&v| quantize(v)).collect()
    }
}

/// RGB samples, three floats per texel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTable {
    pub width: usize,
    pub rows: usize,
    pub values: Vec<f32>,
}

impl ColorTable {
    pub fn rgb(&self, row: usize, column: usize) -> [f32; 3] {
        let base = (row * self.width + column) * 3;
        [self.values[base], self.values[base + 1], self.values[base + 2]]
    }

    /// Quantize to RGBA8 with opaque alpha.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width * self.rows * 4);
        for rgb in self.values.chunks_exact(3) {
            out.extend(rgb.iter().map(|&v| quantize(v)));
            out.push(255);
        }
        out
    }
}

fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Number of table segments a volume needs.
fn segment_count(volume: &dyn VolumeActor) -> usize {
    let components = volume.input_data().map_or(1, |image| image.components());
    volume
        .property()
        .independent_component_count(components)
        .max(1)
}

/// Combined table width: the widest requirement across all volumes.
pub fn combined_width(volumes: &[&dyn VolumeActor], table_width: usize) -> usize {
    volumes
        .iter()
        .map(|v| table_width * 2 * segment_count(*v))
        .max()
        .unwrap_or(table_width * 2)
}

/// Exponent turning opacity per unit distance into opacity per sample step.
fn opacity_exponent(sample_distance: f32, unit_distance: f64) -> f64 {
    if unit_distance > 0.0 {
        sample_distance as f64 / unit_distance
    } else {
        1.0
    }
}

pub fn build_opacity_table(
    volumes: &[&dyn VolumeActor],
    table_width: usize,
    sample_distance: f32,
) -> OpacityTable {
    let width = combined_width(volumes, table_width);
    let rows = volumes.len().max(1);
    let mut values = vec![0.0f32; width * rows];
    let mut scratch = vec![0.0f32; table_width];

    for (row, volume) in volumes.iter().enumerate() {
        let property = volume.property();
        for c in 0..segment_count(*volume) {
            let function = property.scalar_opacity(c);
            let [min, max] = lookup_range(function.range());
            function.table(min, max, table_width, &mut scratch, 1);

            let exponent = opacity_exponent(sample_distance, property.scalar_opacity_unit_distance(c));
            if exponent != 1.0 {
                for v in scratch.iter_mut() {
                    *v = (1.0 - (1.0 - *v as f64).powf(exponent)) as f32;
                }
            }

            let start = row * width + c * 2 * table_width;
            values[start..start + table_width].copy_from_slice(&scratch);
            values[start + table_width..start + 2 * table_width].copy_from_slice(&scratch);
        }
    }

    OpacityTable {
        width,
        rows,
        values,
    }
}

pub fn build_color_table(volumes: &[&dyn VolumeActor], table_width: usize) -> ColorTable {
    let width = combined_width(volumes, table_width);
    let rows = volumes.len().max(1);
    let mut values = vec![0.0f32; width * rows * 3];
    let mut scratch = vec![0.0f32; table_width * 3];

    for (row, volume) in volumes.iter().enumerate() {
        let property = volume.property();
        for c in 0..segment_count(*volume) {
            let function = property.rgb_transfer_function(c);
            let [min, max] = lookup_range(function.range());
            function.table(min, max, table_width, &mut scratch, 3);

            let start = (row * width + c * 2 * table_width) * 3;
            let len = table_width * 3;
            values[start..start + len].copy_from_slice(&scratch);
            values[start + len..start + 2 * len].copy_from_slice(&scratch);
        }
    }

    ColorTable {
        width,
        rows,
        values,
    }
}

/// What a table was built from; a different signature means rebuild.
#[derive(Debug, Clone, PartialEq)]
struct TableSignature {
    entries: Vec<(VolumeId, ModifiedStamp, usize)>,
    table_width: usize,
    sample_distance: f32,
    float_table: bool,
}

impl TableSignature {
    fn new(volumes: &[&dyn VolumeActor], table_width: usize) -> Self {
        Self {
            entries: volumes
                .iter()
                .map(|v| (v.volume_id(), v.property().stamp(), segment_count(*v)))
                .collect(),
            table_width,
            sample_distance: 0.0,
            float_table: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableUpdate {
    pub opacity_rebuilt: bool,
    pub color_rebuilt: bool,
}

/// GPU copies of the combined tables plus the CPU data they came from.
#[derive(Debug, Default)]
pub struct TransferTables {
    opacity_texture: Option<TextureHandle>,
    color_texture: Option<TextureHandle>,
    opacity_signature: Option<TableSignature>,
    color_signature: Option<TableSignature>,
    opacity: Option<OpacityTable>,
    color: Option<ColorTable>,
    fallback_logged: bool,
}

impl TransferTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opacity_texture(&self) -> Option<TextureHandle> {
        self.opacity_texture
    }

    pub fn color_texture(&self) -> Option<TextureHandle> {
        self.color_texture
    }

    pub fn opacity(&self) -> Option<&OpacityTable> {
        self.opacity.as_ref()
    }

    pub fn color(&self) -> Option<&ColorTable> {
        self.color.as_ref()
    }

    /// Texel width of the combined tables currently on the GPU.
    pub fn width(&self) -> usize {
        self.opacity.as_ref().map_or(0, |t| t.width)
    }

    /// Rebuild whichever table no longer matches the volumes' properties.
    pub fn update(
        &mut self,
        ctx: &mut dyn GpuContext,
        volumes: &[&dyn VolumeActor],
        table_width: usize,
        sample_distance: f32,
    ) -> Result<TableUpdate, VolcastError> {
        let caps = ctx.capabilities();
        let width = combined_width(volumes, table_width);
        if width > caps.max_texture_dimension_2d as usize {
            return Err(VolcastError::InvalidConfig(format!(
                "transfer table width {} exceeds the device limit {}",
                width, caps.max_texture_dimension_2d
            )));
        }

        let mut update = TableUpdate::default();

        let mut opacity_signature = TableSignature::new(volumes, table_width);
        opacity_signature.sample_distance = sample_distance;
        opacity_signature.float_table = caps.float32_filterable;
        if self.opacity_signature.as_ref() != Some(&opacity_signature) {
            let table = build_opacity_table(volumes, table_width, sample_distance);
            let (format, bytes) = if caps.float32_filterable {
                (TexelFormat::R32Float, table.to_f32_bytes())
            } else {
                if !self.fallback_logged {
                    log::warn!("Float32 filtering unavailable, using 8-bit opacity tables");
                    self.fallback_logged = true;
                }
                (TexelFormat::R8Unorm, table.to_u8())
            };
            if let Some(old) = self.opacity_texture.take() {
                ctx.release_texture(old);
            }
            self.opacity_texture = Some(ctx.create_texture(&TextureDescriptor {
                label: "opacity-table",
                extent: TextureExtent::D2 {
                    width: table.width as u32,
                    height: table.rows as u32,
                },
                format,
                filter: TextureFilter::Linear,
                wrap: TextureWrap::ClampToEdge,
                data: &bytes,
            })?);
            log::info!(
                "Built opacity table {}x{} ({:?})",
                table.width,
                table.rows,
                format
            );
            self.opacity = Some(table);
            self.opacity_signature = Some(opacity_signature);
            update.opacity_rebuilt = true;
        }

        let color_signature = TableSignature::new(volumes, table_width);
        if self.color_signature.as_ref() != Some(&color_signature) {
            let table = build_color_table(volumes, table_width);
            let bytes = table.to_rgba8();
            if let Some(old) = self.color_texture.take() {
                ctx.release_texture(old);
            }
            self.color_texture = Some(ctx.create_texture(&TextureDescriptor {
                label: "color-table",
                extent: TextureExtent::D2 {
                    width: table.width as u32,
                    height: table.rows as u32,
                },
                format: TexelFormat::Rgba8Unorm,
                filter: TextureFilter::Linear,
                wrap: TextureWrap::ClampToEdge,
                data: &bytes,
            })?);
            log::info!("Built color table {}x{}", table.width, table.rows);
            self.color = Some(table);
            self.color_signature = Some(color_signature);
            update.color_rebuilt = true;
        }

        Ok(update)
    }

    pub fn release(&mut self, ctx: &mut dyn GpuContext) {
        if let Some(handle) = self.opacity_texture.take() {
            ctx.release_texture(handle);
        }
        if let Some(handle) = self.color_texture.take() {
            ctx.release_texture(handle);
        }
        self.opacity_signature = None;
        self.color_signature = None;
        self.opacity = None;
        self.color = None;
    }
}
