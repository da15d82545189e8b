//! [`GpuContext`] on wgpu: textures and programs live in handle-keyed maps,
//! the volume pass draws into an offscreen `Rgba8Unorm` target.
//!
//! With an image sample distance above 1 the pass renders into a smaller
//! target first, which is then blitted over the full one with premultiplied
//! blending.

use std::collections::HashMap;

use volcast_core::constants::MAX_VOLUMES;
use volcast_core::VolcastError;

use crate::gpu::{
    Capabilities, DrawCall, GpuContext, ProgramHandle, TexelFormat, TextureDescriptor,
    TextureExtent, TextureFilter, TextureHandle, TextureWrap,
};
use crate::shader::{
    scalar_sampler_binding, scalar_texture_binding, ProgramLayout, ShaderSource,
    COLOR_SAMPLER_BINDING, COLOR_TABLE_BINDING, DEPTH_TEXTURE_BINDING, FRAME_BINDING,
    JITTER_SAMPLER_BINDING, JITTER_TEXTURE_BINDING, OPACITY_SAMPLER_BINDING,
    OPACITY_TABLE_BINDING, VOLUME_UNIFORM_BINDING,
};
use crate::uniforms::{FrameUniforms, VolumeUniforms};

pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const BLIT_WGSL: &str = r#"struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@group(0) @binding(0) var source_texture: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((vertex_index << 1u) & 2u), f32(vertex_index & 2u));
    var result: VertexOutput;
    result.position = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    result.uv = uv;
    return result;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(source_texture, source_sampler, input.uv);
}
"#;

/// Straight color in, premultiplied accumulation in the target.
const VOLUME_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
};

struct TextureEntry {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    filter: TextureFilter,
    wrap: TextureWrap,
}

struct ProgramEntry {
    pipeline: wgpu::RenderPipeline,
    frame_bgl: wgpu::BindGroupLayout,
    volume_bgl: wgpu::BindGroupLayout,
    layout: ProgramLayout,
}

struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: [u32; 2],
}

pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    caps: Capabilities,
    target: RenderTarget,
    reduced: Option<RenderTarget>,
    frame_buffer: wgpu::Buffer,
    volume_buffer: wgpu::Buffer,
    blit_pipeline: wgpu::RenderPipeline,
    blit_bgl: wgpu::BindGroupLayout,
    blit_sampler: wgpu::Sampler,
    samplers: HashMap<(TextureFilter, TextureWrap), wgpu::Sampler>,
    textures: HashMap<u64, TextureEntry>,
    depth_textures: HashMap<u64, wgpu::TextureView>,
    programs: HashMap<u64, ProgramEntry>,
    next_handle: u64,
}

impl WgpuContext {
    /// Headless context on the first suitable adapter. Blocks on the
    /// adapter and device requests.
    pub fn new(width: u32, height: u32) -> Result<Self, VolcastError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| VolcastError::AdapterNotFound("no suitable GPU adapter found".into()))?;

        log::info!("Volume adapter: {}", adapter.get_info().name);

        let required_features = adapter.features() & wgpu::Features::FLOAT32_FILTERABLE;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("volcast-device"),
                required_features,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| VolcastError::DeviceRequestFailed(e.to_string()))?;

        Ok(Self::from_device(device, queue, width, height))
    }

    /// Wrap an existing device. The target starts cleared to transparent.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Self {
        let limits = device.limits();
        let caps = Capabilities {
            float32_filterable: device.features().contains(wgpu::Features::FLOAT32_FILTERABLE),
            max_texture_dimension_2d: limits.max_texture_dimension_2d,
            max_texture_dimension_3d: limits.max_texture_dimension_3d,
        };
        log::info!(
            "GPU capabilities: float32 filtering {}, 2D {}, 3D {}",
            caps.float32_filterable,
            caps.max_texture_dimension_2d,
            caps.max_texture_dimension_3d
        );

        let target = Self::create_target(&device, "volume-target", [width, height]);

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame-uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let volume_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("volume-uniforms"),
            size: (MAX_VOLUMES * std::mem::size_of::<VolumeUniforms>()) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // -- Blit pipeline (reduced-resolution composite) --
        let blit_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blit-shader"),
            source: wgpu::ShaderSource::Wgsl(BLIT_WGSL.into()),
        });

        let blit_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blit-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let blit_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("blit-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let blit_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blit-pipeline-layout"),
            bind_group_layouts: &[&blit_bgl],
            push_constant_ranges: &[],
        });

        let blit_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("blit-pipeline"),
            layout: Some(&blit_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &blit_module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &blit_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
            cache: None,
        });

        let context = Self {
            device,
            queue,
            caps,
            target,
            reduced: None,
            frame_buffer,
            volume_buffer,
            blit_pipeline,
            blit_bgl,
            blit_sampler,
            samplers: HashMap::new(),
            textures: HashMap::new(),
            depth_textures: HashMap::new(),
            programs: HashMap::new(),
            next_handle: 1,
        };
        context.clear_target();
        context
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// View of the full-resolution color target.
    pub fn target_view(&self) -> &wgpu::TextureView {
        &self.target.view
    }

    /// Recreate the color target at a new size. Drops the reduced target.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.target.size == [width, height] {
            return;
        }
        self.target = Self::create_target(&self.device, "volume-target", [width, height]);
        self.reduced = None;
        self.clear_target();
    }

    /// Reset the target to transparent black.
    pub fn clear_target(&self) {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("clear-encoder"),
        });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Make an opaque depth buffer available to the volume pass. The texture
    /// must be created with `TEXTURE_BINDING` usage.
    pub fn register_depth_texture(&mut self, view: wgpu::TextureView) -> TextureHandle {
        let handle = self.allocate();
        self.depth_textures.insert(handle, view);
        TextureHandle(handle)
    }

    pub fn unregister_depth_texture(&mut self, handle: TextureHandle) {
        self.depth_textures.remove(&handle.0);
    }

    /// Copy the target back as tightly packed RGBA8 rows.
    pub fn read_pixels(&self) -> Result<Vec<u8>, VolcastError> {
        let [width, height] = self.target.size;
        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback-staging"),
            size: (padded * height) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback-encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| VolcastError::DrawFailed(e.to_string()))?
            .map_err(|e| VolcastError::DrawFailed(e.to_string()))?;

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        for row in data.chunks_exact(padded as usize) {
            pixels.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(data);
        staging.unmap();
        Ok(pixels)
    }

    // -- Private helpers --

    fn allocate(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn create_target(device: &wgpu::Device, label: &str, size: [u32; 2]) -> RenderTarget {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size[0].max(1),
                height: size[1].max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        RenderTarget {
            texture,
            view,
            size: [size[0].max(1), size[1].max(1)],
        }
    }

    fn sampler(&mut self, filter: TextureFilter, wrap: TextureWrap) -> &wgpu::Sampler {
        let device = &self.device;
        self.samplers.entry((filter, wrap)).or_insert_with(|| {
            let mode = match filter {
                TextureFilter::Nearest => wgpu::FilterMode::Nearest,
                TextureFilter::Linear => wgpu::FilterMode::Linear,
            };
            let address = match wrap {
                TextureWrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
                TextureWrap::Repeat => wgpu::AddressMode::Repeat,
            };
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("volcast-sampler"),
                address_mode_u: address,
                address_mode_v: address,
                address_mode_w: address,
                mag_filter: mode,
                min_filter: mode,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        })
    }

    fn ensure_reduced_target(&mut self, factor: f32) {
        let [width, height] = self.target.size;
        let size = [
            (width as f32 / factor).ceil() as u32,
            (height as f32 / factor).ceil() as u32,
        ];
        if self.reduced.as_ref().map(|t| t.size) != Some([size[0].max(1), size[1].max(1)]) {
            log::debug!("Reduced volume target {}x{} (factor {})", size[0], size[1], factor);
            self.reduced = Some(Self::create_target(&self.device, "reduced-volume-target", size));
        }
    }

    fn frame_layout(&self, depth: bool) -> wgpu::BindGroupLayout {
        let mut entries = vec![
            uniform_entry(FRAME_BINDING, wgpu::ShaderStages::VERTEX_FRAGMENT),
            texture_entry(JITTER_TEXTURE_BINDING, wgpu::TextureViewDimension::D2),
            sampler_entry(JITTER_SAMPLER_BINDING),
            texture_entry(OPACITY_TABLE_BINDING, wgpu::TextureViewDimension::D2),
            sampler_entry(OPACITY_SAMPLER_BINDING),
            texture_entry(COLOR_TABLE_BINDING, wgpu::TextureViewDimension::D2),
            sampler_entry(COLOR_SAMPLER_BINDING),
        ];
        if depth {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: DEPTH_TEXTURE_BINDING,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Depth,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame-bgl"),
            entries: &entries,
        })
    }

    fn volume_layout(&self, volume_count: usize) -> wgpu::BindGroupLayout {
        let mut entries = vec![uniform_entry(VOLUME_UNIFORM_BINDING, wgpu::ShaderStages::FRAGMENT)];
        for i in 0..volume_count {
            entries.push(texture_entry(scalar_texture_binding(i), wgpu::TextureViewDimension::D3));
            entries.push(sampler_entry(scalar_sampler_binding(i)));
        }
        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("volume-bgl"),
            entries: &entries,
        })
    }

    fn texture(&self, handle: TextureHandle) -> Result<&TextureEntry, VolcastError> {
        self.textures
            .get(&handle.0)
            .ok_or(VolcastError::UnknownHandle(handle.0))
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32, view_dimension: wgpu::TextureViewDimension) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn wgpu_format(format: TexelFormat) -> wgpu::TextureFormat {
    match format {
        TexelFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        TexelFormat::Rg8Unorm => wgpu::TextureFormat::Rg8Unorm,
        TexelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TexelFormat::R8Snorm => wgpu::TextureFormat::R8Snorm,
        TexelFormat::Rg8Snorm => wgpu::TextureFormat::Rg8Snorm,
        TexelFormat::Rgba8Snorm => wgpu::TextureFormat::Rgba8Snorm,
        TexelFormat::R16Float => wgpu::TextureFormat::R16Float,
        TexelFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
        TexelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TexelFormat::R32Float => wgpu::TextureFormat::R32Float,
        TexelFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
        TexelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
    }
}

impl GpuContext for WgpuContext {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn target_size(&self) -> [u32; 2] {
        self.target.size
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
        if desc.format.is_float32() && !self.caps.float32_filterable {
            return Err(VolcastError::TextureCreationFailed(format!(
                "{}: {:?} is not filterable on this device",
                desc.label, desc.format
            )));
        }

        let (size, dimension, view_dimension) = match desc.extent {
            TextureExtent::D2 { width, height } => (
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                wgpu::TextureDimension::D2,
                wgpu::TextureViewDimension::D2,
            ),
            TextureExtent::D3 {
                width,
                height,
                depth,
            } => (
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: depth,
                },
                wgpu::TextureDimension::D3,
                wgpu::TextureViewDimension::D3,
            ),
        };
        let limit = match dimension {
            wgpu::TextureDimension::D3 => self.caps.max_texture_dimension_3d,
            _ => self.caps.max_texture_dimension_2d,
        };
        if size.width.max(size.height).max(size.depth_or_array_layers) > limit {
            return Err(VolcastError::TextureCreationFailed(format!(
                "{}: {}x{}x{} exceeds the device limit {}",
                desc.label, size.width, size.height, size.depth_or_array_layers, limit
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format: wgpu_format(desc.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            desc.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.width * desc.format.bytes_per_texel() as u32),
                rows_per_image: Some(size.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(desc.label),
            dimension: Some(view_dimension),
            ..Default::default()
        });

        let handle = self.allocate();
        self.textures.insert(
            handle,
            TextureEntry {
                texture,
                view,
                filter: desc.filter,
                wrap: desc.wrap,
            },
        );
        Ok(TextureHandle(handle))
    }

    fn set_texture_filter(
        &mut self,
        handle: TextureHandle,
        filter: TextureFilter,
    ) -> Result<(), VolcastError> {
        let entry = self
            .textures
            .get_mut(&handle.0)
            .ok_or(VolcastError::UnknownHandle(handle.0))?;
        entry.filter = filter;
        Ok(())
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        if let Some(entry) = self.textures.remove(&handle.0) {
            entry.texture.destroy();
        }
    }

    fn compile_program(&mut self, source: &ShaderSource) -> Result<ProgramHandle, VolcastError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(source.label.as_str()),
            source: wgpu::ShaderSource::Wgsl(source.vertex.as_str().into()),
        });
        let fragment_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(source.label.as_str()),
            source: wgpu::ShaderSource::Wgsl(source.fragment.as_str().into()),
        });

        let frame_bgl = self.frame_layout(source.layout.depth_texture);
        let volume_bgl = self.volume_layout(source.layout.volume_count);
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("volume-pipeline-layout"),
            bind_group_layouts: &[&frame_bgl, &volume_bgl],
            push_constant_ranges: &[],
        });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(source.label.as_str()),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(VOLUME_BLEND),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(VolcastError::ShaderCompilationFailed(format!(
                "{}: {}",
                source.label, error
            )));
        }

        let handle = self.allocate();
        self.programs.insert(
            handle,
            ProgramEntry {
                pipeline,
                frame_bgl,
                volume_bgl,
                layout: source.layout,
            },
        );
        Ok(ProgramHandle(handle))
    }

    fn release_program(&mut self, handle: ProgramHandle) {
        self.programs.remove(&handle.0);
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), VolcastError> {
        let reduced = call.image_sample_distance > 1.0;
        if reduced {
            self.ensure_reduced_target(call.image_sample_distance);
        }

        // Samplers are created lazily, so fetch every combination first.
        let mut sampler_keys = Vec::new();
        for handle in [call.jitter, call.opacity_table, call.color_table]
            .iter()
            .chain(call.scalar_textures)
        {
            let entry = self.texture(*handle)?;
            sampler_keys.push((entry.filter, entry.wrap));
        }
        for &(filter, wrap) in &sampler_keys {
            self.sampler(filter, wrap);
        }

        let program = self
            .programs
            .get(&call.program.0)
            .ok_or(VolcastError::UnknownHandle(call.program.0))?;
        if program.layout.volume_count != call.scalar_textures.len() {
            return Err(VolcastError::DrawFailed(format!(
                "program expects {} volumes, draw supplies {}",
                program.layout.volume_count,
                call.scalar_textures.len()
            )));
        }
        if call.volume_uniforms.len() as u64 > self.volume_buffer.size() {
            return Err(VolcastError::DrawFailed(format!(
                "{} bytes of volume uniforms exceed the buffer",
                call.volume_uniforms.len()
            )));
        }
        let depth_view = match (program.layout.depth_texture, call.depth) {
            (false, _) => None,
            (true, Some(handle)) => Some(
                self.depth_textures
                    .get(&handle.0)
                    .ok_or(VolcastError::UnknownHandle(handle.0))?,
            ),
            (true, None) => {
                return Err(VolcastError::DrawFailed(
                    "program clips against depth but no depth texture is bound".into(),
                ))
            }
        };

        self.queue.write_buffer(&self.frame_buffer, 0, call.frame_uniforms);
        self.queue.write_buffer(&self.volume_buffer, 0, call.volume_uniforms);

        let view_of = |handle: TextureHandle| self.textures.get(&handle.0).map(|e| &e.view);
        let sampler_of = |handle: TextureHandle| {
            self.textures
                .get(&handle.0)
                .and_then(|e| self.samplers.get(&(e.filter, e.wrap)))
        };
        let missing = |handle: TextureHandle| VolcastError::UnknownHandle(handle.0);

        let mut frame_entries = vec![wgpu::BindGroupEntry {
            binding: FRAME_BINDING,
            resource: self.frame_buffer.as_entire_binding(),
        }];
        for (texture_binding, sampler_binding, handle) in [
            (JITTER_TEXTURE_BINDING, JITTER_SAMPLER_BINDING, call.jitter),
            (OPACITY_TABLE_BINDING, OPACITY_SAMPLER_BINDING, call.opacity_table),
            (COLOR_TABLE_BINDING, COLOR_SAMPLER_BINDING, call.color_table),
        ] {
            frame_entries.push(wgpu::BindGroupEntry {
                binding: texture_binding,
                resource: wgpu::BindingResource::TextureView(view_of(handle).ok_or(missing(handle))?),
            });
            frame_entries.push(wgpu::BindGroupEntry {
                binding: sampler_binding,
                resource: wgpu::BindingResource::Sampler(sampler_of(handle).ok_or(missing(handle))?),
            });
        }
        if let Some(view) = depth_view {
            frame_entries.push(wgpu::BindGroupEntry {
                binding: DEPTH_TEXTURE_BINDING,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }

        let mut volume_entries = vec![wgpu::BindGroupEntry {
            binding: VOLUME_UNIFORM_BINDING,
            resource: self.volume_buffer.as_entire_binding(),
        }];
        for (i, &handle) in call.scalar_textures.iter().enumerate() {
            volume_entries.push(wgpu::BindGroupEntry {
                binding: scalar_texture_binding(i),
                resource: wgpu::BindingResource::TextureView(view_of(handle).ok_or(missing(handle))?),
            });
            volume_entries.push(wgpu::BindGroupEntry {
                binding: scalar_sampler_binding(i),
                resource: wgpu::BindingResource::Sampler(sampler_of(handle).ok_or(missing(handle))?),
            });
        }

        let frame_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame-bg"),
            layout: &program.frame_bgl,
            entries: &frame_entries,
        });
        let volume_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("volume-bg"),
            layout: &program.volume_bgl,
            entries: &volume_entries,
        });

        let (volume_view, load) = match (reduced, self.reduced.as_ref()) {
            (true, Some(target)) => (&target.view, wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)),
            _ => (&self.target.view, wgpu::LoadOp::Load),
        };

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("volume-encoder"),
        });

        // 1. Volume pass: full-viewport quad
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("volume-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: volume_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &frame_bind_group, &[]);
            pass.set_bind_group(1, &volume_bind_group, &[]);
            pass.draw(0..call.vertex_count, 0..1);
        }

        // 2. Blit pass: reduced target over the full one
        if let (true, Some(target)) = (reduced, self.reduced.as_ref()) {
            let blit_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("blit-bg"),
                layout: &self.blit_bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&target.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.blit_sampler),
                    },
                ],
            });
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("blit-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.blit_pipeline);
            pass.set_bind_group(0, &blit_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

#[cfg(all(test, feature = "gpu_tests"))]
mod tests {
    use super::*;
    use crate::mapper::MultiVolumeMapper;
    use crate::test_harness::{constant_property, uniform_cube_volume};
    use glam::Vec3;
    use volcast_core::{Camera, MapperConfig, VolumeActor};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn camera() -> Camera {
        Camera {
            position: Vec3::new(4.5, 4.5, 50.0),
            focal_point: Vec3::new(4.5, 4.5, 0.0),
            parallel_projection: true,
            parallel_scale: 10.0,
            clipping_range: [1.0, 100.0],
            ..Default::default()
        }
    }

    fn alpha_at(pixels: &[u8], width: u32, x: u32, y: u32) -> u8 {
        pixels[((y * width + x) * 4 + 3) as usize]
    }

    #[test]
    fn test_invalid_wgsl_reports_compile_error() {
        init_logging();
        let mut ctx = WgpuContext::new(16, 16).expect("GPU adapter");
        let source = ShaderSource {
            label: "broken".into(),
            vertex: "fn vs_main( {".into(),
            fragment: "fn fs_main( {".into(),
            layout: ProgramLayout {
                volume_count: 1,
                depth_texture: false,
            },
        };
        let err = ctx.compile_program(&source).unwrap_err();
        assert!(matches!(err, VolcastError::ShaderCompilationFailed(_)), "got {err:?}");
    }

    #[test]
    fn test_cube_covers_center_not_corner() {
        init_logging();
        let mut ctx = WgpuContext::new(64, 64).expect("GPU adapter");
        let mut mapper = MultiVolumeMapper::new(MapperConfig::default()).expect("config");
        let volume = uniform_cube_volume(0, 10, 1, constant_property(0.5, [1.0, 0.0, 0.0], 1.0));
        let list: Vec<&dyn VolumeActor> = vec![&volume];

        let report = mapper.render(&mut ctx, &list, &camera(), &[]);
        assert!(report.drawn, "{report:?}");

        let pixels = ctx.read_pixels().expect("readback");
        assert!(alpha_at(&pixels, 64, 32, 32) > 200, "center of the cube is nearly opaque");
        assert_eq!(alpha_at(&pixels, 64, 1, 1), 0, "outside the cube stays clear");
        mapper.release_graphics_resources(&mut ctx);
    }

    #[test]
    fn test_reduced_resolution_still_covers_center() {
        init_logging();
        let mut ctx = WgpuContext::new(64, 64).expect("GPU adapter");
        let config = MapperConfig {
            image_sample_distance: 2.0,
            ..Default::default()
        };
        let mut mapper = MultiVolumeMapper::new(config).expect("config");
        let volume = uniform_cube_volume(0, 10, 1, constant_property(0.5, [1.0; 3], 1.0));
        let list: Vec<&dyn VolumeActor> = vec![&volume];

        assert!(mapper.render(&mut ctx, &list, &camera(), &[]).drawn);
        let pixels = ctx.read_pixels().expect("readback");
        assert!(alpha_at(&pixels, 64, 32, 32) > 200);
    }
}
