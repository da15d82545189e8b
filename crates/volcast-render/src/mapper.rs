//! The multi-volume mapper: per frame it syncs scalar textures, rebuilds the
//! lookup tables and the program when their inputs changed, binds uniforms
//! and issues one full-viewport draw compositing every active volume.
//!
//! Nothing fails out of a frame. Precondition violations are logged and the
//! draw is skipped; the [`FrameReport`] says why.

use volcast_core::constants::{IMAGE_SAMPLE_DISTANCE_THRESHOLD, MAX_VOLUMES, QUAD_VERTEX_COUNT};
use volcast_core::{Camera, Light, MapperConfig, Scene, VolcastError, VolumeActor};

use crate::gpu::{DrawCall, GpuContext, ProgramHandle, TextureHandle};
use crate::jitter::JitterTexture;
use crate::resource_cache::VolumeResourceCache;
use crate::shader::key::active_lights;
use crate::shader::{compute_light_complexity, synthesize, ShaderKey, VolumeShaderConfig};
use crate::tables::{TableUpdate, TransferTables};
use crate::uniforms::{frame_uniforms, max_samples, volume_uniforms, ViewParams, VolumeUniforms};

/// What one call to [`MultiVolumeMapper::render`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub volume_count: usize,
    pub drawn: bool,
    pub program_compiled: bool,
    /// Scalar textures (re)uploaded this frame.
    pub textures_uploaded: usize,
    pub tables: TableUpdate,
    /// Why the draw was skipped, if it was skipped because of an error.
    pub skipped: Option<String>,
}

/// State handed between the passes of one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderPassState {
    /// Volumes reported by every node during the query pass.
    pub volume_count: usize,
    /// Depth texture of the opaque geometry rendered so far.
    pub zbuffer: Option<TextureHandle>,
}

/// Scene-graph node driven through the passes of a frame in order:
/// build, query, opaque z-buffer, volume prepass, volume.
pub trait ViewNode {
    fn build_pass(&mut self, pass: &mut RenderPassState);

    fn query_pass(&mut self, scene: &Scene, pass: &mut RenderPassState);

    fn opaque_zbuffer_pass(&mut self, pass: &RenderPassState);

    /// The prepass only reads `pass`; the main pass renders and reports.
    fn volume_pass(
        &mut self,
        prepass: bool,
        ctx: &mut dyn GpuContext,
        scene: &Scene,
        pass: &RenderPassState,
    ) -> Option<FrameReport>;
}

#[derive(Debug)]
struct CompiledProgram {
    key: ShaderKey,
    handle: ProgramHandle,
}

pub struct MultiVolumeMapper {
    config: MapperConfig,
    cache: VolumeResourceCache,
    tables: TransferTables,
    jitter: JitterTexture,
    program: Option<CompiledProgram>,
    zbuffer: Option<TextureHandle>,
    pass_volume_count: usize,
}

impl MultiVolumeMapper {
    pub fn new(config: MapperConfig) -> Result<Self, VolcastError> {
        config.validate()?;
        Ok(Self {
            config,
            cache: VolumeResourceCache::new(),
            tables: TransferTables::new(),
            jitter: JitterTexture::new(),
            program: None,
            zbuffer: None,
            pass_volume_count: 0,
        })
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn resource_cache(&self) -> &VolumeResourceCache {
        &self.cache
    }

    pub fn transfer_tables(&self) -> &TransferTables {
        &self.tables
    }

    pub fn program_key(&self) -> Option<&ShaderKey> {
        self.program.as_ref().map(|p| &p.key)
    }

    /// Volume count the last query pass reported.
    pub fn pass_volume_count(&self) -> usize {
        self.pass_volume_count
    }

    /// Use `zbuffer` to clip rays against opaque geometry on the next frames.
    /// Ignored unless `intermix_opaque_geometry` is set.
    pub fn set_opaque_zbuffer(&mut self, zbuffer: Option<TextureHandle>) {
        self.zbuffer = if self.config.intermix_opaque_geometry {
            zbuffer
        } else {
            None
        };
    }

    /// Render `volumes` into the context's target.
    pub fn render(
        &mut self,
        ctx: &mut dyn GpuContext,
        volumes: &[&dyn VolumeActor],
        camera: &Camera,
        lights: &[Light],
    ) -> FrameReport {
        let mut report = FrameReport {
            volume_count: volumes.len(),
            ..Default::default()
        };
        if volumes.is_empty() {
            log::debug!("No volumes, skipping volume pass");
            return report;
        }

        match self.draw_frame(ctx, volumes, camera, lights, &mut report) {
            Ok(()) => report.drawn = true,
            Err(e) => {
                log::error!("Skipping volume draw of {} volumes: {}", volumes.len(), e);
                report.skipped = Some(e.to_string());
            }
        }
        report
    }

    fn draw_frame(
        &mut self,
        ctx: &mut dyn GpuContext,
        volumes: &[&dyn VolumeActor],
        camera: &Camera,
        lights: &[Light],
        report: &mut FrameReport,
    ) -> Result<(), VolcastError> {
        check_inputs(volumes)?;

        let ids: Vec<_> = volumes.iter().map(|v| v.volume_id()).collect();
        self.cache.retain_active(ctx, &ids);
        for (index, volume) in volumes.iter().enumerate() {
            if self.cache.sync(ctx, index, *volume)? {
                report.textures_uploaded += 1;
            }
        }

        let sample_distance = self.config.sample_distance;
        report.tables = self.tables.update(
            ctx,
            volumes,
            self.config.table_width as usize,
            sample_distance,
        )?;
        let jitter = self.jitter.ensure(ctx, self.config.jitter_seed)?;

        let key = self.shader_key(volumes, lights);
        report.program_compiled = self.ensure_program(ctx, &key)?;
        let program = self
            .program
            .as_ref()
            .map(|p| p.handle)
            .ok_or_else(|| VolcastError::ShaderCompilationFailed("no program".into()))?;

        let image_sample_distance = if self.config.image_sample_distance > IMAGE_SAMPLE_DISTANCE_THRESHOLD {
            self.config.image_sample_distance
        } else {
            1.0
        };
        let view = ViewParams::new(camera, ctx.target_size());
        let active = active_lights(lights);
        let frame = frame_uniforms(
            &view,
            &active,
            sample_distance,
            self.tables.width(),
            image_sample_distance,
        );

        let mut volume_block: Vec<VolumeUniforms> = Vec::with_capacity(volumes.len());
        let mut scalar_textures = Vec::with_capacity(volumes.len());
        for (index, volume) in volumes.iter().enumerate() {
            let state = self
                .cache
                .state(index)
                .ok_or(VolcastError::MissingInput(index))?;
            let (Some(info), Some(texture)) = (state.info.as_ref(), state.scalar_texture) else {
                return Err(VolcastError::MissingInput(index));
            };
            volume_block.push(volume_uniforms(*volume, info, &view, index, volumes.len())?);
            scalar_textures.push(texture);
        }

        let (Some(opacity_table), Some(color_table)) =
            (self.tables.opacity_texture(), self.tables.color_texture())
        else {
            return Err(VolcastError::TextureCreationFailed("transfer tables missing".into()));
        };

        ctx.draw(&DrawCall {
            program,
            frame_uniforms: bytemuck::bytes_of(&frame),
            volume_uniforms: bytemuck::cast_slice(&volume_block),
            jitter,
            opacity_table,
            color_table,
            scalar_textures: &scalar_textures,
            depth: if key.zbuffer_intermix { self.zbuffer } else { None },
            vertex_count: QUAD_VERTEX_COUNT,
            image_sample_distance,
        })
    }

    /// Build the program key, warning once per change about volumes whose
    /// step count exceeds the configured maximum.
    fn shader_key(&mut self, volumes: &[&dyn VolumeActor], lights: &[Light]) -> ShaderKey {
        let any_shade = volumes.iter().any(|v| v.property().shade());
        let mut configs = Vec::with_capacity(volumes.len());

        for (index, volume) in volumes.iter().enumerate() {
            let samples = max_samples(*volume, self.config.sample_distance);
            if let Some(state) = self.cache.state_mut(index) {
                if samples > self.config.max_samples_warning {
                    if state.warned_samples != Some(samples) {
                        log::warn!(
                            "Volume {:?} needs {} samples per ray, above the limit of {}; sampling will be coarse",
                            volume.volume_id(),
                            samples,
                            self.config.max_samples_warning
                        );
                        state.warned_samples = Some(samples);
                    }
                } else {
                    state.warned_samples = None;
                }
            }
            let samples = samples.min(self.config.max_samples_warning.max(1));

            let property = volume.property();
            let (components, data_stamp) = volume
                .input_data()
                .map_or((1, Default::default()), |image| (image.components(), image.stamp()));
            configs.push(VolumeShaderConfig {
                volume_id: volume.volume_id(),
                components,
                independent: property.independent_components(),
                interpolation: property.interpolation(),
                gradient_opacity: property.uses_gradient_opacity(components),
                shade: property.shade(),
                max_samples: samples,
                data_stamp,
                property_stamp: property.stamp(),
            });
        }

        ShaderKey {
            volumes: configs,
            light_complexity: compute_light_complexity(any_shade, lights),
            zbuffer_intermix: self.config.intermix_opaque_geometry && self.zbuffer.is_some(),
            table_width: self.config.table_width,
        }
    }

    /// Compile a program for `key` unless the current one already matches.
    fn ensure_program(&mut self, ctx: &mut dyn GpuContext, key: &ShaderKey) -> Result<bool, VolcastError> {
        if self.program.as_ref().is_some_and(|p| &p.key == key) {
            return Ok(false);
        }
        if let Some(old) = self.program.take() {
            ctx.release_program(old.handle);
        }

        let source = synthesize(key);
        let handle = ctx.compile_program(&source)?;
        log::info!(
            "Compiled {} for {} volumes (light complexity {})",
            source.label,
            key.volume_count(),
            key.light_complexity.level()
        );
        self.program = Some(CompiledProgram {
            key: key.clone(),
            handle,
        });
        Ok(true)
    }

    /// Free every GPU resource this mapper owns.
    pub fn release_graphics_resources(&mut self, ctx: &mut dyn GpuContext) {
        self.cache.release_all(ctx);
        self.tables.release(ctx);
        self.jitter.release(ctx);
        if let Some(program) = self.program.take() {
            ctx.release_program(program.handle);
        }
        log::debug!("Released volume mapper resources");
    }
}

/// Reject the frame before anything is uploaded.
fn check_inputs(volumes: &[&dyn VolumeActor]) -> Result<(), VolcastError> {
    if volumes.len() > MAX_VOLUMES {
        return Err(VolcastError::TooManyVolumes {
            count: volumes.len(),
            max: MAX_VOLUMES,
        });
    }
    for (index, volume) in volumes.iter().enumerate() {
        volume
            .input_data()
            .ok_or(VolcastError::MissingInput(index))?
            .validate()?;
    }
    Ok(())
}

impl ViewNode for MultiVolumeMapper {
    fn build_pass(&mut self, pass: &mut RenderPassState) {
        pass.zbuffer = None;
        self.zbuffer = None;
    }

    fn query_pass(&mut self, scene: &Scene, pass: &mut RenderPassState) {
        pass.volume_count += scene.volumes().len();
    }

    fn opaque_zbuffer_pass(&mut self, pass: &RenderPassState) {
        self.set_opaque_zbuffer(pass.zbuffer);
    }

    fn volume_pass(
        &mut self,
        prepass: bool,
        ctx: &mut dyn GpuContext,
        scene: &Scene,
        pass: &RenderPassState,
    ) -> Option<FrameReport> {
        if prepass {
            self.pass_volume_count = pass.volume_count;
            self.set_opaque_zbuffer(pass.zbuffer);
            return None;
        }
        Some(self.render(ctx, &scene.volume_actors(), &scene.camera, &scene.lights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{apply_blend, IndexSpaceRay, TracedVolume};
    use crate::test_harness::{constant_property, uniform_cube_volume, HalfSlabSampler, RecordingContext};
    use bytemuck::Zeroable;
    use glam::{Vec3, Vec4};
    use volcast_core::{ImageData, Renderable, ScalarData, Volume, VolumeId, VolumeProperty};

    fn camera() -> Camera {
        Camera {
            position: Vec3::new(4.5, 4.5, 50.0),
            focal_point: Vec3::new(4.5, 4.5, 0.0),
            clipping_range: [1.0, 100.0],
            ..Default::default()
        }
    }

    fn shaded_property() -> VolumeProperty {
        let mut property = constant_property(0.5, [1.0; 3], 1.0);
        property.set_shade(true);
        property
    }

    fn actors(volumes: &[Volume]) -> Vec<&dyn VolumeActor> {
        volumes.iter().map(|v| v as &dyn VolumeActor).collect()
    }

    fn mapper() -> MultiVolumeMapper {
        MultiVolumeMapper::new(MapperConfig::default()).expect("default config")
    }

    #[test]
    fn test_zero_volumes_no_draw_no_allocation() {
        let mut ctx = RecordingContext::new();
        let mut mapper = mapper();
        let report = mapper.render(&mut ctx, &[], &camera(), &[Light::headlight()]);
        assert!(!report.drawn);
        assert_eq!(report.skipped, None, "nothing to render is not an error");
        assert!(ctx.draws.is_empty());
        assert_eq!(ctx.textures_created, 0);
        assert_eq!(ctx.programs_compiled, 0);
    }

    #[test]
    fn test_repeat_frames_reuse_resources() {
        let mut ctx = RecordingContext::new();
        let mut mapper = mapper();
        let volumes = vec![
            uniform_cube_volume(0, 10, 1, constant_property(0.5, [1.0; 3], 1.0)),
            uniform_cube_volume(1, 8, 1, constant_property(0.2, [0.5; 3], 1.0)),
        ];
        let list = actors(&volumes);

        let first = mapper.render(&mut ctx, &list, &camera(), &[]);
        assert!(first.drawn, "first frame draws: {:?}", first.skipped);
        assert!(first.program_compiled);
        assert_eq!(first.textures_uploaded, 2);
        let created = ctx.textures_created;
        let handles = ctx.draws[0].scalar_textures.clone();

        for _ in 0..3 {
            let report = mapper.render(&mut ctx, &list, &camera(), &[]);
            assert!(report.drawn);
            assert!(!report.program_compiled);
            assert_eq!(report.textures_uploaded, 0);
            assert_eq!(report.tables, TableUpdate::default());
        }
        assert_eq!(ctx.textures_created, created, "no reallocation without stamp changes");
        assert_eq!(ctx.programs_compiled, 1);
        assert_eq!(ctx.draws.len(), 4);
        assert_eq!(ctx.draws[3].scalar_textures, handles);
        assert_eq!(ctx.draws[3].volume_bytes, 2 * std::mem::size_of::<VolumeUniforms>());
    }

    #[test]
    fn test_unchanged_light_intensity_keeps_program() {
        let mut ctx = RecordingContext::new();
        let mut mapper = mapper();
        let volumes = vec![uniform_cube_volume(0, 10, 1, shaded_property())];
        let list = actors(&volumes);
        let mut light = Light::headlight();

        mapper.render(&mut ctx, &list, &camera(), std::slice::from_ref(&light));
        light.intensity = 1.0;
        let report = mapper.render(&mut ctx, &list, &camera(), std::slice::from_ref(&light));
        assert!(!report.program_compiled);
        assert_eq!(ctx.programs_compiled, 1);
    }

    #[test]
    fn test_second_light_recompiles() {
        let mut ctx = RecordingContext::new();
        let mut mapper = mapper();
        let volumes = vec![uniform_cube_volume(0, 10, 1, shaded_property())];
        let list = actors(&volumes);

        mapper.render(&mut ctx, &list, &camera(), &[Light::headlight()]);
        let report = mapper.render(
            &mut ctx,
            &list,
            &camera(),
            &[Light::headlight(), Light::headlight()],
        );
        assert!(report.program_compiled, "complexity went from headlight to directional");
        assert_eq!(ctx.programs_compiled, 2);
        assert_eq!(ctx.programs_released, 1, "old program released before the new one");
        assert!(ctx.sources[1].fragment.contains("light_count"));
    }

    #[test]
    fn test_missing_input_skips_draw_before_upload() {
        let mut ctx = RecordingContext::new();
        let mut mapper = mapper();
        let volumes = vec![
            uniform_cube_volume(0, 4, 1, VolumeProperty::new()),
            Volume::new(VolumeId(1), None, VolumeProperty::new()),
        ];
        let report = mapper.render(&mut ctx, &actors(&volumes), &camera(), &[]);
        assert!(!report.drawn);
        assert!(report.skipped.as_deref().is_some_and(|s| s.contains("no input")), "{report:?}");
        assert_eq!(ctx.textures_created, 0);
        assert!(ctx.draws.is_empty());
    }

    #[test]
    fn test_size_mismatch_skips_draw() {
        let mut ctx = RecordingContext::new();
        let mut mapper = mapper();
        let bad = ImageData::new([4, 4, 4], 1, ScalarData::U8(vec![0; 63]));
        let volumes = vec![Volume::new(VolumeId(0), Some(bad), VolumeProperty::new())];
        let report = mapper.render(&mut ctx, &actors(&volumes), &camera(), &[]);
        assert!(!report.drawn);
        assert!(report.skipped.is_some());
        assert_eq!(ctx.textures_created, 0);
    }

    #[test]
    fn test_too_many_volumes_rejected() {
        let mut ctx = RecordingContext::new();
        let mut mapper = mapper();
        let volumes: Vec<Volume> = (0..MAX_VOLUMES as u32 + 1)
            .map(|i| uniform_cube_volume(i, 2, 1, VolumeProperty::new()))
            .collect();
        let report = mapper.render(&mut ctx, &actors(&volumes), &camera(), &[]);
        assert!(!report.drawn);
        assert!(ctx.draws.is_empty());
    }

    #[test]
    fn test_compile_failure_skips_frame_then_recovers() {
        let mut ctx = RecordingContext::new();
        let mut mapper = mapper();
        let volumes = vec![uniform_cube_volume(0, 4, 1, VolumeProperty::new())];
        let list = actors(&volumes);

        ctx.fail_next_compile = Some("bad".into());
        let failed = mapper.render(&mut ctx, &list, &camera(), &[]);
        assert!(!failed.drawn);
        assert!(mapper.program_key().is_none());

        let report = mapper.render(&mut ctx, &list, &camera(), &[]);
        assert!(report.drawn && report.program_compiled);
    }

    #[test]
    fn test_property_edit_rebuilds_tables_and_program() {
        let mut ctx = RecordingContext::new();
        let mut mapper = mapper();
        let mut volumes = vec![uniform_cube_volume(0, 4, 1, constant_property(0.5, [1.0; 3], 1.0))];
        mapper.render(&mut ctx, &actors(&volumes), &camera(), &[]);

        volumes[0].property_mut().set_scalar_opacity_unit_distance(0, 2.0);
        let report = mapper.render(&mut ctx, &actors(&volumes), &camera(), &[]);
        assert!(report.tables.opacity_rebuilt);
        assert!(report.program_compiled);
        assert_eq!(report.textures_uploaded, 0, "scalar data untouched");
    }

    #[test]
    fn test_sample_warning_recorded_once_per_change() {
        let mut ctx = RecordingContext::new();
        let config = MapperConfig {
            max_samples_warning: 5,
            ..Default::default()
        };
        let mut mapper = MultiVolumeMapper::new(config).expect("config");
        let volumes = vec![uniform_cube_volume(0, 11, 1, VolumeProperty::new())];
        let list = actors(&volumes);

        mapper.render(&mut ctx, &list, &camera(), &[]);
        let warned = mapper.resource_cache().state(0).and_then(|s| s.warned_samples);
        assert_eq!(warned, Some(18));
        let key = mapper.program_key().expect("compiled");
        assert_eq!(key.volumes[0].max_samples, 5, "loop bound clamped to the limit");

        // The clamped loop walks wider steps and still matches the full march.
        let ray = IndexSpaceRay {
            start_is: Vec3::new(0.5, 0.5, 0.0),
            end_is: Vec3::new(0.5, 0.5, 1.0),
            sample_distance_is: 1.0 / 18.0,
        };
        for near_half in [true, false] {
            let sampler = HalfSlabSampler {
                alpha: 0.15,
                near_half,
            };
            let alpha = |max_samples| {
                let traced = TracedVolume {
                    uniforms: VolumeUniforms::zeroed(),
                    max_samples,
                };
                apply_blend(0, &traced, &sampler, &ray, 0.5, Vec4::ZERO).w
            };
            let full = alpha(18);
            let capped = alpha(key.volumes[0].max_samples);
            assert!(
                (full - capped).abs() < 0.03,
                "near_half {near_half}: capped {capped} vs full {full}"
            );
        }

        let report = mapper.render(&mut ctx, &list, &camera(), &[]);
        assert!(report.drawn, "warning is not an error");
    }

    #[test]
    fn test_reduced_resolution_above_threshold() {
        let mut ctx = RecordingContext::new();
        let volumes = vec![uniform_cube_volume(0, 4, 1, VolumeProperty::new())];
        for (factor, expected) in [(1.4, 1.0), (2.0, 2.0)] {
            let config = MapperConfig {
                image_sample_distance: factor,
                ..Default::default()
            };
            let mut mapper = MultiVolumeMapper::new(config).expect("config");
            mapper.render(&mut ctx, &actors(&volumes), &camera(), &[]);
            let draw = ctx.draws.last().expect("drawn");
            assert_eq!(draw.image_sample_distance, expected, "factor {factor}");
        }
    }

    #[test]
    fn test_release_frees_everything() {
        let mut ctx = RecordingContext::new();
        let mut mapper = mapper();
        let volumes = vec![uniform_cube_volume(0, 4, 1, VolumeProperty::new())];
        mapper.render(&mut ctx, &actors(&volumes), &camera(), &[]);
        assert!(ctx.live_textures() > 0);

        mapper.release_graphics_resources(&mut ctx);
        assert_eq!(ctx.live_textures(), 0);
        assert_eq!(ctx.programs_released, 1);
        assert!(mapper.resource_cache().is_empty());

        let report = mapper.render(&mut ctx, &actors(&volumes), &camera(), &[]);
        assert!(report.drawn && report.program_compiled, "resources rebuilt lazily");
    }

    #[test]
    fn test_dropped_volume_texture_released() {
        let mut ctx = RecordingContext::new();
        let mut mapper = mapper();
        let volumes = vec![
            uniform_cube_volume(0, 4, 1, VolumeProperty::new()),
            uniform_cube_volume(1, 4, 1, VolumeProperty::new()),
        ];
        mapper.render(&mut ctx, &actors(&volumes), &camera(), &[]);
        mapper.render(&mut ctx, &actors(&volumes[..1]), &camera(), &[]);
        assert_eq!(mapper.resource_cache().len(), 1);
        assert_eq!(ctx.textures_released, 1 + 2, "scalar texture plus both resized tables");
    }

    #[test]
    fn test_pass_sequence_binds_zbuffer_when_intermixing() {
        let mut ctx = RecordingContext::new();
        let config = MapperConfig {
            intermix_opaque_geometry: true,
            ..Default::default()
        };
        let mut mapper = MultiVolumeMapper::new(config).expect("config");
        let mut scene = Scene::new();
        scene.add_volume(
            uniform_cube_volume(0, 4, 1, VolumeProperty::new()).input_data().cloned(),
            VolumeProperty::new(),
        );
        scene.camera = camera();

        let mut pass = RenderPassState::default();
        mapper.build_pass(&mut pass);
        mapper.query_pass(&scene, &mut pass);
        assert_eq!(pass.volume_count, 1);
        pass.zbuffer = Some(ctx.external_texture());
        mapper.opaque_zbuffer_pass(&pass);
        assert!(mapper.volume_pass(true, &mut ctx, &scene, &pass).is_none());
        assert_eq!(mapper.pass_volume_count(), 1);
        assert!(ctx.draws.is_empty(), "prepass does no work");

        let report = mapper.volume_pass(false, &mut ctx, &scene, &pass).expect("main pass reports");
        assert!(report.drawn, "{report:?}");
        assert_eq!(ctx.draws[0].depth, pass.zbuffer);
        assert!(ctx.sources[0].fragment.contains("fn opaque_distance("));
    }

    #[test]
    fn test_zbuffer_ignored_without_intermix() {
        let mut ctx = RecordingContext::new();
        let mut mapper = mapper();
        let pass = RenderPassState {
            volume_count: 1,
            zbuffer: Some(ctx.external_texture()),
        };
        mapper.opaque_zbuffer_pass(&pass);

        let volumes = vec![uniform_cube_volume(0, 4, 1, VolumeProperty::new())];
        mapper.render(&mut ctx, &actors(&volumes), &camera(), &[]);
        assert_eq!(ctx.draws[0].depth, None);
        assert!(!ctx.sources[0].fragment.contains("texture_depth_2d"));
    }
}
