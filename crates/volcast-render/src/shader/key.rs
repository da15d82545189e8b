//! Everything a synthesized volume program depends on.
//!
//! Two frames share a compiled program only while their [`ShaderKey`]s are
//! equal. Light parameters that reach the program through uniforms (color,
//! direction, count) are deliberately absent; only the lighting complexity
//! level changes the generated code.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use volcast_core::constants::MAX_LIGHTS;
use volcast_core::{Interpolation, Light, ModifiedStamp, VolumeId};

/// Lighting code path compiled into the fragment program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum LightComplexity {
    /// Shading off or no light switched on: colors pass through untouched.
    #[default]
    None = 0,
    /// One white unit-intensity headlight.
    Headlight = 1,
    /// Several lights, tinted or scaled lights, or non-headlights.
    Directional = 2,
    /// At least one positional light (attenuation and spot cone).
    Positional = 3,
}

impl LightComplexity {
    pub fn level(self) -> u32 {
        self as u32
    }
}

/// Classify the active light list. Only switched-on lights count, and only
/// when some volume has shading enabled.
pub fn compute_light_complexity(any_shade: bool, lights: &[Light]) -> LightComplexity {
    if !any_shade {
        return LightComplexity::None;
    }

    let mut complexity = LightComplexity::None;
    let mut active = 0usize;
    for light in lights.iter().filter(|l| l.switch) {
        active += 1;
        if complexity == LightComplexity::None {
            complexity = LightComplexity::Headlight;
        }
        if complexity == LightComplexity::Headlight
            && (active > 1 || light.intensity != 1.0 || !light.is_headlight())
        {
            complexity = LightComplexity::Directional;
        }
        if complexity < LightComplexity::Positional && light.positional {
            complexity = LightComplexity::Positional;
        }
    }
    complexity
}

/// Switched-on lights in order, capped at [`MAX_LIGHTS`].
pub fn active_lights(lights: &[Light]) -> Vec<&Light> {
    let active: Vec<&Light> = lights.iter().filter(|l| l.switch).collect();
    if active.len() > MAX_LIGHTS {
        log::warn!(
            "{} lights switched on, only the first {} are used",
            active.len(),
            MAX_LIGHTS
        );
    }
    active.into_iter().take(MAX_LIGHTS).collect()
}

/// Per-volume part of the program configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeShaderConfig {
    pub volume_id: VolumeId,
    pub components: usize,
    pub independent: bool,
    pub interpolation: Interpolation,
    pub gradient_opacity: bool,
    pub shade: bool,
    /// Compile-time bound of the marching loop.
    pub max_samples: u32,
    pub data_stamp: ModifiedStamp,
    pub property_stamp: ModifiedStamp,
}

/// Full configuration a fragment program is specialized on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderKey {
    pub volumes: Vec<VolumeShaderConfig>,
    pub light_complexity: LightComplexity,
    pub zbuffer_intermix: bool,
    /// Samples per table segment, baked into the lookup helpers.
    pub table_width: u32,
}

impl ShaderKey {
    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }

    pub fn gradient_opacity(&self) -> bool {
        self.volumes.iter().any(|v| v.gradient_opacity)
    }

    pub fn hash_value(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use volcast_core::LightType;

    fn volume_config(id: u32) -> VolumeShaderConfig {
        VolumeShaderConfig {
            volume_id: VolumeId(id),
            components: 1,
            independent: true,
            interpolation: Interpolation::Linear,
            gradient_opacity: false,
            shade: true,
            max_samples: 18,
            data_stamp: ModifiedStamp::new(),
            property_stamp: ModifiedStamp::new(),
        }
    }

    #[test]
    fn test_no_shading_means_no_lighting() {
        let lights = vec![Light::headlight()];
        assert_eq!(compute_light_complexity(false, &lights), LightComplexity::None);
    }

    #[test]
    fn test_single_headlight_is_level_one() {
        let lights = vec![Light::headlight()];
        assert_eq!(compute_light_complexity(true, &lights), LightComplexity::Headlight);
    }

    #[test]
    fn test_second_light_raises_level() {
        let lights = vec![Light::headlight(), Light::headlight()];
        assert_eq!(compute_light_complexity(true, &lights), LightComplexity::Directional);
    }

    #[test]
    fn test_dimmed_or_scene_light_is_level_two() {
        let mut dimmed = Light::headlight();
        dimmed.intensity = 0.5;
        assert_eq!(compute_light_complexity(true, &[dimmed]), LightComplexity::Directional);

        let scene = Light::scene_light(Vec3::new(1.0, 1.0, 1.0), Vec3::ZERO);
        assert_eq!(compute_light_complexity(true, &[scene]), LightComplexity::Directional);
    }

    #[test]
    fn test_positional_light_is_level_three() {
        let mut spot = Light::scene_light(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        spot.positional = true;
        let lights = vec![Light::headlight(), spot];
        assert_eq!(compute_light_complexity(true, &lights), LightComplexity::Positional);
    }

    #[test]
    fn test_switched_off_lights_ignored() {
        let mut off = Light::headlight();
        off.switch = false;
        let mut positional_off = Light::scene_light(Vec3::ONE, Vec3::ZERO);
        positional_off.switch = false;
        positional_off.positional = true;
        let lights = vec![Light::headlight(), off, positional_off];
        assert_eq!(compute_light_complexity(true, &lights), LightComplexity::Headlight);
        assert_eq!(active_lights(&lights).len(), 1);
    }

    #[test]
    fn test_active_lights_capped() {
        let lights = vec![
            Light {
                light_type: LightType::CameraLight,
                ..Default::default()
            };
            MAX_LIGHTS + 3
        ];
        assert_eq!(active_lights(&lights).len(), MAX_LIGHTS);
    }

    #[test]
    fn test_key_equality_tracks_stamps() {
        let a = ShaderKey {
            volumes: vec![volume_config(0)],
            light_complexity: LightComplexity::Headlight,
            zbuffer_intermix: false,
            table_width: 1024,
        };
        let mut b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.hash_value(), b.hash_value());

        b.volumes[0].property_stamp.modified();
        assert_ne!(a, b, "a property edit invalidates the program");
    }
}
