use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_SAMPLES_WARNING, DEFAULT_TABLE_WIDTH};
use crate::error::VolcastError;

/// Tunables of the multi-volume mapper, loadable from RON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Samples per transfer-function table segment.
    pub table_width: u32,
    /// Ray step length in view units.
    pub sample_distance: f32,
    /// Per-volume step count above which a warning is logged.
    pub max_samples_warning: u32,
    /// Screen-space subsampling factor; values above 1.43 render the volume
    /// pass at reduced resolution.
    pub image_sample_distance: f32,
    /// Seed of the jitter tile.
    pub jitter_seed: u32,
    /// Clip rays against the opaque depth buffer handed in by the z-buffer pass.
    pub intermix_opaque_geometry: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            table_width: DEFAULT_TABLE_WIDTH,
            sample_distance: 1.0,
            max_samples_warning: DEFAULT_MAX_SAMPLES_WARNING,
            image_sample_distance: 1.0,
            jitter_seed: 0,
            intermix_opaque_geometry: false,
        }
    }
}

impl MapperConfig {
    /// Parse and validate a config from RON. Missing fields take defaults.
    pub fn from_ron_str(ron_str: &str) -> Result<Self, VolcastError> {
        let options = ron::Options::default();
        let config: MapperConfig = options
            .from_str(ron_str)
            .map_err(|e| VolcastError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), VolcastError> {
        if self.table_width < 2 {
            return Err(VolcastError::InvalidConfig(format!(
                "table_width must be at least 2, got {}",
                self.table_width
            )));
        }
        if !(self.sample_distance > 0.0 && self.sample_distance.is_finite()) {
            return Err(VolcastError::InvalidConfig(format!(
                "sample_distance must be positive, got {}",
                self.sample_distance
            )));
        }
        if !(self.image_sample_distance >= 1.0 && self.image_sample_distance.is_finite()) {
            return Err(VolcastError::InvalidConfig(format!(
                "image_sample_distance must be at least 1, got {}",
                self.image_sample_distance
            )));
        }
        Ok(())
    }
}
