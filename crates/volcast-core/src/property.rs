use serde::{Deserialize, Serialize};

use crate::constants::MAX_COMPONENTS;
use crate::error::VolcastError;
use crate::stamp::ModifiedStamp;
use crate::transfer::{ColorTransferFunction, PiecewiseFunction};

/// Scalar texture sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interpolation {
    Nearest,
    #[default]
    Linear,
}

/// Opacity modulation by gradient magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientOpacity {
    pub enabled: bool,
    /// Gradient magnitude mapped to `min_opacity`.
    pub min_value: f64,
    /// Gradient magnitude mapped to `max_opacity`.
    pub max_value: f64,
    pub min_opacity: f64,
    pub max_opacity: f64,
}

impl Default for GradientOpacity {
    fn default() -> Self {
        Self {
            enabled: false,
            min_value: 0.0,
            max_value: 1.0,
            min_opacity: 0.0,
            max_opacity: 1.0,
        }
    }
}

/// Per-component transfer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentProperty {
    pub scalar_opacity: PiecewiseFunction,
    /// Physical length over which `scalar_opacity` is reached.
    pub scalar_opacity_unit_distance: f64,
    pub rgb: ColorTransferFunction,
    pub gradient_opacity: GradientOpacity,
    /// Relative weight in independent-component blending.
    pub weight: f64,
}

impl Default for ComponentProperty {
    fn default() -> Self {
        Self {
            scalar_opacity: PiecewiseFunction::new(),
            scalar_opacity_unit_distance: 1.0,
            rgb: ColorTransferFunction::new(),
            gradient_opacity: GradientOpacity::default(),
            weight: 1.0,
        }
    }
}

/// Shading and transfer-function settings of one volume.
///
/// Every mutation advances the property's stamp, which drives transfer table
/// rebuilds on the render side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeProperty {
    interpolation: Interpolation,
    independent_components: bool,
    components: [ComponentProperty; MAX_COMPONENTS],
    shade: bool,
    ambient: f64,
    diffuse: f64,
    specular: f64,
    specular_power: f64,
    #[serde(skip, default = "ModifiedStamp::new")]
    stamp: ModifiedStamp,
}

impl Default for VolumeProperty {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Linear,
            independent_components: true,
            components: Default::default(),
            shade: false,
            ambient: 0.1,
            diffuse: 0.7,
            specular: 0.2,
            specular_power: 10.0,
            stamp: ModifiedStamp::new(),
        }
    }
}

impl VolumeProperty {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a property preset from RON.
    pub fn from_ron_str(ron_str: &str) -> Result<Self, VolcastError> {
        let options = ron::Options::default();
        options
            .from_str(ron_str)
            .map_err(|e| VolcastError::ConfigParse(e.to_string()))
    }

    pub fn stamp(&self) -> ModifiedStamp {
        self.stamp
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.interpolation = interpolation;
        self.stamp.modified();
    }

    pub fn independent_components(&self) -> bool {
        self.independent_components
    }

    pub fn set_independent_components(&mut self, independent: bool) {
        self.independent_components = independent;
        self.stamp.modified();
    }

    pub fn component(&self, index: usize) -> &ComponentProperty {
        &self.components[index.min(MAX_COMPONENTS - 1)]
    }

    /// Mutable access to one component's settings. Counts as a modification.
    pub fn component_mut(&mut self, index: usize) -> &mut ComponentProperty {
        self.stamp.modified();
        &mut self.components[index.min(MAX_COMPONENTS - 1)]
    }

    pub fn scalar_opacity(&self, index: usize) -> &PiecewiseFunction {
        &self.component(index).scalar_opacity
    }

    pub fn set_scalar_opacity(&mut self, index: usize, function: PiecewiseFunction) {
        self.component_mut(index).scalar_opacity = function;
    }

    pub fn scalar_opacity_unit_distance(&self, index: usize) -> f64 {
        self.component(index).scalar_opacity_unit_distance
    }

    pub fn set_scalar_opacity_unit_distance(&mut self, index: usize, distance: f64) {
        self.component_mut(index).scalar_opacity_unit_distance = distance;
    }

    pub fn rgb_transfer_function(&self, index: usize) -> &ColorTransferFunction {
        &self.component(index).rgb
    }

    pub fn set_rgb_transfer_function(&mut self, index: usize, function: ColorTransferFunction) {
        self.component_mut(index).rgb = function;
    }

    pub fn gradient_opacity(&self, index: usize) -> &GradientOpacity {
        &self.component(index).gradient_opacity
    }

    pub fn set_gradient_opacity(&mut self, index: usize, settings: GradientOpacity) {
        self.component_mut(index).gradient_opacity = settings;
    }

    pub fn component_weight(&self, index: usize) -> f64 {
        self.component(index).weight
    }

    pub fn set_component_weight(&mut self, index: usize, weight: f64) {
        self.component_mut(index).weight = weight;
    }

    pub fn shade(&self) -> bool {
        self.shade
    }

    pub fn set_shade(&mut self, shade: bool) {
        self.shade = shade;
        self.stamp.modified();
    }

    pub fn ambient(&self) -> f64 {
        self.ambient
    }

    pub fn diffuse(&self) -> f64 {
        self.diffuse
    }

    pub fn specular(&self) -> f64 {
        self.specular
    }

    pub fn specular_power(&self) -> f64 {
        self.specular_power
    }

    pub fn set_lighting(&mut self, ambient: f64, diffuse: f64, specular: f64, specular_power: f64) {
        self.ambient = ambient;
        self.diffuse = diffuse;
        self.specular = specular;
        self.specular_power = specular_power;
        self.stamp.modified();
    }

    /// Number of table segments this property needs for `components` scalars.
    pub fn independent_component_count(&self, components: usize) -> usize {
        if self.independent_components {
            components
        } else {
            1
        }
    }

    /// True if any of the first `components` components uses gradient opacity.
    pub fn uses_gradient_opacity(&self, components: usize) -> bool {
        let count = self.independent_component_count(components);
        self.components[..count.min(MAX_COMPONENTS)]
            .iter()
            .any(|c| c.gradient_opacity.enabled)
    }
}
