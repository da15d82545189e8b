use glam::{Mat3, Mat4, Vec3};

use crate::constants::MAX_COMPONENTS;
use crate::error::VolcastError;
use crate::stamp::ModifiedStamp;

/// Element type of a scalar buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
}

/// Raw voxel values, x fastest, then y, then z, components interleaved.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarData {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
}

impl ScalarData {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarData::U8(_) => ScalarType::U8,
            ScalarData::I8(_) => ScalarType::I8,
            ScalarData::U16(_) => ScalarType::U16,
            ScalarData::I16(_) => ScalarType::I16,
            ScalarData::U32(_) => ScalarType::U32,
            ScalarData::I32(_) => ScalarType::I32,
            ScalarData::F32(_) => ScalarType::F32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ScalarData::U8(v) => v.len(),
            ScalarData::I8(v) => v.len(),
            ScalarData::U16(v) => v.len(),
            ScalarData::I16(v) => v.len(),
            ScalarData::U32(v) => v.len(),
            ScalarData::I32(v) => v.len(),
            ScalarData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at flat index `i` widened to f64.
    pub fn get(&self, i: usize) -> f64 {
        match self {
            ScalarData::U8(v) => v[i] as f64,
            ScalarData::I8(v) => v[i] as f64,
            ScalarData::U16(v) => v[i] as f64,
            ScalarData::I16(v) => v[i] as f64,
            ScalarData::U32(v) => v[i] as f64,
            ScalarData::I32(v) => v[i] as f64,
            ScalarData::F32(v) => v[i] as f64,
        }
    }
}

/// A regular 3-D scalar field with an oriented index frame.
#[derive(Debug, Clone)]
pub struct ImageData {
    dimensions: [u32; 3],
    spacing: Vec3,
    origin: Vec3,
    direction: Mat3,
    scalars: ScalarData,
    components: usize,
    stamp: ModifiedStamp,
}

impl ImageData {
    /// Axis-aligned field with unit spacing at the world origin.
    pub fn new(dimensions: [u32; 3], components: usize, scalars: ScalarData) -> Self {
        Self {
            dimensions,
            spacing: Vec3::ONE,
            origin: Vec3::ZERO,
            direction: Mat3::IDENTITY,
            scalars,
            components,
            stamp: ModifiedStamp::new(),
        }
    }

    pub fn with_spacing(mut self, spacing: Vec3) -> Self {
        self.set_spacing(spacing);
        self
    }

    pub fn with_origin(mut self, origin: Vec3) -> Self {
        self.set_origin(origin);
        self
    }

    pub fn with_direction(mut self, direction: Mat3) -> Self {
        self.set_direction(direction);
        self
    }

    pub fn dimensions(&self) -> [u32; 3] {
        self.dimensions
    }

    /// Inclusive index extent `[x0, x1, y0, y1, z0, z1]`.
    pub fn extent(&self) -> [u32; 6] {
        let [x, y, z] = self.dimensions;
        [
            0,
            x.saturating_sub(1),
            0,
            y.saturating_sub(1),
            0,
            z.saturating_sub(1),
        ]
    }

    pub fn spacing(&self) -> Vec3 {
        self.spacing
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn direction(&self) -> Mat3 {
        self.direction
    }

    pub fn scalars(&self) -> &ScalarData {
        &self.scalars
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.scalars.scalar_type()
    }

    pub fn stamp(&self) -> ModifiedStamp {
        self.stamp
    }

    pub(crate) fn advance_stamp_past(&mut self, other: ModifiedStamp) {
        while !self.stamp.is_newer_than(Some(other)) {
            self.stamp.modified();
        }
    }

    pub fn set_spacing(&mut self, spacing: Vec3) {
        self.spacing = spacing;
        self.stamp.modified();
    }

    pub fn set_origin(&mut self, origin: Vec3) {
        self.origin = origin;
        self.stamp.modified();
    }

    pub fn set_direction(&mut self, direction: Mat3) {
        self.direction = direction;
        self.stamp.modified();
    }

    /// Replace the voxel buffer (and possibly its shape).
    pub fn set_scalars(&mut self, dimensions: [u32; 3], components: usize, scalars: ScalarData) {
        self.dimensions = dimensions;
        self.components = components;
        self.scalars = scalars;
        self.stamp.modified();
    }

    /// Mutable access to the voxel buffer. Counts as a modification.
    pub fn scalars_mut(&mut self) -> &mut ScalarData {
        self.stamp.modified();
        &mut self.scalars
    }

    pub fn voxel_count(&self) -> usize {
        self.dimensions.iter().map(|&d| d as usize).product()
    }

    /// Number of values the scalar buffer must hold.
    pub fn expected_len(&self) -> usize {
        self.voxel_count() * self.components
    }

    /// Check the buffer against the declared shape before any upload.
    pub fn validate(&self) -> Result<(), VolcastError> {
        if self.components == 0 || self.components > MAX_COMPONENTS {
            return Err(VolcastError::UnsupportedComponents(self.components));
        }
        let expected = self.expected_len();
        let actual = self.scalars.len();
        if expected != actual {
            return Err(VolcastError::ScalarSizeMismatch {
                expected,
                actual,
                dims: self.dimensions,
                components: self.components,
            });
        }
        Ok(())
    }

    /// Maps continuous index coordinates to world coordinates.
    pub fn index_to_world(&self) -> Mat4 {
        Mat4::from_translation(self.origin)
            * Mat4::from_mat3(self.direction)
            * Mat4::from_scale(self.spacing)
    }

    /// Minimum and maximum of one component, or `[0, 0]` if empty.
    pub fn component_range(&self, component: usize) -> [f64; 2] {
        let stride = self.components.max(1);
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut i = component;
        while i < self.scalars.len() {
            let v = self.scalars.get(i);
            min = min.min(v);
            max = max.max(v);
            i += stride;
        }
        if min > max {
            [0.0, 0.0]
        } else {
            [min, max]
        }
    }
}
