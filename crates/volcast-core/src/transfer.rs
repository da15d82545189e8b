//! Transfer functions: scalar value to opacity or RGB.
//!
//! The render side only needs a function's domain and evenly spaced samples of
//! it, so both curve types are consumed through [`TransferFunction`].

use serde::{Deserialize, Serialize};

/// Tabulation interface consumed by the table builder.
pub trait TransferFunction {
    /// Values produced per sample (1 for opacity, 3 for RGB).
    fn components(&self) -> usize;

    /// Declared domain `[min, max]`.
    fn range(&self) -> [f64; 2];

    /// Write `size` evenly spaced samples over `[min, max]` into `out`.
    /// Sample `i` starts at `out[i * stride]`; `stride >= components()`.
    fn table(&self, min: f64, max: f64, size: usize, out: &mut [f32], stride: usize);
}

/// Domain actually used for lookups. A collapsed range is widened by half a
/// unit each side so shift/scale factors stay finite.
pub fn lookup_range(range: [f64; 2]) -> [f64; 2] {
    if range[1] > range[0] {
        range
    } else {
        [range[0] - 0.5, range[0] + 0.5]
    }
}

fn sample_position(min: f64, max: f64, size: usize, i: usize) -> f64 {
    if size <= 1 {
        min
    } else {
        min + (max - min) * i as f64 / (size - 1) as f64
    }
}

/// Piecewise-linear scalar function, clamped outside its points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PiecewiseFunction {
    points: Vec<(f64, f64)>,
}

impl PiecewiseFunction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constant function `value` over `[min, max]`.
    pub fn constant(min: f64, max: f64, value: f64) -> Self {
        let mut f = Self::new();
        f.add_point(min, value);
        f.add_point(max, value);
        f
    }

    /// Insert a point, replacing any existing point at the same `x`.
    pub fn add_point(&mut self, x: f64, y: f64) {
        match self.points.binary_search_by(|p| p.0.total_cmp(&x)) {
            Ok(i) => self.points[i].1 = y,
            Err(i) => self.points.insert(i, (x, y)),
        }
    }

    pub fn remove_all_points(&mut self) {
        self.points.clear();
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn value(&self, x: f64) -> f64 {
        let (first, last) = match (self.points.first(), self.points.last()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return 0.0,
        };
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        let upper = self.points.partition_point(|p| p.0 <= x);
        let (x0, y0) = self.points[upper - 1];
        let (x1, y1) = self.points[upper];
        let t = (x - x0) / (x1 - x0);
        y0 + (y1 - y0) * t
    }
}

impl TransferFunction for PiecewiseFunction {
    fn components(&self) -> usize {
        1
    }

    fn range(&self) -> [f64; 2] {
        match (self.points.first(), self.points.last()) {
            (Some(f), Some(l)) => [f.0, l.0],
            _ => [0.0, 0.0],
        }
    }

    fn table(&self, min: f64, max: f64, size: usize, out: &mut [f32], stride: usize) {
        for i in 0..size {
            out[i * stride] = self.value(sample_position(min, max, size, i)) as f32;
        }
    }
}

/// Piecewise-linear RGB function, interpolated per channel, clamped outside.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorTransferFunction {
    points: Vec<(f64, [f64; 3])>,
}

impl ColorTransferFunction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Linear ramp from `from` at `min` to `to` at `max`.
    pub fn ramp(min: f64, max: f64, from: [f64; 3], to: [f64; 3]) -> Self {
        let mut f = Self::new();
        f.add_rgb_point(min, from[0], from[1], from[2]);
        f.add_rgb_point(max, to[0], to[1], to[2]);
        f
    }

    pub fn add_rgb_point(&mut self, x: f64, r: f64, g: f64, b: f64) {
        match self.points.binary_search_by(|p| p.0.total_cmp(&x)) {
            Ok(i) => self.points[i].1 = [r, g, b],
            Err(i) => self.points.insert(i, (x, [r, g, b])),
        }
    }

    pub fn remove_all_points(&mut self) {
        self.points.clear();
    }

    pub fn value(&self, x: f64) -> [f64; 3] {
        let (first, last) = match (self.points.first(), self.points.last()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return [0.0; 3],
        };
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        let upper = self.points.partition_point(|p| p.0 <= x);
        let (x0, c0) = self.points[upper - 1];
        let (x1, c1) = self.points[upper];
        let t = (x - x0) / (x1 - x0);
        [
            c0[0] + (c1[0] - c0[0]) * t,
            c0[1] + (c1[1] - c0[1]) * t,
            c0[2] + (c1[2] - c0[2]) * t,
        ]
    }
}

impl TransferFunction for ColorTransferFunction {
    fn components(&self) -> usize {
        3
    }

    fn range(&self) -> [f64; 2] {
        match (self.points.first(), self.points.last()) {
            (Some(f), Some(l)) => [f.0, l.0],
            _ => [0.0, 0.0],
        }
    }

    fn table(&self, min: f64, max: f64, size: usize, out: &mut [f32], stride: usize) {
        for i in 0..size {
            let rgb = self.value(sample_position(min, max, size, i));
            let base = i * stride;
            out[base] = rgb[0] as f32;
            out[base + 1] = rgb[1] as f32;
            out[base + 2] = rgb[2] as f32;
        }
    }
}
