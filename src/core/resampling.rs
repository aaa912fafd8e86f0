//! Resampling kernel shared by collocation and DEM lookup
//!
//! A [`Resampling`] turns a fractional pixel position into an interpolated
//! value in two steps: [`Resampling::compute_index`] fills a caller-owned
//! [`ResamplingIndex`] with the integer sample window and weights, and
//! [`Resampling::resample`] fetches that window from a [`RasterSampler`] and
//! combines it. Pixel (i, j) has its centre at (i + 0.5, j + 0.5).

use crate::types::{CollocError, CollocResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest window used by any kernel (cubic variants)
pub const MAX_WINDOW: usize = 4;

/// Interpolation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResamplingMethod {
    /// 1x1 window, picks the pixel whose centre is closest
    NearestNeighbour,
    /// 2x2 window, bilinear weights
    Bilinear,
    /// 4x4 window, Keys cubic convolution with a = -0.5
    CubicConvolution,
    /// 4x4 window, Keys cubic convolution with a = -0.75
    Bicubic,
    /// Triangulation-based interpolation. Has no kernel here and is
    /// rejected wherever a kernel is required.
    Delaunay,
}

impl ResamplingMethod {
    pub const fn name(&self) -> &'static str {
        match self {
            ResamplingMethod::NearestNeighbour => "NEAREST_NEIGHBOUR",
            ResamplingMethod::Bilinear => "BILINEAR_INTERPOLATION",
            ResamplingMethod::CubicConvolution => "CUBIC_CONVOLUTION",
            ResamplingMethod::Bicubic => "BICUBIC_INTERPOLATION",
            ResamplingMethod::Delaunay => "DELAUNAY_INTERPOLATION",
        }
    }

    /// Side length of the sample window, None if there is no kernel
    pub const fn window_size(&self) -> Option<usize> {
        match self {
            ResamplingMethod::NearestNeighbour => Some(1),
            ResamplingMethod::Bilinear => Some(2),
            ResamplingMethod::CubicConvolution | ResamplingMethod::Bicubic => Some(4),
            ResamplingMethod::Delaunay => None,
        }
    }
}

impl Default for ResamplingMethod {
    fn default() -> Self {
        ResamplingMethod::NearestNeighbour
    }
}

impl fmt::Display for ResamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ResamplingMethod {
    type Err = CollocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NEAREST_NEIGHBOUR" | "NEAREST_NEIGHBOR" | "NEAREST" => Ok(ResamplingMethod::NearestNeighbour),
            "BILINEAR_INTERPOLATION" | "BILINEAR" => Ok(ResamplingMethod::Bilinear),
            "CUBIC_CONVOLUTION" => Ok(ResamplingMethod::CubicConvolution),
            "BICUBIC_INTERPOLATION" | "BICUBIC" => Ok(ResamplingMethod::Bicubic),
            "DELAUNAY_INTERPOLATION" | "DELAUNAY" => Ok(ResamplingMethod::Delaunay),
            _ => Err(CollocError::Configuration(format!(
                "Unknown resampling method: {}",
                s
            ))),
        }
    }
}

/// Source of raw samples for the kernel.
///
/// Invalid or no-data samples are reported as NaN. Callers only pass
/// in-bounds coordinates; the kernel clamps its window to the grid.
pub trait RasterSampler {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    fn get_sample(&self, x: usize, y: usize) -> CollocResult<f64>;

    /// Fill `samples` (row-major, `ys.len()` rows of `xs.len()` columns) and
    /// return true if every sample is valid.
    fn get_samples(&self, xs: &[usize], ys: &[usize], samples: &mut [f64]) -> CollocResult<bool> {
        let mut all_valid = true;
        for (row, &y) in ys.iter().enumerate() {
            for (col, &x) in xs.iter().enumerate() {
                let sample = self.get_sample(x, y)?;
                if sample.is_nan() {
                    all_valid = false;
                }
                samples[row * xs.len() + col] = sample;
            }
        }
        Ok(all_valid)
    }
}

/// Scratch state for one in-flight resample.
///
/// Not shareable between concurrent resamples; every worker owns its own.
#[derive(Debug, Clone)]
pub struct ResamplingIndex {
    pub x: f64,
    pub y: f64,
    pub width: usize,
    pub height: usize,
    /// Column indices of the window
    pub i: [usize; MAX_WINDOW],
    /// Row indices of the window
    pub j: [usize; MAX_WINDOW],
    /// Column weights
    pub ki: [f64; MAX_WINDOW],
    /// Row weights
    pub kj: [f64; MAX_WINDOW],
    size: usize,
    samples: [f64; MAX_WINDOW * MAX_WINDOW],
}

impl ResamplingIndex {
    fn with_size(size: usize) -> Self {
        Self {
            x: f64::NAN,
            y: f64::NAN,
            width: 0,
            height: 0,
            i: [0; MAX_WINDOW],
            j: [0; MAX_WINDOW],
            ki: [0.0; MAX_WINDOW],
            kj: [0.0; MAX_WINDOW],
            size,
            samples: [f64::NAN; MAX_WINDOW * MAX_WINDOW],
        }
    }

    /// Window side length
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Resampling kernel for one interpolation policy. Holds no mutable state,
/// so a single instance can serve any number of workers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resampling {
    method: ResamplingMethod,
    window: usize,
}

impl Resampling {
    pub fn new(method: ResamplingMethod) -> CollocResult<Self> {
        let window = method.window_size().ok_or_else(|| {
            CollocError::Configuration(format!(
                "{} has no resampling kernel and cannot be used for raster resampling",
                method
            ))
        })?;
        Ok(Self { method, window })
    }

    pub fn method(&self) -> ResamplingMethod {
        self.method
    }

    pub fn create_index(&self) -> ResamplingIndex {
        ResamplingIndex::with_size(self.window)
    }

    /// Compute the sample window and weights for position (x, y) on a
    /// `width` x `height` grid. Window indices outside the grid are clamped
    /// to the edge.
    pub fn compute_index(&self, x: f64, y: f64, width: usize, height: usize, index: &mut ResamplingIndex) {
        index.x = x;
        index.y = y;
        index.width = width;
        index.height = height;
        index.size = self.window;

        match self.method {
            ResamplingMethod::NearestNeighbour => {
                index.i[0] = clamp_index(x.floor() as i64, width);
                index.j[0] = clamp_index(y.floor() as i64, height);
                index.ki[0] = 1.0;
                index.kj[0] = 1.0;
            }
            ResamplingMethod::Bilinear => {
                let (i0, dx) = split_centred(x);
                let (j0, dy) = split_centred(y);
                index.i[0] = clamp_index(i0, width);
                index.i[1] = clamp_index(i0 + 1, width);
                index.j[0] = clamp_index(j0, height);
                index.j[1] = clamp_index(j0 + 1, height);
                index.ki[0] = 1.0 - dx;
                index.ki[1] = dx;
                index.kj[0] = 1.0 - dy;
                index.kj[1] = dy;
            }
            ResamplingMethod::CubicConvolution | ResamplingMethod::Bicubic => {
                let a = if self.method == ResamplingMethod::CubicConvolution { -0.5 } else { -0.75 };
                let (i0, dx) = split_centred(x);
                let (j0, dy) = split_centred(y);
                for k in 0..4 {
                    let offset = k as i64 - 1;
                    index.i[k] = clamp_index(i0 + offset, width);
                    index.j[k] = clamp_index(j0 + offset, height);
                    index.ki[k] = keys_weight(a, dx - offset as f64);
                    index.kj[k] = keys_weight(a, dy - offset as f64);
                }
            }
            // Rejected in Resampling::new
            ResamplingMethod::Delaunay => {}
        }
    }

    /// Combine the window described by `index` into one value. Returns NaN
    /// if any sample of the window is invalid.
    pub fn resample<R: RasterSampler + ?Sized>(&self, raster: &R, index: &mut ResamplingIndex) -> CollocResult<f64> {
        let n = index.size;
        let all_valid = raster.get_samples(&index.i[..n], &index.j[..n], &mut index.samples[..n * n])?;
        if !all_valid {
            return Ok(f64::NAN);
        }

        let mut value = 0.0;
        for row in 0..n {
            let mut row_sum = 0.0;
            for col in 0..n {
                row_sum += index.ki[col] * index.samples[row * n + col];
            }
            value += index.kj[row] * row_sum;
        }
        Ok(value)
    }
}

/// Integer index of the pixel centre at or left of `v` and the fractional
/// distance past it
fn split_centred(v: f64) -> (i64, f64) {
    let c = v - 0.5;
    let i0 = c.floor();
    (i0 as i64, c - i0)
}

fn clamp_index(v: i64, size: usize) -> usize {
    if v <= 0 || size == 0 {
        0
    } else {
        (v as usize).min(size - 1)
    }
}

/// Keys cubic convolution kernel at distance `d`
fn keys_weight(a: f64, d: f64) -> f64 {
    let d = d.abs();
    if d <= 1.0 {
        ((a + 2.0) * d - (a + 3.0)) * d * d + 1.0
    } else if d < 2.0 {
        ((a * d - 5.0 * a) * d + 8.0 * a) * d - 4.0 * a
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    struct GridSampler {
        data: Array2<f64>,
    }

    impl RasterSampler for GridSampler {
        fn width(&self) -> usize {
            self.data.ncols()
        }

        fn height(&self) -> usize {
            self.data.nrows()
        }

        fn get_sample(&self, x: usize, y: usize) -> CollocResult<f64> {
            Ok(self.data[[y, x]])
        }
    }

    fn ramp(width: usize, height: usize) -> GridSampler {
        GridSampler {
            data: Array2::from_shape_fn((height, width), |(r, c)| (r * 10 + c) as f64),
        }
    }

    fn sample_at(method: ResamplingMethod, raster: &GridSampler, x: f64, y: f64) -> f64 {
        let resampling = Resampling::new(method).unwrap();
        let mut index = resampling.create_index();
        resampling.compute_index(x, y, raster.width(), raster.height(), &mut index);
        resampling.resample(raster, &mut index).unwrap()
    }

    #[test]
    fn test_nearest_on_constant_raster() {
        let raster = GridSampler {
            data: Array2::from_elem((5, 5), 7.25),
        };
        for &(x, y) in &[(0.0, 0.0), (1.3, 4.9), (2.5, 2.5), (4.999, 0.01)] {
            assert_eq!(sample_at(ResamplingMethod::NearestNeighbour, &raster, x, y), 7.25);
        }
    }

    #[test]
    fn test_nearest_round_half_up() {
        let raster = ramp(5, 5);
        // x = 2.0 is equidistant from the centres 1.5 and 2.5
        assert_eq!(sample_at(ResamplingMethod::NearestNeighbour, &raster, 2.0, 3.0), 32.0);
        assert_eq!(sample_at(ResamplingMethod::NearestNeighbour, &raster, 1.99, 2.99), 21.0);
    }

    #[test]
    fn test_bilinear_at_pixel_centre() {
        let raster = ramp(4, 4);
        for row in 0..4 {
            for col in 0..4 {
                let value = sample_at(ResamplingMethod::Bilinear, &raster, col as f64 + 0.5, row as f64 + 0.5);
                assert_relative_eq!(value, raster.data[[row, col]], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_bilinear_between_centres() {
        let raster = ramp(4, 4);
        // halfway between (1,1), (2,1), (1,2), (2,2)
        let value = sample_at(ResamplingMethod::Bilinear, &raster, 2.0, 2.0);
        assert_relative_eq!(value, (11.0 + 12.0 + 21.0 + 22.0) / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_weights_sum_to_one() {
        for method in [
            ResamplingMethod::Bilinear,
            ResamplingMethod::CubicConvolution,
            ResamplingMethod::Bicubic,
        ] {
            let resampling = Resampling::new(method).unwrap();
            let mut index = resampling.create_index();
            for &(x, y) in &[(3.17, 4.81), (5.5, 5.5), (6.02, 2.999)] {
                resampling.compute_index(x, y, 10, 10, &mut index);
                let n = index.size();
                let ki: f64 = index.ki[..n].iter().sum();
                let kj: f64 = index.kj[..n].iter().sum();
                assert_relative_eq!(ki, 1.0, epsilon = 1e-9);
                assert_relative_eq!(kj, 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_cubic_reproduces_samples_and_linear_ramp() {
        let raster = ramp(8, 8);
        for method in [ResamplingMethod::CubicConvolution, ResamplingMethod::Bicubic] {
            let at_centre = sample_at(method, &raster, 3.5, 4.5);
            assert_relative_eq!(at_centre, 43.0, epsilon = 1e-9);
        }
        // Catmull-Rom reproduces linear functions away from the edges
        let value = sample_at(ResamplingMethod::CubicConvolution, &raster, 3.75, 4.25);
        assert_relative_eq!(value, 10.0 * 3.75 + 3.25, epsilon = 1e-9);
    }

    #[test]
    fn test_edge_clamping() {
        let raster = ramp(3, 3);
        let resampling = Resampling::new(ResamplingMethod::Bicubic).unwrap();
        let mut index = resampling.create_index();
        resampling.compute_index(0.1, 2.9, 3, 3, &mut index);
        assert!(index.i.iter().all(|&i| i < 3));
        assert!(index.j.iter().all(|&j| j < 3));
        assert_eq!(index.i[0], 0);
        assert_eq!(index.j[3], 2);
        assert!(resampling.resample(&raster, &mut index).unwrap().is_finite());
    }

    #[test]
    fn test_no_data_in_window_yields_nan() {
        let mut raster = ramp(5, 5);
        raster.data[[2, 3]] = f64::NAN;
        // every method whose window touches (3, 2) must give NaN
        assert!(sample_at(ResamplingMethod::NearestNeighbour, &raster, 3.2, 2.7).is_nan());
        assert!(sample_at(ResamplingMethod::Bilinear, &raster, 3.2, 2.7).is_nan());
        assert!(sample_at(ResamplingMethod::CubicConvolution, &raster, 2.5, 1.5).is_nan());
        assert!(sample_at(ResamplingMethod::Bicubic, &raster, 1.9, 3.1).is_nan());
        // away from it the result is a number
        assert!(sample_at(ResamplingMethod::Bilinear, &raster, 1.0, 1.0).is_finite());
    }

    #[test]
    fn test_delaunay_has_no_kernel() {
        let result = Resampling::new(ResamplingMethod::Delaunay);
        assert!(matches!(result, Err(CollocError::Configuration(_))));
    }

    #[test]
    fn test_method_names_round_trip() {
        for method in [
            ResamplingMethod::NearestNeighbour,
            ResamplingMethod::Bilinear,
            ResamplingMethod::CubicConvolution,
            ResamplingMethod::Bicubic,
            ResamplingMethod::Delaunay,
        ] {
            assert_eq!(method.name().parse::<ResamplingMethod>().unwrap(), method);
        }
        assert!("LANCZOS".parse::<ResamplingMethod>().is_err());
    }
}
