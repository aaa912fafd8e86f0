use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::geocoding::GeoCoding;

/// Geographic position in degrees (WGS84)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPos {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPos {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Position returned when a pixel cannot be geolocated
    pub fn invalid() -> Self {
        Self { lat: f64::NAN, lon: f64::NAN }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Fractional pixel position. Pixel (i, j) covers [i, i+1) x [j, j+1),
/// so its centre sits at (i + 0.5, j + 0.5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPos {
    pub x: f64,
    pub y: f64,
}

impl PixelPos {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Centre of the integer pixel (col, row)
    pub fn centre_of(col: usize, row: usize) -> Self {
        Self {
            x: col as f64 + 0.5,
            y: row as f64 + 0.5,
        }
    }

    pub fn invalid() -> Self {
        Self { x: f64::NAN, y: f64::NAN }
    }

    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// True if the position is valid and inside [0, width) x [0, height)
    pub fn is_within(&self, width: usize, height: usize) -> bool {
        self.is_valid()
            && self.x >= 0.0
            && self.y >= 0.0
            && self.x < width as f64
            && self.y < height as f64
    }
}

/// Geospatial transformation parameters (GDAL coefficient order)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            top_left_x: coeffs[0],
            pixel_width: coeffs[1],
            rotation_x: coeffs[2],
            top_left_y: coeffs[3],
            rotation_y: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }
}

/// Native sample type of a band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl SampleType {
    pub fn is_floating_point(&self) -> bool {
        matches!(self, SampleType::Float32 | SampleType::Float64)
    }
}

/// Flag codings describe bit masks, index codings describe classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodingKind {
    Flag,
    Index,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodingEntry {
    pub name: String,
    pub value: i64,
    pub description: String,
}

/// Named mapping from integer sample values to symbolic meanings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleCoding {
    pub name: String,
    pub kind: CodingKind,
    pub entries: Vec<CodingEntry>,
}

impl SampleCoding {
    pub fn flag(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: CodingKind::Flag,
            entries: Vec::new(),
        }
    }

    pub fn index(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: CodingKind::Index,
            entries: Vec::new(),
        }
    }

    pub fn add_entry(&mut self, name: &str, value: i64, description: &str) {
        self.entries.push(CodingEntry {
            name: name.to_string(),
            value,
            description: description.to_string(),
        });
    }
}

/// Boolean-expression mask with display properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    pub name: String,
    pub expression: String,
    /// RGB display color
    pub color: [u8; 3],
    pub transparency: f64,
}

impl Mask {
    pub fn new(name: &str, expression: &str, color: [u8; 3], transparency: f64) -> Self {
        Self {
            name: name.to_string(),
            expression: expression.to_string(),
            color,
            transparency,
        }
    }
}

/// A raster layer of a product
#[derive(Debug, Clone)]
pub struct Band {
    pub name: String,
    pub sample_type: SampleType,
    /// Samples stored as (row, col)
    pub data: Array2<f64>,
    pub no_data_value: f64,
    pub no_data_used: bool,
    pub valid_pixel_expression: Option<String>,
    /// Spectral wavelength in nm, 0.0 if not spectral
    pub spectral_wavelength: f32,
    pub spectral_band_index: Option<i32>,
    /// Name of the flag or index coding attached to this band
    pub sample_coding: Option<String>,
    /// Band-specific geocoding, None when the scene geocoding applies
    pub geocoding: Option<Arc<dyn GeoCoding>>,
}

impl Band {
    pub fn new(name: &str, sample_type: SampleType, data: Array2<f64>) -> Self {
        Self {
            name: name.to_string(),
            sample_type,
            data,
            no_data_value: 0.0,
            no_data_used: false,
            valid_pixel_expression: None,
            spectral_wavelength: 0.0,
            spectral_band_index: None,
            sample_coding: None,
            geocoding: None,
        }
    }

    pub fn with_no_data(mut self, value: f64) -> Self {
        self.no_data_value = value;
        self.no_data_used = true;
        self
    }

    pub fn with_valid_pixel_expression(mut self, expression: &str) -> Self {
        self.valid_pixel_expression = Some(expression.to_string());
        self
    }

    pub fn with_sample_coding(mut self, coding_name: &str) -> Self {
        self.sample_coding = Some(coding_name.to_string());
        self
    }

    pub fn with_geocoding(mut self, geocoding: Arc<dyn GeoCoding>) -> Self {
        self.geocoding = Some(geocoding);
        self
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// No-data value if one is in use
    pub fn effective_no_data(&self) -> Option<f64> {
        if self.no_data_used {
            Some(self.no_data_value)
        } else {
            None
        }
    }
}

/// Positional layer (latitude, longitude, altitude...) at full grid resolution
#[derive(Debug, Clone)]
pub struct TiePointGrid {
    pub name: String,
    pub data: Array2<f64>,
}

impl TiePointGrid {
    pub fn new(name: &str, data: Array2<f64>) -> Self {
        Self {
            name: name.to_string(),
            data,
        }
    }
}

/// A georeferenced raster dataset: one pixel grid shared by all its layers
#[derive(Debug, Clone)]
pub struct Product {
    pub name: String,
    pub product_type: String,
    pub width: usize,
    pub height: usize,
    pub geocoding: Option<Arc<dyn GeoCoding>>,
    pub bands: Vec<Band>,
    pub tie_point_grids: Vec<TiePointGrid>,
    pub flag_codings: Vec<SampleCoding>,
    pub index_codings: Vec<SampleCoding>,
    pub masks: Vec<Mask>,
}

impl Product {
    pub fn new(name: &str, product_type: &str, width: usize, height: usize) -> Self {
        Self {
            name: name.to_string(),
            product_type: product_type.to_string(),
            width,
            height,
            geocoding: None,
            bands: Vec::new(),
            tie_point_grids: Vec::new(),
            flag_codings: Vec::new(),
            index_codings: Vec::new(),
            masks: Vec::new(),
        }
    }

    pub fn set_geocoding(&mut self, geocoding: Arc<dyn GeoCoding>) {
        self.geocoding = Some(geocoding);
    }

    pub fn add_band(&mut self, band: Band) -> CollocResult<()> {
        self.check_raster(&band.name, band.width(), band.height())?;
        self.bands.push(band);
        Ok(())
    }

    pub fn add_tie_point_grid(&mut self, grid: TiePointGrid) -> CollocResult<()> {
        self.check_raster(&grid.name, grid.data.ncols(), grid.data.nrows())?;
        self.tie_point_grids.push(grid);
        Ok(())
    }

    pub fn add_flag_coding(&mut self, coding: SampleCoding) -> CollocResult<()> {
        if self.flag_codings.iter().any(|c| c.name == coding.name) {
            return Err(CollocError::Configuration(format!(
                "Flag coding '{}' already exists in product '{}'",
                coding.name, self.name
            )));
        }
        self.flag_codings.push(coding);
        Ok(())
    }

    pub fn add_index_coding(&mut self, coding: SampleCoding) -> CollocResult<()> {
        if self.index_codings.iter().any(|c| c.name == coding.name) {
            return Err(CollocError::Configuration(format!(
                "Index coding '{}' already exists in product '{}'",
                coding.name, self.name
            )));
        }
        self.index_codings.push(coding);
        Ok(())
    }

    pub fn add_mask(&mut self, mask: Mask) -> CollocResult<()> {
        if self.contains_raster(&mask.name) {
            return Err(CollocError::Configuration(format!(
                "Mask name '{}' collides with an existing raster in product '{}'",
                mask.name, self.name
            )));
        }
        self.masks.push(mask);
        Ok(())
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.iter().find(|b| b.name == name)
    }

    pub fn tie_point_grid(&self, name: &str) -> Option<&TiePointGrid> {
        self.tie_point_grids.iter().find(|g| g.name == name)
    }

    pub fn flag_coding(&self, name: &str) -> Option<&SampleCoding> {
        self.flag_codings.iter().find(|c| c.name == name)
    }

    pub fn index_coding(&self, name: &str) -> Option<&SampleCoding> {
        self.index_codings.iter().find(|c| c.name == name)
    }

    pub fn mask(&self, name: &str) -> Option<&Mask> {
        self.masks.iter().find(|m| m.name == name)
    }

    /// Bands, tie-point grids and masks share one namespace
    pub fn contains_raster(&self, name: &str) -> bool {
        self.bands.iter().any(|b| b.name == name)
            || self.tie_point_grids.iter().any(|g| g.name == name)
            || self.masks.iter().any(|m| m.name == name)
    }

    /// True when the scene geocoding is the only geocoding in use. A product
    /// whose bands carry their own geocodings is geocoded band by band.
    pub fn is_using_single_geocoding(&self) -> bool {
        self.bands.iter().all(|band| match (&band.geocoding, &self.geocoding) {
            (None, _) => true,
            (Some(own), Some(scene)) => Arc::ptr_eq(own, scene),
            (Some(_), None) => false,
        })
    }

    fn check_raster(&self, name: &str, width: usize, height: usize) -> CollocResult<()> {
        if width != self.width || height != self.height {
            return Err(CollocError::Configuration(format!(
                "Raster '{}' is {}x{} but product '{}' is {}x{}",
                name, width, height, self.name, self.width, self.height
            )));
        }
        if self.contains_raster(name) {
            return Err(CollocError::Configuration(format!(
                "Raster '{}' already exists in product '{}'",
                name, self.name
            )));
        }
        Ok(())
    }
}

/// Error types for collocation and elevation lookup
#[derive(Debug, thiserror::Error)]
pub enum CollocError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Problem reading DEM: {0}")]
    DemRead(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Result type for collocation operations
pub type CollocResult<T> = Result<T, CollocError>;
