use crate::core::geocoding::GeoCoding;
use crate::core::resampling::{RasterSampler, Resampling, ResamplingIndex, ResamplingMethod};
use crate::io::product_reader::read_product;
use crate::types::{CollocError, CollocResult, GeoPos, PixelPos, Product};
use ndarray::Array2;
use std::path::Path;
use std::sync::Arc;

/// Elevation lookup by geographic position
pub trait ElevationModel: Send + Sync {
    /// Elevation at `geo`, or the no-data value where the model has none
    fn get_elevation(&self, geo: &GeoPos) -> CollocResult<f64>;

    fn get_pixel_pos(&self, geo: &GeoPos) -> PixelPos;

    fn get_geo_pos(&self, pixel: &PixelPos) -> GeoPos;

    fn no_data_value(&self) -> f64;

    fn resampling(&self) -> Resampling;
}

/// Read-only elevation samples of a DEM raster
#[derive(Debug, Clone)]
pub struct ElevationTile {
    data: Array2<f64>,
}

impl ElevationTile {
    pub fn new(data: Array2<f64>) -> Self {
        Self { data }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn get_sample(&self, x: usize, y: usize) -> CollocResult<f64> {
        self.data.get((y, x)).copied().ok_or_else(|| {
            CollocError::DemRead(format!(
                "sample ({}, {}) outside {}x{} tile",
                x,
                y,
                self.width(),
                self.height()
            ))
        })
    }
}

/// Elevation model backed by a single raster file (GeoTIFF, HGT, ENVI...)
///
/// The kernel is stateless, so one model is shared by reference across
/// threads; every query works on its own [`ResamplingIndex`].
#[derive(Debug, Clone)]
pub struct FileElevationModel {
    source: String,
    resampling: Resampling,
    geocoding: Arc<dyn GeoCoding>,
    tile: Arc<ElevationTile>,
    no_data_value: f64,
}

impl FileElevationModel {
    /// Open the DEM at `path`. `dem_no_data` overrides the no-data value of
    /// the file's first band.
    pub fn open<P: AsRef<Path>>(path: P, method: ResamplingMethod, dem_no_data: Option<f64>) -> CollocResult<Self> {
        if method == ResamplingMethod::Delaunay {
            return Err(CollocError::Configuration(
                "Delaunay interpolation for an external DEM file is currently not supported".to_string(),
            ));
        }
        log::info!("Opening elevation model: {}", path.as_ref().display());
        let product = read_product(path.as_ref())?;
        Self::build(&product, &path.as_ref().display().to_string(), method, dem_no_data)
    }

    /// Elevation model over the first band of an in-memory product
    pub fn from_product(product: &Product, method: ResamplingMethod, dem_no_data: Option<f64>) -> CollocResult<Self> {
        if method == ResamplingMethod::Delaunay {
            return Err(CollocError::Configuration(
                "Delaunay interpolation for an external DEM file is currently not supported".to_string(),
            ));
        }
        Self::build(product, &product.name, method, dem_no_data)
    }

    fn build(product: &Product, source: &str, method: ResamplingMethod, dem_no_data: Option<f64>) -> CollocResult<Self> {
        let resampling = Resampling::new(method)?;
        let band = product
            .bands
            .first()
            .ok_or_else(|| CollocError::InvalidFormat(format!("{} contains no elevation band", source)))?;
        let geocoding = product
            .geocoding
            .as_ref()
            .filter(|g| g.can_get_pixel_pos())
            .ok_or_else(|| CollocError::Configuration(format!("{} has an invalid or unsupported geocoding", source)))?;
        let no_data_value = dem_no_data.unwrap_or(band.no_data_value);

        log::debug!(
            "Elevation model {}: {}x{}, no-data {}, {}",
            source,
            band.width(),
            band.height(),
            no_data_value,
            method
        );

        Ok(Self {
            source: source.to_string(),
            resampling,
            geocoding: Arc::clone(geocoding),
            tile: Arc::new(ElevationTile::new(band.data.clone())),
            no_data_value,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tile(&self) -> &Arc<ElevationTile> {
        &self.tile
    }

    /// Elevation at `geo` using the caller's scratch index
    pub fn get_elevation_with(&self, geo: &GeoPos, index: &mut ResamplingIndex) -> CollocResult<f64> {
        self.lookup(geo, index)
            .map_err(|e| CollocError::DemRead(e.to_string()))
    }

    fn lookup(&self, geo: &GeoPos, index: &mut ResamplingIndex) -> CollocResult<f64> {
        let pixel = self.geocoding.geo_to_pixel(geo);
        let (width, height) = (self.tile.width(), self.tile.height());
        if !pixel.is_within(width, height) {
            return Ok(self.no_data_value);
        }

        self.resampling.compute_index(pixel.x, pixel.y, width, height, index);
        let elevation = self.resampling.resample(self, index)?;
        if elevation.is_nan() {
            Ok(self.no_data_value)
        } else {
            Ok(elevation)
        }
    }

    /// Samples at the grid positions `xs` x `ys` (rows follow `ys`) and
    /// whether all of them are valid
    pub fn sample_matrix(&self, xs: &[usize], ys: &[usize]) -> CollocResult<(Array2<f64>, bool)> {
        let mut samples = vec![0.0; xs.len() * ys.len()];
        let all_valid = self.get_samples(xs, ys, &mut samples)?;
        let matrix = Array2::from_shape_vec((ys.len(), xs.len()), samples)
            .map_err(|e| CollocError::Processing(format!("Failed to reshape samples: {}", e)))?;
        Ok((matrix, all_valid))
    }
}

impl RasterSampler for FileElevationModel {
    fn width(&self) -> usize {
        self.tile.width()
    }

    fn height(&self) -> usize {
        self.tile.height()
    }

    fn get_sample(&self, x: usize, y: usize) -> CollocResult<f64> {
        let sample = self.tile.get_sample(x, y)?;
        if sample == self.no_data_value {
            Ok(f64::NAN)
        } else {
            Ok(sample)
        }
    }
}

impl ElevationModel for FileElevationModel {
    fn get_elevation(&self, geo: &GeoPos) -> CollocResult<f64> {
        let mut index = self.resampling.create_index();
        self.get_elevation_with(geo, &mut index)
    }

    fn get_pixel_pos(&self, geo: &GeoPos) -> PixelPos {
        self.geocoding.geo_to_pixel(geo)
    }

    fn get_geo_pos(&self, pixel: &PixelPos) -> GeoPos {
        self.geocoding.pixel_to_geo(pixel)
    }

    fn no_data_value(&self) -> f64 {
        self.no_data_value
    }

    fn resampling(&self) -> Resampling {
        self.resampling
    }
}
