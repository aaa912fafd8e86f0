//! Collocation of a slave product onto the pixel grid of a master product
//!
//! Every target pixel centre is geolocated with the master geocoding, mapped
//! into slave pixel space with the slave geocoding, and every slave layer is
//! resampled there. Band names, expressions, codings and masks of both
//! inputs are merged through [`MetadataMerger`].

use crate::core::geocoding::{GeoCoding, GeoCodingSource};
use crate::core::merge::{ComponentRenamer, MergePlan, MetadataMerger, Side};
use crate::core::resampling::{RasterSampler, Resampling, ResamplingIndex, ResamplingMethod};
use crate::types::{Band, CollocError, CollocResult, PixelPos, Product, SampleType, TiePointGrid};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_TARGET_PRODUCT_TYPE: &str = "COLLOCATED";
pub const DEFAULT_MASTER_COMPONENT_PATTERN: &str = "${ORIGINAL_NAME}_M";
pub const DEFAULT_SLAVE_COMPONENT_PATTERN: &str = "${ORIGINAL_NAME}_S";

/// Collocation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollocateOptions {
    /// Product type label of the target
    pub target_product_type: String,
    /// Apply `master_component_pattern` to every master component
    pub rename_master_components: bool,
    /// Apply `slave_component_pattern` to every slave component
    pub rename_slave_components: bool,
    pub master_component_pattern: String,
    pub slave_component_pattern: String,
    pub resampling: ResamplingMethod,
}

impl Default for CollocateOptions {
    fn default() -> Self {
        Self {
            target_product_type: DEFAULT_TARGET_PRODUCT_TYPE.to_string(),
            rename_master_components: true,
            rename_slave_components: true,
            master_component_pattern: DEFAULT_MASTER_COMPONENT_PATTERN.to_string(),
            slave_component_pattern: DEFAULT_SLAVE_COMPONENT_PATTERN.to_string(),
            resampling: ResamplingMethod::NearestNeighbour,
        }
    }
}

/// Sampling adapter over one slave layer
#[derive(Debug, Clone, Copy)]
pub struct LayerSampler<'a> {
    data: &'a Array2<f64>,
    no_data: Option<f64>,
}

impl<'a> LayerSampler<'a> {
    pub fn new(data: &'a Array2<f64>, no_data: Option<f64>) -> Self {
        Self { data, no_data }
    }
}

impl RasterSampler for LayerSampler<'_> {
    fn width(&self) -> usize {
        self.data.ncols()
    }

    fn height(&self) -> usize {
        self.data.nrows()
    }

    fn get_sample(&self, x: usize, y: usize) -> CollocResult<f64> {
        let sample = *self.data.get((y, x)).ok_or_else(|| {
            CollocError::Processing(format!(
                "Sample ({}, {}) outside {}x{} layer",
                x,
                y,
                self.data.ncols(),
                self.data.nrows()
            ))
        })?;
        if self.no_data == Some(sample) {
            Ok(f64::NAN)
        } else {
            Ok(sample)
        }
    }
}

/// Slave pixel position of every target pixel, row-major; None where the
/// target pixel has no counterpart in the slave grid
#[derive(Debug, Clone)]
pub struct PixelMap {
    pub width: usize,
    pub height: usize,
    pub slave_width: usize,
    pub slave_height: usize,
    pub positions: Vec<Option<PixelPos>>,
}

impl PixelMap {
    /// Map every target pixel centre through `master` then `slave`
    pub fn compute(
        master: &dyn GeoCoding,
        width: usize,
        height: usize,
        slave: &dyn GeoCoding,
        slave_width: usize,
        slave_height: usize,
    ) -> Self {
        let locate = |k: usize| {
            let geo = master.pixel_to_geo(&PixelPos::centre_of(k % width, k / width));
            if !geo.is_valid() {
                return None;
            }
            let pixel = slave.geo_to_pixel(&geo);
            if pixel.is_within(slave_width, slave_height) {
                Some(pixel)
            } else {
                None
            }
        };

        #[cfg(feature = "parallel")]
        let positions = {
            use rayon::prelude::*;
            (0..width * height).into_par_iter().map(locate).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let positions = (0..width * height).map(locate).collect();

        Self {
            width,
            height,
            slave_width,
            slave_height,
            positions,
        }
    }

    pub fn valid_count(&self) -> usize {
        self.positions.iter().filter(|p| p.is_some()).count()
    }
}

/// Collocation operator
#[derive(Debug, Clone)]
pub struct Collocator {
    options: CollocateOptions,
    resampling: Resampling,
    merger: MetadataMerger,
}

impl Collocator {
    /// Validate the options. Unknown kernels and malformed rename patterns
    /// fail here, before any product is touched.
    pub fn new(options: CollocateOptions) -> CollocResult<Self> {
        let resampling = Resampling::new(options.resampling)?;
        let merger = MetadataMerger::new(
            ComponentRenamer::new(
                Side::Master,
                options.rename_master_components,
                &options.master_component_pattern,
            )?,
            ComponentRenamer::new(
                Side::Slave,
                options.rename_slave_components,
                &options.slave_component_pattern,
            )?,
        );
        Ok(Self {
            options,
            resampling,
            merger,
        })
    }

    pub fn options(&self) -> &CollocateOptions {
        &self.options
    }

    /// Collocate `slave` onto the grid of `master` into a new product
    pub fn collocate(&self, master: &Product, slave: &Product) -> CollocResult<Product> {
        log::info!(
            "Collocating '{}' ({}x{}) onto '{}' ({}x{}) with {}",
            slave.name,
            slave.width,
            slave.height,
            master.name,
            master.width,
            master.height,
            self.resampling.method()
        );

        let master_geocoding = master
            .geocoding
            .as_ref()
            .filter(|g| g.can_get_geo_pos())
            .ok_or_else(|| {
                CollocError::Configuration(format!("Master product '{}' has no usable geocoding", master.name))
            })?;
        let slave_source = GeoCodingSource::of(slave)?;
        let master_single = master.is_using_single_geocoding();

        let plan = self.merger.plan(master, slave)?;

        let mut target = Product::new(
            &master.name,
            &self.options.target_product_type,
            master.width,
            master.height,
        );
        target.set_geocoding(Arc::clone(master_geocoding));

        for band in &master.bands {
            let mut merged = self.rename_band(band, &plan, Side::Master)?;
            if master_single {
                merged.geocoding = None;
            }
            target.add_band(merged)?;
        }
        for grid in &master.tie_point_grids {
            let name = plan.master.raster(&grid.name).unwrap_or(grid.name.as_str());
            target.add_tie_point_grid(TiePointGrid::new(name, grid.data.clone()))?;
        }

        let mut pixel_maps: HashMap<usize, PixelMap> = HashMap::new();
        let mut valid_pixels = 0usize;
        let mut total_pixels = 0usize;

        for band in &slave.bands {
            let geocoding = slave_source.for_band(band).ok_or_else(|| {
                CollocError::Configuration(format!("Slave band '{}' has no geocoding", band.name))
            })?;
            let map = self.pixel_map(&mut pixel_maps, master_geocoding, master, geocoding, slave)?;
            valid_pixels += map.valid_count();
            total_pixels += map.positions.len();

            let mut merged = self.rename_band(band, &plan, Side::Slave)?;
            let fill = band.effective_no_data().unwrap_or(f64::NAN);
            merged.data = self.resample_layer(LayerSampler::new(&band.data, band.effective_no_data()), map, fill)?;
            merged.sample_type = self.target_sample_type(band.sample_type);
            merged.no_data_value = fill;
            merged.no_data_used = true;
            merged.geocoding = None;
            log::debug!("Resampled slave band '{}' -> '{}'", band.name, merged.name);
            target.add_band(merged)?;
        }

        if !slave.tie_point_grids.is_empty() {
            let geocoding = slave_source.scene().ok_or_else(|| {
                CollocError::Configuration(format!("Slave product '{}' has no scene geocoding", slave.name))
            })?;
            for grid in &slave.tie_point_grids {
                let map = self.pixel_map(&mut pixel_maps, master_geocoding, master, geocoding, slave)?;
                let name = plan.slave.raster(&grid.name).unwrap_or(grid.name.as_str());
                let data = self.resample_layer(LayerSampler::new(&grid.data, None), map, f64::NAN)?;
                let band = Band::new(name, SampleType::Float32, data).with_no_data(f64::NAN);
                log::debug!("Resampled slave tie-point grid '{}' -> '{}'", grid.name, name);
                target.add_band(band)?;
            }
        }

        for coding in plan.flag_codings {
            target.add_flag_coding(coding)?;
        }
        for coding in plan.index_codings {
            target.add_index_coding(coding)?;
        }
        for mask in plan.masks {
            target.add_mask(mask)?;
        }

        if total_pixels > 0 {
            let coverage = valid_pixels as f64 / total_pixels as f64 * 100.0;
            log::info!(
                "Collocation completed: {} bands, {:.1}% slave coverage",
                target.bands.len(),
                coverage
            );
        } else {
            log::info!("Collocation completed: {} bands", target.bands.len());
        }

        Ok(target)
    }

    /// Copy of `band` with its names and expression mapped to the target
    fn rename_band(&self, band: &Band, plan: &MergePlan, side: Side) -> CollocResult<Band> {
        let renames = plan.renames(side);
        let mut merged = band.clone();
        merged.name = renames.raster(&band.name).unwrap_or(band.name.as_str()).to_string();
        merged.valid_pixel_expression = band
            .valid_pixel_expression
            .as_deref()
            .map(|expression| renames.rewrite_expression(expression))
            .transpose()?;
        merged.sample_coding = band
            .sample_coding
            .as_deref()
            .map(|coding| renames.coding(coding).unwrap_or(coding).to_string());
        Ok(merged)
    }

    /// Nearest neighbour keeps the native type, interpolation needs floats
    fn target_sample_type(&self, source: SampleType) -> SampleType {
        if self.resampling.method() == ResamplingMethod::NearestNeighbour || source.is_floating_point() {
            source
        } else {
            SampleType::Float32
        }
    }

    fn pixel_map<'m>(
        &self,
        cache: &'m mut HashMap<usize, PixelMap>,
        master_geocoding: &Arc<dyn GeoCoding>,
        master: &Product,
        slave_geocoding: &Arc<dyn GeoCoding>,
        slave: &Product,
    ) -> CollocResult<&'m PixelMap> {
        if !slave_geocoding.can_get_pixel_pos() {
            return Err(CollocError::Configuration(format!(
                "Geocoding of slave product '{}' cannot compute pixel positions",
                slave.name
            )));
        }
        let key = Arc::as_ptr(slave_geocoding) as *const () as usize;
        Ok(cache.entry(key).or_insert_with(|| {
            PixelMap::compute(
                master_geocoding.as_ref(),
                master.width,
                master.height,
                slave_geocoding.as_ref(),
                slave.width,
                slave.height,
            )
        }))
    }

    fn resample_pixel(
        &self,
        sampler: &LayerSampler<'_>,
        position: &Option<PixelPos>,
        map: &PixelMap,
        index: &mut ResamplingIndex,
        fill: f64,
    ) -> f64 {
        let Some(pixel) = position else {
            return fill;
        };
        self.resampling
            .compute_index(pixel.x, pixel.y, map.slave_width, map.slave_height, index);
        match self.resampling.resample(sampler, index) {
            Ok(value) if !value.is_nan() => value,
            _ => fill,
        }
    }

    #[cfg(feature = "parallel")]
    fn resample_layer(&self, sampler: LayerSampler<'_>, map: &PixelMap, fill: f64) -> CollocResult<Array2<f64>> {
        use rayon::prelude::*;

        let values: Vec<f64> = map
            .positions
            .par_iter()
            .map_init(
                || self.resampling.create_index(),
                |index, position| self.resample_pixel(&sampler, position, map, index, fill),
            )
            .collect();

        Array2::from_shape_vec((map.height, map.width), values)
            .map_err(|e| CollocError::Processing(format!("Failed to reshape resampled layer: {}", e)))
    }

    #[cfg(not(feature = "parallel"))]
    fn resample_layer(&self, sampler: LayerSampler<'_>, map: &PixelMap, fill: f64) -> CollocResult<Array2<f64>> {
        let mut index = self.resampling.create_index();
        let values: Vec<f64> = map
            .positions
            .iter()
            .map(|position| self.resample_pixel(&sampler, position, map, &mut index, fill))
            .collect();

        Array2::from_shape_vec((map.height, map.width), values)
            .map_err(|e| CollocError::Processing(format!("Failed to reshape resampled layer: {}", e)))
    }
}

/// Collocate `slave` onto `master` with the given options
pub fn collocate(master: &Product, slave: &Product, options: &CollocateOptions) -> CollocResult<Product> {
    Collocator::new(options.clone())?.collocate(master, slave)
}
