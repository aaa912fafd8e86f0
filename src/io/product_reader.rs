use crate::core::geocoding::AffineGeoCoding;
use crate::types::{Band, CollocError, CollocResult, Product, SampleType};
use gdal::raster::{Buffer, GdalDataType};
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::Array2;
use std::path::Path;
use std::sync::Arc;

/// Source of in-memory products
pub trait ProductReader {
    fn read_product(&self, path: &Path) -> CollocResult<Product>;
}

/// GDAL-backed reader for single-file rasters (GeoTIFF, ENVI, HGT...)
#[derive(Debug, Clone)]
pub struct GdalProductReader {
    /// Product type label given to every product read
    pub product_type: String,
}

impl GdalProductReader {
    pub fn new() -> Self {
        Self {
            product_type: "GDAL".to_string(),
        }
    }
}

impl Default for GdalProductReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductReader for GdalProductReader {
    fn read_product(&self, path: &Path) -> CollocResult<Product> {
        log::info!("Reading product from: {}", path.display());

        let dataset = Dataset::open(path)?;
        let (width, height) = dataset.raster_size();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut product = Product::new(&name, &self.product_type, width, height);

        match dataset.geo_transform() {
            Ok(coeffs) => {
                log::debug!("Geotransform of {}: {:?}", name, coeffs);
                product.set_geocoding(Arc::new(AffineGeoCoding::from_gdal(coeffs)?));
            }
            Err(e) => log::warn!("{} has no geotransform: {}", path.display(), e),
        }

        for index in 1..=dataset.raster_count() {
            let rasterband = dataset.rasterband(index)?;
            let buffer = rasterband.read_as::<f64>((0, 0), (width, height), (width, height), None)?;
            let data = Array2::from_shape_vec((height, width), buffer.data)
                .map_err(|e| CollocError::Processing(format!("Failed to reshape band {}: {}", index, e)))?;

            let band_name = match rasterband.description() {
                Ok(description) if !description.trim().is_empty() => description.trim().to_string(),
                _ => format!("band_{}", index),
            };
            let mut band = Band::new(&band_name, sample_type_of(rasterband.band_type()), data);
            if let Some(no_data) = rasterband.no_data_value() {
                band = band.with_no_data(no_data);
            }
            log::debug!("Read band '{}' ({:?})", band.name, band.sample_type);
            product.add_band(band)?;
        }

        Ok(product)
    }
}

fn sample_type_of(data_type: GdalDataType) -> SampleType {
    match data_type {
        GdalDataType::UInt8 => SampleType::UInt8,
        GdalDataType::Int16 => SampleType::Int16,
        GdalDataType::UInt16 => SampleType::UInt16,
        GdalDataType::Int32 => SampleType::Int32,
        GdalDataType::UInt32 => SampleType::UInt32,
        GdalDataType::Float32 => SampleType::Float32,
        _ => SampleType::Float64,
    }
}

/// Read `path` with the default GDAL reader
pub fn read_product<P: AsRef<Path>>(path: P) -> CollocResult<Product> {
    GdalProductReader::new().read_product(path.as_ref())
}

/// Write the bands of `product` as a float64 multi-band GeoTIFF on EPSG:4326
pub fn write_geotiff<P: AsRef<Path>>(product: &Product, output_path: P) -> CollocResult<()> {
    log::info!("Saving product '{}' as GeoTIFF: {}", product.name, output_path.as_ref().display());

    if product.bands.is_empty() {
        return Err(CollocError::InvalidFormat(format!("Product '{}' has no bands", product.name)));
    }
    let (width, height) = (product.width, product.height);

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<f64, _>(
        output_path.as_ref(),
        width as isize,
        height as isize,
        product.bands.len() as isize,
    )?;

    if let Some(transform) = product
        .geocoding
        .as_ref()
        .and_then(|g| g.geo_transform())
        .map(|transform| transform.to_gdal())
    {
        dataset.set_geo_transform(&transform)?;
        dataset.set_spatial_ref(&gdal::spatial_ref::SpatialRef::from_epsg(4326)?)?;
    }

    for (i, band) in product.bands.iter().enumerate() {
        let mut rasterband = dataset.rasterband(i as isize + 1)?;
        let flat_data: Vec<f64> = band.data.iter().cloned().collect();
        let buffer = Buffer::new((width, height), flat_data);
        rasterband.write((0, 0), (width, height), &buffer)?;
        rasterband.set_description(&band.name)?;
        if band.no_data_used {
            rasterband.set_no_data_value(Some(band.no_data_value))?;
        }
    }

    log::info!("GeoTIFF saved with {} bands", product.bands.len());
    Ok(())
}
