//! Pixel <-> geographic coordinate transforms

use crate::types::{Band, CollocError, CollocResult, GeoPos, GeoTransform, PixelPos, Product};
use std::fmt;
use std::sync::Arc;

/// Bidirectional mapping between the pixel grid of a raster and geographic
/// coordinates. Failures are reported as invalid positions, never as errors.
pub trait GeoCoding: fmt::Debug + Send + Sync {
    fn pixel_to_geo(&self, pixel: &PixelPos) -> GeoPos;

    fn geo_to_pixel(&self, geo: &GeoPos) -> PixelPos;

    fn can_get_geo_pos(&self) -> bool {
        true
    }

    fn can_get_pixel_pos(&self) -> bool {
        true
    }

    /// Affine transform behind this geocoding, if it is a map geocoding
    fn geo_transform(&self) -> Option<GeoTransform> {
        None
    }
}

/// Map geocoding on a geographic lat/lon CRS, driven by an affine transform
/// (x = lon, y = lat)
#[derive(Debug, Clone, PartialEq)]
pub struct AffineGeoCoding {
    transform: GeoTransform,
    /// Inverse matrix [a, b, c, d] mapping (dlon, dlat) to (px, py)
    inverse: [f64; 4],
}

impl AffineGeoCoding {
    pub fn new(transform: GeoTransform) -> CollocResult<Self> {
        let det = transform.pixel_width * transform.pixel_height - transform.rotation_x * transform.rotation_y;
        if !det.is_finite() || det.abs() < f64::EPSILON * f64::EPSILON {
            return Err(CollocError::Configuration(format!(
                "Geotransform is not invertible: {:?}",
                transform
            )));
        }
        let inverse = [
            transform.pixel_height / det,
            -transform.rotation_x / det,
            -transform.rotation_y / det,
            transform.pixel_width / det,
        ];
        Ok(Self { transform, inverse })
    }

    pub fn from_gdal(coeffs: [f64; 6]) -> CollocResult<Self> {
        Self::new(GeoTransform::from_gdal(coeffs))
    }

    /// North-up grid whose upper-left corner sits at (`lat`, `lon`)
    pub fn north_up(lat: f64, lon: f64, pixel_size_lon: f64, pixel_size_lat: f64) -> CollocResult<Self> {
        Self::new(GeoTransform {
            top_left_x: lon,
            pixel_width: pixel_size_lon,
            rotation_x: 0.0,
            top_left_y: lat,
            rotation_y: 0.0,
            pixel_height: -pixel_size_lat,
        })
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }
}

impl GeoCoding for AffineGeoCoding {
    fn pixel_to_geo(&self, pixel: &PixelPos) -> GeoPos {
        if !pixel.is_valid() {
            return GeoPos::invalid();
        }
        let t = &self.transform;
        let lon = t.top_left_x + pixel.x * t.pixel_width + pixel.y * t.rotation_x;
        let lat = t.top_left_y + pixel.x * t.rotation_y + pixel.y * t.pixel_height;
        GeoPos::new(lat, lon)
    }

    fn geo_to_pixel(&self, geo: &GeoPos) -> PixelPos {
        if !geo.is_valid() {
            return PixelPos::invalid();
        }
        let dx = geo.lon - self.transform.top_left_x;
        let dy = geo.lat - self.transform.top_left_y;
        let [a, b, c, d] = self.inverse;
        PixelPos::new(a * dx + b * dy, c * dx + d * dy)
    }

    fn geo_transform(&self) -> Option<GeoTransform> {
        Some(self.transform)
    }
}

/// Where a product's layers get their geocoding from.
///
/// Resolved once per merge: either one transform covers the whole grid, or
/// each band carries its own.
#[derive(Debug, Clone)]
pub enum GeoCodingSource<'a> {
    Single(&'a Arc<dyn GeoCoding>),
    PerBand {
        product: &'a Product,
        scene: Option<&'a Arc<dyn GeoCoding>>,
    },
}

impl<'a> GeoCodingSource<'a> {
    /// Inspect `product` and fail if any of its layers lacks a usable
    /// geocoding
    pub fn of(product: &'a Product) -> CollocResult<Self> {
        if product.is_using_single_geocoding() {
            let scene = product.geocoding.as_ref().ok_or_else(|| {
                CollocError::Configuration(format!("Product '{}' has no geocoding", product.name))
            })?;
            return Ok(GeoCodingSource::Single(scene));
        }

        let source = GeoCodingSource::PerBand {
            product,
            scene: product.geocoding.as_ref(),
        };
        for band in &product.bands {
            if source.for_band(band).is_none() {
                return Err(CollocError::Configuration(format!(
                    "Band '{}' of product '{}' has no geocoding",
                    band.name, product.name
                )));
            }
        }
        if !product.tie_point_grids.is_empty() && product.geocoding.is_none() {
            return Err(CollocError::Configuration(format!(
                "Product '{}' has tie-point grids but no scene geocoding",
                product.name
            )));
        }
        Ok(source)
    }

    pub fn is_single(&self) -> bool {
        matches!(self, GeoCodingSource::Single(_))
    }

    /// Geocoding that applies to `band`
    pub fn for_band(&self, band: &Band) -> Option<&'a Arc<dyn GeoCoding>> {
        match self {
            GeoCodingSource::Single(scene) => Some(*scene),
            GeoCodingSource::PerBand { product, scene } => {
                let product: &'a Product = *product;
                let scene: Option<&'a Arc<dyn GeoCoding>> = *scene;
                match product.band(&band.name).and_then(|b| b.geocoding.as_ref()) {
                    Some(own) => Some(own),
                    None => {
                        if scene.is_some() {
                            log::warn!(
                                "Band '{}' has no own geocoding, using scene geocoding of '{}'",
                                band.name,
                                product.name
                            );
                        }
                        scene
                    }
                }
            }
        }
    }

    /// Geocoding of the whole grid, used for positional layers
    pub fn scene(&self) -> Option<&'a Arc<dyn GeoCoding>> {
        match self {
            GeoCodingSource::Single(scene) => Some(*scene),
            GeoCodingSource::PerBand { scene, .. } => *scene,
        }
    }
}
