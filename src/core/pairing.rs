//! Selection of companion (slave) products for a master from a product
//! catalog: same footprint, product type and pass, acquired earlier.

use crate::types::{CollocError, CollocResult, GeoPos, PixelPos, Product};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Catalog record of one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductEntry {
    pub id: i64,
    pub name: String,
    pub product_type: String,
    /// Orbit pass, e.g. ASCENDING or DESCENDING
    pub pass: String,
    pub first_line_time: DateTime<Utc>,
    pub centre: GeoPos,
}

/// Geographic bounding box of a catalogued product
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl GeoBounds {
    pub fn contains(&self, pos: &GeoPos) -> bool {
        pos.is_valid()
            && pos.lat >= self.min_lat
            && pos.lat <= self.max_lat
            && pos.lon >= self.min_lon
            && pos.lon <= self.max_lon
    }
}

/// Query sent to a catalog
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFilter {
    /// Candidates must cover this point
    pub centre: GeoPos,
    pub product_type: String,
    pub pass: String,
    /// Name of the product the search is run for
    pub exclude_name: String,
    pub end_date: Option<DateTime<Utc>>,
}

/// Anything that can answer a [`CandidateFilter`]
pub trait ProductQuery {
    fn query(&self, filter: &CandidateFilter) -> CollocResult<Vec<ProductEntry>>;
}

/// In-memory catalog
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    entries: Vec<(ProductEntry, GeoBounds)>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: ProductEntry, bounds: GeoBounds) {
        self.entries.push((entry, bounds));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ProductQuery for ProductCatalog {
    fn query(&self, filter: &CandidateFilter) -> CollocResult<Vec<ProductEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|(entry, bounds)| {
                entry.name != filter.exclude_name
                    && entry.product_type == filter.product_type
                    && entry.pass == filter.pass
                    && bounds.contains(&filter.centre)
            })
            .map(|(entry, _)| entry.clone())
            .collect())
    }
}

/// Geographic position of the centre pixel of `product`
pub fn master_centre(product: &Product) -> CollocResult<GeoPos> {
    let geocoding = product
        .geocoding
        .as_ref()
        .filter(|g| g.can_get_geo_pos())
        .ok_or_else(|| CollocError::Configuration(format!("Product '{}' has no geocoding", product.name)))?;
    let centre = PixelPos::new((product.width / 2) as f64, (product.height / 2) as f64);
    Ok(geocoding.pixel_to_geo(&centre))
}

/// Up to `max_slaves` catalogued products that pair with `master`, closest
/// acquisition first. Only products more than one day older than the master
/// qualify; `any_date` lifts the cutoff on the query end date.
pub fn find_companion_products<Q: ProductQuery + ?Sized>(
    db: &Q,
    master: &ProductEntry,
    max_slaves: usize,
    any_date: bool,
) -> CollocResult<Vec<ProductEntry>> {
    let filter = CandidateFilter {
        centre: master.centre,
        product_type: master.product_type.clone(),
        pass: master.pass.clone(),
        exclude_name: master.name.clone(),
        end_date: Some(master.first_line_time),
    };
    let entries = db.query(&filter)?;
    log::debug!("Catalog returned {} candidates for '{}'", entries.len(), master.name);
    if entries.is_empty() {
        return Ok(entries);
    }

    let pairs = closest_date_pairs(entries, master, filter.end_date, max_slaves, any_date);
    log::info!("Selected {} companion products for '{}'", pairs.len(), master.name);
    Ok(pairs)
}

fn closest_date_pairs(
    entries: Vec<ProductEntry>,
    master: &ProductEntry,
    end_date: Option<DateTime<Utc>>,
    max_slaves: usize,
    any_date: bool,
) -> Vec<ProductEntry> {
    let master_time = master.first_line_time;
    let cutoff = match end_date {
        Some(end) if end > master_time => end,
        _ => master_time,
    };
    let min_gap = Duration::days(1);

    let mut candidates: Vec<(Duration, ProductEntry)> = entries
        .into_iter()
        .filter(|entry| any_date || entry.first_line_time < cutoff)
        .map(|entry| (master_time - entry.first_line_time, entry))
        .filter(|(diff, _)| *diff > min_gap)
        .collect();
    candidates.sort_by_key(|(diff, _)| *diff);

    candidates
        .into_iter()
        .take(max_slaves)
        .map(|(_, entry)| entry)
        .collect()
}
