//! Metadata merge engine for collocation
//!
//! Decides the target name of every band, tie-point grid, sample coding and
//! mask of the two inputs, rewrites the valid-pixel and mask expressions to
//! the new names, and merges codings and masks without collisions.

use crate::core::expression::rename_identifiers;
use crate::types::{CollocError, CollocResult, Mask, Product, SampleCoding};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Placeholder replaced by the original identifier in a rename pattern
pub const ORIGINAL_NAME_PLACEHOLDER: &str = "${ORIGINAL_NAME}";

/// Which input a component comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Master,
    Slave,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Master => write!(f, "master"),
            Side::Slave => write!(f, "slave"),
        }
    }
}

/// Rename rule of one side
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRenamer {
    side: Side,
    enabled: bool,
    pattern: String,
}

impl ComponentRenamer {
    pub fn new(side: Side, enabled: bool, pattern: &str) -> CollocResult<Self> {
        if !pattern.contains(ORIGINAL_NAME_PLACEHOLDER) {
            return Err(CollocError::Configuration(format!(
                "The {} component pattern '{}' must contain {}",
                side, pattern, ORIGINAL_NAME_PLACEHOLDER
            )));
        }
        Ok(Self {
            side,
            enabled,
            pattern: pattern.to_string(),
        })
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Apply the pattern unconditionally
    pub fn apply_pattern(&self, name: &str) -> String {
        self.pattern.replace(ORIGINAL_NAME_PLACEHOLDER, name)
    }

    /// Target name of a component, honouring the enabled flag
    pub fn rename(&self, name: &str) -> String {
        if self.enabled {
            self.apply_pattern(name)
        } else {
            name.to_string()
        }
    }
}

/// Old -> new names of one side's components
#[derive(Debug, Clone, Default)]
pub struct RenameMap {
    rasters: HashMap<String, String>,
    codings: HashMap<String, String>,
    /// Identifier substitutions for expressions: codings first, then
    /// rasters and masks on top
    expression: HashMap<String, String>,
}

impl RenameMap {
    /// New name of a band, tie-point grid or mask
    pub fn raster(&self, name: &str) -> Option<&str> {
        self.rasters.get(name).map(String::as_str)
    }

    /// New name of a flag or index coding
    pub fn coding(&self, name: &str) -> Option<&str> {
        self.codings.get(name).map(String::as_str)
    }

    pub fn rewrite_expression(&self, expression: &str) -> CollocResult<String> {
        rename_identifiers(expression, &self.expression)
    }

    fn insert_raster(&mut self, old: &str, new: &str) {
        self.rasters.insert(old.to_string(), new.to_string());
        self.expression.insert(old.to_string(), new.to_string());
    }

    fn insert_coding(&mut self, old: &str, new: &str) {
        self.codings.insert(old.to_string(), new.to_string());
        self.expression.entry(old.to_string()).or_insert_with(|| new.to_string());
    }
}

/// Outcome of the metadata merge, consumed by the collocation
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub master: RenameMap,
    pub slave: RenameMap,
    pub flag_codings: Vec<SampleCoding>,
    pub index_codings: Vec<SampleCoding>,
    pub masks: Vec<Mask>,
}

impl MergePlan {
    pub fn renames(&self, side: Side) -> &RenameMap {
        match side {
            Side::Master => &self.master,
            Side::Slave => &self.slave,
        }
    }
}

/// Computes the [`MergePlan`] of two products
#[derive(Debug, Clone)]
pub struct MetadataMerger {
    master: ComponentRenamer,
    slave: ComponentRenamer,
}

impl MetadataMerger {
    pub fn new(master: ComponentRenamer, slave: ComponentRenamer) -> Self {
        Self { master, slave }
    }

    pub fn plan(&self, master: &Product, slave: &Product) -> CollocResult<MergePlan> {
        let mut master_map = RenameMap::default();
        let mut slave_map = RenameMap::default();

        // Bands, tie-point grids and masks share one namespace in the target
        let mut rasters: HashSet<String> = HashSet::new();
        for (renamer, product, map) in [
            (&self.master, master, &mut master_map),
            (&self.slave, slave, &mut slave_map),
        ] {
            let names = product
                .bands
                .iter()
                .map(|b| b.name.as_str())
                .chain(product.tie_point_grids.iter().map(|g| g.name.as_str()));
            for name in names {
                let new_name = renamer.rename(name);
                place(&mut rasters, &new_name, renamer.side(), "raster")?;
                map.insert_raster(name, &new_name);
            }
        }

        let mut flag_codings = Vec::new();
        let mut index_codings = Vec::new();
        let mut flag_names: HashSet<String> = HashSet::new();
        let mut index_names: HashSet<String> = HashSet::new();
        for (renamer, product, map) in [
            (&self.master, master, &mut master_map),
            (&self.slave, slave, &mut slave_map),
        ] {
            for coding in &product.flag_codings {
                let merged = merge_coding(renamer, product, map, coding, &mut flag_names)?;
                flag_codings.push(merged);
            }
            for coding in &product.index_codings {
                let merged = merge_coding(renamer, product, map, coding, &mut index_names)?;
                index_codings.push(merged);
            }
        }

        // Masks go last so their expressions see every renamed raster
        let mut masks = Vec::new();
        for (renamer, product, map) in [
            (&self.master, master, &mut master_map),
            (&self.slave, slave, &mut slave_map),
        ] {
            for mask in &product.masks {
                let new_name = renamer.rename(&mask.name);
                place(&mut rasters, &new_name, renamer.side(), "mask")?;
                map.insert_raster(&mask.name, &new_name);
            }
            for mask in &product.masks {
                let mut merged = mask.clone();
                merged.name = map.raster(&mask.name).unwrap_or(mask.name.as_str()).to_string();
                merged.expression = map.rewrite_expression(&mask.expression)?;
                log::debug!("Mask '{}' -> '{}'", mask.name, merged.name);
                masks.push(merged);
            }
        }

        log::info!(
            "Merged metadata: {} rasters, {} flag codings, {} index codings, {} masks",
            rasters.len(),
            flag_codings.len(),
            index_codings.len(),
            masks.len()
        );

        Ok(MergePlan {
            master: master_map,
            slave: slave_map,
            flag_codings,
            index_codings,
            masks,
        })
    }
}

fn place(placed: &mut HashSet<String>, name: &str, side: Side, kind: &str) -> CollocResult<()> {
    if !placed.insert(name.to_string()) {
        return Err(CollocError::Configuration(format!(
            "The {} {} name '{}' collides with an already merged component",
            side, kind, name
        )));
    }
    Ok(())
}

/// Rename one coding. On collision the pattern is applied to the new name of
/// the band that uses the coding; a second collision is an error.
fn merge_coding(
    renamer: &ComponentRenamer,
    product: &Product,
    map: &mut RenameMap,
    coding: &SampleCoding,
    placed: &mut HashSet<String>,
) -> CollocResult<SampleCoding> {
    let mut new_name = renamer.rename(&coding.name);

    if placed.contains(&new_name) {
        let owner = product
            .bands
            .iter()
            .find(|b| b.sample_coding.as_deref() == Some(coding.name.as_str()))
            .and_then(|b| map.raster(&b.name));
        let fallback = owner.map(|band_name| renamer.apply_pattern(band_name));
        match fallback {
            Some(name) if !placed.contains(&name) => {
                log::info!(
                    "Coding '{}' of the {} collides, renamed to '{}'",
                    coding.name,
                    renamer.side(),
                    name
                );
                new_name = name;
            }
            _ => {
                return Err(CollocError::Configuration(format!(
                    "The {} coding '{}' collides as '{}' and cannot be renamed unambiguously",
                    renamer.side(),
                    coding.name,
                    new_name
                )));
            }
        }
    }

    placed.insert(new_name.clone());
    map.insert_coding(&coding.name, &new_name);
    let mut merged = coding.clone();
    merged.name = new_name;
    Ok(merged)
}
