//! Raster and elevation I/O

pub mod product_reader;
pub mod dem;

pub use product_reader::{read_product, write_geotiff, GdalProductReader, ProductReader};
pub use dem::{ElevationModel, ElevationTile, FileElevationModel};
