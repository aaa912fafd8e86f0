//! Core collocation modules

pub mod resampling;
pub mod geocoding;
pub mod expression;
pub mod merge;
pub mod collocate;
pub mod pairing;

// Re-export main types
pub use resampling::{RasterSampler, Resampling, ResamplingIndex, ResamplingMethod};
pub use geocoding::{AffineGeoCoding, GeoCoding, GeoCodingSource};
pub use merge::{ComponentRenamer, MergePlan, MetadataMerger, RenameMap, Side, ORIGINAL_NAME_PLACEHOLDER};
pub use collocate::{collocate, CollocateOptions, Collocator, LayerSampler, PixelMap};
pub use pairing::{
    find_companion_products, master_centre, CandidateFilter, GeoBounds, ProductCatalog, ProductEntry, ProductQuery,
};
