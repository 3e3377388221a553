//! Imagery products
//!
//! Per-pixel products derived from multi-band imagery:
//! - Spectral indices: NDVI, EVI, LSWI, NDSI, BI, SATVI and tillage/water indices
//! - Index rescaling to probabilities
//! - 8-bit percentile stretch for display
//! - Linear band transforms and tasseled cap
//! - Quality-band bit decoding

mod indices;
mod probability;
mod qa;
mod stretch;
mod transform;

pub use indices::{
    compute_indices, compute_indices_masked, evi, indices, lswi, ndsi, ndvi, satvi, spectral_index,
    Indices, IndicesParams, Ndvi, SpectralIndex,
};
pub use probability::{
    index_to_probability, index_to_probability_masked, IndexToProbability, ProbabilityParams,
};
pub use qa::{qa_bit_mask, QA_NODATA};
pub use stretch::{rgb, Rgb, RgbParams};
pub use transform::{linear_transform, tasseled_cap};
