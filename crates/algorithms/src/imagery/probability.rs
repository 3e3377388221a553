//! Linear rescaling of an index to a probability

use crate::mask::create_mask;
use crate::pixel::{float_band, map_bands};
use orbis_core::{Algorithm, BandRef, BandSelector, Error, Image, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Parameters of [`index_to_probability`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbabilityParams {
    /// Band holding the index
    pub band: BandRef,
    /// Index value mapped to probability 0
    pub lo: f64,
    /// Index value mapped to probability 1
    pub hi: f64,
    /// Bands that must be valid for a pixel to be rescaled; empty selects
    /// every band
    pub mask: BandSelector,
}

impl Default for ProbabilityParams {
    fn default() -> Self {
        Self {
            band: BandRef::Index(0),
            lo: 0.0,
            hi: 1.0,
            mask: BandSelector::all(),
        }
    }
}

/// `p = clamp((v - lo) / (hi - lo), 0, 1)` on one band.
///
/// A pixel that is nodata in any band of `image` is nodata in the output.
/// Requires finite `lo < hi`.
pub fn index_to_probability(
    image: &Image,
    band: &BandRef,
    lo: f64,
    hi: f64,
    output_name: &str,
) -> Result<Image> {
    index_to_probability_masked(image, band, lo, hi, &BandSelector::all(), output_name)
}

/// [`index_to_probability`] where only the bands in `mask` (and the index
/// band itself) must be valid
pub fn index_to_probability_masked(
    image: &Image,
    band: &BandRef,
    lo: f64,
    hi: f64,
    mask: &BandSelector,
    output_name: &str,
) -> Result<Image> {
    if !(lo.is_finite() && hi.is_finite() && lo < hi) {
        return Err(Error::InvalidRange { lo, hi });
    }
    let index = image.resolve(band)?;
    let tag = image.band(index).map(|b| b.tag().to_string()).unwrap_or_default();
    info!(image = image.name(), band = %tag, lo, hi, "rescaling index to probability");

    let valid = create_mask(image, mask)?;
    let span = hi - lo;
    let data = map_bands(image, &[index], Some(&valid), |v| {
        Some(((v[0] - lo) / span).clamp(0.0, 1.0))
    })?;

    let mut output = image.empty_like(output_name);
    output.push_band(float_band(image, &tag, data)?)?;
    Ok(output)
}

/// Index-to-probability algorithm
#[derive(Debug, Clone, Default)]
pub struct IndexToProbability;

impl Algorithm for IndexToProbability {
    type Input = Image;
    type Output = Image;
    type Params = ProbabilityParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Index2Probability"
    }

    fn description(&self) -> &'static str {
        "Linearly rescale an index band between two bounds to a [0, 1] probability"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        index_to_probability_masked(
            &input,
            &params.band,
            params.lo,
            params.hi,
            &params.mask,
            &format!("{}_prob", input.name()),
        )
    }
}
