//! Percentile stretch to 8-bit display values

use crate::maybe_rayon::*;
use crate::pixel::{band_refs, product_band};
use ndarray::Array2;
use orbis_core::{Algorithm, BandSelector, DataType, Error, Image, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Parameters of [`rgb`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RgbParams {
    /// Bands to stretch; empty means every band
    pub bands: BandSelector,
    /// Percentile mapped to display value 1
    pub low_percentile: f64,
    /// Percentile mapped to display value 255
    pub high_percentile: f64,
}

impl Default for RgbParams {
    fn default() -> Self {
        Self {
            bands: BandSelector::all(),
            low_percentile: 2.0,
            high_percentile: 98.0,
        }
    }
}

/// Value at percentile `p` (0..=100) of sorted data, linearly interpolated
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let pos = p / 100.0 * (sorted.len() - 1) as f64;
    let below = pos.floor() as usize;
    let above = pos.ceil() as usize;
    let frac = pos - below as f64;
    sorted[below] + (sorted[above] - sorted[below]) * frac
}

/// Linear stretch of each band between its low and high percentiles to
/// `1..=255`, with 0 as nodata.
///
/// A band whose valid values are constant maps every valid pixel to 1.
pub fn rgb(image: &Image, output_name: &str, params: &RgbParams) -> Result<Image> {
    let (lo_p, hi_p) = (params.low_percentile, params.high_percentile);
    if !(0.0..=100.0).contains(&lo_p) || !(0.0..=100.0).contains(&hi_p) || lo_p >= hi_p {
        return Err(Error::InvalidRange { lo: lo_p, hi: hi_p });
    }
    let indices = image.select(&params.bands)?;
    let bands = band_refs(image, &indices)?;
    info!(image = image.name(), bands = bands.len(), lo_p, hi_p, "stretching to 8 bit");

    let (rows, cols) = image.shape();
    let mut output = image.empty_like(output_name);

    for band in bands {
        let mut valid: Vec<f64> = band.raster().valid_values().collect();
        valid.sort_by(|a, b| a.total_cmp(b));

        let (lo, hi) = if valid.is_empty() {
            (0.0, 0.0)
        } else {
            (percentile(&valid, lo_p), percentile(&valid, hi_p))
        };
        debug!(band = band.tag(), lo, hi, "stretch bounds");
        let span = hi - lo;

        let data: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = vec![0.0; cols];
                for (col, out) in row_data.iter_mut().enumerate() {
                    let v = unsafe { band.raster().get_unchecked(row, col) };
                    if !band.is_valid(v) {
                        continue;
                    }
                    *out = if span <= 0.0 {
                        1.0
                    } else {
                        (1.0 + (v - lo) / span * 254.0).round().clamp(1.0, 255.0)
                    };
                }
                row_data
            })
            .collect();

        let data = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        output.push_band(product_band(image, band.tag(), data, DataType::UInt8, 0.0)?)?;
    }
    Ok(output)
}

/// 8-bit display stretch algorithm
#[derive(Debug, Clone, Default)]
pub struct Rgb;

impl Algorithm for Rgb {
    type Input = Image;
    type Output = Image;
    type Params = RgbParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "RGB"
    }

    fn description(&self) -> &'static str {
        "Stretch bands between their 2nd and 98th percentiles to 8-bit display values"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        rgb(&input, &format!("{}_rgb", input.name()), &params)
    }
}
