//! Quality-assessment band decoding

use crate::pixel::{map_bands_with_nodata, product_band};
use orbis_core::{BandRef, DataType, Error, Image, Result};
use tracing::info;

/// Nodata value of bit masks
pub const QA_NODATA: f64 = 255.0;

/// 1 where any of the 1-based `bits` is set in the quality band, 0 otherwise.
///
/// Output is a UInt8 band named `QAMASK` with nodata 255.
pub fn qa_bit_mask(image: &Image, band: &BandRef, bits: &[u8], output_name: &str) -> Result<Image> {
    if bits.is_empty() {
        return Err(Error::invalid_parameter("bits", "[]", "at least one bit is required"));
    }
    if let Some(&bad) = bits.iter().find(|&&b| b == 0 || b > 32) {
        return Err(Error::invalid_parameter("bits", bad, "bits are numbered 1..=32"));
    }
    let index = image.resolve(band)?;
    let selector: u64 = bits.iter().fold(0, |acc, &b| acc | (1u64 << (b - 1)));
    info!(image = image.name(), band = %band, selector, "decoding quality bits");

    let data = map_bands_with_nodata(image, &[index], None, QA_NODATA, |v| {
        if v[0] < 0.0 {
            return None;
        }
        let word = v[0].round() as u64;
        Some(if word & selector != 0 { 1.0 } else { 0.0 })
    })?;

    let mut output = image.empty_like(output_name);
    output.push_band(product_band(image, "QAMASK", data, DataType::UInt8, QA_NODATA)?)?;
    Ok(output)
}
