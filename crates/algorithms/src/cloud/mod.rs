//! Cloud detection
//!
//! Two alternative detectors over a TOA reflectance image:
//! - [`fmask`]: rule-based confirmation, dilation and shadow search
//! - [`auto_cloud`]: probability seeds grown iteratively into connected clouds
//!
//! Both share the first spectral stages (see [`stages`]) and write a single
//! `CLOUDMASK` band with the codes of [`CloudClass::code`].

mod autocloud;
mod fmask;
mod labels;
pub mod stages;

pub use autocloud::{auto_cloud, AutoCloud, AutoCloudParams};
pub use fmask::{fmask, Fmask, FmaskParams};
pub use labels::{CloudClass, LabelGrid};
pub use stages::SpectralThresholds;

use crate::pixel::product_band;
use orbis_core::{DataType, Image, Result};

/// Tag of the output band
pub const CLOUD_MASK_TAG: &str = "CLOUDMASK";

/// Legend written to the output metadata
pub const CLOUD_MASK_LEGEND: &str = "0=nodata,1=clear,2=cloud,3=shadow,4=snow,5=water";

/// Single-band UInt8 mask image on the grid of `image`
pub(crate) fn mask_image(image: &Image, labels: &LabelGrid, output_name: &str) -> Result<Image> {
    let mut output = image.empty_like(output_name);
    let codes = labels.to_codes();
    output.push_band(product_band(image, CLOUD_MASK_TAG, codes, DataType::UInt8, 0.0)?)?;
    output.set_metadata("legend", CLOUD_MASK_LEGEND);
    Ok(output)
}
