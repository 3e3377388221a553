//! Radiometric calibration
//!
//! Converts digital numbers to at-sensor radiance, top-of-atmosphere
//! reflectance and brightness temperature:
//!
//! ```text
//! L = DN * gain + offset
//! ρ = π * L * d² / (ESUN * cos θz)
//! T = K2 / ln(K1 / L + 1) - 273.15      (°C)
//! ```
//!
//! where `d` is the earth-sun distance in AU and `θz` the solar zenith angle.

use crate::mask::create_mask;
use crate::pixel::{float_band, map_bands};
use orbis_core::{
    Algorithm, Band, BandCalibration, BandSelector, Error, Image, Result, FLOAT_NODATA,
};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::info;

/// Bounds applied to computed reflectance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectanceParams {
    pub min_reflectance: f64,
    /// Values above 1 occur on specular glare and are kept up to this bound
    pub max_reflectance: f64,
}

impl Default for ReflectanceParams {
    fn default() -> Self {
        Self {
            min_reflectance: 0.0,
            max_reflectance: 1.6,
        }
    }
}

fn calibration_of<'a>(band: &'a Band) -> Result<&'a BandCalibration> {
    band.calibration().ok_or_else(|| Error::MissingCalibration {
        band: band.tag().to_string(),
        what: "gain/offset".into(),
    })
}

/// Brightness temperature in °C from thermal radiance
pub fn brightness_temperature_celsius(radiance: f64, k1: f64, k2: f64) -> Option<f64> {
    if radiance <= 0.0 {
        return None;
    }
    Some(k2 / (k1 / radiance + 1.0).ln() - 273.15)
}

/// At-sensor radiance of every band.
///
/// Pixels invalid in any band are written as [`FLOAT_NODATA`], whatever
/// sentinel the input band used. Output bands are Float32 with the input
/// tags; their calibration becomes identity gain/offset, keeping ESUN and
/// thermal constants.
pub fn radiance(image: &Image, output_name: &str) -> Result<Image> {
    info!(image = image.name(), bands = image.band_count(), "computing radiance");

    let calibrations: Vec<BandCalibration> = image
        .bands()
        .iter()
        .map(|b| calibration_of(b).copied())
        .collect::<Result<_>>()?;

    let mask = create_mask(image, &BandSelector::all())?;
    let mut output = image.empty_like(output_name);

    for (i, (band, cal)) in image.bands().iter().zip(&calibrations).enumerate() {
        let data = map_bands(image, &[i], Some(&mask), |v| Some(cal.radiance(v[0])))?;
        let mut out = float_band(image, band.tag(), data)?;
        out.set_calibration(Some(BandCalibration {
            gain: 1.0,
            offset: 0.0,
            ..*cal
        }));
        output.push_band(out)?;
    }
    Ok(output)
}

/// Top-of-atmosphere reflectance of reflective bands and brightness
/// temperature (°C) of thermal bands.
///
/// Requires acquisition geometry with the sun above the horizon, and for
/// every band either ESUN or both thermal constants.
pub fn reflectance(image: &Image, output_name: &str, params: &ReflectanceParams) -> Result<Image> {
    let (lo, hi) = (params.min_reflectance, params.max_reflectance);
    if !(lo.is_finite() && hi.is_finite() && lo < hi) {
        return Err(Error::InvalidRange { lo, hi });
    }

    let acquisition = image.acquisition().ok_or_else(|| Error::MissingCalibration {
        band: image.name().to_string(),
        what: "acquisition geometry".into(),
    })?;
    let cos_zenith = acquisition.cos_solar_zenith();
    if cos_zenith <= 0.0 {
        return Err(Error::MissingCalibration {
            band: image.name().to_string(),
            what: format!("sun below horizon (zenith {}°)", acquisition.solar_zenith_deg),
        });
    }
    let d = acquisition.earth_sun_distance();

    info!(
        image = image.name(),
        bands = image.band_count(),
        earth_sun_distance = d,
        cos_zenith,
        "computing TOA reflectance"
    );

    // validate everything before computing anything
    let calibrations: Vec<BandCalibration> = image
        .bands()
        .iter()
        .map(|band| {
            let cal = calibration_of(band)?;
            if cal.esun.is_none() && cal.thermal().is_none() {
                return Err(Error::MissingCalibration {
                    band: band.tag().to_string(),
                    what: "ESUN or thermal constants".into(),
                });
            }
            Ok(*cal)
        })
        .collect::<Result<_>>()?;

    let mask = create_mask(image, &BandSelector::all())?;
    let mut output = image.empty_like(output_name);

    for (i, (band, cal)) in image.bands().iter().zip(&calibrations).enumerate() {
        let data = if let Some(esun) = cal.esun {
            let scale = PI * d * d / (esun * cos_zenith);
            map_bands(image, &[i], Some(&mask), |v| {
                Some((cal.radiance(v[0]) * scale).clamp(lo, hi))
            })?
        } else {
            let (k1, k2) = cal.thermal().unwrap_or((f64::NAN, f64::NAN));
            map_bands(image, &[i], Some(&mask), |v| {
                brightness_temperature_celsius(cal.radiance(v[0]), k1, k2)
            })?
        };
        let mut out = float_band(image, band.tag(), data)?;
        out.set_calibration(Some(*cal));
        output.push_band(out)?;
    }
    Ok(output)
}

/// Brightness temperature (°C) of the thermal bands only
pub fn brightness_temperature(image: &Image, output_name: &str) -> Result<Image> {
    let thermal: Vec<(usize, &Band, (f64, f64))> = image
        .bands()
        .iter()
        .enumerate()
        .filter_map(|(i, b)| {
            b.calibration()
                .filter(|c| c.is_thermal())
                .and_then(|c| c.thermal())
                .map(|k| (i, b, k))
        })
        .collect();

    if thermal.is_empty() {
        return Err(Error::MissingCalibration {
            band: image.name().to_string(),
            what: "no band with thermal constants".into(),
        });
    }
    info!(image = image.name(), bands = thermal.len(), "computing brightness temperature");

    let mut output = image.empty_like(output_name);
    for (i, band, (k1, k2)) in thermal {
        let cal = calibration_of(band)?;
        let data = map_bands(image, &[i], None, |v| {
            brightness_temperature_celsius(cal.radiance(v[0]), k1, k2)
        })?;
        let mut out = float_band(image, band.tag(), data)?;
        out.set_calibration(Some(*cal));
        output.push_band(out)?;
    }
    Ok(output)
}

/// Radiance algorithm
#[derive(Debug, Clone, Default)]
pub struct Rad;

impl Algorithm for Rad {
    type Input = Image;
    type Output = Image;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Rad"
    }

    fn description(&self) -> &'static str {
        "Convert digital numbers to at-sensor radiance using band gain and offset"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        radiance(&input, &format!("{}_rad", input.name()))
    }
}

/// Top-of-atmosphere reflectance algorithm
#[derive(Debug, Clone, Default)]
pub struct Ref;

impl Algorithm for Ref {
    type Input = Image;
    type Output = Image;
    type Params = ReflectanceParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Ref"
    }

    fn description(&self) -> &'static str {
        "Convert digital numbers to top-of-atmosphere reflectance and brightness temperature"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        reflectance(&input, &format!("{}_ref", input.name()), &params)
    }
}
