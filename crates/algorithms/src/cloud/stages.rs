//! Spectral tests shared by the cloud detectors
//!
//! Each stage is a plain function over the scene's spectra and the label
//! grid. Stages compute their proposals row-parallel from the current labels
//! and then apply them; a proposal that would not raise a pixel's rank is
//! dropped by [`LabelGrid::promote`].

use super::labels::{CloudClass, CloudClass::CloudCandidate, LabelGrid};
use crate::maybe_rayon::*;
use ndarray::Array2;
use orbis_core::{Band, Image, Neighborhood, Result};
use serde::{Deserialize, Serialize};

/// Bands the detectors require
pub const REQUIRED_BANDS: [&str; 6] = ["BLUE", "GREEN", "RED", "NIR", "SWIR1", "SWIR2"];

/// Thresholds of the spectral tests (reflectance, °C)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralThresholds {
    /// Basic test: SWIR2 must exceed this
    pub basic_swir2: f64,
    /// Basic test: NDVI must stay below this
    pub basic_ndvi: f64,
    /// Basic test: NDSI must stay below this
    pub basic_ndsi: f64,
    /// Basic test: brightness temperature must stay below this
    pub basic_temperature: f64,
    /// Whiteness test: spectral flatness of the visible bands must stay below this
    pub whiteness: f64,
    /// Haze-optimized transform offset, `HOT = BLUE - 0.5 RED - offset`
    pub hot_offset: f64,
    /// Snow test: NDSI must exceed this
    pub snow_ndsi: f64,
    /// Snow test: NIR must exceed this
    pub snow_nir: f64,
    /// Snow test: GREEN must exceed this
    pub snow_green: f64,
    /// Snow test: brightness temperature must stay below this
    pub snow_temperature: f64,
}

impl Default for SpectralThresholds {
    fn default() -> Self {
        Self {
            basic_swir2: 0.03,
            basic_ndvi: 0.8,
            basic_ndsi: 0.8,
            basic_temperature: 27.0,
            whiteness: 0.7,
            hot_offset: 0.08,
            snow_ndsi: 0.15,
            snow_nir: 0.11,
            snow_green: 0.1,
            snow_temperature: 3.8,
        }
    }
}

/// Reflectance (and optional temperature) of one pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pixel {
    pub blue: f64,
    pub green: f64,
    pub red: f64,
    pub nir: f64,
    pub swir1: f64,
    pub swir2: f64,
    /// Brightness temperature in °C
    pub temperature: Option<f64>,
    pub cirrus: Option<f64>,
}

fn nd(a: f64, b: f64) -> f64 {
    let sum = a + b;
    if sum.abs() < 1e-10 {
        0.0
    } else {
        (a - b) / sum
    }
}

impl Pixel {
    pub fn ndvi(&self) -> f64 {
        nd(self.nir, self.red)
    }

    pub fn ndsi(&self) -> f64 {
        nd(self.green, self.swir1)
    }

    /// Sum of relative deviations of BLUE, GREEN and RED from their mean
    pub fn whiteness(&self) -> f64 {
        let mean = (self.blue + self.green + self.red) / 3.0;
        if mean.abs() < 1e-10 {
            return f64::INFINITY;
        }
        [self.blue, self.green, self.red]
            .iter()
            .map(|b| ((b - mean) / mean).abs())
            .sum()
    }

    /// Haze-optimized transform
    pub fn hot(&self, offset: f64) -> f64 {
        self.blue - 0.5 * self.red - offset
    }
}

/// Band access for the detectors
pub struct Spectra<'a> {
    bands: [&'a Band; 6],
    thermal: Option<&'a Band>,
    cirrus: Option<&'a Band>,
    rows: usize,
    cols: usize,
}

impl<'a> Spectra<'a> {
    /// Required bands must be present; LWIR and CIRRUS are optional
    pub fn new(image: &'a Image) -> Result<Self> {
        let [b, g, r, n, s1, s2] = REQUIRED_BANDS;
        Ok(Self {
            bands: [
                image.require_band(b)?,
                image.require_band(g)?,
                image.require_band(r)?,
                image.require_band(n)?,
                image.require_band(s1)?,
                image.require_band(s2)?,
            ],
            thermal: image.band_by_tag("LWIR"),
            cirrus: image.band_by_tag("CIRRUS"),
            rows: image.rows(),
            cols: image.cols(),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn has_thermal(&self) -> bool {
        self.thermal.is_some()
    }

    fn optional(band: Option<&Band>, row: usize, col: usize) -> Option<f64> {
        band.and_then(|b| {
            let v = unsafe { b.raster().get_unchecked(row, col) };
            b.is_valid(v).then_some(v)
        })
    }

    /// Pixel values, `None` when any required band is nodata
    pub fn pixel(&self, row: usize, col: usize) -> Option<Pixel> {
        let mut v = [0.0; 6];
        for (slot, band) in v.iter_mut().zip(self.bands.iter()) {
            let x = unsafe { band.raster().get_unchecked(row, col) };
            if !band.is_valid(x) {
                return None;
            }
            *slot = x;
        }
        Some(Pixel {
            blue: v[0],
            green: v[1],
            red: v[2],
            nir: v[3],
            swir1: v[4],
            swir2: v[5],
            temperature: Self::optional(self.thermal, row, col),
            cirrus: Self::optional(self.cirrus, row, col),
        })
    }
}

/// Starting labels: nodata where any required band is nodata
pub fn initial_labels(spectra: &Spectra<'_>) -> LabelGrid {
    let (rows, cols) = spectra.shape();
    let data: Vec<CloudClass> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| match spectra.pixel(row, col) {
                    Some(_) => CloudClass::Unclassified,
                    None => CloudClass::NoData,
                })
                .collect::<Vec<_>>()
        })
        .collect();
    LabelGrid::from_array(Array2::from_shape_vec((rows, cols), data).unwrap_or_else(|_| {
        Array2::from_elem((rows, cols), CloudClass::NoData)
    }))
}

/// Evaluate `rule` on every valid pixel and apply its proposals.
///
/// Returns the number of pixels that changed state.
pub fn apply_rule<F>(spectra: &Spectra<'_>, labels: &mut LabelGrid, rule: F) -> usize
where
    F: Fn(&Pixel, CloudClass) -> Option<CloudClass> + Sync + Send,
{
    let (rows, cols) = spectra.shape();
    let current = &*labels;
    let proposals: Vec<(usize, usize, CloudClass)> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut found = Vec::new();
            for col in 0..cols {
                let state = current.get(row, col);
                if state.is_final() {
                    continue;
                }
                if let Some(next) = spectra.pixel(row, col).and_then(|p| rule(&p, state)) {
                    found.push((row, col, next));
                }
            }
            found
        })
        .collect();

    proposals
        .into_iter()
        .filter(|&(r, c, next)| labels.promote(r, c, next))
        .count()
}

/// Cells within `radius` (square neighbourhood) of a `true` cell, the cell
/// itself included
pub fn within_distance(mask: &Array2<bool>, radius: usize) -> Array2<bool> {
    if radius == 0 {
        return mask.clone();
    }
    let (rows, cols) = mask.dim();
    let offsets = Neighborhood::Square(radius).offsets();
    let (rows_i, cols_i) = (rows as isize, cols as isize);
    let data: Vec<bool> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![false; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                *out = offsets.iter().any(|&(dr, dc)| {
                    let nr = row as isize + dr;
                    let nc = col as isize + dc;
                    nr >= 0
                        && nc >= 0
                        && nr < rows_i
                        && nc < cols_i
                        && unsafe { *mask.uget([nr as usize, nc as usize]) }
                });
            }
            row_data
        })
        .collect();
    Array2::from_shape_vec((rows, cols), data).unwrap_or_else(|_| mask.clone())
}

/// Signature of a shared stage
pub type Stage = fn(&Spectra<'_>, &SpectralThresholds, &mut LabelGrid) -> usize;

/// Stage 1: bright, cold, non-vegetated, non-snow pixels become cloud candidates
pub fn basic_test(spectra: &Spectra<'_>, t: &SpectralThresholds, labels: &mut LabelGrid) -> usize {
    apply_rule(spectra, labels, |p, state| {
        if state != CloudClass::Unclassified {
            return None;
        }
        let cold = p.temperature.map_or(true, |bt| bt < t.basic_temperature);
        (p.swir2 > t.basic_swir2 && p.ndvi() < t.basic_ndvi && p.ndsi() < t.basic_ndsi && cold)
            .then_some(CloudCandidate)
    })
}

/// Stage 2: candidates that are not spectrally flat and hazy are clear
pub fn whiteness_test(
    spectra: &Spectra<'_>,
    t: &SpectralThresholds,
    labels: &mut LabelGrid,
) -> usize {
    apply_rule(spectra, labels, |p, state| {
        if state != CloudCandidate {
            return None;
        }
        let flat = p.whiteness() < t.whiteness;
        let hazy = p.hot(t.hot_offset) > 0.0;
        (!(flat && hazy)).then_some(CloudClass::Clear)
    })
}

/// Stage 3: dark, non-vegetated pixels are water
pub fn water_test(spectra: &Spectra<'_>, _t: &SpectralThresholds, labels: &mut LabelGrid) -> usize {
    apply_rule(spectra, labels, |p, state| {
        if state != CloudClass::Unclassified {
            return None;
        }
        let ndvi = p.ndvi();
        ((ndvi < 0.01 && p.nir < 0.11) || (ndvi < 0.1 && p.nir < 0.05)).then_some(CloudClass::Water)
    })
}

/// Stage 4: bright, high-NDSI, cold pixels are snow
pub fn snow_test(spectra: &Spectra<'_>, t: &SpectralThresholds, labels: &mut LabelGrid) -> usize {
    apply_rule(spectra, labels, |p, state| {
        if state != CloudClass::Unclassified {
            return None;
        }
        let cold = p.temperature.map_or(true, |bt| bt < t.snow_temperature);
        (p.ndsi() > t.snow_ndsi && p.nir > t.snow_nir && p.green > t.snow_green && cold)
            .then_some(CloudClass::Snow)
    })
}

/// Stages 1 to 4 in order
pub const SHARED_STAGES: [(&str, Stage); 4] = [
    ("basic", basic_test),
    ("whiteness", whiteness_test),
    ("water", water_test),
    ("snow", snow_test),
];

/// Last stage: everything still unresolved is clear
pub fn finalize(labels: &mut LabelGrid) -> usize {
    let (rows, cols) = labels.shape();
    let mut changed = 0;
    for row in 0..rows {
        for col in 0..cols {
            if !labels.get(row, col).is_final() && labels.promote(row, col, CloudClass::Clear) {
                changed += 1;
            }
        }
    }
    changed
}
