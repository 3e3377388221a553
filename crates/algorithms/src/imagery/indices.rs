//! Spectral indices
//!
//! Indices are computed from bands addressed by semantic tag. Inputs are
//! expected to be reflectance. A pixel is nodata in the output when any of
//! its inputs is nodata, when the validity mask rejects it (every band by
//! default), or when the formula is undefined there (zero denominator,
//! negative square root).

use crate::mask::create_mask;
use crate::pixel::{float_band, map_bands, require_tags};
use orbis_core::{Algorithm, BandSelector, Error, Image, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Denominators smaller than this are treated as zero
const EPS: f64 = 1e-10;

/// Soil brightness factor of SATVI
const SATVI_L: f64 = 0.5;

/// Supported spectral indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectralIndex {
    /// Normalized Difference Vegetation Index
    Ndvi,
    /// Enhanced Vegetation Index
    Evi,
    /// Land Surface Water Index
    Lswi,
    /// Normalized Difference Snow Index
    Ndsi,
    /// Brightness Index
    Bi,
    /// Soil-Adjusted Total Vegetation Index
    Satvi,
    /// Modified Soil-Adjusted Vegetation Index
    Msavi2,
    /// Normalized Difference Water Index (McFeeters)
    Ndwi,
    /// Visible Atmospherically Resistant Index
    Vari,
    /// Normalized Difference Tillage Index
    Ndti,
    /// Crop Residue Cover (BLUE)
    Crc,
    /// Crop Residue Cover (GREEN)
    Crcm,
    /// Simple Tillage Index
    Sti,
    /// Inverse Simple Tillage Index
    Isti,
}

fn ratio(num: f64, den: f64) -> Option<f64> {
    (den.abs() >= EPS).then(|| num / den)
}

fn normalized_difference(a: f64, b: f64) -> Option<f64> {
    ratio(a - b, a + b)
}

impl SpectralIndex {
    pub const ALL: [SpectralIndex; 14] = [
        SpectralIndex::Ndvi,
        SpectralIndex::Evi,
        SpectralIndex::Lswi,
        SpectralIndex::Ndsi,
        SpectralIndex::Bi,
        SpectralIndex::Satvi,
        SpectralIndex::Msavi2,
        SpectralIndex::Ndwi,
        SpectralIndex::Vari,
        SpectralIndex::Ndti,
        SpectralIndex::Crc,
        SpectralIndex::Crcm,
        SpectralIndex::Sti,
        SpectralIndex::Isti,
    ];

    /// Output band tag
    pub fn tag(&self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "NDVI",
            SpectralIndex::Evi => "EVI",
            SpectralIndex::Lswi => "LSWI",
            SpectralIndex::Ndsi => "NDSI",
            SpectralIndex::Bi => "BI",
            SpectralIndex::Satvi => "SATVI",
            SpectralIndex::Msavi2 => "MSAVI2",
            SpectralIndex::Ndwi => "NDWI",
            SpectralIndex::Vari => "VARI",
            SpectralIndex::Ndti => "NDTI",
            SpectralIndex::Crc => "CRC",
            SpectralIndex::Crcm => "CRCM",
            SpectralIndex::Sti => "STI",
            SpectralIndex::Isti => "ISTI",
        }
    }

    /// Input band tags, in the order [`SpectralIndex::evaluate`] expects them
    pub fn inputs(&self) -> &'static [&'static str] {
        match self {
            SpectralIndex::Ndvi | SpectralIndex::Msavi2 => &["NIR", "RED"],
            SpectralIndex::Evi => &["NIR", "RED", "BLUE"],
            SpectralIndex::Lswi => &["NIR", "SWIR1"],
            SpectralIndex::Ndsi => &["GREEN", "SWIR1"],
            SpectralIndex::Bi => &["BLUE", "NIR"],
            SpectralIndex::Satvi => &["SWIR1", "RED", "SWIR2"],
            SpectralIndex::Ndwi => &["GREEN", "NIR"],
            SpectralIndex::Vari => &["GREEN", "RED", "BLUE"],
            SpectralIndex::Ndti | SpectralIndex::Sti | SpectralIndex::Isti => &["SWIR1", "SWIR2"],
            SpectralIndex::Crc => &["SWIR1", "BLUE"],
            SpectralIndex::Crcm => &["SWIR1", "GREEN"],
        }
    }

    /// Evaluate the index on one pixel; `v` holds the values of
    /// [`SpectralIndex::inputs`]
    pub fn evaluate(&self, v: &[f64]) -> Option<f64> {
        match self {
            // (NIR - RED) / (NIR + RED)
            SpectralIndex::Ndvi => normalized_difference(v[0], v[1]),
            // 2.5 (NIR - RED) / (NIR + 6 RED - 7.5 BLUE + 1)
            SpectralIndex::Evi => ratio(2.5 * (v[0] - v[1]), v[0] + 6.0 * v[1] - 7.5 * v[2] + 1.0),
            SpectralIndex::Lswi | SpectralIndex::Ndsi | SpectralIndex::Ndwi => {
                normalized_difference(v[0], v[1])
            }
            SpectralIndex::Bi => Some(0.5 * (v[0] + v[1])),
            SpectralIndex::Satvi => {
                let (swir1, red, swir2) = (v[0], v[1], v[2]);
                ratio(swir1 - red, swir1 + red + SATVI_L).map(|r| r * (1.0 + SATVI_L) - swir2 / 2.0)
            }
            SpectralIndex::Msavi2 => {
                let (nir, red) = (v[0], v[1]);
                let b = 2.0 * nir + 1.0;
                let disc = b * b - 8.0 * (nir - red);
                (disc >= 0.0).then(|| (b - disc.sqrt()) / 2.0)
            }
            // (GREEN - RED) / (GREEN + RED - BLUE)
            SpectralIndex::Vari => ratio(v[0] - v[1], v[0] + v[1] - v[2]),
            SpectralIndex::Ndti | SpectralIndex::Crc | SpectralIndex::Crcm => {
                normalized_difference(v[0], v[1])
            }
            SpectralIndex::Sti => ratio(v[0], v[1]),
            SpectralIndex::Isti => ratio(v[1], v[0]),
        }
    }

    /// Look up an index by its tag (case-insensitive)
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|i| i.tag().eq_ignore_ascii_case(tag))
    }
}

impl fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ---------------------------------------------------------------------------
// Single-index products
// ---------------------------------------------------------------------------

/// One index as a single Float32 band image, masked on every band
pub fn spectral_index(image: &Image, index: SpectralIndex, output_name: &str) -> Result<Image> {
    compute_indices(image, &[index], output_name)
}

/// `NDVI = (NIR - RED) / (NIR + RED)`
pub fn ndvi(image: &Image, output_name: &str) -> Result<Image> {
    spectral_index(image, SpectralIndex::Ndvi, output_name)
}

/// `EVI = 2.5 (NIR - RED) / (NIR + 6 RED - 7.5 BLUE + 1)`
pub fn evi(image: &Image, output_name: &str) -> Result<Image> {
    spectral_index(image, SpectralIndex::Evi, output_name)
}

/// `LSWI = (NIR - SWIR1) / (NIR + SWIR1)`
pub fn lswi(image: &Image, output_name: &str) -> Result<Image> {
    spectral_index(image, SpectralIndex::Lswi, output_name)
}

/// `NDSI = (GREEN - SWIR1) / (GREEN + SWIR1)`
pub fn ndsi(image: &Image, output_name: &str) -> Result<Image> {
    spectral_index(image, SpectralIndex::Ndsi, output_name)
}

/// `SATVI = ((SWIR1 - RED) / (SWIR1 + RED + L)) (1 + L) - SWIR2 / 2` with `L = 0.5`
pub fn satvi(image: &Image, output_name: &str) -> Result<Image> {
    spectral_index(image, SpectralIndex::Satvi, output_name)
}

// ---------------------------------------------------------------------------
// Multi-index product
// ---------------------------------------------------------------------------

/// Which indices [`indices`] writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicesParams {
    pub ndvi: bool,
    pub evi: bool,
    pub lswi: bool,
    pub ndsi: bool,
    pub bi: bool,
    pub satvi: bool,
    /// Bands that must be valid for a pixel to be computed; empty selects
    /// every band
    pub mask: BandSelector,
}

impl Default for IndicesParams {
    fn default() -> Self {
        Self {
            ndvi: true,
            evi: true,
            lswi: true,
            ndsi: true,
            bi: true,
            satvi: true,
            mask: BandSelector::all(),
        }
    }
}

impl IndicesParams {
    /// Enabled indices in output order
    pub fn selected(&self) -> Vec<SpectralIndex> {
        [
            (self.ndvi, SpectralIndex::Ndvi),
            (self.evi, SpectralIndex::Evi),
            (self.lswi, SpectralIndex::Lswi),
            (self.ndsi, SpectralIndex::Ndsi),
            (self.bi, SpectralIndex::Bi),
            (self.satvi, SpectralIndex::Satvi),
        ]
        .into_iter()
        .filter_map(|(on, index)| on.then_some(index))
        .collect()
    }
}

/// Enabled indices as bands of one image, in the order NDVI, EVI, LSWI,
/// NDSI, BI, SATVI
pub fn indices(image: &Image, output_name: &str, params: &IndicesParams) -> Result<Image> {
    let selected = params.selected();
    if selected.is_empty() {
        return Err(Error::invalid_parameter(
            "indices",
            "none",
            "at least one index must be enabled",
        ));
    }
    compute_indices_masked(image, &selected, &params.mask, output_name)
}

/// Arbitrary indices as bands of one image, in the given order, masked on
/// every band
pub fn compute_indices(
    image: &Image,
    selected: &[SpectralIndex],
    output_name: &str,
) -> Result<Image> {
    compute_indices_masked(image, selected, &BandSelector::all(), output_name)
}

/// [`compute_indices`] where only the bands in `mask` must be valid
pub fn compute_indices_masked(
    image: &Image,
    selected: &[SpectralIndex],
    mask: &BandSelector,
    output_name: &str,
) -> Result<Image> {
    if selected.is_empty() {
        return Err(Error::invalid_parameter("indices", "[]", "no index requested"));
    }
    info!(
        image = image.name(),
        rows = image.rows(),
        cols = image.cols(),
        indices = ?selected,
        "computing spectral indices"
    );

    // every required band must exist before anything is computed
    let inputs: Vec<Vec<usize>> = selected
        .iter()
        .map(|index| require_tags(image, index.inputs()))
        .collect::<Result<_>>()?;
    let valid = create_mask(image, mask)?;

    let mut output = image.empty_like(output_name);
    for (index, bands) in selected.iter().zip(&inputs) {
        debug!(index = index.tag(), "evaluating index");
        let data = map_bands(image, bands, Some(&valid), |v| index.evaluate(v))?;
        output.push_band(float_band(image, index.tag(), data)?)?;
    }
    Ok(output)
}

/// NDVI algorithm
#[derive(Debug, Clone, Default)]
pub struct Ndvi;

impl Algorithm for Ndvi {
    type Input = Image;
    type Output = Image;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "NDVI"
    }

    fn description(&self) -> &'static str {
        "Normalized Difference Vegetation Index from the NIR and RED bands"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        ndvi(&input, &format!("{}_ndvi", input.name()))
    }
}

/// Multi-index algorithm
#[derive(Debug, Clone, Default)]
pub struct Indices;

impl Algorithm for Indices {
    type Input = Image;
    type Output = Image;
    type Params = IndicesParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Indices"
    }

    fn description(&self) -> &'static str {
        "Write the enabled spectral indices (NDVI, EVI, LSWI, NDSI, BI, SATVI) as bands"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        indices(&input, &format!("{}_indices", input.name()), &params)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use orbis_core::{Band, DataType, GeoTransform, Raster, FLOAT_NODATA};

    fn make_band(tag: &str, rows: usize, cols: usize, value: f64) -> Band {
        let mut r = Raster::filled(rows, cols, value);
        r.set_nodata(Some(FLOAT_NODATA));
        Band::new(tag, r, DataType::Float32)
    }

    fn make_gradient(tag: &str, rows: usize, cols: usize, start: f64, step: f64) -> Band {
        let mut r = Raster::new(rows, cols);
        for row in 0..rows {
            for col in 0..cols {
                r.set(row, col, start + (row * cols + col) as f64 * step).unwrap();
            }
        }
        Band::new(tag, r, DataType::Float32)
    }

    fn scene(values: &[(&str, f64)]) -> Image {
        let mut image = Image::new("scene", 5, 5, GeoTransform::new(0.0, 5.0, 1.0, -1.0), None);
        for &(tag, v) in values {
            image.push_band(make_band(tag, 5, 5, v)).unwrap();
        }
        image
    }

    fn full_scene() -> Image {
        scene(&[
            ("BLUE", 0.05),
            ("GREEN", 0.08),
            ("RED", 0.1),
            ("NIR", 0.5),
            ("SWIR1", 0.25),
            ("SWIR2", 0.12),
        ])
    }

    fn value(image: &Image, tag: &str) -> f64 {
        image.band_by_tag(tag).unwrap().raster().get(2, 2).unwrap()
    }

    #[test]
    fn test_ndvi() {
        let result = ndvi(&full_scene(), "ndvi").unwrap();
        assert_eq!(result.band_count(), 1);
        let val = value(&result, "NDVI");

        // (0.5 - 0.1) / (0.5 + 0.1) = 0.4/0.6
        let expected = (0.5 - 0.1) / (0.5 + 0.1);
        assert!((val - expected).abs() < 1e-10, "Expected {}, got {}", expected, val);
    }

    #[test]
    fn test_ndvi_water() {
        // Water: Red > NIR gives negative NDVI
        let image = scene(&[("NIR", 0.05), ("RED", 0.15)]);
        let val = value(&ndvi(&image, "ndvi").unwrap(), "NDVI");
        assert!(val < 0.0, "Water should have negative NDVI, got {}", val);
    }

    #[test]
    fn test_evi() {
        let val = value(&evi(&full_scene(), "evi").unwrap(), "EVI");
        let expected = 2.5 * (0.5 - 0.1) / (0.5 + 6.0 * 0.1 - 7.5 * 0.05 + 1.0);
        assert!((val - expected).abs() < 1e-10, "Expected {}, got {}", expected, val);
    }

    #[test]
    fn test_satvi() {
        let val = value(&satvi(&full_scene(), "satvi").unwrap(), "SATVI");
        let expected = (0.25 - 0.1) / (0.25 + 0.1 + 0.5) * 1.5 - 0.12 / 2.0;
        assert!((val - expected).abs() < 1e-10, "Expected {}, got {}", expected, val);
    }

    #[test]
    fn test_lswi_and_ndsi() {
        let image = full_scene();
        let lswi_val = value(&lswi(&image, "l").unwrap(), "LSWI");
        let ndsi_val = value(&ndsi(&image, "n").unwrap(), "NDSI");
        assert!((lswi_val - 0.25 / 0.75).abs() < 1e-10);
        assert!((ndsi_val - (0.08 - 0.25) / (0.08 + 0.25)).abs() < 1e-10);
    }

    #[test]
    fn test_normalized_indices_range() {
        let mut image = Image::new("g", 10, 10, GeoTransform::default(), None);
        image.push_band(make_gradient("NIR", 10, 10, 0.0, 0.01)).unwrap();
        image.push_band(make_gradient("RED", 10, 10, 0.5, -0.005)).unwrap();
        image.push_band(make_gradient("GREEN", 10, 10, 0.2, 0.003)).unwrap();
        image.push_band(make_gradient("SWIR1", 10, 10, 0.0, 0.002)).unwrap();

        let out = compute_indices(
            &image,
            &[SpectralIndex::Ndvi, SpectralIndex::Lswi, SpectralIndex::Ndsi],
            "nd",
        )
        .unwrap();

        for band in out.bands() {
            for &val in band.raster().valid_values().collect::<Vec<_>>().iter() {
                assert!(
                    (-1.0..=1.0).contains(&val),
                    "{} out of range: {}",
                    band.tag(),
                    val
                );
            }
        }
    }

    #[test]
    fn test_zero_denominator_is_nodata() {
        let image = scene(&[("NIR", 0.0), ("RED", 0.0)]);
        let out = ndvi(&image, "ndvi").unwrap();
        let band = out.band(0).unwrap();
        assert_eq!(band.raster().get(0, 0).unwrap(), FLOAT_NODATA);
        assert!(band.raster().data().iter().all(|v| !v.is_nan()));
        assert_eq!(band.raster().valid_count(), 0);
    }

    #[test]
    fn test_nodata_input_propagates() {
        let mut red = make_band("RED", 5, 5, 0.1);
        red.raster_mut().set(1, 1, FLOAT_NODATA).unwrap();
        let mut image = Image::new("scene", 5, 5, GeoTransform::default(), None);
        image.push_band(make_band("NIR", 5, 5, 0.5)).unwrap();
        image.push_band(red).unwrap();

        let out = ndvi(&image, "ndvi").unwrap();
        assert_eq!(out.band(0).unwrap().raster().get(1, 1).unwrap(), FLOAT_NODATA);
        assert!(out.band(0).unwrap().raster().is_valid_at(2, 2));
    }

    #[test]
    fn test_pixel_invalid_in_any_band_is_nodata() {
        let mut swir1 = make_band("SWIR1", 5, 5, 0.25);
        swir1.raster_mut().set(0, 0, FLOAT_NODATA).unwrap();
        let mut image = scene(&[("NIR", 0.5), ("RED", 0.1)]);
        image.push_band(swir1).unwrap();

        let single = ndvi(&image, "ndvi").unwrap();
        let band = single.band(0).unwrap().raster();
        assert_eq!(band.get(0, 0).unwrap(), FLOAT_NODATA);
        assert!((band.get(1, 1).unwrap() - 0.4 / 0.6).abs() < 1e-10);

        // only NIR and RED must be valid
        let params = IndicesParams {
            evi: false,
            lswi: false,
            ndsi: false,
            bi: false,
            satvi: false,
            mask: BandSelector::tags(&["NIR", "RED"]),
            ..Default::default()
        };
        let out = indices(&image, "idx", &params).unwrap();
        assert!(out.band(0).unwrap().raster().is_valid_at(0, 0));

        let params = IndicesParams {
            mask: BandSelector::tags(&["LWIR"]),
            ..params
        };
        assert!(matches!(
            indices(&image, "idx", &params),
            Err(Error::InvalidBandSelector { .. })
        ));
    }

    #[test]
    fn test_indices_order_and_flags() {
        let out = indices(&full_scene(), "idx", &IndicesParams::default()).unwrap();
        let tags: Vec<_> = out.tags().collect();
        assert_eq!(tags, vec!["NDVI", "EVI", "LSWI", "NDSI", "BI", "SATVI"]);

        let params = IndicesParams {
            ndvi: false,
            evi: false,
            bi: false,
            ..Default::default()
        };
        let out = indices(&full_scene(), "idx", &params).unwrap();
        let tags: Vec<_> = out.tags().collect();
        assert_eq!(tags, vec!["LSWI", "NDSI", "SATVI"]);
    }

    #[test]
    fn test_indices_none_enabled() {
        let params = IndicesParams {
            ndvi: false,
            evi: false,
            lswi: false,
            ndsi: false,
            bi: false,
            satvi: false,
            ..Default::default()
        };
        assert!(matches!(
            indices(&full_scene(), "idx", &params),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_missing_band_reported_before_work() {
        let image = scene(&[("NIR", 0.5), ("RED", 0.1)]);
        match indices(&image, "idx", &IndicesParams::default()) {
            Err(Error::MissingBand { tag, .. }) => assert_eq!(tag, "BLUE"),
            other => panic!("expected MissingBand, got {:?}", other.map(|i| i.band_count())),
        }
    }

    #[test]
    fn test_supplemental_indices() {
        let image = full_scene();
        let out = compute_indices(
            &image,
            &[SpectralIndex::Msavi2, SpectralIndex::Sti, SpectralIndex::Isti, SpectralIndex::Vari],
            "extra",
        )
        .unwrap();

        let b: f64 = 2.0 * 0.5 + 1.0;
        let msavi2 = (b - (b * b - 8.0 * (0.5 - 0.1)).sqrt()) / 2.0;
        assert!((value(&out, "MSAVI2") - msavi2).abs() < 1e-10);
        assert!((value(&out, "STI") - 0.25 / 0.12).abs() < 1e-10);
        assert!((value(&out, "ISTI") - 0.12 / 0.25).abs() < 1e-10);
        assert!((value(&out, "VARI") - (0.08 - 0.1) / (0.08 + 0.1 - 0.05)).abs() < 1e-10);
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(SpectralIndex::from_tag("ndvi"), Some(SpectralIndex::Ndvi));
        assert_eq!(SpectralIndex::from_tag("crcm"), Some(SpectralIndex::Crcm));
        assert_eq!(SpectralIndex::from_tag("savi"), None);
    }

    #[test]
    fn test_algorithm_trait() {
        let out = Indices.execute_default(full_scene()).unwrap();
        assert_eq!(out.name(), "scene_indices");
        assert_eq!(out.band_count(), 6);
        assert_eq!(Ndvi.name(), "NDVI");
    }
}
