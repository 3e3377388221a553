//! Rule-based cloud and shadow mask

use super::labels::{CloudClass, LabelGrid};
use super::mask_image;
use super::stages::{
    finalize, initial_labels, within_distance, Spectra, SpectralThresholds, SHARED_STAGES,
};
use crate::maybe_rayon::*;
use crate::outcome::{Outcome, RunStatus};
use orbis_core::{Algorithm, Error, Image, Result};
use orbis_parallel::CancelToken;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Parameters for [`fmask`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FmaskParams {
    pub thresholds: SpectralThresholds,
    /// Cloud dilation in pixels
    pub dilation: usize,
    /// Maximum distance in pixels from cloud for a shadow
    pub shadow_distance: usize,
    /// Shadow pixels must have NIR reflectance below this
    pub shadow_nir: f64,
}

impl Default for FmaskParams {
    fn default() -> Self {
        Self {
            thresholds: SpectralThresholds::default(),
            dilation: 5,
            shadow_distance: 3,
            shadow_nir: 0.1,
        }
    }
}

/// Cloud, shadow, snow and water mask of a reflectance image.
///
/// Requires BLUE, GREEN, RED, NIR, SWIR1 and SWIR2; LWIR (°C) is used by the
/// temperature tests when present. Cancellation is checked between stages;
/// a cancelled run returns the mask as far as it got, with unresolved
/// pixels reported as clear.
pub fn fmask(
    image: &Image,
    output_name: &str,
    params: &FmaskParams,
    cancel: &CancelToken,
) -> Result<Outcome<Image>> {
    if !params.shadow_nir.is_finite() {
        return Err(Error::invalid_parameter("shadow_nir", params.shadow_nir, "must be finite"));
    }
    let spectra = Spectra::new(image)?;
    info!(
        image = image.name(),
        rows = image.rows(),
        cols = image.cols(),
        thermal = spectra.has_thermal(),
        dilation = params.dilation,
        shadow_distance = params.shadow_distance,
        "fmask"
    );

    let mut labels = initial_labels(&spectra);
    for (stage, run) in SHARED_STAGES {
        if cancel.is_cancelled() {
            return cancelled(image, labels, output_name, stage);
        }
        let changed = run(&spectra, &params.thresholds, &mut labels);
        debug!(stage, changed, "stage done");
    }

    if cancel.is_cancelled() {
        return cancelled(image, labels, output_name, "cloud");
    }
    let confirmed = confirm_clouds(&mut labels);
    let grown = grow_clouds(&mut labels, params.dilation);
    debug!(stage = "cloud", confirmed, grown, "stage done");

    if cancel.is_cancelled() {
        return cancelled(image, labels, output_name, "shadow");
    }
    let shadows = detect_shadows(&spectra, &mut labels, params.shadow_distance, params.shadow_nir);
    debug!(stage = "shadow", changed = shadows, "stage done");

    finalize(&mut labels);
    info!(
        cloud = labels.count(CloudClass::Cloud),
        shadow = labels.count(CloudClass::Shadow),
        snow = labels.count(CloudClass::Snow),
        water = labels.count(CloudClass::Water),
        "fmask done"
    );
    Ok(Outcome::complete(mask_image(image, &labels, output_name)?))
}

fn cancelled(
    image: &Image,
    mut labels: LabelGrid,
    output_name: &str,
    stage: &str,
) -> Result<Outcome<Image>> {
    warn!(image = image.name(), stage, "fmask cancelled");
    finalize(&mut labels);
    Ok(Outcome::with_status(mask_image(image, &labels, output_name)?, RunStatus::Cancelled))
}

fn confirm_clouds(labels: &mut LabelGrid) -> usize {
    let (rows, cols) = labels.shape();
    let mut changed = 0;
    for row in 0..rows {
        for col in 0..cols {
            if labels.get(row, col) == CloudClass::CloudCandidate
                && labels.promote(row, col, CloudClass::Cloud)
            {
                changed += 1;
            }
        }
    }
    changed
}

/// Unclassified pixels within `radius` of cloud become cloud
fn grow_clouds(labels: &mut LabelGrid, radius: usize) -> usize {
    if radius == 0 {
        return 0;
    }
    let near = within_distance(&labels.is(CloudClass::Cloud), radius);
    let mut changed = 0;
    for ((row, col), &hit) in near.indexed_iter() {
        if hit
            && labels.get(row, col) == CloudClass::Unclassified
            && labels.promote(row, col, CloudClass::Cloud)
        {
            changed += 1;
        }
    }
    changed
}

/// Dark unclassified pixels within `distance` of cloud become shadow
fn detect_shadows(
    spectra: &Spectra<'_>,
    labels: &mut LabelGrid,
    distance: usize,
    max_nir: f64,
) -> usize {
    let near = within_distance(&labels.is(CloudClass::Cloud), distance);
    let (rows, cols) = labels.shape();
    let current = &*labels;
    let proposals: Vec<(usize, usize)> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .filter(|&col| {
                    near[[row, col]]
                        && current.get(row, col) == CloudClass::Unclassified
                        && spectra.pixel(row, col).is_some_and(|p| p.nir < max_nir)
                })
                .map(|col| (row, col))
                .collect::<Vec<_>>()
        })
        .collect();

    proposals
        .into_iter()
        .filter(|&(r, c)| labels.promote(r, c, CloudClass::Shadow))
        .count()
}

/// Fmask cloud detector
#[derive(Debug, Clone, Default)]
pub struct Fmask;

impl Algorithm for Fmask {
    type Input = Image;
    type Output = Outcome<Image>;
    type Params = FmaskParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Fmask"
    }

    fn description(&self) -> &'static str {
        "Rule-based cloud, shadow, snow and water mask of a reflectance image"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        fmask(&input, &format!("{}_fmask", input.name()), &params, &CancelToken::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{CLOUD_MASK_LEGEND, CLOUD_MASK_TAG};
    use orbis_core::{Band, DataType, GeoTransform, Raster};

    const BRIGHT: [f64; 6] = [0.5, 0.5, 0.5, 0.5, 0.5, 0.4];
    const DARK: [f64; 6] = [0.05, 0.08, 0.06, 0.3, 0.15, 0.02];
    const SHADE: [f64; 6] = [0.02, 0.03, 0.02, 0.05, 0.03, 0.01];

    /// 20x20 scene: bright block in the top-left corner, dark elsewhere
    fn scene(extra: &[((usize, usize), [f64; 6])]) -> Image {
        let mut image = Image::new("scene", 20, 20, GeoTransform::new(0.0, 20.0, 1.0, -1.0), None);
        for (b, tag) in ["BLUE", "GREEN", "RED", "NIR", "SWIR1", "SWIR2"].iter().enumerate() {
            let mut r = Raster::filled(20, 20, DARK[b]);
            for row in 0..4 {
                for col in 0..4 {
                    r.set(row, col, BRIGHT[b]).unwrap();
                }
            }
            for &((row, col), values) in extra {
                r.set(row, col, values[b]).unwrap();
            }
            r.set_nodata(Some(-1.0));
            image.push_band(Band::new(*tag, r, DataType::Float32)).unwrap();
        }
        image
    }

    fn code(image: &Image, row: usize, col: usize) -> f64 {
        image.band_by_tag(CLOUD_MASK_TAG).unwrap().raster().get(row, col).unwrap()
    }

    #[test]
    fn test_bright_block_is_cloud() {
        let out = fmask(&scene(&[]), "mask", &FmaskParams::default(), &CancelToken::new()).unwrap();
        assert_eq!(out.status, RunStatus::Complete);
        let mask = out.output;
        assert_eq!(mask.band_count(), 1);
        assert_eq!(mask.band(0).unwrap().data_type(), DataType::UInt8);
        assert_eq!(mask.metadata().get("legend").map(String::as_str), Some(CLOUD_MASK_LEGEND));
        assert_eq!(code(&mask, 0, 0), 2.0);
        assert_eq!(code(&mask, 3, 3), 2.0);
        // dilated by 5 pixels
        assert_eq!(code(&mask, 8, 8), 2.0);
        assert_eq!(code(&mask, 19, 19), 1.0);
    }

    #[test]
    fn test_shadow_near_cloud_only() {
        let image = scene(&[((10, 2), SHADE), ((19, 10), SHADE)]);
        let mask = fmask(&image, "mask", &FmaskParams::default(), &CancelToken::new())
            .unwrap()
            .output;
        assert_eq!(code(&mask, 10, 2), 3.0);
        assert_eq!(code(&mask, 19, 10), 1.0);
    }

    #[test]
    fn test_nodata_and_missing_band() {
        let mut image = scene(&[((15, 15), [-1.0; 6])]);
        let mask = fmask(&image, "mask", &FmaskParams::default(), &CancelToken::new())
            .unwrap()
            .output;
        assert_eq!(code(&mask, 15, 15), 0.0);

        image = Image::new("bare", 2, 2, GeoTransform::default(), None);
        image
            .push_band(Band::new("BLUE", Raster::filled(2, 2, 0.1), DataType::Float32))
            .unwrap();
        assert!(matches!(
            fmask(&image, "mask", &FmaskParams::default(), &CancelToken::new()),
            Err(Error::MissingBand { .. })
        ));
    }

    #[test]
    fn test_cancelled_run_reports_status() {
        let token = CancelToken::new();
        token.cancel();
        let out = fmask(&scene(&[]), "mask", &FmaskParams::default(), &token).unwrap();
        assert_eq!(out.status, RunStatus::Cancelled);
        // nothing was resolved, every valid pixel reads clear
        assert_eq!(code(&out.output, 0, 0), 1.0);
    }

    #[test]
    fn test_params_from_json() {
        let params: FmaskParams = serde_json::from_str(r#"{"dilation": 2}"#).unwrap();
        assert_eq!(params.dilation, 2);
        assert_eq!(params.shadow_distance, 3);
        assert_eq!(params.thresholds, SpectralThresholds::default());
    }
}
