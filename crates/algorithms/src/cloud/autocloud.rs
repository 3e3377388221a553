//! Probability-driven iterative cloud detection
//!
//! Cloud candidates from the shared spectral stages receive a cloud
//! probability. Confident candidates seed the cloud set, which then grows
//! into adjacent plausible candidates one ring per iteration until the cloud
//! fraction stops changing. Small or weakly seeded clouds are dropped before
//! the result is committed.

use super::labels::{CloudClass, LabelGrid};
use super::mask_image;
use super::stages::{finalize, initial_labels, Pixel, Spectra, SpectralThresholds, SHARED_STAGES};
use crate::maybe_rayon::*;
use crate::outcome::{Outcome, RunStatus};
use ndarray::Array2;
use orbis_core::{Algorithm, Error, Image, Neighborhood, Result};
use orbis_parallel::CancelToken;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Parameters for [`auto_cloud`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCloudParams {
    pub thresholds: SpectralThresholds,
    /// Cap on refinement iterations
    pub max_iterations: usize,
    /// Probability needed to seed a cloud; half of it is enough to grow one
    pub cloud_probability: f64,
    /// Candidates warmer than this (°C) are never cloud
    pub temperature_threshold: f64,
    /// Minimum share of seed pixels in a kept cloud
    pub area_threshold: f64,
    /// Minimum size of a kept cloud in pixels
    pub min_cloud_size: usize,
    /// Cirrus reflectance above which a candidate seeds a cloud
    pub cirrus_threshold: f64,
    /// Refinement stops once the cloud fraction changes by no more than this
    pub convergence_delta: f64,
}

impl Default for AutoCloudParams {
    fn default() -> Self {
        Self {
            thresholds: SpectralThresholds::default(),
            max_iterations: 4000,
            cloud_probability: 0.2,
            temperature_threshold: 14.0,
            area_threshold: 0.2,
            min_cloud_size: 20,
            cirrus_threshold: 0.01,
            convergence_delta: 0.0,
        }
    }
}

impl AutoCloudParams {
    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::invalid_parameter(
                "max_iterations",
                0,
                "at least one iteration is required",
            ));
        }
        if !(self.cloud_probability > 0.0 && self.cloud_probability <= 1.0) {
            return Err(Error::invalid_parameter(
                "cloud_probability",
                self.cloud_probability,
                "must be in (0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.area_threshold) {
            return Err(Error::invalid_parameter(
                "area_threshold",
                self.area_threshold,
                "must be in [0, 1]",
            ));
        }
        if !(self.convergence_delta >= 0.0) {
            return Err(Error::invalid_parameter(
                "convergence_delta",
                self.convergence_delta,
                "must be non-negative",
            ));
        }
        Ok(())
    }

    /// 1 below `threshold - 4`, 0 above `threshold + 4`, linear between
    fn temperature_probability(&self, temperature: Option<f64>) -> f64 {
        match temperature {
            None => 1.0,
            Some(t) => ((self.temperature_threshold + 4.0 - t) / 8.0).clamp(0.0, 1.0),
        }
    }

    /// Cloud probability of a candidate, 0 when it is too warm
    pub fn probability(&self, pixel: &Pixel) -> f64 {
        if pixel.temperature.is_some_and(|t| t > self.temperature_threshold) {
            return 0.0;
        }
        let spread = pixel.ndvi().abs().max(pixel.ndsi().abs()).max(pixel.whiteness());
        let whiteness = (1.0 - spread).clamp(0.0, 1.0);
        whiteness * self.temperature_probability(pixel.temperature)
    }

    fn is_seed(&self, pixel: &Pixel, probability: f64) -> bool {
        if pixel.temperature.is_some_and(|t| t > self.temperature_threshold) {
            return false;
        }
        probability >= self.cloud_probability
            || pixel.cirrus.is_some_and(|c| c > self.cirrus_threshold)
    }
}

/// Per-candidate probability and seed flag; non-candidates get `None`
fn score_candidates(
    spectra: &Spectra<'_>,
    labels: &LabelGrid,
    params: &AutoCloudParams,
) -> Array2<Option<(f64, bool)>> {
    let (rows, cols) = labels.shape();
    let data: Vec<Option<(f64, bool)>> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    if labels.get(row, col) != CloudClass::CloudCandidate {
                        return None;
                    }
                    spectra.pixel(row, col).map(|p| {
                        let probability = params.probability(&p);
                        (probability, params.is_seed(&p, probability))
                    })
                })
                .collect::<Vec<_>>()
        })
        .collect();
    Array2::from_shape_vec((rows, cols), data)
        .unwrap_or_else(|_| Array2::from_elem((rows, cols), None))
}

/// Candidates outside `cloud` that touch it (8-adjacency) and may grow it
fn frontier(
    cloud: &Array2<bool>,
    scores: &Array2<Option<(f64, bool)>>,
    min_probability: f64,
) -> Vec<(usize, usize)> {
    let (rows, cols) = cloud.dim();
    let hood = Neighborhood::Queen3x3;
    (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .filter(|&col| {
                    !cloud[[row, col]]
                        && scores[[row, col]].is_some_and(|(p, _)| p >= min_probability)
                        && hood.neighbors(row, col, rows, cols).any(|(r, c)| cloud[[r, c]])
                })
                .map(|col| (row, col))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// 8-connected components of `mask` as lists of cells
fn components(mask: &Array2<bool>) -> Vec<Vec<(usize, usize)>> {
    let (rows, cols) = mask.dim();
    let hood = Neighborhood::Queen3x3;
    let mut visited = Array2::from_elem((rows, cols), false);
    let mut found = Vec::new();

    for ((row, col), &set) in mask.indexed_iter() {
        if !set || visited[[row, col]] {
            continue;
        }
        let mut cells = Vec::new();
        let mut stack = vec![(row, col)];
        visited[[row, col]] = true;
        while let Some((r, c)) = stack.pop() {
            cells.push((r, c));
            for (nr, nc) in hood.neighbors(r, c, rows, cols) {
                if mask[[nr, nc]] && !visited[[nr, nc]] {
                    visited[[nr, nc]] = true;
                    stack.push((nr, nc));
                }
            }
        }
        found.push(cells);
    }
    found
}

/// Cloud mask of a reflectance image by iterative seed growth.
///
/// Requires BLUE, GREEN, RED, NIR, SWIR1 and SWIR2; LWIR (°C) and CIRRUS
/// are used when present. Hitting `max_iterations` before the cloud
/// fraction settles is reported as [`RunStatus::ConvergenceIncomplete`]
/// with the mask reached so far. Cancellation is checked between stages and
/// iterations.
pub fn auto_cloud(
    image: &Image,
    output_name: &str,
    params: &AutoCloudParams,
    cancel: &CancelToken,
) -> Result<Outcome<Image>> {
    params.validate()?;
    let spectra = Spectra::new(image)?;
    info!(
        image = image.name(),
        rows = image.rows(),
        cols = image.cols(),
        thermal = spectra.has_thermal(),
        max_iterations = params.max_iterations,
        cloud_probability = params.cloud_probability,
        "autocloud"
    );

    let mut labels = initial_labels(&spectra);
    for (stage, run) in SHARED_STAGES {
        if cancel.is_cancelled() {
            warn!(image = image.name(), stage, "autocloud cancelled");
            finalize(&mut labels);
            let mask = mask_image(image, &labels, output_name)?;
            return Ok(Outcome::with_status(mask, RunStatus::Cancelled));
        }
        let changed = run(&spectra, &params.thresholds, &mut labels);
        debug!(stage, changed, "stage done");
    }

    let valid = labels.view().iter().filter(|&&c| c != CloudClass::NoData).count().max(1) as f64;
    let scores = score_candidates(&spectra, &labels, params);
    let mut cloud = scores.mapv(|s| s.is_some_and(|(_, seed)| seed));
    let seeds = cloud.clone();
    let mut fraction = cloud.iter().filter(|&&v| v).count() as f64 / valid;
    debug!(seeds = cloud.iter().filter(|&&v| v).count(), fraction, "seeded");

    let mut status = RunStatus::ConvergenceIncomplete {
        iterations: params.max_iterations,
    };
    let grow_probability = params.cloud_probability / 2.0;
    for iteration in 1..=params.max_iterations {
        if cancel.is_cancelled() {
            warn!(image = image.name(), iteration, "autocloud cancelled");
            status = RunStatus::Cancelled;
            break;
        }
        let added = frontier(&cloud, &scores, grow_probability);
        for &(r, c) in &added {
            cloud[[r, c]] = true;
        }
        let next = fraction + added.len() as f64 / valid;
        let change = (next - fraction).abs();
        fraction = next;
        debug!(iteration, added = added.len(), fraction, "refinement");
        if change <= params.convergence_delta {
            status = RunStatus::Complete;
            break;
        }
    }
    if let RunStatus::ConvergenceIncomplete { iterations } = status {
        warn!(image = image.name(), iterations, fraction, "autocloud did not converge");
    }

    let mut kept = 0;
    let mut dropped = 0;
    for cells in components(&cloud) {
        let seeded = cells.iter().filter(|&&(r, c)| seeds[[r, c]]).count();
        let share = seeded as f64 / cells.len() as f64;
        if cells.len() < params.min_cloud_size || share < params.area_threshold {
            dropped += 1;
            continue;
        }
        kept += 1;
        for (r, c) in cells {
            labels.promote(r, c, CloudClass::Cloud);
        }
    }
    debug!(kept, dropped, "cloud components");

    finalize(&mut labels);
    info!(cloud = labels.count(CloudClass::Cloud), status = %status, "autocloud done");
    Ok(Outcome::with_status(mask_image(image, &labels, output_name)?, status))
}

/// AutoCloud cloud detector
#[derive(Debug, Clone, Default)]
pub struct AutoCloud;

impl Algorithm for AutoCloud {
    type Input = Image;
    type Output = Outcome<Image>;
    type Params = AutoCloudParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "AutoCloud"
    }

    fn description(&self) -> &'static str {
        "Iterative probability-seeded cloud mask of a reflectance image"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        auto_cloud(&input, &format!("{}_autocloud", input.name()), &params, &CancelToken::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::CLOUD_MASK_TAG;
    use approx::assert_relative_eq;
    use orbis_core::{Band, DataType, GeoTransform, Raster};

    const TAGS: [&str; 6] = ["BLUE", "GREEN", "RED", "NIR", "SWIR1", "SWIR2"];
    const BRIGHT: [f64; 6] = [0.5, 0.5, 0.5, 0.5, 0.5, 0.4];
    const DARK: [f64; 6] = [0.05, 0.08, 0.06, 0.3, 0.15, 0.02];
    /// Candidate with probability 0.4
    const HAZY: [f64; 6] = [0.65, 0.5, 0.35, 0.5, 0.5, 0.4];

    fn scene(rows: usize, cols: usize, cells: &[((usize, usize), [f64; 6])]) -> Image {
        let mut image = Image::new("scene", rows, cols, GeoTransform::default(), None);
        for (b, tag) in TAGS.iter().enumerate() {
            let mut r = Raster::filled(rows, cols, DARK[b]);
            for &((row, col), values) in cells {
                r.set(row, col, values[b]).unwrap();
            }
            image.push_band(Band::new(*tag, r, DataType::Float32)).unwrap();
        }
        image
    }

    fn block(
        rows: std::ops::Range<usize>,
        cols: std::ops::Range<usize>,
        values: [f64; 6],
    ) -> Vec<((usize, usize), [f64; 6])> {
        rows.flat_map(|r| cols.clone().map(move |c| ((r, c), values))).collect()
    }

    fn code(image: &Image, row: usize, col: usize) -> f64 {
        image.band_by_tag(CLOUD_MASK_TAG).unwrap().raster().get(row, col).unwrap()
    }

    fn pixel(v: [f64; 6]) -> Pixel {
        Pixel {
            blue: v[0],
            green: v[1],
            red: v[2],
            nir: v[3],
            swir1: v[4],
            swir2: v[5],
            temperature: None,
            cirrus: None,
        }
    }

    #[test]
    fn test_probability() {
        let params = AutoCloudParams::default();
        assert_relative_eq!(params.probability(&pixel(BRIGHT)), 1.0, epsilon = 1e-12);
        assert_relative_eq!(params.probability(&pixel(HAZY)), 0.4, epsilon = 1e-12);

        let mut warm = pixel(BRIGHT);
        warm.temperature = Some(20.0);
        assert_eq!(params.probability(&warm), 0.0);
        warm.temperature = Some(14.0);
        // halfway through the ramp around the threshold
        assert_relative_eq!(params.probability(&warm), 0.5, epsilon = 1e-12);
        warm.temperature = Some(0.0);
        assert_relative_eq!(params.probability(&warm), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bright_block_is_cloud_dark_is_clear() {
        let image = scene(12, 12, &block(0..5, 0..5, BRIGHT));
        let params = AutoCloudParams::default();
        let out = auto_cloud(&image, "mask", &params, &CancelToken::new()).unwrap();
        assert_eq!(out.status, RunStatus::Complete);
        assert_eq!(code(&out.output, 0, 0), 2.0);
        assert_eq!(code(&out.output, 4, 4), 2.0);
        assert_eq!(code(&out.output, 5, 5), 1.0);
        assert_eq!(code(&out.output, 11, 11), 1.0);
    }

    #[test]
    fn test_small_cloud_is_dropped() {
        let image = scene(12, 12, &block(0..3, 0..3, BRIGHT));
        let params = AutoCloudParams::default();
        let out = auto_cloud(&image, "mask", &params, &CancelToken::new()).unwrap();
        assert_eq!(code(&out.output, 1, 1), 1.0);
    }

    #[test]
    fn test_growth_and_iteration_cap() {
        // one seed followed by a chain of nine growable candidates
        let mut cells = vec![((0, 0), BRIGHT)];
        cells.extend(block(0..1, 1..10, HAZY));
        let image = scene(3, 12, &cells);
        let params = AutoCloudParams {
            cloud_probability: 0.5,
            min_cloud_size: 1,
            area_threshold: 0.0,
            ..Default::default()
        };

        let out = auto_cloud(&image, "mask", &params, &CancelToken::new()).unwrap();
        assert_eq!(out.status, RunStatus::Complete);
        for col in 0..10 {
            assert_eq!(code(&out.output, 0, col), 2.0, "col {}", col);
        }
        assert_eq!(code(&out.output, 0, 10), 1.0);

        let capped = AutoCloudParams {
            max_iterations: 3,
            ..params
        };
        let out = auto_cloud(&image, "mask", &capped, &CancelToken::new()).unwrap();
        assert_eq!(out.status, RunStatus::ConvergenceIncomplete { iterations: 3 });
        assert_eq!(code(&out.output, 0, 3), 2.0);
        assert_eq!(code(&out.output, 0, 4), 1.0);
    }

    #[test]
    fn test_seed_share_filter() {
        let mut cells = vec![((0, 0), BRIGHT)];
        cells.extend(block(0..1, 1..10, HAZY));
        let image = scene(3, 12, &cells);
        let params = AutoCloudParams {
            cloud_probability: 0.5,
            min_cloud_size: 1,
            area_threshold: 0.2,
            ..Default::default()
        };
        // one seed in ten pixels
        let out = auto_cloud(&image, "mask", &params, &CancelToken::new()).unwrap();
        assert_eq!(code(&out.output, 0, 0), 1.0);
    }

    #[test]
    fn test_invalid_params() {
        let image = scene(2, 2, &[]);
        for params in [
            AutoCloudParams {
                max_iterations: 0,
                ..Default::default()
            },
            AutoCloudParams {
                cloud_probability: 0.0,
                ..Default::default()
            },
            AutoCloudParams {
                area_threshold: 1.5,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                auto_cloud(&image, "m", &params, &CancelToken::new()),
                Err(Error::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_components_are_8_connected() {
        let mut mask = Array2::from_elem((4, 4), false);
        mask[[0, 0]] = true;
        mask[[1, 1]] = true;
        mask[[3, 3]] = true;
        let found = components(&mask);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].len(), 2);
    }
}
