//! K-means clustering of multi-band images
//!
//! Unsupervised classification by iteratively partitioning pixels
//! into k clusters based on spectral distance.

use crate::maybe_rayon::*;
use crate::outcome::{Outcome, RunStatus};
use crate::pixel::{band_refs, product_band};
use ndarray::Array2;
use orbis_core::{Algorithm, BandSelector, DataType, Error, Image, Result};
use orbis_parallel::CancelToken;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Nodata value of the class band
pub const CLASS_NODATA: f64 = 255.0;

/// Parameters for K-means clustering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmeansParams {
    /// Number of clusters, 2..=254 (default: 5)
    pub classes: usize,
    /// Maximum iterations (default: 5)
    pub iterations: usize,
    /// Stop when no centroid moves this far or more (default: 1.0)
    pub threshold: f64,
    /// Bands forming the feature vector (default: all)
    pub bands: BandSelector,
}

impl Default for KmeansParams {
    fn default() -> Self {
        Self {
            classes: 5,
            iterations: 5,
            threshold: 1.0,
            bands: BandSelector::all(),
        }
    }
}

/// Why the iteration stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Centroid movement fell below the threshold
    Converged,
    /// The iteration cap was reached first
    IterationLimit,
}

/// Class image together with the final cluster centres
#[derive(Debug, Clone)]
pub struct KmeansResult {
    /// UInt8 band `CLASS` with labels `0..classes`, nodata 255
    pub image: Image,
    /// One centre per class, one value per selected band
    pub centroids: Vec<Vec<f64>>,
    pub termination: Termination,
    /// Assignment/update rounds performed
    pub iterations: usize,
}

/// Valid pixels as a dense feature matrix
struct Samples {
    /// Row-major cell index of each sample
    cells: Vec<usize>,
    /// `cells.len() x dims` values
    values: Vec<f64>,
    dims: usize,
}

impl Samples {
    fn collect(image: &Image, bands: &[usize]) -> Result<Self> {
        let stack = band_refs(image, bands)?;
        let (rows, cols) = image.shape();
        let per_row: Vec<(Vec<usize>, Vec<f64>)> = (0..rows)
            .into_par_iter()
            .map(|row| {
                let mut cells = Vec::new();
                let mut values = Vec::new();
                'cells: for col in 0..cols {
                    let start = values.len();
                    for band in &stack {
                        let v = unsafe { band.raster().get_unchecked(row, col) };
                        if !band.is_valid(v) || !v.is_finite() {
                            values.truncate(start);
                            continue 'cells;
                        }
                        values.push(v);
                    }
                    cells.push(row * cols + col);
                }
                (cells, values)
            })
            .collect();

        let mut samples = Self {
            cells: Vec::new(),
            values: Vec::new(),
            dims: stack.len(),
        };
        for (cells, values) in per_row {
            samples.cells.extend(cells);
            samples.values.extend(values);
        }
        Ok(samples)
    }

    fn len(&self) -> usize {
        self.cells.len()
    }

    fn get(&self, i: usize) -> &[f64] {
        &self.values[i * self.dims..(i + 1) * self.dims]
    }
}

fn distance_sq(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Nearest centroid, ties going to the lowest index
fn nearest(pixel: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (k, c) in centroids.iter().enumerate() {
        let d = distance_sq(pixel, c);
        if d < best_dist {
            best_dist = d;
            best = k;
        }
    }
    best
}

/// Centroids evenly spaced along the per-band value range
fn initial_centroids(samples: &Samples, k: usize) -> Vec<Vec<f64>> {
    let mut min = vec![f64::INFINITY; samples.dims];
    let mut max = vec![f64::NEG_INFINITY; samples.dims];
    for i in 0..samples.len() {
        for (b, &v) in samples.get(i).iter().enumerate() {
            min[b] = min[b].min(v);
            max[b] = max[b].max(v);
        }
    }
    (0..k)
        .map(|c| {
            (0..samples.dims)
                .map(|b| min[b] + (c as f64 + 0.5) * (max[b] - min[b]) / k as f64)
                .collect()
        })
        .collect()
}

fn assign(samples: &Samples, centroids: &[Vec<f64>]) -> Vec<usize> {
    (0..samples.len())
        .into_par_iter()
        .map(|i| nearest(samples.get(i), centroids))
        .collect()
}

/// New centroids from the assignment; returns them with the largest movement.
///
/// An empty cluster is reseeded at the sample farthest from every other
/// centroid, the first such sample in row-major order on ties.
fn update(samples: &Samples, labels: &[usize], centroids: &[Vec<f64>]) -> (Vec<Vec<f64>>, f64) {
    let k = centroids.len();
    let mut sums = vec![vec![0.0; samples.dims]; k];
    let mut counts = vec![0usize; k];
    for (i, &label) in labels.iter().enumerate() {
        counts[label] += 1;
        for (s, v) in sums[label].iter_mut().zip(samples.get(i)) {
            *s += v;
        }
    }

    let mut next = centroids.to_vec();
    for c in 0..k {
        if counts[c] > 0 {
            next[c] = sums[c].iter().map(|s| s / counts[c] as f64).collect();
        }
    }
    for c in (0..k).filter(|&c| counts[c] == 0) {
        let mut far = 0;
        let mut far_dist = f64::NEG_INFINITY;
        for i in 0..samples.len() {
            let d = next
                .iter()
                .enumerate()
                .filter(|&(other, _)| other != c)
                .map(|(_, centroid)| distance_sq(samples.get(i), centroid))
                .fold(f64::INFINITY, f64::min);
            if d > far_dist {
                far_dist = d;
                far = i;
            }
        }
        debug!(class = c, sample = samples.cells[far], "reseeding empty cluster");
        next[c] = samples.get(far).to_vec();
    }

    let movement = centroids
        .iter()
        .zip(&next)
        .map(|(a, b)| distance_sq(a, b).sqrt())
        .fold(0.0, f64::max);
    (next, movement)
}

/// K-means clustering of the selected bands of an image.
///
/// Pixels where any selected band is nodata are excluded and written as
/// nodata. Initialization is deterministic, so repeated runs give the same
/// labels. Reaching `iterations` without convergence is reported as
/// [`RunStatus::ConvergenceIncomplete`]; the cancel token is checked before
/// each iteration.
pub fn kmeans(
    image: &Image,
    output_name: &str,
    params: &KmeansParams,
    cancel: &CancelToken,
) -> Result<Outcome<KmeansResult>> {
    let k = params.classes;
    if !(2..=254).contains(&k) {
        return Err(Error::invalid_parameter("classes", k, "must be in 2..=254"));
    }
    if params.iterations == 0 {
        return Err(Error::invalid_parameter("iterations", 0, "at least one iteration is required"));
    }
    if !(params.threshold.is_finite() && params.threshold >= 0.0) {
        return Err(Error::invalid_parameter("threshold", params.threshold, "must be non-negative"));
    }
    let bands = image.select(&params.bands)?;
    let samples = Samples::collect(image, &bands)?;
    if samples.len() < k {
        return Err(Error::invalid_parameter(
            "classes",
            k,
            format!("only {} valid pixels", samples.len()),
        ));
    }
    info!(
        image = image.name(),
        rows = image.rows(),
        cols = image.cols(),
        bands = bands.len(),
        pixels = samples.len(),
        classes = k,
        "k-means"
    );

    let mut centroids = initial_centroids(&samples, k);
    let mut termination = Termination::IterationLimit;
    let mut status = RunStatus::ConvergenceIncomplete {
        iterations: params.iterations,
    };
    let mut iterations = 0;
    while iterations < params.iterations {
        if cancel.is_cancelled() {
            warn!(image = image.name(), iteration = iterations, "k-means cancelled");
            status = RunStatus::Cancelled;
            break;
        }
        let labels = assign(&samples, &centroids);
        let (next, movement) = update(&samples, &labels, &centroids);
        centroids = next;
        iterations += 1;
        debug!(iteration = iterations, movement, "k-means iteration");
        if movement < params.threshold {
            termination = Termination::Converged;
            status = RunStatus::Complete;
            break;
        }
    }
    if let RunStatus::ConvergenceIncomplete { iterations } = status {
        warn!(image = image.name(), iterations, "k-means did not converge");
    }

    let labels = assign(&samples, &centroids);
    let (rows, cols) = image.shape();
    let mut data = Array2::from_elem((rows, cols), CLASS_NODATA);
    for (&cell, &label) in samples.cells.iter().zip(&labels) {
        data[[cell / cols, cell % cols]] = label as f64;
    }
    let mut output = image.empty_like(output_name);
    output.push_band(product_band(image, "CLASS", data, DataType::UInt8, CLASS_NODATA)?)?;

    Ok(Outcome::with_status(
        KmeansResult {
            image: output,
            centroids,
            termination,
            iterations,
        },
        status,
    ))
}

/// K-means classification
#[derive(Debug, Clone, Default)]
pub struct Kmeans;

impl Algorithm for Kmeans {
    type Input = Image;
    type Output = Outcome<KmeansResult>;
    type Params = KmeansParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Kmeans"
    }

    fn description(&self) -> &'static str {
        "Unsupervised k-means classification of image bands"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        kmeans(&input, &format!("{}_kmeans", input.name()), &params, &CancelToken::new())
    }
}
