//! Footprint-clipped mosaic of overlapping images

use crate::outcome::{Outcome, RunStatus};
use ndarray::Array2;
use orbis_core::{
    Algorithm, BandSpec, DataType, Error, Footprint, GeoTransform, Image, ImageSpec, RasterStore,
    Result, FLOAT_NODATA,
};
use orbis_parallel::{CancelToken, TiledProcessor};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parameters for [`cookie_cutter`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieCutterParams {
    /// Output cell width in map units
    pub resolution_x: f64,
    /// Output cell height in map units
    pub resolution_y: f64,
    /// Rows written per block
    pub block_rows: usize,
}

impl Default for CookieCutterParams {
    fn default() -> Self {
        Self {
            resolution_x: 1.0,
            resolution_y: 1.0,
            block_rows: 256,
        }
    }
}

impl CookieCutterParams {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("resolution_x", self.resolution_x),
            ("resolution_y", self.resolution_y),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::invalid_parameter(name, value, "resolution must be positive"));
            }
        }
        Ok(())
    }
}

fn check_sources(images: &[Image]) -> Result<()> {
    let Some(first) = images.first() else {
        return Err(Error::invalid_parameter("sources", "[]", "at least one source is required"));
    };
    for image in &images[1..] {
        if image.band_count() != first.band_count() {
            return Err(Error::invalid_parameter(
                "sources",
                image.name(),
                format!(
                    "has {} bands, '{}' has {}",
                    image.band_count(),
                    first.name(),
                    first.band_count()
                ),
            ));
        }
        if let (Some(a), Some(b)) = (first.crs(), image.crs()) {
            if !a.is_equivalent(b) {
                return Err(Error::CrsMismatch(a.to_string(), b.to_string()));
            }
        }
    }
    Ok(())
}

/// Nodata of output band `band`: the sentinel every source shares, or
/// [`FLOAT_NODATA`] when they differ
fn band_nodata(images: &[Image], band: usize) -> f64 {
    let mut sentinels = images.iter().map(|image| image.band(band).and_then(|b| b.nodata()));
    match sentinels.next() {
        Some(Some(first)) if sentinels.all(|nodata| nodata == Some(first)) => first,
        _ => FLOAT_NODATA,
    }
}

/// Output layout: footprint box on the requested grid, bands of the first source
fn output_spec(
    name: &str,
    images: &[Image],
    transform: GeoTransform,
    rows: usize,
    cols: usize,
) -> Result<ImageSpec> {
    let first = images.first().ok_or_else(|| {
        Error::invalid_parameter("sources", "[]", "at least one source is required")
    })?;
    let bands = first
        .bands()
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let nodata = band_nodata(images, i);
            let (min, max) = b.data_type().range();
            let data_type = if (min..=max).contains(&nodata) {
                b.data_type()
            } else {
                DataType::Float32
            };
            let mut spec = BandSpec::new(b.tag(), data_type, Some(nodata));
            spec.calibration = b.calibration().copied();
            spec
        })
        .collect();
    let mut spec = ImageSpec {
        name: name.to_string(),
        rows,
        cols,
        transform,
        crs: first.crs().cloned(),
        bands,
        metadata: Default::default(),
        acquisition: first.acquisition().copied(),
    };
    spec.metadata.insert("sources".into(), images.len().to_string());
    Ok(spec)
}

/// Value of `band` at the map point from the first source holding valid data
fn sample(sources: &[&Image], band: usize, x: f64, y: f64) -> Option<f64> {
    sources.iter().find_map(|image| {
        let (row, col) = image.transform().cell_at(x, y, image.rows(), image.cols())?;
        let b = image.band(band)?;
        let v = unsafe { b.raster().get_unchecked(row, col) };
        b.is_valid(v).then_some(v)
    })
}

/// Mosaic `sources` inside `footprint` into a new image at `output`.
///
/// The output grid is the footprint's bounding box snapped outwards to the
/// requested resolution, in the CRS of the first source. Each output cell
/// centre outside the footprint is nodata; inside, every band takes the
/// value of the first source (in input order) that covers the centre with
/// valid data. Sampling is nearest-neighbour. A band keeps the sources'
/// nodata value when they all agree on it and uses [`FLOAT_NODATA`]
/// otherwise.
///
/// Preconditions are checked before the output is created. Rows are written
/// block by block; when `cancel` is set between blocks the written blocks
/// stay in place and the run reports [`RunStatus::Cancelled`].
pub fn cookie_cutter(
    store: &dyn RasterStore,
    sources: &[PathBuf],
    footprint: &Footprint,
    output: &Path,
    params: &CookieCutterParams,
    cancel: &CancelToken,
) -> Result<Outcome<Image>> {
    params.validate()?;
    let images = sources
        .iter()
        .map(|path| store.open(path))
        .collect::<Result<Vec<_>>>()?;
    check_sources(&images)?;

    let extent = footprint.bounds().ok_or(Error::NoOverlap)?;
    let overlapping: Vec<&Image> = images
        .iter()
        .filter(|image| footprint.intersects_bounds(image.bounds()))
        .collect();
    if overlapping.is_empty() {
        return Err(Error::NoOverlap);
    }

    let (transform, rows, cols) =
        GeoTransform::covering(extent, params.resolution_x, params.resolution_y);
    let name = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mosaic".to_string());
    let spec = output_spec(&name, &images, transform, rows, cols)?;
    let nodata: Vec<f64> = spec.bands.iter().map(|b| b.nodata.unwrap_or(FLOAT_NODATA)).collect();
    info!(
        output = %output.display(),
        sources = images.len(),
        overlapping = overlapping.len(),
        rows,
        cols,
        bands = nodata.len(),
        "cookie cutter"
    );
    store.create(output, &spec)?;

    let processor = TiledProcessor::new(params.block_rows);
    let run = processor.for_each_block(rows, cols, cancel, |tile| {
        let block: Vec<Vec<Vec<f64>>> = processor.map_rows(tile, |row| {
            let mut row_data: Vec<Vec<f64>> = nodata.iter().map(|&nd| vec![nd; cols]).collect();
            for col in 0..cols {
                let (x, y) = transform.pixel_to_geo(col, row);
                if !footprint.contains(x, y) {
                    continue;
                }
                for (band, values) in row_data.iter_mut().enumerate() {
                    if let Some(v) = sample(&overlapping, band, x, y) {
                        values[col] = v;
                    }
                }
            }
            row_data
        });

        for band in 0..nodata.len() {
            let flat: Vec<f64> = block.iter().flat_map(|row| row[band].iter().copied()).collect();
            let window = Array2::from_shape_vec((tile.rows, cols), flat)
                .map_err(|e| Error::Other(e.to_string()))?;
            store.write_window(output, band, tile.row_offset, 0, window.view())?;
        }
        debug!(row = tile.row_offset, rows = tile.rows, "block written");
        Ok::<(), Error>(())
    })?;

    let status = if run.cancelled {
        warn!(completed = run.completed, total = run.total, "cookie cutter cancelled");
        RunStatus::Cancelled
    } else {
        RunStatus::Complete
    };
    Ok(Outcome::with_status(store.open(output)?, status))
}

/// Inputs of a mosaic run
#[derive(Clone)]
pub struct MosaicRequest {
    pub store: Arc<dyn RasterStore>,
    pub sources: Vec<PathBuf>,
    pub footprint: Footprint,
    pub output: PathBuf,
    pub cancel: CancelToken,
}

/// Footprint-clipped mosaic
#[derive(Debug, Clone, Default)]
pub struct CookieCutter;

impl Algorithm for CookieCutter {
    type Input = MosaicRequest;
    type Output = Outcome<Image>;
    type Params = CookieCutterParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "CookieCutter"
    }

    fn description(&self) -> &'static str {
        "Mosaic overlapping images inside a footprint, first source wins"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        cookie_cutter(
            input.store.as_ref(),
            &input.sources,
            &input.footprint,
            &input.output,
            &params,
            &input.cancel,
        )
    }
}
