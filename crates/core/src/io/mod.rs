//! Raster storage
//!
//! Algorithms read whole images through [`RasterStore::open`] and write
//! outputs either as finished in-memory images ([`RasterStore::save`]) or
//! incrementally, by creating an image from an [`ImageSpec`] and filling it
//! with [`RasterStore::write_window`].

mod geotiff;
mod memory;

pub use geotiff::GeoTiffStore;
pub use memory::MemoryStore;

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::image::{Acquisition, BandCalibration, Image};
use crate::raster::{DataType, GeoTransform};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Layout of one band of an image to be created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSpec {
    pub tag: String,
    pub data_type: DataType,
    pub nodata: Option<f64>,
    #[serde(default)]
    pub calibration: Option<BandCalibration>,
}

impl BandSpec {
    pub fn new(tag: impl Into<String>, data_type: DataType, nodata: Option<f64>) -> Self {
        Self {
            tag: tag.into(),
            data_type,
            nodata,
            calibration: None,
        }
    }
}

/// Layout of an image to be created on a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub name: String,
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
    pub crs: Option<CRS>,
    pub bands: Vec<BandSpec>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub acquisition: Option<Acquisition>,
}

impl ImageSpec {
    /// Spec describing an existing image
    pub fn of(image: &Image) -> Self {
        Self {
            name: image.name().to_string(),
            rows: image.rows(),
            cols: image.cols(),
            transform: *image.transform(),
            crs: image.crs().cloned(),
            bands: image
                .bands()
                .iter()
                .map(|b| BandSpec {
                    tag: b.tag().to_string(),
                    data_type: b.data_type(),
                    nodata: b.nodata(),
                    calibration: b.calibration().copied(),
                })
                .collect(),
            metadata: image.metadata().clone(),
            acquisition: image.acquisition().copied(),
        }
    }

    /// Image with every band filled with its nodata value (zero without one)
    pub fn blank_image(&self) -> Result<Image> {
        if self.rows == 0 || self.cols == 0 {
            return Err(Error::InvalidDimensions {
                width: self.cols,
                height: self.rows,
            });
        }
        let mut image = Image::new(
            self.name.clone(),
            self.rows,
            self.cols,
            self.transform,
            self.crs.clone(),
        );
        for spec in &self.bands {
            let fill = spec.nodata.unwrap_or(0.0);
            let mut raster = crate::Raster::filled(self.rows, self.cols, fill);
            raster.set_nodata(spec.nodata);
            let mut band = crate::Band::new(spec.tag.clone(), raster, spec.data_type);
            band.set_calibration(spec.calibration);
            image.push_band(band)?;
        }
        for (k, v) in &self.metadata {
            image.set_metadata(k.clone(), v.clone());
        }
        image.set_acquisition(self.acquisition);
        Ok(image)
    }
}

/// Storage backend for images
pub trait RasterStore: Send + Sync {
    /// Read a complete image
    fn open(&self, path: &Path) -> Result<Image>;

    /// Create (or replace) an image, every band filled with nodata
    fn create(&self, path: &Path, spec: &ImageSpec) -> Result<()>;

    /// Write a block of values into `band` with its top-left cell at `(row, col)`
    fn write_window(
        &self,
        path: &Path,
        band: usize,
        row: usize,
        col: usize,
        data: ArrayView2<'_, f64>,
    ) -> Result<()>;

    /// Set an image-level metadata entry
    fn set_metadata(&self, path: &Path, key: &str, value: &str) -> Result<()>;

    /// Persist a finished image
    fn save(&self, path: &Path, image: &Image) -> Result<()> {
        self.create(path, &ImageSpec::of(image))?;
        for (i, band) in image.bands().iter().enumerate() {
            self.write_window(path, i, 0, 0, band.raster().view())?;
        }
        Ok(())
    }
}

/// Bounds check shared by the store implementations
pub(crate) fn check_window(
    image: &Image,
    band: usize,
    row: usize,
    col: usize,
    data: &ArrayView2<'_, f64>,
) -> Result<()> {
    if band >= image.band_count() {
        let reason = format!("image has {} bands", image.band_count());
        return Err(Error::invalid_parameter("band", band, reason));
    }
    let (h, w) = data.dim();
    if row + h > image.rows() || col + w > image.cols() {
        return Err(Error::IndexOutOfBounds {
            row: row + h.saturating_sub(1),
            col: col + w.saturating_sub(1),
            rows: image.rows(),
            cols: image.cols(),
        });
    }
    Ok(())
}

/// Copy a window into a band of an in-memory image
pub(crate) fn apply_window(
    image: &mut Image,
    band: usize,
    row: usize,
    col: usize,
    data: ArrayView2<'_, f64>,
) -> Result<()> {
    check_window(image, band, row, col, &data)?;
    let (h, w) = data.dim();
    let target = image
        .band_mut(band)
        .ok_or_else(|| Error::Other(format!("band {} vanished", band)))?;
    target
        .raster_mut()
        .data_mut()
        .slice_mut(ndarray::s![row..row + h, col..col + w])
        .assign(&data);
    Ok(())
}
