//! Validity masks
//!
//! A mask marks the pixels where every selected band carries data. It is
//! computed once per call and never persisted.

use crate::maybe_rayon::*;
use ndarray::{Array2, ArrayView2};
use orbis_core::{BandSelector, Error, Image, Result};

/// Per-pixel validity, `true` = valid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    valid: Array2<bool>,
}

impl Mask {
    pub fn from_array(valid: Array2<bool>) -> Self {
        Self { valid }
    }

    /// Every pixel valid
    pub fn all_valid(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), true))
    }

    pub fn shape(&self) -> (usize, usize) {
        self.valid.dim()
    }

    /// Validity at `(row, col)`; out-of-range cells are invalid
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.valid.get((row, col)).copied().unwrap_or(false)
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    pub fn view(&self) -> ArrayView2<'_, bool> {
        self.valid.view()
    }

    pub fn into_array(self) -> Array2<bool> {
        self.valid
    }

    /// Pixels valid in both masks
    pub fn and(&self, other: &Mask) -> Result<Mask> {
        if self.shape() != other.shape() {
            let (er, ec) = self.shape();
            let (ar, ac) = other.shape();
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }
        let valid = ndarray::Zip::from(&self.valid)
            .and(&other.valid)
            .map_collect(|&a, &b| a && b);
        Ok(Mask::from_array(valid))
    }
}

/// Valid where the value of every selected band differs from that band's
/// nodata and is not NaN.
///
/// An empty selector selects every band.
pub fn create_mask(image: &Image, selector: &BandSelector) -> Result<Mask> {
    let indices = image.select(selector)?;
    let bands: Vec<_> = indices.iter().filter_map(|&i| image.band(i)).collect();
    let (rows, cols) = image.shape();

    let data: Vec<bool> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![true; cols];
            for (col, valid) in row_data.iter_mut().enumerate() {
                *valid = bands.iter().all(|band| {
                    let v = unsafe { band.raster().get_unchecked(row, col) };
                    band.is_valid(v)
                });
            }
            row_data
        })
        .collect();

    let valid = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(Mask::from_array(valid))
}
