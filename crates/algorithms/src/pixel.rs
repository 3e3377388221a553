//! Row-parallel per-pixel evaluation over band stacks

use crate::mask::Mask;
use crate::maybe_rayon::*;
use ndarray::Array2;
use orbis_core::{Band, DataType, Error, Image, Raster, Result, FLOAT_NODATA};

/// Evaluate `f` on the values of `bands` at every pixel.
///
/// Pixels where any of the bands is nodata, where `mask` is invalid, or
/// where `f` returns `None` are written as [`FLOAT_NODATA`].
pub(crate) fn map_bands<F>(
    image: &Image,
    bands: &[usize],
    mask: Option<&Mask>,
    f: F,
) -> Result<Array2<f64>>
where
    F: Fn(&[f64]) -> Option<f64> + Sync + Send,
{
    map_bands_with_nodata(image, bands, mask, FLOAT_NODATA, f)
}

/// [`map_bands`] with an explicit output nodata value
pub(crate) fn map_bands_with_nodata<F>(
    image: &Image,
    bands: &[usize],
    mask: Option<&Mask>,
    nodata: f64,
    f: F,
) -> Result<Array2<f64>>
where
    F: Fn(&[f64]) -> Option<f64> + Sync + Send,
{
    let stack = band_refs(image, bands)?;
    let (rows, cols) = image.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![nodata; cols];
            let mut values = vec![0.0; stack.len()];
            for (col, out) in row_data.iter_mut().enumerate() {
                if mask.is_some_and(|m| !m.is_valid(row, col)) {
                    continue;
                }
                let mut valid = true;
                for (slot, band) in values.iter_mut().zip(&stack) {
                    let v = unsafe { band.raster().get_unchecked(row, col) };
                    if !band.is_valid(v) {
                        valid = false;
                        break;
                    }
                    *slot = v;
                }
                if !valid {
                    continue;
                }
                if let Some(result) = f(&values) {
                    if result.is_finite() {
                        *out = result;
                    }
                }
            }
            row_data
        })
        .collect();

    Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))
}

pub(crate) fn band_refs<'a>(image: &'a Image, bands: &[usize]) -> Result<Vec<&'a Band>> {
    bands
        .iter()
        .map(|&i| {
            image.band(i).ok_or_else(|| Error::InvalidBandSelector {
                selector: format!("#{}", i),
                image: image.name().to_string(),
            })
        })
        .collect()
}

/// Indices of the bands carrying `tags`, failing with `MissingBand`
pub(crate) fn require_tags(image: &Image, tags: &[&str]) -> Result<Vec<usize>> {
    tags.iter()
        .map(|tag| {
            image.require_band(tag)?;
            image
                .band_index(tag)
                .ok_or_else(|| Error::Other(format!("band index for {} vanished", tag)))
        })
        .collect()
}

/// Float32 product band on the image grid with the shared float nodata
pub(crate) fn float_band(image: &Image, tag: &str, data: Array2<f64>) -> Result<Band> {
    product_band(image, tag, data, DataType::Float32, FLOAT_NODATA)
}

/// Product band on the image grid with an explicit type and nodata
pub(crate) fn product_band(
    image: &Image,
    tag: &str,
    data: Array2<f64>,
    data_type: DataType,
    nodata: f64,
) -> Result<Band> {
    let (rows, cols) = image.shape();
    if data.dim() != (rows, cols) {
        return Err(Error::SizeMismatch {
            er: rows,
            ec: cols,
            ar: data.nrows(),
            ac: data.ncols(),
        });
    }
    let mut raster = Raster::from_array(data);
    raster.set_transform(*image.transform());
    raster.set_crs(image.crs().cloned());
    raster.set_nodata(Some(nodata));
    Ok(Band::new(tag, raster, data_type))
}
