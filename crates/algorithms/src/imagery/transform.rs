//! Linear band transforms
//!
//! Each output band is a weighted sum of the input bands. The tasseled cap
//! transform is the linear transform with the sensor's published
//! coefficients on BLUE, GREEN, RED, NIR, SWIR1 and SWIR2.

use crate::pixel::{float_band, map_bands, require_tags};
use crate::sensor::{Sensor, TCAP_BANDS, TCAP_NAMES};
use orbis_core::{Error, Image, Result};
use tracing::info;

/// Output band `i` is `Σ_j coefficients[i][j] * band_j` over all bands.
///
/// Output bands are tagged `T1`, `T2`, ...
pub fn linear_transform(
    image: &Image,
    coefficients: &[Vec<f64>],
    output_name: &str,
) -> Result<Image> {
    let bands: Vec<usize> = (0..image.band_count()).collect();
    let tags: Vec<String> = (1..=coefficients.len()).map(|i| format!("T{}", i)).collect();
    let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
    transform_bands(image, &bands, coefficients, &tags, output_name)
}

/// Tasseled cap components of a reflectance image
pub fn tasseled_cap(image: &Image, sensor: Sensor, output_name: &str) -> Result<Image> {
    let bands = require_tags(image, &TCAP_BANDS)?;
    let coefficients: Vec<Vec<f64>> =
        sensor.tasseled_cap().iter().map(|row| row.to_vec()).collect();
    info!(image = image.name(), sensor = sensor.description(), "tasseled cap transform");
    transform_bands(image, &bands, &coefficients, &TCAP_NAMES, output_name)
}

fn transform_bands(
    image: &Image,
    bands: &[usize],
    coefficients: &[Vec<f64>],
    tags: &[&str],
    output_name: &str,
) -> Result<Image> {
    if coefficients.is_empty() {
        return Err(Error::invalid_parameter(
            "coefficients",
            "[]",
            "at least one output row is required",
        ));
    }
    if let Some(row) = coefficients.iter().find(|row| row.len() != bands.len()) {
        return Err(Error::invalid_parameter(
            "coefficients",
            format!("row of {} weights", row.len()),
            format!("expected {} weights, one per band", bands.len()),
        ));
    }
    info!(
        image = image.name(),
        inputs = bands.len(),
        outputs = coefficients.len(),
        "linear transform"
    );

    let mut output = image.empty_like(output_name);
    for (row, tag) in coefficients.iter().zip(tags) {
        let data = map_bands(image, bands, None, |v| {
            Some(row.iter().zip(v).map(|(c, x)| c * x).sum())
        })?;
        output.push_band(float_band(image, tag, data)?)?;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbis_core::{Band, DataType, GeoTransform, Raster, FLOAT_NODATA};

    fn image(values: &[(&str, f64)]) -> Image {
        let mut image = Image::new("scene", 3, 3, GeoTransform::default(), None);
        for &(tag, v) in values {
            let mut r = Raster::filled(3, 3, v);
            r.set_nodata(Some(FLOAT_NODATA));
            image.push_band(Band::new(tag, r, DataType::Float32)).unwrap();
        }
        image
    }

    #[test]
    fn test_linear_transform() {
        let img = image(&[("A", 1.0), ("B", 2.0)]);
        let out = linear_transform(&img, &[vec![1.0, 1.0], vec![0.5, -1.0]], "t").unwrap();
        assert_eq!(out.band_count(), 2);
        assert_eq!(out.band_by_tag("T1").unwrap().raster().get(1, 1).unwrap(), 3.0);
        assert_eq!(out.band_by_tag("T2").unwrap().raster().get(1, 1).unwrap(), -1.5);
    }

    #[test]
    fn test_coefficient_shape_checked() {
        let img = image(&[("A", 1.0), ("B", 2.0)]);
        assert!(matches!(
            linear_transform(&img, &[vec![1.0]], "t"),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(linear_transform(&img, &[], "t").is_err());
    }

    #[test]
    fn test_tasseled_cap_brightness() {
        let img = image(&[
            ("BLUE", 0.1),
            ("GREEN", 0.1),
            ("RED", 0.1),
            ("NIR", 0.1),
            ("SWIR1", 0.1),
            ("SWIR2", 0.1),
        ]);
        let out = tasseled_cap(&img, Sensor::Landsat7, "tc").unwrap();
        let tags: Vec<_> = out.tags().collect();
        assert_eq!(tags, TCAP_NAMES.to_vec());

        let expected: f64 = Sensor::Landsat7.tasseled_cap()[0].iter().sum::<f64>() * 0.1;
        let got = out.band_by_tag("Brightness").unwrap().raster().get(0, 0).unwrap();
        assert!((got - expected).abs() < 1e-10, "Expected {}, got {}", expected, got);
    }

    #[test]
    fn test_tasseled_cap_requires_bands() {
        let img = image(&[("BLUE", 0.1)]);
        assert!(matches!(
            tasseled_cap(&img, Sensor::Landsat8, "tc"),
            Err(Error::MissingBand { .. })
        ));
    }
}
