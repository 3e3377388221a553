//! Minimal multi-band GeoTIFF store built on the `tiff` crate
//!
//! Each band is one TIFF page. Georeferencing is written as the
//! ModelPixelScale / ModelTiepoint pair, nodata as `GDAL_NODATA` on every
//! page, and everything else (band tags, declared data types, calibration,
//! acquisition and image metadata) as a JSON document in `GDAL_METADATA`
//! on the first page.

use super::{apply_window, BandSpec, ImageSpec, RasterStore};
use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::image::{Acquisition, Band, Image};
use crate::raster::{DataType, GeoTransform, Raster};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{Gray32Float, Gray64Float};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_METADATA: u16 = 42112;
const GDAL_NODATA: u16 = 42113;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Image description stored alongside the pixel data
#[derive(Debug, Serialize, Deserialize)]
struct Document {
    name: String,
    transform: [f64; 6],
    crs: Option<CRS>,
    bands: Vec<BandSpec>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default)]
    acquisition: Option<Acquisition>,
}

/// GeoTIFF-backed [`RasterStore`]
///
/// Windowed writes rewrite the whole file; the store targets scene-sized
/// products, not huge mosaics.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffStore;

impl GeoTiffStore {
    pub fn new() -> Self {
        Self
    }
}

impl RasterStore for GeoTiffStore {
    fn open(&self, path: &Path) -> Result<Image> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            _ => Error::Io(e),
        })?;
        let fallback_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        decode_image(BufReader::new(file), fallback_name)
    }

    fn create(&self, path: &Path, spec: &ImageSpec) -> Result<()> {
        let image = spec.blank_image()?;
        write_image(path, &image)
    }

    fn write_window(
        &self,
        path: &Path,
        band: usize,
        row: usize,
        col: usize,
        data: ArrayView2<'_, f64>,
    ) -> Result<()> {
        let mut image = self.open(path)?;
        apply_window(&mut image, band, row, col, data)?;
        write_image(path, &image)
    }

    fn set_metadata(&self, path: &Path, key: &str, value: &str) -> Result<()> {
        let mut image = self.open(path)?;
        image.set_metadata(key, value);
        write_image(path, &image)
    }

    fn save(&self, path: &Path, image: &Image) -> Result<()> {
        write_image(path, image)
    }
}

fn write_image(path: &Path, image: &Image) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    encode_image(image, &mut writer)?;
    writer.flush()?;
    tracing::debug!(path = %path.display(), bands = image.band_count(), "wrote GeoTIFF");
    Ok(())
}

fn decode_image<R: Read + Seek>(reader: R, fallback_name: String) -> Result<Image> {
    let mut decoder = Decoder::new(reader)?;

    let document: Option<Document> = match decoder.get_tag_ascii_string(tag(GDAL_METADATA)) {
        Ok(text) => serde_json::from_str(&text).ok(),
        Err(_) => None,
    };
    // only the first page carries georeferencing
    let tagged_transform = read_geotransform(&mut decoder);

    let mut pages = Vec::new();
    loop {
        let (width, height) = decoder.dimensions()?;
        let nodata = decoder
            .get_tag_ascii_string(tag(GDAL_NODATA))
            .ok()
            .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok());
        let (values, data_type) = decode_values(decoder.read_image()?)?;
        let raster = Raster::from_vec(values, height as usize, width as usize)?;
        pages.push((raster, data_type, nodata));

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    let (transform, crs, name) = match &document {
        Some(doc) => (GeoTransform::from_gdal(doc.transform), doc.crs.clone(), doc.name.clone()),
        None => (tagged_transform.unwrap_or_default(), None, fallback_name),
    };

    let (rows, cols) = pages[0].0.shape();
    let mut image = Image::new(name, rows, cols, transform, crs);
    for (i, (mut raster, page_type, page_nodata)) in pages.into_iter().enumerate() {
        let spec = document.as_ref().and_then(|d| d.bands.get(i));
        let band = match spec {
            Some(spec) => {
                raster.set_nodata(spec.nodata);
                let mut band = Band::new(spec.tag.clone(), raster, spec.data_type);
                band.set_calibration(spec.calibration);
                band
            }
            None => {
                raster.set_nodata(page_nodata);
                Band::new(format!("B{}", i + 1), raster, page_type)
            }
        };
        image.push_band(band)?;
    }

    if let Some(doc) = document {
        for (k, v) in doc.metadata {
            image.set_metadata(k, v);
        }
        image.set_acquisition(doc.acquisition);
    }
    Ok(image)
}

fn decode_values(result: DecodingResult) -> Result<(Vec<f64>, DataType)> {
    let decoded = match result {
        DecodingResult::U8(buf) => (buf.into_iter().map(f64::from).collect(), DataType::UInt8),
        DecodingResult::U16(buf) => (buf.into_iter().map(f64::from).collect(), DataType::UInt16),
        DecodingResult::I16(buf) => (buf.into_iter().map(f64::from).collect(), DataType::Int16),
        DecodingResult::I32(buf) => (buf.into_iter().map(f64::from).collect(), DataType::Int32),
        DecodingResult::F32(buf) => (buf.into_iter().map(f64::from).collect(), DataType::Float32),
        DecodingResult::F64(buf) => (buf, DataType::Float64),
        _ => return Err(Error::UnsupportedDataType("unsupported TIFF sample format".to_string())),
    };
    Ok(decoded)
}

/// Transform from the ModelTiepoint + ModelPixelScale pair
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn encode_image<W: Write + Seek>(image: &Image, writer: W) -> Result<()> {
    if image.band_count() == 0 {
        return Err(Error::invalid_parameter("bands", 0, "a GeoTIFF needs at least one band"));
    }
    let mut encoder = TiffEncoder::new(writer)?;
    let (rows, cols) = image.shape();
    let gt = image.transform();

    let document = serde_json::to_string(&Document {
        name: image.name().to_string(),
        transform: gt.to_gdal(),
        crs: image.crs().cloned(),
        bands: ImageSpec::of(image).bands,
        metadata: image.metadata().clone(),
        acquisition: image.acquisition().copied(),
    })?;

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    // GTModelTypeGeoKey = projected, GTRasterTypeGeoKey = pixel is area
    let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];

    for (i, band) in image.bands().iter().enumerate() {
        let data_type = band.data_type();
        let nodata = band.nodata();
        let values = band
            .raster()
            .data()
            .iter()
            .map(|&v| match nodata {
                Some(nd) if band.raster().is_nodata(v) => nd,
                _ => data_type.coerce(v),
            });
        let nodata_text = nodata.map(|nd| format!("{}", nd));

        macro_rules! write_page {
            ($color:ty, $values:expr) => {{
                let mut page = encoder.new_image::<$color>(cols as u32, rows as u32)?;
                page.encoder().write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])?;
                page.encoder().write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])?;
                page.encoder().write_tag(tag(GEO_KEY_DIRECTORY), &geokeys[..])?;
                if let Some(text) = &nodata_text {
                    page.encoder().write_tag(tag(GDAL_NODATA), text.as_str())?;
                }
                if i == 0 {
                    page.encoder().write_tag(tag(GDAL_METADATA), document.as_str())?;
                }
                page.write_data(&$values)?;
            }};
        }

        match data_type {
            DataType::Float64 | DataType::Int32 => {
                let data: Vec<f64> = values.collect();
                write_page!(Gray64Float, data);
            }
            _ => {
                let data: Vec<f32> = values.map(|v| v as f32).collect();
                write_page!(Gray32Float, data);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::BandCalibration;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn sample() -> Image {
        let mut image = Image::new(
            "LT05_sample",
            2,
            3,
            GeoTransform::new(500000.0, 4200000.0, 30.0, -30.0),
            Some(CRS::from_epsg(32633)),
        );
        let mut red = Raster::from_array(array![[10.0, 20.0, 0.0], [40.0, 50.0, 60.0]]);
        red.set_nodata(Some(0.0));
        let band = Band::new("RED", red, DataType::UInt8)
            .with_calibration(BandCalibration::new(0.76, -1.52).with_esun(1554.0));
        image.push_band(band).unwrap();

        let mut ndvi =
            Raster::from_array(array![[0.25, -0.5, crate::FLOAT_NODATA], [0.0, 1.0, 0.125]]);
        ndvi.set_nodata(Some(crate::FLOAT_NODATA));
        image.push_band(Band::new("NDVI", ndvi, DataType::Float32)).unwrap();

        image.set_metadata("legend", "0=nodata");
        image.set_acquisition(Some(Acquisition::new(35.0, 140.0, 180)));
        image
    }

    #[test]
    fn test_roundtrip_in_memory_buffer() {
        let image = sample();
        let mut buf = std::io::Cursor::new(Vec::new());
        encode_image(&image, &mut buf).unwrap();
        buf.set_position(0);

        let back = decode_image(buf, "unused".into()).unwrap();
        assert_eq!(back.name(), "LT05_sample");
        assert_eq!(back.band_count(), 2);
        assert_eq!(back.band_index("NDVI"), Some(1));
        assert_eq!(back.crs(), Some(&CRS::from_epsg(32633)));
        assert_eq!(back.transform(), image.transform());
        assert_eq!(back.metadata().get("legend").map(String::as_str), Some("0=nodata"));
        assert_eq!(back.acquisition().map(|a| a.day_of_year), Some(180));

        let red = back.band(0).unwrap();
        assert_eq!(red.data_type(), DataType::UInt8);
        assert_eq!(red.nodata(), Some(0.0));
        assert_relative_eq!(red.calibration().unwrap().gain, 0.76);
        assert_eq!(red.raster().data(), image.band(0).unwrap().raster().data());

        let ndvi = back.band(1).unwrap();
        assert_relative_eq!(ndvi.raster().data()[[0, 0]], 0.25);
        assert!(!ndvi.raster().is_valid_at(0, 2));
    }

    #[test]
    fn test_declared_type_is_applied_on_write() {
        let mut image = Image::new("t", 1, 2, GeoTransform::default(), None);
        let raster = Raster::from_array(array![[3.6, 300.0]]);
        image.push_band(Band::new("B1", raster, DataType::UInt8)).unwrap();

        let mut buf = std::io::Cursor::new(Vec::new());
        encode_image(&image, &mut buf).unwrap();
        buf.set_position(0);
        let back = decode_image(buf, "t".into()).unwrap();
        assert_eq!(back.band(0).unwrap().raster().data(), &array![[4.0, 255.0]]);
    }
}
