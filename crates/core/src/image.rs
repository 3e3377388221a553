//! Multi-band imagery
//!
//! An [`Image`] is an ordered set of [`Band`]s sharing one pixel grid,
//! geotransform and CRS. Bands are addressed by semantic tag (`"RED"`,
//! `"NIR"`, ...) or by 0-based position.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{DataType, GeoTransform, Raster, RasterElement};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Sensor calibration coefficients of a band.
///
/// `radiance = DN * gain + offset`. Reflective bands carry the
/// exoatmospheric irradiance `esun`; thermal bands carry `k1`/`k2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandCalibration {
    pub gain: f64,
    pub offset: f64,
    #[serde(default)]
    pub esun: Option<f64>,
    #[serde(default)]
    pub k1: Option<f64>,
    #[serde(default)]
    pub k2: Option<f64>,
}

impl BandCalibration {
    pub fn new(gain: f64, offset: f64) -> Self {
        Self {
            gain,
            offset,
            esun: None,
            k1: None,
            k2: None,
        }
    }

    /// Gain and offset from the sensor's radiance and quantization ranges
    pub fn from_ranges(min_radiance: f64, max_radiance: f64, min_qcal: f64, max_qcal: f64) -> Self {
        let gain = (max_radiance - min_radiance) / (max_qcal - min_qcal);
        Self::new(gain, min_radiance - gain * min_qcal)
    }

    pub fn with_esun(mut self, esun: f64) -> Self {
        self.esun = Some(esun);
        self
    }

    pub fn with_thermal(mut self, k1: f64, k2: f64) -> Self {
        self.k1 = Some(k1);
        self.k2 = Some(k2);
        self
    }

    /// Thermal constants, when both are present
    pub fn thermal(&self) -> Option<(f64, f64)> {
        self.k1.zip(self.k2)
    }

    /// A band is thermal when it has K1/K2 and no solar irradiance
    pub fn is_thermal(&self) -> bool {
        self.esun.is_none() && self.thermal().is_some()
    }

    pub fn radiance(&self, dn: f64) -> f64 {
        dn * self.gain + self.offset
    }
}

/// Acquisition geometry of a scene
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Acquisition {
    pub solar_zenith_deg: f64,
    pub solar_azimuth_deg: f64,
    pub day_of_year: u16,
    /// Explicit earth-sun distance in AU, overriding the day-of-year model
    #[serde(default)]
    pub earth_sun_distance: Option<f64>,
}

impl Acquisition {
    pub fn new(solar_zenith_deg: f64, solar_azimuth_deg: f64, day_of_year: u16) -> Self {
        Self {
            solar_zenith_deg,
            solar_azimuth_deg,
            day_of_year,
            earth_sun_distance: None,
        }
    }

    /// Earth-sun distance in astronomical units
    pub fn earth_sun_distance(&self) -> f64 {
        self.earth_sun_distance.unwrap_or_else(|| {
            let angle = (0.9856 * (self.day_of_year as f64 - 4.0)).to_radians();
            1.0 - 0.016728 * angle.cos()
        })
    }

    pub fn cos_solar_zenith(&self) -> f64 {
        self.solar_zenith_deg.to_radians().cos()
    }
}

/// One band of an image
#[derive(Debug, Clone)]
pub struct Band {
    raster: Raster<f64>,
    data_type: DataType,
    tag: String,
    calibration: Option<BandCalibration>,
}

impl Band {
    pub fn new(tag: impl Into<String>, raster: Raster<f64>, data_type: DataType) -> Self {
        Self {
            raster,
            data_type,
            tag: tag.into(),
            calibration: None,
        }
    }

    /// Band from a typed raster; the declared data type follows `T`
    pub fn from_raster<T: RasterElement>(tag: impl Into<String>, raster: &Raster<T>) -> Self {
        let data = raster.data().mapv(|v| v.to_f64().unwrap_or(f64::NAN));
        let nodata = raster.nodata().and_then(|nd| nd.to_f64());
        let mut converted = Raster::from_array(data);
        converted.set_transform(*raster.transform());
        converted.set_crs(raster.crs().cloned());
        converted.set_nodata(nodata);
        Self::new(tag, converted, T::DATA_TYPE)
    }

    pub fn with_calibration(mut self, calibration: BandCalibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.tag = tag.into();
    }

    pub fn raster(&self) -> &Raster<f64> {
        &self.raster
    }

    pub fn raster_mut(&mut self) -> &mut Raster<f64> {
        &mut self.raster
    }

    pub fn into_raster(self) -> Raster<f64> {
        self.raster
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn calibration(&self) -> Option<&BandCalibration> {
        self.calibration.as_ref()
    }

    pub fn set_calibration(&mut self, calibration: Option<BandCalibration>) {
        self.calibration = calibration;
    }

    pub fn nodata(&self) -> Option<f64> {
        self.raster.nodata()
    }

    /// Whether `value` counts as data in this band
    pub fn is_valid(&self, value: f64) -> bool {
        !self.raster.is_nodata(value)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.raster.shape()
    }
}

/// One entry of a band selection: a tag or a 0-based index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BandRef {
    Index(usize),
    Tag(String),
}

impl fmt::Display for BandRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BandRef::Index(i) => write!(f, "#{}", i),
            BandRef::Tag(t) => f.write_str(t),
        }
    }
}

impl From<&str> for BandRef {
    fn from(tag: &str) -> Self {
        BandRef::Tag(tag.to_string())
    }
}

impl From<usize> for BandRef {
    fn from(index: usize) -> Self {
        BandRef::Index(index)
    }
}

/// Ordered band selection. An empty selection means every band.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BandSelector(Vec<BandRef>);

impl BandSelector {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn tags(tags: &[&str]) -> Self {
        Self(tags.iter().map(|&t| BandRef::from(t)).collect())
    }

    pub fn indices(indices: &[usize]) -> Self {
        Self(indices.iter().map(|&i| BandRef::Index(i)).collect())
    }

    pub fn entries(&self) -> &[BandRef] {
        &self.0
    }

    pub fn is_all(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<BandRef>> for BandSelector {
    fn from(entries: Vec<BandRef>) -> Self {
        Self(entries)
    }
}

/// A multi-band image on a single pixel grid
#[derive(Debug, Clone)]
pub struct Image {
    name: String,
    rows: usize,
    cols: usize,
    transform: GeoTransform,
    crs: Option<CRS>,
    bands: Vec<Band>,
    metadata: BTreeMap<String, String>,
    acquisition: Option<Acquisition>,
    tag_index: HashMap<String, usize>,
}

impl Image {
    /// Empty image on a `rows x cols` grid
    pub fn new(
        name: impl Into<String>,
        rows: usize,
        cols: usize,
        transform: GeoTransform,
        crs: Option<CRS>,
    ) -> Self {
        Self {
            name: name.into(),
            rows,
            cols,
            transform,
            crs,
            bands: Vec::new(),
            metadata: BTreeMap::new(),
            acquisition: None,
            tag_index: HashMap::new(),
        }
    }

    /// Image whose grid and georeferencing are taken from the first band
    pub fn from_bands(name: impl Into<String>, bands: Vec<Band>) -> Result<Self> {
        let first = bands.first().ok_or(Error::InvalidDimensions { width: 0, height: 0 })?;
        let (rows, cols) = first.shape();
        let mut image = Self::new(
            name,
            rows,
            cols,
            *first.raster().transform(),
            first.raster().crs().cloned(),
        );
        for band in bands {
            image.push_band(band)?;
        }
        Ok(image)
    }

    /// Empty image on the same grid, carrying georeferencing and acquisition
    pub fn empty_like(&self, name: impl Into<String>) -> Self {
        let mut image = Self::new(name, self.rows, self.cols, self.transform, self.crs.clone());
        image.acquisition = self.acquisition;
        image
    }

    /// Append a band. Its georeferencing is replaced by the image's.
    pub fn push_band(&mut self, mut band: Band) -> Result<()> {
        let (rows, cols) = band.shape();
        if (rows, cols) != (self.rows, self.cols) {
            return Err(Error::SizeMismatch {
                er: self.rows,
                ec: self.cols,
                ar: rows,
                ac: cols,
            });
        }
        band.raster.set_transform(self.transform);
        band.raster.set_crs(self.crs.clone());
        self.bands.push(band);
        self.rebuild_tag_index();
        Ok(())
    }

    fn rebuild_tag_index(&mut self) {
        self.tag_index.clear();
        // first band wins when tags repeat
        for (i, band) in self.bands.iter().enumerate().rev() {
            self.tag_index.insert(band.tag.to_uppercase(), i);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Geographic bounds `(min_x, min_y, max_x, max_y)`
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols, self.rows)
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band(&self, index: usize) -> Option<&Band> {
        self.bands.get(index)
    }

    pub fn band_mut(&mut self, index: usize) -> Option<&mut Band> {
        self.bands.get_mut(index)
    }

    /// Index of the band carrying `tag` (case-insensitive)
    pub fn band_index(&self, tag: &str) -> Option<usize> {
        self.tag_index.get(&tag.to_uppercase()).copied()
    }

    pub fn band_by_tag(&self, tag: &str) -> Option<&Band> {
        self.band_index(tag).map(|i| &self.bands[i])
    }

    /// Band carrying `tag`, or [`Error::MissingBand`]
    pub fn require_band(&self, tag: &str) -> Result<&Band> {
        self.band_by_tag(tag).ok_or_else(|| Error::MissingBand {
            tag: tag.to_string(),
            image: self.name.clone(),
        })
    }

    pub fn has_band(&self, tag: &str) -> bool {
        self.band_index(tag).is_some()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.bands.iter().map(|b| b.tag())
    }

    /// Resolve one band reference to a band index
    pub fn resolve(&self, band: &BandRef) -> Result<usize> {
        let found = match band {
            BandRef::Index(i) => (*i < self.bands.len()).then_some(*i),
            BandRef::Tag(t) => self.band_index(t),
        };
        found.ok_or_else(|| Error::InvalidBandSelector {
            selector: band.to_string(),
            image: self.name.clone(),
        })
    }

    /// Resolve a selector to band indices, in selector order
    pub fn select(&self, selector: &BandSelector) -> Result<Vec<usize>> {
        if selector.is_all() {
            return Ok((0..self.bands.len()).collect());
        }
        selector.entries().iter().map(|b| self.resolve(b)).collect()
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn acquisition(&self) -> Option<&Acquisition> {
        self.acquisition.as_ref()
    }

    pub fn set_acquisition(&mut self, acquisition: Option<Acquisition>) {
        self.acquisition = acquisition;
    }
}
