//! Landsat sensor constants
//!
//! Band tags, exoatmospheric irradiance (W / m² / sr / µm), thermal
//! calibration constants and tasseled cap coefficients for the TM, ETM+ and
//! OLI/TIRS instruments.

use orbis_core::BandCalibration;
use serde::{Deserialize, Serialize};

/// Supported sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    /// Landsat 5 Thematic Mapper
    Landsat5,
    /// Landsat 7 Enhanced Thematic Mapper Plus
    Landsat7,
    /// Landsat 8 Operational Land Imager / Thermal Infrared Sensor
    Landsat8,
}

/// Per-band constants of a sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandConstants {
    pub tag: &'static str,
    pub esun: Option<f64>,
    pub k1: Option<f64>,
    pub k2: Option<f64>,
}

const fn reflective(tag: &'static str, esun: f64) -> BandConstants {
    BandConstants {
        tag,
        esun: Some(esun),
        k1: None,
        k2: None,
    }
}

const fn thermal(tag: &'static str, k1: f64, k2: f64) -> BandConstants {
    BandConstants {
        tag,
        esun: None,
        k1: Some(k1),
        k2: Some(k2),
    }
}

const LANDSAT5: [BandConstants; 7] = [
    reflective("BLUE", 1983.0),
    reflective("GREEN", 1796.0),
    reflective("RED", 1536.0),
    reflective("NIR", 1031.0),
    reflective("SWIR1", 220.0),
    thermal("LWIR", 607.76, 1260.56),
    reflective("SWIR2", 83.44),
];

const LANDSAT7: [BandConstants; 7] = [
    reflective("BLUE", 1997.0),
    reflective("GREEN", 1812.0),
    reflective("RED", 1533.0),
    reflective("NIR", 1039.0),
    reflective("SWIR1", 230.8),
    thermal("LWIR", 666.09, 1282.71),
    reflective("SWIR2", 84.90),
];

const LANDSAT8: [BandConstants; 10] = [
    reflective("COASTAL", 2638.35),
    reflective("BLUE", 2031.08),
    reflective("GREEN", 1821.09),
    reflective("RED", 2075.48),
    reflective("NIR", 1272.96),
    reflective("SWIR1", 246.94),
    reflective("SWIR2", 90.61),
    reflective("CIRRUS", 369.36),
    thermal("LWIR", 774.89, 1321.08),
    thermal("LWIR2", 480.89, 1201.14),
];

/// Tasseled cap coefficients of TM and ETM+ on BLUE..SWIR2
const TCAP_TM: [[f64; 6]; 6] = [
    [0.3561, 0.3972, 0.3904, 0.6966, 0.2286, 0.1596],
    [-0.3344, -0.3544, -0.4556, 0.6966, -0.0242, -0.2630],
    [0.2626, 0.2141, 0.0926, 0.0656, -0.7629, -0.5388],
    [0.0805, -0.0498, 0.1950, -0.1327, 0.5752, -0.7775],
    [-0.7252, -0.0202, 0.6683, 0.0631, -0.1494, -0.0274],
    [0.4000, -0.8172, 0.3832, 0.0602, -0.1095, 0.0985],
];

/// Tasseled cap coefficients of OLI on BLUE..SWIR2
const TCAP_OLI: [[f64; 6]; 6] = [
    [0.3029, 0.2786, 0.4733, 0.5599, 0.508, 0.1872],
    [-0.2941, -0.243, -0.5424, 0.7276, 0.0713, -0.1608],
    [0.1511, 0.1973, 0.3283, 0.3407, -0.7117, -0.4559],
    [-0.8239, 0.0849, 0.4396, -0.058, 0.2013, -0.2773],
    [-0.3294, 0.0557, 0.1056, 0.1855, -0.4349, 0.8085],
    [0.1079, -0.9023, 0.4119, 0.0575, -0.0259, 0.0252],
];

/// Input bands of the tasseled cap transform, in coefficient order
pub const TCAP_BANDS: [&str; 6] = ["BLUE", "GREEN", "RED", "NIR", "SWIR1", "SWIR2"];

/// Output band names of the tasseled cap transform
pub const TCAP_NAMES: [&str; 6] = ["Brightness", "Greenness", "Wetness", "TCT4", "TCT5", "TCT6"];

impl Sensor {
    pub fn description(&self) -> &'static str {
        match self {
            Sensor::Landsat5 => "Landsat 5",
            Sensor::Landsat7 => "Landsat 7",
            Sensor::Landsat8 => "Landsat 8",
        }
    }

    pub fn bands(&self) -> &'static [BandConstants] {
        match self {
            Sensor::Landsat5 => &LANDSAT5,
            Sensor::Landsat7 => &LANDSAT7,
            Sensor::Landsat8 => &LANDSAT8,
        }
    }

    /// Constants of the band carrying `tag` (case-insensitive)
    pub fn band(&self, tag: &str) -> Option<&'static BandConstants> {
        self.bands().iter().find(|b| b.tag.eq_ignore_ascii_case(tag))
    }

    /// Calibration for `tag` from the scene's gain and offset
    pub fn calibration(&self, tag: &str, gain: f64, offset: f64) -> Option<BandCalibration> {
        self.band(tag).map(|b| BandCalibration {
            gain,
            offset,
            esun: b.esun,
            k1: b.k1,
            k2: b.k2,
        })
    }

    pub fn tasseled_cap(&self) -> &'static [[f64; 6]; 6] {
        match self {
            Sensor::Landsat5 | Sensor::Landsat7 => &TCAP_TM,
            Sensor::Landsat8 => &TCAP_OLI,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_lookup() {
        let nir = Sensor::Landsat7.band("nir").unwrap();
        assert_eq!(nir.esun, Some(1039.0));
        assert!(Sensor::Landsat5.band("CIRRUS").is_none());
        assert!(Sensor::Landsat8.band("CIRRUS").is_some());
    }

    #[test]
    fn test_thermal_calibration() {
        let cal = Sensor::Landsat5.calibration("LWIR", 0.055, 1.18).unwrap();
        assert!(cal.is_thermal());
        assert_eq!(cal.thermal(), Some((607.76, 1260.56)));
    }

    #[test]
    fn test_tasseled_cap_tables() {
        assert_eq!(Sensor::Landsat5.tasseled_cap(), Sensor::Landsat7.tasseled_cap());
        assert_ne!(Sensor::Landsat5.tasseled_cap(), Sensor::Landsat8.tasseled_cap());
    }
}
