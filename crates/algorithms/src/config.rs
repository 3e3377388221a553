//! Engine-wide parameter set
//!
//! Collects the parameters of every algorithm so a processing chain can be
//! configured from a single JSON document. Sections and keys that are absent
//! take their defaults.

use crate::classification::KmeansParams;
use crate::cloud::{AutoCloudParams, FmaskParams};
use crate::imagery::{IndicesParams, ProbabilityParams, RgbParams};
use crate::mosaic::CookieCutterParams;
use crate::radiometry::ReflectanceParams;
use orbis_core::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub reflectance: ReflectanceParams,
    pub indices: IndicesParams,
    pub probability: ProbabilityParams,
    pub fmask: FmaskParams,
    pub autocloud: AutoCloudParams,
    pub cookie_cutter: CookieCutterParams,
    pub kmeans: KmeansParams,
    pub rgb: RgbParams,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbis_core::{BandRef, Error};
    use std::io::Write;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config.autocloud.max_iterations, 4000);
        assert_eq!(config.autocloud.min_cloud_size, 20);
        assert_eq!(config.kmeans.classes, 5);
        assert_eq!(config.kmeans.iterations, 5);
        assert_eq!(config.cookie_cutter.resolution_x, 1.0);
        assert_eq!(config.fmask.dilation, 5);
        assert!(config.indices.mask.is_all());
        assert!(config.probability.mask.is_all());
    }

    #[test]
    fn test_partial_sections() {
        let config = EngineConfig::from_json_str(
            r#"{
                "kmeans": {"classes": 3, "bands": ["NIR", "RED"]},
                "autocloud": {"cloud_probability": 0.4, "thresholds": {"whiteness": 0.5}},
                "indices": {"evi": false, "mask": ["RED", 3]},
                "probability": {"band": "NDVI", "mask": ["NDVI"]}
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.indices.mask.entries(),
            &[BandRef::Tag("RED".into()), BandRef::Index(3)]
        );
        assert_eq!(config.probability.band, BandRef::Tag("NDVI".into()));
        assert_eq!(config.probability.mask.entries(), &[BandRef::Tag("NDVI".into())]);
        assert_eq!(config.kmeans.classes, 3);
        assert_eq!(config.kmeans.iterations, 5);
        assert_eq!(config.autocloud.cloud_probability, 0.4);
        assert_eq!(config.autocloud.thresholds.whiteness, 0.5);
        assert_eq!(config.autocloud.thresholds.hot_offset, 0.08);
        assert!(!config.indices.evi);
        assert!(config.indices.ndvi);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(EngineConfig::from_json_str("{"), Err(Error::Json(_))));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"kmeans": {"classes": "five"}}"#),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_from_file_round_trip() {
        let mut config = EngineConfig::default();
        config.kmeans.threshold = 0.25;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_json_string().unwrap().as_bytes()).unwrap();

        let loaded = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.kmeans, config.kmeans);
        assert!(matches!(EngineConfig::from_file("/nonexistent/orbis.json"), Err(Error::Io(_))));
    }
}
