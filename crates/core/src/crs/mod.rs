//! Coordinate reference system tags
//!
//! The engine never reprojects. A CRS is an opaque tag carried from inputs
//! to outputs and compared when several images must share a grid.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CRS {
    Epsg(u32),
    Wkt(String),
    Proj(String),
}

impl CRS {
    pub fn from_epsg(code: u32) -> Self {
        CRS::Epsg(code)
    }

    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        CRS::Wkt(wkt.into())
    }

    pub fn from_proj(proj: impl Into<String>) -> Self {
        CRS::Proj(proj.into())
    }

    /// EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        match self {
            CRS::Epsg(code) => Some(*code),
            _ => None,
        }
    }

    /// Whether two tags denote the same system.
    ///
    /// Tags of different kinds never compare equal: without a projection
    /// library an EPSG code cannot be matched against WKT.
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        match (self, other) {
            (CRS::Wkt(a), CRS::Wkt(b)) | (CRS::Proj(a), CRS::Proj(b)) => {
                a.split_whitespace().eq(b.split_whitespace())
            }
            _ => self == other,
        }
    }

    /// Short string identifier
    pub fn identifier(&self) -> String {
        match self {
            CRS::Epsg(code) => format!("EPSG:{}", code),
            CRS::Proj(proj) => proj.clone(),
            CRS::Wkt(wkt) => format!("WKT:{}", wkt.chars().take(50).collect::<String>()),
        }
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}
