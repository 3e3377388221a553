//! Error types for Orbis

use thiserror::Error;

/// Main error type for Orbis operations.
///
/// Structural and precondition failures abort a call before any output is
/// created. Non-fatal run reports (non-convergence, cancellation) are not
/// errors; see `orbis_algorithms::RunStatus`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("CRS mismatch: {0} vs {1}")]
    CrsMismatch(String, String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Required band '{tag}' is not present in image '{image}'")]
    MissingBand { tag: String, image: String },

    #[error("Missing calibration for band '{band}': {what}")]
    MissingCalibration { band: String, what: String },

    #[error("Band selector '{selector}' does not match any band of image '{image}'")]
    InvalidBandSelector { selector: String, image: String },

    #[error("Invalid range: lo ({lo}) must be strictly less than hi ({hi})")]
    InvalidRange { lo: f64, hi: f64 },

    #[error("No source image intersects the footprint")]
    NoOverlap,

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Image '{0}' not found in store")]
    NotFound(String),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Metadata encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`]
    pub fn invalid_parameter(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for Orbis operations
pub type Result<T> = std::result::Result<T, Error>;
