//! # Orbis Core
//!
//! Core types, traits and storage for the Orbis remote-sensing engine.
//!
//! This crate provides:
//! - `Raster<T>`: generic single-band grid type
//! - `Image` / `Band`: multi-band imagery with semantic band tags,
//!   calibration and acquisition metadata
//! - `GeoTransform` and `CRS` georeferencing, passed through untouched
//! - `Footprint`: vector containment predicate used by mosaicking
//! - `RasterStore`: the storage seam, with in-memory and GeoTIFF backends
//! - Algorithm trait for a consistent API

pub mod crs;
pub mod error;
pub mod footprint;
pub mod image;
pub mod io;
pub mod raster;

pub use crs::CRS;
pub use error::{Error, Result};
pub use footprint::Footprint;
pub use image::{Acquisition, Band, BandCalibration, BandRef, BandSelector, Image};
pub use io::{BandSpec, GeoTiffStore, ImageSpec, MemoryStore, RasterStore};
pub use raster::{DataType, GeoTransform, Neighborhood, Raster, RasterElement, FLOAT_NODATA};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::footprint::Footprint;
    pub use crate::image::{Acquisition, Band, BandCalibration, BandRef, BandSelector, Image};
    pub use crate::io::{BandSpec, GeoTiffStore, ImageSpec, MemoryStore, RasterStore};
    pub use crate::raster::{DataType, GeoTransform, Raster, RasterElement, FLOAT_NODATA};
    pub use crate::Algorithm;
}

/// Core trait for all algorithms in Orbis.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(
        &self,
        input: Self::Input,
        params: Self::Params,
    ) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(
        &self,
        input: Self::Input,
    ) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
