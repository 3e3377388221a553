//! # Orbis Algorithms
//!
//! Raster algorithms for multi-band remote-sensing imagery.
//!
//! ## Available Algorithm Categories
//!
//! - **mask**: Per-pixel validity masks from band nodata
//! - **radiometry**: Digital numbers to radiance, reflectance and brightness temperature
//! - **imagery**: Spectral indices, probability rescaling, RGB stretch, tasseled cap, QA bits
//! - **cloud**: Fmask and AutoCloud cloud/shadow/snow/water masks
//! - **mosaic**: Footprint-clipped mosaics (CookieCutter)
//! - **classification**: K-means clustering
//!
//! Algorithms that iterate or write block by block return an [`Outcome`]
//! whose [`RunStatus`] reports non-convergence or cancellation.

pub mod classification;
pub mod cloud;
pub mod config;
pub mod imagery;
pub mod mask;
mod maybe_rayon;
pub mod mosaic;
pub mod outcome;
mod pixel;
pub mod radiometry;
pub mod sensor;

pub use config::EngineConfig;
pub use outcome::{Outcome, RunStatus};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{kmeans, Kmeans, KmeansParams, KmeansResult, Termination};
    pub use crate::cloud::{
        auto_cloud, fmask, AutoCloud, AutoCloudParams, CloudClass, Fmask, FmaskParams,
    };
    pub use crate::config::EngineConfig;
    pub use crate::imagery::{
        evi, index_to_probability, indices, lswi, ndsi, ndvi, rgb, satvi, tasseled_cap,
        IndexToProbability, Indices, IndicesParams, Ndvi, ProbabilityParams, Rgb, RgbParams,
        SpectralIndex,
    };
    pub use crate::mask::{create_mask, Mask};
    pub use crate::mosaic::{cookie_cutter, CookieCutter, CookieCutterParams, MosaicRequest};
    pub use crate::outcome::{Outcome, RunStatus};
    pub use crate::radiometry::{radiance, reflectance, Rad, Ref, ReflectanceParams};
    pub use crate::sensor::Sensor;
    pub use orbis_core::prelude::*;
    pub use orbis_parallel::CancelToken;
}
