//! Unsupervised classification
//!
//! - **K-means**: deterministic multi-band clustering with empty-cluster reseeding

mod kmeans;

pub use kmeans::{kmeans, Kmeans, KmeansParams, KmeansResult, Termination, CLASS_NODATA};
