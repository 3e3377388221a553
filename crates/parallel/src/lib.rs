//! # Orbis Parallel
//!
//! Execution support for Orbis algorithms.
//!
//! This crate provides:
//! - Row-block tiling with cancellation checks between blocks
//! - Row-parallel processing using Rayon (`parallel` feature, on by default)
//! - A shared cancellation token

pub mod cancel;
pub mod strategy;
pub mod tiled;

pub use cancel::CancelToken;
pub use strategy::{ParallelStrategy, ProcessingMode};
pub use tiled::{BlockRun, Tile, TileIterator, TiledProcessor};
