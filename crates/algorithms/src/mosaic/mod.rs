//! Mosaicking of overlapping images

mod cookie_cutter;

pub use cookie_cutter::{cookie_cutter, CookieCutter, CookieCutterParams, MosaicRequest};
