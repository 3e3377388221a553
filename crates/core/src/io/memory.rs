//! In-memory raster store

use super::{apply_window, ImageSpec, RasterStore};
use crate::error::{Error, Result};
use crate::image::Image;
use ndarray::ArrayView2;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Store keeping images in a map keyed by path
#[derive(Debug, Default)]
pub struct MemoryStore {
    images: Mutex<HashMap<PathBuf, Image>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image under `path`
    pub fn insert(&self, path: impl Into<PathBuf>, image: Image) -> Result<()> {
        self.lock()?.insert(path.into(), image);
        Ok(())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().is_ok_and(|images| images.contains_key(path))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|images| images.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<PathBuf, Image>>> {
        self.images
            .lock()
            .map_err(|_| Error::Other("memory store lock poisoned".into()))
    }
}

fn not_found(path: &Path) -> Error {
    Error::NotFound(path.display().to_string())
}

impl RasterStore for MemoryStore {
    fn open(&self, path: &Path) -> Result<Image> {
        self.lock()?.get(path).cloned().ok_or_else(|| not_found(path))
    }

    fn create(&self, path: &Path, spec: &ImageSpec) -> Result<()> {
        let image = spec.blank_image()?;
        self.lock()?.insert(path.to_path_buf(), image);
        Ok(())
    }

    fn write_window(
        &self,
        path: &Path,
        band: usize,
        row: usize,
        col: usize,
        data: ArrayView2<'_, f64>,
    ) -> Result<()> {
        let mut images = self.lock()?;
        let image = images.get_mut(path).ok_or_else(|| not_found(path))?;
        apply_window(image, band, row, col, data)
    }

    fn set_metadata(&self, path: &Path, key: &str, value: &str) -> Result<()> {
        let mut images = self.lock()?;
        let image = images.get_mut(path).ok_or_else(|| not_found(path))?;
        image.set_metadata(key, value);
        Ok(())
    }

    fn save(&self, path: &Path, image: &Image) -> Result<()> {
        self.insert(path, image.clone())
    }
}
