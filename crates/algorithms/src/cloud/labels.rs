//! Per-pixel cloud classification state

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Classification state of one pixel.
///
/// States carry a certainty rank and a pixel only ever moves to a state of
/// strictly higher rank: nodata is final, verdicts (clear, cloud, shadow,
/// snow, water) are never revised, and a cloud candidate is resolved at
/// most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloudClass {
    NoData,
    Unclassified,
    CloudCandidate,
    Clear,
    Cloud,
    Shadow,
    Snow,
    Water,
}

impl CloudClass {
    pub fn rank(self) -> u8 {
        match self {
            CloudClass::Unclassified => 0,
            CloudClass::CloudCandidate => 1,
            CloudClass::Clear
            | CloudClass::Cloud
            | CloudClass::Shadow
            | CloudClass::Snow
            | CloudClass::Water => 2,
            CloudClass::NoData => 3,
        }
    }

    pub fn can_become(self, next: CloudClass) -> bool {
        next.rank() > self.rank()
    }

    /// Persisted code of a final state.
    ///
    /// Unresolved states are reported as clear.
    pub fn code(self) -> u8 {
        match self {
            CloudClass::NoData => 0,
            CloudClass::Clear | CloudClass::Unclassified | CloudClass::CloudCandidate => 1,
            CloudClass::Cloud => 2,
            CloudClass::Shadow => 3,
            CloudClass::Snow => 4,
            CloudClass::Water => 5,
        }
    }

    pub fn is_final(self) -> bool {
        self.rank() >= 2
    }
}

/// Label grid of a scene
#[derive(Debug, Clone)]
pub struct LabelGrid {
    labels: Array2<CloudClass>,
}

impl LabelGrid {
    pub fn from_array(labels: Array2<CloudClass>) -> Self {
        Self { labels }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.labels.dim()
    }

    pub fn get(&self, row: usize, col: usize) -> CloudClass {
        self.labels[[row, col]]
    }

    /// Move a pixel to `next` if that raises its rank; returns whether it moved
    pub fn promote(&mut self, row: usize, col: usize, next: CloudClass) -> bool {
        let cell = &mut self.labels[[row, col]];
        if cell.can_become(next) {
            *cell = next;
            true
        } else {
            false
        }
    }

    pub fn count(&self, class: CloudClass) -> usize {
        self.labels.iter().filter(|&&c| c == class).count()
    }

    /// Pixels currently in `class`
    pub fn is(&self, class: CloudClass) -> Array2<bool> {
        self.labels.mapv(|c| c == class)
    }

    pub fn view(&self) -> ndarray::ArrayView2<'_, CloudClass> {
        self.labels.view()
    }

    /// Persisted codes as band values
    pub fn to_codes(&self) -> Array2<f64> {
        self.labels.mapv(|c| f64::from(c.code()))
    }
}
