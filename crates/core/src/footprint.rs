//! Vector footprint used to cut mosaics

use geo::{BoundingRect, Contains, Intersects, MultiPolygon, Point, Polygon, Rect};

/// Area of interest for mosaicking.
///
/// Only two questions are ever asked of a footprint: whether a map point
/// lies inside it, and whether a rectangle overlaps it.
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    shape: MultiPolygon<f64>,
}

impl Footprint {
    pub fn new(shape: MultiPolygon<f64>) -> Self {
        Self { shape }
    }

    /// Axis-aligned rectangle footprint
    pub fn from_bounds(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        let rect = Rect::new((min_x, min_y), (max_x, max_y));
        Self::new(MultiPolygon::new(vec![rect.to_polygon()]))
    }

    pub fn shape(&self) -> &MultiPolygon<f64> {
        &self.shape
    }

    /// Whether the map point lies strictly inside the footprint
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.shape.contains(&Point::new(x, y))
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)`, `None` for an empty footprint
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        self.shape
            .bounding_rect()
            .map(|r| (r.min().x, r.min().y, r.max().x, r.max().y))
    }

    /// Whether the rectangle `(min_x, min_y, max_x, max_y)` overlaps the footprint
    pub fn intersects_bounds(&self, bounds: (f64, f64, f64, f64)) -> bool {
        let (min_x, min_y, max_x, max_y) = bounds;
        let rect = Rect::new((min_x, min_y), (max_x, max_y));
        rect.to_polygon().intersects(&self.shape)
    }
}

impl From<Polygon<f64>> for Footprint {
    fn from(polygon: Polygon<f64>) -> Self {
        Self::new(MultiPolygon::new(vec![polygon]))
    }
}

impl From<MultiPolygon<f64>> for Footprint {
    fn from(shape: MultiPolygon<f64>) -> Self {
        Self::new(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, LineString};

    #[test]
    fn test_rectangle_footprint() {
        let fp = Footprint::from_bounds(0.0, 0.0, 10.0, 5.0);
        assert!(fp.contains(5.0, 2.5));
        assert!(!fp.contains(11.0, 2.5));
        assert_eq!(fp.bounds(), Some((0.0, 0.0, 10.0, 5.0)));
    }

    #[test]
    fn test_triangle_containment() {
        let fp = Footprint::from(polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 0.0, y: 10.0)]);
        assert!(fp.contains(1.0, 1.0));
        assert!(!fp.contains(9.0, 9.0));
    }

    #[test]
    fn test_intersects_bounds() {
        let fp = Footprint::from_bounds(0.0, 0.0, 10.0, 10.0);
        assert!(fp.intersects_bounds((5.0, 5.0, 20.0, 20.0)));
        assert!(!fp.intersects_bounds((20.0, 20.0, 30.0, 30.0)));
    }

    #[test]
    fn test_empty_footprint_has_no_bounds() {
        let empty = Polygon::new(LineString::new(vec![]), vec![]);
        let fp = Footprint::new(MultiPolygon::new(vec![empty]));
        assert!(fp.bounds().is_none());
    }
}
