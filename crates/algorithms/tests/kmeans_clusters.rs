//! K-means on two well separated noisy clusters

use orbis_algorithms::classification::{kmeans, Kmeans, KmeansParams, Termination};
use orbis_algorithms::RunStatus;
use orbis_core::{Algorithm, Band, BandSelector, DataType, GeoTransform, Image, Raster};
use orbis_parallel::CancelToken;

const ROWS: usize = 20;
const COLS: usize = 10;

/// Top half near (0, 0), bottom half near (100, 100), noise within ±3
fn two_clusters() -> Image {
    let mut a = Raster::new(ROWS, COLS);
    let mut b = Raster::new(ROWS, COLS);
    for row in 0..ROWS {
        for col in 0..COLS {
            let i = row * COLS + col;
            let centre = if row < ROWS / 2 { 0.0 } else { 100.0 };
            a.set(row, col, centre + ((i * 37) % 13) as f64 * 0.5 - 3.0).unwrap();
            b.set(row, col, centre + ((i * 17) % 11) as f64 * 0.6 - 3.0).unwrap();
        }
    }
    let mut image = Image::new("clusters", ROWS, COLS, GeoTransform::default(), None);
    image.push_band(Band::new("A", a, DataType::Float32)).unwrap();
    image.push_band(Band::new("B", b, DataType::Float32)).unwrap();
    image
}

#[test]
fn converges_on_two_clusters() {
    let params = KmeansParams {
        classes: 2,
        ..Default::default()
    };
    let out = kmeans(&two_clusters(), "classes", &params, &CancelToken::new()).unwrap();
    assert_eq!(out.status, RunStatus::Complete);
    let result = out.output;
    assert_eq!(result.termination, Termination::Converged);
    assert!(result.iterations <= params.iterations);

    for (centroid, target) in result.centroids.iter().zip([0.0, 100.0]) {
        for v in centroid {
            assert!((v - target).abs() < 5.0, "centroid {:?} not near {}", centroid, target);
        }
    }

    let classes = result.image.band_by_tag("CLASS").unwrap().raster();
    for row in 0..ROWS {
        for col in 0..COLS {
            let expected = if row < ROWS / 2 { 0.0 } else { 1.0 };
            assert_eq!(classes.get(row, col).unwrap(), expected, "pixel ({}, {})", row, col);
        }
    }
}

#[test]
fn band_selection_and_determinism() {
    let image = two_clusters();
    let params = KmeansParams {
        classes: 2,
        bands: BandSelector::tags(&["B"]),
        ..Default::default()
    };
    let first = Kmeans.execute(image.clone(), params.clone()).unwrap().output;
    let second = Kmeans.execute(image, params).unwrap().output;
    assert_eq!(first.centroids.len(), 2);
    assert_eq!(first.centroids[0].len(), 1);
    assert_eq!(first.centroids, second.centroids);
    assert_eq!(
        first.image.band(0).unwrap().raster().data(),
        second.image.band(0).unwrap().raster().data()
    );
    assert_eq!(first.image.name(), "clusters_kmeans");
}
