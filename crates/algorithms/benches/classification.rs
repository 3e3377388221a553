//! Benchmarks for classification and mosaicking

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use orbis_algorithms::classification::{kmeans, KmeansParams};
use orbis_algorithms::mosaic::{cookie_cutter, CookieCutterParams};
use orbis_core::{Band, DataType, Footprint, GeoTransform, Image, MemoryStore, Raster};
use orbis_parallel::CancelToken;
use std::path::{Path, PathBuf};

fn create_image(size: usize, origin_x: f64, bands: usize) -> Image {
    let transform = GeoTransform::new(origin_x, size as f64, 1.0, -1.0);
    let mut image = Image::new("bench", size, size, transform, None);
    for b in 0..bands {
        let mut r = Raster::new(size, size);
        for row in 0..size {
            for col in 0..size {
                let v = ((row * 7 + col * 13 + b * 31) % 200) as f64;
                r.set(row, col, v).unwrap();
            }
        }
        image
            .push_band(Band::new(format!("B{}", b + 1), r, DataType::Float32))
            .unwrap();
    }
    image
}

fn bench_kmeans(c: &mut Criterion) {
    let mut group = c.benchmark_group("classification/kmeans");
    group.sample_size(20);
    for size in [128, 256, 512] {
        let image = create_image(size, 0.0, 3);
        let params = KmeansParams::default();
        let token = CancelToken::new();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| kmeans(black_box(&image), "classes", &params, &token).unwrap())
        });
    }
    group.finish();
}

fn bench_cookie_cutter(c: &mut Criterion) {
    let mut group = c.benchmark_group("mosaic/cookie_cutter");
    group.sample_size(20);
    for size in [128, 256, 512] {
        let store = MemoryStore::new();
        let sources: Vec<PathBuf> = (0..2)
            .map(|i| {
                let path = PathBuf::from(format!("source_{}.tif", i));
                let origin = i as f64 * size as f64 / 2.0;
                store.insert(path.clone(), create_image(size, origin, 3)).unwrap();
                path
            })
            .collect();
        let footprint = Footprint::from_bounds(0.0, 0.0, size as f64 * 1.5, size as f64);
        let params = CookieCutterParams::default();
        let token = CancelToken::new();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let sources = black_box(&sources);
                let output = Path::new("mosaic.tif");
                cookie_cutter(&store, sources, &footprint, output, &params, &token).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_kmeans, bench_cookie_cutter);
criterion_main!(benches);
