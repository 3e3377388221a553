//! CookieCutter against GeoTIFF files on disk

use orbis_algorithms::mosaic::{cookie_cutter, CookieCutter, CookieCutterParams, MosaicRequest};
use orbis_algorithms::RunStatus;
use orbis_core::{
    Algorithm, Band, BandCalibration, DataType, Footprint, GeoTiffStore, GeoTransform, Image,
    Raster, RasterStore, CRS,
};
use orbis_parallel::CancelToken;
use std::sync::Arc;

fn source(name: &str, origin_x: f64, value: f64) -> Image {
    let mut image = Image::new(
        name,
        10,
        10,
        GeoTransform::new(origin_x, 10.0, 1.0, -1.0),
        Some(CRS::from_epsg(32719)),
    );
    for (b, tag) in ["RED", "NIR"].iter().enumerate() {
        let mut r = Raster::filled(10, 10, value + b as f64);
        r.set_nodata(Some(-9999.0));
        let band = Band::new(*tag, r, DataType::Float32)
            .with_calibration(BandCalibration::new(0.5, 1.0));
        image.push_band(band).unwrap();
    }
    image.set_metadata("sensor", "test");
    image
}

#[test]
fn geotiff_round_trip_keeps_tags_and_georeferencing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scene.tif");
    let store = GeoTiffStore::new();
    let original = source("scene", 300.0, 4.0);
    store.save(&path, &original).unwrap();

    let loaded = store.open(&path).unwrap();
    assert_eq!(loaded.name(), "scene");
    assert_eq!(loaded.shape(), (10, 10));
    assert_eq!(loaded.tags().collect::<Vec<_>>(), vec!["RED", "NIR"]);
    assert_eq!(loaded.transform(), original.transform());
    assert_eq!(loaded.crs().and_then(|c| c.epsg()), Some(32719));
    assert_eq!(loaded.metadata().get("sensor").map(String::as_str), Some("test"));
    let nir = loaded.band_by_tag("NIR").unwrap();
    assert_eq!(nir.nodata(), Some(-9999.0));
    assert_eq!(nir.calibration().map(|c| c.gain), Some(0.5));
    assert_eq!(nir.raster().get(9, 9).unwrap(), 5.0);
}

#[test]
fn overlap_strip_comes_from_first_source() {
    let dir = tempfile::tempdir().unwrap();
    let store = GeoTiffStore::new();
    let a = dir.path().join("a.tif");
    let b = dir.path().join("b.tif");
    store.save(&a, &source("a", 0.0, 1.0)).unwrap();
    store.save(&b, &source("b", 5.0, 20.0)).unwrap();

    let output = dir.path().join("mosaic.tif");
    let footprint = Footprint::from_bounds(0.0, 0.0, 15.0, 10.0);
    let params = CookieCutterParams {
        block_rows: 3,
        ..Default::default()
    };
    let token = CancelToken::new();
    let out = cookie_cutter(&store, &[a, b], &footprint, &output, &params, &token).unwrap();
    assert_eq!(out.status, RunStatus::Complete);

    let mosaic = store.open(&output).unwrap();
    assert_eq!(mosaic.shape(), (10, 15));
    let red = mosaic.band_by_tag("RED").unwrap().raster();
    let nir = mosaic.band_by_tag("NIR").unwrap().raster();
    for row in 0..10 {
        assert_eq!(red.get(row, 0).unwrap(), 1.0);
        // overlap strip, x in [5, 10)
        assert_eq!(red.get(row, 6).unwrap(), 1.0);
        assert_eq!(nir.get(row, 9).unwrap(), 2.0);
        assert_eq!(red.get(row, 10).unwrap(), 20.0);
        assert_eq!(nir.get(row, 14).unwrap(), 21.0);
    }
    assert_eq!(mosaic.metadata().get("sources").map(String::as_str), Some("2"));
}

#[test]
fn algorithm_entry_point_with_partial_footprint() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn RasterStore> = Arc::new(GeoTiffStore::new());
    let a = dir.path().join("a.tif");
    store.save(&a, &source("a", 0.0, 3.0)).unwrap();

    // footprint hangs off the right edge of the only source
    let request = MosaicRequest {
        store: store.clone(),
        sources: vec![a],
        footprint: Footprint::from_bounds(6.0, 0.0, 14.0, 10.0),
        output: dir.path().join("cut.tif"),
        cancel: CancelToken::new(),
    };
    let out = CookieCutter.execute_default(request).unwrap();
    let red = out.output.band_by_tag("RED").unwrap().raster();
    assert_eq!(out.output.shape(), (10, 8));
    assert_eq!(red.get(0, 0).unwrap(), 3.0);
    assert_eq!(red.get(0, 3).unwrap(), 3.0);
    assert_eq!(red.get(0, 4).unwrap(), -9999.0);
    assert!(store.open(&dir.path().join("cut.tif")).is_ok());
}
