//! Corridor search: the asteroid-occultation query path

mod common;

use std::collections::BTreeSet;

use gaia_catalog::{
    angle, CatalogSource, CelestialPoint, CorridorParams, MultifileCatalog, MultifileOptions,
    StarRecord,
};

fn open(dir: &std::path::Path, max_cached_chunks: usize) -> MultifileCatalog {
    MultifileCatalog::open(
        dir,
        MultifileOptions {
            max_cached_chunks,
            ..MultifileOptions::default()
        },
    )
    .unwrap()
}

fn evenly_spaced_path(from: CelestialPoint, to: CelestialPoint, points: usize) -> Vec<CelestialPoint> {
    (0..points)
        .map(|i| {
            let f = i as f64 / (points - 1) as f64;
            CelestialPoint::new(
                from.ra + f * (to.ra - from.ra),
                from.dec + f * (to.dec - from.dec),
            )
        })
        .collect()
}

fn exhaustive_corridor(
    records: &[StarRecord],
    path: &[CelestialPoint],
    width: f64,
    max_mag: Option<f32>,
) -> BTreeSet<u64> {
    records
        .iter()
        .filter(|r| {
            max_mag.map_or(true, |hi| r.g_mag <= hi)
                && angle::corridor_contains(path, width, r.position())
        })
        .map(|r| r.source_id)
        .collect()
}

fn ids(stars: &[StarRecord]) -> BTreeSet<u64> {
    let ids: BTreeSet<u64> = stars.iter().map(|r| r.source_id).collect();
    assert_eq!(ids.len(), stars.len(), "duplicate source_id in result");
    ids
}

#[test]
fn corridor_matches_exhaustive_scan() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = common::random_records(2500, 42, 1);
    records.extend(common::clustered_records(600, 43, 10_000, 85.0, -2.5, 8.0));
    common::write_catalog(dir.path(), &mut records, 128);
    let catalog = open(dir.path(), 40);

    let straight = evenly_spaced_path(
        CelestialPoint::new(80.0, -5.0),
        CelestialPoint::new(90.0, 0.0),
        11,
    );
    // A 20-segment wavy track
    let wavy: Vec<CelestialPoint> = (0..21)
        .map(|i| {
            let f = i as f64 / 20.0;
            CelestialPoint::new(70.0 + 30.0 * f, -8.0 + 10.0 * f + 2.0 * (f * 12.0).sin())
        })
        .collect();

    for (path, width) in [
        (straight.clone(), 0.2),
        (straight, 1.0),
        (wavy.clone(), 0.5),
        (wavy, 5.0),
    ] {
        let params = CorridorParams::new(path.clone(), width);
        let result = catalog.query_corridor(&params).unwrap();
        assert!(!result.incomplete);
        assert_eq!(
            ids(&result.stars),
            exhaustive_corridor(&records, &path, width, None),
            "mismatch for width {width}"
        );
    }
}

#[test]
fn corridor_with_magnitude_and_cap() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = common::clustered_records(900, 17, 1, 85.0, -2.5, 7.0);
    common::write_catalog(dir.path(), &mut records, 100);
    let catalog = open(dir.path(), 30);

    let path = evenly_spaced_path(
        CelestialPoint::new(80.0, -5.0),
        CelestialPoint::new(90.0, 0.0),
        11,
    );
    let mut params = CorridorParams::new(path.clone(), 0.1);
    params.max_magnitude = Some(16.0);
    params.max_results = 1000;

    let result = catalog.query_corridor(&params).unwrap();
    assert!(result.stars.len() <= 1000);
    for r in &result.stars {
        assert!(r.g_mag <= 16.0);
        assert!(angle::corridor_contains(&path, 0.1, r.position()));
    }
}

#[test]
fn max_results_caps_the_stream() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = common::clustered_records(500, 29, 1, 130.0, 10.0, 1.5);
    common::write_catalog(dir.path(), &mut records, 64);
    let catalog = open(dir.path(), 10);

    let path = evenly_spaced_path(
        CelestialPoint::new(128.0, 10.0),
        CelestialPoint::new(132.0, 10.0),
        5,
    );
    let mut params = CorridorParams::new(path, 2.0);
    params.max_results = 5;
    let result = catalog.query_corridor(&params).unwrap();
    assert_eq!(result.stars.len(), 5);
}

#[test]
fn corridor_width_zero_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = common::random_records(100, 13, 1);
    common::write_catalog(dir.path(), &mut records, 64);
    let catalog = open(dir.path(), 10);

    let path = evenly_spaced_path(
        CelestialPoint::new(10.0, 0.0),
        CelestialPoint::new(20.0, 0.0),
        3,
    );
    assert!(catalog
        .query_corridor(&CorridorParams::new(path.clone(), 0.0))
        .is_err());
    assert!(catalog
        .query_corridor(&CorridorParams::new(path[..1].to_vec(), 1.0))
        .is_err());
}

#[test]
fn stats_reflect_one_corridor_query() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = common::clustered_records(700, 19, 1, 85.0, -2.5, 9.0);
    common::write_catalog(dir.path(), &mut records, 90);
    let catalog = open(dir.path(), 30);

    // A path roughly 15 degrees long
    let path = evenly_spaced_path(
        CelestialPoint::new(78.0, -6.0),
        CelestialPoint::new(92.0, 1.0),
        11,
    );
    let result = catalog
        .query_corridor(&CorridorParams::new(path.clone(), 0.5))
        .unwrap();

    let stats = catalog.statistics();
    assert_eq!(stats.total_queries, 1);
    assert!(stats.average_query_time_ms > 0.0);
    assert_eq!(stats.total_stars_returned, result.stars.len() as u64);
    // First pass over the chunks: every fetch was a miss
    assert_eq!(stats.cache_hit_rate, 0.0);

    // The identical query again now hits the cache for every chunk
    catalog
        .query_corridor(&CorridorParams::new(path, 0.5))
        .unwrap();
    let stats = catalog.statistics();
    assert_eq!(stats.total_queries, 2);
    assert!((stats.cache_hit_rate - 50.0).abs() < 1e-9);
    assert!(stats.memory_used_mb > 0.0);
}
