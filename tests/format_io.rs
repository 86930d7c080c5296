//! On-disk format validation and mid-query failure recovery

mod common;

use std::fs;

use gaia_catalog::format::{self, CatalogHeader};
use gaia_catalog::{
    healpix, CatalogError, CatalogSource, ConeParams, MultifileCatalog, MultifileOptions,
};

#[test]
fn open_validates_and_reads_back_the_fixture() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = common::random_records(500, 1, 1);
    common::write_catalog(dir.path(), &mut records, 64);

    let catalog = MultifileCatalog::open(dir.path(), MultifileOptions::default()).unwrap();
    let header = catalog.header();
    assert_eq!(header.total_stars, 500);
    assert_eq!(header.total_chunks, 8);
    assert_eq!(header.healpix_nside, healpix::NSIDE);
    assert_eq!(header.source_catalog, "Gaia DR3");
}

#[test]
fn missing_directory_is_init_failed() {
    let r = MultifileCatalog::open("/nonexistent/catalog/dir", MultifileOptions::default());
    assert!(matches!(r, Err(CatalogError::InitFailed { .. })));
}

#[test]
fn missing_metadata_is_init_failed() {
    let dir = tempfile::tempdir().unwrap();
    let r = MultifileCatalog::open(dir.path(), MultifileOptions::default());
    assert!(matches!(r, Err(CatalogError::InitFailed { .. })));
}

#[test]
fn corrupt_magic_is_corrupt_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = common::random_records(300, 2, 1);
    common::write_catalog(dir.path(), &mut records, 64);

    let metadata = format::metadata_path(dir.path());
    let mut bytes = fs::read(&metadata).unwrap();
    bytes[0] = b'X';
    fs::write(&metadata, bytes).unwrap();

    let r = MultifileCatalog::open(dir.path(), MultifileOptions::default());
    assert!(matches!(r, Err(CatalogError::CorruptCatalog { .. })));
}

#[test]
fn truncated_index_is_corrupt_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = common::random_records(300, 3, 1);
    common::write_catalog(dir.path(), &mut records, 64);

    let metadata = format::metadata_path(dir.path());
    let bytes = fs::read(&metadata).unwrap();
    fs::write(&metadata, &bytes[..bytes.len() - 7]).unwrap();

    let r = MultifileCatalog::open(dir.path(), MultifileOptions::default());
    assert!(matches!(r, Err(CatalogError::CorruptCatalog { .. })));
}

#[test]
fn inconsistent_chunk_total_is_corrupt_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = common::random_records(300, 4, 1);
    common::write_catalog(dir.path(), &mut records, 64);

    let metadata = format::metadata_path(dir.path());
    let bytes = fs::read(&metadata).unwrap();
    let mut header = CatalogHeader::read_from(&mut bytes.as_slice()).unwrap();
    header.total_chunks += 1;
    let mut patched = Vec::new();
    header.write_to(&mut patched).unwrap();
    patched.extend_from_slice(&bytes[format::HEADER_SIZE..]);
    fs::write(&metadata, patched).unwrap();

    let r = MultifileCatalog::open(dir.path(), MultifileOptions::default());
    assert!(matches!(r, Err(CatalogError::CorruptCatalog { .. })));
}

#[test]
fn record_pixel_mismatch_surfaces_as_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = common::clustered_records(200, 5, 1, 50.0, 0.0, 2.0);
    // One record lies about its pixel
    records[50].healpix_pixel = (records[50].healpix_pixel + 9) % healpix::NPIX;
    common::write_catalog(dir.path(), &mut records, 64);

    let catalog = MultifileCatalog::open(dir.path(), MultifileOptions::default()).unwrap();
    let r = catalog.query_cone(&ConeParams::new(50.0, 0.0, 5.0));
    assert!(matches!(r, Err(CatalogError::CorruptCatalog { .. })));
}

#[test]
fn unreadable_chunk_yields_partial_result() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = common::clustered_records(600, 6, 1, 50.0, 0.0, 3.0);
    common::write_catalog(dir.path(), &mut records, 64);

    // 600 records over ~10 chunks; drop one chunk file
    fs::remove_file(format::chunk_path(dir.path(), 4)).unwrap();

    let catalog = MultifileCatalog::open(dir.path(), MultifileOptions::default()).unwrap();
    let result = catalog.query_cone(&ConeParams::new(50.0, 0.0, 5.0)).unwrap();
    assert!(result.incomplete);
    assert!(!result.failed_pixels.is_empty());
    // The rest of the sky still answered
    assert!(!result.stars.is_empty());
}

#[test]
fn wrong_nside_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = common::random_records(100, 8, 1);
    common::write_catalog(dir.path(), &mut records, 64);

    let metadata = format::metadata_path(dir.path());
    let bytes = fs::read(&metadata).unwrap();
    let mut header = CatalogHeader::read_from(&mut bytes.as_slice()).unwrap();
    header.healpix_nside = 128;
    let mut patched = Vec::new();
    header.write_to(&mut patched).unwrap();
    patched.extend_from_slice(&bytes[format::HEADER_SIZE..]);
    fs::write(&metadata, patched).unwrap();

    let r = MultifileCatalog::open(dir.path(), MultifileOptions::default());
    assert!(matches!(r, Err(CatalogError::CorruptCatalog { .. })));
}
