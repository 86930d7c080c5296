//! Shared helpers: synthetic catalogs written through the format layer

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use gaia_catalog::format::{self, CatalogHeader, PixelIndex, PixelIndexEntry, HEADER_SIZE};
use gaia_catalog::{healpix, StarRecord};

/// A record at a position, with every field populated plausibly
pub fn record(source_id: u64, ra: f64, dec: f64, g_mag: f32) -> StarRecord {
    StarRecord {
        source_id,
        ra,
        dec,
        g_mag,
        bp_mag: g_mag + 0.3,
        rp_mag: g_mag - 0.2,
        g_mag_error: 0.003,
        bp_mag_error: 0.01,
        rp_mag_error: 0.01,
        bp_rp: 0.5,
        parallax: 2.5,
        parallax_error: 0.1,
        pmra: -3.1,
        pmdec: 1.7,
        pmra_error: 0.2,
        ruwe: 1.01,
        phot_bp_n_obs: 190,
        phot_rp_n_obs: 185,
        healpix_pixel: healpix::radec2pix(ra, dec),
    }
}

/// `n` records spread uniformly over the sphere, source ids ascending
/// from `first_id`
pub fn random_records(n: usize, seed: u64, first_id: u64) -> Vec<StarRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let ra = rng.gen_range(0.0..360.0);
            // Uniform on the sphere, not uniform in dec
            let dec = rng.gen_range(-1.0f64..1.0).asin().to_degrees();
            let g_mag = rng.gen_range(5.0f32..18.0);
            record(first_id + i as u64, ra, dec, g_mag)
        })
        .collect()
}

/// `n` records clustered within `radius` degrees of a centre
pub fn clustered_records(
    n: usize,
    seed: u64,
    first_id: u64,
    ra: f64,
    dec: f64,
    radius: f64,
) -> Vec<StarRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let r = radius * rng.gen_range(0.0f64..1.0).sqrt();
            let az = rng.gen_range(0.0..std::f64::consts::TAU);
            let p_ra = ra + r * az.cos() / dec.to_radians().cos();
            let p_dec = (dec + r * az.sin()).clamp(-89.9, 89.9);
            let g_mag = rng.gen_range(5.0f32..18.0);
            record(first_id + i as u64, p_ra.rem_euclid(360.0), p_dec, g_mag)
        })
        .collect()
}

/// Write a complete multifile catalog; records are sorted into the
/// on-disk order (pixel, then source id) in place
pub fn write_catalog(dir: &Path, records: &mut Vec<StarRecord>, stars_per_chunk: u32) {
    assert!(stars_per_chunk > 0);
    records.sort_by_key(|r| (r.healpix_pixel, r.source_id));

    let chunks_dir = dir.join("chunks");
    fs::create_dir_all(&chunks_dir).unwrap();

    let total_stars = records.len() as u64;
    let total_chunks = total_stars.div_ceil(stars_per_chunk as u64);

    let mut pixel_to_chunks: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for (chunk_id, chunk) in records.chunks(stars_per_chunk as usize).enumerate() {
        let chunk_id = chunk_id as u32;
        let mut bytes = Vec::with_capacity(chunk.len() * gaia_catalog::RECORD_SIZE);
        for r in chunk {
            r.write_to(&mut bytes).unwrap();
            let chunks = pixel_to_chunks.entry(r.healpix_pixel).or_default();
            if chunks.last() != Some(&chunk_id) {
                chunks.push(chunk_id);
            }
        }
        fs::write(format::chunk_path(dir, chunk_id), bytes).unwrap();
    }

    let mut entries = Vec::with_capacity(pixel_to_chunks.len());
    let mut chunk_lists = Vec::new();
    for (pixel, chunks) in &pixel_to_chunks {
        entries.push(PixelIndexEntry {
            pixel_id: *pixel,
            num_chunks: chunks.len() as u32,
            chunk_list_offset: chunk_lists.len() as u64,
        });
        chunk_lists.extend(chunks.iter().copied());
    }
    let index = PixelIndex::from_parts(entries, chunk_lists);

    let (ra_min, ra_max) = min_max(records.iter().map(|r| r.ra));
    let (dec_min, dec_max) = min_max(records.iter().map(|r| r.dec));
    let header = CatalogHeader {
        format_flags: 0,
        total_stars,
        total_chunks,
        stars_per_chunk,
        healpix_nside: healpix::NSIDE,
        mag_limit: 18.0,
        ra_min,
        ra_max,
        dec_min,
        dec_max,
        header_size: HEADER_SIZE as u64,
        healpix_index_offset: HEADER_SIZE as u64,
        healpix_index_size: index.entries_byte_size(),
        num_healpix_pixels: index.num_entries() as u32,
        chunk_index_offset: HEADER_SIZE as u64 + index.entries_byte_size(),
        chunk_index_size: index.chunk_lists_byte_size(),
        data_offset: 0,
        data_size: 0,
        creation_date: "2025-11-07T12:00:00".to_string(),
        source_catalog: "Gaia DR3".to_string(),
    };
    format::write_metadata(&format::metadata_path(dir), &header, &index).unwrap();
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

/// The default multifile config blob for a test catalog directory
pub fn multifile_config(dir: &Path, max_cached_chunks: usize) -> String {
    format!(
        r#"{{ "catalog_type": "multifile_v2", "multifile_directory": "{}", "max_cached_chunks": {max_cached_chunks}, "log_level": "warn" }}"#,
        dir.display()
    )
}
