//! Rebuilding the pixel -> chunk index of a multifile catalog
//!
//! Scans every chunk file directly (no cache, each file is touched
//! exactly once), recomputes each record's pixel from its coordinates
//! with the canonical NESTED formulae, and writes a fresh
//! `metadata_new.dat` next to the existing metadata. The operator
//! swaps the files atomically afterwards. The output is deterministic
//! (pixels ascending, chunk ids ascending, creation date preserved),
//! so rebuilding an already-correct catalog reproduces its index
//! byte for byte.

//a Imports
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{CatalogError, Result};
use crate::format::{self, CatalogHeader, PixelIndex, PixelIndexEntry, HEADER_SIZE};
use crate::healpix;
use crate::record::StarRecord;

//a RebuildSummary
//tp RebuildSummary
/// What a rebuild run found and wrote
#[derive(Debug, Clone)]
pub struct RebuildSummary {
    pub stars_scanned: u64,
    pub pixels_with_data: u32,
    pub max_chunks_per_pixel: u32,
    pub total_index_entries: u64,
    /// Where the fresh metadata was written
    pub output_path: PathBuf,
}

//a Rebuild
//fp rebuild_index
/// Scan all chunks of `catalog_dir` and write `metadata_new.dat`
pub fn rebuild_index(catalog_dir: &Path) -> Result<RebuildSummary> {
    let metadata = format::metadata_path(catalog_dir);
    let file = File::open(&metadata).map_err(|e| CatalogError::io(&metadata, e))?;
    let mut reader = BufReader::new(file);
    // Header only; the point of the rebuild is that the existing index
    // may be wrong, so it is not read
    let header = CatalogHeader::read_from(&mut reader)?;
    header.validate()?;
    drop(reader);

    info!(
        "rebuilding index of {}: {} stars in {} chunks",
        catalog_dir.display(),
        header.total_stars,
        header.total_chunks
    );

    let mut pixel_to_chunks: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
    let mut stars_scanned = 0u64;
    for chunk_id in 0..header.total_chunks as u32 {
        let records = read_chunk(catalog_dir, &header, chunk_id)?;
        for r in &records {
            let pixel = healpix::radec2pix(r.ra, r.dec);
            if pixel != r.healpix_pixel {
                warn!(
                    "source {} stores pixel {}, recomputed {pixel}; index follows the coordinates",
                    r.source_id, r.healpix_pixel
                );
            }
            pixel_to_chunks.entry(pixel).or_default().insert(chunk_id);
        }
        stars_scanned += records.len() as u64;
    }

    let mut entries = Vec::with_capacity(pixel_to_chunks.len());
    let mut chunk_lists = Vec::new();
    let mut max_chunks_per_pixel = 0u32;
    for (pixel, chunks) in &pixel_to_chunks {
        entries.push(PixelIndexEntry {
            pixel_id: *pixel,
            num_chunks: chunks.len() as u32,
            chunk_list_offset: chunk_lists.len() as u64,
        });
        max_chunks_per_pixel = max_chunks_per_pixel.max(chunks.len() as u32);
        chunk_lists.extend(chunks.iter().copied());
    }
    let total_index_entries = chunk_lists.len() as u64;
    let index = PixelIndex::from_parts(entries, chunk_lists);

    let mut new_header = header.clone();
    new_header.num_healpix_pixels = index.num_entries() as u32;
    new_header.healpix_index_offset = HEADER_SIZE as u64;
    new_header.healpix_index_size = index.entries_byte_size();
    new_header.chunk_index_offset = HEADER_SIZE as u64 + index.entries_byte_size();
    new_header.chunk_index_size = index.chunk_lists_byte_size();
    new_header.data_offset = 0;
    new_header.data_size = 0;

    let output_path = catalog_dir.join("metadata_new.dat");
    format::write_metadata(&output_path, &new_header, &index)?;

    info!(
        "wrote {}: {} pixels, {} index entries",
        output_path.display(),
        index.num_entries(),
        total_index_entries
    );

    Ok(RebuildSummary {
        stars_scanned,
        pixels_with_data: index.num_entries() as u32,
        max_chunks_per_pixel,
        total_index_entries,
        output_path,
    })
}

//fi read_chunk
/// One chunk file, checked against the record count the header implies
fn read_chunk(catalog_dir: &Path, header: &CatalogHeader, chunk_id: u32) -> Result<Vec<StarRecord>> {
    let path = format::chunk_path(catalog_dir, chunk_id);
    let bytes = std::fs::read(&path).map_err(|e| CatalogError::io(&path, e))?;
    let records = crate::record::decode_chunk(&bytes)?;
    let expected = header.records_in_chunk(chunk_id);
    if records.len() as u64 != expected {
        return Err(CatalogError::corrupt(format!(
            "chunk {chunk_id} holds {} records, header implies {expected}",
            records.len()
        )));
    }
    Ok(records)
}
