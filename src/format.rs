//! The multifile catalog's metadata layout
//!
//! `metadata.dat` is a 256-byte little-endian header followed by the
//! pixel index (16-byte entries sorted by pixel id) and the flat u32
//! chunk-list array the entries point into. Star data lives in
//! `chunks/chunk_%03u.dat` files, one raw record array per chunk id.

//a Imports
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{CatalogError, Result};
use crate::healpix;

//a Constants
/// Magic bytes opening `metadata.dat`
pub const MAGIC: [u8; 8] = *b"GAIA18V2";

/// Current multifile format version
pub const FORMAT_VERSION: u32 = 2;

/// Exact header size in bytes
pub const HEADER_SIZE: usize = 256;

/// Size of one pixel-index entry in bytes
pub const PIXEL_ENTRY_SIZE: usize = 16;

const STRING_FIELD_SIZE: usize = 32;
const RESERVED_SIZE: usize = 52;

//a CatalogHeader
//tp CatalogHeader
/// The fixed 256-byte header of `metadata.dat`
///
/// The magic and version are implicit: [CatalogHeader::read_from]
/// rejects anything that is not a version-2 `GAIA18V2` header, and
/// [CatalogHeader::write_to] always emits them.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogHeader {
    pub format_flags: u32,
    pub total_stars: u64,
    pub total_chunks: u64,
    pub stars_per_chunk: u32,
    pub healpix_nside: u32,
    /// Magnitude cutoff of the catalog (G <= mag_limit)
    pub mag_limit: f64,
    pub ra_min: f64,
    pub ra_max: f64,
    pub dec_min: f64,
    pub dec_max: f64,
    pub header_size: u64,
    /// Offset and byte size of the pixel-entry array
    pub healpix_index_offset: u64,
    pub healpix_index_size: u64,
    pub num_healpix_pixels: u32,
    /// Offset and byte size of the chunk-list array
    pub chunk_index_offset: u64,
    pub chunk_index_size: u64,
    /// Unused in the multifile layout (records live in chunk files)
    pub data_offset: u64,
    pub data_size: u64,
    /// ISO-8601 creation timestamp, at most 31 bytes
    pub creation_date: String,
    /// Upstream catalog label, e.g. "Gaia DR3"
    pub source_catalog: String,
}

//ip CatalogHeader
impl CatalogHeader {
    //mp read_from
    /// Read and parse the 256-byte header
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        r.read_exact(&mut buf)
            .map_err(|e| CatalogError::corrupt(format!("short header: {e}")))?;
        let mut c = &buf[..];

        let mut magic = [0u8; 8];
        c.read_exact(&mut magic)
            .map_err(|e| CatalogError::corrupt(format!("short header: {e}")))?;
        if magic != MAGIC {
            return Err(CatalogError::corrupt(format!(
                "bad magic {:?}, expected {:?}",
                String::from_utf8_lossy(&magic),
                String::from_utf8_lossy(&MAGIC),
            )));
        }
        let version = c
            .read_u32::<LittleEndian>()
            .map_err(|e| CatalogError::corrupt(format!("short header: {e}")))?;
        if version != FORMAT_VERSION {
            return Err(CatalogError::corrupt(format!(
                "unsupported format version {version}, expected {FORMAT_VERSION}"
            )));
        }

        Self::read_fields(&mut c)
            .map_err(|e| CatalogError::corrupt(format!("short header: {e}")))
    }

    //mi read_fields
    /// The fields after magic and version, in on-disk order
    fn read_fields(c: &mut &[u8]) -> std::io::Result<Self> {
        Ok(Self {
            format_flags: c.read_u32::<LittleEndian>()?,
            total_stars: c.read_u64::<LittleEndian>()?,
            total_chunks: c.read_u64::<LittleEndian>()?,
            stars_per_chunk: c.read_u32::<LittleEndian>()?,
            healpix_nside: c.read_u32::<LittleEndian>()?,
            mag_limit: c.read_f64::<LittleEndian>()?,
            ra_min: c.read_f64::<LittleEndian>()?,
            ra_max: c.read_f64::<LittleEndian>()?,
            dec_min: c.read_f64::<LittleEndian>()?,
            dec_max: c.read_f64::<LittleEndian>()?,
            header_size: c.read_u64::<LittleEndian>()?,
            healpix_index_offset: c.read_u64::<LittleEndian>()?,
            healpix_index_size: c.read_u64::<LittleEndian>()?,
            num_healpix_pixels: c.read_u32::<LittleEndian>()?,
            chunk_index_offset: c.read_u64::<LittleEndian>()?,
            chunk_index_size: c.read_u64::<LittleEndian>()?,
            data_offset: c.read_u64::<LittleEndian>()?,
            data_size: c.read_u64::<LittleEndian>()?,
            creation_date: read_string_field(c)?,
            source_catalog: read_string_field(c)?,
        })
    }

    //mp write_to
    /// Emit the header as exactly 256 little-endian bytes
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.write_all(&MAGIC)?;
        buf.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        buf.write_u32::<LittleEndian>(self.format_flags)?;
        buf.write_u64::<LittleEndian>(self.total_stars)?;
        buf.write_u64::<LittleEndian>(self.total_chunks)?;
        buf.write_u32::<LittleEndian>(self.stars_per_chunk)?;
        buf.write_u32::<LittleEndian>(self.healpix_nside)?;
        buf.write_f64::<LittleEndian>(self.mag_limit)?;
        buf.write_f64::<LittleEndian>(self.ra_min)?;
        buf.write_f64::<LittleEndian>(self.ra_max)?;
        buf.write_f64::<LittleEndian>(self.dec_min)?;
        buf.write_f64::<LittleEndian>(self.dec_max)?;
        buf.write_u64::<LittleEndian>(self.header_size)?;
        buf.write_u64::<LittleEndian>(self.healpix_index_offset)?;
        buf.write_u64::<LittleEndian>(self.healpix_index_size)?;
        buf.write_u32::<LittleEndian>(self.num_healpix_pixels)?;
        buf.write_u64::<LittleEndian>(self.chunk_index_offset)?;
        buf.write_u64::<LittleEndian>(self.chunk_index_size)?;
        buf.write_u64::<LittleEndian>(self.data_offset)?;
        buf.write_u64::<LittleEndian>(self.data_size)?;
        write_string_field(&mut buf, &self.creation_date)?;
        write_string_field(&mut buf, &self.source_catalog)?;
        buf.write_all(&[0u8; RESERVED_SIZE])?;
        debug_assert_eq!(buf.len(), HEADER_SIZE);
        w.write_all(&buf)
    }

    //mp validate
    /// Check the semantic consistency of the header fields
    pub fn validate(&self) -> Result<()> {
        if self.healpix_nside != healpix::NSIDE {
            return Err(CatalogError::corrupt(format!(
                "unsupported NSIDE {}, catalog format fixes {}",
                self.healpix_nside,
                healpix::NSIDE
            )));
        }
        if self.stars_per_chunk == 0 {
            return Err(CatalogError::corrupt("stars_per_chunk is zero"));
        }
        let expected_chunks = self.total_stars.div_ceil(self.stars_per_chunk as u64);
        if self.total_chunks != expected_chunks {
            return Err(CatalogError::corrupt(format!(
                "total_chunks {} does not match ceil({} / {}) = {expected_chunks}",
                self.total_chunks, self.total_stars, self.stars_per_chunk
            )));
        }
        if self.header_size != HEADER_SIZE as u64 {
            return Err(CatalogError::corrupt(format!(
                "header_size {} != {HEADER_SIZE}",
                self.header_size
            )));
        }
        if self.healpix_index_offset < HEADER_SIZE as u64 {
            return Err(CatalogError::corrupt("pixel index overlaps the header"));
        }
        let entries_size = self.num_healpix_pixels as u64 * PIXEL_ENTRY_SIZE as u64;
        if self.healpix_index_size != entries_size {
            return Err(CatalogError::corrupt(format!(
                "pixel index size {} != {} entries * {PIXEL_ENTRY_SIZE}",
                self.healpix_index_size, self.num_healpix_pixels
            )));
        }
        if self.chunk_index_offset < self.healpix_index_offset + entries_size {
            return Err(CatalogError::corrupt("chunk lists overlap the pixel index"));
        }
        if self.chunk_index_size % 4 != 0 {
            return Err(CatalogError::corrupt("chunk list size not a multiple of 4"));
        }
        Ok(())
    }

    //mp records_in_chunk
    /// Number of records chunk `chunk_id` must hold (the last chunk may
    /// be shorter)
    pub fn records_in_chunk(&self, chunk_id: u32) -> u64 {
        let start = chunk_id as u64 * self.stars_per_chunk as u64;
        (self.total_stars.saturating_sub(start)).min(self.stars_per_chunk as u64)
    }
}

//fi read_string_field
fn read_string_field<R: Read>(r: &mut R) -> std::io::Result<String> {
    let mut buf = [0u8; STRING_FIELD_SIZE];
    r.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf)
        .trim_end_matches('\0')
        .to_string())
}

//fi write_string_field
fn write_string_field<W: Write>(w: &mut W, s: &str) -> std::io::Result<()> {
    let mut buf = [0u8; STRING_FIELD_SIZE];
    let bytes = s.as_bytes();
    let n = bytes.len().min(STRING_FIELD_SIZE - 1);
    buf[..n].copy_from_slice(&bytes[..n]);
    w.write_all(&buf)
}

//a PixelIndexEntry
//tp PixelIndexEntry
/// One 16-byte pixel-index entry
///
/// `chunk_list_offset` is measured in entries (u32 values), not bytes,
/// into the chunk-list array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelIndexEntry {
    pub pixel_id: u32,
    pub num_chunks: u32,
    pub chunk_list_offset: u64,
}

//ip PixelIndexEntry
impl PixelIndexEntry {
    //mp read_from
    pub fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            pixel_id: r.read_u32::<LittleEndian>()?,
            num_chunks: r.read_u32::<LittleEndian>()?,
            chunk_list_offset: r.read_u64::<LittleEndian>()?,
        })
    }

    //mp write_to
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self.pixel_id)?;
        w.write_u32::<LittleEndian>(self.num_chunks)?;
        w.write_u64::<LittleEndian>(self.chunk_list_offset)?;
        Ok(())
    }
}

//a PixelIndex
//tp PixelIndex
/// The pixel -> chunk-set index: sorted entries plus the flat
/// chunk-list array they point into
///
/// Only pixels that actually contain stars have an entry; a pixel
/// without an entry maps to the empty chunk set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PixelIndex {
    entries: Vec<PixelIndexEntry>,
    chunk_lists: Vec<u32>,
}

//ip PixelIndex
impl PixelIndex {
    //cp from_parts
    pub fn from_parts(entries: Vec<PixelIndexEntry>, chunk_lists: Vec<u32>) -> Self {
        Self {
            entries,
            chunk_lists,
        }
    }

    //mp read_from
    /// Read the index regions described by a header from a seekable
    /// metadata stream
    pub fn read_from<R: Read + Seek>(r: &mut R, header: &CatalogHeader) -> Result<Self> {
        r.seek(SeekFrom::Start(header.healpix_index_offset))
            .map_err(|e| CatalogError::corrupt(format!("seek to pixel index: {e}")))?;
        let mut entries = Vec::with_capacity(header.num_healpix_pixels as usize);
        for _ in 0..header.num_healpix_pixels {
            let entry = PixelIndexEntry::read_from(r)
                .map_err(|e| CatalogError::corrupt(format!("truncated pixel index: {e}")))?;
            entries.push(entry);
        }

        r.seek(SeekFrom::Start(header.chunk_index_offset))
            .map_err(|e| CatalogError::corrupt(format!("seek to chunk lists: {e}")))?;
        let num_list_entries = (header.chunk_index_size / 4) as usize;
        let mut chunk_lists = Vec::with_capacity(num_list_entries);
        for _ in 0..num_list_entries {
            let id = r
                .read_u32::<LittleEndian>()
                .map_err(|e| CatalogError::corrupt(format!("truncated chunk lists: {e}")))?;
            chunk_lists.push(id);
        }
        Ok(Self {
            entries,
            chunk_lists,
        })
    }

    //mp write_to
    /// Write entries then chunk lists, back to back
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        for entry in &self.entries {
            entry.write_to(w)?;
        }
        for id in &self.chunk_lists {
            w.write_u32::<LittleEndian>(*id)?;
        }
        Ok(())
    }

    //mp validate
    /// Check entry ordering and that every entry stays in bounds
    pub fn validate(&self, header: &CatalogHeader) -> Result<()> {
        let mut previous: Option<u32> = None;
        for entry in &self.entries {
            if entry.pixel_id >= healpix::NPIX {
                return Err(CatalogError::corrupt(format!(
                    "pixel id {} out of range",
                    entry.pixel_id
                )));
            }
            if let Some(p) = previous {
                if entry.pixel_id <= p {
                    return Err(CatalogError::corrupt("pixel index not sorted by pixel id"));
                }
            }
            previous = Some(entry.pixel_id);

            let end = entry.chunk_list_offset + entry.num_chunks as u64;
            if end > self.chunk_lists.len() as u64 {
                return Err(CatalogError::corrupt(format!(
                    "pixel {} chunk list [{}..{end}) exceeds the {}-entry list array",
                    entry.pixel_id,
                    entry.chunk_list_offset,
                    self.chunk_lists.len()
                )));
            }
        }
        for id in &self.chunk_lists {
            if *id as u64 >= header.total_chunks {
                return Err(CatalogError::corrupt(format!(
                    "chunk id {id} out of range (total_chunks {})",
                    header.total_chunks
                )));
            }
        }
        Ok(())
    }

    //mp chunks_for_pixel
    /// The chunk ids holding records of `pixel`, empty when the pixel
    /// has no stars
    pub fn chunks_for_pixel(&self, pixel: u32) -> &[u32] {
        match self
            .entries
            .binary_search_by(|e| e.pixel_id.cmp(&pixel))
        {
            Ok(i) => {
                let e = &self.entries[i];
                let start = e.chunk_list_offset as usize;
                &self.chunk_lists[start..start + e.num_chunks as usize]
            }
            Err(_) => &[],
        }
    }

    //ap entries
    pub fn entries(&self) -> &[PixelIndexEntry] {
        &self.entries
    }

    //ap num_entries
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    //ap entries_byte_size
    pub fn entries_byte_size(&self) -> u64 {
        self.entries.len() as u64 * PIXEL_ENTRY_SIZE as u64
    }

    //ap chunk_lists_byte_size
    pub fn chunk_lists_byte_size(&self) -> u64 {
        self.chunk_lists.len() as u64 * 4
    }
}

//a Path helpers and metadata loading
//fp chunk_file_name
/// File name of a chunk id, `chunk_%03u.dat`
pub fn chunk_file_name(chunk_id: u32) -> String {
    format!("chunk_{chunk_id:03}.dat")
}

//fp chunk_path
/// Full path of a chunk file inside a catalog directory
pub fn chunk_path(catalog_dir: &Path, chunk_id: u32) -> PathBuf {
    catalog_dir.join("chunks").join(chunk_file_name(chunk_id))
}

//fp metadata_path
pub fn metadata_path(catalog_dir: &Path) -> PathBuf {
    catalog_dir.join("metadata.dat")
}

//fp read_metadata
/// Open, parse and fully validate a metadata file
pub fn read_metadata(path: &Path) -> Result<(CatalogHeader, PixelIndex)> {
    let file = File::open(path).map_err(|e| CatalogError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let header = CatalogHeader::read_from(&mut reader)?;
    header.validate()?;
    let index = PixelIndex::read_from(&mut reader, &header)?;
    index.validate(&header)?;
    Ok((header, index))
}

//fp write_metadata
/// Write a header + index pair as a complete metadata file
pub fn write_metadata(path: &Path, header: &CatalogHeader, index: &PixelIndex) -> Result<()> {
    let file = File::create(path).map_err(|e| CatalogError::io(path, e))?;
    let mut w = std::io::BufWriter::new(file);
    header
        .write_to(&mut w)
        .map_err(|e| CatalogError::io(path, e))?;
    index
        .write_to(&mut w)
        .map_err(|e| CatalogError::io(path, e))?;
    w.flush().map_err(|e| CatalogError::io(path, e))?;
    Ok(())
}

//a Tests
#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> CatalogHeader {
        CatalogHeader {
            format_flags: 0,
            total_stars: 250,
            total_chunks: 3,
            stars_per_chunk: 100,
            healpix_nside: healpix::NSIDE,
            mag_limit: 18.0,
            ra_min: 0.0,
            ra_max: 360.0,
            dec_min: -90.0,
            dec_max: 90.0,
            header_size: HEADER_SIZE as u64,
            healpix_index_offset: HEADER_SIZE as u64,
            healpix_index_size: 32,
            num_healpix_pixels: 2,
            chunk_index_offset: HEADER_SIZE as u64 + 32,
            chunk_index_size: 12,
            data_offset: 0,
            data_size: 0,
            creation_date: "2025-11-07T12:00:00".to_string(),
            source_catalog: "Gaia DR3".to_string(),
        }
    }

    #[test]
    fn header_round_trips_bitwise() {
        let header = sample_header();
        let mut bytes = Vec::new();
        header.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let back = CatalogHeader::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(back, header);

        let mut again = Vec::new();
        back.write_to(&mut again).unwrap();
        assert_eq!(again, bytes);
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let mut bytes = Vec::new();
        sample_header().write_to(&mut bytes).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            CatalogHeader::read_from(&mut bytes.as_slice()),
            Err(CatalogError::CorruptCatalog { .. })
        ));
    }

    #[test]
    fn bad_version_is_corrupt() {
        let mut bytes = Vec::new();
        sample_header().write_to(&mut bytes).unwrap();
        bytes[8] = 7;
        assert!(matches!(
            CatalogHeader::read_from(&mut bytes.as_slice()),
            Err(CatalogError::CorruptCatalog { .. })
        ));
    }

    #[test]
    fn chunk_count_mismatch_fails_validation() {
        let mut header = sample_header();
        header.total_chunks = 2;
        assert!(header.validate().is_err());
        header.total_chunks = 3;
        assert!(header.validate().is_ok());
    }

    #[test]
    fn records_in_chunk_handles_short_tail() {
        let header = sample_header();
        assert_eq!(header.records_in_chunk(0), 100);
        assert_eq!(header.records_in_chunk(1), 100);
        assert_eq!(header.records_in_chunk(2), 50);
    }

    fn sample_index() -> PixelIndex {
        PixelIndex::from_parts(
            vec![
                PixelIndexEntry {
                    pixel_id: 10,
                    num_chunks: 2,
                    chunk_list_offset: 0,
                },
                PixelIndexEntry {
                    pixel_id: 900,
                    num_chunks: 1,
                    chunk_list_offset: 2,
                },
            ],
            vec![0, 1, 2],
        )
    }

    #[test]
    fn index_lookup_and_bounds() {
        let index = sample_index();
        assert_eq!(index.chunks_for_pixel(10), &[0, 1]);
        assert_eq!(index.chunks_for_pixel(900), &[2]);
        assert!(index.chunks_for_pixel(11).is_empty());
        index.validate(&sample_header()).unwrap();
    }

    #[test]
    fn index_rejects_out_of_bounds_list() {
        let index = PixelIndex::from_parts(
            vec![PixelIndexEntry {
                pixel_id: 10,
                num_chunks: 4,
                chunk_list_offset: 0,
            }],
            vec![0, 1],
        );
        assert!(index.validate(&sample_header()).is_err());
    }

    #[test]
    fn index_rejects_unsorted_entries() {
        let index = PixelIndex::from_parts(
            vec![
                PixelIndexEntry {
                    pixel_id: 900,
                    num_chunks: 1,
                    chunk_list_offset: 0,
                },
                PixelIndexEntry {
                    pixel_id: 10,
                    num_chunks: 1,
                    chunk_list_offset: 1,
                },
            ],
            vec![0, 1],
        );
        assert!(index.validate(&sample_header()).is_err());
    }

    #[test]
    fn index_round_trips_through_metadata_stream() {
        let header = sample_header();
        let index = sample_index();
        let mut bytes = Vec::new();
        header.write_to(&mut bytes).unwrap();
        index.write_to(&mut bytes).unwrap();

        let mut cursor = std::io::Cursor::new(bytes);
        let back_header = CatalogHeader::read_from(&mut cursor).unwrap();
        let back_index = PixelIndex::read_from(&mut cursor, &back_header).unwrap();
        assert_eq!(back_index, index);
    }

    #[test]
    fn chunk_file_names_are_zero_padded() {
        assert_eq!(chunk_file_name(0), "chunk_000.dat");
        assert_eq!(chunk_file_name(42), "chunk_042.dat");
        assert_eq!(chunk_file_name(1234), "chunk_1234.dat");
    }
}
