//a Imports
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{CatalogError, Result};
use crate::CelestialPoint;

//a Constants
/// On-disk size of one record in bytes
pub const RECORD_SIZE: usize = 84;

//a StarRecord
//tp StarRecord
/// One catalog star, exactly as stored on disk (84 bytes, little-endian)
///
/// `healpix_pixel` is precomputed at the catalog NSIDE and is the
/// authoritative indexing key; it is redundant with (`ra`, `dec`) and
/// the chunk loader checks the two against each other. Magnitudes that
/// the upstream catalog does not provide are stored as quiet NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StarRecord {
    pub source_id: u64,
    /// Right ascension in degrees, `[0, 360)`
    pub ra: f64,
    /// Declination in degrees, `[-90, 90]`
    pub dec: f64,
    pub g_mag: f32,
    pub bp_mag: f32,
    pub rp_mag: f32,
    pub g_mag_error: f32,
    pub bp_mag_error: f32,
    pub rp_mag_error: f32,
    pub bp_rp: f32,
    /// Parallax and its error in mas
    pub parallax: f32,
    pub parallax_error: f32,
    /// Proper motion in mas/yr
    pub pmra: f32,
    pub pmdec: f32,
    pub pmra_error: f32,
    pub ruwe: f32,
    pub phot_bp_n_obs: u16,
    pub phot_rp_n_obs: u16,
    /// NESTED pixel id at the catalog NSIDE
    pub healpix_pixel: u32,
}

//ip StarRecord
impl StarRecord {
    //mp position
    /// The record's sky position
    pub fn position(&self) -> CelestialPoint {
        CelestialPoint::new(self.ra, self.dec)
    }

    //mp read_from
    /// Read one record from a little-endian byte stream
    pub fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            source_id: r.read_u64::<LittleEndian>()?,
            ra: r.read_f64::<LittleEndian>()?,
            dec: r.read_f64::<LittleEndian>()?,
            g_mag: r.read_f32::<LittleEndian>()?,
            bp_mag: r.read_f32::<LittleEndian>()?,
            rp_mag: r.read_f32::<LittleEndian>()?,
            g_mag_error: r.read_f32::<LittleEndian>()?,
            bp_mag_error: r.read_f32::<LittleEndian>()?,
            rp_mag_error: r.read_f32::<LittleEndian>()?,
            bp_rp: r.read_f32::<LittleEndian>()?,
            parallax: r.read_f32::<LittleEndian>()?,
            parallax_error: r.read_f32::<LittleEndian>()?,
            pmra: r.read_f32::<LittleEndian>()?,
            pmdec: r.read_f32::<LittleEndian>()?,
            pmra_error: r.read_f32::<LittleEndian>()?,
            ruwe: r.read_f32::<LittleEndian>()?,
            phot_bp_n_obs: r.read_u16::<LittleEndian>()?,
            phot_rp_n_obs: r.read_u16::<LittleEndian>()?,
            healpix_pixel: r.read_u32::<LittleEndian>()?,
        })
    }

    //mp write_to
    /// Write one record as little-endian bytes
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u64::<LittleEndian>(self.source_id)?;
        w.write_f64::<LittleEndian>(self.ra)?;
        w.write_f64::<LittleEndian>(self.dec)?;
        w.write_f32::<LittleEndian>(self.g_mag)?;
        w.write_f32::<LittleEndian>(self.bp_mag)?;
        w.write_f32::<LittleEndian>(self.rp_mag)?;
        w.write_f32::<LittleEndian>(self.g_mag_error)?;
        w.write_f32::<LittleEndian>(self.bp_mag_error)?;
        w.write_f32::<LittleEndian>(self.rp_mag_error)?;
        w.write_f32::<LittleEndian>(self.bp_rp)?;
        w.write_f32::<LittleEndian>(self.parallax)?;
        w.write_f32::<LittleEndian>(self.parallax_error)?;
        w.write_f32::<LittleEndian>(self.pmra)?;
        w.write_f32::<LittleEndian>(self.pmdec)?;
        w.write_f32::<LittleEndian>(self.pmra_error)?;
        w.write_f32::<LittleEndian>(self.ruwe)?;
        w.write_u16::<LittleEndian>(self.phot_bp_n_obs)?;
        w.write_u16::<LittleEndian>(self.phot_rp_n_obs)?;
        w.write_u32::<LittleEndian>(self.healpix_pixel)?;
        Ok(())
    }
}

//a Chunk decoding
//fp decode_chunk
/// Decode a chunk file's bytes into records
///
/// The byte length must be an exact multiple of [RECORD_SIZE].
pub fn decode_chunk(bytes: &[u8]) -> Result<Vec<StarRecord>> {
    if bytes.len() % RECORD_SIZE != 0 {
        return Err(CatalogError::corrupt(format!(
            "chunk length {} is not a multiple of the {RECORD_SIZE}-byte record size",
            bytes.len()
        )));
    }
    let mut records = Vec::with_capacity(bytes.len() / RECORD_SIZE);
    let mut cursor = bytes;
    while !cursor.is_empty() {
        let record = StarRecord::read_from(&mut cursor)
            .map_err(|e| CatalogError::corrupt(format!("chunk decode failed: {e}")))?;
        records.push(record);
    }
    Ok(records)
}
