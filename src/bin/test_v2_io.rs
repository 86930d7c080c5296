//! Validate the structure of a multifile catalog metadata file
//!
//! Exits 0 when the header and the pixel index pass every check.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Arg, ArgAction, Command};

use gaia_catalog::format;

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let matches = Command::new("test_v2_io")
        .about("Validate a v2 catalog metadata file")
        .arg(
            Arg::new("metadata")
                .required(true)
                .help("Path to metadata.dat")
                .action(ArgAction::Set),
        )
        .get_matches();

    let path: PathBuf = matches
        .get_one::<String>("metadata")
        .map(PathBuf::from)
        .context("metadata path is required")?;

    let (header, index) = format::read_metadata(&path)?;

    println!("Header valid: {}", path.display());
    println!("  Total stars:      {}", header.total_stars);
    println!("  Total chunks:     {}", header.total_chunks);
    println!("  Stars per chunk:  {}", header.stars_per_chunk);
    println!("  HEALPix NSIDE:    {}", header.healpix_nside);
    println!("  Indexed pixels:   {}", header.num_healpix_pixels);
    println!("  Magnitude limit:  G <= {}", header.mag_limit);
    println!(
        "  RA range:         {}° to {}°",
        header.ra_min, header.ra_max
    );
    println!(
        "  Dec range:        {}° to {}°",
        header.dec_min, header.dec_max
    );
    println!("  Creation date:    {}", header.creation_date);
    println!("  Source catalog:   {}", header.source_catalog);
    println!();
    println!(
        "Index valid: {} pixel entries, {} chunk references",
        index.num_entries(),
        index.entries().iter().map(|e| e.num_chunks as u64).sum::<u64>()
    );
    Ok(())
}
