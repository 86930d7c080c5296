//! Rebuild the HEALPix pixel -> chunk index of a multifile catalog
//!
//! Scans every chunk, recomputes the index from record coordinates and
//! writes `metadata_new.dat` alongside the existing metadata. The
//! operator applies it by swapping the files.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Arg, ArgAction, Command};

use gaia_catalog::rebuild;

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let matches = Command::new("rebuild_healpix_index")
        .about("Rebuild the HEALPix spatial index of a multifile catalog")
        .arg(
            Arg::new("catalog_dir")
                .required(true)
                .help("Catalog directory, e.g. ~/.catalog/gaia_mag18_v2_multifile")
                .action(ArgAction::Set),
        )
        .get_matches();

    let catalog_dir: PathBuf = matches
        .get_one::<String>("catalog_dir")
        .map(PathBuf::from)
        .context("catalog_dir is required")?;

    let summary = rebuild::rebuild_index(&catalog_dir)?;

    println!("Stars scanned:        {}", summary.stars_scanned);
    println!("Pixels with data:     {}", summary.pixels_with_data);
    println!("Max chunks per pixel: {}", summary.max_chunks_per_pixel);
    println!("Total index entries:  {}", summary.total_index_entries);
    println!();
    println!("New index written to {}", summary.output_path.display());
    println!("To apply it:");
    println!(
        "  mv {} {}",
        catalog_dir.join("metadata.dat").display(),
        catalog_dir.join("metadata_old.dat").display()
    );
    println!(
        "  mv {} {}",
        summary.output_path.display(),
        catalog_dir.join("metadata.dat").display()
    );
    Ok(())
}
