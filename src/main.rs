use anyhow::anyhow;
use clap::{ArgMatches, Command};

use gaia_catalog::{CelestialPoint, ConeParams, CorridorParams, StarRecord, UnifiedCatalog};

mod cmdline {
    use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

    //fp add_catalog_arg
    pub fn add_catalog_arg(cmd: Command) -> Command {
        cmd.arg(
            Arg::new("catalog")
                .long("catalog")
                .short('c')
                .help("Catalog directory (multifile) or file (single_v1)")
                .action(ArgAction::Set),
        )
    }
    pub fn catalog(matches: &ArgMatches) -> Option<String> {
        matches.get_one::<String>("catalog").map(|s| s.to_string())
    }

    //fp add_catalog_type_arg
    pub fn add_catalog_type_arg(cmd: Command) -> Command {
        cmd.arg(
            Arg::new("catalog_type")
                .long("catalog-type")
                .short('t')
                .help("Catalog variant: multifile_v2 or single_v1")
                .action(ArgAction::Set),
        )
    }
    pub fn catalog_type(matches: &ArgMatches) -> String {
        matches
            .get_one::<String>("catalog_type")
            .cloned()
            .unwrap_or_else(|| "multifile_v2".to_string())
    }

    //fp add_cache_chunks_arg
    pub fn add_cache_chunks_arg(cmd: Command) -> Command {
        cmd.arg(
            Arg::new("cache_chunks")
                .long("cache-chunks")
                .help("Maximum number of chunks kept in memory")
                .value_parser(value_parser!(usize))
                .action(ArgAction::Set),
        )
    }
    pub fn cache_chunks(matches: &ArgMatches) -> usize {
        *matches.get_one::<usize>("cache_chunks").unwrap_or(&200)
    }

    //fp add_right_ascension_arg
    pub fn add_right_ascension_arg(cmd: Command) -> Command {
        cmd.arg(
            Arg::new("right_ascension")
                .long("right_ascension")
                .short('r')
                .required(true)
                .help("Right ascension in degrees")
                .value_parser(value_parser!(f64))
                .action(ArgAction::Set),
        )
    }
    pub fn right_ascension(matches: &ArgMatches) -> f64 {
        *matches.get_one::<f64>("right_ascension").unwrap_or(&0.0)
    }

    //fp add_declination_arg
    pub fn add_declination_arg(cmd: Command) -> Command {
        cmd.arg(
            Arg::new("declination")
                .long("declination")
                .short('d')
                .required(true)
                .help("Declination in degrees")
                .value_parser(value_parser!(f64))
                .action(ArgAction::Set),
        )
    }
    pub fn declination(matches: &ArgMatches) -> f64 {
        *matches.get_one::<f64>("declination").unwrap_or(&0.0)
    }

    //fp add_radius_arg
    pub fn add_radius_arg(cmd: Command) -> Command {
        cmd.arg(
            Arg::new("radius")
                .long("radius")
                .short('a')
                .help("Cone radius in degrees")
                .value_parser(value_parser!(f64))
                .action(ArgAction::Set),
        )
    }
    pub fn radius(matches: &ArgMatches) -> f64 {
        *matches.get_one::<f64>("radius").unwrap_or(&0.5)
    }

    //fp add_magnitude_arg
    pub fn add_magnitude_arg(cmd: Command) -> Command {
        cmd.arg(
            Arg::new("magnitude")
                .long("magnitude")
                .short('m')
                .help("Maximum G magnitude")
                .value_parser(value_parser!(f32))
                .action(ArgAction::Set),
        )
    }
    pub fn magnitude(matches: &ArgMatches) -> Option<f32> {
        matches.get_one::<f32>("magnitude").copied()
    }

    //fp add_limit_arg
    pub fn add_limit_arg(cmd: Command) -> Command {
        cmd.arg(
            Arg::new("limit")
                .long("limit")
                .short('l')
                .help("Stop after this many stars")
                .value_parser(value_parser!(usize))
                .action(ArgAction::Set),
        )
    }
    pub fn limit(matches: &ArgMatches) -> Option<usize> {
        matches.get_one::<usize>("limit").copied()
    }

    //fp add_path_args
    pub fn add_path_args(cmd: Command) -> Command {
        cmd.arg(
            Arg::new("from")
                .long("from")
                .required(true)
                .help("Path start as ra,dec in degrees (e.g. 80.0,-5.0)")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("to")
                .long("to")
                .required(true)
                .help("Path end as ra,dec in degrees")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("points")
                .long("points")
                .help("Number of waypoints along the path")
                .value_parser(value_parser!(usize))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("width")
                .long("width")
                .short('w')
                .help("Corridor half-width in degrees")
                .value_parser(value_parser!(f64))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("max_results")
                .long("max-results")
                .help("Hard cap on returned stars")
                .value_parser(value_parser!(usize))
                .action(ArgAction::Set),
        )
    }
    pub fn endpoint(matches: &ArgMatches, name: &str) -> Option<String> {
        matches.get_one::<String>(name).map(|s| s.to_string())
    }
    pub fn points(matches: &ArgMatches) -> usize {
        *matches.get_one::<usize>("points").unwrap_or(&11)
    }
    pub fn width(matches: &ArgMatches) -> f64 {
        *matches.get_one::<f64>("width").unwrap_or(&0.1)
    }
    pub fn max_results(matches: &ArgMatches) -> Option<usize> {
        matches.get_one::<usize>("max_results").copied()
    }

    //fp add_source_id_arg
    pub fn add_source_id_arg(cmd: Command) -> Command {
        cmd.arg(
            Arg::new("source_id")
                .required(true)
                .help("Gaia source id to look up")
                .value_parser(value_parser!(u64))
                .action(ArgAction::Set),
        )
    }
    pub fn source_id(matches: &ArgMatches) -> u64 {
        *matches.get_one::<u64>("source_id").unwrap_or(&0)
    }
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let cmd = Command::new("gaia_catalog")
        .about("Query a Gaia mag-18 star catalog")
        .version("0.2.0");
    let cmd = cmdline::add_catalog_arg(cmd);
    let cmd = cmdline::add_catalog_type_arg(cmd);
    let cmd = cmdline::add_cache_chunks_arg(cmd);

    let info_subcmd = Command::new("info").about("Show catalog header information and statistics");

    let cone_subcmd = Command::new("cone").about("Cone search around a sky position");
    let cone_subcmd = cmdline::add_right_ascension_arg(cone_subcmd);
    let cone_subcmd = cmdline::add_declination_arg(cone_subcmd);
    let cone_subcmd = cmdline::add_radius_arg(cone_subcmd);
    let cone_subcmd = cmdline::add_magnitude_arg(cone_subcmd);
    let cone_subcmd = cmdline::add_limit_arg(cone_subcmd);

    let corridor_subcmd =
        Command::new("corridor").about("Corridor search along a path, e.g. an asteroid track");
    let corridor_subcmd = cmdline::add_path_args(corridor_subcmd);
    let corridor_subcmd = cmdline::add_magnitude_arg(corridor_subcmd);

    let lookup_subcmd = Command::new("lookup").about("Find a star by its source id (full scan)");
    let lookup_subcmd = cmdline::add_source_id_arg(lookup_subcmd);

    let cmd = cmd
        .subcommand(info_subcmd)
        .subcommand(cone_subcmd)
        .subcommand(corridor_subcmd)
        .subcommand(lookup_subcmd);

    let matches = cmd.get_matches();

    let catalog_type = cmdline::catalog_type(&matches);
    let location = match cmdline::catalog(&matches) {
        Some(c) => c,
        None => default_catalog_dir()?,
    };
    let location_key = match catalog_type.as_str() {
        "multifile_v2" => "multifile_directory",
        "single_v1" => "file_path",
        other => return Err(anyhow!("unknown catalog type {other}")),
    };
    let mut config = serde_json::Map::new();
    config.insert("catalog_type".to_string(), catalog_type.into());
    config.insert(location_key.to_string(), location.into());
    config.insert(
        "max_cached_chunks".to_string(),
        cmdline::cache_chunks(&matches).into(),
    );
    config.insert("log_level".to_string(), "info".into());
    let config = serde_json::Value::Object(config);

    UnifiedCatalog::initialize(&config.to_string())?;
    let catalog = UnifiedCatalog::instance()?;

    let outcome = match matches.subcommand() {
        Some(("cone", sub_matches)) => cone(&catalog, sub_matches),
        Some(("corridor", sub_matches)) => corridor(&catalog, sub_matches),
        Some(("lookup", sub_matches)) => lookup(&catalog, sub_matches),
        _ => info(&catalog),
    };

    UnifiedCatalog::shutdown()?;
    outcome
}

fn default_catalog_dir() -> Result<String, anyhow::Error> {
    let home = std::env::var("HOME").map_err(|_| anyhow!("HOME not set and no --catalog given"))?;
    Ok(format!("{home}/.catalog/gaia_mag18_v2_multifile"))
}

fn display_star(s: &StarRecord) {
    println!(
        "{:20} : {:10.6}, {:+10.6} : G={:6.2} : pm=({:+8.2}, {:+8.2}) mas/yr",
        s.source_id, s.ra, s.dec, s.g_mag, s.pmra, s.pmdec
    );
}

fn display_stats(catalog: &UnifiedCatalog) {
    let stats = catalog.statistics();
    println!();
    println!("Queries:        {}", stats.total_queries);
    println!("Avg query time: {:.2} ms", stats.average_query_time_ms);
    println!("Stars returned: {}", stats.total_stars_returned);
    println!("Cache hit rate: {:.1}%", stats.cache_hit_rate);
    println!("Memory used:    {:.1} MB", stats.memory_used_mb);
}

fn info(catalog: &UnifiedCatalog) -> Result<(), anyhow::Error> {
    let info = catalog.info();
    println!("Catalog:         {}", info.catalog_name);
    println!("Format version:  {}", info.version);
    println!("Total stars:     {}", info.total_stars);
    println!("Magnitude limit: G <= {}", info.magnitude_limit);
    println!("Online:          {}", info.is_online);
    display_stats(catalog);
    Ok(())
}

fn cone(catalog: &UnifiedCatalog, matches: &ArgMatches) -> Result<(), anyhow::Error> {
    let mut params = ConeParams::new(
        cmdline::right_ascension(matches),
        cmdline::declination(matches),
        cmdline::radius(matches),
    );
    params.max_magnitude = cmdline::magnitude(matches);
    params.limit = cmdline::limit(matches);

    let result = catalog.query_cone(&params)?;
    println!(
        "{} stars within {}° of ({}, {}){}",
        result.stars.len(),
        params.radius,
        params.center.ra,
        params.center.dec,
        if result.incomplete { " (incomplete)" } else { "" },
    );
    for s in result.stars.iter().take(10) {
        display_star(s);
    }
    display_stats(catalog);
    Ok(())
}

fn parse_point(s: &str) -> Result<CelestialPoint, anyhow::Error> {
    let (ra, dec) = s
        .split_once(',')
        .ok_or_else(|| anyhow!("expected ra,dec but got {s}"))?;
    Ok(CelestialPoint::new(ra.trim().parse()?, dec.trim().parse()?))
}

fn corridor(catalog: &UnifiedCatalog, matches: &ArgMatches) -> Result<(), anyhow::Error> {
    let from = parse_point(&cmdline::endpoint(matches, "from").ok_or_else(|| anyhow!("--from"))?)?;
    let to = parse_point(&cmdline::endpoint(matches, "to").ok_or_else(|| anyhow!("--to"))?)?;
    let points = cmdline::points(matches).max(2);

    let path: Vec<CelestialPoint> = (0..points)
        .map(|i| {
            let f = i as f64 / (points - 1) as f64;
            CelestialPoint::new(
                from.ra + f * (to.ra - from.ra),
                from.dec + f * (to.dec - from.dec),
            )
        })
        .collect();

    let mut params = CorridorParams::new(path, cmdline::width(matches));
    params.max_magnitude = cmdline::magnitude(matches);
    if let Some(max_results) = cmdline::max_results(matches) {
        params.max_results = max_results;
    }

    let result = catalog.query_corridor(&params)?;
    println!(
        "{} stars within {}° of the {}-point path{}",
        result.stars.len(),
        params.width,
        params.path.len(),
        if result.incomplete { " (incomplete)" } else { "" },
    );
    for s in result.stars.iter().take(10) {
        display_star(s);
    }
    display_stats(catalog);
    Ok(())
}

fn lookup(catalog: &UnifiedCatalog, matches: &ArgMatches) -> Result<(), anyhow::Error> {
    let source_id = cmdline::source_id(matches);
    match catalog.query_by_source_id(source_id)? {
        Some(s) => display_star(&s),
        None => println!("source {source_id} not in the catalog"),
    }
    Ok(())
}
