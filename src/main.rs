use clap::{Arg, ArgAction, ArgMatches, Command};
use enso_cmip6::{
    analysis::{djf_seasons, EnsoRegime},
    composite::{resolve_models, run_ensemble, CompositeVariant, TimeOption, ZonalOptions},
    config::Config,
    data_io::{Accumulator, DuplicatePolicy, MaskConvention, SeriesTable},
    indices::{banner, run_index, IndexKind},
    logging::init_logging,
    math::stats::nanmean,
};
use std::path::{Path, PathBuf};

fn main() {
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("eli", sub_matches)) => {
            if let Err(e) = run_index_command(sub_matches, IndexKind::Eli) {
                eprintln!("ELI error: {}", e);
                std::process::exit(1);
            }
        }
        Some(("nino34", sub_matches)) => {
            if let Err(e) = run_index_command(sub_matches, IndexKind::Nino34) {
                eprintln!("Nino-3.4 error: {}", e);
                std::process::exit(1);
            }
        }
        Some(("bias", sub_matches)) => {
            if let Err(e) = run_composite(sub_matches, CompositeVariant::Bias) {
                eprintln!("Bias composite error: {}", e);
                std::process::exit(1);
            }
        }
        Some(("change", sub_matches)) => {
            if let Err(e) = run_composite(sub_matches, CompositeVariant::Change) {
                eprintln!("Change composite error: {}", e);
                std::process::exit(1);
            }
        }
        Some(("zonal-average", sub_matches)) => {
            let result = zonal_options(sub_matches)
                .and_then(|options| run_composite(sub_matches, CompositeVariant::ZonalAverage(options)));
            if let Err(e) = result {
                eprintln!("Zonal average error: {}", e);
                std::process::exit(1);
            }
        }
        Some(("zonal-difference", sub_matches)) => {
            let result = zonal_options(sub_matches).and_then(|options| {
                run_composite(sub_matches, CompositeVariant::ZonalDifference(options))
            });
            if let Err(e) = result {
                eprintln!("Zonal difference error: {}", e);
                std::process::exit(1);
            }
        }
        Some(("djf-summary", sub_matches)) => {
            if let Err(e) = run_djf_summary(sub_matches) {
                eprintln!("DJF summary error: {}", e);
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("Please specify a subcommand. Use --help for more information.");
            std::process::exit(1);
        }
    }
}

fn load_config(matches: &ArgMatches) -> Result<Config, String> {
    let config = Config::from_matches(matches)?;
    init_logging(config.verbose);
    Ok(config)
}

fn run_index_command(matches: &ArgMatches, kind: IndexKind) -> Result<(), String> {
    let mut config = load_config(matches)?;
    // Index tables mask full-land cells unless told otherwise
    if matches.get_one::<String>("mask-convention").is_none() {
        config.mask_convention = MaskConvention::NotFullLand;
    }
    config.skip_mask = matches.get_flag("no-mask");

    let model = required(matches, "model")?;
    let data_file = PathBuf::from(required(matches, "data-file")?);
    let mask_file = PathBuf::from(required(matches, "mask-file")?);
    let table_path = match matches.get_one::<String>("output") {
        Some(path) => PathBuf::from(path),
        None => config.output_path(format!("{}.csv", kind.name().to_lowercase())),
    };

    for line in banner(model, &data_file, &mask_file) {
        println!("{}", line);
    }

    let run = run_index(&config, kind, model, &data_file, &mask_file, &table_path)
        .map_err(|e| e.to_string())?;
    println!(
        "{}: {} values for {} written to {}",
        kind.name(),
        run.series.len(),
        run.column,
        table_path.display()
    );
    Ok(())
}

fn run_composite(matches: &ArgMatches, variant: CompositeVariant) -> Result<(), String> {
    let config = load_config(matches)?;
    let requested: Option<Vec<String>> = matches
        .get_one::<String>("models")
        .map(|list| list.split(',').map(|m| m.trim().to_string()).collect());
    let models = resolve_models(requested.as_deref()).map_err(|e| e.to_string())?;

    println!(
        "Computing {} composite for {} models into {}",
        variant.name(),
        models.len(),
        config.output_dir.display()
    );
    let report = run_ensemble(&config, &variant, &models).map_err(|e| e.to_string())?;

    println!("Completed {} models", report.completed.len());
    for (model, error) in &report.failed {
        println!("Failed {}: {}", model, error);
    }
    Ok(())
}

fn zonal_options(matches: &ArgMatches) -> Result<ZonalOptions, String> {
    let time_option: TimeOption = required(matches, "time-option")?
        .parse()
        .map_err(|e: enso_cmip6::composite::CompositeError| e.to_string())?;
    Ok(ZonalOptions {
        time_option,
        lon_bounds: parse_bounds(required(matches, "lon-bounds")?)?,
        lat_bounds: parse_bounds(required(matches, "lat-bounds")?)?,
    })
}

fn run_djf_summary(matches: &ArgMatches) -> Result<(), String> {
    let config = load_config(matches)?;
    let input = Path::new(required(matches, "eli-table")?);
    if !input.exists() {
        return Err(format!("ELI table does not exist: {}", input.display()));
    }
    let output = match matches.get_one::<String>("output") {
        Some(path) => PathBuf::from(path),
        None => config.output_path("seasons.csv"),
    };

    let table = SeriesTable::open_or_create(input, DuplicatePolicy::Error).map_err(|e| e.to_string())?;
    let mut seasons_table =
        SeriesTable::open_or_create(&output, config.duplicate_policy).map_err(|e| e.to_string())?;

    for name in table.names() {
        let Some(values) = table.column(&name) else {
            continue;
        };
        let seasons = djf_seasons(table.labels(), values);
        let labels: Vec<String> = seasons.iter().map(|s| s.label()).collect();
        let means: Vec<f64> = seasons.iter().map(|s| s.mean).collect();
        seasons_table
            .insert_series(&name, &labels, &means)
            .map_err(|e| e.to_string())?;

        let mean_eli = nanmean(values.iter().copied());
        println!(
            "{}: {} DJF seasons, mean ELI {:.2} ({})",
            name,
            seasons.len(),
            mean_eli,
            EnsoRegime::classify(mean_eli)
        );
    }

    seasons_table.save().map_err(|e| e.to_string())?;
    println!("DJF seasons written to {}", output.display());
    Ok(())
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, String> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing argument: {}", name))
}

/// Parse `a,b` into a bounds pair
fn parse_bounds(text: &str) -> Result<(f64, f64), String> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [a, b] => {
            let a = a.parse::<f64>().map_err(|_| format!("Invalid bound: {}", a))?;
            let b = b.parse::<f64>().map_err(|_| format!("Invalid bound: {}", b))?;
            Ok((a, b))
        }
        _ => Err(format!("Expected two comma-separated bounds, got '{}'", text)),
    }
}

fn index_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(
            Arg::new("model")
                .value_name("MODEL")
                .help("CMIP6 model name, e.g. CESM2")
                .required(true),
        )
        .arg(
            Arg::new("data-file")
                .value_name("DATA_FILE")
                .help("Realization file with the ts variable")
                .required(true),
        )
        .arg(
            Arg::new("mask-file")
                .value_name("MASK_FILE")
                .help("Land fraction file with the sftlf variable")
                .required(true),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("CSV table to add the realization column to"),
        )
        .arg(
            Arg::new("no-mask")
                .long("no-mask")
                .help("Compute the index without land masking")
                .action(ArgAction::SetTrue),
        )
}

fn ensemble_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name).about(about).arg(
        Arg::new("models")
            .long("models")
            .value_name("MODELS")
            .help("Comma-separated subset of the ensemble (default: all 33 models)"),
    )
}

fn zonal_command(name: &'static str, about: &'static str) -> Command {
    ensemble_command(name, about)
        .arg(
            Arg::new("time-option")
                .long("time-option")
                .value_name("OPTION")
                .help("\"year\" to keep the whole year or \"DJF\" for December-February")
                .default_value("DJF"),
        )
        .arg(
            Arg::new("lon-bounds")
                .long("lon-bounds")
                .value_name("WEST,EAST")
                .help("Longitude bounds in degrees east")
                .allow_hyphen_values(true)
                .default_value("120,280"),
        )
        .arg(
            Arg::new("lat-bounds")
                .long("lat-bounds")
                .value_name("SOUTH,NORTH")
                .help("Latitude bounds in degrees north")
                .allow_hyphen_values(true)
                .default_value("-5,5"),
        )
}

fn build_cli() -> Command {
    Command::new("enso_cmip6")
        .version(env!("CARGO_PKG_VERSION"))
        .about("ENSO Longitude Index, Nino-3.4 and SST composites for the CMIP6 ensemble")
        .subcommand_required(true)
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Directory holding CMIP6/<model>/ and the observations")
                .global(true),
        )
        .arg(
            Arg::new("obs-file")
                .long("obs-file")
                .value_name("FILE")
                .help("Observational SST file (default: <data-dir>/sst.mnmean.nc)")
                .global(true),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .value_name("DIR")
                .help("Directory for composite files and tables")
                .global(true),
        )
        .arg(
            Arg::new("mask-convention")
                .long("mask-convention")
                .value_name("CONVENTION")
                .help("detect, low-fraction, not-maximum or not-full-land")
                .global(true),
        )
        .arg(
            Arg::new("interpolation")
                .long("interpolation")
                .value_name("METHOD")
                .help("linear or nearest")
                .global(true),
        )
        .arg(
            Arg::new("on-duplicate")
                .long("on-duplicate")
                .value_name("POLICY")
                .help("What to do when an output entry exists: replace, skip or error")
                .global(true),
        )
        .arg(
            Arg::new("climatology-window")
                .long("climatology-window")
                .value_name("YEARS")
                .help("Rolling window of the Nino-3.4 climatology")
                .global(true),
        )
        .arg(
            Arg::new("backfill-edge")
                .long("backfill-edge")
                .value_name("COUNT")
                .help("Climatology entries backfilled at each end")
                .global(true),
        )
        .arg(
            Arg::new("keep-going")
                .long("keep-going")
                .help("Continue the ensemble loop after a model fails")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(index_command("eli", "Monthly ENSO Longitude Index of one realization"))
        .subcommand(index_command("nino34", "DJF Nino-3.4 anomalies of one realization"))
        .subcommand(ensemble_command("bias", "DJF SST bias against observations per model"))
        .subcommand(ensemble_command("change", "DJF SST change, 2050-2100 minus 1850-1900"))
        .subcommand(zonal_command("zonal-average", "Zonal mean SST profile per model"))
        .subcommand(zonal_command(
            "zonal-difference",
            "Historical and future zonal mean SST profiles per model",
        ))
        .subcommand(
            Command::new("djf-summary")
                .about("DJF seasonal means and ENSO regime of every column of an ELI table")
                .arg(
                    Arg::new("eli-table")
                        .value_name("ELI_TABLE")
                        .help("CSV table written by the eli command")
                        .required(true),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("CSV table of DJF seasonal means"),
                ),
        )
}
