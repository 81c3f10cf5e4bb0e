use clap::{Arg, ArgAction, Command as ClapCommand};
use std::path::PathBuf;
use std::process;
use log::error;

use bandsplit::commands::{BandsplitCommandFactory, CommandFactory};
use bandsplit::logging;

fn cli() -> ClapCommand {
    ClapCommand::new("bandsplit")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Maurice Schilpp")
        .about("Split multi-band GeoTIFFs into one single-band file per declared layer")
        .subcommand_required(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help("Log level (error, warn, info, debug, trace)")
                .value_name("LEVEL")
                .default_value("info")
                .global(true),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .help("Write log records to this file instead of the console")
                .value_name("FILE")
                .global(true),
        )
        .subcommand(
            ClapCommand::new("analyze")
                .about("Print the raster profile of a file")
                .arg(Arg::new("input").help("Input TIFF file").required(true).index(1))
                .arg(
                    Arg::new("verbose")
                        .short('v')
                        .long("verbose")
                        .help("List every IFD")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            ClapCommand::new("split")
                .about("Split a local file into per-layer files")
                .arg(Arg::new("input").help("Input multi-band TIFF").required(true).index(1))
                .arg(
                    Arg::new("layers")
                        .long("layers")
                        .help("Layer names in band order, comma separated (e.g. 'red,nir')")
                        .value_name("NAMES")
                        .required(true),
                )
                .arg(
                    Arg::new("output-dir")
                        .short('o')
                        .long("output-dir")
                        .help("Directory standing in for the object store")
                        .value_name("DIR")
                        .required(true),
                )
                .arg(
                    Arg::new("id")
                        .long("id")
                        .help("Document identifier (defaults to the file name without extension)")
                        .value_name("ID"),
                ),
        )
        .subcommand(
            ClapCommand::new("serve")
                .about("Consume newline-delimited notifications and dispatch them")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .help("TOML configuration file")
                        .value_name("FILE"),
                )
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .help("Read notifications from this file instead of stdin")
                        .value_name("FILE"),
                ),
        )
}

fn main() {
    let matches = cli().get_matches();

    let factory = BandsplitCommandFactory::new();
    let command = match factory.create_command(&matches) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    // Configured logging wins over the command-line defaults
    let (level, file) = match command.logging() {
        Some(config) => (config.level.clone(), config.file.clone()),
        None => (
            matches.get_one::<String>("log-level").cloned().unwrap_or_else(|| "info".to_string()),
            matches.get_one::<String>("log-file").map(PathBuf::from),
        ),
    };
    if let Err(e) = logging::init(&level, file.as_deref()) {
        eprintln!("Error initializing logger: {}", e);
        process::exit(1);
    }

    if let Err(e) = command.execute() {
        error!("Command execution error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
