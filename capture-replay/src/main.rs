#![warn(clippy::all)]

#[macro_use]
extern crate log;

use clap::{crate_version, Parser};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use std::fs::File;
use std::io;
use std::path::Path;

use capture_replay::{replay_file, ReplayOptions, DEFAULT_READ_SIZE};
use libcapture_tools::Config;

/// Replay a pcapng file through the capture block read interface
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<String>,

    /// Snap length (0: disabled)
    #[arg(short, long)]
    snaplen: Option<u32>,

    /// Comma-separated list of process identifiers to exclude
    #[arg(long, value_name = "IDS")]
    filter_process: Option<String>,

    /// Comma-separated list of connection identifiers to exclude
    #[arg(long, value_name = "IDS")]
    filter_connection: Option<String>,

    /// Size of each read
    #[arg(short = 'b', long, default_value_t = DEFAULT_READ_SIZE)]
    read_size: usize,

    /// Print session statistics (JSON) when done
    #[arg(long)]
    stats: bool,

    /// Be verbose
    #[arg(short, long)]
    verbose: bool,

    /// Input file ("-" for standard input)
    input: String,

    /// Output file
    output: String,
}

fn load_config(config: &mut Config, filename: &str) -> Result<(), io::Error> {
    debug!("Loading configuration {filename}");
    let path = Path::new(&filename);
    let file = File::open(path).map_err(|e| {
        error!("Could not open config file '{}'", filename);
        e
    })?;
    config.load_config(file)
}

fn parse_ids(s: &str) -> Result<Vec<u32>, io::Error> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let v = match s.strip_prefix("0x") {
                Some(hex) => u32::from_str_radix(hex, 16),
                None => s.parse::<u32>(),
            };
            v.map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidInput, format!("invalid identifier '{s}': {e}"))
            })
        })
        .collect()
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let env_filter = EnvFilter::try_from_env("CAPTURE_REPLAY_LOG")
        .unwrap_or_else(|_| EnvFilter::from_default_env().add_directive(default_level.into()));
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(env_filter)
        .compact()
        .init();

    info!("Capture replay {}", crate_version!());

    let mut config = Config::default();
    if let Some(filename) = args.config.as_ref() {
        load_config(&mut config, filename)?;
    }

    let options = ReplayOptions {
        config,
        read_size: args.read_size,
        snap_length: args.snaplen,
        process_filter: args
            .filter_process
            .as_deref()
            .map(parse_ids)
            .transpose()?
            .unwrap_or_default(),
        connection_filter: args
            .filter_connection
            .as_deref()
            .map(parse_ids)
            .transpose()?
            .unwrap_or_default(),
    };

    let stats = replay_file(&args.input, &args.output, &options)?;
    if args.stats {
        let s = serde_json::to_string_pretty(&stats).map_err(io::Error::other)?;
        println!("{s}");
    }
    Ok(())
}
