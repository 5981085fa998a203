//! regiontool
//!
//! Inspect and edit region files from the command line.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use regionstore::{
    CacheConfig, Compression, RegionCache, RegionConfig, RegionFile, RegionFormat, Result,
};
use tracing_subscriber::{fmt, EnvFilter};

/// regiontool
#[derive(Parser, Debug)]
#[command(name = "regiontool")]
#[command(about = "Inspect and edit sector-allocated region files")]
#[command(version)]
struct Args {
    /// Repair malformed files instead of failing
    #[arg(long, global = true)]
    lenient: bool,

    /// Report every repaired anomaly (implies --lenient)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use the old `.mcr` naming instead of `.mca`
    #[arg(long, global = true)]
    mcr: bool,

    /// Compression for written cells (gzip, zlib, none, or id 1-3)
    #[arg(short, long, global = true, default_value = "gzip")]
    compression: Compression,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the cells of a region file
    Info {
        /// Region file to inspect
        file: PathBuf,
    },

    /// Decode a cell to stdout or a file
    Get {
        /// Region directory
        dir: PathBuf,

        /// Absolute cell X
        #[arg(allow_negative_numbers = true)]
        x: i32,

        /// Absolute cell Z
        #[arg(allow_negative_numbers = true)]
        z: i32,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Store a file's contents as a cell
    Put {
        /// Region directory
        dir: PathBuf,

        /// Absolute cell X
        #[arg(allow_negative_numbers = true)]
        x: i32,

        /// Absolute cell Z
        #[arg(allow_negative_numbers = true)]
        z: i32,

        /// Input file ("-" for stdin)
        input: PathBuf,
    },

    /// Remove a cell
    Rm {
        /// Region directory
        dir: PathBuf,

        /// Absolute cell X
        #[arg(allow_negative_numbers = true)]
        x: i32,

        /// Absolute cell Z
        #[arg(allow_negative_numbers = true)]
        z: i32,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,regionstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let region_config = RegionConfig::builder()
        .lenient(args.lenient)
        .verbose(args.verbose)
        .compression(args.compression)
        .build();

    match &args.command {
        Commands::Info { file } => info(file, &region_config),
        Commands::Get { dir, x, z, out } => {
            let cache = open_cache(dir, args, region_config)?;
            let data = cache.read_chunk_to_vec(*x, *z)?;
            match out {
                Some(path) => fs::write(path, &data)?,
                None => io::stdout().lock().write_all(&data)?,
            }
            tracing::info!("Read {} bytes from cell [{}, {}]", data.len(), x, z);
            cache.close()
        }
        Commands::Put { dir, x, z, input } => {
            let data = if input.as_os_str() == "-" {
                let mut buf = Vec::new();
                io::stdin().lock().read_to_end(&mut buf)?;
                buf
            } else {
                fs::read(input)?
            };

            let cache = open_cache(dir, args, region_config)?;
            cache.write_chunk_bytes(*x, *z, &data)?;
            tracing::info!("Wrote {} bytes to cell [{}, {}]", data.len(), x, z);
            cache.close()
        }
        Commands::Rm { dir, x, z } => {
            let cache = open_cache(dir, args, region_config)?;
            cache.remove_chunk(*x, *z)?;
            tracing::info!("Removed cell [{}, {}]", x, z);
            cache.close()
        }
    }
}

fn open_cache(dir: &Path, args: &Args, region: RegionConfig) -> Result<RegionCache> {
    let format = if args.mcr {
        RegionFormat::McRegion
    } else {
        RegionFormat::Anvil
    };

    let config = CacheConfig::builder()
        .directory(dir)
        .capacity(1)
        .format(format)
        .region(region)
        .build();

    RegionCache::new(config)
}

fn info(file: &Path, config: &RegionConfig) -> Result<()> {
    if !file.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a file", file.display()),
        )
        .into());
    }

    let directory = file.parent().unwrap_or_else(|| Path::new("."));
    let region = RegionFile::open(directory, file, config)?;

    let entries = region.entries();
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", file.display())?;
    writeln!(
        stdout,
        "{:>3} {:>3}  {:>8} {:>7}  {:>10}",
        "x", "z", "offset", "sectors", "timestamp"
    )?;
    for entry in &entries {
        writeln!(
            stdout,
            "{:>3} {:>3}  {:>8} {:>7}  {:>10}",
            entry.local_x,
            entry.local_z,
            entry.location.offset(),
            entry.location.count(),
            entry.timestamp
        )?;
    }
    writeln!(
        stdout,
        "{} cells, {} sectors in use",
        entries.len(),
        region.sector_space()
    )?;

    drop(stdout);
    region.close()
}
