//! Command line entry point: massage a catalogue export into migration dumps.

use anyhow::{bail, Context};
use catmassage::formats::Format;
use catmassage::massage::{massage_files, InputPaths};
use catmassage::{MassageConfig, OutputLayout};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Merges a catalogue export with its item ledger.
#[derive(Parser, Debug)]
#[command(name = "catmassage")]
#[command(about = "Merges a line-MARC catalogue with its item ledger into ISO 2709 and MARCXML dumps")]
struct Args {
    /// Catalogue export (line-MARC, ISO 2709 or MARCXML)
    #[arg(long)]
    vmarc: PathBuf,

    /// Item ledger (key/value dump sorted by title number)
    #[arg(long)]
    exemp: PathBuf,

    /// Exemplar dump with loan categories and loan branches (line-MARC)
    #[arg(long)]
    emarc: Option<PathBuf>,

    /// Directory for all output files
    #[arg(long, default_value = ".")]
    outdir: PathBuf,

    /// Skip this many catalogue records
    #[arg(long, default_value = "0")]
    skip: usize,

    /// Stop after this many records have been written
    #[arg(long)]
    limit: Option<usize>,

    /// Enrichment threads
    #[arg(long, default_value = "1")]
    workers: usize,

    /// Retries per record after a ledger read failure
    #[arg(long, default_value = "3")]
    max_retries: usize,

    /// Catalogue format: line, iso2709 or marcxml (sniffed when omitted)
    #[arg(long)]
    format: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("Error: {e:#}");
        eprintln!("catmassage: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    let format = match args.format.as_deref() {
        Some(name) => match Format::from_name(name) {
            Some(format) => Some(format),
            None => bail!("unknown catalogue format {name:?}"),
        },
        None => None,
    };
    if args.workers == 0 {
        bail!("--workers must be at least 1");
    }

    let inputs = InputPaths {
        catalogue: args.vmarc,
        ledger: args.exemp,
        exemplars: args.emarc,
        format,
    };
    let layout = OutputLayout::new(args.outdir);
    let config = MassageConfig {
        skip: args.skip,
        limit: args.limit,
        workers: args.workers,
        max_retries: args.max_retries,
        ..MassageConfig::default()
    };

    info!(
        catalogue = %inputs.catalogue.display(),
        ledger = %inputs.ledger.display(),
        outdir = %layout.dir().display(),
        workers = config.workers,
        "starting massage"
    );

    let report = massage_files(&inputs, &layout, &config)
        .with_context(|| format!("massaging {}", inputs.catalogue.display()))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    report.registry.write_report(&mut out)?;
    out.flush()?;

    info!(records = report.records_written, issues = report.issues_written, "done");
    Ok(())
}
