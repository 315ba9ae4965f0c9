//! Recurgen Command Line Interface
//!
//! Usage:
//!   recurgen [OPTIONS]
//!   recurgen --help
//!
//! Examples:
//!   recurgen                              # Generate everything into ./generated
//!   recurgen --emit layered --only HermiteE
//!   recurgen --emit json --only Legendre  # Dump a definition as JSON
//!   recurgen --list                       # List catalog recurrences

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info};
use recurgen::codegen::Optimization;
use recurgen::orchestrator::{generate_all, GenerateOptions};
use recurgen::{catalog, recurrence::Recurrence};
use std::path::PathBuf;

/// Recurgen - Recurrence Relation Code Generator
#[derive(Parser, Debug)]
#[command(name = "recurgen")]
#[command(version)]
#[command(about = "Compile recurrence relations to specialized C++ template code", long_about = None)]
struct Cli {
    /// Output directory for generated headers
    #[arg(short, long, value_name = "DIR", default_value = "generated")]
    out_dir: PathBuf,

    /// What to emit
    #[arg(long, default_value = "all")]
    emit: EmitKind,

    /// Generate only the named recurrence
    #[arg(long, value_name = "NAME")]
    only: Option<String>,

    /// List catalog recurrences and exit
    #[arg(long)]
    list: bool,

    /// Disable common subexpression elimination
    #[arg(long)]
    no_cse: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitKind {
    /// Per-value specialization headers
    Pervalue,
    /// Layered headers
    Layered,
    /// Runtime dispatcher headers
    Dispatch,
    /// Recurrence definitions as JSON
    Json,
    /// Everything
    All,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("recurgen v{}", recurgen::VERSION);

    let recs = select_recurrences(&cli)?;
    debug!("selected {} recurrence(s)", recs.len());

    if cli.list {
        for rec in &recs {
            println!(
                "{:<16} indices: [{}]  runtime: [{}]",
                rec.name,
                rec.indices.join(", "),
                rec.runtime_vars.join(", ")
            );
        }
        return Ok(());
    }

    // Handle --emit json early exit
    if matches!(cli.emit, EmitKind::Json) {
        let json = serde_json::to_string_pretty(&recs).context("failed to serialize definitions")?;
        println!("{}", json);
        return Ok(());
    }

    let opts = GenerateOptions {
        out_dir: cli.out_dir.clone(),
        per_value: matches!(cli.emit, EmitKind::Pervalue | EmitKind::All),
        layered: matches!(cli.emit, EmitKind::Layered | EmitKind::All),
        dispatch: matches!(cli.emit, EmitKind::Dispatch | EmitKind::All),
        optimization: if cli.no_cse {
            Optimization::None
        } else {
            Optimization::Cse
        },
    };

    let report = generate_all(&recs, &opts)?;
    println!(
        "Generated {} headers in {:?}",
        report.files.len(),
        cli.out_dir
    );
    for (name, reason) in &report.layered_skips {
        debug!("layered skip: {}: {}", name, reason);
    }
    Ok(())
}

fn select_recurrences(cli: &Cli) -> Result<Vec<Recurrence>> {
    match &cli.only {
        Some(name) => match catalog::by_name(name)? {
            Some(rec) => Ok(vec![rec]),
            None => bail!("no catalog recurrence named `{}` (use --list)", name),
        },
        None => Ok(catalog::all()?),
    }
}
