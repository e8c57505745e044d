use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use fastwig_hash::runtime;
use fastwig_hash::{KeyGenerator, SymbolFamily, VerifyOptions, WigxjpfLibrary, test_fastwig, write_table};

#[derive(Parser, Debug)]
#[command(name = "fastwig", version, about = "Wigner symbol table lookup tools")]
struct Cli {
    /// More output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Worker threads (default: rayon's global pool)
    #[arg(long, env = "FASTWIG_THREADS", global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a table folder and check it against wigxjpf
    Verify {
        folder: PathBuf,
        /// Symbol families to check (default: every loaded family)
        #[arg(long = "family")]
        families: Vec<SymbolFamily>,
        /// Largest doubled angular momentum to enumerate
        #[arg(long, default_value_t = fastwig_hash::verify::DEFAULT_TJ)]
        tj: u32,
        /// Relative tolerance for value comparison
        #[arg(long, default_value_t = fastwig_hash::verify::DEFAULT_TOLERANCE)]
        tolerance: f64,
        #[arg(long, env = "WIGXJPF_LIB")]
        lib: PathBuf,
    },
    /// Compute a table with wigxjpf and write it (.3j/.6j/.9j or .npz)
    Build {
        out: PathBuf,
        /// Defaults to the family named by the output extension
        #[arg(long)]
        family: Option<SymbolFamily>,
        #[arg(long, default_value_t = fastwig_hash::verify::DEFAULT_TJ)]
        tj: u32,
        #[arg(long, env = "WIGXJPF_LIB")]
        lib: PathBuf,
    },
    /// Print canonical tuples and their key hashes
    Keys {
        #[arg(long, default_value = "9j")]
        family: SymbolFamily,
        #[arg(long, default_value_t = fastwig_hash::verify::DEFAULT_TJ)]
        tj: u32,
    },
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

fn out_family(out: &Path, family: Option<SymbolFamily>) -> Result<SymbolFamily> {
    if let Some(f) = family {
        return Ok(f);
    }
    out.extension()
        .and_then(|e| e.to_str())
        .and_then(|e| e.parse().ok())
        .ok_or_else(|| anyhow!("--family is required for {}", out.display()))
}

fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Command::Verify {
            folder,
            families,
            tj,
            tolerance,
            lib,
        } => {
            let eval = WigxjpfLibrary::open(&lib, tj)
                .with_context(|| format!("open {}", lib.display()))?;
            let opts = VerifyOptions {
                tj,
                families,
                tolerance,
                verbosity: cli.verbose.max(1),
                threads: cli.threads,
            };
            let report = test_fastwig(&folder, &eval, &opts)
                .with_context(|| format!("verify {}", folder.display()))?;
            println!(
                "generated {} found {} missing {} mismatched {}",
                report.generated, report.found, report.missing, report.mismatched
            );
            Ok(report.exit_code())
        }
        Command::Build {
            out,
            family,
            tj,
            lib,
        } => {
            let family = out_family(&out, family)?;
            let eval = WigxjpfLibrary::open(&lib, tj)
                .with_context(|| format!("open {}", lib.display()))?;
            let generator = KeyGenerator::new(family, tj)?;
            let entries = runtime::run_on(cli.threads, || {
                generator.compute_entries(&eval, cli.verbose > 0)
            })??;
            if let Some(parent) = out.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("create dir {}", parent.display()))?;
                }
            }
            let table_family = write_table(&out, family, &entries)
                .with_context(|| format!("write {}", out.display()))?;
            info!(path = %out.display(), %family, %table_family, records = entries.len(), "table written");
            Ok(0)
        }
        Command::Keys { family, tj } => {
            let generator = KeyGenerator::new(family, tj)?;
            for t in generator.tuples() {
                let key = family.encode(&t)?;
                println!("{:?}\t{}\t{:016x}", t.as_slice(), key, key.hash64());
            }
            Ok(0)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(255)
        }
    }
}
