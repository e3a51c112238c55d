//! Per-translation-unit front end for the instrumentation pass.
//!
//! The C parser (an external tool) writes the typed AST of one
//! translation unit as JSON; this binary runs the pass over it and
//! writes the instrumented AST back as JSON. The build system invokes
//! it once per unit, serialized across units sharing a state
//! directory, and cleans the append-only record files before the first
//! unit of a build.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use symbex_core::ast::TranslationUnit;
use symbex_instrument::{instrument_translation_unit, InstrumentOptions};

#[derive(Parser)]
#[command(name = "symbex", about = "Instrument a C translation unit for concolic testing")]
struct Cli {
    /// Typed AST of the translation unit, as JSON.
    input: PathBuf,

    /// Where to write the instrumented AST (JSON).
    #[arg(short, long)]
    output: PathBuf,

    /// Directory for counters and the branches/cfg record files.
    #[arg(long, default_value = "./symbex-state/")]
    state_dir: PathBuf,

    /// Additional function names to leave uninstrumented.
    #[arg(long = "skip")]
    skip: Vec<String>,

    /// Log progress details to stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("symbex: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let text = fs::read_to_string(&cli.input)?;
    let mut tu: TranslationUnit = serde_json::from_str(&text)?;

    let options = InstrumentOptions {
        state_dir: cli.state_dir.clone(),
        extra_skip: cli.skip.clone(),
    };
    let report = instrument_translation_unit(&mut tu, &options)?;
    info!(
        functions = report.functions,
        statements = report.statements,
        branch_pairs = report.branch_pairs,
        calls = report.calls_emitted,
        "translation unit instrumented"
    );

    fs::write(&cli.output, serde_json::to_string_pretty(&tu)?)?;
    Ok(())
}
