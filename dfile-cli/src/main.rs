use std::{path::PathBuf, process::ExitCode};

use clap::{ArgAction, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod convert;

const PROGRAM: &str = "dbf2dff";

/// Convert a dBase III table (.dbf, plus .dbt memos) into Dfile store and
/// index files.
#[derive(Debug, Parser)]
#[command(name = PROGRAM, version, about, long_about = None)]
struct Cli {
    /// dBase table, with or without its .dbf extension
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Split into one file pair per first character of field N (1-based)
    #[arg(value_name = "N", short = 's', long = "split")]
    split: Option<usize>,

    /// Name of the output files [default: FILE's base name]
    #[arg(value_name = "NAME", short = 'o', long = "output")]
    output: Option<String>,

    /// Model name shared by a family of converted files [default: NAME]
    #[arg(value_name = "MODEL", short = 'm', long = "model")]
    model: Option<String>,

    /// Directory to write into [default: $DFILE_OUTPUT_DIR or .]
    #[arg(value_name = "DIR", short = 'd', long = "dir")]
    dir: Option<PathBuf>,

    /// Mark records as protected from editing
    #[arg(short = 'p', long = "protect-records", action = ArgAction::SetTrue)]
    protect_records: bool,

    /// Mark files as protected from editing
    #[arg(short = 'P', long = "protect-file", action = ArgAction::SetTrue)]
    protect_file: bool,

    /// Convert records dBase marked as deleted
    #[arg(short = 'u', long = "undelete", action = ArgAction::SetTrue)]
    undelete: bool,

    /// No progress reports
    #[arg(short = 't', long = "terse", action = ArgAction::SetTrue)]
    terse: bool,

    /// Increase verbosity (-v, -vv). Use -q to quiet.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only report errors. Overrides -v.
    #[arg(short = 'q', long, action = ArgAction::SetTrue)]
    quiet: bool,
}

impl Cli {
    /// Default log directive when `RUST_LOG` is not set.
    fn log_directive(&self) -> String {
        if self.quiet {
            return "error".to_string();
        }
        match self.verbose {
            0 => dfile_config::CONFIG.log_level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    }
}

fn setup_tracing(directive: String) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| directive.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing(cli.log_directive());

    match convert::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{PROGRAM}: {err:#}");
            ExitCode::FAILURE
        }
    }
}
