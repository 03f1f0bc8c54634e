//! sync-gate CLI entrypoint.
//!
//! Parses the command line, runs the sanity stage over every input, and only
//! then hands the surviving records to the check pipeline with the real
//! skopeo and Cirrus-CI collaborators wired in.

use clap::Parser;
use log::warn;
use sync_gate::artifact::{self, ArtifactRecord};
use sync_gate::checks::{Collaborators, run_pipeline};
use sync_gate::cirrus::CirrusClient;
use sync_gate::cli::Cli;
use sync_gate::error::{GateError, Result};
use sync_gate::inspect::SkopeoInspector;
use sync_gate::options::ValidationOptions;
use sync_gate::report;

/// Exit status for an unusable command line.
const EXIT_USAGE: i32 = 2;

/// Input counts beyond this usually mean an unintended shell glob.
const MANY_INPUTS: usize = 9;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = match ValidationOptions::from_cli(&cli) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(EXIT_USAGE);
        }
    };

    match run(&cli, &options) {
        Ok(status) => std::process::exit(status),
        Err(err) => {
            eprintln!("Error: {err}");
            let status = match err {
                GateError::Usage { .. } => EXIT_USAGE,
                _ => report::EXIT_FAULT,
            };
            std::process::exit(status);
        }
    }
}

fn run(cli: &Cli, options: &ValidationOptions) -> Result<i32> {
    if cli.fqin_dirs.len() > MANY_INPUTS {
        warn!(
            "processing {} input directories; was a shell glob intended?",
            cli.fqin_dirs.len()
        );
    }

    let mut records: Vec<ArtifactRecord> = Vec::with_capacity(cli.fqin_dirs.len());
    for dir in &cli.fqin_dirs {
        let record = artifact::verify_artifact(dir, &records, options);
        records.push(record);
    }

    let mut stdout = std::io::stdout().lock();
    if !records.iter().all(ArtifactRecord::sanity_passed) {
        // A single structural failure makes the other checks pointless;
        // report what is known and stop.
        report::render(&records, &mut stdout)?;
        return Ok(report::exit_status(&records));
    }

    let inspector = SkopeoInspector;
    let cirrus = CirrusClient::new();
    run_pipeline(
        &mut records,
        options,
        &Collaborators {
            inspector: &inspector,
            cirrus: &cirrus,
        },
    )?;

    report::render(&records, &mut stdout)?;
    Ok(report::exit_status(&records))
}

/// Route log output through env_logger, with `--verbose` lowering the bar
/// to debug; `RUST_LOG` still wins when set.
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}
