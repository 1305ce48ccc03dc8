//! Main entry point for the MOI report collation CLI.

use clap::Parser;

use moi_collate::collate::error::CollateError;
use moi_collate::{collate, common};

/// Exit code of a run stopped by Ctrl-C.
const EXIT_INTERRUPTED: i32 = 9;

#[derive(Debug, Parser)]
#[command(
    author,
    version = common::version(),
    about = "Collate MOI reports of a batch of VCF files into one CSV report"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// Collation arguments
    #[command(flatten)]
    args: collate::Args,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.  Logs go to
    // stderr, stdout may carry the report.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_max_level(cli.common.tracing_level())
        .compact()
        .finish();

    let result = tracing::subscriber::with_default(collector, || {
        tracing::info!("moi-collate startup -- collating MOI reports...");

        collate::run(&cli.common, &cli.args)?;

        tracing::info!("All done. Have a nice day!");

        Ok::<(), anyhow::Error>(())
    });

    if let Err(err) = &result {
        if let Some(CollateError::Interrupted) = err.downcast_ref::<CollateError>() {
            eprintln!("Program interrupted. Exiting.");
            std::process::exit(EXIT_INTERRUPTED);
        }
    }
    result
}
