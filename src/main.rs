use std::process::ExitCode;

use clap::Parser;

use shaderstack::{cli, logger};

fn main() -> ExitCode {
    let args = cli::Cli::parse();

    // Initialize session log (overwrites previous session log)
    logger::init(args.verbose);

    match cli::run(args) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
