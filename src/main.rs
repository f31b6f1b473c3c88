#![allow(clippy::too_many_arguments)]

mod cli;

use clap::Parser;
use log::LevelFilter;
use std::process::ExitCode;

use tessera::logger;

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    // Initialize run log (overwrites previous run log)
    logger::init(if args.verbose { LevelFilter::Debug } else { LevelFilter::Info });

    cli::run(args)
}
