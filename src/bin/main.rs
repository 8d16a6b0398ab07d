use logger;
use parser::Cli;

use std::process;
use clap::Parser;

#[macro_use]
extern crate log;

/// Parse command line arguments and run `tsinfer_rs::run()`
fn main() {
    let cli = Cli::parse();

    logger::Logger::init(cli.verbose + u8::from(!cli.quiet));

    if let Err(e) = cli.serialize() {
        warn!("Failed to serialize command line arguments: {e}");
    }

    if let Err(e) = tsinfer_rs::run(cli) {
        error!("{e}");
        process::exit(1);
    }
}
