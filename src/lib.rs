extern crate parser;
extern crate logger;

use parser::{Cli, Commands};

#[macro_use]
extern crate log;

use std::error::Error;

mod demo;

pub fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.commands {
        Commands::Infer(args) => {
            demo::run(&args)?;
        },

        Commands::FromYaml {yaml} => {
            let cli: Cli = match serde_yaml::from_reader(std::fs::File::open(&yaml)?) {
                Ok(cli)  => cli,
                Err(e) => return Err(format!("Unable to deserialize arguments from {yaml:?} file: [{e}]").into())
            };
            info!("Re-running from serialized arguments: {yaml:?}");
            self::run(cli)?;
        }
    };
    Ok(())
}
