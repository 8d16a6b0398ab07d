use std::{
    error::Error,
    fs::File,
    path::{Path, PathBuf},
};

use located_error::*;

use clap::{Parser, Subcommand};
use serde::{Serialize, Deserialize};
use log::debug;
use anyhow::{anyhow, Result};

mod error;
pub use error::ParserError;

#[derive(Parser, Debug, Serialize, Deserialize)]
#[clap(name="tsinfer-rs", author, version, about, long_about = None)]
#[clap(propagate_version = true)]
/// tsinfer-rs: reconstruct a tree sequence from a binary variant-call matrix.
pub struct Cli {
    ///Set the verbosity level (-v -vv -vvv)
    ///
    /// Set the verbosity level of this program. Multiple levels allowed {n}
    ///
    /// -v: Info  |  -vv: Debug  | -vvv: Trace {n}
    ///
    /// Note that the program will still output warnings by default, even when this flag is off.
    /// Use the --quiet/-q flag to disable them
    #[clap(short='v', long, parse(from_occurrences), global=true)]
    pub verbose: u8,

    /// Disable warnings.
    ///
    /// By default, warnings are emmited and redirected to the console, even when verbose mode is off.
    /// Use this argument to disable this. Only errors will be displayed.
    #[clap(short='q', long, global=true)]
    pub quiet: bool,

    #[clap(subcommand)]
    pub commands: Commands,
}

impl Cli {
    /// Serialize command line arguments within a `.yaml` file.
    ///
    /// # Behavior
    /// - File naming follows the convention '{current time}-{module name}.yaml'. current time follows the format
    ///   `YYYY`-`MM`-`DD`T`hhmmss`
    /// - File is written at the root of the user-provided `--output-dir` folder.
    ///
    /// # Errors
    /// Sends an unrecoverable error if `serde_yaml` fails to parse `Self` to a string.
    pub fn serialize(&self) -> Result<(), Box<dyn Error>> {
        let serialized = serde_yaml::to_string(&self)
            .map_err(|err| format!("Failed to serialize command line arguments. got [{err}]"))?;

        debug!("\n---- Command line args ----\n{}\n---", serialized);

        let current_time = chrono::offset::Local::now().format("%Y-%m-%dT%H%M%S").to_string();

        let output_file = match &self.commands {
            Commands::Infer(infer) => {
                let dir_string = infer.output_dir.to_str().expect("Invalid characters in directory");
                format!("{dir_string}/{current_time}-infer.yaml")
            },
            Commands::FromYaml {yaml: _} => return Ok(()),
        };

        match std::fs::write(&output_file, serialized) {
            Err(e) => Err(format!("Unable to serialize arguments into {output_file}: [{e}]").into()),
            Ok(()) => Ok(()),
        }
    }

    /// Deserialize a `.yaml` file into Command line arguments.
    ///
    /// # Errors
    ///
    /// - Returns an I/O error if the provided `.yaml` is invalid, or does not carry read permissions
    /// - Sends an unrecoverable error if `serde_yaml` fails to parse the provided file to `Self`.
    pub fn deserialize(yaml: PathBuf) -> Result<Self, Box<dyn Error>> {
        Ok(serde_yaml::from_reader(File::open(yaml)?)?)
    }
}

#[derive(Subcommand, Debug, Serialize, Deserialize)]
pub enum Commands {
    /// Synthesize a demonstration genotype matrix and run the full
    /// ancestor-synthesis / tree-sequence-matching pipeline over it.
    Infer(InferArgs),

    /// Re-run tsinfer-rs using a previously serialized `.yaml` configuration file.
    ///
    /// This allows users to easily re-apply a command using the exact same parameters
    /// and arguments.
    FromYaml {
        yaml: PathBuf,
    },
}

#[derive(Parser, Debug, Serialize, Deserialize)]
pub struct InferArgs {
    /// Number of simulated samples in the demonstration genotype matrix.
    #[clap(short='n', long, default_value("20"))]
    pub num_samples: usize,

    /// Number of simulated biallelic sites in the demonstration genotype matrix.
    #[clap(short='s', long, default_value("200"))]
    pub num_sites: usize,

    /// Genotyping error rate fed to the Li-Stephens emission model.
    ///
    /// Expressed as a percentage (e.g. '--error-rate 0.1' means a 0.1% error rate).
    #[clap(short='e', long, default_value("0.0"), parse(try_from_str=percent_str_to_ratio))]
    pub error_rate: f64,

    /// Per-site recombination rate fed to the Li-Stephens transition model.
    ///
    /// Applied uniformly across every site; a finer-grained recombination map is out
    /// of scope for this demonstration driver.
    #[clap(short='r', long, default_value("1e-8"))]
    pub recombination_rate: f64,

    /// Resolve ties toward the ancestral allele instead of the derived allele when
    /// synthesizing ancestors.
    #[clap(long)]
    pub prefer_ancestral: bool,

    /// Seed the random genotype matrix and allele-frequency sampling with a fixed value,
    /// for reproducible runs.
    #[clap(long)]
    pub seed: Option<u64>,

    /// Output directory where results will be written.
    #[clap(short, long, default_value("tsinfer-output"), parse(try_from_os_str=valid_output_dir))]
    pub output_dir: PathBuf,

    /// Overwrite existing output files.
    #[clap(short='w', long)]
    pub overwrite: bool,
}

impl InferArgs {
    /// Sanity check: synthesizing segregating sites needs at least two samples,
    /// and there must be at least one site to synthesize.
    ///
    /// # Errors
    /// if `--num-samples` is below 2, or `--num-sites` was set to zero.
    pub fn check_dimensions(&self) -> Result<(), ParserError> {
        if self.num_samples < 2 || self.num_sites == 0 {
            return Err(ParserError::EmptyDemo);
        }
        Ok(())
    }

    /// Check if a given file already exists; raise an error if such is the case, and the
    /// user did not explicitly allow file overwriting.
    ///
    /// # Errors
    /// - If the provided `pathbuf` already exists and the user did not specifically allow for
    ///   file overwrite using the `--overwrite` argument
    pub fn can_write_file(&self, pathbuf: &Path) -> Result<bool> {
        if !self.overwrite && pathbuf.exists() {
            return Err(ParserError::CannotOverwrite(pathbuf.display().to_string()))
                .loc("While parsing command line arguments")
        }
        Ok(true)
    }
}

fn valid_output_dir(s: &std::ffi::OsStr) -> Result<PathBuf> {
    let path = Path::new(s);
    if !path.exists() {
        std::fs::create_dir(path)?;
    }
    Ok(PathBuf::from(s))
}

fn percent_str_to_ratio(s: &str) -> Result<f64> {
    use ParserError::ParseRatio;

    const MIN_PERCENT: f64 = 0.0;
    const MAX_PERCENT: f64 = 100.0;

    let percent = s.parse::<f64>()?;

    match (MIN_PERCENT..=MAX_PERCENT).contains(&percent) {
        true  => Ok(percent / 100.0),
        false => Err(anyhow!(ParseRatio(MIN_PERCENT, MAX_PERCENT))).with_loc(|| format!("While parsing {s}"))
    }
}
