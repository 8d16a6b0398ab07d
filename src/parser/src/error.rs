use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("The provided value must lie between {0} and {1}")]
    ParseRatio(f64, f64),

    #[error("{0} already exists. Use --overwrite to force.")]
    CannotOverwrite(String),

    #[error("--num-samples must be at least 2 and --num-sites must be greater than zero")]
    EmptyDemo,
}
