use thiserror::Error;

#[derive(Error, Debug)]
pub enum AncestorBuilderError {
    #[error("site {site_id} is out of range for a builder constructed with {num_sites} sites")]
    SiteOutOfRange { site_id: usize, num_sites: usize },

    #[error("genotype vector for site {site_id} has length {got}, expected {expected}")]
    GenotypeLengthMismatch { site_id: usize, got: usize, expected: usize },

    #[error("cannot build an ancestor from an empty focal-site list")]
    EmptyFocalSites,
}
