use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeSequenceError {
    #[error("positions must be strictly increasing: position[{index}] = {got} <= position[{index_prev}] = {prev}")]
    NonMonotonicPosition { index: usize, index_prev: usize, got: f64, prev: f64 },

    #[error("edge parent {parent} has time {parent_time} which is not strictly greater than child {child}'s time {child_time}")]
    EdgeTimeViolation { parent: u32, child: u32, parent_time: f64, child_time: f64 },

    #[error("node {node} is out of range for a tree sequence with {num_nodes} nodes")]
    NodeOutOfRange { node: u32, num_nodes: usize },

    #[error("site {site} is out of range for a tree sequence with {num_sites} sites")]
    SiteOutOfRange { site: usize, num_sites: usize },

    #[error("update() was given mismatched batch lengths: {left} lefts vs {other_name} has {other}")]
    MismatchedBatchLengths { left: usize, other_name: &'static str, other: usize },
}
