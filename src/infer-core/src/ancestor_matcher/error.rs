use thiserror::Error;

#[derive(Error, Debug)]
pub enum AncestorMatcherError {
    #[error("haplotype length {got} does not match the tree sequence's {expected} sites")]
    HaplotypeLengthMismatch { got: usize, expected: usize },

    #[error("match buffer length {got} does not match the tree sequence's {expected} sites")]
    MatchBufferLengthMismatch { got: usize, expected: usize },

    #[error("match window [{start}, {end}) is empty or inverted")]
    EmptyMatchWindow { start: usize, end: usize },

    #[error("match window end {end} exceeds the tree sequence's {num_sites} sites")]
    WindowOutOfRange { end: usize, num_sites: usize },
}
