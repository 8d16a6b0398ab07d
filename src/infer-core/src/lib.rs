//! Ancestor synthesis and Li-Stephens haplotype matching over a tree
//! sequence: the three components described in `SPEC_FULL.md`, composed
//! leaves-first.
//!
//! - [`ancestor_builder`] groups sites by shared genotype pattern and
//!   synthesizes candidate ancestor haplotypes from them.
//! - [`tree_sequence_builder`] holds the growing node/edge/mutation
//!   tables and the two edge orderings the matcher sweeps over.
//! - [`ancestor_matcher`] matches one haplotype at a time against the
//!   tree sequence built so far, via a forward likelihood sweep and a
//!   backward traceback.

pub mod ancestor_builder;
pub mod ancestor_matcher;
pub mod tree_sequence_builder;
pub mod types;

pub use ancestor_builder::{AncestorBuilder, AncestorBuilderError};
pub use ancestor_matcher::{AncestorMatcher, AncestorMatcherError};
pub use tree_sequence_builder::{TreeSequenceBuilder, TreeSequenceError, NODE_IS_SAMPLE};
pub use types::{
    approximately_equal, approximately_one, Edge, Likelihood, Mutation, Site, TieBreak,
    NULL_NODE, UNKNOWN_ALLELE, VIRTUAL_ROOT,
};
