//! Shared types for the tree sequence inference core.

/// Sentinel allele value for sites outside a match window, or for
/// positions an ancestor haplotype never extended to.
pub const UNKNOWN_ALLELE: u8 = 255;

/// Sentinel node id meaning "no node" (an absent parent, an absent
/// mutation node, etc). Mirrors `msprime.NULL_NODE` in the reference
/// implementation.
pub const NULL_NODE: i64 = -1;

/// The implicit root of every tree; always node 0, always has
/// `time == f64::INFINITY` conceptually (in practice the oldest time
/// assigned by the caller) and no parent.
pub const VIRTUAL_ROOT: usize = 0;

/// A single genomic site: a position on the chromosome, plus (for
/// sites the builder has not yet discarded) the observed genotype
/// column and derived-allele frequency computed from it.
#[derive(Debug, Clone)]
pub struct Site {
    pub id: usize,
    pub frequency: usize,
    /// Retained only while `frequency > 1`; the [`AncestorBuilder`]
    /// drops it as soon as a site is known to contribute no ancestor.
    ///
    /// [`AncestorBuilder`]: crate::ancestor_builder::AncestorBuilder
    pub genotypes: Option<Vec<u8>>,
}

/// A parent-child relationship over a half-open genomic interval
/// `[left, right)`, expressed as site indices. Edges are immutable
/// once appended to a [`TreeSequenceBuilder`].
///
/// [`TreeSequenceBuilder`]: crate::tree_sequence_builder::TreeSequenceBuilder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub left: u32,
    pub right: u32,
    pub parent: u32,
    pub child: u32,
}

impl Edge {
    #[must_use]
    pub fn new(left: u32, right: u32, parent: u32, child: u32) -> Self {
        Self { left, right, parent, child }
    }
}

/// One entry in a site's mutation list: the node on which the allele
/// arose (or reverted), and the state it transitions to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutation {
    pub node: u32,
    pub derived_state: i8,
}

/// The tagged-union view of a per-node forward likelihood, as
/// described in the design notes: the hot per-site loop works directly
/// on the dense `f64` sentinel encoding (`-2.0` / `-1.0` / `>= 0.0`),
/// but callers inspecting a `traceback` snapshot get this explicit
/// enum instead of re-deriving the sentinel meaning themselves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Likelihood {
    /// Node is not part of the currently active tree (or is a
    /// disconnected non-zero root).
    NonTree,
    /// Node's value is identical to its nearest ancestor's; the actual
    /// value must be looked up by walking `parent[]`.
    Compressed,
    /// An explicit forward value.
    Value(f64),
}

impl Likelihood {
    pub(crate) const NON_TREE: f64 = -2.0;
    pub(crate) const COMPRESSED: f64 = -1.0;

    #[must_use]
    pub fn from_raw(raw: f64) -> Self {
        if raw == Self::NON_TREE {
            Likelihood::NonTree
        } else if raw == Self::COMPRESSED {
            Likelihood::Compressed
        } else {
            Likelihood::Value(raw)
        }
    }
}

/// Policy for the tie-break step in [`AncestorBuilder`]'s consensus
/// sweep when a candidate site has an equal count of ones and zeros
/// within the current sample set.
///
/// [`AncestorBuilder`]: crate::ancestor_builder::AncestorBuilder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Always resolve ties toward the derived allele (`1`). This is
    /// the reference implementation's behavior and the default here,
    /// kept for reproducibility.
    #[default]
    PreferDerived,
    /// Resolve ties toward the ancestral allele (`0`). Provided for
    /// symmetry; not used by the reference implementation.
    PreferAncestral,
}

/// Approximate equality as used by the traceback: relative tolerance
/// `1e-9`, zero absolute tolerance. Mirrors Python's `math.isclose`
/// with its default `rel_tol`.
#[must_use]
pub fn approximately_equal(a: f64, b: f64) -> bool {
    const REL_TOL: f64 = 1e-9;
    (a - b).abs() <= REL_TOL * a.abs().max(b.abs())
}

#[must_use]
pub fn approximately_one(a: f64) -> bool {
    approximately_equal(a, 1.0)
}
