//! Holds the append-only node table, edge set, and per-site mutation
//! list of the tree sequence under construction, and exposes the two
//! edge orderings the matcher needs to sweep trees along the genome.
//!
//! See `SPEC_FULL.md` §4.2.

mod error;
pub use error::TreeSequenceError;

use std::collections::BTreeMap;

use crate::types::{Edge, Mutation};

/// Node flag bit meaning "this node is a sample", mirroring the
/// `tskit`/`msprime` convention of a `uint32` flags column.
pub const NODE_IS_SAMPLE: u32 = 1;

/// Append-only tree sequence under construction.
///
/// Node 0 is not special-cased by this type; by convention the caller
/// adds it first (as the "virtual root" / ultimate ancestor), with a
/// `time` greater than every node that will ever attach beneath it.
pub struct TreeSequenceBuilder {
    positions: Vec<f64>,
    recombination_rate: Vec<f64>,
    time: Vec<f64>,
    flags: Vec<u32>,
    edges: Vec<Edge>,
    /// Permutation of `0..edges.len()` in removal order: ascending on
    /// `(right, -time[parent])`.
    removal_order: Vec<u32>,
    mutations: BTreeMap<usize, Vec<Mutation>>,
}

impl TreeSequenceBuilder {
    pub fn new(positions: Vec<f64>, recombination_rate: Vec<f64>) -> Result<Self, TreeSequenceError> {
        for w in positions.windows(2) {
            if !(w[0] < w[1]) {
                return Err(TreeSequenceError::NonMonotonicPosition {
                    index: 1, index_prev: 0, got: w[1], prev: w[0],
                });
            }
        }
        if positions.len() != recombination_rate.len() {
            return Err(TreeSequenceError::MismatchedBatchLengths {
                left: positions.len(), other_name: "recombination_rate", other: recombination_rate.len(),
            });
        }
        Ok(Self {
            positions,
            recombination_rate,
            time: Vec::new(),
            flags: Vec::new(),
            edges: Vec::new(),
            removal_order: Vec::new(),
            mutations: BTreeMap::new(),
        })
    }

    #[must_use] pub fn num_nodes(&self) -> usize { self.time.len() }
    #[must_use] pub fn num_edges(&self) -> usize { self.edges.len() }
    #[must_use] pub fn num_sites(&self) -> usize { self.positions.len() }
    #[must_use] pub fn num_mutations(&self) -> usize {
        self.mutations.values().map(Vec::len).sum()
    }

    #[must_use] pub fn time(&self, node: u32) -> f64 { self.time[node as usize] }
    #[must_use] pub fn flags(&self, node: u32) -> u32 { self.flags[node as usize] }
    #[must_use] pub fn edges(&self) -> &[Edge] { &self.edges }
    #[must_use] pub fn removal_order(&self) -> &[u32] { &self.removal_order }
    #[must_use] pub fn positions(&self) -> &[f64] { &self.positions }
    #[must_use] pub fn recombination_rate(&self) -> &[f64] { &self.recombination_rate }

    #[must_use]
    pub fn mutations_at(&self, site: usize) -> Option<&[Mutation]> {
        self.mutations.get(&site).map(Vec::as_slice)
    }

    /// Appends a single node and returns its id.
    pub fn add_node(&mut self, time: f64, is_sample: bool) -> u32 {
        self.time.push(time);
        self.flags.push(if is_sample { NODE_IS_SAMPLE } else { 0 });
        u32::try_from(self.time.len() - 1).expect("node count fits in u32")
    }

    /// Bulk-appends nodes at the given (parallel) times, all non-samples
    /// except as marked; used when reloading a previously dumped state.
    pub fn restore_nodes(&mut self, times: &[f64], flags: &[u32]) -> Result<(), TreeSequenceError> {
        if times.len() != flags.len() {
            return Err(TreeSequenceError::MismatchedBatchLengths {
                left: times.len(), other_name: "flags", other: flags.len(),
            });
        }
        self.time.extend_from_slice(times);
        self.flags.extend_from_slice(flags);
        Ok(())
    }

    pub fn restore_edges(
        &mut self,
        left: &[u32], right: &[u32], parent: &[u32], child: &[u32],
    ) -> Result<(), TreeSequenceError> {
        self.append_edges(left, right, parent, child)?;
        self.reindex_edges();
        Ok(())
    }

    pub fn restore_mutations(
        &mut self,
        site: &[usize], node: &[u32], derived_state: &[i8],
    ) -> Result<(), TreeSequenceError> {
        self.append_mutations(site, node, derived_state)
    }

    fn append_edges(
        &mut self,
        left: &[u32], right: &[u32], parent: &[u32], child: &[u32],
    ) -> Result<(), TreeSequenceError> {
        if left.len() != right.len() {
            return Err(TreeSequenceError::MismatchedBatchLengths { left: left.len(), other_name: "right", other: right.len() });
        }
        if left.len() != parent.len() {
            return Err(TreeSequenceError::MismatchedBatchLengths { left: left.len(), other_name: "parent", other: parent.len() });
        }
        if left.len() != child.len() {
            return Err(TreeSequenceError::MismatchedBatchLengths { left: left.len(), other_name: "child", other: child.len() });
        }
        let num_nodes = self.num_nodes();
        for (&p, &c) in parent.iter().zip(child.iter()) {
            if p as usize >= num_nodes {
                return Err(TreeSequenceError::NodeOutOfRange { node: p, num_nodes });
            }
            if c as usize >= num_nodes {
                return Err(TreeSequenceError::NodeOutOfRange { node: c, num_nodes });
            }
            let (pt, ct) = (self.time[p as usize], self.time[c as usize]);
            if !(pt > ct) {
                return Err(TreeSequenceError::EdgeTimeViolation { parent: p, child: c, parent_time: pt, child_time: ct });
            }
        }
        for i in 0..left.len() {
            self.edges.push(Edge::new(left[i], right[i], parent[i], child[i]));
        }
        Ok(())
    }

    fn append_mutations(
        &mut self,
        site: &[usize], node: &[u32], derived_state: &[i8],
    ) -> Result<(), TreeSequenceError> {
        if site.len() != node.len() {
            return Err(TreeSequenceError::MismatchedBatchLengths { left: site.len(), other_name: "node", other: node.len() });
        }
        if site.len() != derived_state.len() {
            return Err(TreeSequenceError::MismatchedBatchLengths { left: site.len(), other_name: "derived_state", other: derived_state.len() });
        }
        let num_sites = self.num_sites();
        for (i, &s) in site.iter().enumerate() {
            if s >= num_sites {
                return Err(TreeSequenceError::SiteOutOfRange { site: s, num_sites });
            }
            self.mutations.entry(s).or_default().push(Mutation { node: node[i], derived_state: derived_state[i] });
        }
        Ok(())
    }

    /// Atomically appends `num_new_nodes` nodes at `time`, appends the
    /// given edges and mutations, and re-indexes both edge orderings.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        num_new_nodes: usize,
        time: f64,
        left: &[u32], right: &[u32], parent: &[u32], child: &[u32],
        site: &[usize], node: &[u32], derived_state: &[i8],
    ) -> Result<(), TreeSequenceError> {
        for _ in 0..num_new_nodes {
            self.add_node(time, false);
        }
        self.append_edges(left, right, parent, child)?;
        self.append_mutations(site, node, derived_state)?;
        self.reindex_edges();
        log::trace!(
            "update: +{} nodes, +{} edges, +{} mutations, now {} edges total",
            num_new_nodes, left.len(), site.len(), self.edges.len(),
        );
        Ok(())
    }

    /// Re-sorts `edges` into insertion order `(left, time[parent])` and
    /// recomputes `removal_order` as a permutation sorted by
    /// `(right, -time[parent])`. Both derived orderings are global:
    /// every call recomputes them from scratch, so indices do not
    /// survive across `update` calls.
    fn reindex_edges(&mut self) {
        let time = &self.time;
        self.edges.sort_by(|a, b| {
            let key_a = (a.left, OrderedFloat(time[a.parent as usize]));
            let key_b = (b.left, OrderedFloat(time[b.parent as usize]));
            key_a.cmp(&key_b)
        });

        let m = self.edges.len();
        let mut order: Vec<u32> = (0..u32::try_from(m).expect("edge count fits in u32")).collect();
        order.sort_by(|&i, &j| {
            let e_i = &self.edges[i as usize];
            let e_j = &self.edges[j as usize];
            let key_i = (e_i.right, OrderedFloat(-time[e_i.parent as usize]));
            let key_j = (e_j.right, OrderedFloat(-time[e_j.parent as usize]));
            key_i.cmp(&key_j)
        });
        self.removal_order = order;
    }

    #[must_use]
    pub fn dump_nodes(&self) -> (Vec<u32>, Vec<f64>) {
        (self.flags.clone(), self.time.clone())
    }

    #[must_use]
    pub fn dump_edges(&self) -> (Vec<u32>, Vec<u32>, Vec<u32>, Vec<u32>) {
        let mut left = Vec::with_capacity(self.edges.len());
        let mut right = Vec::with_capacity(self.edges.len());
        let mut parent = Vec::with_capacity(self.edges.len());
        let mut child = Vec::with_capacity(self.edges.len());
        for e in &self.edges {
            left.push(e.left);
            right.push(e.right);
            parent.push(e.parent);
            child.push(e.child);
        }
        (left, right, parent, child)
    }

    /// Produces `(site, node, derived_state, parent)` rows, `parent`
    /// being `-1` for the first mutation at a site and the prior row's
    /// index for any subsequent back-mutation, ordered by ascending
    /// site id.
    #[must_use]
    pub fn dump_mutations(&self) -> (Vec<u32>, Vec<u32>, Vec<i8>, Vec<i32>) {
        let num_mutations = self.num_mutations();
        let mut site = Vec::with_capacity(num_mutations);
        let mut node = Vec::with_capacity(num_mutations);
        let mut derived_state = Vec::with_capacity(num_mutations);
        let mut parent = Vec::with_capacity(num_mutations);
        let mut j: i32 = 0;
        for (&s, muts) in &self.mutations {
            let first_row = j;
            for m in muts {
                site.push(u32::try_from(s).expect("site id fits in u32"));
                node.push(m.node);
                derived_state.push(m.derived_state);
                parent.push(if m.derived_state == 0 { first_row } else { -1 });
                j += 1;
            }
        }
        (site, node, derived_state, parent)
    }
}

/// A minimal total-order wrapper for `f64` sort keys. Tree sequence
/// times are always finite (no `NaN`) by construction; this only
/// exists so `Vec::sort_by` can compare `(u32, f64)` tuples.
#[derive(PartialEq, PartialOrd, Clone, Copy)]
struct OrderedFloat(f64);
impl Eq for OrderedFloat {}
impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).expect("times must never be NaN")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(n: usize) -> Vec<f64> { (0..n).map(|i| (i + 1) as f64).collect() }

    #[test]
    fn rejects_non_monotonic_positions() {
        let err = TreeSequenceBuilder::new(vec![1.0, 1.0, 3.0], vec![0.0; 3]).unwrap_err();
        assert!(matches!(err, TreeSequenceError::NonMonotonicPosition { .. }));
    }

    #[test]
    fn add_node_assigns_sequential_ids() {
        let mut tsb = TreeSequenceBuilder::new(positions(2), vec![0.0; 2]).unwrap();
        let root = tsb.add_node(10.0, false);
        let child = tsb.add_node(1.0, true);
        assert_eq!(root, 0);
        assert_eq!(child, 1);
        assert_eq!(tsb.num_nodes(), 2);
        assert_eq!(tsb.flags(child), NODE_IS_SAMPLE);
    }

    #[test]
    fn update_rejects_edge_violating_time_invariant() {
        let mut tsb = TreeSequenceBuilder::new(positions(2), vec![0.0; 2]).unwrap();
        tsb.add_node(1.0, false); // node 0, time 1
        tsb.add_node(2.0, true);  // node 1, time 2 -- older than its "parent" 0
        let err = tsb.update(0, 0.0, &[0], &[2], &[0], &[1], &[], &[], &[]).unwrap_err();
        assert!(matches!(err, TreeSequenceError::EdgeTimeViolation { parent: 0, child: 1, .. }));
    }

    #[test]
    fn reindex_orders_edges_by_left_then_parent_time_ascending() {
        let mut tsb = TreeSequenceBuilder::new(positions(4), vec![0.0; 4]).unwrap();
        tsb.add_node(10.0, false); // 0: root
        tsb.add_node(5.0, false);  // 1
        tsb.add_node(1.0, true);   // 2
        tsb.add_node(1.0, true);   // 3
        tsb.update(
            0, 0.0,
            &[0, 2, 0, 2], &[2, 4, 2, 4], &[0, 1, 1, 0], &[1, 2, 3, 1],
            &[], &[], &[],
        ).unwrap();

        let edges = tsb.edges();
        for w in edges.windows(2) {
            let key_a = (w[0].left, tsb.time(w[0].parent));
            let key_b = (w[1].left, tsb.time(w[1].parent));
            assert!(key_a <= key_b, "insertion order violated: {key_a:?} > {key_b:?}");
        }
        let removal = tsb.removal_order();
        for w in removal.windows(2) {
            let e_a = edges[w[0] as usize];
            let e_b = edges[w[1] as usize];
            let key_a = (e_a.right, -tsb.time(e_a.parent));
            let key_b = (e_b.right, -tsb.time(e_b.parent));
            assert!(key_a <= key_b, "removal order violated: {key_a:?} > {key_b:?}");
        }
    }

    #[test]
    fn dump_mutations_back_mutation_parent_points_at_first_row() {
        let mut tsb = TreeSequenceBuilder::new(positions(1), vec![0.0; 1]).unwrap();
        tsb.add_node(2.0, false);
        tsb.add_node(1.0, true);
        tsb.update(0, 0.0, &[], &[], &[], &[], &[0, 0], &[0, 1], &[1, 0]).unwrap();
        let (site, node, derived_state, parent) = tsb.dump_mutations();
        assert_eq!(site, vec![0, 0]);
        assert_eq!(node, vec![0, 1]);
        assert_eq!(derived_state, vec![1, 0]);
        assert_eq!(parent, vec![-1, 0]);
    }

    #[test]
    fn num_mutations_sums_across_sites() {
        let mut tsb = TreeSequenceBuilder::new(positions(2), vec![0.0; 2]).unwrap();
        tsb.add_node(1.0, false);
        tsb.update(0, 0.0, &[], &[], &[], &[], &[0, 1], &[0, 0], &[1, 1]).unwrap();
        assert_eq!(tsb.num_mutations(), 2);
    }
}
