//! Li-Stephens haplotype matching over a [`TreeSequenceBuilder`]: sweeps
//! a forward likelihood table tree-by-tree along the genome, then
//! traces back through the stored snapshots to emit a mosaic of edges.
//!
//! See `SPEC_FULL.md` §4.3. This is the largest of the three
//! subsystems, and the only one that walks the tree topology directly.

mod error;
pub use error::AncestorMatcherError;

use std::collections::HashMap;

use crate::tree_sequence_builder::TreeSequenceBuilder;
use crate::types::{approximately_one, Likelihood, NULL_NODE, UNKNOWN_ALLELE};

/// Returns whether `u` is a descendant of `v` along the current tree
/// (`v` on the path from `u` to the root), or `false` if `v` is
/// [`NULL_NODE`].
fn is_descendant(parent: &[i64], u: i64, v: i64) -> bool {
    if v == NULL_NODE {
        return false;
    }
    let mut w = u;
    while w != v && w != NULL_NODE {
        w = parent[w as usize];
    }
    w == v
}

fn max_likelihood_traceback_node(l: &HashMap<u32, f64>) -> u32 {
    let mut best = None;
    let mut max_l = -1.0;
    for (&u, &v) in l {
        if v > max_l {
            max_l = v;
            best = Some(u);
        }
    }
    best.expect("a traceback snapshot taken while likelihood_nodes was non-empty")
}

struct OutputEdge {
    left: usize,
    right: usize,
    parent: u32,
}

/// Matches one haplotype at a time against the tree sequence built so
/// far, producing the edges that attach it as a new path.
///
/// Holds no state across calls to [`Self::find_path`] beyond
/// `error_rate`; every call re-derives the tree topology and
/// likelihoods from the current [`TreeSequenceBuilder`] contents, so a
/// single matcher can be reused across ancestors and, later, samples.
pub struct AncestorMatcher<'a> {
    tree_sequence_builder: &'a TreeSequenceBuilder,
    error_rate: f64,
    num_sites: usize,

    parent: Vec<i64>,
    left_child: Vec<i64>,
    right_child: Vec<i64>,
    left_sib: Vec<i64>,
    right_sib: Vec<i64>,
    likelihood: Vec<f64>,
    likelihood_nodes: Vec<u32>,
    traceback: Vec<HashMap<u32, f64>>,
    mean_traceback_size: f64,
}

impl<'a> AncestorMatcher<'a> {
    #[must_use]
    pub fn new(tree_sequence_builder: &'a TreeSequenceBuilder, error_rate: f64) -> Self {
        let num_sites = tree_sequence_builder.num_sites();
        Self {
            tree_sequence_builder,
            error_rate,
            num_sites,
            parent: Vec::new(),
            left_child: Vec::new(),
            right_child: Vec::new(),
            left_sib: Vec::new(),
            right_sib: Vec::new(),
            likelihood: Vec::new(),
            likelihood_nodes: Vec::new(),
            traceback: Vec::new(),
            mean_traceback_size: 0.0,
        }
    }

    /// Mean number of entries per traceback snapshot over the last
    /// [`Self::find_path`] call; a crude proxy for how much the tree
    /// compressed the likelihood table.
    #[must_use]
    pub fn mean_traceback_size(&self) -> f64 {
        self.mean_traceback_size
    }

    fn is_nonzero_root(&self, u: u32) -> bool {
        u != 0 && self.parent[u as usize] == NULL_NODE && self.left_child[u as usize] == NULL_NODE
    }

    fn max_likelihood_node(&self) -> u32 {
        let mut best = None;
        let mut max_l = -1.0;
        for &u in &self.likelihood_nodes {
            let l = self.likelihood[u as usize];
            if l > max_l {
                max_l = l;
                best = Some(u);
            }
        }
        best.expect("find_path always keeps node 0 in likelihood_nodes")
    }

    fn check_likelihoods(&self) {
        for &u in &self.likelihood_nodes {
            debug_assert!(self.likelihood[u as usize] >= 0.0);
        }
        for (u, &v) in self.likelihood.iter().enumerate() {
            if v >= 0.0 {
                debug_assert!(self.likelihood_nodes.contains(&(u as u32)));
            }
            if u != 0 && self.parent[u] == NULL_NODE && self.left_child[u] == NULL_NODE {
                debug_assert_eq!(v, Likelihood::NON_TREE);
            }
        }
    }

    fn store_traceback(&mut self, site: usize) {
        self.traceback[site] = self
            .likelihood_nodes
            .iter()
            .map(|&u| (u, self.likelihood[u as usize]))
            .collect();
    }

    fn remove_edge(&mut self, parent: u32, child: u32) {
        let (p, c) = (parent as usize, child as usize);
        let lsib = self.left_sib[c];
        let rsib = self.right_sib[c];
        if lsib == NULL_NODE {
            self.left_child[p] = rsib;
        } else {
            self.right_sib[lsib as usize] = rsib;
        }
        if rsib == NULL_NODE {
            self.right_child[p] = lsib;
        } else {
            self.left_sib[rsib as usize] = lsib;
        }
        self.parent[c] = NULL_NODE;
        self.left_sib[c] = NULL_NODE;
        self.right_sib[c] = NULL_NODE;
    }

    fn insert_edge(&mut self, parent: u32, child: u32) {
        let (p, c) = (parent as usize, child as usize);
        self.parent[c] = parent as i64;
        let u = self.right_child[p];
        if u == NULL_NODE {
            self.left_child[p] = child as i64;
            self.left_sib[c] = NULL_NODE;
            self.right_sib[c] = NULL_NODE;
        } else {
            self.right_sib[u as usize] = child as i64;
            self.left_sib[c] = u;
            self.right_sib[c] = NULL_NODE;
        }
        self.right_child[p] = child as i64;
    }

    /// Forward update of the likelihood table for a single site, given
    /// the observed haplotype state `state` (0 or 1, or
    /// [`UNKNOWN_ALLELE`] for sites outside the match window, which the
    /// caller must never pass here).
    fn update_site(&mut self, site: usize, state: u8) {
        let tsb = self.tree_sequence_builder;
        let n = tsb.num_nodes();
        let err = self.error_rate;

        let r = 1.0 - (-tsb.recombination_rate()[site] / n as f64).exp();
        let recomb_proba = r / n as f64;
        let no_recomb_proba = 1.0 - r + r / n as f64;

        let mutation_node: i64 = match tsb.mutations_at(site) {
            None => {
                if err == 0.0 {
                    self.store_traceback(site);
                    return;
                }
                NULL_NODE
            }
            Some(muts) => {
                let mutation_node = i64::from(muts[0].node);
                if self.likelihood[mutation_node as usize] == Likelihood::COMPRESSED {
                    let mut u = mutation_node;
                    while self.likelihood[u as usize] == Likelihood::COMPRESSED {
                        u = self.parent[u as usize];
                    }
                    self.likelihood[mutation_node as usize] = self.likelihood[u as usize];
                    self.likelihood_nodes.push(mutation_node as u32);
                }
                mutation_node
            }
        };

        self.store_traceback(site);

        let distance = if site > 0 {
            tsb.positions()[site] - tsb.positions()[site - 1]
        } else {
            1.0
        };

        let mut max_l = -1.0f64;
        let mut path_cache = vec![-1i8; n];
        let active_nodes = self.likelihood_nodes.clone();
        for &u in &active_nodes {
            let mut v = i64::from(u);
            while v != NULL_NODE && v != mutation_node && path_cache[v as usize] == -1 {
                v = self.parent[v as usize];
            }
            let d = if v != NULL_NODE && path_cache[v as usize] != -1 {
                path_cache[v as usize] == 1
            } else {
                v == mutation_node
            };
            let mut v = i64::from(u);
            while v != NULL_NODE && v != mutation_node && path_cache[v as usize] == -1 {
                path_cache[v as usize] = i8::from(d);
                v = self.parent[v as usize];
            }

            let x = self.likelihood[u as usize] * no_recomb_proba * distance;
            let y = recomb_proba * distance;
            let z = x.max(y);
            let emission_p = match (state == 1, d) {
                (true, true) => 1.0 - err,
                (true, false) => err,
                (false, true) => err,
                (false, false) => 1.0 - err,
            };
            self.likelihood[u as usize] = z * emission_p;
            if self.likelihood[u as usize] > max_l {
                max_l = self.likelihood[u as usize];
            }
        }
        debug_assert!(max_l > 0.0);

        for &u in &active_nodes {
            self.likelihood[u as usize] /= max_l;
            let mut v = i64::from(u);
            while v != NULL_NODE && path_cache[v as usize] != -1 {
                path_cache[v as usize] = -1;
                v = self.parent[v as usize];
            }
        }

        self.compress_likelihoods();
    }

    /// Removes redundant explicit likelihoods: a node whose value is
    /// identical to its nearest ancestor's is marked
    /// [`Likelihood::Compressed`] and dropped from `likelihood_nodes`.
    fn compress_likelihoods(&mut self) {
        let n = self.likelihood.len();
        let mut l_cache = vec![-1.0f64; n];
        let mut cached_paths = Vec::new();
        let old_nodes = std::mem::take(&mut self.likelihood_nodes);
        for u in old_nodes {
            let p = self.parent[u as usize];
            if p != NULL_NODE {
                cached_paths.push(p);
                let mut v = p;
                while self.likelihood[v as usize] == Likelihood::COMPRESSED && l_cache[v as usize] == -1.0 {
                    v = self.parent[v as usize];
                }
                let mut l_p = l_cache[v as usize];
                if l_p == -1.0 {
                    l_p = self.likelihood[v as usize];
                }
                let mut v = p;
                while self.likelihood[v as usize] == Likelihood::COMPRESSED && l_cache[v as usize] == -1.0 {
                    l_cache[v as usize] = l_p;
                    v = self.parent[v as usize];
                }
                if self.likelihood[u as usize] == l_p {
                    self.likelihood[u as usize] = Likelihood::COMPRESSED;
                }
            }
            if self.likelihood[u as usize] >= 0.0 {
                self.likelihood_nodes.push(u);
            }
        }
        for u in cached_paths {
            let mut v = u;
            while v != NULL_NODE && l_cache[v as usize] != -1.0 {
                l_cache[v as usize] = -1.0;
                v = self.parent[v as usize];
            }
        }
    }

    /// Matches haplotype `h` against the tree sequence over the
    /// half-open site window `[start, end)`, writing the best-fit
    /// haplotype into `out_match` (sites outside the window are set to
    /// [`UNKNOWN_ALLELE`]) and returning the `(left, right, parent)`
    /// edge arrays of the path found.
    pub fn find_path(
        &mut self,
        h: &[u8],
        start: usize,
        end: usize,
        out_match: &mut [u8],
    ) -> Result<(Vec<u32>, Vec<u32>, Vec<i32>), AncestorMatcherError> {
        if h.len() != self.num_sites {
            return Err(AncestorMatcherError::HaplotypeLengthMismatch { got: h.len(), expected: self.num_sites });
        }
        if out_match.len() != self.num_sites {
            return Err(AncestorMatcherError::MatchBufferLengthMismatch { got: out_match.len(), expected: self.num_sites });
        }
        if end > self.num_sites {
            return Err(AncestorMatcherError::WindowOutOfRange { end, num_sites: self.num_sites });
        }
        if start >= end {
            return Err(AncestorMatcherError::EmptyMatchWindow { start, end });
        }

        let tsb = self.tree_sequence_builder;
        let edges = tsb.edges();
        let order = tsb.removal_order();
        let big_m = edges.len();
        let n = tsb.num_nodes();
        let m = self.num_sites;

        self.parent = vec![NULL_NODE; n];
        self.left_child = vec![NULL_NODE; n];
        self.right_child = vec![NULL_NODE; n];
        self.left_sib = vec![NULL_NODE; n];
        self.right_sib = vec![NULL_NODE; n];
        self.traceback = vec![HashMap::new(); m];
        self.likelihood = vec![Likelihood::NON_TREE; n];
        self.likelihood_nodes = Vec::new();
        let mut l_cache = vec![-1.0f64; n];

        let mut j = 0usize;
        let mut k = 0usize;
        let mut left = 0usize;
        let mut right = m;
        let mut pos = 0usize;

        while j < big_m && k < big_m && (edges[j].left as usize) <= start {
            while k < big_m && (edges[order[k] as usize].right as usize) == pos {
                let e = edges[order[k] as usize];
                self.remove_edge(e.parent, e.child);
                k += 1;
            }
            while j < big_m && (edges[j].left as usize) == pos {
                let e = edges[j];
                self.insert_edge(e.parent, e.child);
                j += 1;
            }
            left = pos;
            right = m;
            if j < big_m {
                right = right.min(edges[j].left as usize);
            }
            if k < big_m {
                right = right.min(edges[order[k] as usize].right as usize);
            }
            pos = right;
        }
        debug_assert!(left < right);

        self.likelihood_nodes.push(0);
        self.likelihood[0] = 1.0;
        for u in 0..n {
            if self.parent[u] != NULL_NODE {
                self.likelihood[u] = Likelihood::COMPRESSED;
            }
        }

        let mut remove_start = k;
        while left < end {
            debug_assert!(left < right);

            let mut normalisation_required = false;
            for l in remove_start..k {
                let e = edges[order[l] as usize];
                for u in [e.parent, e.child] {
                    if self.is_nonzero_root(u) {
                        if approximately_one(self.likelihood[u as usize]) {
                            normalisation_required = true;
                        }
                        self.likelihood[u as usize] = Likelihood::NON_TREE;
                        self.likelihood_nodes.retain(|&x| x != u);
                    }
                }
            }
            if normalisation_required {
                let max_l = self
                    .likelihood_nodes
                    .iter()
                    .map(|&u| self.likelihood[u as usize])
                    .fold(f64::NEG_INFINITY, f64::max);
                for &u in &self.likelihood_nodes {
                    self.likelihood[u as usize] /= max_l;
                }
            }

            self.check_likelihoods();

            for site in left.max(start)..right.min(end) {
                self.update_site(site, h[site]);
            }

            remove_start = k;
            while k < big_m && (edges[order[k] as usize].right as usize) == right {
                let e = edges[order[k] as usize];
                self.remove_edge(e.parent, e.child);
                k += 1;
                if self.likelihood[e.child as usize] == Likelihood::COMPRESSED {
                    let mut u = i64::from(e.parent);
                    while self.likelihood[u as usize] == Likelihood::COMPRESSED && l_cache[u as usize] == -1.0 {
                        u = self.parent[u as usize];
                    }
                    let mut l_child = l_cache[u as usize];
                    if l_child == -1.0 {
                        l_child = self.likelihood[u as usize];
                    }
                    let mut u = i64::from(e.parent);
                    while self.likelihood[u as usize] == Likelihood::COMPRESSED && l_cache[u as usize] == -1.0 {
                        l_cache[u as usize] = l_child;
                        u = self.parent[u as usize];
                    }
                    self.likelihood[e.child as usize] = l_child;
                    self.likelihood_nodes.push(e.child);
                }
            }
            for l in remove_start..k {
                let e = edges[order[l] as usize];
                let mut u = i64::from(e.parent);
                while u != NULL_NODE && l_cache[u as usize] != -1.0 {
                    l_cache[u as usize] = -1.0;
                    u = self.parent[u as usize];
                }
            }

            left = right;
            while j < big_m && (edges[j].left as usize) == left {
                let e = edges[j];
                self.insert_edge(e.parent, e.child);
                j += 1;
                for u in [e.parent, e.child] {
                    if self.likelihood[u as usize] == Likelihood::NON_TREE {
                        self.likelihood[u as usize] = 0.0;
                        self.likelihood_nodes.push(u);
                    }
                }
            }
            right = m;
            if j < big_m {
                right = right.min(edges[j].left as usize);
            }
            if k < big_m {
                right = right.min(edges[order[k] as usize].right as usize);
            }
        }

        Ok(self.run_traceback(start, end, out_match))
    }

    fn run_traceback(&mut self, start: usize, end: usize, out_match: &mut [u8]) -> (Vec<u32>, Vec<u32>, Vec<i32>) {
        let tsb = self.tree_sequence_builder;
        let edges = tsb.edges();
        let order = tsb.removal_order();
        let big_m = edges.len() as i64;

        let mut u = self.max_likelihood_node();
        let mut output_edges = vec![OutputEdge { left: 0, right: end, parent: u }];

        let mut j = big_m - 1;
        let mut k = big_m - 1;

        out_match.fill(0);
        out_match[..start].fill(UNKNOWN_ALLELE);
        out_match[end..].fill(UNKNOWN_ALLELE);
        self.parent.fill(NULL_NODE);

        let mut pos = self.num_sites;
        while pos > start {
            while k >= 0 && (edges[k as usize].left as usize) == pos {
                self.parent[edges[k as usize].child as usize] = NULL_NODE;
                k -= 1;
            }
            while j >= 0 && (edges[order[j as usize] as usize].right as usize) == pos {
                let e = edges[order[j as usize] as usize];
                self.parent[e.child as usize] = i64::from(e.parent);
                j -= 1;
            }
            let right = pos;
            let mut left = 0usize;
            if k >= 0 {
                left = left.max(edges[k as usize].left as usize);
            }
            if j >= 0 {
                left = left.max(edges[order[j as usize] as usize].right as usize);
            }
            pos = left;
            debug_assert!(left < right);

            let lo = left.max(start);
            let hi = right.min(end);
            for l in (lo..hi).rev() {
                u = output_edges.last().expect("at least the initial edge is always present").parent;
                if let Some(muts) = tsb.mutations_at(l) {
                    if is_descendant(&self.parent, i64::from(u), i64::from(muts[0].node)) {
                        out_match[l] = 1;
                    }
                }
                let l_map = &self.traceback[l];
                let mut v = i64::from(u);
                while !l_map.contains_key(&(v as u32)) {
                    v = self.parent[v as usize];
                }
                let x = l_map[&(v as u32)];
                if !approximately_one(x) {
                    output_edges.last_mut().expect("checked above").left = l;
                    let new_u = max_likelihood_traceback_node(l_map);
                    output_edges.push(OutputEdge { left: 0, right: l, parent: new_u });
                }
            }
        }
        output_edges.last_mut().expect("at least the initial edge is always present").left = start;

        self.mean_traceback_size =
            self.traceback.iter().map(HashMap::len).sum::<usize>() as f64 / self.num_sites as f64;
        log::trace!(
            "traceback over [{start}, {end}) produced {} edges, mean traceback size {:.2}",
            output_edges.len(), self.mean_traceback_size,
        );

        let mut left = Vec::with_capacity(output_edges.len());
        let mut right = Vec::with_capacity(output_edges.len());
        let mut parent = Vec::with_capacity(output_edges.len());
        for e in &output_edges {
            debug_assert!(e.left >= start);
            debug_assert!(e.right <= end);
            debug_assert!(e.left < e.right);
            left.push(e.left as u32);
            right.push(e.right as u32);
            parent.push(e.parent as i32);
        }
        (left, right, parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree_sequence_builder::TreeSequenceBuilder;

    fn star_tree(num_sites: usize, num_samples: u32) -> TreeSequenceBuilder {
        let positions: Vec<f64> = (0..num_sites).map(|i| (i + 1) as f64).collect();
        let mut tsb = TreeSequenceBuilder::new(positions, vec![1e-8; num_sites]).unwrap();
        tsb.add_node(num_samples as f64 + 1.0, false); // node 0: root
        let child: Vec<u32> = (1..=num_samples).map(|i| {
            tsb.add_node(0.0, true);
            i
        }).collect();
        let left = vec![0u32; num_samples as usize];
        let right = vec![num_sites as u32; num_samples as usize];
        let parent = vec![0u32; num_samples as usize];
        tsb.update(0, 0.0, &left, &right, &parent, &child, &[], &[], &[]).unwrap();
        tsb
    }

    #[test]
    fn find_path_on_a_star_tree_matches_root_with_full_coverage() {
        let tsb = star_tree(4, 3);
        let mut matcher = AncestorMatcher::new(&tsb, 0.01);
        let h = vec![0u8, 1, 0, 1];
        let mut out_match = vec![0u8; 4];
        let (left, right, parent) = matcher.find_path(&h, 0, 4, &mut out_match).unwrap();
        assert_eq!(left[0], 0);
        assert_eq!(*right.last().unwrap(), 4);
        assert!(parent.iter().all(|&p| p >= 0));
    }

    #[test]
    fn find_path_rejects_haplotype_length_mismatch() {
        let tsb = star_tree(4, 2);
        let mut matcher = AncestorMatcher::new(&tsb, 0.0);
        let h = vec![0u8; 3];
        let mut out_match = vec![0u8; 4];
        let err = matcher.find_path(&h, 0, 4, &mut out_match).unwrap_err();
        assert!(matches!(err, AncestorMatcherError::HaplotypeLengthMismatch { got: 3, expected: 4 }));
    }

    #[test]
    fn find_path_rejects_empty_window() {
        let tsb = star_tree(4, 2);
        let mut matcher = AncestorMatcher::new(&tsb, 0.0);
        let h = vec![0u8; 4];
        let mut out_match = vec![0u8; 4];
        let err = matcher.find_path(&h, 2, 2, &mut out_match).unwrap_err();
        assert!(matches!(err, AncestorMatcherError::EmptyMatchWindow { start: 2, end: 2 }));
    }

    #[test]
    fn find_path_marks_sites_outside_window_as_unknown() {
        let tsb = star_tree(5, 2);
        let mut matcher = AncestorMatcher::new(&tsb, 0.01);
        let h = vec![0u8; 5];
        let mut out_match = vec![9u8; 5];
        matcher.find_path(&h, 1, 4, &mut out_match).unwrap();
        assert_eq!(out_match[0], UNKNOWN_ALLELE);
        assert_eq!(out_match[4], UNKNOWN_ALLELE);
    }

    #[test]
    fn is_descendant_follows_parent_chain_to_root() {
        let parent = vec![-1i64, 0, 1, 0];
        assert!(is_descendant(&parent, 2, 0));
        assert!(!is_descendant(&parent, 3, 1));
        assert!(!is_descendant(&parent, 0, 2));
    }
}
