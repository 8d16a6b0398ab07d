//! Materializes ancestor haplotypes from frequency-grouped site patterns.
//!
//! See `SPEC_FULL.md` §4.1. This is the "leaf" subsystem: it only reads
//! the per-site genotype columns handed to it by the external
//! sample-data collaborator (§6) and never touches the tree sequence.

mod error;
pub use error::AncestorBuilderError;

use crate::types::{TieBreak, UNKNOWN_ALLELE};
use ahash::RandomState;
use indexmap::IndexMap;

#[derive(Debug, Clone)]
struct BuilderSite {
    frequency: usize,
    genotypes: Option<Vec<u8>>,
}

/// Builds candidate ancestor haplotypes by grouping sites that share an
/// identical genotype pattern at a given derived-allele frequency.
pub struct AncestorBuilder {
    num_samples: usize,
    num_sites: usize,
    sites: Vec<Option<BuilderSite>>,
    /// `frequency_map[f]` maps a genotype-pattern key to the ascending
    /// list of site ids sharing that pattern, for sites of frequency
    /// `f`. Insertion order is preserved (`IndexMap`) so that
    /// [`Self::ancestor_descriptors`] is deterministic given the order
    /// `add_site` was called in.
    frequency_map: Vec<IndexMap<Vec<u8>, Vec<usize>, RandomState>>,
}

impl AncestorBuilder {
    #[must_use]
    pub fn new(num_samples: usize, num_sites: usize) -> Self {
        Self {
            num_samples,
            num_sites,
            sites: vec![None; num_sites],
            frequency_map: (0..num_samples).map(|_| IndexMap::default()).collect(),
        }
    }

    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    #[must_use]
    pub fn num_sites(&self) -> usize {
        self.num_sites
    }

    /// Adds a new site at the specified id and allele pattern to the
    /// builder. If `frequency > 1` the genotype vector is retained and
    /// indexed by pattern; otherwise it is dropped immediately, since a
    /// singleton (or fixed) site can never anchor or extend an
    /// ancestor.
    pub fn add_site(
        &mut self,
        site_id: usize,
        frequency: usize,
        genotypes: Vec<u8>,
    ) -> Result<(), AncestorBuilderError> {
        if site_id >= self.num_sites {
            return Err(AncestorBuilderError::SiteOutOfRange { site_id, num_sites: self.num_sites });
        }
        if genotypes.len() != self.num_samples {
            return Err(AncestorBuilderError::GenotypeLengthMismatch {
                site_id,
                got: genotypes.len(),
                expected: self.num_samples,
            });
        }

        let retained = if frequency > 1 {
            self.frequency_map[frequency]
                .entry(genotypes.clone())
                .or_default()
                .push(site_id);
            Some(genotypes)
        } else {
            None
        };

        self.sites[site_id] = Some(BuilderSite { frequency, genotypes: retained });
        Ok(())
    }

    /// Returns `(frequency, focal_sites)` pairs in descending order of
    /// frequency; within a frequency level, buckets are emitted in the
    /// order their first site was added.
    #[must_use]
    pub fn ancestor_descriptors(&self) -> Vec<(usize, Vec<usize>)> {
        let mut descriptors = Vec::new();
        for frequency in (0..self.num_samples).rev() {
            for focal_sites in self.frequency_map[frequency].values() {
                descriptors.push((frequency, focal_sites.clone()));
            }
        }
        descriptors
    }

    fn site(&self, id: usize) -> &BuilderSite {
        self.sites[id].as_ref().expect("site queried by the builder must have been added")
    }

    /// Consensus sweep shared by the right, left, and interior passes:
    /// extends the ancestor along `sweep_sites` (in the order given),
    /// anchored at `anchor_site`.
    fn build_ancestor_sites(
        &self,
        anchor_site: usize,
        sweep_sites: impl IntoIterator<Item = usize>,
        a: &mut [u8],
        tie_break: TieBreak,
    ) {
        let anchor = self.site(anchor_site);
        let anchor_genotypes = anchor.genotypes.as_ref()
            .expect("anchor site of an ancestor must be a non-singleton site");
        let mut samples: Vec<usize> = (0..self.num_samples)
            .filter(|&j| anchor_genotypes[j] == 1)
            .collect();

        for l in sweep_sites {
            a[l] = 0;
            let site_l = self.site(l);
            if site_l.frequency <= anchor.frequency {
                continue;
            }
            let genotypes_l = site_l.genotypes.as_ref()
                .expect("a site with frequency > anchor's frequency (>= 2) retains its genotypes");

            let mut num_ones = 0usize;
            let mut num_zeros = 0usize;
            for &j in &samples {
                if genotypes_l[j] == 1 {
                    num_ones += 1;
                } else {
                    num_zeros += 1;
                }
            }

            let chosen = match num_ones.cmp(&num_zeros) {
                std::cmp::Ordering::Less => 0,
                std::cmp::Ordering::Greater => 1,
                std::cmp::Ordering::Equal => {
                    let chosen = match tie_break {
                        TieBreak::PreferDerived => 1,
                        TieBreak::PreferAncestral => 0,
                    };
                    log::warn!(
                        "site {l} tied {num_ones} vs {num_zeros} carriers while extending the ancestor anchored at site {anchor_site}; resolved to allele {chosen} via {tie_break:?}",
                    );
                    chosen
                }
            };
            a[l] = chosen;
            samples.retain(|&j| genotypes_l[j] == chosen);

            if samples.len() == 1 {
                break;
            }
        }
    }

    /// Fills `a[0..num_sites)` with the synthesized ancestor haplotype
    /// for `focal_sites`, returning the `(start, end)` half-open range
    /// of sites the ancestor actually covers. `focal_sites` must be
    /// ascending, as produced by [`Self::ancestor_descriptors`].
    pub fn make_ancestor(
        &self,
        focal_sites: &[usize],
        a: &mut [u8],
        tie_break: TieBreak,
    ) -> Result<(usize, usize), AncestorBuilderError> {
        if focal_sites.is_empty() {
            return Err(AncestorBuilderError::EmptyFocalSites);
        }
        a.fill(UNKNOWN_ALLELE);

        let first_focal = focal_sites[0];
        let last_focal = *focal_sites.last().expect("checked non-empty above");

        // Right sweep: sites after the last focal site, anchored at the first.
        self.build_ancestor_sites(first_focal, last_focal + 1..self.num_sites, a, tie_break);

        // Left sweep: sites before the first focal site, anchored at the last, descending.
        self.build_ancestor_sites(last_focal, (0..first_focal).rev(), a, tie_break);

        // Interior: non-focal sites strictly between the focal bounds, one at a time.
        for j in first_focal..=last_focal {
            if focal_sites.contains(&j) {
                a[j] = 1;
            } else {
                self.build_ancestor_sites(last_focal, std::iter::once(j), a, tie_break);
            }
        }

        let start = a.iter().position(|&x| x != UNKNOWN_ALLELE)
            .expect("focal sites were just set to 1, so at least one entry is known");
        let end = a.iter().rposition(|&x| x != UNKNOWN_ALLELE)
            .expect("same as above") + 1;
        Ok((start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder_with_patterns(num_samples: usize, patterns: &[(usize, &[u8])]) -> AncestorBuilder {
        let mut builder = AncestorBuilder::new(num_samples, patterns.len());
        for (id, (frequency, genotypes)) in patterns.iter().enumerate() {
            builder.add_site(id, *frequency, genotypes.to_vec()).unwrap();
        }
        builder
    }

    #[test]
    fn descriptors_are_empty_for_all_singleton_sites() {
        let builder = builder_with_patterns(3, &[(1, &[1, 0, 0]), (1, &[0, 1, 0])]);
        assert!(builder.ancestor_descriptors().is_empty());
    }

    #[test]
    fn descriptors_group_identical_patterns_and_sort_by_frequency_desc() {
        // num_samples=3, sites at positions [1,2,3], genotypes [[1,1,0],[0,1,1],[1,1,0]]
        let mut builder = AncestorBuilder::new(3, 3);
        builder.add_site(0, 2, vec![1, 1, 0]).unwrap();
        builder.add_site(1, 3, vec![0, 1, 1]).unwrap(); // fixed: frequency == num_samples, caller would skip
        builder.add_site(2, 2, vec![1, 1, 0]).unwrap();

        let descriptors = builder.ancestor_descriptors();
        assert_eq!(descriptors, vec![(2, vec![0, 2])]);
    }

    #[test]
    fn descriptors_preserve_bucket_insertion_order_within_a_frequency() {
        let mut builder = AncestorBuilder::new(4, 4);
        builder.add_site(0, 2, vec![1, 1, 0, 0]).unwrap();
        builder.add_site(1, 2, vec![0, 0, 1, 1]).unwrap();
        builder.add_site(2, 2, vec![1, 1, 0, 0]).unwrap();

        let descriptors = builder.ancestor_descriptors();
        assert_eq!(descriptors, vec![(2, vec![0, 2]), (2, vec![1])]);
    }

    #[test]
    fn make_ancestor_sets_focal_sites_to_one() {
        let mut builder = AncestorBuilder::new(4, 6);
        for id in 0..6 {
            builder.add_site(id, 2, vec![1, 1, 0, 0]).unwrap();
        }
        let mut a = vec![UNKNOWN_ALLELE; 6];
        let (start, end) = builder.make_ancestor(&[2, 5], &mut a, TieBreak::PreferDerived).unwrap();
        assert_eq!(a[2], 1);
        assert_eq!(a[5], 1);
        assert_eq!(start, 0);
        assert_eq!(end, 6);
    }

    #[test]
    fn make_ancestor_sweep_respects_frequency_threshold_and_interior_imputation() {
        // Two focal sites [2, 5] of frequency 2, carriers {0, 1}.
        // Site 3 (interior) frequency 3: agrees with carrier 0 on allele 1 -> a[3] = 1.
        // Site 4 frequency 2 (<= anchor frequency) -> a[4] = 0 unconditionally.
        let mut builder = AncestorBuilder::new(4, 6);
        builder.add_site(0, 2, vec![0, 0, 1, 1]).unwrap();
        builder.add_site(1, 2, vec![0, 0, 1, 1]).unwrap();
        builder.add_site(2, 2, vec![1, 1, 0, 0]).unwrap(); // focal
        builder.add_site(3, 3, vec![1, 1, 1, 0]).unwrap(); // interior, carriers {0,1} both have 1
        builder.add_site(4, 2, vec![1, 0, 0, 0]).unwrap(); // interior, frequency <= anchor's
        builder.add_site(5, 2, vec![1, 1, 0, 0]).unwrap(); // focal

        let mut a = vec![UNKNOWN_ALLELE; 6];
        builder.make_ancestor(&[2, 5], &mut a, TieBreak::PreferDerived).unwrap();
        assert_eq!(a[3], 1);
        assert_eq!(a[4], 0);
    }

    #[test]
    fn make_ancestor_is_deterministic() {
        let mut builder = AncestorBuilder::new(5, 8);
        for id in 0..8 {
            builder.add_site(id, 3, vec![1, 1, 1, 0, 0]).unwrap();
        }
        let mut a1 = vec![UNKNOWN_ALLELE; 8];
        let mut a2 = vec![UNKNOWN_ALLELE; 8];
        let r1 = builder.make_ancestor(&[1, 4, 6], &mut a1, TieBreak::PreferDerived).unwrap();
        let r2 = builder.make_ancestor(&[1, 4, 6], &mut a2, TieBreak::PreferDerived).unwrap();
        assert_eq!(a1, a2);
        assert_eq!(r1, r2);
    }

    #[test]
    fn add_site_rejects_out_of_range_id() {
        let mut builder = AncestorBuilder::new(2, 2);
        let err = builder.add_site(5, 2, vec![1, 0]).unwrap_err();
        assert!(matches!(err, AncestorBuilderError::SiteOutOfRange { site_id: 5, num_sites: 2 }));
    }

    #[test]
    fn add_site_rejects_mismatched_genotype_length() {
        let mut builder = AncestorBuilder::new(3, 2);
        let err = builder.add_site(0, 2, vec![1, 0]).unwrap_err();
        assert!(matches!(err, AncestorBuilderError::GenotypeLengthMismatch { site_id: 0, got: 2, expected: 3 }));
    }
}
