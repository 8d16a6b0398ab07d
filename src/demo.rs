//! Demonstration driver: synthesizes a random genotype matrix, then runs
//! the full ancestor-synthesis / tree-sequence-matching pipeline over it
//! and reports the resulting tree sequence.
//!
//! This module has no counterpart in the core algorithm; it exists to
//! give the `infer` subcommand something concrete to run, the same way
//! the teacher's top-level `run()` wires its CLI args into its own
//! subcommand drivers.

use std::error::Error;
use std::io::Write;

use parser::InferArgs;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use infer_core::{AncestorBuilder, AncestorMatcher, TieBreak, TreeSequenceBuilder, UNKNOWN_ALLELE};

/// `(samples x sites)` binary genotype matrix, one column per site.
struct GenotypeMatrix {
    num_samples: usize,
    columns: Vec<Vec<u8>>,
}

impl GenotypeMatrix {
    fn synthesize(num_samples: usize, num_sites: usize, rng: &mut StdRng) -> Self {
        let columns = (0..num_sites)
            .map(|_| {
                let frequency = rng.gen_range(1..num_samples);
                let mut column = vec![0u8; num_samples];
                let mut carriers: Vec<usize> = (0..num_samples).collect();
                for _ in 0..frequency {
                    let pick = rng.gen_range(0..carriers.len());
                    column[carriers.remove(pick)] = 1;
                }
                column
            })
            .collect();
        Self { num_samples, columns }
    }

    fn frequency(&self, site: usize) -> usize {
        self.columns[site].iter().map(|&g| usize::from(g)).sum()
    }

    fn column(&self, site: usize) -> &[u8] {
        &self.columns[site]
    }

    fn haplotype(&self, sample: usize) -> Vec<u8> {
        self.columns.iter().map(|column| column[sample]).collect()
    }
}

/// Runs the full pipeline described in `SPEC_FULL.md` §2 over a
/// synthesized genotype matrix and logs a summary of the resulting
/// tree sequence.
///
/// # Errors
/// Propagates any error raised while building ancestors, matching
/// haplotypes, or writing the output report.
pub fn run(args: &InferArgs) -> Result<(), Box<dyn Error>> {
    args.check_dimensions()?;

    let seed = args.seed.unwrap_or_else(|| rand::thread_rng().gen());
    log::info!("synthesizing a {} x {} genotype matrix (seed {seed})", args.num_samples, args.num_sites);
    let mut rng = StdRng::seed_from_u64(seed);
    let matrix = GenotypeMatrix::synthesize(args.num_samples, args.num_sites, &mut rng);

    let tie_break = if args.prefer_ancestral { TieBreak::PreferAncestral } else { TieBreak::PreferDerived };

    let mut builder = AncestorBuilder::new(args.num_samples, args.num_sites);
    for site in 0..args.num_sites {
        let frequency = matrix.frequency(site);
        if frequency > 0 && frequency < args.num_samples {
            builder.add_site(site, frequency, matrix.column(site).to_vec())?;
        }
    }
    let descriptors = builder.ancestor_descriptors();
    log::info!("grouped {} sites into {} candidate ancestors", args.num_sites, descriptors.len());

    let positions: Vec<f64> = (1..=args.num_sites).map(|p| p as f64).collect();
    let recombination_rate = vec![args.recombination_rate; args.num_sites];
    let mut tsb = TreeSequenceBuilder::new(positions, recombination_rate)?;

    // Node 0: the ultimate ancestor, entirely ancestral (0) state, older
    // than any synthesized ancestor.
    let root_time = descriptors.len() as f64 + args.num_samples as f64 + 1.0;
    tsb.add_node(root_time, false);

    let mut ancestor_buf = vec![UNKNOWN_ALLELE; args.num_sites];
    let mut match_buf = vec![UNKNOWN_ALLELE; args.num_sites];
    for (i, (_frequency, focal_sites)) in descriptors.iter().enumerate() {
        let (start, end) = builder.make_ancestor(focal_sites, &mut ancestor_buf, tie_break)?;
        let time = (descriptors.len() - i) as f64 + args.num_samples as f64;

        let (left, right, parent) = {
            let mut matcher = AncestorMatcher::new(&tsb, 0.0);
            matcher.find_path(&ancestor_buf, start, end, &mut match_buf)?
        };
        let parent: Vec<u32> = parent.iter().map(|&p| p as u32).collect();

        let new_node = tsb.add_node(time, false);
        let child = vec![new_node; left.len()];
        let mutation_sites: Vec<usize> = focal_sites.clone();
        let mutation_nodes = vec![new_node; mutation_sites.len()];
        let derived_states = vec![1i8; mutation_sites.len()];
        tsb.update(0, time, &left, &right, &parent, &child, &mutation_sites, &mutation_nodes, &derived_states)?;
    }

    log::info!("matching {} samples against {} ancestors", args.num_samples, descriptors.len());
    for sample in 0..args.num_samples {
        let h = matrix.haplotype(sample);
        let (left, right, parent) = {
            let mut matcher = AncestorMatcher::new(&tsb, args.error_rate);
            matcher.find_path(&h, 0, args.num_sites, &mut match_buf)?
        };
        let parent: Vec<u32> = parent.iter().map(|&p| p as u32).collect();
        let new_node = tsb.add_node(0.0, true);
        let child = vec![new_node; left.len()];

        let mismatches: Vec<usize> = (0..args.num_sites).filter(|&site| match_buf[site] != h[site]).collect();
        let mutation_nodes = vec![new_node; mismatches.len()];
        let derived_states: Vec<i8> = mismatches.iter().map(|&site| h[site] as i8).collect();
        tsb.update(0, 0.0, &left, &right, &parent, &child, &mismatches, &mutation_nodes, &derived_states)?;
    }

    log::info!(
        "tree sequence complete: {} nodes, {} edges, {} mutations",
        tsb.num_nodes(), tsb.num_edges(), tsb.num_mutations(),
    );

    write_report(args, &tsb)?;
    Ok(())
}

fn write_report(args: &InferArgs, tsb: &TreeSequenceBuilder) -> Result<(), Box<dyn Error>> {
    let report_path = args.output_dir.join("tree-sequence-summary.txt");
    args.can_write_file(&report_path)?;

    let (_flags, times) = tsb.dump_nodes();
    let (left, right, parent, child) = tsb.dump_edges();
    let (site, node, derived_state, _parent) = tsb.dump_mutations();

    let mut out = std::fs::File::create(&report_path)?;
    writeln!(out, "nodes: {}", times.len())?;
    writeln!(out, "edges: {}", left.len())?;
    writeln!(out, "mutations: {}", site.len())?;
    for i in 0..left.len() {
        writeln!(out, "edge\t{}\t{}\t{}\t{}", left[i], right[i], parent[i], child[i])?;
    }
    for i in 0..site.len() {
        writeln!(out, "mutation\t{}\t{}\t{}", site[i], node[i], derived_state[i])?;
    }
    log::info!("wrote tree sequence summary to {}", report_path.display());
    Ok(())
}
