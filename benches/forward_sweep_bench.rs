use criterion::{black_box, criterion_group, criterion_main, Criterion};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use infer_core::{AncestorBuilder, AncestorMatcher, TieBreak, TreeSequenceBuilder, UNKNOWN_ALLELE};

/// Builds a tree sequence over `num_samples` synthesized haplotypes at `num_sites`
/// segregating sites, mirroring the pipeline in `src/demo.rs`.
fn build_tree_sequence(num_samples: usize, num_sites: usize, seed: u64) -> (TreeSequenceBuilder, Vec<Vec<u8>>) {
    let mut rng = StdRng::seed_from_u64(seed);

    let columns: Vec<Vec<u8>> = (0..num_sites)
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

    let mut builder = AncestorBuilder::new(num_samples, num_sites);
    for (site, column) in columns.iter().enumerate() {
        let frequency: usize = column.iter().map(|&g| usize::from(g)).sum();
        if frequency > 0 && frequency < num_samples {
            builder.add_site(site, frequency, column.clone()).expect("site should be buildable");
        }
    }
    let descriptors = builder.ancestor_descriptors();

    let positions: Vec<f64> = (1..=num_sites).map(|p| p as f64).collect();
    let recombination_rate = vec![1e-8; num_sites];
    let mut tsb = TreeSequenceBuilder::new(positions, recombination_rate).expect("positions should be monotonic");

    let root_time = descriptors.len() as f64 + num_samples as f64 + 1.0;
    tsb.add_node(root_time, false);

    let mut ancestor_buf = vec![UNKNOWN_ALLELE; num_sites];
    let mut match_buf = vec![UNKNOWN_ALLELE; num_sites];
    for (i, (_frequency, focal_sites)) in descriptors.iter().enumerate() {
        let (start, end) = builder
            .make_ancestor(focal_sites, &mut ancestor_buf, TieBreak::PreferDerived)
            .expect("ancestor should be buildable");
        let time = (descriptors.len() - i) as f64 + num_samples as f64;

        let (left, right, parent) = {
            let mut matcher = AncestorMatcher::new(&tsb, 0.0);
            matcher.find_path(&ancestor_buf, start, end, &mut match_buf).expect("ancestor should match")
        };
        let parent: Vec<u32> = parent.iter().map(|&p| p as u32).collect();

        let new_node = tsb.add_node(time, false);
        let child = vec![new_node; left.len()];
        let mutation_nodes = vec![new_node; focal_sites.len()];
        let derived_states = vec![1i8; focal_sites.len()];
        tsb.update(0, time, &left, &right, &parent, &child, focal_sites, &mutation_nodes, &derived_states)
            .expect("edges should respect the time invariant");
    }

    (tsb, columns)
}

fn bench_find_path(c: &mut Criterion) {
    let num_samples = 100;
    let num_sites = 500;

    let (tsb, columns) = build_tree_sequence(num_samples, num_sites, 0xC0FFEE);
    let haplotype: Vec<u8> = columns.iter().map(|column| column[0]).collect();
    let mut match_buf = vec![UNKNOWN_ALLELE; num_sites];

    let mut group = c.benchmark_group("ancestor_matcher");
    group.sample_size(50);

    group.bench_function("find_path_full_haplotype", |b| b.iter(|| {
        let mut matcher = AncestorMatcher::new(black_box(&tsb), black_box(0.0));
        matcher.find_path(black_box(&haplotype), 0, num_sites, &mut match_buf)
            .expect("'find_path_full_haplotype' bench should start at this point")
    }));

    group.finish();
}

fn bench_make_ancestor(c: &mut Criterion) {
    let num_samples = 100;
    let num_sites = 500;
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let mut builder = AncestorBuilder::new(num_samples, num_sites);
    for site in 0..num_sites {
        let frequency = rng.gen_range(1..num_samples);
        let mut column = vec![0u8; num_samples];
        let mut carriers: Vec<usize> = (0..num_samples).collect();
        for _ in 0..frequency {
            let pick = rng.gen_range(0..carriers.len());
            column[carriers.remove(pick)] = 1;
        }
        builder.add_site(site, frequency, column).expect("site should be buildable");
    }
    let descriptors = builder.ancestor_descriptors();
    let (_, focal_sites) = &descriptors[descriptors.len() / 2];
    let mut ancestor_buf = vec![UNKNOWN_ALLELE; num_sites];

    let mut group = c.benchmark_group("ancestor_builder");
    group.sample_size(50);

    group.bench_function("make_ancestor", |b| b.iter(|| {
        builder.make_ancestor(black_box(focal_sites), &mut ancestor_buf, black_box(TieBreak::PreferDerived))
            .expect("'make_ancestor' bench should start at this point")
    }));

    group.finish();
}

criterion_group!(benches, bench_find_path, bench_make_ancestor);
criterion_main!(benches);
