use psp_core::{Chain, PspError, RngHandle};
use psp_sampler::{
    get_group_indices, make_unique, merge_chains, remove_redundant_chains, CollectingSink, Options,
};
use rand_distr::{Distribution, StandardNormal};

fn chain_from(pattern: &'static str, points: &[Vec<f64>]) -> Chain<&'static str> {
    let mut chain = Chain::new(pattern, points[0].clone(), 0.1);
    for point in &points[1..] {
        chain.record_step(point.clone(), true, 0.1);
    }
    chain
}

fn gaussian_cloud(center: &[f64], count: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = RngHandle::from_seed(seed);
    (0..count)
        .map(|_| {
            center
                .iter()
                .map(|c| -> f64 {
                    let z: f64 = StandardNormal.sample(rng.inner_mut());
                    c + z
                })
                .collect()
        })
        .collect()
}

/// Three points with unit sample variance around `center`.
fn interval(pattern: &'static str, center: f64) -> Chain<&'static str> {
    chain_from(pattern, &[vec![center - 1.0], vec![center], vec![center + 1.0]])
}

fn options(max_merge: usize) -> Options {
    Options {
        max_merge,
        ..Options::default()
    }
}

#[test]
fn overlapping_clouds_collapse_to_one_chain() {
    let sink = CollectingSink::new();
    let mut chains = vec![
        chain_from("A", &gaussian_cloud(&[0.0, 0.0], 200, 1)),
        chain_from("A", &gaussian_cloud(&[0.1, 0.1], 200, 2)),
    ];
    let summary = make_unique(&mut chains, &options(1), &sink).unwrap();
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].len(), 400);
    assert_eq!(summary.chains_before, 2);
    assert_eq!(summary.groups, 1);
    assert_eq!(summary.merged, 1);
    assert_eq!(summary.removed, 1);
}

#[test]
fn different_patterns_are_never_merged() {
    let sink = CollectingSink::new();
    let cloud = gaussian_cloud(&[0.0, 0.0], 100, 3);
    let mut chains = vec![chain_from("A", &cloud), chain_from("B", &cloud)];
    let summary = make_unique(&mut chains, &options(1), &sink).unwrap();
    assert_eq!(chains.len(), 2);
    assert_eq!(*chains[0].pattern(), "A");
    assert_eq!(*chains[1].pattern(), "B");
    assert!(chains.iter().all(|chain| chain.len() == 100));
    assert_eq!(summary.merged, 0);
}

#[test]
fn grouping_compares_against_first_members_only() {
    let sink = CollectingSink::new();
    // 0 overlaps 3, 3 overlaps 6, 0 and 6 are apart.
    let chains = vec![interval("A", 0.0), interval("A", 3.0), interval("A", 6.0)];
    let groups = get_group_indices(&chains, &[0, 1, 2], 2.0, 1e-10, &sink).unwrap();
    assert_eq!(groups, vec![vec![0, 1], vec![2]]);

    let groups = get_group_indices(&chains, &[1, 0, 2], 2.0, 1e-10, &sink).unwrap();
    assert_eq!(groups, vec![vec![1, 0, 2]]);

    // no transitive closure through the middle chain
    let groups = get_group_indices(&chains, &[0, 2, 1], 2.0, 1e-10, &sink).unwrap();
    assert_eq!(groups, vec![vec![0, 1], vec![2]]);
}

#[test]
fn merged_representative_holds_concatenated_samples() {
    let sink = CollectingSink::new();
    let mut chains = vec![
        chain_from("A", &gaussian_cloud(&[0.0, 0.0], 50, 4)),
        chain_from("A", &gaussian_cloud(&[0.2, 0.0], 60, 5)),
        chain_from("A", &gaussian_cloud(&[0.0, 0.2], 70, 6)),
    ];
    let expected: Vec<Vec<f64>> = chains
        .iter()
        .flat_map(|chain| chain.all_parms().to_vec())
        .collect();
    make_unique(&mut chains, &options(2), &sink).unwrap();
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].len(), 180);
    assert_eq!(chains[0].all_parms(), expected.as_slice());
    assert_eq!(chains[0].acceptance().len(), 180);
    assert_eq!(chains[0].radii().len(), 180);
}

#[test]
fn max_merge_caps_the_donors_per_group() {
    let sink = CollectingSink::new();
    let mut chains = vec![
        chain_from("A", &gaussian_cloud(&[0.0, 0.0], 50, 7)),
        chain_from("A", &gaussian_cloud(&[0.2, 0.0], 60, 8)),
        chain_from("A", &gaussian_cloud(&[0.0, 0.2], 70, 9)),
    ];
    let summary = make_unique(&mut chains, &options(1), &sink).unwrap();
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].len(), 110);
    assert_eq!(summary.merged, 1);
    assert_eq!(summary.removed, 2);
}

#[test]
fn zero_max_merge_still_removes_redundant_chains() {
    let sink = CollectingSink::new();
    let mut chains = vec![
        chain_from("A", &gaussian_cloud(&[0.0, 0.0], 80, 10)),
        chain_from("A", &gaussian_cloud(&[0.1, 0.1], 90, 11)),
    ];
    let summary = make_unique(&mut chains, &options(0), &sink).unwrap();
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].len(), 80);
    assert_eq!(summary.merged, 0);
    assert_eq!(summary.removed, 1);
}

#[test]
fn second_pass_changes_nothing() {
    let sink = CollectingSink::new();
    let mut chains = vec![
        chain_from("A", &gaussian_cloud(&[0.0, 0.0], 100, 12)),
        chain_from("A", &gaussian_cloud(&[20.0, 20.0], 100, 13)),
        chain_from("A", &gaussian_cloud(&[0.1, 0.1], 100, 14)),
        chain_from("B", &gaussian_cloud(&[0.0, 0.0], 100, 15)),
        chain_from("A", &gaussian_cloud(&[20.1, 20.0], 100, 16)),
    ];
    make_unique(&mut chains, &options(1), &sink).unwrap();
    let patterns: Vec<&str> = chains.iter().map(|chain| *chain.pattern()).collect();
    assert_eq!(patterns, vec!["A", "A", "B"]);

    let snapshot = chains.clone();
    let summary = make_unique(&mut chains, &options(1), &sink).unwrap();
    assert_eq!(chains, snapshot);
    assert_eq!(summary.removed, 0);
    assert_eq!(summary.merged, 0);
}

#[test]
fn undersampled_chain_fails_without_touching_the_collection() {
    let sink = CollectingSink::new();
    let mut chains = vec![
        chain_from("A", &gaussian_cloud(&[0.0, 0.0, 0.0], 40, 17)),
        chain_from("A", &[vec![0.1, 0.1, 0.1], vec![0.2, 0.1, 0.1]]),
    ];
    let snapshot = chains.clone();
    let err = make_unique(&mut chains, &options(1), &sink).unwrap_err();
    assert!(err.is_numerical());
    assert_eq!(err.code(), "insufficient-samples");
    assert_eq!(err.info().context.get("chain").map(String::as_str), Some("1"));
    assert_eq!(chains, snapshot);
}

#[test]
fn lone_chains_are_never_tested() {
    let sink = CollectingSink::new();
    // a single chain per pattern needs no covariance
    let mut chains = vec![
        Chain::new("A", vec![0.1, 0.2], 0.1),
        Chain::new("B", vec![0.3, 0.4], 0.1),
    ];
    let summary = make_unique(&mut chains, &options(1), &sink).unwrap();
    assert_eq!(chains.len(), 2);
    assert_eq!(summary.groups, 2);
}

#[test]
fn merge_and_remove_compose_on_explicit_groups() {
    let mut chains = vec![
        interval("A", 0.0),
        interval("A", 0.5),
        interval("A", 9.0),
        interval("A", 0.2),
    ];
    let groups = vec![vec![0, 1, 3], vec![2]];
    assert_eq!(merge_chains(&mut chains, &groups, 5), 2);
    assert_eq!(chains[0].len(), 9);
    assert_eq!(remove_redundant_chains(&mut chains, &groups), 2);
    assert_eq!(chains.len(), 2);
    assert_eq!(chains[1].current(), &[10.0]);
}

#[test]
fn invalid_options_fail_even_for_singleton_groups() {
    let sink = CollectingSink::new();
    let mut chains = vec![
        Chain::new("A", vec![0.1, 0.2], 0.1),
        Chain::new("B", vec![0.3, 0.4], 0.1),
    ];
    let snapshot = chains.clone();
    let bad_scale = Options {
        intersection_scale: -3.0,
        ..Options::default()
    };
    let err = make_unique(&mut chains, &bad_scale, &sink).unwrap_err();
    assert!(matches!(err, PspError::Config(_)));
    assert_eq!(err.code(), "invalid-scale");

    let bad_floor = Options {
        variance_floor: -1.0,
        ..Options::default()
    };
    let err = make_unique(&mut chains, &bad_floor, &sink).unwrap_err();
    assert_eq!(err.code(), "invalid-variance-floor");
    assert_eq!(chains, snapshot);
}

#[test]
fn merging_keeps_the_representative_walk_in_place() {
    let mut representative = Chain::new("A", vec![0.0, 0.0], 0.1);
    representative.record_step(vec![0.1, 0.0], true, 0.1);
    let mut donor = Chain::new("A", vec![5.0, 5.0], 0.2);
    donor.record_step(vec![5.1, 5.0], true, 0.2);
    let mut chains = vec![representative, donor];

    assert_eq!(merge_chains(&mut chains, &[vec![0, 1]], 1), 1);
    assert_eq!(chains[0].len(), 4);
    assert_eq!(chains[0].all_parms()[3], vec![5.1, 5.0]);
    assert_eq!(chains[0].current(), &[0.1, 0.0]);
    assert_eq!(chains[0].radius(), 0.1);
    assert_eq!(chains[0].window_steps(), 2);
}
