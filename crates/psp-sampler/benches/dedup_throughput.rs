use criterion::{criterion_group, criterion_main, Criterion};
use psp_core::{Chain, PspError, RngHandle};
use psp_sampler::{find_partitions, make_unique, Budget, Options, TracingSink};
use rand_distr::{Distribution, StandardNormal};

fn sample_chains() -> Vec<Chain<u8>> {
    let mut rng = RngHandle::from_seed(7);
    (0..24)
        .map(|index| {
            let center = [(index % 4) as f64 * 0.3, (index / 4 % 2) as f64 * 5.0, 0.0];
            let mut chain = Chain::new((index % 3) as u8, center.to_vec(), 0.1);
            for _ in 0..200 {
                let point = center
                    .iter()
                    .map(|c| -> f64 {
                        let z: f64 = StandardNormal.sample(rng.inner_mut());
                        c + z
                    })
                    .collect();
                chain.record_step(point, true, 0.1);
            }
            chain
        })
        .collect()
}

fn quadrant(parms: &[f64]) -> Result<u8, PspError> {
    Ok(u8::from(parms[0] >= 0.5) + 2 * u8::from(parms[1] >= 0.5))
}

fn bench_dedup(c: &mut Criterion) {
    let chains = sample_chains();
    let options = Options::default();
    c.bench_function("make_unique_24_chains", |b| {
        b.iter(|| {
            let mut working = chains.clone();
            let _ = make_unique(&mut working, &options, &TracingSink).unwrap();
        })
    });
}

fn bench_search(c: &mut Criterion) {
    let options = Options {
        budget: Budget {
            steps: 200,
            ..Budget::default()
        },
        dedup_interval: 50,
        ..Options::default()
    };
    c.bench_function("find_partitions_quadrants", |b| {
        b.iter(|| {
            let _ = find_partitions(&quadrant, &[vec![0.25, 0.25]], &options).unwrap();
        })
    });
}

criterion_group!(benches, bench_dedup, bench_search);
criterion_main!(benches);
