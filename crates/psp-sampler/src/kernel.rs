use std::time::Instant;

use indexmap::IndexSet;
use psp_core::{Chain, Classifier, ErrorInfo, Pattern, PspError, RngHandle};
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::adapt::AdaptationPolicy;
use crate::config::{Budget, Options};
use crate::dedup::{make_unique, DedupSummary};
use crate::determinism;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::metrics::{ChainSummary, RunStatistics, Termination};
use crate::moves;
use crate::results::Results;
use crate::volume;

/// What happened to one chain during one step.
#[derive(Debug, Clone, PartialEq)]
struct StepOutcome<P> {
    accepted: bool,
    in_bounds: bool,
    /// Rejected proposal and the foreign pattern it was classified into.
    foreign: Option<(Vec<f64>, P)>,
}

/// Explores the parameter space from `start_points` and returns one chain per
/// discovered region. Diagnostics go to `tracing`.
pub fn find_partitions<P, C>(
    classifier: &C,
    start_points: &[Vec<f64>],
    options: &Options,
) -> Result<Results<P>, PspError>
where
    P: Pattern,
    C: Classifier<P>,
{
    find_partitions_with_sink(classifier, start_points, options, &TracingSink)
}

/// [`find_partitions`] with a caller supplied diagnostic sink.
pub fn find_partitions_with_sink<P, C>(
    classifier: &C,
    start_points: &[Vec<f64>],
    options: &Options,
    sink: &dyn DiagnosticSink,
) -> Result<Results<P>, PspError>
where
    P: Pattern,
    C: Classifier<P>,
{
    options.validate()?;
    let dimension = start_dimension(start_points)?;
    let bounds = options.resolved_bounds(dimension)?;
    for (index, point) in start_points.iter().enumerate() {
        if !moves::within_bounds(point, &bounds) {
            return Err(PspError::Config(
                ErrorInfo::new("start-out-of-bounds", "start point lies outside the bounds")
                    .with_context("start", index),
            ));
        }
    }
    let policy = AdaptationPolicy::from_config(&options.adaptation);
    let seed = options.seed_policy.master_seed;
    let pool = build_pool(options.concurrency)?;

    let mut statistics = RunStatistics::default();
    let mut known: IndexSet<P> = IndexSet::new();
    let mut chains = Vec::with_capacity(start_points.len());
    for point in start_points {
        let pattern = classifier.classify(point)?;
        known.insert(pattern.clone());
        chains.push(Chain::new(pattern, point.clone(), options.radius));
    }
    statistics.chains_seeded = chains.len();
    tracing::info!(
        chains = chains.len(),
        patterns = known.len(),
        dimension,
        "seeded chains"
    );

    let started = Instant::now();
    let mut termination = Termination::StepsExhausted;
    for step in 0..options.budget.steps {
        if let Some(reason) = budget_exhausted(&options.budget, known.len(), started) {
            termination = reason;
            break;
        }
        let outcomes = advance_all(
            &mut chains,
            classifier,
            &bounds,
            &policy,
            seed,
            step,
            pool.as_ref(),
        )?;
        statistics.steps_completed += 1;
        for outcome in outcomes {
            statistics.proposals += 1;
            if outcome.accepted {
                statistics.accepted += 1;
            }
            if !outcome.in_bounds {
                statistics.out_of_bounds += 1;
            }
            if let Some((point, pattern)) = outcome.foreign {
                if known.insert(pattern.clone()) {
                    tracing::info!(?pattern, step, "discovered new pattern");
                    chains.push(Chain::new(pattern, point, options.radius));
                    statistics.chains_spawned += 1;
                }
            }
        }
        if options.dedup_interval > 0 && (step + 1) % options.dedup_interval == 0 {
            let summary = deduplicate_mature(&mut chains, options, sink)?;
            statistics.record_dedup(&summary);
        }
    }
    let summary = deduplicate_mature(&mut chains, options, sink)?;
    statistics.record_dedup(&summary);
    tracing::info!(
        ?termination,
        chains = chains.len(),
        patterns = known.len(),
        steps = statistics.steps_completed,
        "partition search finished"
    );

    let volumes = if options.volume.enabled {
        Some(volume::estimate_volumes(classifier, &chains, options)?)
    } else {
        None
    };
    Ok(Results {
        summaries: chains.iter().map(ChainSummary::from_chain).collect(),
        chains,
        patterns: known.into_iter().collect(),
        statistics,
        termination,
        volumes,
    })
}

fn start_dimension(start_points: &[Vec<f64>]) -> Result<usize, PspError> {
    let Some(first) = start_points.first() else {
        return Err(PspError::Config(
            ErrorInfo::new("no-start-points", "at least one start point is required")
                .with_hint("pass one point per chain to seed"),
        ));
    };
    let dimension = first.len();
    if dimension == 0 {
        return Err(PspError::Config(ErrorInfo::new(
            "empty-start-point",
            "start points need at least one coordinate",
        )));
    }
    if let Some(index) = start_points.iter().position(|p| p.len() != dimension) {
        return Err(PspError::Config(
            ErrorInfo::new("dimension-mismatch", "start points have differing dimensions")
                .with_context("start", index)
                .with_context("dimension", dimension),
        ));
    }
    Ok(dimension)
}

fn build_pool(concurrency: usize) -> Result<Option<ThreadPool>, PspError> {
    if concurrency <= 1 {
        return Ok(None);
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency)
        .build()
        .map(Some)
        .map_err(|err| PspError::Config(ErrorInfo::new("thread-pool", err.to_string())))
}

fn budget_exhausted(budget: &Budget, patterns: usize, started: Instant) -> Option<Termination> {
    if budget.max_regions.is_some_and(|limit| patterns >= limit) {
        return Some(Termination::RegionLimit);
    }
    if budget
        .max_seconds
        .is_some_and(|limit| started.elapsed().as_secs_f64() >= limit)
    {
        return Some(Termination::TimeLimit);
    }
    None
}

/// Advances every chain by one step. Each chain draws from its own substream,
/// so the outcome does not depend on the pool.
fn advance_all<P, C>(
    chains: &mut [Chain<P>],
    classifier: &C,
    bounds: &[[f64; 2]],
    policy: &AdaptationPolicy,
    seed: u64,
    step: usize,
    pool: Option<&ThreadPool>,
) -> Result<Vec<StepOutcome<P>>, PspError>
where
    P: Pattern,
    C: Classifier<P>,
{
    let advance = |(slot, chain): (usize, &mut Chain<P>)| {
        let mut rng = RngHandle::from_seed(determinism::step_seed(seed, slot, step));
        advance_chain(chain, classifier, bounds, policy, &mut rng)
    };
    match pool {
        Some(pool) => pool.install(|| chains.par_iter_mut().enumerate().map(advance).collect()),
        None => chains.iter_mut().enumerate().map(advance).collect(),
    }
}

fn advance_chain<P, C>(
    chain: &mut Chain<P>,
    classifier: &C,
    bounds: &[[f64; 2]],
    policy: &AdaptationPolicy,
    rng: &mut RngHandle,
) -> Result<StepOutcome<P>, PspError>
where
    P: Pattern,
    C: Classifier<P>,
{
    let radius = chain.radius();
    let proposal = moves::propose(chain.current(), radius, bounds, rng);
    let outcome = if !proposal.in_bounds {
        let current = chain.current().to_vec();
        chain.record_step(current, false, radius);
        StepOutcome {
            accepted: false,
            in_bounds: false,
            foreign: None,
        }
    } else {
        let pattern = classifier.classify(&proposal.candidate)?;
        if pattern == *chain.pattern() {
            chain.record_step(proposal.candidate, true, radius);
            StepOutcome {
                accepted: true,
                in_bounds: true,
                foreign: None,
            }
        } else {
            let current = chain.current().to_vec();
            chain.record_step(current, false, radius);
            StepOutcome {
                accepted: false,
                in_bounds: true,
                foreign: Some((proposal.candidate, pattern)),
            }
        }
    };
    policy.apply(chain);
    Ok(outcome)
}

/// Runs [`make_unique`] over the chains with enough accepted points for a
/// covariance; younger chains are kept as they are, after the survivors.
fn deduplicate_mature<P: Pattern>(
    chains: &mut Vec<Chain<P>>,
    options: &Options,
    sink: &dyn DiagnosticSink,
) -> Result<DedupSummary, PspError> {
    let (mut mature, pending): (Vec<_>, Vec<_>) =
        std::mem::take(chains).into_iter().partition(Chain::is_mature);
    let summary = make_unique(&mut mature, options, sink);
    mature.extend(pending);
    *chains = mature;
    summary
}
