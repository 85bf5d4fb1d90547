#![deny(missing_docs)]

//! Region-growing sampler for parameter space partitioning.
//!
//! [`find_partitions`] seeds one random-walk chain per start point, advances
//! every chain with uniform hypersphere proposals classified by a user supplied
//! [`Classifier`](psp_core::Classifier), spawns a chain whenever a new pattern
//! is found and periodically collapses chains that explore the same region via
//! [`make_unique`]. Region volumes are estimated by [`volume`].

/// Proposal radius adaptation policies.
pub mod adapt;
/// YAML configuration schema and defaults.
pub mod config;
/// Pattern grouping, merging and pruning of redundant chains.
pub mod dedup;
/// Deterministic seed derivation helpers.
pub mod determinism;
/// Injectable sinks for non-fatal numerical diagnostics.
pub mod diagnostics;
/// Hyperellipsoid overlap test.
pub mod intersect;
/// Core sampling loop and public `find_partitions` entry points.
pub mod kernel;
/// Run statistics and chain summaries.
pub mod metrics;
/// Random-walk proposal utilities.
pub mod moves;
/// Results aggregate and JSON persistence.
pub mod results;
/// Region volume estimation and bias correction.
pub mod volume;

pub use adapt::{adapt, no_adaptation, AdaptationPolicy, AdaptiveSettings};
pub use config::{AdaptationConfig, Budget, Options, SeedPolicy, VolumeConfig};
pub use dedup::{
    get_group_indices, group_by_pattern, make_unique, merge_chains, remove_redundant_chains,
    DedupSummary,
};
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticSink, TracingSink};
pub use intersect::{chains_intersect, intersects, Ellipsoid, DEFAULT_SCALE};
pub use kernel::{find_partitions, find_partitions_with_sink};
pub use metrics::{ChainSummary, RunStatistics, Termination};
pub use results::Results;
pub use volume::{
    bias_correction, ellipsoid_volume, estimate_volume, estimate_volumes, PatternVolume,
    RegionVolume, VolumeEstimate, VolumeReport,
};
