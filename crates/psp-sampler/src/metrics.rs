use psp_core::Chain;
use serde::{Deserialize, Serialize};

use crate::dedup::DedupSummary;

/// Reason the sampling loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Termination {
    /// Every chain was advanced by the configured number of steps.
    StepsExhausted,
    /// The configured number of distinct patterns was reached.
    RegionLimit,
    /// The wall-clock budget ran out.
    TimeLimit,
}

/// Counters accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Sampling iterations completed (each advances every live chain once).
    pub steps_completed: usize,
    /// Proposals issued across all chains.
    pub proposals: usize,
    /// Proposals that stayed inside the chain's region.
    pub accepted: usize,
    /// Proposals rejected for leaving the parameter bounds.
    pub out_of_bounds: usize,
    /// Chains created from the supplied start points.
    pub chains_seeded: usize,
    /// Chains created at newly discovered patterns.
    pub chains_spawned: usize,
    /// Deduplication passes executed, the final one included.
    pub dedup_passes: usize,
    /// Chains whose samples were merged into a representative.
    pub chains_merged: usize,
    /// Chains deleted by deduplication.
    pub chains_removed: usize,
}

impl RunStatistics {
    /// Fraction of proposals that were accepted.
    pub fn acceptance_rate(&self) -> f64 {
        if self.proposals == 0 {
            0.0
        } else {
            self.accepted as f64 / self.proposals as f64
        }
    }

    pub(crate) fn record_dedup(&mut self, summary: &DedupSummary) {
        self.dedup_passes += 1;
        self.chains_merged += summary.merged;
        self.chains_removed += summary.removed;
    }
}

/// Compact description of one final chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSummary<P> {
    /// Pattern of the chain's region.
    pub pattern: P,
    /// Recorded steps.
    pub samples: usize,
    /// Accepted steps, the seed included.
    pub accepted: usize,
    /// Fraction of accepted steps.
    pub acceptance_rate: f64,
    /// Proposal radius at the end of the run.
    pub radius: f64,
    /// Mean of the visited points.
    pub centroid: Vec<f64>,
}

impl<P: Clone> ChainSummary<P> {
    /// Summarises `chain`.
    pub fn from_chain(chain: &Chain<P>) -> Self {
        let mut centroid = vec![0.0; chain.dimension()];
        for point in chain.all_parms() {
            for (slot, value) in point.iter().enumerate() {
                centroid[slot] += value;
            }
        }
        let count = chain.len().max(1) as f64;
        for value in &mut centroid {
            *value /= count;
        }
        Self {
            pattern: chain.pattern().clone(),
            samples: chain.len(),
            accepted: chain.accepted_count(),
            acceptance_rate: chain.acceptance_rate(),
            radius: chain.radius(),
            centroid,
        }
    }
}
