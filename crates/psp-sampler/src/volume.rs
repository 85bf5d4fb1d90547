//! Region volume estimates.
//!
//! Each region is approximated by the scaled sample ellipsoid of its chain.
//! Uniform draws inside that ellipsoid give the fraction of it that actually
//! belongs to the region, and the product with the ellipsoid volume is the raw
//! estimate. [`bias_correction`] rescales the raw estimates against a uniform
//! reference sample of the whole bounding box.

use std::f64::consts::PI;

use indexmap::IndexMap;
use nalgebra::DVector;
use psp_core::{Chain, Classifier, ErrorInfo, Pattern, PspError, RngHandle};
use serde::{Deserialize, Serialize};

use crate::config::{Options, VolumeConfig};
use crate::determinism;
use crate::intersect::{upper_factor, Ellipsoid};
use crate::moves::{unit_ball_point, within_bounds};

/// Monte Carlo volume estimate for a single chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeEstimate<P> {
    /// Pattern of the region.
    pub pattern: P,
    /// Index of the chain within the collection it was taken from.
    pub chain_index: usize,
    /// Volume of the scaled ellipsoid.
    pub ellipsoid_volume: f64,
    /// Draws classified into the region and inside the bounds.
    pub hits: usize,
    /// Draws taken inside the ellipsoid.
    pub samples: usize,
    /// `ellipsoid_volume * hits / samples`.
    pub raw_volume: f64,
}

impl<P> VolumeEstimate<P> {
    /// Fraction of the ellipsoid draws that landed in the region.
    pub fn hit_rate(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.hits as f64 / self.samples as f64
        }
    }
}

/// Raw and corrected volume of one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionVolume<P> {
    /// Pattern of the region.
    pub pattern: P,
    /// Index of the chain the region was estimated from.
    pub chain_index: usize,
    /// Uncorrected estimate.
    pub raw_volume: f64,
    /// Bias corrected estimate.
    pub corrected_volume: f64,
}

/// Volume totals for one pattern, summed over its regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternVolume<P> {
    /// Pattern label.
    pub pattern: P,
    /// Sum of the raw region estimates.
    pub raw_volume: f64,
    /// Sum of the corrected region estimates.
    pub corrected_volume: f64,
    /// Number of regions sharing the pattern.
    pub regions: usize,
}

/// Volume estimates for every region of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeReport<P> {
    /// Per-region estimates, in chain order.
    pub regions: Vec<RegionVolume<P>>,
    /// Multiplicative factor applied to the raw estimates.
    pub correction_factor: f64,
    /// Volume of the bounding box.
    pub box_volume: f64,
    /// Reference volumes from the uniform box sample, in first-seen order.
    pub reference: Vec<PatternVolume<P>>,
    /// Chains left out because they had too few accepted points.
    pub skipped_chains: usize,
}

impl<P: Pattern> VolumeReport<P> {
    /// Aggregates region estimates per pattern, in first-seen order.
    pub fn by_pattern(&self) -> Vec<PatternVolume<P>> {
        let mut totals: IndexMap<&P, PatternVolume<P>> = IndexMap::new();
        for region in &self.regions {
            let entry = totals
                .entry(&region.pattern)
                .or_insert_with(|| PatternVolume {
                    pattern: region.pattern.clone(),
                    raw_volume: 0.0,
                    corrected_volume: 0.0,
                    regions: 0,
                });
            entry.raw_volume += region.raw_volume;
            entry.corrected_volume += region.corrected_volume;
            entry.regions += 1;
        }
        totals.into_values().collect()
    }
}

/// Volume of the unit ball in `dim` dimensions.
pub fn unit_ball_volume(dim: usize) -> f64 {
    // V_d = V_{d-2} * 2π / d
    let (mut even, mut odd) = (1.0, 2.0);
    if dim == 0 {
        return even;
    }
    for d in 2..=dim {
        if d % 2 == 0 {
            even *= 2.0 * PI / d as f64;
        } else {
            odd *= 2.0 * PI / d as f64;
        }
    }
    if dim % 2 == 0 {
        even
    } else {
        odd
    }
}

/// Volume of `{x : (x - c)ᵗ Σ⁻¹ (x - c) ≤ scale²}`.
pub fn ellipsoid_volume(ellipsoid: &Ellipsoid, scale: f64) -> Result<f64, PspError> {
    let determinant = ellipsoid.covariance().determinant();
    if !(determinant.is_finite() && determinant > 0.0) {
        return Err(PspError::Numerical(
            ErrorInfo::new(
                "covariance-not-positive-definite",
                "covariance determinant is not positive",
            )
            .with_context("determinant", determinant),
        ));
    }
    let dim = ellipsoid.dimension();
    Ok(unit_ball_volume(dim) * scale.powi(dim as i32) * determinant.sqrt())
}

/// Estimates the volume of the region explored by `chain`.
///
/// Draws `options.volume.samples` points uniformly inside the chain's scaled
/// sample ellipsoid and counts those that are inside `bounds` and classified
/// into the chain's pattern.
pub fn estimate_volume<P, C>(
    classifier: &C,
    chain: &Chain<P>,
    chain_index: usize,
    bounds: &[[f64; 2]],
    options: &Options,
    rng: &mut RngHandle,
) -> Result<VolumeEstimate<P>, PspError>
where
    P: Pattern,
    C: Classifier<P> + ?Sized,
{
    let ellipsoid = Ellipsoid::from_chain(chain, options.variance_floor)
        .map_err(|err| err.with_context("chain", chain_index))?;
    let scale = options.intersection_scale;
    let volume = ellipsoid_volume(&ellipsoid, scale)?;
    let lower = upper_factor(ellipsoid.covariance(), "region")?.transpose();

    let samples = options.volume.samples;
    let mut hits = 0usize;
    for _ in 0..samples {
        let offset = DVector::from_vec(unit_ball_point(ellipsoid.dimension(), rng)) * scale;
        let point = ellipsoid.center() + &lower * offset;
        let point = point.as_slice();
        if within_bounds(point, bounds) && classifier.classify(point)? == *chain.pattern() {
            hits += 1;
        }
    }
    let raw_volume = if samples == 0 {
        0.0
    } else {
        volume * hits as f64 / samples as f64
    };
    Ok(VolumeEstimate {
        pattern: chain.pattern().clone(),
        chain_index,
        ellipsoid_volume: volume,
        hits,
        samples,
        raw_volume,
    })
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Corrects raw ellipsoid estimates against a uniform sample of the box.
///
/// Patterns hit at least `min_reference_hits` times by the uniform sample get
/// a reference volume; the median ratio of reference to raw volume over those
/// patterns becomes the correction factor. Corrected volumes never add up to
/// more than the box.
pub fn bias_correction<P, C>(
    classifier: &C,
    estimates: &[VolumeEstimate<P>],
    bounds: &[[f64; 2]],
    config: &VolumeConfig,
    rng: &mut RngHandle,
) -> Result<VolumeReport<P>, PspError>
where
    P: Pattern,
    C: Classifier<P> + ?Sized,
{
    let box_volume: f64 = bounds.iter().map(|[lower, upper]| upper - lower).product();
    let draws = config.reference_samples;

    let mut counts: IndexMap<P, usize> = IndexMap::new();
    let mut point = vec![0.0; bounds.len()];
    for _ in 0..draws {
        for (slot, [lower, upper]) in bounds.iter().enumerate() {
            point[slot] = rng.uniform(*lower, *upper);
        }
        *counts.entry(classifier.classify(&point)?).or_insert(0) += 1;
    }

    let mut raw_totals: IndexMap<&P, f64> = IndexMap::new();
    for estimate in estimates {
        *raw_totals.entry(&estimate.pattern).or_insert(0.0) += estimate.raw_volume;
    }

    let mut reference = Vec::with_capacity(counts.len());
    let mut ratios = Vec::new();
    for (pattern, &count) in &counts {
        let reference_volume = if draws == 0 {
            0.0
        } else {
            box_volume * count as f64 / draws as f64
        };
        if count >= config.min_reference_hits {
            if let Some(&raw) = raw_totals.get(pattern) {
                if raw > 0.0 {
                    ratios.push(reference_volume / raw);
                }
            }
        }
        reference.push(PatternVolume {
            pattern: pattern.clone(),
            raw_volume: raw_totals.get(pattern).copied().unwrap_or(0.0),
            corrected_volume: reference_volume,
            regions: estimates.iter().filter(|e| &e.pattern == pattern).count(),
        });
    }

    let correction_factor = match median(&mut ratios) {
        Some(factor) => factor,
        None => {
            tracing::warn!(
                draws,
                min_hits = config.min_reference_hits,
                "no pattern has enough reference hits; volumes left uncorrected"
            );
            1.0
        }
    };

    let mut regions: Vec<RegionVolume<P>> = estimates
        .iter()
        .map(|estimate| RegionVolume {
            pattern: estimate.pattern.clone(),
            chain_index: estimate.chain_index,
            raw_volume: estimate.raw_volume,
            corrected_volume: estimate.raw_volume * correction_factor,
        })
        .collect();
    let total: f64 = regions.iter().map(|region| region.corrected_volume).sum();
    if total > box_volume && total > 0.0 {
        let shrink = box_volume / total;
        for region in &mut regions {
            region.corrected_volume *= shrink;
        }
    }

    Ok(VolumeReport {
        regions,
        correction_factor,
        box_volume,
        reference,
        skipped_chains: 0,
    })
}

/// Estimates and corrects the volume of every mature chain in `chains`.
pub fn estimate_volumes<P, C>(
    classifier: &C,
    chains: &[Chain<P>],
    options: &Options,
) -> Result<VolumeReport<P>, PspError>
where
    P: Pattern,
    C: Classifier<P> + ?Sized,
{
    let dimension = chains.first().map_or(0, Chain::dimension);
    let bounds = options.resolved_bounds(dimension)?;
    let seed = options.seed_policy.master_seed;

    let mut estimates = Vec::with_capacity(chains.len());
    let mut skipped = 0usize;
    for (index, chain) in chains.iter().enumerate() {
        if !chain.is_mature() {
            tracing::warn!(
                chain = index,
                accepted = chain.accepted_count(),
                "chain too short for a volume estimate"
            );
            skipped += 1;
            continue;
        }
        let mut rng = RngHandle::from_seed(determinism::region_seed(seed, index));
        estimates.push(estimate_volume(
            classifier, chain, index, &bounds, options, &mut rng,
        )?);
    }

    let mut rng = RngHandle::from_seed(determinism::reference_seed(seed));
    let mut report = bias_correction(classifier, &estimates, &bounds, &options.volume, &mut rng)?;
    report.skipped_chains = skipped;
    Ok(report)
}
