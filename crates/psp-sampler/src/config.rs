use std::fs;
use std::path::Path;

use psp_core::{ErrorInfo, PspError};
use serde::{Deserialize, Serialize};

/// YAML-configurable parameters governing one `find_partitions` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// Initial proposal radius assigned to every new chain.
    #[serde(default = "default_radius")]
    pub radius: f64,
    /// Per-dimension `[lower, upper]` bounds. Defaults to the unit hypercube.
    #[serde(default)]
    pub bounds: Option<Vec<[f64; 2]>>,
    /// Maximum number of redundant chains merged into a group representative.
    #[serde(default = "default_max_merge")]
    pub max_merge: usize,
    /// Ellipsoid radius, in standard deviations, used by the intersection test.
    #[serde(default = "default_intersection_scale")]
    pub intersection_scale: f64,
    /// Steps between periodic deduplication passes (0 runs it only at the end).
    #[serde(default = "default_dedup_interval")]
    pub dedup_interval: usize,
    /// Variance assigned to dimensions whose sample variance vanishes.
    #[serde(default = "default_variance_floor")]
    pub variance_floor: f64,
    /// Proposal adaptation policy.
    #[serde(default)]
    pub adaptation: AdaptationConfig,
    /// Termination budget.
    #[serde(default)]
    pub budget: Budget,
    /// Worker threads used to advance chains between deduplication points.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Master seed policy.
    #[serde(default)]
    pub seed_policy: SeedPolicy,
    /// Volume estimation settings.
    #[serde(default)]
    pub volume: VolumeConfig,
}

fn default_radius() -> f64 {
    0.1
}

fn default_max_merge() -> usize {
    1
}

fn default_intersection_scale() -> f64 {
    2.0
}

fn default_dedup_interval() -> usize {
    100
}

fn default_variance_floor() -> f64 {
    1e-10
}

fn default_concurrency() -> usize {
    1
}

impl Default for Options {
    fn default() -> Self {
        Self {
            radius: default_radius(),
            bounds: None,
            max_merge: default_max_merge(),
            intersection_scale: default_intersection_scale(),
            dedup_interval: default_dedup_interval(),
            variance_floor: default_variance_floor(),
            adaptation: AdaptationConfig::default(),
            budget: Budget::default(),
            concurrency: default_concurrency(),
            seed_policy: SeedPolicy::default(),
            volume: VolumeConfig::default(),
        }
    }
}

/// Supported proposal adaptation strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AdaptationConfig {
    /// Rescale the radius towards a target acceptance rate.
    Adaptive {
        /// Acceptance rate the controller steers towards.
        #[serde(default = "default_target_rate")]
        target_rate: f64,
        /// Number of steps between adjustments; also the trailing window size.
        #[serde(default = "default_adapt_interval")]
        interval: usize,
        /// Log-scale gain applied to the acceptance error.
        #[serde(default = "default_gain")]
        gain: f64,
        /// Lower clamp for the radius.
        #[serde(default = "default_min_radius")]
        min_radius: f64,
        /// Upper clamp for the radius.
        #[serde(default = "default_max_radius")]
        max_radius: f64,
    },
    /// Keep every chain's radius fixed.
    Disabled,
}

fn default_target_rate() -> f64 {
    0.2
}

fn default_adapt_interval() -> usize {
    20
}

fn default_gain() -> f64 {
    1.0
}

fn default_min_radius() -> f64 {
    1e-4
}

fn default_max_radius() -> f64 {
    1.0
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        AdaptationConfig::Adaptive {
            target_rate: default_target_rate(),
            interval: default_adapt_interval(),
            gain: default_gain(),
            min_radius: default_min_radius(),
            max_radius: default_max_radius(),
        }
    }
}

/// Limits that end a run. Checked between steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    /// Number of steps every chain is advanced by.
    #[serde(default = "default_steps")]
    pub steps: usize,
    /// Stop once this many distinct patterns are known.
    #[serde(default)]
    pub max_regions: Option<usize>,
    /// Wall-clock limit in seconds.
    #[serde(default)]
    pub max_seconds: Option<f64>,
}

fn default_steps() -> usize {
    1_000
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            max_regions: None,
            max_seconds: None,
        }
    }
}

/// Deterministic seeding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Master seed used for the run.
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
}

fn default_master_seed() -> u64 {
    0x05EE_D5EE_DD15_5EED_u64
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            master_seed: default_master_seed(),
        }
    }
}

/// Monte Carlo settings for region volume estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Attach a volume report to the results of `find_partitions`.
    #[serde(default)]
    pub enabled: bool,
    /// Draws inside each region ellipsoid.
    #[serde(default = "default_volume_samples")]
    pub samples: usize,
    /// Uniform draws over the bounding box used for bias correction.
    #[serde(default = "default_volume_samples")]
    pub reference_samples: usize,
    /// Minimum reference hits before a pattern informs the correction.
    #[serde(default = "default_min_reference_hits")]
    pub min_reference_hits: usize,
}

fn default_volume_samples() -> usize {
    10_000
}

fn default_min_reference_hits() -> usize {
    10
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            samples: default_volume_samples(),
            reference_samples: default_volume_samples(),
            min_reference_hits: default_min_reference_hits(),
        }
    }
}

fn config_error(code: &str, message: impl Into<String>) -> PspError {
    PspError::Config(ErrorInfo::new(code, message))
}

impl Options {
    /// Parses options from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PspError> {
        serde_yaml::from_str(yaml)
            .map_err(|err| PspError::Serde(ErrorInfo::new("options-parse", err.to_string())))
    }

    /// Loads options from a YAML file.
    pub fn load(path: &Path) -> Result<Self, PspError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            PspError::Serde(
                ErrorInfo::new("options-read", err.to_string())
                    .with_context("path", path.display()),
            )
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Resolves the bounds for a parameter space of dimension `dimension`.
    pub fn resolved_bounds(&self, dimension: usize) -> Result<Vec<[f64; 2]>, PspError> {
        match &self.bounds {
            None => Ok(vec![[0.0, 1.0]; dimension]),
            Some(bounds) if bounds.len() == dimension => Ok(bounds.clone()),
            Some(bounds) => Err(PspError::Config(
                ErrorInfo::new("invalid-bounds", "bounds do not match the parameter dimension")
                    .with_context("bounds", bounds.len())
                    .with_context("dimension", dimension),
            )),
        }
    }

    /// Checks every field for values the engine cannot work with.
    pub fn validate(&self) -> Result<(), PspError> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(PspError::Config(
                ErrorInfo::new("invalid-radius", "radius must be positive and finite")
                    .with_context("radius", self.radius),
            ));
        }
        if !(self.intersection_scale.is_finite() && self.intersection_scale > 0.0) {
            return Err(PspError::Config(
                ErrorInfo::new("invalid-scale", "intersection scale must be positive")
                    .with_context("scale", self.intersection_scale),
            ));
        }
        if !(self.variance_floor.is_finite() && self.variance_floor > 0.0) {
            return Err(config_error(
                "invalid-variance-floor",
                "variance floor must be positive",
            ));
        }
        if let Some(bounds) = &self.bounds {
            for (dim, [lower, upper]) in bounds.iter().enumerate() {
                if !(lower.is_finite() && upper.is_finite() && lower < upper) {
                    return Err(PspError::Config(
                        ErrorInfo::new("invalid-bounds", "lower bound must be below upper bound")
                            .with_context("dimension", dim)
                            .with_context("lower", lower)
                            .with_context("upper", upper),
                    ));
                }
            }
        }
        if let AdaptationConfig::Adaptive {
            target_rate,
            interval,
            gain,
            min_radius,
            max_radius,
        } = &self.adaptation
        {
            if !(*target_rate > 0.0 && *target_rate < 1.0) {
                return Err(config_error(
                    "invalid-target-rate",
                    "target acceptance rate must lie in (0, 1)",
                ));
            }
            if *interval == 0 {
                return Err(config_error(
                    "invalid-adapt-interval",
                    "adaptation interval must be at least one step",
                ));
            }
            if !(gain.is_finite() && *gain > 0.0) {
                return Err(config_error("invalid-gain", "adaptation gain must be positive"));
            }
            if !(*min_radius > 0.0 && min_radius <= max_radius && max_radius.is_finite()) {
                return Err(PspError::Config(
                    ErrorInfo::new("invalid-radius-bounds", "radius bounds are inconsistent")
                        .with_context("min_radius", min_radius)
                        .with_context("max_radius", max_radius),
                ));
            }
        }
        if self.concurrency == 0 {
            return Err(config_error(
                "invalid-concurrency",
                "at least one worker thread is required",
            ));
        }
        if let Some(seconds) = self.budget.max_seconds {
            if !(seconds.is_finite() && seconds > 0.0) {
                return Err(config_error(
                    "invalid-time-budget",
                    "time budget must be positive",
                ));
            }
        }
        if self.volume.enabled && (self.volume.samples == 0 || self.volume.reference_samples == 0)
        {
            return Err(config_error(
                "invalid-volume-samples",
                "volume estimation needs at least one draw",
            ));
        }
        Ok(())
    }
}
