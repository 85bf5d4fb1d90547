use std::fs;
use std::path::Path;

use psp_core::{Chain, Classifier, ErrorInfo, Pattern, PspError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::Options;
use crate::metrics::{ChainSummary, RunStatistics, Termination};
use crate::volume::{self, VolumeReport};

/// Output of [`crate::find_partitions`], owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Results<P> {
    /// Deduplicated chains, one per discovered region.
    pub chains: Vec<Chain<P>>,
    /// Per-chain summaries, parallel to `chains`.
    pub summaries: Vec<ChainSummary<P>>,
    /// Every pattern observed during the run, in discovery order.
    pub patterns: Vec<P>,
    /// Counters accumulated over the run.
    pub statistics: RunStatistics,
    /// Why the run stopped.
    pub termination: Termination,
    /// Region volumes, present when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volumes: Option<VolumeReport<P>>,
}

impl<P: Pattern> Results<P> {
    /// Chains exploring regions labelled `pattern`.
    pub fn chains_for<'a>(&'a self, pattern: &'a P) -> impl Iterator<Item = &'a Chain<P>> + 'a {
        self.chains
            .iter()
            .filter(move |chain| chain.pattern() == pattern)
    }

    /// Computes the volume report and stores it on the results.
    pub fn estimate_volumes<C>(
        &mut self,
        classifier: &C,
        options: &Options,
    ) -> Result<&VolumeReport<P>, PspError>
    where
        C: Classifier<P> + ?Sized,
    {
        let report = volume::estimate_volumes(classifier, &self.chains, options)?;
        Ok(self.volumes.insert(report))
    }
}

impl<P: Serialize> Results<P> {
    /// Serialises the results as pretty printed JSON.
    pub fn to_json(&self) -> Result<String, PspError> {
        serde_json::to_string_pretty(self)
            .map_err(|err| PspError::Serde(ErrorInfo::new("results-serialize", err.to_string())))
    }

    /// Writes the results to a JSON file, creating parent directories.
    pub fn store(&self, path: &Path) -> Result<(), PspError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                PspError::Serde(
                    ErrorInfo::new("results-mkdir", err.to_string())
                        .with_context("path", parent.display()),
                )
            })?;
        }
        fs::write(path, self.to_json()?).map_err(|err| {
            PspError::Serde(
                ErrorInfo::new("results-write", err.to_string())
                    .with_context("path", path.display()),
            )
        })
    }
}

impl<P: DeserializeOwned> Results<P> {
    /// Parses results from JSON.
    pub fn from_json(json: &str) -> Result<Self, PspError> {
        serde_json::from_str(json)
            .map_err(|err| PspError::Serde(ErrorInfo::new("results-parse", err.to_string())))
    }

    /// Loads results from a JSON file.
    pub fn load(path: &Path) -> Result<Self, PspError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            PspError::Serde(
                ErrorInfo::new("results-read", err.to_string())
                    .with_context("path", path.display()),
            )
        })?;
        Self::from_json(&contents)
    }
}
