//! Sampling trajectory record.

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, PspError};

/// One random-walk trajectory confined to the region of a single pattern.
///
/// The three step sequences (`all_parms`, `acceptance`, `radii`) always have
/// equal length. They only grow: either one step at a time through
/// [`Chain::record_step`] or by concatenating another chain through
/// [`Chain::absorb`].
///
/// The walk state (current position, proposal radius and the acceptance
/// window used for radius adaptation) belongs to the chain's own walk and is
/// left alone by [`Chain::absorb`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ChainRecord<P>")]
pub struct Chain<P> {
    pattern: P,
    all_parms: Vec<Vec<f64>>,
    acceptance: Vec<bool>,
    radii: Vec<f64>,
    radius: f64,
    position: Vec<f64>,
    window_steps: usize,
    window_accepted: usize,
}

/// Unchecked wire form of [`Chain`].
#[derive(Deserialize)]
struct ChainRecord<P> {
    pattern: P,
    all_parms: Vec<Vec<f64>>,
    acceptance: Vec<bool>,
    radii: Vec<f64>,
    radius: f64,
    position: Vec<f64>,
    window_steps: usize,
    window_accepted: usize,
}

fn inconsistent(message: &str) -> PspError {
    PspError::Serde(ErrorInfo::new("chain-inconsistent", message))
}

impl<P> TryFrom<ChainRecord<P>> for Chain<P> {
    type Error = PspError;

    fn try_from(record: ChainRecord<P>) -> Result<Self, Self::Error> {
        let steps = record.all_parms.len();
        if steps == 0 {
            return Err(inconsistent("chain has no recorded steps"));
        }
        if record.acceptance.len() != steps || record.radii.len() != steps {
            return Err(PspError::Serde(
                ErrorInfo::new("chain-inconsistent", "step sequences differ in length")
                    .with_context("all_parms", steps)
                    .with_context("acceptance", record.acceptance.len())
                    .with_context("radii", record.radii.len()),
            ));
        }
        let dimension = record.all_parms[0].len();
        if record.all_parms.iter().any(|point| point.len() != dimension)
            || record.position.len() != dimension
        {
            return Err(inconsistent("points differ in dimension"));
        }
        if record.window_accepted > record.window_steps {
            return Err(inconsistent("adaptation window counts more accepts than steps"));
        }
        Ok(Self {
            pattern: record.pattern,
            all_parms: record.all_parms,
            acceptance: record.acceptance,
            radii: record.radii,
            radius: record.radius,
            position: record.position,
            window_steps: record.window_steps,
            window_accepted: record.window_accepted,
        })
    }
}

impl<P> Chain<P> {
    /// Starts a chain at `start`, recording the seed point as an accepted step.
    pub fn new(pattern: P, start: Vec<f64>, radius: f64) -> Self {
        Self {
            pattern,
            all_parms: vec![start.clone()],
            acceptance: vec![true],
            radii: vec![radius],
            radius,
            position: start,
            window_steps: 1,
            window_accepted: 1,
        }
    }

    /// Pattern label of the region this chain explores.
    pub fn pattern(&self) -> &P {
        &self.pattern
    }

    /// Visited parameter vectors in sampling order.
    pub fn all_parms(&self) -> &[Vec<f64>] {
        &self.all_parms
    }

    /// Per-step acceptance flags, parallel to [`Chain::all_parms`].
    pub fn acceptance(&self) -> &[bool] {
        &self.acceptance
    }

    /// Per-step proposal radii, parallel to [`Chain::all_parms`].
    pub fn radii(&self) -> &[f64] {
        &self.radii
    }

    /// Proposal radius used for the next step.
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Replaces the proposal radius used for subsequent steps.
    pub fn set_radius(&mut self, radius: f64) {
        self.radius = radius;
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.all_parms.len()
    }

    /// Always false for chains built through [`Chain::new`].
    pub fn is_empty(&self) -> bool {
        self.all_parms.is_empty()
    }

    /// Dimensionality of the parameter space.
    pub fn dimension(&self) -> usize {
        self.position.len()
    }

    /// Current position of the walk.
    pub fn current(&self) -> &[f64] {
        &self.position
    }

    /// Appends the outcome of one step and moves the walk to `position`.
    pub fn record_step(&mut self, position: Vec<f64>, accepted: bool, radius: f64) {
        self.all_parms.push(position.clone());
        self.acceptance.push(accepted);
        self.radii.push(radius);
        self.position = position;
        self.window_steps += 1;
        if accepted {
            self.window_accepted += 1;
        }
    }

    /// Concatenates the step history of `other` onto this chain. The walk
    /// state of `self` is kept.
    pub fn absorb(&mut self, other: &Chain<P>) {
        self.all_parms.extend(other.all_parms.iter().cloned());
        self.acceptance.extend_from_slice(&other.acceptance);
        self.radii.extend_from_slice(&other.radii);
    }

    /// Own steps recorded since the adaptation window was last reset.
    pub fn window_steps(&self) -> usize {
        self.window_steps
    }

    /// Acceptance rate over the current adaptation window.
    pub fn window_rate(&self) -> f64 {
        if self.window_steps == 0 {
            return 0.0;
        }
        self.window_accepted as f64 / self.window_steps as f64
    }

    /// Starts a new adaptation window.
    pub fn reset_window(&mut self) {
        self.window_steps = 0;
        self.window_accepted = 0;
    }

    /// Number of accepted steps, the seed point included.
    pub fn accepted_count(&self) -> usize {
        self.acceptance.iter().filter(|&&flag| flag).count()
    }

    /// Fraction of recorded steps that were accepted.
    pub fn acceptance_rate(&self) -> f64 {
        if self.acceptance.is_empty() {
            return 0.0;
        }
        self.accepted_count() as f64 / self.acceptance.len() as f64
    }

    /// A chain is mature once it holds more distinct accepted points than
    /// dimensions, which is what a non-degenerate covariance needs.
    pub fn is_mature(&self) -> bool {
        self.accepted_count() > self.dimension()
    }
}
