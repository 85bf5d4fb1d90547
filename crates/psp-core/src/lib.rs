#![deny(missing_docs)]
#![doc = "Core traits and data types for the parameter space partitioning engine."]

use std::fmt::Debug;
use std::hash::Hash;

pub mod chain;
pub mod errors;
pub mod rng;

pub use chain::Chain;
pub use errors::{ErrorInfo, PspError};
pub use rng::{derive_substream_seed, RngHandle};

/// Discrete label identifying the qualitative region of a parameter point.
///
/// Labels are compared for exact equality and hashed when chains are grouped.
pub trait Pattern: Clone + Eq + Hash + Debug + Send + Sync {}

impl<T> Pattern for T where T: Clone + Eq + Hash + Debug + Send + Sync {}

/// User supplied model evaluation that maps a parameter point to a pattern.
///
/// Implementations must be safe to call concurrently from several worker
/// threads. Errors are propagated unchanged by the engine.
pub trait Classifier<P: Pattern>: Send + Sync {
    /// Evaluates the model at `parms` and classifies its behaviour.
    fn classify(&self, parms: &[f64]) -> Result<P, PspError>;
}

impl<P, F> Classifier<P> for F
where
    P: Pattern,
    F: Fn(&[f64]) -> Result<P, PspError> + Send + Sync,
{
    fn classify(&self, parms: &[f64]) -> Result<P, PspError> {
        self(parms)
    }
}
