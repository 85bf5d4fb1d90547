use psp_core::Chain;

use crate::config::AdaptationConfig;

/// Parameters of the acceptance-targeting radius controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveSettings {
    /// Acceptance rate the controller steers towards.
    pub target_rate: f64,
    /// Steps between adjustments and size of the trailing window.
    pub interval: usize,
    /// Log-scale gain applied to the acceptance error.
    pub gain: f64,
    /// Lower clamp for the radius.
    pub min_radius: f64,
    /// Upper clamp for the radius.
    pub max_radius: f64,
}

/// Proposal tuning strategy, chosen once per run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdaptationPolicy {
    /// Rescale the radius towards the target acceptance rate.
    Adaptive(AdaptiveSettings),
    /// Leave the radius untouched.
    Disabled,
}

impl AdaptationPolicy {
    /// Builds the policy described by the configuration.
    pub fn from_config(config: &AdaptationConfig) -> Self {
        match config {
            AdaptationConfig::Adaptive {
                target_rate,
                interval,
                gain,
                min_radius,
                max_radius,
            } => AdaptationPolicy::Adaptive(AdaptiveSettings {
                target_rate: *target_rate,
                interval: *interval,
                gain: *gain,
                min_radius: *min_radius,
                max_radius: *max_radius,
            }),
            AdaptationConfig::Disabled => AdaptationPolicy::Disabled,
        }
    }

    /// Adjusts the proposal state of `chain` after a step.
    pub fn apply<P>(&self, chain: &mut Chain<P>) {
        match self {
            AdaptationPolicy::Adaptive(settings) => adapt(chain, settings),
            AdaptationPolicy::Disabled => no_adaptation(chain),
        }
    }
}

/// Once the chain has walked `interval` steps since the last adjustment,
/// multiplies the radius by `exp(gain * (rate - target_rate))` where `rate` is
/// the acceptance rate of those steps, then clamps it to the configured bounds.
/// Samples merged in from other chains do not count towards the window.
pub fn adapt<P>(chain: &mut Chain<P>, settings: &AdaptiveSettings) {
    if settings.interval == 0 || chain.window_steps() < settings.interval {
        return;
    }
    let rate = chain.window_rate();
    chain.reset_window();
    let scaled = chain.radius() * (settings.gain * (rate - settings.target_rate)).exp();
    chain.set_radius(scaled.clamp(settings.min_radius, settings.max_radius));
}

/// Leaves the chain as it is.
pub fn no_adaptation<P>(_chain: &mut Chain<P>) {}
