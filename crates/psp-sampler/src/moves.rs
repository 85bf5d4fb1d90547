use psp_core::RngHandle;
use rand_distr::{Distribution, StandardNormal};

/// Candidate point generated by the random-walk proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveProposal {
    /// Proposed parameter vector.
    pub candidate: Vec<f64>,
    /// Radius of the hypersphere the candidate was drawn from.
    pub radius: f64,
    /// Whether the candidate lies inside the parameter bounds.
    pub in_bounds: bool,
}

/// Draws a point uniformly from the unit ball of dimension `dim`.
pub fn unit_ball_point(dim: usize, rng: &mut RngHandle) -> Vec<f64> {
    if dim == 0 {
        return Vec::new();
    }
    let mut direction: Vec<f64> = (0..dim)
        .map(|_| -> f64 { StandardNormal.sample(rng.inner_mut()) })
        .collect();
    let norm = direction.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm == 0.0 {
        direction[0] = 1.0;
        return direction;
    }
    let length = rng.unit().powf(1.0 / dim as f64);
    for value in &mut direction {
        *value *= length / norm;
    }
    direction
}

/// True when every coordinate lies within its `[lower, upper]` interval.
pub fn within_bounds(point: &[f64], bounds: &[[f64; 2]]) -> bool {
    point.len() == bounds.len()
        && point
            .iter()
            .zip(bounds)
            .all(|(value, [lower, upper])| *value >= *lower && *value <= *upper)
}

/// Proposes a move uniformly inside the hypersphere of `radius` around `current`.
pub fn propose(
    current: &[f64],
    radius: f64,
    bounds: &[[f64; 2]],
    rng: &mut RngHandle,
) -> MoveProposal {
    let offset = unit_ball_point(current.len(), rng);
    let candidate: Vec<f64> = current
        .iter()
        .zip(offset)
        .map(|(value, delta)| value + radius * delta)
        .collect();
    let in_bounds = within_bounds(&candidate, bounds);
    MoveProposal {
        candidate,
        radius,
        in_bounds,
    }
}
