//! Stage 3b: draw one donor per target row from its candidate list.
//!
//! Pure nearest-neighbor assignment would always resolve equal and
//! near-equal scores toward whichever donor happens to sort first, biasing
//! the enriched population. The draw is randomized instead: candidate
//! weights fall linearly with distance, and full-tie lists are drawn
//! uniformly.

use rand::Rng;

use crate::matching::neighbors::Neighbor;

/// Piecewise linear score-to-weight mapping: 100 at distance zero down to 5
/// at the largest candidate distance. When `max_distance` is zero every
/// candidate weighs 100.
pub fn weight(distance: f64, max_distance: f64) -> f64 {
    if max_distance == 0.0 {
        100.0
    } else {
        100.0 - (distance / max_distance) * 95.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DrawOutcome {
    pub donor_index: usize,
    pub distance: f64,
    /// True when the all-ties uniform branch resolved this row.
    pub uniform_branch: bool,
}

/// Pick one candidate from a non-empty list.
///
/// If every candidate sits at distance exactly zero, the draw is uniform
/// over the whole list. Otherwise each candidate is drawn with probability
/// proportional to `weight(distance, max_distance)`. The two branches are
/// deliberately distinct: folding the tie case into the weighted formula
/// would divide by zero, and the branch keeps the tie distribution testable.
pub fn draw_match<R: Rng>(rng: &mut R, candidates: &[Neighbor]) -> DrawOutcome {
    debug_assert!(!candidates.is_empty());

    let all_ties = candidates.iter().all(|c| c.distance == 0.0);
    if all_ties {
        let chosen = candidates[rng.gen_range(0..candidates.len())];
        return DrawOutcome {
            donor_index: chosen.donor_index,
            distance: chosen.distance,
            uniform_branch: true,
        };
    }

    let max_distance = candidates.iter().fold(0.0f64, |m, c| m.max(c.distance));
    let weights: Vec<f64> = candidates
        .iter()
        .map(|c| weight(c.distance, max_distance))
        .collect();
    let total: f64 = weights.iter().sum();

    let mut draw = rng.gen_range(0.0..total);
    for (candidate, w) in candidates.iter().zip(&weights) {
        if draw < *w {
            return DrawOutcome {
                donor_index: candidate.donor_index,
                distance: candidate.distance,
                uniform_branch: false,
            };
        }
        draw -= w;
    }

    // Floating-point remainder lands on the last candidate.
    let last = candidates[candidates.len() - 1];
    DrawOutcome {
        donor_index: last.donor_index,
        distance: last.distance,
        uniform_branch: false,
    }
}
