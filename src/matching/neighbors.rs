//! Stage 3a: k-nearest donor search over the scalar propensity key.

use std::cmp::Ordering;

/// One donor candidate for a target row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position in the donor subset, not in the pooled table.
    pub donor_index: usize,
    pub distance: f64,
}

/// k-nearest lookup over donor propensity scores.
///
/// The single-method seam lets the concrete search structure be swapped
/// without touching the matcher or fusion stages.
pub trait PropensityIndex {
    /// The `k` donors closest to `score` by absolute propensity difference,
    /// sorted ascending by distance, exact ties in donor row order. Returns
    /// fewer than `k` only when the donor pool itself is smaller than `k`.
    fn query(&self, score: f64, k: usize) -> Vec<Neighbor>;
}

/// Sorted score array with binary-search seeding and two-pointer expansion.
pub struct SortedScoreIndex {
    // (score, donor_index), sorted ascending; equal scores in donor order.
    entries: Vec<(f64, usize)>,
}

impl SortedScoreIndex {
    pub fn build(donor_scores: &[f64]) -> Self {
        let mut entries: Vec<(f64, usize)> = donor_scores
            .iter()
            .enumerate()
            .map(|(i, &s)| (s, i))
            .collect();
        entries.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        Self { entries }
    }
}

fn by_distance_then_donor(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .partial_cmp(&b.distance)
        .unwrap_or(Ordering::Equal)
        .then(a.donor_index.cmp(&b.donor_index))
}

impl PropensityIndex for SortedScoreIndex {
    fn query(&self, score: f64, k: usize) -> Vec<Neighbor> {
        let n = self.entries.len();
        let k = k.min(n);
        if k == 0 {
            return Vec::new();
        }

        // Walk outward from the insertion point to find the kth-smallest
        // distance.
        let seed = self.entries.partition_point(|e| e.0 < score);
        let (mut left, mut right) = (seed, seed);
        let mut kth_distance = 0.0f64;
        for _ in 0..k {
            let dl = (left > 0).then(|| score - self.entries[left - 1].0);
            let dr = (right < n).then(|| self.entries[right].0 - score);
            match (dl, dr) {
                (Some(dl), Some(dr)) if dl <= dr => {
                    left -= 1;
                    kth_distance = kth_distance.max(dl);
                }
                (_, Some(dr)) => {
                    right += 1;
                    kth_distance = kth_distance.max(dr);
                }
                (Some(dl), None) => {
                    left -= 1;
                    kth_distance = kth_distance.max(dl);
                }
                (None, None) => break,
            }
        }

        // Widen to every entry at the boundary distance so ties at the kth
        // slot resolve by donor row order rather than by walk direction.
        while left > 0 && score - self.entries[left - 1].0 <= kth_distance {
            left -= 1;
        }
        while right < n && self.entries[right].0 - score <= kth_distance {
            right += 1;
        }

        let mut closer = Vec::with_capacity(k);
        let mut boundary = Vec::new();
        for &(s, donor_index) in &self.entries[left..right] {
            let candidate = Neighbor {
                donor_index,
                distance: (s - score).abs(),
            };
            if candidate.distance < kth_distance {
                closer.push(candidate);
            } else {
                boundary.push(candidate);
            }
        }
        boundary.sort_by_key(|c| c.donor_index);
        let remaining = k - closer.len();
        closer.extend(boundary.into_iter().take(remaining));
        closer.sort_by(by_distance_then_donor);
        closer
    }
}
