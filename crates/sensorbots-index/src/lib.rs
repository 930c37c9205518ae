//! Spatial indexing for range-sorted interaction candidates.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Cell spans above this fall back to a linear scan instead of bucket walking.
const MAX_BUCKET_SPAN: i64 = 32;

/// Errors emitted by spatial index implementations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A position contained NaN or infinite coordinates.
    #[error("position {index} is not finite")]
    NonFinitePosition { index: usize },
}

/// A candidate returned by a sorted neighbourhood query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Candidate {
    /// Squared distance between the query point and the candidate.
    pub dist_sq: OrderedFloat<f64>,
    /// Dense index of the candidate, as passed to [`NeighborhoodIndex::rebuild`].
    pub index: usize,
}

/// Common behaviour exposed by neighbourhood indices.
pub trait NeighborhoodIndex {
    /// Rebuild internal structures from body positions.
    fn rebuild(&mut self, positions: &[(f64, f64)]) -> Result<(), IndexError>;

    /// Visit every entry other than `idx` whose squared distance is at most `radius_sq`.
    ///
    /// Visiting order is unspecified.
    fn neighbors_within(
        &self,
        idx: usize,
        radius_sq: f64,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f64>),
    );

    /// Neighbours of `idx` nearest first, ties broken by ascending index.
    fn sorted_neighbors(&self, idx: usize, radius_sq: f64) -> Vec<Candidate> {
        let mut out = Vec::new();
        self.neighbors_within(idx, radius_sq, &mut |index, dist_sq| {
            out.push(Candidate { dist_sq, index });
        });
        out.sort_unstable();
        out
    }
}

/// Uniform bucket grid keyed by integer cell coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniformGridIndex {
    /// Edge length of each grid cell used for bucketing bodies.
    pub cell_size: f64,
    #[serde(skip)]
    positions: Vec<(f64, f64)>,
    #[serde(skip)]
    buckets: HashMap<(i64, i64), Vec<usize>>,
}

impl UniformGridIndex {
    /// Create a new uniform grid with the provided cell size.
    #[must_use]
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            positions: Vec::new(),
            buckets: HashMap::new(),
        }
    }

    /// Number of indexed positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true when nothing has been indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn cell_of(&self, (x, y): (f64, f64)) -> (i64, i64) {
        (
            (x / self.cell_size).floor() as i64,
            (y / self.cell_size).floor() as i64,
        )
    }

    fn visit_linear(
        &self,
        idx: usize,
        origin: (f64, f64),
        radius_sq: f64,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f64>),
    ) {
        for (other, &pos) in self.positions.iter().enumerate() {
            if other == idx {
                continue;
            }
            let d = dist_sq(origin, pos);
            if d <= radius_sq {
                visitor(other, OrderedFloat(d));
            }
        }
    }
}

impl Default for UniformGridIndex {
    fn default() -> Self {
        Self::new(50.0)
    }
}

fn dist_sq(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    dx * dx + dy * dy
}

impl NeighborhoodIndex for UniformGridIndex {
    fn rebuild(&mut self, positions: &[(f64, f64)]) -> Result<(), IndexError> {
        if !(self.cell_size > 0.0 && self.cell_size.is_finite()) {
            return Err(IndexError::InvalidConfig(
                "cell_size must be positive and finite",
            ));
        }
        if let Some(index) = positions
            .iter()
            .position(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            return Err(IndexError::NonFinitePosition { index });
        }
        self.positions.clear();
        self.positions.extend_from_slice(positions);
        self.buckets.clear();
        for (idx, &pos) in positions.iter().enumerate() {
            let cell = self.cell_of(pos);
            self.buckets.entry(cell).or_default().push(idx);
        }
        Ok(())
    }

    fn neighbors_within(
        &self,
        idx: usize,
        radius_sq: f64,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f64>),
    ) {
        let Some(&origin) = self.positions.get(idx) else {
            return;
        };
        if radius_sq < 0.0 || radius_sq.is_nan() {
            return;
        }
        let span = (radius_sq.sqrt() / self.cell_size).ceil();
        if !span.is_finite() || span > MAX_BUCKET_SPAN as f64 {
            self.visit_linear(idx, origin, radius_sq, visitor);
            return;
        }
        let span = span as i64;
        let (cx, cy) = self.cell_of(origin);
        for gx in (cx - span)..=(cx + span) {
            for gy in (cy - span)..=(cy + span) {
                let Some(bucket) = self.buckets.get(&(gx, gy)) else {
                    continue;
                };
                for &other in bucket {
                    if other == idx {
                        continue;
                    }
                    let d = dist_sq(origin, self.positions[other]);
                    if d <= radius_sq {
                        visitor(other, OrderedFloat(d));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_cell_size() {
        let mut index = UniformGridIndex::new(0.0);
        assert_eq!(
            index.rebuild(&[(0.0, 0.0)]),
            Err(IndexError::InvalidConfig(
                "cell_size must be positive and finite"
            ))
        );
    }

    #[test]
    fn rejects_nan_positions() {
        let mut index = UniformGridIndex::new(10.0);
        assert_eq!(
            index.rebuild(&[(0.0, 0.0), (f64::NAN, 1.0)]),
            Err(IndexError::NonFinitePosition { index: 1 })
        );
    }

    #[test]
    fn sorted_neighbors_orders_by_distance_then_index() {
        let mut index = UniformGridIndex::new(5.0);
        let positions = [(0.0, 0.0), (3.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (40.0, 0.0)];
        index.rebuild(&positions).expect("rebuild");

        let found: Vec<usize> = index
            .sorted_neighbors(0, 10.0 * 10.0)
            .into_iter()
            .map(|c| c.index)
            .collect();
        assert_eq!(found, vec![2, 3, 1]);
    }

    #[test]
    fn infinite_radius_scans_everything() {
        let mut index = UniformGridIndex::new(1.0);
        let positions = [(0.0, 0.0), (1_000.0, 0.0), (0.0, -5_000.0)];
        index.rebuild(&positions).expect("rebuild");
        let found = index.sorted_neighbors(0, f64::INFINITY);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].index, 1);
        assert_eq!(found[1].index, 2);
    }

    #[test]
    fn bucket_walk_matches_linear_scan() {
        let mut index = UniformGridIndex::new(4.0);
        let positions: Vec<(f64, f64)> = (0..50)
            .map(|i| ((i * 7 % 31) as f64, (i * 13 % 29) as f64))
            .collect();
        index.rebuild(&positions).expect("rebuild");
        let radius_sq = 9.0 * 9.0;
        for idx in 0..positions.len() {
            let bucketed = index.sorted_neighbors(idx, radius_sq);
            let mut linear = Vec::new();
            index.visit_linear(idx, positions[idx], radius_sq, &mut |index, dist_sq| {
                linear.push(Candidate { dist_sq, index });
            });
            linear.sort_unstable();
            assert_eq!(bucketed, linear, "mismatch for {idx}");
        }
    }
}
