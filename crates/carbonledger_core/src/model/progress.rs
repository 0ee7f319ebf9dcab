//! Per-user cumulative progression.
//!
//! # Invariants
//! - Points, trees and carbon are independent, non-decreasing counters.
//! - `level == level_for_trees(total_trees)` for every persisted row.

use serde::{Deserialize, Serialize};

/// Trees needed to advance one level.
pub const TREES_PER_LEVEL: u32 = 10;

/// Level reached with `total_trees` trees. Starts at 1.
pub fn level_for_trees(total_trees: u32) -> u32 {
    total_trees / TREES_PER_LEVEL + 1
}

/// Converts integer tenths of a kilogram into kilograms.
pub fn tenths_to_kg(tenths: u64) -> f64 {
    tenths as f64 / 10.0
}

/// Converts a one-decimal kilogram amount into integer tenths.
pub fn kg_to_tenths(kg: f64) -> u64 {
    if kg.is_finite() && kg > 0.0 {
        (kg * 10.0).round() as u64
    } else {
        0
    }
}

/// Aggregate progression state for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_id: String,
    pub total_points: u64,
    pub total_trees: u32,
    pub level: u32,
    /// Stored as integer tenths; this view is derived.
    pub total_carbon_reduction_kg: f64,
}

impl UserProgress {
    /// Progress of a user that has never been credited.
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            total_points: 0,
            total_trees: 0,
            level: level_for_trees(0),
            total_carbon_reduction_kg: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{kg_to_tenths, level_for_trees, tenths_to_kg, UserProgress};

    #[test]
    fn level_boundaries_follow_trees_per_level() {
        for trees in 0..=9 {
            assert_eq!(level_for_trees(trees), 1);
        }
        for trees in 10..=19 {
            assert_eq!(level_for_trees(trees), 2);
        }
        assert_eq!(level_for_trees(20), 3);
    }

    #[test]
    fn level_is_monotonic_in_trees() {
        let mut previous = level_for_trees(0);
        for trees in 1..500 {
            let level = level_for_trees(trees);
            assert!(level >= previous);
            previous = level;
        }
    }

    #[test]
    fn tenths_conversion_is_exact_for_one_decimal_values() {
        assert_eq!(kg_to_tenths(10.2), 102);
        assert_eq!(kg_to_tenths(0.3), 3);
        assert_eq!(kg_to_tenths(-1.0), 0);
        assert_eq!(kg_to_tenths(f64::NAN), 0);
        assert_eq!(tenths_to_kg(102), 10.2);
    }

    #[test]
    fn empty_progress_starts_at_level_one() {
        let progress = UserProgress::empty("user-1");
        assert_eq!(progress.level, 1);
        assert_eq!(progress.total_points, 0);
    }
}
