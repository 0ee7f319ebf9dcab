//! Reward calculator.
//!
//! # Responsibility
//! - Turn catalog policy, declared metadata and a verdict into a
//!   `RewardDelta`.
//! - Reject metadata the catalog rule cannot price.
//!
//! # Invariants
//! - Pure: no I/O, no clock, no randomness.
//! - An invalid verdict always yields `RewardDelta::ZERO`.
//! - Confidence never scales the reward.
//! - Carbon is rounded to one decimal and never negative.

use crate::catalog::{condition_multiplier, policy, ActivityPolicy, RewardRule};
use crate::model::activity::{ActivityKind, SubmissionMetadata, ValidationError};
use crate::model::certification::RewardDelta;
use crate::model::verdict::Verdict;
use chrono::NaiveDate;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Metadata resolved into the inputs of one catalog rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RewardBasis {
    Flat,
    Duration { category_base_kg: f64, days: i64 },
    Condition { category_base_kg: f64, multiplier: f64 },
    Quantity { count: u32 },
}

/// Validates metadata against the kind's rule and resolves its pricing inputs.
///
/// # Errors
/// - `MissingMetadata` when a field the rule needs is absent.
/// - `InvalidDate` / `ReversedDateRange` for malformed duration input.
/// - `UnknownCondition` for a condition label outside the catalog.
pub fn resolve_basis(
    kind: ActivityKind,
    metadata: &SubmissionMetadata,
) -> Result<RewardBasis, ValidationError> {
    let row = policy(kind);
    match row.rule {
        RewardRule::Fixed => Ok(RewardBasis::Flat),
        RewardRule::Duration { .. } => {
            let start = required_date(kind, "start_date", metadata.start_date.as_deref())?;
            let end = required_date(kind, "end_date", metadata.end_date.as_deref())?;
            if end < start {
                return Err(ValidationError::ReversedDateRange {
                    start_date: start.to_string(),
                    end_date: end.to_string(),
                });
            }
            Ok(RewardBasis::Duration {
                category_base_kg: row.category_base_kg(metadata.category.as_deref()),
                days: inclusive_day_count(start, end),
            })
        }
        RewardRule::Condition {
            conditions,
            default_condition,
            ..
        } => {
            let condition = metadata
                .condition
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(default_condition);
            let multiplier = condition_multiplier(conditions, condition)
                .ok_or_else(|| ValidationError::UnknownCondition(condition.to_string()))?;
            Ok(RewardBasis::Condition {
                category_base_kg: row.category_base_kg(metadata.category.as_deref()),
                multiplier,
            })
        }
        RewardRule::Quantity { .. } => {
            let count = metadata.quantity.ok_or(ValidationError::MissingMetadata {
                activity: kind,
                field: "quantity",
            })?;
            Ok(RewardBasis::Quantity { count })
        }
    }
}

/// Ungated reward for a resolved basis.
pub fn reward_for_basis(row: &ActivityPolicy, basis: RewardBasis) -> RewardDelta {
    match (row.rule, basis) {
        (
            RewardRule::Duration {
                unit, increment_kg, ..
            },
            RewardBasis::Duration {
                category_base_kg,
                days,
            },
        ) => {
            let units = unit.units_from_days(days);
            let bonus = if units > 1.0 {
                units * increment_kg
            } else {
                0.0
            };
            RewardDelta {
                carbon_reduction_kg: round_one_decimal(category_base_kg + bonus),
                points: row.base_points,
            }
        }
        (
            RewardRule::Condition { .. },
            RewardBasis::Condition {
                category_base_kg,
                multiplier,
            },
        ) => RewardDelta {
            carbon_reduction_kg: round_one_decimal(category_base_kg * multiplier),
            points: row.base_points,
        },
        (
            RewardRule::Quantity {
                grams_per_unit,
                units_per_step,
                points_per_step,
            },
            RewardBasis::Quantity { count },
        ) => {
            let grams = (f64::from(count) * grams_per_unit).round();
            let stepped = (count / units_per_step.max(1)).saturating_mul(points_per_step);
            RewardDelta {
                carbon_reduction_kg: round_one_decimal(grams / 1000.0),
                points: stepped.max(row.base_points),
            }
        }
        _ => RewardDelta {
            carbon_reduction_kg: round_one_decimal(row.base_carbon_reduction_kg),
            points: row.base_points,
        },
    }
}

/// Applies the verdict gate: invalid verdicts earn nothing.
pub fn gate(reward: RewardDelta, verdict: &Verdict) -> RewardDelta {
    if verdict.valid {
        reward
    } else {
        RewardDelta::ZERO
    }
}

/// Computes the credited reward for one submission.
pub fn calculate(
    kind: ActivityKind,
    metadata: &SubmissionMetadata,
    verdict: &Verdict,
) -> Result<RewardDelta, ValidationError> {
    let basis = resolve_basis(kind, metadata)?;
    Ok(gate(reward_for_basis(policy(kind), basis), verdict))
}

/// Inclusive number of calendar days between two dates.
pub fn inclusive_day_count(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

/// Rounds to one decimal, clamping negatives and non-finite values to zero.
pub fn round_one_decimal(value: f64) -> f64 {
    if !value.is_finite() || value <= 0.0 {
        return 0.0;
    }
    (value * 10.0).round() / 10.0
}

fn required_date(
    kind: ActivityKind,
    field: &'static str,
    value: Option<&str>,
) -> Result<NaiveDate, ValidationError> {
    let raw = value
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or(ValidationError::MissingMetadata {
            activity: kind,
            field,
        })?;
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| ValidationError::InvalidDate {
        field,
        value: raw.to_string(),
    })
}
