//! Activity catalog: reward policy per activity kind.
//!
//! # Responsibility
//! - Hold the immutable reward table consulted by verifier and calculator.
//! - Expose it through pure lookup functions only.
//!
//! # Invariants
//! - Catalog rows are compile-time constants and never mutated.
//! - Condition multipliers are ordered by increasing wear and are
//!   non-decreasing in that order.
//! - Every `ActivityKind` has exactly one row.

use crate::model::activity::ActivityKind;

/// Days counted as one month by month-based duration rules.
pub const DAYS_PER_MONTH: f64 = 30.0;

/// Unit in which a duration bonus is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Day,
    /// Fractional months of `DAYS_PER_MONTH` days.
    Month,
}

impl DurationUnit {
    /// Converts an inclusive day count into units of `self`.
    pub fn units_from_days(self, days: i64) -> f64 {
        match self {
            Self::Day => days as f64,
            Self::Month => days as f64 / DAYS_PER_MONTH,
        }
    }
}

/// Category label and its base carbon reduction in kilograms.
pub type CategoryBase = (&'static str, f64);

/// Condition label and its multiplier.
pub type ConditionMultiplier = (&'static str, f64);

/// How a kind's reward departs from its flat base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RewardRule {
    /// Base carbon and base points as listed.
    Fixed,
    /// Base per category plus `units * increment_kg` once units exceed one.
    Duration {
        unit: DurationUnit,
        increment_kg: f64,
        categories: &'static [CategoryBase],
    },
    /// Base per category times a wear multiplier.
    Condition {
        categories: &'static [CategoryBase],
        /// Ordered from least to most worn.
        conditions: &'static [ConditionMultiplier],
        default_condition: &'static str,
    },
    /// Carbon grows with a counted quantity; points grow in steps.
    Quantity {
        grams_per_unit: f64,
        units_per_step: u32,
        points_per_step: u32,
    },
}

/// One catalog row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityPolicy {
    pub kind: ActivityKind,
    /// Human-readable name used in classifier prompts.
    pub label: &'static str,
    /// Flat base, or the fallback base for categories not listed in the rule.
    pub base_carbon_reduction_kg: f64,
    /// Flat points, or the minimum for quantity rules.
    pub base_points: u32,
    /// Whether an accepted certification adds one tree.
    pub grows_tree: bool,
    pub rule: RewardRule,
    /// What the classifier must check in the photo.
    pub criteria: &'static [&'static str],
}

impl ActivityPolicy {
    /// Base carbon for a category, falling back to the row's base.
    pub fn category_base_kg(&self, category: Option<&str>) -> f64 {
        let categories = match self.rule {
            RewardRule::Duration { categories, .. } | RewardRule::Condition { categories, .. } => {
                categories
            }
            RewardRule::Fixed | RewardRule::Quantity { .. } => return self.base_carbon_reduction_kg,
        };
        let Some(category) = category.map(str::trim) else {
            return self.base_carbon_reduction_kg;
        };
        categories
            .iter()
            .find(|(label, _)| *label == category)
            .map_or(self.base_carbon_reduction_kg, |(_, base)| *base)
    }
}

const VOLUNTEER_CATEGORIES: &[CategoryBase] =
    &[("환경보호", 5.0), ("탄소중립", 8.0), ("교육봉사", 3.0)];

const EXTERNAL_PROGRAM_FIELDS: &[CategoryBase] = &[
    ("환경", 8.0),
    ("탄소중립", 10.0),
    ("공모전", 15.0),
    ("인턴십", 12.0),
];

const SECONDHAND_CATEGORIES: &[CategoryBase] = &[
    ("의류", 3.5),
    ("신발", 4.2),
    ("책", 1.8),
    ("가전", 8.5),
    ("가구", 12.0),
];

const SECONDHAND_CONDITIONS: &[ConditionMultiplier] =
    &[("새상품", 0.8), ("중고", 1.0), ("오래됨", 1.2)];

static TUMBLER: ActivityPolicy = ActivityPolicy {
    kind: ActivityKind::Tumbler,
    label: "reusable tumbler",
    base_carbon_reduction_kg: 0.3,
    base_points: 15,
    grows_tree: true,
    rule: RewardRule::Fixed,
    criteria: &[
        "A tumbler or reusable cup is clearly visible.",
        "The drink is served in the tumbler.",
        "The cup is certainly not disposable.",
        "The image is clear and not manipulated.",
    ],
};

static CONTAINER: ActivityPolicy = ActivityPolicy {
    kind: ActivityKind::Container,
    label: "reusable take-out container",
    base_carbon_reduction_kg: 0.25,
    base_points: 20,
    grows_tree: true,
    rule: RewardRule::Fixed,
    criteria: &[
        "A reusable food container is clearly visible.",
        "Food or take-out is packed in the container.",
        "No single-use packaging replaces the container.",
    ],
};

static RECEIPT: ActivityPolicy = ActivityPolicy {
    kind: ActivityKind::Receipt,
    label: "electronic receipt",
    base_carbon_reduction_kg: 0.05,
    base_points: 10,
    grows_tree: true,
    rule: RewardRule::Fixed,
    criteria: &[
        "The image shows an electronic receipt on a screen.",
        "Store name and purchase time are readable.",
    ],
};

static EMAIL: ActivityPolicy = ActivityPolicy {
    kind: ActivityKind::Email,
    label: "mailbox cleanup",
    base_carbon_reduction_kg: 0.0,
    base_points: 5,
    grows_tree: true,
    rule: RewardRule::Quantity {
        grams_per_unit: 0.06,
        units_per_step: 50,
        points_per_step: 5,
    },
    criteria: &[
        "The image shows a mail client confirming deleted messages.",
        "The number of deleted messages is visible.",
    ],
};

static REFILL: ActivityPolicy = ActivityPolicy {
    kind: ActivityKind::Refill,
    label: "refill station visit",
    base_carbon_reduction_kg: 0.18,
    base_points: 18,
    grows_tree: true,
    rule: RewardRule::Fixed,
    criteria: &[
        "A refill station or dispenser is visible.",
        "A personal container is being refilled.",
    ],
};

static RECYCLE: ActivityPolicy = ActivityPolicy {
    kind: ActivityKind::Recycle,
    label: "electronic waste disposal",
    base_carbon_reduction_kg: 0.35,
    base_points: 25,
    grows_tree: true,
    rule: RewardRule::Fixed,
    criteria: &[
        "An electronic device is placed in a designated e-waste bin.",
        "The collection point is recognizable.",
    ],
};

static OTHER: ActivityPolicy = ActivityPolicy {
    kind: ActivityKind::Other,
    label: "carbon-neutral action",
    base_carbon_reduction_kg: 0.1,
    base_points: 10,
    grows_tree: true,
    rule: RewardRule::Fixed,
    criteria: &[
        "The photo shows an identifiable action that reduces emissions.",
        "The image is clear and not manipulated.",
    ],
};

static VOLUNTEER: ActivityPolicy = ActivityPolicy {
    kind: ActivityKind::Volunteer,
    label: "environmental volunteering",
    base_carbon_reduction_kg: 2.0,
    base_points: 50,
    grows_tree: false,
    rule: RewardRule::Duration {
        unit: DurationUnit::Day,
        increment_kg: 0.5,
        categories: VOLUNTEER_CATEGORIES,
    },
    criteria: &[
        "The photo shows participation in a volunteer activity.",
        "A certificate or activity site is recognizable.",
    ],
};

static EXTERNAL_PROGRAM: ActivityPolicy = ActivityPolicy {
    kind: ActivityKind::ExternalProgram,
    label: "external sustainability program",
    base_carbon_reduction_kg: 5.0,
    base_points: 80,
    grows_tree: false,
    rule: RewardRule::Duration {
        unit: DurationUnit::Month,
        increment_kg: 0.8,
        categories: EXTERNAL_PROGRAM_FIELDS,
    },
    criteria: &[
        "The photo shows a participation certificate or program material.",
        "The program name is readable.",
    ],
};

static SECONDHAND: ActivityPolicy = ActivityPolicy {
    kind: ActivityKind::Secondhand,
    label: "secondhand goods listing",
    base_carbon_reduction_kg: 2.5,
    base_points: 20,
    grows_tree: false,
    rule: RewardRule::Condition {
        categories: SECONDHAND_CATEGORIES,
        conditions: SECONDHAND_CONDITIONS,
        default_condition: "중고",
    },
    criteria: &[
        "The photo shows the actual item being listed.",
        "The item matches the declared category.",
    ],
};

/// Returns the catalog row for one activity kind.
pub fn policy(kind: ActivityKind) -> &'static ActivityPolicy {
    match kind {
        ActivityKind::Tumbler => &TUMBLER,
        ActivityKind::Container => &CONTAINER,
        ActivityKind::Receipt => &RECEIPT,
        ActivityKind::Email => &EMAIL,
        ActivityKind::Refill => &REFILL,
        ActivityKind::Recycle => &RECYCLE,
        ActivityKind::Other => &OTHER,
        ActivityKind::Volunteer => &VOLUNTEER,
        ActivityKind::ExternalProgram => &EXTERNAL_PROGRAM,
        ActivityKind::Secondhand => &SECONDHAND,
    }
}

/// Returns every catalog row in `ActivityKind::ALL` order.
pub fn policies() -> impl Iterator<Item = &'static ActivityPolicy> {
    ActivityKind::ALL.into_iter().map(policy)
}

/// Looks up a condition multiplier for condition-sensitive rows.
pub fn condition_multiplier(
    conditions: &'static [ConditionMultiplier],
    condition: &str,
) -> Option<f64> {
    let condition = condition.trim();
    conditions
        .iter()
        .find(|(label, _)| *label == condition)
        .map(|(_, multiplier)| *multiplier)
}
