//! Line-oriented parser for classifier replies.
//!
//! # Responsibility
//! - Extract `VALID`, `CONFIDENCE`, `REASON` and optional reward hints.
//! - Report whether anything recognizable was found.
//!
//! # Invariants
//! - Parsing never fails; malformed lines are skipped.
//! - Each recognized field overwrites its default; the last occurrence wins.
//! - Confidence is always clamped into `0..=100`.

use crate::catalog::ActivityPolicy;
use crate::model::verdict::clamp_confidence;
use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_INT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d+").expect("valid leading integer regex"));
static LEADING_FLOAT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d+(?:\.\d+)?").expect("valid leading float regex"));

const DEFAULT_REASON: &str = "classifier reply carried no reason";

/// Reward values the classifier echoed back. Audit only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardHint {
    pub carbon_reduction_kg: f64,
    pub points: u32,
}

/// Field values of one reply, defaults included.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyFields {
    pub valid: bool,
    pub confidence: u8,
    pub reason: String,
    pub hint: RewardHint,
}

impl ReplyFields {
    /// Catalog-supplied defaults for one activity.
    pub fn defaults_for(row: &ActivityPolicy) -> Self {
        Self {
            valid: false,
            confidence: 0,
            reason: DEFAULT_REASON.to_string(),
            hint: RewardHint {
                carbon_reduction_kg: row.base_carbon_reduction_kg,
                points: row.base_points,
            },
        }
    }
}

/// Tagged parse result.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// At least one field was recognized.
    ParseOk { fields: ReplyFields },
    /// Nothing recognizable; only defaults are available.
    ParseFallback { defaults: ReplyFields },
}

/// Parses a classifier reply on top of `defaults`.
pub fn parse_reply(reply: &str, defaults: ReplyFields) -> ParseOutcome {
    let mut fields = defaults;
    let mut recognized = 0usize;

    for line in reply.lines() {
        let Some((raw_key, raw_value)) = line.split_once(':') else {
            continue;
        };
        let key = normalize_key(raw_key);
        let value = raw_value.trim().trim_matches('*').trim();

        let applied = match key.as_str() {
            "VALID" => parse_bool(value).map(|valid| fields.valid = valid),
            "CONFIDENCE" => {
                parse_leading_int(value).map(|confidence| fields.confidence = clamp_confidence(confidence))
            }
            "REASON" if !value.is_empty() => {
                fields.reason = value.to_string();
                Some(())
            }
            "CARBON_REDUCTION" => parse_leading_float(value)
                .filter(|kg| *kg >= 0.0)
                .map(|kg| fields.hint.carbon_reduction_kg = kg),
            "POINTS" => parse_leading_int(value)
                .and_then(|points| u32::try_from(points).ok())
                .map(|points| fields.hint.points = points),
            _ => None,
        };

        if applied.is_some() {
            recognized += 1;
        }
    }

    if recognized == 0 {
        ParseOutcome::ParseFallback { defaults: fields }
    } else {
        ParseOutcome::ParseOk { fields }
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| c == '*' || c == '-' || c == '#' || c.is_whitespace())
        .to_ascii_uppercase()
}

/// Reads the leading word only; trailing prose never flips the verdict.
fn parse_bool(value: &str) -> Option<bool> {
    let token: String = value
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    match token.to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_leading_int(value: &str) -> Option<i64> {
    LEADING_INT_RE
        .find(value)
        .and_then(|found| found.as_str().parse::<i64>().ok())
}

fn parse_leading_float(value: &str) -> Option<f64> {
    LEADING_FLOAT_RE
        .find(value)
        .and_then(|found| found.as_str().parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::{parse_reply, ParseOutcome, ReplyFields, DEFAULT_REASON};
    use crate::catalog::policy;
    use crate::model::activity::ActivityKind;

    fn defaults() -> ReplyFields {
        ReplyFields::defaults_for(policy(ActivityKind::Tumbler))
    }

    fn fields_of(outcome: ParseOutcome) -> ReplyFields {
        match outcome {
            ParseOutcome::ParseOk { fields } => fields,
            ParseOutcome::ParseFallback { .. } => panic!("expected ParseOk"),
        }
    }

    #[test]
    fn parses_complete_reply() {
        let reply = "VALID: true\nCONFIDENCE: 95\nREASON: steel tumbler with coffee\nCARBON_REDUCTION: 0.3\nPOINTS: 15";
        let fields = fields_of(parse_reply(reply, defaults()));
        assert!(fields.valid);
        assert_eq!(fields.confidence, 95);
        assert_eq!(fields.reason, "steel tumbler with coffee");
        assert_eq!(fields.hint.carbon_reduction_kg, 0.3);
        assert_eq!(fields.hint.points, 15);
    }

    #[test]
    fn reason_keeps_text_after_first_colon() {
        let fields = fields_of(parse_reply("REASON: label reads: reusable", defaults()));
        assert_eq!(fields.reason, "label reads: reusable");
    }

    #[test]
    fn missing_valid_defaults_to_false() {
        let fields = fields_of(parse_reply("CONFIDENCE: 80\nREASON: unclear", defaults()));
        assert!(!fields.valid);
        assert_eq!(fields.confidence, 80);
    }

    #[test]
    fn confidence_is_clamped_and_tolerates_suffixes() {
        let high = fields_of(parse_reply("VALID: true\nCONFIDENCE: 180", defaults()));
        assert_eq!(high.confidence, 100);
        let negative = fields_of(parse_reply("VALID: true\nCONFIDENCE: -4", defaults()));
        assert_eq!(negative.confidence, 0);
        let percent = fields_of(parse_reply("VALID: true\nCONFIDENCE: 72%", defaults()));
        assert_eq!(percent.confidence, 72);
    }

    #[test]
    fn malformed_lines_are_ignored() {
        let reply = "Here is my analysis\nVALID: maybe\nCONFIDENCE: high\nVALID: false\nsomething: else";
        let fields = fields_of(parse_reply(reply, defaults()));
        assert!(!fields.valid);
        assert_eq!(fields.confidence, 0);
        assert_eq!(fields.reason, DEFAULT_REASON);
    }

    #[test]
    fn markdown_decorations_and_case_are_tolerated() {
        let reply = "**Valid:** True\n- confidence: 64\n";
        let fields = fields_of(parse_reply(reply, defaults()));
        assert!(fields.valid);
        assert_eq!(fields.confidence, 64);
    }

    #[test]
    fn valid_flag_is_read_from_its_leading_word() {
        let rejected = fields_of(parse_reply(
            "VALID: false, not a true tumbler\nCONFIDENCE: 90",
            defaults(),
        ));
        assert!(!rejected.valid);

        let accepted = fields_of(parse_reply("VALID: True. Not false advertising", defaults()));
        assert!(accepted.valid);

        let ambiguous = parse_reply("VALID: probably true", defaults());
        assert_eq!(
            ambiguous,
            ParseOutcome::ParseFallback {
                defaults: defaults()
            }
        );
    }

    #[test]
    fn unrecognizable_reply_is_a_fallback() {
        let outcome = parse_reply("I cannot analyze this image.", defaults());
        assert_eq!(
            outcome,
            ParseOutcome::ParseFallback {
                defaults: defaults()
            }
        );
    }

    #[test]
    fn negative_reward_hints_are_ignored() {
        let fields = fields_of(parse_reply(
            "VALID: true\nCARBON_REDUCTION: -2\nPOINTS: -9",
            defaults(),
        ));
        assert_eq!(fields.hint.carbon_reduction_kg, 0.3);
        assert_eq!(fields.hint.points, 15);
    }
}
