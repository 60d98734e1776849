//! Named, ordered pattern tables shared by the segmenter and the rule
//! compiler. Each table is evaluated top to bottom and the first entry that
//! matches wins.

use regex::{Captures, Regex};

use crate::error::Result;
use crate::model::Action;

#[derive(Debug)]
pub struct NamedPattern<T> {
    pub name: &'static str,
    pub regex: Regex,
    pub value: T,
}

impl<T: Copy> NamedPattern<T> {
    pub(crate) fn new(name: &'static str, pattern: &str, value: T) -> Result<Self> {
        Ok(Self {
            name,
            regex: Regex::new(pattern)?,
            value,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleIdSource {
    Heading,
    NumberedLine,
    ExplicitReference,
    Bare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeShape {
    AndOver,
    PlusOrAtLeast,
    Under,
    Range,
    Unbounded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeMatch {
    pub min: Option<u32>,
    pub max: Option<u32>,
    pub text: String,
    pub shape: AgeShape,
    pub start: usize,
}

impl AgeMatch {
    pub fn is_bounded(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleIdMatch {
    pub rule_id: String,
    pub source: RuleIdSource,
}

const DURATION_UNITS: &[&str] = &[
    "hour", "hours", "day", "days", "week", "weeks", "month", "months", "mm", "cm", "%",
];

#[derive(Debug)]
pub struct GuidelinePatterns {
    rule_ids: Vec<NamedPattern<RuleIdSource>>,
    actions: Vec<NamedPattern<Action>>,
    ages: Vec<NamedPattern<AgeShape>>,
    source_year: Regex,
    line_start_rule_id: Regex,
}

impl GuidelinePatterns {
    pub fn new() -> Result<Self> {
        let rule_ids = vec![
            NamedPattern::new(
                "markdown_heading",
                r"(?m)^[ \t]*#{1,6}[^\n]*?\b(\d+\.\d+\.\d+)\b",
                RuleIdSource::Heading,
            )?,
            NamedPattern::new(
                "numbered_line",
                r"(?m)^[ \t]*(?:\*\*)?(\d+\.\d+\.\d+)\b",
                RuleIdSource::NumberedLine,
            )?,
            NamedPattern::new(
                "explicit_reference",
                r"(?i)\b(?:recommendation|section)s?\s+(\d+\.\d+\.\d+)\b",
                RuleIdSource::ExplicitReference,
            )?,
            NamedPattern::new("bare", r"\b(\d+\.\d+\.\d+)\b", RuleIdSource::Bare)?,
        ];

        let actions = vec![
            NamedPattern::new("refer_immediately", r"(?i)refer.*immediate", Action::ReferImmediate)?,
            NamedPattern::new("very_urgent", r"(?i)\bvery\s+urgent", Action::OfferVeryUrgent)?,
            NamedPattern::new(
                "suspected_cancer_pathway",
                r"(?i)\bsuspected\s+cancer\s+pathway",
                Action::ReferSuspectedCancer,
            )?,
            NamedPattern::new(
                "two_week_wait",
                r"(?i)\b(?:2\s*ww|two[\s-]+week[\s-]+wait)\b",
                Action::Refer2ww,
            )?,
            NamedPattern::new("offer_urgent", r"(?i)\boffer\b.*[^-]urgent", Action::OfferUrgent)?,
            NamedPattern::new(
                "consider_urgent",
                r"(?i)\bconsider\b.*[^-]urgent",
                Action::ConsiderUrgent,
            )?,
            NamedPattern::new(
                "consider_non_urgent",
                r"(?i)\bconsider\b.*non-urgent",
                Action::ConsiderNonUrgent,
            )?,
            NamedPattern::new(
                "consider_referral",
                r"(?i)\bconsider\b.*\breferral",
                Action::ConsiderReferral,
            )?,
        ];

        let ages = vec![
            NamedPattern::new(
                "aged_and_over",
                r"(?i)\baged?\s+(\d{1,3})\s+(?:years\s+)?(?:and|or)\s+(?:over|above|older)\b",
                AgeShape::AndOver,
            )?,
            NamedPattern::new(
                "plus_or_at_least",
                r"(?:\b(\d{1,3})\s*\+|≥\s*(\d{1,3}))",
                AgeShape::PlusOrAtLeast,
            )?,
            NamedPattern::new(
                "under",
                r"(?i)\b(?:(?:children|people|aged)\s+)?(?:under|below)\s+(\d{1,3})\b",
                AgeShape::Under,
            )?,
            NamedPattern::new(
                "range",
                r"(?i)\b(\d{1,3})\s*(?:to|-|–)\s*(\d{1,3})\b",
                AgeShape::Range,
            )?,
            NamedPattern::new(
                "unbounded_population",
                r"(?i)\b(?:older people|adults|children|elderly)\b",
                AgeShape::Unbounded,
            )?,
        ];

        Ok(Self {
            rule_ids,
            actions,
            ages,
            source_year: Regex::new(r"\[(\d{4}(?:,\s*amended\s*\d{4})?)\]")?,
            line_start_rule_id: Regex::new(
                r"(?m)^[ \t]*(?:#{1,6}[ \t]*)?(?:\*\*)?(?:(?:recommendation|Recommendation)[ \t]+)?(\d+\.\d+\.\d+)\b",
            )?,
        })
    }

    /// Rule id by precedence: heading line, numbered line, explicit
    /// "recommendation/section D.D.D" phrase, earliest bare id.
    pub fn rule_id(&self, text: &str) -> Option<RuleIdMatch> {
        self.rule_ids.iter().find_map(|pattern| {
            pattern.regex.captures(text).map(|captures| RuleIdMatch {
                rule_id: captures[1].to_string(),
                source: pattern.value,
            })
        })
    }

    /// Byte offsets of every identifier that opens a line.
    pub fn line_start_rule_ids(&self, text: &str) -> Vec<(usize, String)> {
        self.line_start_rule_id
            .captures_iter(text)
            .filter_map(|captures| {
                let whole = captures.get(0)?;
                let id = captures.get(1)?;
                Some((whole.start(), id.as_str().to_string()))
            })
            .collect()
    }

    pub fn action(&self, text: &str) -> Action {
        self.action_pattern(text)
            .map(|pattern| pattern.value)
            .unwrap_or(Action::None)
    }

    pub fn action_pattern(&self, text: &str) -> Option<&NamedPattern<Action>> {
        self.actions
            .iter()
            .find(|pattern| pattern.regex.is_match(text))
    }

    /// First age phrase by table order. Numbers followed by a duration or
    /// size unit ("2 to 3 weeks") or glued to a dotted identifier are skipped.
    pub fn age(&self, text: &str) -> Option<AgeMatch> {
        self.ages.iter().find_map(|pattern| {
            pattern
                .regex
                .captures_iter(text)
                .find(|captures| !rejected_context(text, captures))
                .and_then(|captures| age_from_captures(pattern.value, &captures))
        })
    }

    pub fn source_year(&self, text: &str) -> Option<String> {
        self.source_year
            .captures(text)
            .map(|captures| captures[1].to_string())
    }

    pub fn strip_source_year<'a>(&self, text: &'a str) -> std::borrow::Cow<'a, str> {
        self.source_year.replace_all(text, "")
    }
}

fn rejected_context(text: &str, captures: &Captures<'_>) -> bool {
    let Some(whole) = captures.get(0) else {
        return false;
    };
    let glued_to_identifier = text[..whole.start()].ends_with('.')
        || text[whole.end()..]
            .strip_prefix('.')
            .is_some_and(|tail| tail.starts_with(|ch: char| ch.is_ascii_digit()));
    if glued_to_identifier {
        return true;
    }

    let rest = text[whole.end()..].trim_start().to_lowercase();
    DURATION_UNITS.iter().any(|unit| {
        rest.strip_prefix(unit)
            .is_some_and(|tail| tail.chars().next().is_none_or(|ch| !ch.is_alphanumeric()))
    })
}

fn age_from_captures(shape: AgeShape, captures: &Captures<'_>) -> Option<AgeMatch> {
    let whole = captures.get(0)?;
    let number = |index: usize| {
        captures
            .get(index)
            .and_then(|value| value.as_str().parse::<u32>().ok())
    };

    let (min, max) = match shape {
        AgeShape::AndOver => (Some(number(1)?), None),
        AgeShape::PlusOrAtLeast => (Some(number(1).or_else(|| number(2))?), None),
        AgeShape::Under => (None, Some(number(1)?.saturating_sub(1))),
        AgeShape::Range => {
            let (low, high) = (number(1)?, number(2)?);
            if low > high {
                return None;
            }
            (Some(low), Some(high))
        }
        AgeShape::Unbounded => (None, None),
    };

    Some(AgeMatch {
        min,
        max,
        text: whole.as_str().trim().to_string(),
        shape,
        start: whole.start(),
    })
}
