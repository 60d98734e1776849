use regex::Regex;

use super::classify::build_atom;
use crate::error::Result;
use crate::model::{AtomicCondition, Condition, CountCondition, LogicOp};
use crate::patterns::NamedPattern;
use crate::terms::{TermsNormalizer, qualifiers_in};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseLead {
    IfThey,
    IfPerson,
    InPopulation,
    With,
}

/// The eligibility clause of a rule and where it starts in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause<'a> {
    pub lead: ClauseLead,
    pub lead_start: usize,
    pub body: &'a str,
}

#[derive(Debug)]
struct CountPhrase {
    threshold: u32,
    start: usize,
    items_start: usize,
    qualifier: Option<&'static str>,
}

#[derive(Debug)]
pub struct ClauseParser {
    leads: Vec<NamedPattern<ClauseLead>>,
    count: Regex,
    any: Regex,
    conjunction: Regex,
    item_conjunction: Regex,
    parenthetical: Regex,
}

impl ClauseParser {
    pub fn new() -> Result<Self> {
        let leads = vec![
            NamedPattern::new("if_they", r"(?is)\bif\s+they\b[:\s]*(.+)", ClauseLead::IfThey)?,
            NamedPattern::new(
                "if_person",
                r"(?is)\bif\s+(?:a\s+|the\s+)?(?:person|people|patient)\b[:\s]*(.+)",
                ClauseLead::IfPerson,
            )?,
            NamedPattern::new(
                "in_population",
                r"(?is)\bin\s+(?:children\s+and\s+young\s+people|people|adults|women|men|children|young\s+people)\b[:\s]*(.+)",
                ClauseLead::InPopulation,
            )?,
            NamedPattern::new("with", r"(?is)\bwith\b[:\s]*(.+)", ClauseLead::With)?,
        ];

        Ok(Self {
            leads,
            count: Regex::new(
                r"(?i)\b(\d+|one|two|three|four)\s+or\s+more\s+(?:of\s+the\s+following|(?:[a-z-]+\s+)?(?:symptoms|features|signs))\b",
            )?,
            any: Regex::new(r"(?i)\bany\s+of\s+the\s+following\b")?,
            conjunction: Regex::new(r"(?i)\s+(and|who|with)\s+")?,
            item_conjunction: Regex::new(r"(?i)\s+(or|and)\s+")?,
            parenthetical: Regex::new(r"\([^()]*\)")?,
        })
    }

    /// First qualifier phrase by table order ("if they", "if a person",
    /// "in people", "with").
    pub fn isolate<'a>(&self, text: &'a str) -> Option<Clause<'a>> {
        self.leads.iter().find_map(|pattern| {
            let captures = pattern.regex.captures(text)?;
            let lead = captures.get(0)?;
            let body = captures.get(1)?;
            Some(Clause {
                lead: pattern.value,
                lead_start: lead.start(),
                body: body.as_str(),
            })
        })
    }

    /// Condition tree for an isolated clause body.
    pub fn build_tree(&self, terms: &TermsNormalizer, clause: &str) -> Option<Condition> {
        let clause = self.parenthetical.replace_all(clause, " ");
        let (stem, bullets) = split_bullets(&clause);

        if bullets.is_empty() {
            return self.parse_branch(terms, &stem);
        }

        if let Some(count) = self.count_phrase(&stem) {
            let options = bullets
                .iter()
                .filter_map(|bullet| build_atom(terms, bullet))
                .map(|atom| inherit_qualifier(atom, count.qualifier))
                .collect::<Vec<AtomicCondition>>();
            let mut parts = self.prefix_atoms(terms, &stem[..count.start]);
            if !options.is_empty() {
                parts.push(Condition::Count(CountCondition {
                    threshold: count.threshold,
                    options,
                }));
            }
            return and_of(parts);
        }

        let joined_by_and = bullets.len() > 1
            && bullets[..bullets.len() - 1]
                .iter()
                .all(|bullet| clean_tail(bullet).ends_with(" and"));
        let branches = bullets
            .iter()
            .filter_map(|bullet| self.parse_branch(terms, bullet))
            .collect::<Vec<Condition>>();

        let combined = match branches.len() {
            0 => None,
            1 => branches.into_iter().next(),
            _ => Some(Condition::Composite {
                op: if joined_by_and {
                    LogicOp::And
                } else {
                    LogicOp::Or
                },
                children: branches,
            }),
        };

        let mut parts = self.prefix_atoms(terms, &stem);
        parts.extend(combined);
        and_of(parts)
    }

    /// One branch: a count phrase with inline items, an AND of conjuncts, or
    /// a single atom.
    fn parse_branch(&self, terms: &TermsNormalizer, text: &str) -> Option<Condition> {
        if let Some(count) = self.count_phrase(text) {
            let options = self
                .split_items(&text[count.items_start..])
                .iter()
                .filter_map(|item| build_atom(terms, item))
                .map(|atom| inherit_qualifier(atom, count.qualifier))
                .collect::<Vec<AtomicCondition>>();

            let mut parts = self.prefix_atoms(terms, &text[..count.start]);
            if !options.is_empty() {
                parts.push(Condition::Count(CountCondition {
                    threshold: count.threshold,
                    options,
                }));
            }
            return and_of(parts);
        }

        and_of(self.prefix_atoms(terms, text))
    }

    fn prefix_atoms(&self, terms: &TermsNormalizer, text: &str) -> Vec<Condition> {
        self.split_conjuncts(text)
            .iter()
            .filter_map(|part| build_atom(terms, part))
            .map(Condition::Atomic)
            .collect()
    }

    /// Splits on "and", "who" and "with", except where "and" belongs to age
    /// wording ("and over") or "with" starts "with or without".
    fn split_conjuncts<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut parts = Vec::<&str>::new();
        let mut last = 0_usize;

        for captures in self.conjunction.captures_iter(text) {
            let (Some(whole), Some(word)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            let following = text[whole.end()..].to_lowercase();
            let keep_together = match word.as_str().to_lowercase().as_str() {
                "and" => ["over", "above", "older", "more"]
                    .iter()
                    .any(|next| starts_with_word(&following, next)),
                "with" => following.starts_with("or without"),
                _ => false,
            };
            if keep_together || whole.start() < last {
                continue;
            }
            parts.push(&text[last..whole.start()]);
            last = whole.end();
        }

        parts.push(&text[last..]);
        parts
    }

    /// Inline list items: comma/semicolon separated, last item split on a
    /// trailing "or"/"and".
    fn split_items<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut out = Vec::<&str>::new();
        for piece in text.split([',', ';', '\n']) {
            let mut last = 0_usize;
            for captures in self.item_conjunction.captures_iter(piece) {
                let Some(whole) = captures.get(0) else {
                    continue;
                };
                let following = piece[whole.end()..].to_lowercase();
                if ["over", "above", "older", "more"]
                    .iter()
                    .any(|next| starts_with_word(&following, next))
                {
                    continue;
                }
                out.push(&piece[last..whole.start()]);
                last = whole.end();
            }
            out.push(&piece[last..]);
        }
        out
    }

    fn count_phrase(&self, text: &str) -> Option<CountPhrase> {
        let (threshold, phrase_start, phrase_end) = match self.count.captures(text) {
            Some(captures) => {
                let whole = captures.get(0)?;
                (
                    parse_threshold(captures.get(1)?.as_str())?,
                    whole.start(),
                    whole.end(),
                )
            }
            None => {
                let found = self.any.find(text)?;
                (1, found.start(), found.end())
            }
        };

        // Items follow a colon on the same line when there is one.
        let rest = &text[phrase_end..];
        let line_end = rest.find('\n').unwrap_or(rest.len());
        let items_start = match rest[..line_end].find(':') {
            Some(colon) => phrase_end + colon + 1,
            None => phrase_end,
        };

        Some(CountPhrase {
            threshold,
            start: phrase_start,
            items_start,
            qualifier: qualifiers_in(&text[phrase_start..items_start])
                .first()
                .copied(),
        })
    }
}

fn parse_threshold(raw: &str) -> Option<u32> {
    match raw.to_lowercase().as_str() {
        "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        digits => digits.parse().ok(),
    }
}

fn starts_with_word(text: &str, word: &str) -> bool {
    text.strip_prefix(word)
        .is_some_and(|tail| tail.chars().next().is_none_or(|ch| !ch.is_alphanumeric()))
}

fn inherit_qualifier(mut atom: AtomicCondition, qualifier: Option<&str>) -> AtomicCondition {
    if atom.qualifier.is_none() {
        atom.qualifier = qualifier.map(str::to_string);
    }
    atom
}

fn clean_tail(text: &str) -> String {
    text.trim_end()
        .trim_end_matches(['.', ',', ';'])
        .to_lowercase()
}

fn and_of(mut parts: Vec<Condition>) -> Option<Condition> {
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(Condition::Composite {
            op: LogicOp::And,
            children: parts,
        }),
    }
}

fn bullet_body(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    ["* ", "- ", "• ", "•"]
        .iter()
        .find_map(|marker| trimmed.strip_prefix(marker))
}

/// Stem text before the first bullet, and each bullet with its continuation
/// lines folded in.
fn split_bullets(clause: &str) -> (String, Vec<String>) {
    let mut stem = Vec::<&str>::new();
    let mut bullets = Vec::<String>::new();

    for line in clause.lines() {
        if let Some(body) = bullet_body(line) {
            bullets.push(body.trim().to_string());
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match bullets.last_mut() {
            Some(current) => {
                current.push(' ');
                current.push_str(trimmed);
            }
            None => stem.push(trimmed),
        }
    }

    (stem.join(" "), bullets)
}
