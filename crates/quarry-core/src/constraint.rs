//! Version constraints for the project's Python requirement.
//!
//! The resolver only ever asks three questions of a constraint: does it allow
//! this version, does it allow every version of that range, does it allow any
//! version of that range. [`VersionConstraint`] is that contract; [`Constraint`]
//! is a union of half-open intervals that implements it.

use crate::version::Version;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintParseError {
    #[error("Could not parse version constraint: {0}")]
    Invalid(String),
}

/// Predicate over versions.
pub trait VersionConstraint: fmt::Display {
    fn allows(&self, version: &Version) -> bool;
    fn allows_all(&self, other: &Constraint) -> bool;
    fn allows_any(&self, other: &Constraint) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bound {
    version: Version,
    inclusive: bool,
}

/// One contiguous interval; `None` means unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    min: Option<Bound>,
    max: Option<Bound>,
}

impl VersionRange {
    pub const ANY: VersionRange = VersionRange { min: None, max: None };

    pub fn at_least(v: Version, inclusive: bool) -> Self {
        Self {
            min: Some(Bound { version: v, inclusive }),
            max: None,
        }
    }

    pub fn at_most(v: Version, inclusive: bool) -> Self {
        Self {
            min: None,
            max: Some(Bound { version: v, inclusive }),
        }
    }

    /// `[min, max)`
    pub fn between(min: Version, max: Version) -> Self {
        Self {
            min: Some(Bound {
                version: min,
                inclusive: true,
            }),
            max: Some(Bound {
                version: max,
                inclusive: false,
            }),
        }
    }

    pub fn exactly(v: Version) -> Self {
        Self {
            min: Some(Bound { version: v, inclusive: true }),
            max: Some(Bound { version: v, inclusive: true }),
        }
    }

    pub fn allows(&self, v: &Version) -> bool {
        let above_min = match self.min {
            None => true,
            Some(b) if b.inclusive => *v >= b.version,
            Some(b) => *v > b.version,
        };
        let below_max = match self.max {
            None => true,
            Some(b) if b.inclusive => *v <= b.version,
            Some(b) => *v < b.version,
        };
        above_min && below_max
    }

    fn is_empty(&self) -> bool {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) => {
                lo.version > hi.version
                    || (lo.version == hi.version && !(lo.inclusive && hi.inclusive))
            }
            _ => false,
        }
    }

    pub fn intersect(&self, other: &VersionRange) -> Option<VersionRange> {
        let min = match (self.min, other.min) {
            (None, b) | (b, None) => b,
            (Some(a), Some(b)) => Some(if a.version != b.version {
                if a.version > b.version {
                    a
                } else {
                    b
                }
            } else {
                Bound {
                    version: a.version,
                    inclusive: a.inclusive && b.inclusive,
                }
            }),
        };
        let max = match (self.max, other.max) {
            (None, b) | (b, None) => b,
            (Some(a), Some(b)) => Some(if a.version != b.version {
                if a.version < b.version {
                    a
                } else {
                    b
                }
            } else {
                Bound {
                    version: a.version,
                    inclusive: a.inclusive && b.inclusive,
                }
            }),
        };
        let range = VersionRange { min, max };
        (!range.is_empty()).then_some(range)
    }

    /// Whether every version in `inner` is also in `self`.
    pub fn contains(&self, inner: &VersionRange) -> bool {
        let lower_ok = match (self.min, inner.min) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(o), Some(i)) => {
                i.version > o.version
                    || (i.version == o.version && (o.inclusive || !i.inclusive))
            }
        };
        let upper_ok = match (self.max, inner.max) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(o), Some(i)) => {
                i.version < o.version
                    || (i.version == o.version && (o.inclusive || !i.inclusive))
            }
        };
        lower_ok && upper_ok
    }
}

/// Union of [`VersionRange`]s, remembering the text it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    text: String,
    ranges: Vec<VersionRange>,
}

impl Constraint {
    pub fn any() -> Self {
        Self {
            text: "*".to_string(),
            ranges: vec![VersionRange::ANY],
        }
    }

    pub fn from_ranges(text: impl Into<String>, ranges: Vec<VersionRange>) -> Self {
        Self {
            text: text.into(),
            ranges: ranges.into_iter().filter(|r| !r.is_empty()).collect(),
        }
    }

    pub fn ranges(&self) -> &[VersionRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl VersionConstraint for Constraint {
    fn allows(&self, version: &Version) -> bool {
        self.ranges.iter().any(|r| r.allows(version))
    }

    fn allows_all(&self, other: &Constraint) -> bool {
        other
            .ranges
            .iter()
            .all(|inner| self.ranges.iter().any(|outer| outer.contains(inner)))
    }

    fn allows_any(&self, other: &Constraint) -> bool {
        self.ranges
            .iter()
            .any(|a| other.ranges.iter().any(|b| a.intersect(b).is_some()))
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Parse a constraint such as `^3.6`, `~3.7`, `3.7.*`, `>=3.6,<4.0` or
/// `~2.7 || ^3.5`.
pub fn parse_constraint(text: &str) -> Result<Constraint, ConstraintParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "*" {
        return Ok(Constraint {
            text: if trimmed.is_empty() { "*".into() } else { trimmed.into() },
            ranges: vec![VersionRange::ANY],
        });
    }

    let mut union = Vec::new();
    for alternative in trimmed.split("||") {
        union.extend(parse_conjunction(alternative, text)?);
    }
    Ok(Constraint::from_ranges(trimmed, union))
}

fn parse_conjunction(text: &str, full: &str) -> Result<Vec<VersionRange>, ConstraintParseError> {
    let normalized = text.replace(',', " ");
    let mut clauses: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;
    for token in normalized.split_whitespace() {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '!' | '~' | '^')) {
            pending_op = Some(token.to_string());
            continue;
        }
        match pending_op.take() {
            Some(op) => clauses.push(format!("{op}{token}")),
            None => clauses.push(token.to_string()),
        }
    }
    if pending_op.is_some() || clauses.is_empty() {
        return Err(ConstraintParseError::Invalid(full.to_string()));
    }

    let mut acc = vec![VersionRange::ANY];
    for clause in clauses {
        let ranges = parse_clause(&clause).ok_or_else(|| ConstraintParseError::Invalid(full.to_string()))?;
        acc = acc
            .iter()
            .flat_map(|a| ranges.iter().filter_map(move |b| a.intersect(b)))
            .collect();
    }
    Ok(acc)
}

fn parse_clause(clause: &str) -> Option<Vec<VersionRange>> {
    if clause == "*" {
        return Some(vec![VersionRange::ANY]);
    }
    if let Some(rest) = clause.strip_prefix('^') {
        let v = Version::parse(rest).ok()?;
        let upper = if v.major > 0 || v.precision == 1 {
            v.next_major()
        } else if v.minor > 0 || v.precision == 2 {
            v.next_minor()
        } else {
            v.next_patch()
        };
        return Some(vec![VersionRange::between(v, upper)]);
    }
    if let Some(rest) = clause.strip_prefix("~=") {
        let v = Version::parse(rest).ok()?;
        let upper = match v.precision {
            1 => return None,
            2 => v.next_major(),
            _ => v.next_minor(),
        };
        return Some(vec![VersionRange::between(v, upper)]);
    }
    if let Some(rest) = clause.strip_prefix('~') {
        let v = Version::parse(rest).ok()?;
        let upper = if v.precision == 1 { v.next_major() } else { v.next_minor() };
        return Some(vec![VersionRange::between(v, upper)]);
    }
    let comparisons: [(&str, fn(Version) -> Vec<VersionRange>); 5] = [
        (">=", |v| vec![VersionRange::at_least(v, true)]),
        ("<=", |v| vec![VersionRange::at_most(v, true)]),
        ("!=", |v| vec![VersionRange::at_most(v, false), VersionRange::at_least(v, false)]),
        (">", |v| vec![VersionRange::at_least(v, false)]),
        ("<", |v| vec![VersionRange::at_most(v, false)]),
    ];
    for (op, build) in comparisons {
        if let Some(rest) = clause.strip_prefix(op) {
            return Version::parse(rest).ok().map(build);
        }
    }
    let exact = clause.strip_prefix("==").unwrap_or(clause);
    if let Some(prefix) = exact.strip_suffix(".*") {
        let v = Version::parse(prefix).ok()?;
        let upper = match v.precision {
            1 => v.next_major(),
            2 => v.next_minor(),
            _ => return None,
        };
        return Some(vec![VersionRange::between(v, upper)]);
    }
    Version::parse(exact).ok().map(|v| vec![VersionRange::exactly(v)])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn c(s: &str) -> Constraint {
        parse_constraint(s).unwrap()
    }

    #[test]
    fn test_caret() {
        let caret = c("^3.6");
        assert!(caret.allows(&v("3.6.0")));
        assert!(caret.allows(&v("3.12.1")));
        assert!(!caret.allows(&v("3.5.9")));
        assert!(!caret.allows(&v("4.0")));
        assert_eq!(caret.to_string(), "^3.6");
    }

    #[test]
    fn test_tilde_and_wildcard() {
        assert!(c("~3.7").allows(&v("3.7.9")));
        assert!(!c("~3.7").allows(&v("3.8.0")));
        assert!(c("3.7.*").allows(&v("3.7.4")));
        assert!(!c("3.7.*").allows(&v("3.8")));
        assert!(c("~=3.7").allows(&v("3.11")));
    }

    #[test]
    fn test_comparisons_and_union() {
        let range = c(">=3.6, <3.9");
        assert!(range.allows(&v("3.8.10")));
        assert!(!range.allows(&v("3.9.0")));
        let spaced = c(">= 3.6 < 3.9");
        assert_eq!(spaced.ranges(), range.ranges());

        let union = c("~2.7 || ^3.5");
        assert!(union.allows(&v("2.7.18")));
        assert!(union.allows(&v("3.11")));
        assert!(!union.allows(&v("3.4")));

        let not = c("!=3.7.0");
        assert!(!not.allows(&v("3.7.0")));
        assert!(not.allows(&v("3.7.1")));
    }

    #[test]
    fn test_any() {
        assert!(c("*").allows(&v("2.7")));
        assert!(c("").allows(&v("3.12")));
    }

    #[test]
    fn test_allows_all_and_any() {
        let project = c("^3.6");
        assert!(project.allows_all(&c("3.7.*")));
        assert!(!project.allows_all(&c("3.5.*")));
        assert!(!project.allows_all(&c("2.7.*")));
        assert!(c("^3.0").allows_any(&project));
        assert!(!c("^2.0").allows_any(&project));
    }

    #[test]
    fn test_invalid() {
        assert!(parse_constraint(">=").is_err());
        assert!(parse_constraint("banana").is_err());
        assert!(parse_constraint("3.7.1.*").is_err());
    }
}
