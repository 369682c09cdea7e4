//! Version-range grammar for `targetAppVersion`.
//!
//! Supported forms (npm-compatible):
//!
//! | Range            | Devices admitted                         |
//! |------------------|------------------------------------------|
//! | `*`              | every device, even with unparseable versions |
//! | `1.2.3`          | exactly 1.2.3                            |
//! | `1.x.x`, `1.x`, `1` | `>=1.0.0 <2.0.0`                      |
//! | `1.2.x`, `1.2`   | `>=1.2.0 <1.3.0`                         |
//! | `1.2.3 - 1.2.7`  | `>=1.2.3 <=1.2.7`                        |
//! | `>=1.2.3 <1.2.7` | comparator set, all must hold            |
//! | `~1.2.3`         | `>=1.2.3 <1.3.0`                         |
//! | `^1.2.3`         | `>=1.2.3 <2.0.0`                         |
//! | `A \|\| B`       | either alternative                       |
//!
//! Comparators may be separated by whitespace or commas, and an operator may
//! be separated from its version by whitespace (`>= 5.7.0 <= 5.7.4`).
//!
//! Each comparator is lowered to a [`semver::Comparator`] with an explicit
//! operator, so partial versions keep npm meaning (`1.2` is `1.2.*`, not
//! Cargo's `^1.2`).

use std::fmt;
use std::str::FromStr;

use semver::{Comparator, Op, Prerelease, Version};

use crate::error::RangeError;
use crate::version::coerce;

const WILDCARD: &str = "*";

/// A parsed `targetAppVersion` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    source: String,
    /// Disjunction of conjunctions. An empty conjunction admits everything.
    alternatives: Vec<Vec<Comparator>>,
}

impl VersionRange {
    pub fn parse(text: &str) -> Result<Self, RangeError> {
        let source = text.trim();
        if source.is_empty() {
            return Err(RangeError::new(text, "empty range"));
        }
        let alternatives = source
            .split("||")
            .map(|alt| parse_alternative(text, alt))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            source: source.to_string(),
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The catch-all `*` target.
    pub fn is_wildcard(&self) -> bool {
        self.source == WILDCARD
    }

    /// Whether a canonical `major.minor.patch` version is inside the range.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives
            .iter()
            .any(|set| set.iter().all(|c| c.matches(version)))
    }

    /// Whether a device-reported version string is inside the range.
    ///
    /// The device version is coerced first; one that cannot be coerced
    /// matches nothing except `*`.
    pub fn matches_device(&self, device_version: &str) -> bool {
        if self.is_wildcard() {
            return true;
        }
        coerce(device_version).is_some_and(|v| self.matches(&v))
    }

    /// The lowest version admitted by the range, if any.
    pub fn min_version(&self) -> Option<Version> {
        self.alternatives.iter().filter_map(|set| set_floor(set)).min()
    }
}

impl FromStr for VersionRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionRange::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Whether `device_version` satisfies `range`.
///
/// Malformed ranges and uncoercible versions yield `false`, never an error.
pub fn matches(range: &str, device_version: &str) -> bool {
    if range.trim() == WILDCARD {
        return true;
    }
    VersionRange::parse(range).is_ok_and(|r| r.matches_device(device_version))
}

/// Ordering key for specificity tie-breaks: the range's minimum version.
///
/// Ranges that admit nothing (or fail to parse) return `None`, which sorts
/// below every real version.
pub fn rank(range: &str) -> Option<Version> {
    VersionRange::parse(range).ok()?.min_version()
}

// ── Parsing ──────────────────────────────────────────────────────────────────

/// A version with trailing components possibly omitted or wildcarded.
struct Partial {
    major: u64,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Prerelease,
}

impl Partial {
    fn comparator(self, op: Op) -> Comparator {
        Comparator {
            op,
            major: self.major,
            minor: self.minor,
            patch: self.patch,
            pre: self.pre,
        }
    }
}

fn parse_alternative(range: &str, text: &str) -> Result<Vec<Comparator>, RangeError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(RangeError::new(range, "empty alternative"));
    }

    if let Some((lower, upper)) = text.split_once(" - ") {
        return parse_hyphen(range, lower, upper);
    }

    let mut comparators = Vec::new();
    let mut tokens = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty());

    while let Some(token) = tokens.next() {
        let (op, rest) = split_operator(token);
        let version_text = if rest.is_empty() {
            match op {
                Some(_) => tokens.next().ok_or_else(|| {
                    RangeError::new(range, format!("operator '{token}' has no version"))
                })?,
                None => continue,
            }
        } else {
            rest
        };

        let partial = parse_partial(range, version_text)?;
        match (op, partial) {
            // `*`, `>=*`, `~*`: no constraint
            (None | Some(Op::GreaterEq | Op::LessEq | Op::Exact | Op::Tilde | Op::Caret), None) => {
            }
            (Some(_), None) => {
                return Err(RangeError::new(
                    range,
                    format!("'{token}' compares against a wildcard"),
                ))
            }
            (None, Some(p)) => {
                let op = if p.patch.is_some() {
                    Op::Exact
                } else {
                    Op::Wildcard
                };
                comparators.push(p.comparator(op));
            }
            (Some(op), Some(p)) => comparators.push(p.comparator(op)),
        }
    }

    Ok(comparators)
}

/// `A - B`: inclusive on both ends; a partial upper bound covers its whole span.
fn parse_hyphen(range: &str, lower: &str, upper: &str) -> Result<Vec<Comparator>, RangeError> {
    let mut comparators = Vec::new();
    if let Some(p) = parse_partial(range, lower.trim())? {
        comparators.push(p.comparator(Op::GreaterEq));
    }
    if let Some(p) = parse_partial(range, upper.trim())? {
        comparators.push(p.comparator(Op::LessEq));
    }
    Ok(comparators)
}

fn split_operator(token: &str) -> (Option<Op>, &str) {
    const OPERATORS: [(&str, Op); 8] = [
        (">=", Op::GreaterEq),
        ("<=", Op::LessEq),
        ("~>", Op::Tilde),
        (">", Op::Greater),
        ("<", Op::Less),
        ("=", Op::Exact),
        ("~", Op::Tilde),
        ("^", Op::Caret),
    ];
    for (prefix, op) in OPERATORS {
        if let Some(rest) = token.strip_prefix(prefix) {
            return (Some(op), rest);
        }
    }
    (None, token)
}

/// Parse `1`, `1.2`, `1.2.x`, `v1.2.3`, `1.2.3-beta.1`. `Ok(None)` is a bare wildcard.
fn parse_partial(range: &str, text: &str) -> Result<Option<Partial>, RangeError> {
    let text = text.trim_start_matches(['v', 'V']);
    let text = text.split_once('+').map_or(text, |(core, _build)| core);
    let (core, pre) = match text.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (text, None),
    };

    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3 {
        return Err(RangeError::new(range, format!("'{text}' has too many components")));
    }

    let mut numbers = [None; 3];
    let mut wildcarded = false;
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        if matches!(*part, "x" | "X" | "*") {
            wildcarded = true;
            continue;
        }
        if wildcarded {
            return Err(RangeError::new(
                range,
                format!("'{text}' has a number after a wildcard"),
            ));
        }
        let n = part.parse::<u64>().map_err(|_| {
            RangeError::new(range, format!("'{part}' is not a version component"))
        })?;
        *slot = Some(n);
    }

    let Some(major) = numbers[0] else {
        return Ok(None);
    };

    let pre = match pre {
        Some(pre) if numbers[2].is_some() => Prerelease::new(pre)
            .map_err(|e| RangeError::new(range, format!("bad prerelease '{pre}': {e}")))?,
        Some(_) => {
            return Err(RangeError::new(
                range,
                format!("'{text}' has a prerelease without a patch component"),
            ))
        }
        None => Prerelease::EMPTY,
    };

    Ok(Some(Partial {
        major,
        minor: numbers[1],
        patch: numbers[2],
        pre,
    }))
}

// ── Minimum version ──────────────────────────────────────────────────────────

/// Lowest version satisfying every comparator of one alternative.
fn set_floor(set: &[Comparator]) -> Option<Version> {
    let mut floor = Version::new(0, 0, 0);
    for c in set {
        let candidate = match c.op {
            Op::Less | Op::LessEq => continue,
            Op::Greater => just_above(c),
            _ => filled(c),
        };
        if candidate > floor {
            floor = candidate;
        }
    }
    set.iter().all(|c| c.matches(&floor)).then_some(floor)
}

fn filled(c: &Comparator) -> Version {
    let mut v = Version::new(c.major, c.minor.unwrap_or(0), c.patch.unwrap_or(0));
    v.pre = c.pre.clone();
    v
}

fn just_above(c: &Comparator) -> Version {
    match (c.minor, c.patch) {
        (Some(minor), Some(patch)) if c.pre.is_empty() => Version::new(c.major, minor, patch + 1),
        (Some(_), Some(_)) => filled(c),
        (Some(minor), None) => Version::new(c.major, minor + 1, 0),
        (None, _) => Version::new(c.major + 1, 0, 0),
    }
}
