//! Server and plugin version numbers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A dotted version number such as `10.4`, `9.9.1.69595` or `5.13.1.18282-RC1`.
///
/// Comparisons ignore the qualifier and treat missing trailing components as
/// zero, so `10.4` equals `10.4.0.0`.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    numbers: Vec<u64>,
    qualifier: Option<String>,
    raw: String,
}

impl Version {
    /// Parse a version string, returning `None` when it is not a version.
    pub fn parse(raw: &str) -> Option<Version> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let (numeric, qualifier) = match trimmed.split_once('-') {
            Some((n, q)) => (n, Some(q.to_string())),
            None => (trimmed, None),
        };
        let numbers = numeric
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        Some(Version {
            numbers,
            qualifier,
            raw: trimmed.to_string(),
        })
    }

    /// Major version component.
    pub fn major(&self) -> u64 {
        self.numbers.first().copied().unwrap_or(0)
    }

    /// Minor version component.
    pub fn minor(&self) -> u64 {
        self.numbers.get(1).copied().unwrap_or(0)
    }

    /// Qualifier following the first `-`, if any.
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// Whether this version is at least `minimum`, ignoring qualifiers.
    pub fn satisfies_min(&self, minimum: &Version) -> bool {
        self.cmp(minimum) != Ordering::Less
    }

    /// Whether this version is at least the version written in `minimum`.
    ///
    /// An unparsable minimum is treated as always satisfied.
    pub fn satisfies_min_str(&self, minimum: &str) -> bool {
        Version::parse(minimum).is_none_or(|min| self.satisfies_min(&min))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.numbers.len().max(other.numbers.len());
        for i in 0..len {
            let a = self.numbers.get(i).copied().unwrap_or(0);
            let b = other.numbers.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s).ok_or_else(|| format!("Invalid version: '{}'", s))
    }
}

impl TryFrom<String> for Version {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.raw
    }
}
