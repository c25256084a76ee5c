//! Interpreter version value type.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid version string \"{0}\"")]
pub struct VersionParseError(pub String);

/// `major.minor.patch` with a record of how many components were written.
///
/// Equality, ordering and hashing only look at the numeric fields, so
/// `3.7` and `3.7.0` compare equal.
#[derive(Debug, Clone, Copy)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Number of components given explicitly (1..=3).
    pub precision: u8,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            precision: 3,
        }
    }

    /// Parse `3`, `3.7` or `3.7.1`. Surrounding whitespace is ignored.
    pub fn parse(text: &str) -> Result<Self, VersionParseError> {
        let trimmed = text.trim();
        let err = || VersionParseError(text.to_string());
        if trimmed.is_empty() {
            return Err(err());
        }
        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() > 3 {
            return Err(err());
        }
        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err());
            }
            *slot = part.parse().map_err(|_| err())?;
        }
        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            precision: parts.len() as u8,
        })
    }

    /// Build from a `version_info`-style tuple; missing entries are zero.
    pub fn from_info(info: &[u64]) -> Self {
        Self::new(
            info.first().copied().unwrap_or(0),
            info.get(1).copied().unwrap_or(0),
            info.get(2).copied().unwrap_or(0),
        )
    }

    /// The version as written, honouring `precision`.
    pub fn text(&self) -> String {
        match self.precision {
            1 => format!("{}", self.major),
            2 => format!("{}.{}", self.major, self.minor),
            _ => format!("{}.{}.{}", self.major, self.minor, self.patch),
        }
    }

    /// `M.N`
    pub fn minor_text(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    pub fn same_minor(&self, other: &Version) -> bool {
        self.major == other.major && self.minor == other.minor
    }

    pub fn same_patch(&self, other: &Version) -> bool {
        self.same_minor(other) && self.patch == other.patch
    }

    fn key(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }

    /// Smallest version of the next major series.
    pub fn next_major(&self) -> Version {
        Version::new(self.major + 1, 0, 0)
    }

    /// Smallest version of the next minor series.
    pub fn next_minor(&self) -> Version {
        Version::new(self.major, self.minor + 1, 0)
    }

    pub fn next_patch(&self) -> Version {
        Version::new(self.major, self.minor, self.patch + 1)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
