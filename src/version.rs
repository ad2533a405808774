// Semantic-version parsing and ranges, modelled after celix::Version /
// celix_version_t: `major.minor.micro[.qualifier]`, compared lexicographically
// on the (major, minor, micro, qualifier) tuple.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModError, Result};

#[derive(Debug, Clone, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub qualifier: String,
}

impl Version {
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    pub fn with_qualifier(major: u32, minor: u32, micro: u32, qualifier: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: qualifier.into(),
        }
    }

    /// The zero version used when a registration carries no explicit version.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.major == 0 && self.minor == 0 && self.micro == 0 && self.qualifier.is_empty()
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.micro, &self.qualifier).cmp(&(
            other.major,
            other.minor,
            other.micro,
            &other.qualifier,
        ))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

fn is_qualifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

impl FromStr for Version {
    type Err = ModError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Version::empty());
        }
        let mut parts = s.splitn(4, '.');
        let major = parse_segment(parts.next())?;
        let minor = match parts.next() {
            Some(p) => parse_segment(Some(p))?,
            None => 0,
        };
        let micro = match parts.next() {
            Some(p) => parse_segment(Some(p))?,
            None => 0,
        };
        let qualifier = match parts.next() {
            Some(q) => {
                if q.is_empty() || !q.chars().all(is_qualifier_char) {
                    return Err(ModError::InvalidVersion(s.to_string()));
                }
                q.to_string()
            }
            None => String::new(),
        };
        Ok(Version {
            major,
            minor,
            micro,
            qualifier,
        })
    }
}

fn parse_segment(part: Option<&str>) -> Result<u32> {
    let part = part.ok_or_else(|| ModError::InvalidVersion("missing version segment".into()))?;
    if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
        return Err(ModError::InvalidVersion(format!(
            "invalid version segment: {part}"
        )));
    }
    part.parse::<u32>()
        .map_err(|e| ModError::InvalidVersion(e.to_string()))
}

/// A half-open-by-default range of versions: `[low, high)` unless
/// `high_inclusive` is set, or `high` is `None` for an open upper bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub low: Version,
    pub low_inclusive: bool,
    pub high: Option<Version>,
    pub high_inclusive: bool,
}

impl VersionRange {
    pub fn at_least(low: Version) -> Self {
        Self {
            low,
            low_inclusive: true,
            high: None,
            high_inclusive: false,
        }
    }

    pub fn new(low: Version, low_inclusive: bool, high: Version, high_inclusive: bool) -> Self {
        Self {
            low,
            low_inclusive,
            high: Some(high),
            high_inclusive,
        }
    }

    pub fn contains(&self, v: &Version) -> bool {
        let low_ok = if self.low_inclusive {
            v >= &self.low
        } else {
            v > &self.low
        };
        let high_ok = match &self.high {
            None => true,
            Some(high) => {
                if self.high_inclusive {
                    v <= high
                } else {
                    v < high
                }
            }
        };
        low_ok && high_ok
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let low_bracket = if self.low_inclusive { '[' } else { '(' };
        match &self.high {
            None => write!(f, "{low_bracket}{},)", self.low),
            Some(high) => {
                let high_bracket = if self.high_inclusive { ']' } else { ')' };
                write!(f, "{low_bracket}{},{}{high_bracket}", self.low, high)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_version() {
        let v: Version = "1.2.3.beta".parse().unwrap();
        assert_eq!(v, Version::with_qualifier(1, 2, 3, "beta"));
    }

    #[test]
    fn defaults_missing_segments() {
        let v: Version = "2".parse().unwrap();
        assert_eq!(v, Version::new(2, 0, 0));
    }

    #[test]
    fn rejects_malformed_version() {
        assert!("1.x.0".parse::<Version>().is_err());
        assert!("1..0".parse::<Version>().is_err());
        assert!("-1.0.0".parse::<Version>().is_err());
    }

    #[test]
    fn orders_lexicographically() {
        assert!(Version::new(1, 9, 0) < Version::new(2, 0, 0));
        assert!(Version::new(1, 0, 0) < Version::with_qualifier(1, 0, 0, "a"));
    }

    #[test]
    fn range_contains_respects_bounds() {
        let r = VersionRange::new(
            Version::new(1, 0, 0),
            true,
            Version::new(2, 0, 0),
            false,
        );
        assert!(r.contains(&Version::new(1, 0, 0)));
        assert!(r.contains(&Version::new(1, 9, 9)));
        assert!(!r.contains(&Version::new(2, 0, 0)));

        let open = VersionRange::at_least(Version::new(1, 0, 0));
        assert!(open.contains(&Version::new(99, 0, 0)));
    }

    #[test]
    fn display_round_trips_through_parse() {
        let v = Version::with_qualifier(3, 4, 5, "rc1");
        let printed = v.to_string();
        assert_eq!(printed.parse::<Version>().unwrap(), v);
    }
}
