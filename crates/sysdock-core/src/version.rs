//! Software versions and inclusive version ranges used for gating.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A `major.minor.micro` version number.
///
/// Ordering is lexicographic on the three components, which matches the
/// packed `major << 16 | minor << 8 | micro` form used by the target system.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub micro: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8, micro: u8) -> Self {
        Self {
            major,
            minor,
            micro,
        }
    }

    /// Unpack from the `major << 16 | minor << 8 | micro` form.
    pub const fn from_packed(packed: u32) -> Self {
        Self {
            major: ((packed >> 16) & 0xFF) as u8,
            minor: ((packed >> 8) & 0xFF) as u8,
            micro: (packed & 0xFF) as u8,
        }
    }

    pub const fn packed(&self) -> u32 {
        (self.major as u32) << 16 | (self.minor as u32) << 8 | self.micro as u32
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = [0u8; 3];
        let mut count = 0;
        for (i, part) in s.trim().split('.').enumerate() {
            if i >= parts.len() {
                return Err(Error::InvalidVersion(format!(
                    "'{}' has more than three components",
                    s
                )));
            }
            parts[i] = part
                .parse()
                .map_err(|e| Error::InvalidVersion(format!("'{}': {}", s, e)))?;
            count += 1;
        }
        if count == 0 {
            return Err(Error::InvalidVersion("empty version".to_string()));
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl TryFrom<String> for Version {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

/// Inclusive version range. An absent bound matches any version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VersionRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Version>,
}

impl VersionRange {
    pub const ANY: Self = Self {
        min: None,
        max: None,
    };

    pub const fn between(min: Version, max: Version) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub const fn from(min: Version) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn contains(&self, version: Version) -> bool {
        self.min.is_none_or(|min| min <= version) && self.max.is_none_or(|max| version <= max)
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (None, None) => write!(f, "any"),
            (Some(min), None) => write!(f, "{}+", min),
            (None, Some(max)) => write!(f, "-{}", max),
            (Some(min), Some(max)) if min == max => write!(f, "{}", min),
            (Some(min), Some(max)) => write!(f, "{}-{}", min, max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let v: Version = "17.0.1".parse().unwrap();
        assert_eq!(v, Version::new(17, 0, 1));
        assert_eq!(v.to_string(), "17.0.1");

        let short: Version = "15".parse().unwrap();
        assert_eq!(short, Version::new(15, 0, 0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Version>().is_err());
        assert!("1.2.3.4".parse::<Version>().is_err());
        assert!("1.x.0".parse::<Version>().is_err());
        assert!("300.0.0".parse::<Version>().is_err());
    }

    #[test]
    fn test_packed_roundtrip() {
        let v = Version::new(13, 2, 1);
        assert_eq!(v.packed(), 852_481);
        assert_eq!(Version::from_packed(852_481), v);
    }

    #[test]
    fn test_ordering_matches_packed() {
        let a = Version::new(16, 1, 0);
        let b = Version::new(17, 0, 0);
        assert!(a < b);
        assert!(a.packed() < b.packed());
    }

    #[test]
    fn test_range_contains() {
        let range = VersionRange::between(Version::new(11, 0, 0), Version::new(16, 1, 0));
        assert!(range.contains(Version::new(11, 0, 0)));
        assert!(range.contains(Version::new(16, 1, 0)));
        assert!(!range.contains(Version::new(10, 2, 0)));
        assert!(!range.contains(Version::new(17, 0, 0)));

        assert!(VersionRange::ANY.contains(Version::new(0, 0, 0)));
        assert!(VersionRange::from(Version::new(21, 0, 0)).contains(Version::new(21, 0, 1)));
        let until = VersionRange {
            min: None,
            max: Some(Version::new(14, 1, 2)),
        };
        assert!(!until.contains(Version::new(15, 0, 0)));
    }

    #[test]
    fn test_range_display() {
        assert_eq!(VersionRange::ANY.to_string(), "any");
        assert_eq!(VersionRange::from(Version::new(15, 0, 0)).to_string(), "15.0.0+");
        assert_eq!(
            VersionRange::between(Version::new(17, 0, 0), Version::new(17, 0, 1)).to_string(),
            "17.0.0-17.0.1"
        );
    }

    #[test]
    fn test_serde_as_string() {
        let range = VersionRange::from(Version::new(12, 0, 0));
        let json = serde_json::to_string(&range).unwrap();
        assert_eq!(json, r#"{"min":"12.0.0"}"#);
        let back: VersionRange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, range);
    }
}
