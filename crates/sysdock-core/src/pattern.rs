//! Wildcard byte patterns.
//!
//! Two notations are accepted:
//!
//! - compact hex, optionally `0x`-prefixed, where `.` or `??` is a skipped
//!   byte: `"0x...34.059152"`, `"0x11??33"`
//! - whitespace separated tokens, where `?` or `??` is a skipped byte:
//!   `"48 8D 0D ?? ?? ?? ??"`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest pattern accepted by [`Pattern::parse`].
pub const MAX_PATTERN_LEN: usize = 80;

/// A byte pattern where `None` matches any byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern {
    elements: Vec<Option<u8>>,
}

impl Pattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        Self::from_elements(parse_pattern(pattern)?)
    }

    pub fn from_elements(elements: Vec<Option<u8>>) -> Result<Self> {
        if elements.is_empty() {
            return Err(Error::InvalidPattern("pattern is empty".to_string()));
        }
        if elements.len() > MAX_PATTERN_LEN {
            return Err(Error::InvalidPattern(format!(
                "pattern is {} bytes long, limit is {}",
                elements.len(),
                MAX_PATTERN_LEN
            )));
        }
        Ok(Self { elements })
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[Option<u8>] {
        &self.elements
    }

    /// Compare against `data` starting at `offset`, stopping at the first
    /// literal mismatch.
    ///
    /// Returns false when the window runs past the end of `data`.
    pub fn matches_at(&self, data: &[u8], offset: usize) -> bool {
        let Some(window) = data.get(offset..offset + self.elements.len()) else {
            return false;
        };
        self.elements
            .iter()
            .zip(window)
            .all(|(expected, &actual)| expected.is_none_or(|b| b == actual))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_pattern(&self.elements))
    }
}

impl FromStr for Pattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Pattern {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Pattern> for String {
    fn from(value: Pattern) -> Self {
        value.to_string()
    }
}

pub fn parse_pattern(pattern: &str) -> Result<Vec<Option<u8>>> {
    let mut bytes = Vec::new();
    for token in pattern.split_whitespace() {
        if token == "?" {
            bytes.push(None);
            continue;
        }
        parse_compact(token, &mut bytes)?;
    }

    if bytes.is_empty() {
        return Err(Error::InvalidPattern("pattern is empty".to_string()));
    }

    Ok(bytes)
}

fn parse_compact(token: &str, out: &mut Vec<Option<u8>>) -> Result<()> {
    let token = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    let chars = token.as_bytes();

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            b'.' => {
                out.push(None);
                i += 1;
            }
            b'?' => {
                if chars.get(i + 1) != Some(&b'?') {
                    return Err(Error::InvalidPattern(format!(
                        "lone '?' inside token '{}'",
                        token
                    )));
                }
                out.push(None);
                i += 2;
            }
            _ => {
                let pair = token.get(i..i + 2).ok_or_else(|| {
                    Error::InvalidPattern(format!("odd number of hex digits in '{}'", token))
                })?;
                let value = u8::from_str_radix(pair, 16).map_err(|e| {
                    Error::InvalidPattern(format!("invalid hex byte '{}' in '{}': {}", pair, token, e))
                })?;
                out.push(Some(value));
                i += 2;
            }
        }
    }
    Ok(())
}

pub fn format_pattern(bytes: &[Option<u8>]) -> String {
    bytes
        .iter()
        .map(|b| match b {
            Some(value) => format!("{:02X}", value),
            None => "??".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compact_with_dots() {
        let bytes = parse_pattern("0x...34.059152").unwrap();
        assert_eq!(
            bytes,
            vec![None, None, None, Some(0x34), None, Some(0x05), Some(0x91), Some(0x52)]
        );
    }

    #[test]
    fn test_parse_compact_with_question_marks() {
        let bytes = parse_pattern("0x11??33").unwrap();
        assert_eq!(bytes, vec![Some(0x11), None, Some(0x33)]);
    }

    #[test]
    fn test_parse_pattern_with_wildcards() {
        let bytes = parse_pattern("48 8D 0D ?? ? ?? ??").unwrap();
        assert_eq!(bytes.len(), 7);
        assert_eq!(bytes[0], Some(0x48));
        assert_eq!(bytes[1], Some(0x8D));
        assert_eq!(bytes[2], Some(0x0D));
        assert_eq!(bytes[3], None);
        assert_eq!(bytes[4], None);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_pattern("").is_err());
        assert!(parse_pattern("0x").is_err());
        assert!(parse_pattern("0x123").is_err());
        assert!(parse_pattern("0xZZ").is_err());
        assert!(parse_pattern("0x1?2").is_err());
    }

    #[test]
    fn test_pattern_length_limit() {
        let at_limit = "..".repeat(MAX_PATTERN_LEN / 2);
        assert_eq!(Pattern::parse(&at_limit).unwrap().len(), MAX_PATTERN_LEN);

        let too_long = ".".repeat(MAX_PATTERN_LEN + 1);
        assert!(matches!(
            Pattern::parse(&too_long),
            Err(Error::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_format_pattern_roundtrip() {
        let pattern = vec![Some(0x48), Some(0x8D), Some(0x0D), None, Some(0xFF)];
        let formatted = format_pattern(&pattern);
        assert_eq!(formatted, "48 8D 0D ?? FF");
        let parsed = parse_pattern(&formatted).unwrap();
        assert_eq!(parsed, pattern);
    }

    #[test]
    fn test_matches_at() {
        let pattern = Pattern::parse("0x11??33").unwrap();
        assert!(pattern.matches_at(&[0x11, 0x00, 0x33, 0x44], 0));
        assert!(pattern.matches_at(&[0x11, 0xFF, 0x33], 0));
        assert!(!pattern.matches_at(&[0x11, 0x00, 0x34, 0x44], 0));
        assert!(!pattern.matches_at(&[0x11, 0x00], 0));
        assert!(pattern.matches_at(&[0x00, 0x11, 0x22, 0x33], 1));
    }
}
