//! Hex number parsing and formatting utilities.

use anyhow::{Result, bail};

/// Parse a hex string (with or without 0x prefix).
pub fn parse_hex(s: &str) -> Result<u64> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(s, 16).map_err(|e| anyhow::anyhow!("Invalid hex number: {}", e))
}

/// Format an address as a hex string with 0x prefix.
pub fn format_hex_address(addr: u64) -> String {
    format!("0x{:X}", addr)
}

/// Parse a buffer size: `0x`-prefixed hex or decimal, never zero.
pub fn parse_size(s: &str) -> Result<usize> {
    let size = if s.starts_with("0x") || s.starts_with("0X") {
        parse_hex(s)? as usize
    } else {
        s.parse::<usize>()
            .map_err(|e| anyhow::anyhow!("Invalid size: {}", e))?
    };
    if size == 0 {
        bail!("Size must be greater than zero");
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_with_prefix() {
        assert_eq!(parse_hex("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_hex("0X1000").unwrap(), 0x1000);
    }

    #[test]
    fn test_parse_hex_without_prefix() {
        assert_eq!(parse_hex("1000").unwrap(), 0x1000);
        assert_eq!(parse_hex("7100000000").unwrap(), 0x71_0000_0000);
    }

    #[test]
    fn test_parse_hex_invalid() {
        assert!(parse_hex("GHIJK").is_err());
        assert!(parse_hex("0xZZZ").is_err());
    }

    #[test]
    fn test_format_hex_address() {
        assert_eq!(format_hex_address(0x7100_0000), "0x71000000");
        assert_eq!(format_hex_address(0), "0x0");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("0x1000").unwrap(), 4096);
        assert_eq!(parse_size("256").unwrap(), 256);
        assert!(parse_size("0").is_err());
        assert!(parse_size("0x0").is_err());
        assert!(parse_size("4k").is_err());
    }
}
