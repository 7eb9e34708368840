//! Single-instruction predicates and patch generators.
//!
//! Words are 32-bit little-endian AArch64 instructions. Only the top byte
//! of an instruction is inspected to classify it; nothing here is a general
//! decoder.

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::error::{Error, Result};
use crate::pattern::parse_pattern;

/// Width of the instruction word decoded at a match.
pub const INSTRUCTION_SIZE: usize = 4;

/// Longest replacement a [`Patch`] may produce.
pub const MAX_PATCH_LEN: usize = 24;

/// `NOP`
pub const NOP: u32 = 0xD503_201F;

/// Decode the instruction word at `offset`.
pub fn read_word(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + INSTRUCTION_SIZE)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Predicate deciding whether the instruction at a match should be patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Condition {
    /// `MOVZ Wn, #imm`
    Movz,
    /// `STRB Wt, [Xn, #imm]`
    Strb,
    /// `TBNZ Rt, #imm, label`
    Tbnz,
    /// `CBZ Rt, label`
    Cbz,
    /// `B.cond label`
    BCond,
    BCondOrTbnz,
    /// `word & mask == value`
    Masked { mask: u32, value: u32 },
}

impl Condition {
    pub fn matches(&self, word: u32) -> bool {
        let top = word >> 24;
        match *self {
            Self::Movz => top == 0x52,
            Self::Strb => top == 0x39,
            Self::Tbnz => top == 0x37,
            Self::Cbz => top == 0x34,
            Self::BCond => top == 0x54,
            Self::BCondOrTbnz => top == 0x54 || top == 0x37,
            Self::Masked { mask, value } => word & mask == value,
        }
    }
}

/// Replacement bytes written over a matched instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PatchData {
    bytes: Vec<u8>,
}

impl PatchData {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() || bytes.len() > MAX_PATCH_LEN {
            return Err(Error::InvalidPattern(format!(
                "patch must be 1..={} bytes, got {}",
                MAX_PATCH_LEN,
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    /// Parse a wildcard-free hex string such as `"0x1F2003D5"`.
    pub fn parse(hex: &str) -> Result<Self> {
        let bytes = parse_pattern(hex)?
            .into_iter()
            .map(|b| {
                b.ok_or_else(|| Error::InvalidPattern(format!("wildcard in patch data '{}'", hex)))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(bytes)
    }

    /// `count` consecutive instruction words.
    pub fn words(word: u32, count: usize) -> Result<Self> {
        Self::new(word.to_le_bytes().repeat(count))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether `data` starts with these bytes.
    pub fn is_present_in(&self, data: &[u8]) -> bool {
        data.starts_with(&self.bytes)
    }

    fn to_hex(&self) -> String {
        let mut out = String::with_capacity(2 + self.bytes.len() * 2);
        out.push_str("0x");
        for b in &self.bytes {
            out.push_str(&format!("{:02X}", b));
        }
        out
    }
}

impl TryFrom<String> for PatchData {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PatchData> for String {
    fn from(value: PatchData) -> Self {
        value.to_hex()
    }
}

/// Generator for the bytes written at the patch address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Patch {
    /// Fixed byte sequence, independent of the matched instruction.
    Bytes(PatchData),
    /// Re-encode the matched `MOVZ` with a new 16-bit immediate, keeping its
    /// destination register, width and shift.
    MovzImmediate(u16),
}

impl Patch {
    pub fn nop(count: usize) -> Result<Self> {
        Ok(Self::Bytes(PatchData::words(NOP, count)?))
    }

    pub fn bytes_for(&self, word: u32) -> PatchData {
        match self {
            Self::Bytes(data) => data.clone(),
            Self::MovzImmediate(imm) => {
                let encoded = (word & !(0xFFFF << 5)) | (u32::from(*imm) << 5);
                PatchData {
                    bytes: encoded.to_le_bytes().to_vec(),
                }
            }
        }
    }

    /// Number of bytes [`Patch::bytes_for`] produces, for any word.
    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(data) => data.len(),
            Self::MovzImmediate(_) => INSTRUCTION_SIZE,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
