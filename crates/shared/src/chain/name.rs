use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use super::ChainError;

const CHARMAP: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";
const MAX_NAME_LEN: usize = 13;

/// Account, action and permission name in the chain's base32 encoding.
///
/// Up to 12 characters from `.12345a-z`, plus an optional 13th character
/// restricted to `.12345a-j`. The string form always round-trips, so names
/// with trailing dots are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Name(u64);

impl Name {
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

fn char_to_symbol(c: u8) -> Option<u64> {
    match c {
        b'a'..=b'z' => Some(u64::from(c - b'a') + 6),
        b'1'..=b'5' => Some(u64::from(c - b'1') + 1),
        b'.' => Some(0),
        _ => None,
    }
}

impl FromStr for Name {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > MAX_NAME_LEN {
            return Err(ChainError::InvalidName(format!(
                "'{s}' is longer than {MAX_NAME_LEN} characters"
            )));
        }

        let mut value = 0u64;
        for (i, c) in s.bytes().enumerate() {
            let symbol = char_to_symbol(c).ok_or_else(|| {
                ChainError::InvalidName(format!("'{s}' contains invalid character '{}'", c as char))
            })?;
            if i < 12 {
                value |= (symbol & 0x1f) << (64 - 5 * (i + 1));
            } else {
                if symbol > 0x0f {
                    return Err(ChainError::InvalidName(format!(
                        "'{s}' has a 13th character outside of [.1-5a-j]"
                    )));
                }
                value |= symbol;
            }
        }

        let name = Name(value);
        if name.to_string() != s {
            return Err(ChainError::InvalidName(format!("'{s}' is not in canonical form")));
        }
        Ok(name)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chars = [b'.'; MAX_NAME_LEN];
        let mut tmp = self.0;
        for i in 0..MAX_NAME_LEN {
            let (mask, shift) = if i == 0 { (0x0f, 4) } else { (0x1f, 5) };
            chars[MAX_NAME_LEN - 1 - i] = CHARMAP[(tmp & mask) as usize];
            tmp >>= shift;
        }
        let len = chars
            .iter()
            .rposition(|&c| c != b'.')
            .map_or(0, |pos| pos + 1);
        // CHARMAP is pure ASCII
        f.write_str(std::str::from_utf8(&chars[..len]).map_err(|_| fmt::Error)?)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
