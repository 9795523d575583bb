use serde::{de, Deserialize, Deserializer, Serialize};

use crate::chain::Name;

/// Row of the registry contract's `nodes` table. Only the fields the
/// watchdog acts on are decoded; everything else in the row is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryNode {
    pub owner: Name,
    #[serde(deserialize_with = "bool_or_int")]
    pub is_active: bool,
    pub url: String,
}

// contract tables may declare the flag as `bool` or as an integer type
fn bool_or_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(u64),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Int(other) => Err(de::Error::custom(format!(
            "is_active must be 0 or 1, got {other}"
        ))),
    }
}
