use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const STATUS_OK: &str = "ok";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStatus {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    pub status: String,
}

impl ChainStatus {
    /// Exact match against the lowercase, unprefixed hex form of
    /// `chain_id`. Any other spelling is treated as a different chain.
    pub fn is_for(&self, chain_id: &B256) -> bool {
        self.chain_id == hex::encode(chain_id)
    }
}

/// Body of a broker's `/broker/status/` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerStatus {
    /// Multi-chain format: one status entry per served chain.
    Chains(Vec<ChainStatus>),
    /// Older single-chain format without a `chains` list.
    Legacy,
    Malformed(String),
}

impl BrokerStatus {
    pub fn parse(body: &[u8]) -> Self {
        let value: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => return BrokerStatus::Malformed(format!("invalid JSON: {e}")),
        };
        let Value::Object(mut fields) = value else {
            return BrokerStatus::Malformed("expected a JSON object".to_string());
        };

        match fields.remove("chains") {
            None | Some(Value::Null) => BrokerStatus::Legacy,
            Some(Value::Array(entries)) => {
                if entries.iter().any(Value::is_null) {
                    return BrokerStatus::Malformed("`chains` contains a null entry".to_string());
                }
                BrokerStatus::Chains(
                    // other entries we cannot decode are skipped, they can
                    // never match the watched chain anyway
                    entries
                        .into_iter()
                        .filter_map(|entry| serde_json::from_value(entry).ok())
                        .collect(),
                )
            }
            Some(other) => BrokerStatus::Malformed(format!("`chains` is not a list: {other}")),
        }
    }

    /// Status reported for `chain_id`, if the body is in the multi-chain
    /// format and lists that chain.
    pub fn status_for(&self, chain_id: &B256) -> Option<&str> {
        match self {
            BrokerStatus::Chains(chains) => chains
                .iter()
                .find(|entry| entry.is_for(chain_id))
                .map(|entry| entry.status.as_str()),
            BrokerStatus::Legacy | BrokerStatus::Malformed(_) => None,
        }
    }

    pub fn is_ok_for(&self, chain_id: &B256) -> bool {
        self.status_for(chain_id) == Some(STATUS_OK)
    }
}
