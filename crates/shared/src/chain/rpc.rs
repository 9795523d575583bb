use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::B256;
use chrono::NaiveDateTime;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use super::{Action, ChainError, Name, PrivateKey, Transaction};

const BLOCK_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
// roughly half of all low-s signatures are canonical
const MAX_CANONICAL_ATTEMPTS: u32 = 64;

#[derive(Debug, Clone, Deserialize)]
pub struct ChainInfo {
    pub chain_id: String,
    pub head_block_num: u32,
    #[serde(default)]
    pub server_version_string: Option<String>,
}

impl ChainInfo {
    pub fn chain_id(&self) -> Result<B256, ChainError> {
        B256::from_str(&self.chain_id)
            .map_err(|e| ChainError::InvalidChainId(format!("{}: {e}", self.chain_id)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockInfo {
    pub block_num: u32,
    pub timestamp: String,
    pub ref_block_prefix: u32,
}

impl BlockInfo {
    /// Block time in seconds since the unix epoch. Block timestamps carry
    /// no zone suffix and are always UTC.
    pub fn timestamp_secs(&self) -> Result<u32, ChainError> {
        let parsed = NaiveDateTime::parse_from_str(&self.timestamp, BLOCK_TIMESTAMP_FORMAT)
            .map_err(|e| {
                ChainError::InvalidResponse(format!(
                    "unparseable block timestamp '{}': {e}",
                    self.timestamp
                ))
            })?;
        u32::try_from(parsed.and_utc().timestamp()).map_err(|_| {
            ChainError::InvalidResponse(format!(
                "block timestamp '{}' out of range",
                self.timestamp
            ))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableRows<T> {
    pub rows: Vec<T>,
    #[serde(default)]
    pub more: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushedTransaction {
    pub transaction_id: String,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    message: Option<String>,
    error: Option<RpcErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorDetail {
    what: Option<String>,
    #[serde(default)]
    details: Vec<RpcErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorMessage {
    message: String,
}

impl RpcErrorBody {
    fn describe(self) -> String {
        let mut parts = Vec::new();
        if let Some(message) = self.message {
            parts.push(message);
        }
        if let Some(error) = self.error {
            parts.extend(error.what);
            parts.extend(error.details.into_iter().map(|d| d.message));
        }
        parts.join(": ")
    }
}

#[derive(Debug, Serialize)]
struct PackedTransaction {
    signatures: Vec<String>,
    compression: u8,
    packed_context_free_data: String,
    packed_trx: String,
}

/// Expiration window for submitted transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactOptions {
    pub blocks_behind: u32,
    pub expire_seconds: u32,
}

impl Default for TransactOptions {
    fn default() -> Self {
        Self {
            blocks_behind: 3,
            expire_seconds: 30,
        }
    }
}

/// HTTP client for a node's `/v1/chain` API.
#[derive(Debug, Clone)]
pub struct ChainRpc {
    client: reqwest::Client,
    endpoint: Url,
}

impl ChainRpc {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ChainError> {
        let url = format!("{}/v1/chain/{path}", self.endpoint.as_str().trim_end_matches('/'));
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<RpcErrorBody>(&text) {
                Ok(body) => body.describe(),
                Err(_) => text,
            };
            return Err(ChainError::Rpc {
                method: path.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }

    pub async fn get_info(&self) -> Result<ChainInfo, ChainError> {
        self.post("get_info", json!({})).await
    }

    pub async fn get_block(&self, block_num: u32) -> Result<BlockInfo, ChainError> {
        self.post("get_block", json!({ "block_num_or_id": block_num }))
            .await
    }

    pub async fn get_table_rows<T: DeserializeOwned>(
        &self,
        code: Name,
        scope: Name,
        table: &str,
        limit: u32,
    ) -> Result<TableRows<T>, ChainError> {
        self.post(
            "get_table_rows",
            json!({
                "json": true,
                "code": code,
                "scope": scope,
                "table": table,
                "limit": limit,
            }),
        )
        .await
    }

    /// Signs `actions` with `key` and pushes them as a single transaction,
    /// returning the transaction id reported by the node.
    pub async fn transact(
        &self,
        chain_id: &B256,
        key: &PrivateKey,
        actions: Vec<Action>,
        options: TransactOptions,
    ) -> Result<String, ChainError> {
        let info = self.get_info().await?;
        let ref_block_num = info.head_block_num.saturating_sub(options.blocks_behind);
        let block = self.get_block(ref_block_num).await?;
        let base_expiration = block.timestamp_secs()?.saturating_add(options.expire_seconds);

        let mut transaction = Transaction {
            expiration: base_expiration,
            ref_block_num: (block.block_num & 0xffff) as u16,
            ref_block_prefix: block.ref_block_prefix,
            actions,
        };

        // deterministic nonces give one signature per digest, so a
        // non-canonical result is re-derived with a one second later expiry
        let mut attempt = 0;
        let signature = loop {
            let signature = key.sign_digest(&transaction.signing_digest(chain_id))?;
            if signature.is_canonical() {
                break signature;
            }
            attempt += 1;
            if attempt >= MAX_CANONICAL_ATTEMPTS {
                return Err(ChainError::Signing(
                    "could not produce a canonical signature".to_string(),
                ));
            }
            debug!("Non-canonical signature, shifting expiration (attempt {attempt})");
            transaction.expiration = base_expiration.saturating_add(attempt);
        };

        let packed = PackedTransaction {
            signatures: vec![signature.to_string()],
            compression: 0,
            packed_context_free_data: String::new(),
            packed_trx: hex::encode(transaction.pack()),
        };
        let pushed: PushedTransaction = self
            .post("push_transaction", serde_json::to_value(&packed)?)
            .await?;

        let local_id = hex::encode(transaction.id());
        if pushed.transaction_id != local_id {
            warn!(
                "Node reported transaction id {} but local id is {local_id}",
                pushed.transaction_id
            );
        }
        Ok(pushed.transaction_id)
    }
}
