use anyhow::{Context as _, Result};
use async_trait::async_trait;
use log::warn;
use shared::chain::{ChainRpc, Name};
use shared::models::RegistryNode;

pub(crate) const NODES_TABLE: &str = "nodes";

#[async_trait]
pub trait NodeSource: Send + Sync {
    /// Current registry rows in registry order, at most `limit` of them.
    async fn fetch_nodes(&self, limit: u32) -> Result<Vec<RegistryNode>>;
}

/// Reads the `nodes` table of the registry contract, scoped to the
/// contract itself.
pub struct ChainRegistry {
    rpc: ChainRpc,
    contract: Name,
}

impl ChainRegistry {
    pub fn new(rpc: ChainRpc, contract: Name) -> Self {
        Self { rpc, contract }
    }
}

#[async_trait]
impl NodeSource for ChainRegistry {
    async fn fetch_nodes(&self, limit: u32) -> Result<Vec<RegistryNode>> {
        let table = self
            .rpc
            .get_table_rows::<RegistryNode>(self.contract, self.contract, NODES_TABLE, limit)
            .await
            .with_context(|| {
                format!(
                    "failed to read {NODES_TABLE} table of {} from {}",
                    self.contract,
                    self.rpc.endpoint()
                )
            })?;

        if table.more.as_bool() == Some(true) || table.more.as_str().is_some_and(|s| !s.is_empty())
        {
            warn!(
                "Registry {} holds more than {limit} nodes, only the first {limit} are watched",
                self.contract
            );
        }
        Ok(table.rows)
    }
}
