use alloy::primitives::B256;
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use log::{debug, info};
use shared::chain::{Action, ChainRpc, Name, PermissionLevel, PrivateKey, TransactOptions};

use crate::{ActionKind, ChainConfig};

#[async_trait]
pub trait ActionSubmitter: Send + Sync {
    /// Submits exactly one transaction and returns its id. No retries.
    async fn submit(&self, owner: Name, kind: ActionKind) -> Result<String>;
}

/// Signs registry actions with the watchdog's key and pushes them to the
/// chain RPC.
pub struct ChainActionSubmitter {
    rpc: ChainRpc,
    chain_id: B256,
    contract: Name,
    authority: PermissionLevel,
    key: PrivateKey,
    options: TransactOptions,
}

impl ChainActionSubmitter {
    pub fn new(config: &ChainConfig, rpc: ChainRpc) -> Self {
        Self {
            rpc,
            chain_id: config.chain_id,
            contract: config.contract,
            authority: config.authority,
            key: config.key.clone(),
            options: config.settings.transact_options(),
        }
    }

    /// `{sender, owner}` payload authorized by the watchdog's permission.
    pub(crate) fn build_action(&self, owner: Name, kind: ActionKind) -> Result<Action> {
        let name: Name = kind
            .contract_action()
            .parse()
            .context("contract action names are valid names")?;
        Ok(Action::with_name_args(
            self.contract,
            name,
            vec![self.authority],
            &[self.authority.actor, owner],
        ))
    }
}

#[async_trait]
impl ActionSubmitter for ChainActionSubmitter {
    async fn submit(&self, owner: Name, kind: ActionKind) -> Result<String> {
        let action = self.build_action(owner, kind)?;
        debug!(
            "Submitting {}::{} for {owner} as {}@{}",
            self.contract,
            kind.contract_action(),
            self.authority.actor,
            self.authority.permission
        );

        let transaction_id = self
            .rpc
            .transact(&self.chain_id, &self.key, vec![action], self.options)
            .await
            .with_context(|| {
                format!(
                    "failed to {kind} {owner} via {}::{}",
                    self.contract,
                    kind.contract_action()
                )
            })?;

        info!(
            "{} {owner}: transaction {transaction_id}",
            kind.contract_action()
        );
        Ok(transaction_id)
    }
}
