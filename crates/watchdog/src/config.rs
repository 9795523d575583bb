use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::B256;
use anyhow::{bail, ensure, Context as _, Result};
use serde::Deserialize;
use shared::chain::{Name, PermissionLevel, PrivateKey, TransactOptions};
use url::Url;

/// Loop and I/O tunables. Every field can be set under `[defaults]` and
/// overridden per chain under `[chains.schedule]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleSettings {
    /// Maximum number of registry rows read per sweep.
    pub node_limit: u32,
    /// Below this many nodes the registry is considered settled and the
    /// loop waits `steady_interval_secs` between sweeps.
    pub churn_threshold: usize,
    pub steady_interval_secs: u64,
    pub error_backoff_secs: u64,
    /// Upper bound for exponential failure backoff. Equal to
    /// `error_backoff_secs` (the default) keeps the backoff fixed.
    pub max_error_backoff_secs: u64,
    pub probe_timeout_secs: u64,
    pub rpc_timeout_secs: u64,
    pub expire_seconds: u32,
    pub blocks_behind: u32,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            node_limit: 1000,
            churn_threshold: 10,
            steady_interval_secs: 30 * 60,
            error_backoff_secs: 10,
            max_error_backoff_secs: 10,
            probe_timeout_secs: 5,
            rpc_timeout_secs: 10,
            expire_seconds: 30,
            blocks_behind: 3,
        }
    }
}

impl ScheduleSettings {
    pub fn steady_interval(&self) -> Duration {
        Duration::from_secs(self.steady_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn max_error_backoff(&self) -> Duration {
        Duration::from_secs(self.max_error_backoff_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn transact_options(&self) -> TransactOptions {
        TransactOptions {
            blocks_behind: self.blocks_behind,
            expire_seconds: self.expire_seconds,
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.node_limit > 0, "node_limit must be greater than 0");
        ensure!(
            self.churn_threshold > 0,
            "churn_threshold must be greater than 0"
        );
        ensure!(
            self.probe_timeout_secs > 0,
            "probe_timeout_secs must be greater than 0"
        );
        ensure!(
            self.rpc_timeout_secs > 0,
            "rpc_timeout_secs must be greater than 0"
        );
        ensure!(
            self.expire_seconds > 0,
            "expire_seconds must be greater than 0"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScheduleOverrides {
    node_limit: Option<u32>,
    churn_threshold: Option<usize>,
    steady_interval_secs: Option<u64>,
    error_backoff_secs: Option<u64>,
    max_error_backoff_secs: Option<u64>,
    probe_timeout_secs: Option<u64>,
    rpc_timeout_secs: Option<u64>,
    expire_seconds: Option<u32>,
    blocks_behind: Option<u32>,
}

impl ScheduleOverrides {
    fn apply(&self, base: ScheduleSettings) -> ScheduleSettings {
        ScheduleSettings {
            node_limit: self.node_limit.unwrap_or(base.node_limit),
            churn_threshold: self.churn_threshold.unwrap_or(base.churn_threshold),
            steady_interval_secs: self
                .steady_interval_secs
                .unwrap_or(base.steady_interval_secs),
            error_backoff_secs: self.error_backoff_secs.unwrap_or(base.error_backoff_secs),
            max_error_backoff_secs: self
                .max_error_backoff_secs
                .unwrap_or(base.max_error_backoff_secs),
            probe_timeout_secs: self.probe_timeout_secs.unwrap_or(base.probe_timeout_secs),
            rpc_timeout_secs: self.rpc_timeout_secs.unwrap_or(base.rpc_timeout_secs),
            expire_seconds: self.expire_seconds.unwrap_or(base.expire_seconds),
            blocks_behind: self.blocks_behind.unwrap_or(base.blocks_behind),
        }
    }
}

fn default_permission() -> String {
    "active".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChainEntry {
    name: String,
    chain_id: String,
    contract: String,
    watchdog_account: String,
    #[serde(default = "default_permission")]
    watchdog_permission: String,
    rpc_url: String,
    /// Environment variable holding the watchdog account's private key.
    private_key_env: String,
    #[serde(default)]
    schedule: ScheduleOverrides,
}

/// Contents of the watchdog TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchdogConfig {
    #[serde(default)]
    defaults: ScheduleSettings,
    chains: Vec<ChainEntry>,
}

/// Everything one chain's watchdog needs, validated and immutable.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub chain_id: B256,
    pub contract: Name,
    pub authority: PermissionLevel,
    pub rpc_url: Url,
    pub key: PrivateKey,
    pub settings: ScheduleSettings,
}

fn parse_name(field: &str, value: &str) -> Result<Name> {
    Name::from_str(value).with_context(|| format!("invalid {field} '{value}'"))
}

impl WatchdogConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Validates every chain entry and loads the signing keys through
    /// `lookup_env`.
    pub fn resolve<F>(&self, lookup_env: F) -> Result<Vec<ChainConfig>>
    where
        F: Fn(&str) -> Option<String>,
    {
        ensure!(!self.chains.is_empty(), "no chains configured");
        self.defaults
            .validate()
            .context("invalid [defaults] section")?;

        let mut seen_ids = HashSet::new();
        let mut seen_names = HashSet::new();
        let mut resolved = Vec::with_capacity(self.chains.len());

        for entry in &self.chains {
            let chain = Self::resolve_entry(entry, self.defaults, &lookup_env)
                .with_context(|| format!("invalid configuration for chain '{}'", entry.name))?;
            if !seen_names.insert(chain.name.clone()) {
                bail!("chain name '{}' is configured more than once", chain.name);
            }
            if !seen_ids.insert(chain.chain_id) {
                bail!("chain id {} is configured more than once", chain.chain_id);
            }
            resolved.push(chain);
        }

        Ok(resolved)
    }

    fn resolve_entry<F>(
        entry: &ChainEntry,
        defaults: ScheduleSettings,
        lookup_env: &F,
    ) -> Result<ChainConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        ensure!(!entry.name.trim().is_empty(), "chain name must not be empty");

        let chain_id = B256::from_str(&entry.chain_id)
            .with_context(|| format!("chain_id '{}' is not 32 bytes of hex", entry.chain_id))?;
        let contract = parse_name("contract", &entry.contract)?;
        let authority = PermissionLevel {
            actor: parse_name("watchdog_account", &entry.watchdog_account)?,
            permission: parse_name("watchdog_permission", &entry.watchdog_permission)?,
        };
        let rpc_url = Url::parse(&entry.rpc_url)
            .with_context(|| format!("invalid rpc_url '{}'", entry.rpc_url))?;

        let raw_key = lookup_env(&entry.private_key_env).with_context(|| {
            format!(
                "environment variable {} is not set",
                entry.private_key_env
            )
        })?;
        let key = PrivateKey::from_str(&raw_key)
            .with_context(|| format!("{} does not hold a valid key", entry.private_key_env))?;

        let settings = entry.schedule.apply(defaults);
        settings.validate()?;

        Ok(ChainConfig {
            name: entry.name.clone(),
            chain_id,
            contract,
            authority,
            rpc_url,
            key,
            settings,
        })
    }
}
