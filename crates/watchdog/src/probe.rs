use std::time::Duration;

use alloy::primitives::B256;
use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use shared::models::{BrokerStatus, RegistryNode};
use url::Url;

pub(crate) const STATUS_PATH: &str = "/broker/status/";

/// What a health probe observed for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reported(BrokerStatus),
    /// Invalid URL, connection failure, timeout or non-success status.
    Unreachable(String),
}

impl ProbeOutcome {
    /// Fail-closed verdict: only an explicit `ok` for `chain_id` in the
    /// multi-chain format counts as healthy.
    pub fn is_healthy(&self, chain_id: &B256) -> bool {
        match self {
            ProbeOutcome::Reported(status) => status.is_ok_for(chain_id),
            ProbeOutcome::Unreachable(_) => false,
        }
    }

    pub(crate) fn label(&self, chain_id: &B256) -> &'static str {
        match self {
            ProbeOutcome::Reported(BrokerStatus::Chains(_)) if self.is_healthy(chain_id) => "ok",
            ProbeOutcome::Reported(BrokerStatus::Chains(_)) => "not_ok",
            ProbeOutcome::Reported(BrokerStatus::Legacy) => "legacy",
            ProbeOutcome::Reported(BrokerStatus::Malformed(_)) => "malformed",
            ProbeOutcome::Unreachable(_) => "unreachable",
        }
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Never fails: every problem is folded into the outcome.
    async fn probe(&self, node: &RegistryNode) -> ProbeOutcome;
}

pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// The status path replaces whatever path the advertised URL has.
    pub fn status_url(node_url: &str) -> Result<Url, url::ParseError> {
        Url::parse(node_url)?.join(STATUS_PATH)
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, node: &RegistryNode) -> ProbeOutcome {
        let url = match Self::status_url(&node.url) {
            Ok(url) => url,
            Err(e) => {
                return ProbeOutcome::Unreachable(format!("invalid url '{}': {e}", node.url))
            }
        };
        debug!("Probing {} at {url}", node.owner);

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return ProbeOutcome::Unreachable(format!("request to {url} failed: {e}")),
        };
        let status = response.status();
        if !status.is_success() {
            return ProbeOutcome::Unreachable(format!("{url} returned HTTP {status}"));
        }

        match response.bytes().await {
            Ok(body) => ProbeOutcome::Reported(BrokerStatus::parse(&body)),
            Err(e) => ProbeOutcome::Unreachable(format!("reading body from {url} failed: {e}")),
        }
    }
}
