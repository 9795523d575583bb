use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use alloy::primitives::B256;
use anyhow::Result;
use log::{debug, error, info, warn};
use serde::Serialize;
use shared::models::RegistryNode;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    reconcile, ActionKind, ActionSubmitter, EventPlugin, HealthProbe, LoopScheduler,
    MetricsContext, NodeSource, ProbeOutcome, WatchdogEvent,
};

/// Outcome of one completed pass over the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub nodes: usize,
    pub healthy: usize,
    pub approved: usize,
    pub disapproved: usize,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(duration.as_millis() as u64)
}

/// Per-chain snapshot served by the `/health` endpoint.
#[derive(Debug, Clone)]
pub struct WatchdogHealth {
    chain: String,
    last_sweep_timestamp: i64,
    last_report: Option<SweepReport>,
    consecutive_failures: u32,
    last_error: Option<String>,
}

impl WatchdogHealth {
    pub(crate) fn new(chain: String) -> Self {
        Self {
            chain,
            last_sweep_timestamp: 0,
            last_report: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    pub(crate) fn record_success(&mut self, timestamp: i64, report: SweepReport) {
        self.last_sweep_timestamp = timestamp;
        self.last_report = Some(report);
        self.consecutive_failures = 0;
        self.last_error = None;
    }

    pub(crate) fn record_failure(&mut self, error: String) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error);
        self.consecutive_failures
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Unix seconds of the last completed sweep, 0 before the first one.
    pub fn last_sweep_timestamp(&self) -> i64 {
        self.last_sweep_timestamp
    }

    pub fn last_report(&self) -> Option<&SweepReport> {
        self.last_report.as_ref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

/// Watches a single chain's registry and keeps each node's activation flag
/// in line with what the node reports about itself.
pub struct ChainWatchdog {
    name: String,
    chain_id: B256,
    node_limit: u32,
    nodes: Arc<dyn NodeSource>,
    probe: Arc<dyn HealthProbe>,
    submitter: Arc<dyn ActionSubmitter>,
    scheduler: LoopScheduler,
    plugins: Vec<EventPlugin>,
    health: Arc<Mutex<WatchdogHealth>>,
    metrics: MetricsContext,
}

impl ChainWatchdog {
    pub fn new(
        name: String,
        chain_id: B256,
        node_limit: u32,
        nodes: Arc<dyn NodeSource>,
        probe: Arc<dyn HealthProbe>,
        submitter: Arc<dyn ActionSubmitter>,
        scheduler: LoopScheduler,
    ) -> Self {
        Self {
            health: Arc::new(Mutex::new(WatchdogHealth::new(name.clone()))),
            metrics: MetricsContext::new(name.clone()),
            name,
            chain_id,
            node_limit,
            nodes,
            probe,
            submitter,
            scheduler,
            plugins: Vec::new(),
        }
    }

    pub fn with_plugins(mut self, plugins: Vec<EventPlugin>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn health(&self) -> Arc<Mutex<WatchdogHealth>> {
        self.health.clone()
    }

    async fn emit(&self, event: WatchdogEvent) {
        for plugin in &self.plugins {
            plugin.handle_event(&event).await;
        }
    }

    /// One pass over the registry. Nodes are handled one at a time in
    /// registry order; the first failed submission ends the pass.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let started = Instant::now();
        let nodes = self.nodes.fetch_nodes(self.node_limit).await?;
        debug!("[{}] Sweeping {} nodes", self.name, nodes.len());

        let mut report = SweepReport {
            nodes: nodes.len(),
            ..Default::default()
        };

        for node in &nodes {
            let healthy = self.check(node).await;
            if healthy {
                report.healthy += 1;
            }

            let Some(kind) = reconcile(node.is_active, healthy).kind() else {
                continue;
            };
            info!(
                "[{}] {} is {} but marked {}, submitting {kind}",
                self.name,
                node.owner,
                if healthy { "healthy" } else { "unhealthy" },
                if node.is_active { "active" } else { "inactive" },
            );

            let transaction_id = match self.submitter.submit(node.owner, kind).await {
                Ok(transaction_id) => {
                    self.metrics.record_action(kind.as_str(), "success");
                    transaction_id
                }
                Err(e) => {
                    self.metrics.record_action(kind.as_str(), "error");
                    return Err(e);
                }
            };

            let (chain, owner) = (self.name.clone(), node.owner.to_string());
            let event = match kind {
                ActionKind::Approve => {
                    report.approved += 1;
                    WatchdogEvent::NodeApproved {
                        chain,
                        owner,
                        transaction_id,
                    }
                }
                ActionKind::Disapprove => {
                    report.disapproved += 1;
                    WatchdogEvent::NodeDisapproved {
                        chain,
                        owner,
                        transaction_id,
                    }
                }
            };
            self.emit(event).await;
        }

        report.duration = started.elapsed();
        self.metrics.record_sweep(
            report.duration.as_secs_f64(),
            report.nodes,
            report.healthy,
        );
        Ok(report)
    }

    async fn check(&self, node: &RegistryNode) -> bool {
        let outcome = self.probe.probe(node).await;
        self.metrics.record_probe(outcome.label(&self.chain_id));
        match &outcome {
            ProbeOutcome::Unreachable(reason) => {
                debug!("[{}] {} unreachable: {reason}", self.name, node.owner)
            }
            ProbeOutcome::Reported(status) if !outcome.is_healthy(&self.chain_id) => {
                debug!("[{}] {} reported {status:?}", self.name, node.owner)
            }
            ProbeOutcome::Reported(_) => {}
        }
        outcome.is_healthy(&self.chain_id)
    }

    /// Sweeps until cancelled. Errors never end the loop; they are logged
    /// and turned into a backoff before the next sweep.
    pub async fn run(self, cancellation_token: CancellationToken) {
        info!("[{}] Watchdog started for chain {}", self.name, self.chain_id);

        loop {
            let delay = match self.sweep().await {
                Ok(report) => {
                    info!(
                        "[{}] Sweep completed in {}ms: {} nodes, {} healthy, {} approved, {} disapproved",
                        self.name,
                        report.duration.as_millis(),
                        report.nodes,
                        report.healthy,
                        report.approved,
                        report.disapproved
                    );
                    let delay = self.scheduler.after_sweep(report.nodes);
                    self.health
                        .lock()
                        .await
                        .record_success(chrono::Utc::now().timestamp(), report.clone());
                    self.emit(WatchdogEvent::SweepCompleted {
                        chain: self.name.clone(),
                        nodes: report.nodes,
                        healthy: report.healthy,
                        approved: report.approved,
                        disapproved: report.disapproved,
                        duration_ms: report.duration.as_millis() as u64,
                    })
                    .await;
                    delay
                }
                Err(e) => {
                    let consecutive_failures =
                        self.health.lock().await.record_failure(format!("{e:#}"));
                    self.metrics.record_sweep_failure();
                    let backoff = self.scheduler.after_failure(consecutive_failures);
                    error!(
                        "[{}] Sweep failed ({consecutive_failures} in a row), retrying in {backoff:?}: {e:#}",
                        self.name
                    );
                    self.emit(WatchdogEvent::SweepFailed {
                        chain: self.name.clone(),
                        error: format!("{e:#}"),
                        consecutive_failures,
                    })
                    .await;
                    Some(backoff)
                }
            };

            match delay {
                Some(delay) => {
                    debug!("[{}] Next sweep in {delay:?}", self.name);
                    tokio::select! {
                        _ = cancellation_token.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => {
                    if cancellation_token.is_cancelled() {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            }
        }

        warn!("[{}] Watchdog stopped", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HttpHealthProbe, WebhookConfig, WebhookPlugin};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use mockito::{Matcher, Server};
    use shared::chain::Name;
    use shared::models::BrokerStatus;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CHAIN: &str = "e70aaab8997e1dfce58fbfac80cbbb8fecec7b99cf982a9444273cbc64c41473";

    fn chain() -> B256 {
        CHAIN.parse().unwrap()
    }

    fn node(owner: &str, is_active: bool, url: &str) -> RegistryNode {
        RegistryNode {
            owner: owner.parse().unwrap(),
            is_active,
            url: url.to_string(),
        }
    }

    fn ok_status() -> ProbeOutcome {
        ProbeOutcome::Reported(BrokerStatus::parse(
            format!(r#"{{"chains":[{{"chainId":"{CHAIN}","status":"ok"}}]}}"#).as_bytes(),
        ))
    }

    fn scheduler(steady: Duration, backoff: Duration) -> LoopScheduler {
        LoopScheduler::new(10, steady, backoff, backoff)
    }

    #[derive(Default)]
    struct FakeRegistry {
        nodes: Vec<RegistryNode>,
        fail: bool,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl NodeSource for FakeRegistry {
        async fn fetch_nodes(&self, limit: u32) -> Result<Vec<RegistryNode>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("registry unreachable"));
            }
            Ok(self.nodes.iter().take(limit as usize).cloned().collect())
        }
    }

    /// Reports `ok` for listed owners and unreachable for everyone else.
    #[derive(Default)]
    struct FakeProbe {
        outcomes: HashMap<String, ProbeOutcome>,
        probed: std::sync::Mutex<Vec<String>>,
    }

    impl FakeProbe {
        fn healthy(owners: &[&str]) -> Self {
            Self {
                outcomes: owners.iter().map(|o| (o.to_string(), ok_status())).collect(),
                ..Default::default()
            }
        }

        fn probed(&self) -> Vec<String> {
            self.probed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HealthProbe for FakeProbe {
        async fn probe(&self, node: &RegistryNode) -> ProbeOutcome {
            let owner = node.owner.to_string();
            self.probed.lock().unwrap().push(owner.clone());
            self.outcomes
                .get(&owner)
                .cloned()
                .unwrap_or_else(|| ProbeOutcome::Unreachable("timed out".to_string()))
        }
    }

    #[derive(Default)]
    struct FakeSubmitter {
        fail: bool,
        calls: std::sync::Mutex<Vec<(Name, ActionKind)>>,
    }

    impl FakeSubmitter {
        fn calls(&self) -> Vec<(String, ActionKind)> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(owner, kind)| (owner.to_string(), *kind))
                .collect()
        }
    }

    #[async_trait]
    impl ActionSubmitter for FakeSubmitter {
        async fn submit(&self, owner: Name, kind: ActionKind) -> Result<String> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((owner, kind));
            if self.fail {
                return Err(anyhow!("transaction rejected"));
            }
            Ok(format!("trx{}", calls.len()))
        }
    }

    fn watchdog(
        registry: Arc<FakeRegistry>,
        probe: Arc<dyn HealthProbe>,
        submitter: Arc<FakeSubmitter>,
        scheduler: LoopScheduler,
    ) -> ChainWatchdog {
        ChainWatchdog::new(
            "test".to_string(),
            chain(),
            1000,
            registry,
            probe,
            submitter,
            scheduler,
        )
    }

    fn default_scheduler() -> LoopScheduler {
        scheduler(Duration::from_secs(1800), Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_healthy_inactive_node_is_approved() {
        let registry = Arc::new(FakeRegistry {
            nodes: vec![node("brokerone", false, "https://one.example.com")],
            ..Default::default()
        });
        let submitter = Arc::new(FakeSubmitter::default());
        let watchdog = watchdog(
            registry,
            Arc::new(FakeProbe::healthy(&["brokerone"])),
            submitter.clone(),
            default_scheduler(),
        );

        let report = watchdog.sweep().await.unwrap();
        assert_eq!(
            submitter.calls(),
            vec![("brokerone".to_string(), ActionKind::Approve)]
        );
        assert_eq!(report.nodes, 1);
        assert_eq!(report.healthy, 1);
        assert_eq!(report.approved, 1);
        assert_eq!(report.disapproved, 0);
    }

    #[tokio::test]
    async fn test_unreachable_active_node_is_disapproved() {
        let registry = Arc::new(FakeRegistry {
            nodes: vec![node("brokerone", true, "https://one.example.com")],
            ..Default::default()
        });
        let submitter = Arc::new(FakeSubmitter::default());
        let watchdog = watchdog(
            registry,
            Arc::new(FakeProbe::default()),
            submitter.clone(),
            default_scheduler(),
        );

        let report = watchdog.sweep().await.unwrap();
        assert_eq!(
            submitter.calls(),
            vec![("brokerone".to_string(), ActionKind::Disapprove)]
        );
        assert_eq!(report.healthy, 0);
        assert_eq!(report.disapproved, 1);
    }

    #[tokio::test]
    async fn test_legacy_status_disapproves_active_node() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/broker/status/")
            .with_status(200)
            .with_body(r#"{"status":"ok"}"#)
            .create_async()
            .await;

        let registry = Arc::new(FakeRegistry {
            nodes: vec![node("brokerone", true, &server.url())],
            ..Default::default()
        });
        let submitter = Arc::new(FakeSubmitter::default());
        let watchdog = watchdog(
            registry,
            Arc::new(HttpHealthProbe::new(Duration::from_secs(5)).unwrap()),
            submitter.clone(),
            default_scheduler(),
        );

        watchdog.sweep().await.unwrap();
        assert_eq!(
            submitter.calls(),
            vec![("brokerone".to_string(), ActionKind::Disapprove)]
        );
    }

    #[tokio::test]
    async fn test_converged_nodes_need_no_action() {
        let registry = Arc::new(FakeRegistry {
            nodes: vec![
                node("brokerone", true, "https://one.example.com"),
                node("brokertwo", false, "https://two.example.com"),
            ],
            ..Default::default()
        });
        let probe = Arc::new(FakeProbe::healthy(&["brokerone"]));
        let submitter = Arc::new(FakeSubmitter::default());
        let watchdog = watchdog(registry, probe.clone(), submitter.clone(), default_scheduler());

        let report = watchdog.sweep().await.unwrap();
        assert!(submitter.calls().is_empty());
        assert_eq!(probe.probed(), vec!["brokerone", "brokertwo"]);
        assert_eq!(report.healthy, 1);
    }

    #[tokio::test]
    async fn test_registry_failure_aborts_sweep() {
        let registry = Arc::new(FakeRegistry {
            fail: true,
            ..Default::default()
        });
        let probe = Arc::new(FakeProbe::default());
        let watchdog = watchdog(
            registry,
            probe.clone(),
            Arc::new(FakeSubmitter::default()),
            default_scheduler(),
        );

        assert!(watchdog.sweep().await.is_err());
        assert!(probe.probed().is_empty());
    }

    #[tokio::test]
    async fn test_submit_failure_leaves_later_nodes_untouched() {
        let registry = Arc::new(FakeRegistry {
            nodes: vec![
                node("brokerone", true, "https://one.example.com"),
                node("brokertwo", true, "https://two.example.com"),
            ],
            ..Default::default()
        });
        let probe = Arc::new(FakeProbe::default());
        let submitter = Arc::new(FakeSubmitter {
            fail: true,
            ..Default::default()
        });
        let watchdog = watchdog(registry, probe.clone(), submitter.clone(), default_scheduler());

        let err = watchdog.sweep().await.unwrap_err();
        assert!(err.to_string().contains("transaction rejected"));
        assert_eq!(probe.probed(), vec!["brokerone"]);
        assert_eq!(submitter.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_sweeps_are_retried_after_backoff() {
        let registry = Arc::new(FakeRegistry {
            nodes: vec![
                node("brokerone", true, "https://one.example.com"),
                node("brokertwo", true, "https://two.example.com"),
            ],
            ..Default::default()
        });
        let probe = Arc::new(FakeProbe::default());
        let submitter = Arc::new(FakeSubmitter {
            fail: true,
            ..Default::default()
        });
        let watchdog = watchdog(
            registry.clone(),
            probe.clone(),
            submitter.clone(),
            scheduler(Duration::from_secs(1800), Duration::from_millis(20)),
        );
        let health = watchdog.health();

        let cancellation_token = CancellationToken::new();
        let handle = tokio::spawn(watchdog.run(cancellation_token.clone()));
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancellation_token.cancel();
        handle.await.unwrap();

        let attempts = registry.fetches.load(Ordering::SeqCst);
        assert!(attempts >= 2, "expected retries, got {attempts} sweeps");
        assert!(probe.probed().iter().all(|owner| owner == "brokerone"));
        assert!(submitter
            .calls()
            .iter()
            .all(|(owner, kind)| owner == "brokerone" && *kind == ActionKind::Disapprove));

        let health = health.lock().await;
        assert!(health.consecutive_failures() >= 2);
        assert_eq!(health.last_sweep_timestamp(), 0);
        assert!(health.last_error().unwrap().contains("transaction rejected"));
    }

    #[tokio::test]
    async fn test_large_registry_is_swept_without_delay() {
        let nodes = (1..=5)
            .flat_map(|i| {
                (1..=3).map(move |j| node(&format!("broker{i}{j}"), false, "https://x.example.com"))
            })
            .collect::<Vec<_>>();
        assert_eq!(nodes.len(), 15);
        let registry = Arc::new(FakeRegistry {
            nodes,
            ..Default::default()
        });
        let watchdog = watchdog(
            registry.clone(),
            Arc::new(FakeProbe::default()),
            Arc::new(FakeSubmitter::default()),
            default_scheduler(),
        );

        let cancellation_token = CancellationToken::new();
        let handle = tokio::spawn(watchdog.run(cancellation_token.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancellation_token.cancel();
        handle.await.unwrap();

        assert!(registry.fetches.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_small_registry_waits_steady_interval() {
        let registry = Arc::new(FakeRegistry {
            nodes: vec![
                node("brokera", false, "https://a.example.com"),
                node("brokerb", false, "https://b.example.com"),
                node("brokerc", false, "https://c.example.com"),
            ],
            ..Default::default()
        });
        let watchdog = watchdog(
            registry.clone(),
            Arc::new(FakeProbe::default()),
            Arc::new(FakeSubmitter::default()),
            default_scheduler(),
        );
        let health = watchdog.health();

        let cancellation_token = CancellationToken::new();
        let handle = tokio::spawn(watchdog.run(cancellation_token.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancellation_token.cancel();
        handle.await.unwrap();

        assert_eq!(registry.fetches.load(Ordering::SeqCst), 1);
        let health = health.lock().await;
        assert!(health.last_sweep_timestamp() > 0);
        assert_eq!(health.last_report().unwrap().nodes, 3);
        assert_eq!(health.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_approval_is_published_to_webhook() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/events")
            .with_status(200)
            .match_body(Matcher::PartialJson(serde_json::json!({
                "event": "node.approved",
                "data": {
                    "chain": "test",
                    "owner": "brokerone",
                    "transaction_id": "trx1",
                },
            })))
            .create_async()
            .await;

        let plugin = WebhookPlugin::new(WebhookConfig {
            url: format!("{}/events", server.url()),
            bearer_token: None,
        })
        .unwrap();
        let registry = Arc::new(FakeRegistry {
            nodes: vec![node("brokerone", false, "https://one.example.com")],
            ..Default::default()
        });
        let watchdog = watchdog(
            registry,
            Arc::new(FakeProbe::healthy(&["brokerone"])),
            Arc::new(FakeSubmitter::default()),
            default_scheduler(),
        )
        .with_plugins(vec![plugin.into()]);

        watchdog.sweep().await.unwrap();
        mock.assert_async().await;
    }
}
