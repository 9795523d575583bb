use std::path::PathBuf;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::{bail, Context as _, Result};
use clap::Parser;
use log::{error, info};
use shared::chain::ChainRpc;
use tokio_util::sync::CancellationToken;

use crate::{
    handler::{health_check, metrics, State},
    ChainActionSubmitter, ChainConfig, ChainRegistry, ChainWatchdog, EventPlugin,
    HttpHealthProbe, LoopScheduler, WatchdogConfig, WebhookConfig, WebhookPlugin,
};

#[derive(Parser)]
pub struct Cli {
    /// Path to the TOML file describing the watched chains
    #[arg(short = 'c', long, default_value = "watchdog.toml")]
    pub config: PathBuf,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Port of the health and metrics HTTP server
    #[arg(long, default_value = "9880")]
    pub api_port: u16,

    /// Optional webhook receiving sweep and action events
    #[arg(long)]
    pub webhook_url: Option<String>,
}

impl Cli {
    pub async fn run(self, cancellation_token: CancellationToken) -> Result<()> {
        let chains = match WatchdogConfig::load(&self.config)
            .and_then(|config| config.resolve(|var| std::env::var(var).ok()))
        {
            Ok(chains) => chains,
            Err(e) => {
                error!("Invalid configuration: {e:#}");
                std::process::exit(1);
            }
        };

        let mut plugins: Vec<EventPlugin> = Vec::new();
        if let Some(url) = self.webhook_url {
            let plugin = WebhookPlugin::new(WebhookConfig {
                url,
                bearer_token: std::env::var("WEBHOOK_BEARER_TOKEN").ok(),
            })?;
            plugins.push(plugin.into());
        }

        let mut watchdogs = Vec::with_capacity(chains.len());
        for chain in &chains {
            match build_watchdog(chain).await {
                Ok(watchdog) => watchdogs.push(watchdog.with_plugins(plugins.clone())),
                Err(e) => {
                    error!("Failed to start watchdog for chain '{}': {e:#}", chain.name);
                    std::process::exit(1);
                }
            }
        }

        let health = watchdogs.iter().map(|w| w.health()).collect::<Vec<_>>();
        let state = web::Data::new(State { chains: health });
        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .route("/health", web::get().to(health_check))
                .route("/metrics", web::get().to(metrics))
        })
        .disable_signals()
        .bind(("0.0.0.0", self.api_port))
        .with_context(|| format!("failed to bind health server to port {}", self.api_port))?
        .run();
        let server_handle = server.handle();
        let server_task = tokio::spawn(server);
        info!("Health and metrics available on port {}", self.api_port);

        let handles = watchdogs
            .into_iter()
            .map(|watchdog| tokio::spawn(watchdog.run(cancellation_token.clone())))
            .collect::<Vec<_>>();

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Watchdog task panicked: {e}");
            }
        }

        server_handle.stop(true).await;
        match server_task.await {
            Ok(Err(e)) => error!("Actix server error: {e:?}"),
            Err(e) => error!("Actix server task failed: {e}"),
            Ok(Ok(())) => {}
        }
        info!("Shutdown complete");
        Ok(())
    }
}

/// Connects to the chain RPC, makes sure it serves the configured chain and
/// wires up the watchdog's collaborators.
async fn build_watchdog(chain: &ChainConfig) -> Result<ChainWatchdog> {
    let settings = &chain.settings;
    let rpc = ChainRpc::new(chain.rpc_url.clone(), settings.rpc_timeout())?;

    let info = rpc
        .get_info()
        .await
        .with_context(|| format!("RPC {} is unreachable", chain.rpc_url))?;
    let reported = info.chain_id()?;
    if reported != chain.chain_id {
        bail!(
            "RPC {} serves chain {reported}, expected {}",
            chain.rpc_url,
            chain.chain_id
        );
    }
    info!(
        "[{}] Connected to {} ({}), head block {}; signing as {}@{} with {}",
        chain.name,
        chain.rpc_url,
        info.server_version_string.as_deref().unwrap_or("unknown version"),
        info.head_block_num,
        chain.authority.actor,
        chain.authority.permission,
        chain.key.public_key()
    );

    let registry = ChainRegistry::new(rpc.clone(), chain.contract);
    let probe = HttpHealthProbe::new(settings.probe_timeout())?;
    let submitter = ChainActionSubmitter::new(chain, rpc);

    Ok(ChainWatchdog::new(
        chain.name.clone(),
        chain.chain_id,
        settings.node_limit,
        Arc::new(registry),
        Arc::new(probe),
        Arc::new(submitter),
        LoopScheduler::from_settings(settings),
    ))
}
