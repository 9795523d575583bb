use log::error;
use serde::{Deserialize, Serialize};

mod webhook;

pub use webhook::{WebhookConfig, WebhookPlugin};

/// Observable outcome of a sweep or of a single registry action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum WatchdogEvent {
    #[serde(rename = "sweep.completed")]
    SweepCompleted {
        chain: String,
        nodes: usize,
        healthy: usize,
        approved: usize,
        disapproved: usize,
        duration_ms: u64,
    },
    #[serde(rename = "sweep.failed")]
    SweepFailed {
        chain: String,
        error: String,
        consecutive_failures: u32,
    },
    #[serde(rename = "node.approved")]
    NodeApproved {
        chain: String,
        owner: String,
        transaction_id: String,
    },
    #[serde(rename = "node.disapproved")]
    NodeDisapproved {
        chain: String,
        owner: String,
        transaction_id: String,
    },
}

/// Consumers of watchdog events. Delivery failures are logged and never
/// affect the control loop.
#[derive(Clone)]
pub enum EventPlugin {
    Webhook(WebhookPlugin),
}

impl EventPlugin {
    pub async fn handle_event(&self, event: &WatchdogEvent) {
        match self {
            EventPlugin::Webhook(plugin) => {
                if let Err(e) = plugin.send_event(event).await {
                    error!("Failed to deliver {event:?} to webhook: {e:#}");
                }
            }
        }
    }
}

impl From<WebhookPlugin> for EventPlugin {
    fn from(plugin: WebhookPlugin) -> Self {
        EventPlugin::Webhook(plugin)
    }
}
