mod cli;
mod config;
mod events;
mod handler;
mod metrics;
mod probe;
mod reconcile;
mod registry;
mod scheduler;
mod submitter;
mod watchdog;

pub use cli::Cli;
pub use config::{ChainConfig, ScheduleSettings, WatchdogConfig};
pub use events::{EventPlugin, WatchdogEvent, WebhookConfig, WebhookPlugin};
pub use metrics::{export_metrics, MetricsContext};
pub use probe::{HealthProbe, HttpHealthProbe, ProbeOutcome};
pub use reconcile::{reconcile, ActionKind, ReconcileAction};
pub use registry::{ChainRegistry, NodeSource};
pub use scheduler::LoopScheduler;
pub use submitter::{ActionSubmitter, ChainActionSubmitter};
pub use watchdog::{ChainWatchdog, SweepReport, WatchdogHealth};
