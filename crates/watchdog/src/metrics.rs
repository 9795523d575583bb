use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, GaugeVec,
    HistogramVec, TextEncoder,
};

lazy_static! {
    pub(crate) static ref SWEEP_DURATION: HistogramVec = register_histogram_vec!(
        "watchdog_sweep_duration_seconds",
        "Duration of a full sweep over the registry",
        &["chain"],
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]
    ).unwrap();

    pub(crate) static ref NODES: GaugeVec = register_gauge_vec!(
        "watchdog_nodes",
        "Nodes returned by the registry in the last completed sweep",
        &["chain"]
    ).unwrap();

    pub(crate) static ref HEALTHY_NODES: GaugeVec = register_gauge_vec!(
        "watchdog_healthy_nodes",
        "Nodes that reported ok in the last completed sweep",
        &["chain"]
    ).unwrap();

    pub(crate) static ref PROBES: CounterVec = register_counter_vec!(
        "watchdog_probes_total",
        "Health probes by outcome",
        &["chain", "outcome"] // outcome: ok, not_ok, legacy, malformed, unreachable
    ).unwrap();

    pub(crate) static ref ACTIONS: CounterVec = register_counter_vec!(
        "watchdog_actions_total",
        "Submitted registry actions",
        &["chain", "action", "result"] // result: success, error
    ).unwrap();

    pub(crate) static ref SWEEP_FAILURES: CounterVec = register_counter_vec!(
        "watchdog_sweep_failures_total",
        "Sweeps aborted by a registry or transaction error",
        &["chain"]
    ).unwrap();
}

pub fn export_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families)
}

/// Label context for one chain's metrics.
#[derive(Clone, Debug)]
pub struct MetricsContext {
    pub chain: String,
}

impl MetricsContext {
    pub fn new(chain: String) -> Self {
        Self { chain }
    }

    pub fn record_sweep(&self, duration_s: f64, nodes: usize, healthy: usize) {
        SWEEP_DURATION
            .with_label_values(&[&self.chain as &str])
            .observe(duration_s);
        NODES
            .with_label_values(&[&self.chain as &str])
            .set(nodes as f64);
        HEALTHY_NODES
            .with_label_values(&[&self.chain as &str])
            .set(healthy as f64);
    }

    pub fn record_probe(&self, outcome: &str) {
        PROBES
            .with_label_values(&[&self.chain as &str, outcome])
            .inc();
    }

    pub fn record_action(&self, action: &str, result: &str) {
        ACTIONS
            .with_label_values(&[&self.chain as &str, action, result])
            .inc();
    }

    pub fn record_sweep_failure(&self) {
        SWEEP_FAILURES
            .with_label_values(&[&self.chain as &str])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_metrics_are_exported() {
        let ctx = MetricsContext::new("metrics-test".to_string());
        ctx.record_sweep(1.5, 12, 9);
        ctx.record_probe("legacy");
        ctx.record_action("approve", "success");
        ctx.record_sweep_failure();

        let exported = export_metrics().unwrap();
        assert!(exported.contains(r#"watchdog_nodes{chain="metrics-test"} 12"#));
        assert!(exported.contains(r#"watchdog_healthy_nodes{chain="metrics-test"} 9"#));
        assert!(exported
            .contains(r#"watchdog_probes_total{chain="metrics-test",outcome="legacy"} 1"#));
        assert!(exported.contains(
            r#"watchdog_actions_total{action="approve",chain="metrics-test",result="success"} 1"#
        ));
        assert!(exported.contains(r#"watchdog_sweep_failures_total{chain="metrics-test"} 1"#));
    }
}
