use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};
use log::error;
use serde_json::json;
use tokio::sync::Mutex;

use crate::{export_metrics, WatchdogHealth};

/// Sweeps failing in a row before a chain is reported unavailable.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

pub(crate) struct State {
    pub(crate) chains: Vec<Arc<Mutex<WatchdogHealth>>>,
}

pub(crate) async fn health_check(state: web::Data<State>) -> impl Responder {
    let mut snapshots = Vec::with_capacity(state.chains.len());
    for chain in &state.chains {
        snapshots.push(chain.lock().await.clone());
    }
    let now = chrono::Utc::now().timestamp();

    let chains: Vec<_> = snapshots
        .iter()
        .map(|health| {
            let seconds_ago = (health.last_sweep_timestamp() > 0)
                .then(|| now.saturating_sub(health.last_sweep_timestamp()));
            json!({
                "chain": health.chain(),
                "last_sweep_seconds_ago": seconds_ago,
                "last_report": health.last_report(),
                "consecutive_failures": health.consecutive_failures(),
                "last_error": health.last_error(),
            })
        })
        .collect();

    let failing: Vec<&str> = snapshots
        .iter()
        .filter(|health| health.consecutive_failures() >= MAX_CONSECUTIVE_FAILURES)
        .map(|health| health.chain())
        .collect();
    if !failing.is_empty() {
        return HttpResponse::ServiceUnavailable().json(json!({
            "status": "error",
            "message": format!(
                "{} failed {MAX_CONSECUTIVE_FAILURES} or more sweeps in a row",
                failing.join(", ")
            ),
            "chains": chains,
        }));
    }

    if snapshots
        .iter()
        .any(|health| health.last_sweep_timestamp() == 0)
    {
        return HttpResponse::Ok().json(json!({
            "status": "starting",
            "message": "Not every chain has completed a sweep yet",
            "chains": chains,
        }));
    }

    HttpResponse::Ok().json(json!({
        "status": "ok",
        "chains": chains,
    }))
}

pub(crate) async fn metrics() -> impl Responder {
    match export_metrics() {
        Ok(metrics) => HttpResponse::Ok().content_type("text/plain").body(metrics),
        Err(e) => {
            error!("Error exporting metrics: {e:?}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
