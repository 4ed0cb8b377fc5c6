//! Structured run-lifecycle events.
//!
//! Every event is one JSON object on the `log` facade, so any installed
//! logger can forward it as-is.

use serde_json::json;

const COMPONENT: &str = "coordinator";

pub(crate) fn log_runner_info(event: &str, details: serde_json::Value) {
    log::info!(
        "{}",
        json!({
            "component": COMPONENT,
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

pub(crate) fn log_runner_error(event: &str, details: serde_json::Value) {
    log::error!(
        "{}",
        json!({
            "component": COMPONENT,
            "level": "error",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}
