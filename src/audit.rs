use serde_json::{Value, json};

use crate::{security::sanitize_for_logging, state::AppState};

/// Records a security or order-lifecycle event: traced immediately, then
/// persisted to the audit trail. A failed write only logs a warning.
pub async fn record_event(state: &AppState, event_type: &str, resource: Option<&str>, data: Value) {
    let data = sanitize_for_logging(data);
    let entry = json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "eventType": event_type,
        "data": data,
    });
    tracing::info!(event = %event_type, details = %entry, "security event");

    if let Err(err) = state.audit.record(event_type, resource, Some(entry)).await {
        tracing::warn!(error = %err, event = %event_type, "audit log failed");
    }
}
