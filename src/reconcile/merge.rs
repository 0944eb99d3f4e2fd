use crate::model::{AlertInstance, RemoteAlert, Tags};

/// Overlay a desired instance onto its live counterpart.
///
/// Declared fields replace the live ones, options are overlaid key by key, and
/// anything only the service knows about (id, state, extra fields, undeclared
/// options) is kept.
pub fn merge(live: &RemoteAlert, desired: &AlertInstance) -> RemoteAlert {
    let mut merged = live.clone();
    merged.name = desired.name.clone();
    merged.query = desired.query.clone();
    merged.alert_type = desired.alert_type.clone();
    if let Some(message) = &desired.message {
        merged.message = Some(message.clone());
    }

    // Same tag set in another order is not a change
    if Tags::parse(&live.tags) != desired.tags || live.tags.len() != desired.tags.len() {
        merged.tags = desired.tags.to_wire();
    }

    for (key, value) in &desired.options {
        merged.options.insert(key.clone(), value.clone());
    }
    merged
}

/// Names of the top-level fields that differ between two alerts
pub fn changed_fields(before: &RemoteAlert, after: &RemoteAlert) -> Vec<String> {
    let mut fields = Vec::new();
    if before.name != after.name {
        fields.push("name".to_string());
    }
    if before.query != after.query {
        fields.push("query".to_string());
    }
    if before.alert_type != after.alert_type {
        fields.push("type".to_string());
    }
    if before.message != after.message {
        fields.push("message".to_string());
    }
    if before.tags != after.tags {
        fields.push("tags".to_string());
    }
    for (key, value) in &after.options {
        if before.options.get(key) != Some(value) {
            fields.push(format!("options.{}", key));
        }
    }
    fields
}
