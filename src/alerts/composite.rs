//! Composite alerts: AND-joined queries split into one sub-alert per condition

use crate::alerts::tags;
use crate::error::ReconcileError;
use crate::model::{AlertId, AlertInstance, Query, Role, Tags};

/// Operator joining the conditions of a composite query
pub const AND_JOIN: &str = "&&";

/// Alert type of a composite principal once its query references sub-alerts
pub const COMPOSITE_TYPE: &str = "composite";

/// Name prefix of principal alerts
pub const PRINCIPAL_PREFIX: &str = "[KN] ";

/// Name prefix of sub-alerts
pub const SUB_ALERT_PREFIX: &str = "[KN-C] ";

/// Namespaced name of a principal alert owned by `team`
pub fn principal_name(team: &str, name: &str) -> String {
    format!("{}{} | {}", PRINCIPAL_PREFIX, team, name)
}

/// Split a composite instance into its sub-alerts, in condition order.
///
/// Returns an empty list when the query has no AND-join, meaning the instance
/// is a simple alert. List-shaped queries cannot be decomposed and are
/// rejected, as are composites without a `team` tag.
pub fn decompose(instance: &AlertInstance) -> Result<Vec<AlertInstance>, ReconcileError> {
    let query = match &instance.query {
        Query::Text(text) => text,
        Query::AnyOf(_) => return Err(ReconcileError::UnsupportedQuery(instance.name.clone())),
    };
    if !query.contains(AND_JOIN) {
        return Ok(Vec::new());
    }

    let base = instance
        .name
        .strip_prefix(PRINCIPAL_PREFIX)
        .unwrap_or(&instance.name);
    let team = instance
        .team()
        .filter(|team| !team.is_empty())
        .ok_or_else(|| ReconcileError::MissingTeam(instance.name.clone()))?;
    let sub_tags = tags::build(Role::SubAlert, team, &Tags::new());

    let sub_alerts = query
        .split(AND_JOIN)
        .enumerate()
        .map(|(i, condition)| AlertInstance {
            name: format!("{}{} -- {}", SUB_ALERT_PREFIX, base, i + 1),
            query: Query::Text(condition.trim().to_string()),
            alert_type: instance.alert_type.clone(),
            message: None,
            tags: sub_tags.clone(),
            options: instance.options.clone(),
            role: Role::SubAlert,
        })
        .collect();

    Ok(sub_alerts)
}

/// Composite query referencing the given sub-alerts, in order
pub fn join_ids(ids: &[AlertId]) -> String {
    ids.iter()
        .map(AlertId::to_string)
        .collect::<Vec<_>>()
        .join(&format!(" {} ", AND_JOIN))
}

/// Sub-alert ids referenced by a remote composite alert's query.
///
/// Alerts of the composite type reference sub-alerts. Alerts of another type
/// count only when their query is nothing but numeric ids joined by `&&`,
/// which covers composites stored under a legacy type. Anything else yields
/// no ids.
pub fn referenced_ids(alert_type: &str, query: &Query) -> Vec<AlertId> {
    let text = match query {
        Query::Text(text) => text,
        Query::AnyOf(_) => return Vec::new(),
    };
    let parts: Vec<&str> = text
        .split(AND_JOIN)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    if alert_type != COMPOSITE_TYPE {
        let id_only = text.contains(AND_JOIN)
            && parts
                .iter()
                .all(|part| part.chars().all(|c| c.is_ascii_digit()));
        if !id_only {
            return Vec::new();
        }
    }
    parts.into_iter().map(AlertId::from).collect()
}
