//! Expansion of templated alert definitions into concrete alert instances
//!
//! Each binding set of a template yields at most one instance. Substitution
//! walks the structured template and rewrites string leaves and map keys, so
//! bound values are never re-parsed and may contain any character.

use crate::alerts::tags;
use crate::model::{AlertInstance, AlertTemplate, BindingSet, Role, Tags};
use log::{debug, warn};
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Recovery text appended to every principal alert message
pub const RECOVERY_MESSAGE: &str = "This alert has recovered.";

/// Options the service expects as booleans
const BOOL_OPTIONS: &[&str] = &[
    "notify_no_data",
    "require_full_window",
    "notify_audit",
    "locked",
    "include_tags",
];

/// Options the service expects as integers
const INT_OPTIONS: &[&str] = &[
    "new_host_delay",
    "no_data_timeframe",
    "timeout_h",
    "renotify_interval",
    "evaluation_delay",
];

/// Keys of `options.thresholds`, all numeric
const THRESHOLD_OPTIONS: &[&str] = &["critical", "warning", "ok"];

/// Text spellings of a true boolean option
const TRUTHY: &[&str] = &["y", "t", "yes", "true", "1"];

/// Matches `${name}` placeholders, capturing the name
fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\$\{(.+?)\}").expect("placeholder pattern is valid"))
}

/// Binding sets used for `template`: its declared sets, or a single empty set
/// when it declares none, each with `team` forced to the owning team
fn binding_sets(template: &AlertTemplate) -> Vec<BindingSet> {
    let mut sets = match &template.with_variables {
        Some(sets) if !sets.is_empty() => sets.clone(),
        _ => vec![BindingSet::new()],
    };
    for set in &mut sets {
        set.insert("team".to_string(), template.team.clone());
    }
    sets
}

/// Expand `template` into one instance per fully resolvable binding set.
///
/// Binding sets that leave placeholders behind are skipped with a warning.
pub fn expand(template: &AlertTemplate) -> Vec<AlertInstance> {
    let mut body = template.clone();
    body.with_variables = None;
    let body = match serde_json::to_value(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to prepare alert '{}' for interpolation: {}", template.name, e);
            return Vec::new();
        }
    };

    let mut instances = Vec::new();
    for bindings in binding_sets(template) {
        match interpolate(&body, &bindings, &template.team) {
            Ok(instance) => instances.push(instance),
            Err(Skipped::Unresolved(names)) => {
                warn!(
                    "Non-interpolated variables '{}' found for alert '{}'",
                    names.into_iter().collect::<Vec<_>>().join(", "),
                    template.name
                );
            }
            Err(Skipped::Malformed(reason)) => {
                warn!(
                    "Alert '{}' is malformed after interpolation: {}",
                    template.name, reason
                );
            }
        }
    }

    debug!(
        "Expanded alert '{}' into {} instance(s)",
        template.name,
        instances.len()
    );
    instances
}

/// Why a binding set produced no instance
#[derive(Debug, PartialEq)]
enum Skipped {
    /// Placeholders left over after substitution
    Unresolved(BTreeSet<String>),
    /// Substituted body no longer reads back as a template
    Malformed(String),
}

fn interpolate(body: &Value, bindings: &BindingSet, team: &str) -> Result<AlertInstance, Skipped> {
    let mut unresolved = BTreeSet::new();
    let substituted = substitute_value(body, bindings, &mut unresolved);
    if !unresolved.is_empty() {
        return Err(Skipped::Unresolved(unresolved));
    }

    let mut template: AlertTemplate =
        serde_json::from_value(substituted).map_err(|e| Skipped::Malformed(e.to_string()))?;
    template.team = team.to_string();
    type_options(&mut template.options).map_err(Skipped::Malformed)?;

    let user_tags: Tags = template.tags.clone().into_iter().collect();
    Ok(AlertInstance {
        message: Some(render_message(&template.message, &template.notify)),
        tags: tags::build(Role::Principal, team, &user_tags),
        name: template.name,
        query: template.query,
        alert_type: template.alert_type,
        options: template.options,
        role: Role::Principal,
    })
}

/// Wrap an alert message with alert/recovery sections and notification handles
pub fn render_message(message: &str, notify: &[String]) -> String {
    let handles = notify
        .iter()
        .map(|handle| format!("@{}", handle))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "{{{{#is_alert}}}}\n{}\n{{{{/is_alert}}}}\n{{{{#is_recovery}}}}\n{}\n{{{{/is_recovery}}}}\n{}",
        message, RECOVERY_MESSAGE, handles
    )
}

fn substitute_value(value: &Value, bindings: &BindingSet, unresolved: &mut BTreeSet<String>) -> Value {
    match value {
        Value::String(text) => Value::String(substitute_str(text, bindings, unresolved)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute_value(item, bindings, unresolved))
                .collect(),
        ),
        Value::Object(fields) => {
            let mut out = Map::with_capacity(fields.len());
            for (key, field) in fields {
                out.insert(
                    substitute_str(key, bindings, unresolved),
                    substitute_value(field, bindings, unresolved),
                );
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Replace every bound placeholder of `text` in a single scan.
///
/// Replacement text is not scanned again; any placeholder syntax left in the
/// result, including syntax introduced by a bound value, is reported.
fn substitute_str(text: &str, bindings: &BindingSet, unresolved: &mut BTreeSet<String>) -> String {
    let replaced = placeholder().replace_all(text, |caps: &Captures| match bindings.get(&caps[1]) {
        Some(value) => value.clone(),
        None => caps[0].to_string(),
    });

    for leftover in placeholder().find_iter(&replaced) {
        unresolved.insert(leftover.as_str().to_string());
    }
    replaced.into_owned()
}

/// Type the known options from their textual form.
///
/// Every other option, including free text such as `escalation_message`, is
/// left as written.
fn type_options(options: &mut Map<String, Value>) -> Result<(), String> {
    for (key, value) in options.iter_mut() {
        let Value::String(text) = value else { continue };
        if BOOL_OPTIONS.contains(&key.as_str()) {
            *value = Value::Bool(is_truthy(text));
        } else if INT_OPTIONS.contains(&key.as_str()) {
            let int = text
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("option '{}' expects an integer, got '{}'", key, text))?;
            *value = Value::from(int);
        }
    }

    if let Some(Value::Object(thresholds)) = options.get_mut("thresholds") {
        for (key, value) in thresholds.iter_mut() {
            let Value::String(text) = value else { continue };
            if !THRESHOLD_OPTIONS.contains(&key.as_str()) {
                continue;
            }
            *value = text
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("threshold '{}' expects a number, got '{}'", key, text))?;
        }
    }
    Ok(())
}

fn is_truthy(text: &str) -> bool {
    TRUTHY.contains(&text.trim().to_lowercase().as_str())
}
