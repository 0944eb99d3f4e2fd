use crate::model::{AlertInstance, RemoteAlert};

/// Identity rule deciding whether a live alert is the remote counterpart of a
/// desired instance
pub trait AlertMatcher {
    fn matches(&self, live: &RemoteAlert, desired: &AlertInstance) -> bool;

    /// Get a human-readable name for this rule
    fn name(&self) -> &str;
}

/// Loose identity: same name or same query.
///
/// Renaming an alert or editing its query still resolves to the same remote
/// object, as long as both do not change in one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameOrQueryMatcher;

impl AlertMatcher for NameOrQueryMatcher {
    fn matches(&self, live: &RemoteAlert, desired: &AlertInstance) -> bool {
        live.name == desired.name || live.query == desired.query
    }

    fn name(&self) -> &str {
        "NameOrQueryMatcher"
    }
}

/// Strict identity: same name only
#[derive(Debug, Clone, Copy, Default)]
pub struct NameMatcher;

impl AlertMatcher for NameMatcher {
    fn matches(&self, live: &RemoteAlert, desired: &AlertInstance) -> bool {
        live.name == desired.name
    }

    fn name(&self) -> &str {
        "NameMatcher"
    }
}
