use crate::model::{AlertInstance, RemoteAlert};
use crate::reconcile::AlertMatcher;

/// Working set of live alerts for one reconciliation run.
///
/// Alerts stay in place; claiming one only flips its consumed flag, so an
/// alert can be claimed at most once and the unclaimed rest is what the
/// sweep deletes.
#[derive(Debug, Default)]
pub struct LiveSet {
    alerts: Vec<RemoteAlert>,
    consumed: Vec<bool>,
}

impl LiveSet {
    pub fn new(alerts: Vec<RemoteAlert>) -> Self {
        let consumed = vec![false; alerts.len()];
        Self { alerts, consumed }
    }

    /// Claim the first unconsumed alert matching `desired`, returning its index
    pub fn claim(&mut self, matcher: &dyn AlertMatcher, desired: &AlertInstance) -> Option<usize> {
        let index = self
            .alerts
            .iter()
            .enumerate()
            .find(|(i, live)| !self.consumed[*i] && matcher.matches(live, desired))
            .map(|(i, _)| i)?;
        self.consumed[index] = true;
        Some(index)
    }

    pub fn get(&self, index: usize) -> &RemoteAlert {
        &self.alerts[index]
    }

    pub fn is_consumed(&self, index: usize) -> bool {
        self.consumed[index]
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Alerts never claimed, in their original order
    pub fn into_remaining(self) -> Vec<RemoteAlert> {
        self.alerts
            .into_iter()
            .zip(self.consumed)
            .filter(|(_, consumed)| !consumed)
            .map(|(alert, _)| alert)
            .collect()
    }
}
