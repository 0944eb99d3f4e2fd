//! The user-facing operations: list, update and delete managed alerts

use crate::alerts::{composite, tags};
use crate::config::Config;
use crate::error::{ReconcileError, ServiceError};
use crate::model::{AlertId, AlertSummary, RemoteAlert, TagFilter, Tags};
use crate::reconcile::{Action, AlertMatcher, NameOrQueryMatcher, ReconcileReport, Reconciler};
use crate::service::AlertService;
use log::{debug, info, warn};
use std::collections::BTreeSet;

/// Alert catalog bound to the service it is synchronized with
pub struct Kennel<S: AlertService> {
    config: Config,
    service: S,
    matcher: Box<dyn AlertMatcher>,
}

impl<S: AlertService> Kennel<S> {
    pub fn new(config: Config, service: S) -> Self {
        Self {
            config,
            service,
            matcher: Box::new(NameOrQueryMatcher),
        }
    }

    /// Replace the identity rule used when reconciling
    pub fn with_matcher(mut self, matcher: Box<dyn AlertMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Live alerts of every configured team carrying all of `filter`.
    ///
    /// One listing per team, scoped by the team's system tags with the user
    /// filter layered on top. Alerts returned twice are kept once.
    pub fn fetch(&self, filter: &TagFilter) -> Result<Vec<RemoteAlert>, ServiceError> {
        let mut alerts = Vec::new();
        let mut seen = BTreeSet::new();
        for team in self.config.teams() {
            for alert in self.fetch_team(team, filter)? {
                if remember(&mut seen, &alert) {
                    alerts.push(alert);
                }
            }
        }
        Ok(alerts)
    }

    /// Principal alerts matching `filter`, ready for display
    pub fn list(&self, filter: &TagFilter) -> Result<Vec<AlertSummary>, ServiceError> {
        let summaries: Vec<AlertSummary> = self
            .fetch(filter)?
            .iter()
            .filter(|alert| alert.is_principal())
            .map(AlertSummary::from)
            .collect();
        info!("Found {} managed alert(s)", summaries.len());
        Ok(summaries)
    }

    /// Make the service match the catalog for every alert matching `filter`.
    ///
    /// Each team is reconciled on its own: the desired instances of the team
    /// carrying `filter` against the team's live alerts carrying `filter`,
    /// plus the sub-alerts of those live alerts.
    pub fn update(&self, dry_run: bool, filter: &TagFilter) -> Result<ReconcileReport, ReconcileError> {
        info!(
            "Updating alerts{} with filter [{}]",
            if dry_run { " (dry run)" } else { "" },
            filter.to_wire().join(", ")
        );

        let reconciler = Reconciler::new(&self.service, dry_run).with_matcher(self.matcher.as_ref());
        let mut report = ReconcileReport::new(dry_run);

        for team in self.config.teams() {
            let mut live = self.fetch_team(team, filter)?;
            let sub_alerts = self.walk_sub_alerts(&live)?;
            let mut seen = BTreeSet::new();
            live.retain(|alert| remember(&mut seen, alert));
            live.extend(sub_alerts.into_iter().filter(|alert| remember(&mut seen, alert)));

            let desired = self.config.desired_for(team, filter);
            debug!(
                "Team '{}': {} desired instance(s), {} live alert(s)",
                team,
                desired.len(),
                live.len()
            );

            let team_report = reconciler.reconcile(desired, live)?;
            report.actions.extend(team_report.actions);
        }

        info!(
            "Update finished: {} created, {} updated, {} deleted",
            report.creates(),
            report.updates(),
            report.deletes()
        );
        Ok(report)
    }

    /// Delete every managed principal matching `filter`, each followed by its
    /// sub-alerts
    pub fn delete(&self, dry_run: bool, filter: &TagFilter) -> Result<ReconcileReport, ServiceError> {
        let mut report = ReconcileReport::new(dry_run);
        let mut deleted = BTreeSet::new();

        for principal in self.fetch(filter)?.into_iter().filter(RemoteAlert::is_principal) {
            let sub_alerts = self.walk_sub_alerts(std::slice::from_ref(&principal))?;
            for alert in std::iter::once(principal).chain(sub_alerts) {
                let id = match &alert.id {
                    Some(id) => id.clone(),
                    None => {
                        warn!("Skipping alert '{}' without id", alert.name);
                        continue;
                    }
                };
                if !deleted.insert(id.clone()) {
                    continue;
                }

                info!("Deleting alert: {}", alert.name);
                if !dry_run {
                    self.service.delete(&id)?;
                }
                report.actions.push(Action::Delete {
                    name: alert.name,
                    id,
                });
            }
        }

        info!("Delete finished: {} deleted", report.deletes());
        Ok(report)
    }

    fn fetch_team(&self, team: &str, filter: &TagFilter) -> Result<Vec<RemoteAlert>, ServiceError> {
        let scope = match scope(team, filter) {
            Some(scope) => scope,
            None => {
                debug!("Filter excludes team '{}'", team);
                return Ok(Vec::new());
            }
        };

        let alerts = self.service.list(&scope)?;
        let total = alerts.len();
        let alerts: Vec<RemoteAlert> = alerts
            .into_iter()
            .filter(|alert| scope.matches_wire(&alert.tags))
            .collect();
        debug!(
            "Team '{}': {} of {} listed alert(s) match [{}]",
            team,
            alerts.len(),
            total,
            scope.to_wire().join(", ")
        );
        Ok(alerts)
    }

    /// Sub-alerts referenced by the composite alerts among `alerts`, in
    /// reference order. Sub-alerts gone from the service are skipped.
    fn walk_sub_alerts(&self, alerts: &[RemoteAlert]) -> Result<Vec<RemoteAlert>, ServiceError> {
        let mut sub_alerts = Vec::new();
        for alert in alerts.iter().filter(|alert| alert.is_principal()) {
            for id in composite::referenced_ids(&alert.alert_type, &alert.query) {
                match self.service.get(&id) {
                    Ok(sub_alert) => sub_alerts.push(sub_alert),
                    Err(ServiceError::NotFound(_)) => {
                        warn!("Sub-alert {} of '{}' no longer exists", id, alert.name);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(sub_alerts)
    }
}

/// Listing filter for `team`: the user filter with the team's system tags.
///
/// Returns `None` when the user filter contradicts a system tag, so the team
/// has nothing to contribute.
fn scope(team: &str, filter: &TagFilter) -> Option<Tags> {
    let system = tags::system_filter(team);
    let conflicts = system
        .iter()
        .any(|(key, value)| filter.get(key).is_some_and(|wanted| wanted != value));
    if conflicts {
        return None;
    }

    let mut scope = filter.clone();
    scope.extend(&system);
    Some(scope)
}

/// Record `alert` as seen, returning false when its id was already seen
fn remember(seen: &mut BTreeSet<AlertId>, alert: &RemoteAlert) -> bool {
    match &alert.id {
        Some(id) => seen.insert(id.clone()),
        None => true,
    }
}
