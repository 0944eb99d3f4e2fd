use crate::alerts::composite::{self, COMPOSITE_TYPE};
use crate::error::{ReconcileError, ServiceError};
use crate::model::{AlertId, AlertInstance, Query, RemoteAlert};
use crate::reconcile::merge::{changed_fields, merge};
use crate::reconcile::{AlertMatcher, LiveSet, NameOrQueryMatcher};
use crate::service::AlertService;
use log::{debug, info};
use rand::Rng;

/// Characters of identifiers synthesized during dry-run
const DRY_RUN_ID_CHARS: &[u8] = b"ABCDEF1234567890";
const DRY_RUN_ID_LEN: usize = 12;

/// One decision taken for an alert during reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// No live counterpart; the alert was (or would be) created
    Create { name: String, id: Option<AlertId> },
    /// Live counterpart differs; it was (or would be) updated in place
    Update { name: String, id: AlertId },
    /// Live counterpart already matches
    Unchanged { name: String, id: Option<AlertId> },
    /// Live alert without a desired counterpart; it was (or would be) deleted
    Delete { name: String, id: AlertId },
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::Create { name, .. }
            | Action::Update { name, .. }
            | Action::Unchanged { name, .. }
            | Action::Delete { name, .. } => name,
        }
    }
}

/// Outcome of a run, in execution order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    pub dry_run: bool,
    pub actions: Vec<Action>,
}

impl ReconcileReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            actions: Vec::new(),
        }
    }

    pub fn creates(&self) -> usize {
        self.count(|a| matches!(a, Action::Create { .. }))
    }

    pub fn updates(&self) -> usize {
        self.count(|a| matches!(a, Action::Update { .. }))
    }

    pub fn deletes(&self) -> usize {
        self.count(|a| matches!(a, Action::Delete { .. }))
    }

    /// True when the run changed (or would change) nothing
    pub fn is_converged(&self) -> bool {
        self.creates() + self.updates() + self.deletes() == 0
    }

    fn count(&self, predicate: impl Fn(&Action) -> bool) -> usize {
        self.actions.iter().filter(|a| predicate(a)).count()
    }
}

/// Computes and applies the create/update/delete plan that turns the live
/// alerts into the desired ones.
///
/// Under dry-run the same decisions are taken and reported, but no mutating
/// call reaches the service.
pub struct Reconciler<'a, S: AlertService + ?Sized> {
    service: &'a S,
    matcher: &'a dyn AlertMatcher,
    dry_run: bool,
}

impl<'a, S: AlertService + ?Sized> Reconciler<'a, S> {
    /// Create a reconciler using name-or-query identity
    pub fn new(service: &'a S, dry_run: bool) -> Self {
        Self {
            service,
            matcher: &NameOrQueryMatcher,
            dry_run,
        }
    }

    /// Replace the identity rule used to pair desired and live alerts
    pub fn with_matcher(mut self, matcher: &'a dyn AlertMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Reconcile `desired` against `live`.
    ///
    /// Composite alerts are planned up front, so an undecomposable query fails
    /// the run before any remote change. Sub-alerts are applied before their
    /// principal, and the delete sweep runs last.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::UnsupportedQuery` for list-shaped composite
    /// queries and `ReconcileError::Service` for the first failed remote call;
    /// changes applied before the failure stay applied.
    pub fn reconcile(
        &self,
        desired: Vec<AlertInstance>,
        live: Vec<RemoteAlert>,
    ) -> Result<ReconcileReport, ReconcileError> {
        let planned = desired
            .into_iter()
            .map(|instance| {
                let sub_alerts = composite::decompose(&instance)?;
                Ok((instance, sub_alerts))
            })
            .collect::<Result<Vec<_>, ReconcileError>>()?;

        debug!(
            "Reconciling {} desired against {} live alert(s) with {}",
            planned.len(),
            live.len(),
            self.matcher.name()
        );
        let mut live = LiveSet::new(live);
        let mut report = ReconcileReport::new(self.dry_run);

        for (mut principal, sub_alerts) in planned {
            if !sub_alerts.is_empty() {
                let mut ids = Vec::with_capacity(sub_alerts.len());
                for sub_alert in sub_alerts {
                    ids.push(self.apply(sub_alert, &mut live, &mut report)?);
                }
                principal.query = Query::Text(composite::join_ids(&ids));
                principal.alert_type = COMPOSITE_TYPE.to_string();
            }
            self.apply(principal, &mut live, &mut report)?;
        }

        self.sweep(live.into_remaining(), &mut report)?;
        Ok(report)
    }

    /// Delete unclaimed live alerts, each principal before the sub-alerts its
    /// query references, then sub-alerts no remaining principal references
    fn sweep(&self, remaining: Vec<RemoteAlert>, report: &mut ReconcileReport) -> Result<(), ServiceError> {
        let (principals, mut sub_alerts): (Vec<_>, Vec<_>) =
            remaining.into_iter().partition(|alert| alert.is_principal());

        for principal in principals {
            let referenced = composite::referenced_ids(&principal.alert_type, &principal.query);
            self.delete(principal, report)?;
            for id in referenced {
                if let Some(index) = sub_alerts.iter().position(|alert| alert.id.as_ref() == Some(&id)) {
                    let sub_alert = sub_alerts.remove(index);
                    self.delete(sub_alert, report)?;
                }
            }
        }

        for orphan in sub_alerts {
            self.delete(orphan, report)?;
        }
        Ok(())
    }

    /// Create or update one instance, returning the id of its remote alert
    fn apply(
        &self,
        desired: AlertInstance,
        live: &mut LiveSet,
        report: &mut ReconcileReport,
    ) -> Result<AlertId, ServiceError> {
        let index = match live.claim(self.matcher, &desired) {
            Some(index) => index,
            None => return self.create(desired, report),
        };

        let existing = live.get(index);
        let id = existing.id.clone().ok_or_else(|| {
            ServiceError::InvalidResponse(format!("live alert '{}' has no id", existing.name))
        })?;

        let merged = merge(existing, &desired);
        if merged == *existing {
            debug!("Alert unchanged: {}", desired.name);
            report.actions.push(Action::Unchanged {
                name: desired.name,
                id: Some(id.clone()),
            });
            return Ok(id);
        }

        info!("Updating alert: {}", merged.name);
        debug!(
            "Changed fields for '{}': {}",
            merged.name,
            changed_fields(existing, &merged).join(", ")
        );

        let id = if self.dry_run {
            id
        } else {
            self.service.update(&id, &merged)?.id.unwrap_or(id)
        };
        report.actions.push(Action::Update {
            name: merged.name,
            id: id.clone(),
        });
        Ok(id)
    }

    fn create(&self, desired: AlertInstance, report: &mut ReconcileReport) -> Result<AlertId, ServiceError> {
        info!("Creating alert: {}", desired.name);

        let id = if self.dry_run {
            // Composite principals still need an id to reference
            dry_run_id()
        } else {
            self.service.create(&desired)?.id.ok_or_else(|| {
                ServiceError::InvalidResponse(format!("created alert '{}' has no id", desired.name))
            })?
        };
        report.actions.push(Action::Create {
            name: desired.name,
            id: Some(id.clone()),
        });
        Ok(id)
    }

    fn delete(&self, alert: RemoteAlert, report: &mut ReconcileReport) -> Result<(), ServiceError> {
        let id = alert.id.ok_or_else(|| {
            ServiceError::InvalidResponse(format!("live alert '{}' has no id", alert.name))
        })?;

        info!("Deleting alert: {}", alert.name);
        if !self.dry_run {
            self.service.delete(&id)?;
        }
        report.actions.push(Action::Delete {
            name: alert.name,
            id,
        });
        Ok(())
    }
}

/// Random opaque identifier standing in for a service-assigned one
pub fn dry_run_id() -> AlertId {
    let mut rng = rand::thread_rng();
    let id: String = (0..DRY_RUN_ID_LEN)
        .map(|_| DRY_RUN_ID_CHARS[rng.gen_range(0..DRY_RUN_ID_CHARS.len())] as char)
        .collect();
    AlertId::new(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::tags;
    use crate::model::{Role, Tags};
    use crate::reconcile::NameMatcher;
    use crate::service::recording::RecordingService;
    use crate::service::MockAlertService;
    use mockall::predicate::eq;
    use serde_json::{json, Map};

    fn principal(name: &str, query: &str) -> AlertInstance {
        let mut user_tags = Tags::new();
        user_tags.insert("foo", "bar");
        AlertInstance {
            name: name.to_string(),
            query: Query::from(query),
            alert_type: "metric alert".to_string(),
            message: Some("mock_message".to_string()),
            tags: tags::build(Role::Principal, "mock_team", &user_tags),
            options: Map::new(),
            role: Role::Principal,
        }
    }

    fn remote(id: u64, name: &str, query: &str) -> RemoteAlert {
        RemoteAlert {
            id: Some(AlertId::from(id)),
            name: name.to_string(),
            query: Query::from(query),
            alert_type: "metric alert".to_string(),
            message: None,
            tags: tags::system_filter("mock_team").to_wire(),
            options: Map::new(),
            extra: Map::new(),
        }
    }

    #[test]
    fn test_unmatched_instance_is_created() {
        let service = RecordingService::new();

        let report = Reconciler::new(&service, false)
            .reconcile(vec![principal("[KN] t | cpu", "avg:cpu > 1")], vec![])
            .unwrap();

        assert_eq!(service.creates().len(), 1);
        assert_eq!(service.creates()[0].name, "[KN] t | cpu");
        assert!(service.updates().is_empty());
        assert!(service.deletes().is_empty());
        assert_eq!(report.creates(), 1);
    }

    #[test]
    fn test_create_only_touches_create() {
        let mut mock = MockAlertService::new();
        mock.expect_create()
            .withf(|alert| alert.name == "[KN] t | cpu")
            .times(1)
            .returning(|alert| Ok(RemoteAlert::from_instance(alert, Some(AlertId::from(9)))));
        mock.expect_update().never();
        mock.expect_delete().never();

        let report = Reconciler::new(&mock, false)
            .reconcile(vec![principal("[KN] t | cpu", "avg:cpu > 1")], vec![])
            .unwrap();

        assert_eq!(
            report.actions,
            vec![Action::Create {
                name: "[KN] t | cpu".to_string(),
                id: Some(AlertId::from(9)),
            }]
        );
    }

    #[test]
    fn test_created_alert_without_id_is_invalid_response() {
        let mut mock = MockAlertService::new();
        mock.expect_create()
            .returning(|alert| Ok(RemoteAlert::from_instance(alert, None)));

        let result = Reconciler::new(&mock, false)
            .reconcile(vec![principal("[KN] t | cpu", "avg:cpu > 1")], vec![]);

        assert!(matches!(
            result,
            Err(ReconcileError::Service(ServiceError::InvalidResponse(_)))
        ));
    }

    #[test]
    fn test_query_match_updates_and_keeps_extra_fields() {
        let mut live = remote(7, "[KN] t | old name", "avg:cpu > 1");
        live.extra.insert("extra".to_string(), json!("foo-bar"));
        live.options.insert("key".to_string(), json!("value"));
        let service = RecordingService::with_alerts(vec![live.clone()]);

        let report = Reconciler::new(&service, false)
            .reconcile(vec![principal("[KN] t | cpu", "avg:cpu > 1")], vec![live])
            .unwrap();

        let updates = service.updates();
        assert_eq!(updates.len(), 1);
        let (id, payload) = &updates[0];
        assert_eq!(*id, AlertId::from(7));
        assert_eq!(payload.name, "[KN] t | cpu");
        assert_eq!(payload.extra["extra"], json!("foo-bar"));
        assert_eq!(payload.options["key"], json!("value"));
        assert_eq!(payload.message.as_deref(), Some("mock_message"));
        assert!(service.creates().is_empty());
        assert!(service.deletes().is_empty());
        assert_eq!(report.updates(), 1);
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let service = RecordingService::new();
        let desired = vec![
            principal("[KN] t | cpu", "avg:cpu > 1"),
            principal("[KN] t | composite", "avg:a > 1 && avg:b > 2"),
        ];

        Reconciler::new(&service, false)
            .reconcile(desired.clone(), service.alerts())
            .unwrap();
        assert_eq!(service.creates().len(), 4);

        service.clear_calls();
        let report = Reconciler::new(&service, false)
            .reconcile(desired, service.alerts())
            .unwrap();

        assert_eq!(service.mutations(), 0);
        assert!(report.is_converged());
        assert_eq!(report.actions.len(), 4);
    }

    #[test]
    fn test_composite_query_references_sub_alert_ids_in_order() {
        let service = RecordingService::new();

        let report = Reconciler::new(&service, false)
            .reconcile(
                vec![principal("[KN] t | composite", "mock_query_1 && mock_query_2")],
                vec![],
            )
            .unwrap();

        let creates = service.creates();
        assert_eq!(creates.len(), 3);
        assert_eq!(creates[0].name, "[KN-C] t | composite -- 1");
        assert_eq!(creates[0].query, Query::from("mock_query_1"));
        assert_eq!(creates[1].name, "[KN-C] t | composite -- 2");
        assert_eq!(creates[1].query, Query::from("mock_query_2"));
        assert_eq!(creates[2].query, Query::from("1000 && 1001"));
        assert_eq!(creates[2].alert_type, COMPOSITE_TYPE);
        assert_eq!(report.creates(), 3);
    }

    #[test]
    fn test_composite_update_uses_updated_sub_alert_ids() {
        let mut mock = MockAlertService::new();
        let mut sequence = mockall::Sequence::new();
        mock.expect_update()
            .with(eq(AlertId::from(11)), mockall::predicate::always())
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|id, alert| {
                let mut updated = alert.clone();
                updated.id = Some(id.clone());
                Ok(updated)
            });
        mock.expect_update()
            .with(eq(AlertId::from(12)), mockall::predicate::always())
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|id, alert| {
                let mut updated = alert.clone();
                updated.id = Some(id.clone());
                Ok(updated)
            });
        mock.expect_update()
            .withf(|id, alert| {
                *id == AlertId::from(10) && alert.query == Query::from("11 && 12")
            })
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|id, alert| {
                let mut updated = alert.clone();
                updated.id = Some(id.clone());
                Ok(updated)
            });
        mock.expect_create().never();
        mock.expect_delete().never();

        let live = vec![
            remote(10, "[KN] t | composite", "11 && 12"),
            remote(11, "[KN-C] t | composite -- 1", "a"),
            remote(12, "[KN-C] t | composite -- 2", "b"),
        ];

        let report = Reconciler::new(&mock, false)
            .reconcile(vec![principal("[KN] t | composite", "a && b")], live)
            .unwrap();

        assert_eq!(report.updates(), 3);
    }

    #[test]
    fn test_unmatched_live_alerts_are_deleted_last() {
        let live = vec![
            remote(1, "[KN] t | gone", "avg:gone > 1"),
            remote(2, "[KN-C] t | gone -- 1", "x"),
        ];
        let service = RecordingService::with_alerts(live.clone());

        let report = Reconciler::new(&service, false)
            .reconcile(vec![principal("[KN] t | cpu", "avg:cpu > 1")], live)
            .unwrap();

        let calls = service.calls();
        assert!(matches!(calls[0], crate::service::recording::Call::Create(_)));
        assert_eq!(service.deletes(), vec![AlertId::from(1), AlertId::from(2)]);
        assert_eq!(report.deletes(), 2);
    }

    #[test]
    fn test_sweep_deletes_principal_before_its_sub_alerts() {
        let mut orphan = remote(5, "[KN-C] t | lost -- 1", "z");
        orphan.tags = tags::build(Role::SubAlert, "mock_team", &Tags::new()).to_wire();
        let mut sub_1 = remote(1, "[KN-C] t | gone -- 1", "x");
        sub_1.tags = orphan.tags.clone();
        let mut sub_2 = remote(2, "[KN-C] t | gone -- 2", "y");
        sub_2.tags = orphan.tags.clone();
        let mut principal = remote(3, "[KN] t | gone", "2 && 1");
        principal.alert_type = COMPOSITE_TYPE.to_string();
        let live = vec![orphan, sub_1, sub_2, principal];
        let service = RecordingService::with_alerts(live.clone());

        Reconciler::new(&service, false).reconcile(vec![], live).unwrap();

        assert_eq!(
            service.deletes(),
            vec![
                AlertId::from(3),
                AlertId::from(2),
                AlertId::from(1),
                AlertId::from(5)
            ]
        );
    }

    #[test]
    fn test_dry_run_issues_no_mutations() {
        let mut mock = MockAlertService::new();
        mock.expect_create().never();
        mock.expect_update().never();
        mock.expect_delete().never();

        let live = vec![
            remote(1, "[KN] t | cpu", "avg:cpu > 5"),
            remote(2, "[KN] t | gone", "avg:gone > 1"),
        ];
        let desired = vec![
            principal("[KN] t | cpu", "avg:cpu > 1"),
            principal("[KN] t | composite", "a && b"),
        ];

        let report = Reconciler::new(&mock, true).reconcile(desired, live).unwrap();

        assert!(report.dry_run);
        assert_eq!(report.updates(), 1);
        assert_eq!(report.creates(), 3);
        assert_eq!(report.deletes(), 1);
    }

    #[test]
    fn test_dry_run_plan_matches_live_run() {
        let live = vec![
            remote(1, "[KN] t | cpu", "avg:cpu > 5"),
            remote(2, "[KN] t | gone", "avg:gone > 1"),
        ];
        let desired = vec![
            principal("[KN] t | cpu", "avg:cpu > 1"),
            principal("[KN] t | composite", "a && b"),
        ];

        let dry = RecordingService::with_alerts(live.clone());
        let wet = RecordingService::with_alerts(live.clone());
        let dry_report = Reconciler::new(&dry, true)
            .reconcile(desired.clone(), live.clone())
            .unwrap();
        let wet_report = Reconciler::new(&wet, false).reconcile(desired, live).unwrap();

        let names = |report: &ReconcileReport| {
            report
                .actions
                .iter()
                .map(|a| (std::mem::discriminant(a), a.name().to_string()))
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&dry_report), names(&wet_report));
        assert_eq!(dry.mutations(), 0);
    }

    #[test]
    fn test_dry_run_composite_references_synthesized_ids() {
        let service = RecordingService::new();

        let report = Reconciler::new(&service, true)
            .reconcile(vec![principal("[KN] t | composite", "a && b")], vec![])
            .unwrap();

        let ids: Vec<AlertId> = report
            .actions
            .iter()
            .filter_map(|a| match a {
                Action::Create { id, .. } => id.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(ids.len(), 3);
        assert!(ids
            .iter()
            .all(|id| id.as_str().len() == 12 && id.as_str().chars().all(|c| c.is_ascii_hexdigit())));
    }

    #[test]
    fn test_list_query_fails_before_any_remote_call() {
        let mut mock = MockAlertService::new();
        mock.expect_create().never();
        mock.expect_update().never();
        mock.expect_delete().never();

        let mut bad = principal("[KN] t | bad", "unused");
        bad.query = Query::AnyOf(vec!["a".to_string(), "b".to_string()]);
        let desired = vec![principal("[KN] t | cpu", "avg:cpu > 1"), bad];

        let result = Reconciler::new(&mock, false).reconcile(desired, vec![]);

        assert!(matches!(result, Err(ReconcileError::UnsupportedQuery(_))));
    }

    #[test]
    fn test_remote_failure_aborts_run() {
        let mut mock = MockAlertService::new();
        let mut sequence = mockall::Sequence::new();
        mock.expect_create()
            .withf(|alert| alert.name == "[KN] t | one")
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|alert| Ok(RemoteAlert::from_instance(alert, Some(AlertId::from(1)))));
        mock.expect_create()
            .withf(|alert| alert.name == "[KN] t | two")
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| {
                Err(ServiceError::Api {
                    status: 500,
                    body: "boom".to_string(),
                })
            });
        mock.expect_delete().never();

        let desired = vec![
            principal("[KN] t | one", "q1"),
            principal("[KN] t | two", "q2"),
            principal("[KN] t | three", "q3"),
        ];
        let live = vec![remote(50, "[KN] t | gone", "gone")];

        let result = Reconciler::new(&mock, false).reconcile(desired, live);

        assert!(matches!(
            result,
            Err(ReconcileError::Service(ServiceError::Api { status: 500, .. }))
        ));
    }

    #[test]
    fn test_live_alert_matched_only_once() {
        let live = vec![remote(1, "[KN] t | a", "shared")];
        let service = RecordingService::with_alerts(live.clone());

        Reconciler::new(&service, false)
            .reconcile(
                vec![principal("[KN] t | a", "shared"), principal("[KN] t | b", "shared")],
                live,
            )
            .unwrap();

        assert_eq!(service.updates().len(), 1);
        assert_eq!(service.creates().len(), 1);
        assert_eq!(service.creates()[0].name, "[KN] t | b");
    }

    #[test]
    fn test_custom_matcher() {
        let live = vec![remote(1, "[KN] t | old", "avg:cpu > 1")];
        let service = RecordingService::with_alerts(live.clone());

        Reconciler::new(&service, false)
            .with_matcher(&NameMatcher)
            .reconcile(vec![principal("[KN] t | new", "avg:cpu > 1")], live)
            .unwrap();

        // Same query but a different name is a different alert under strict naming
        assert_eq!(service.creates().len(), 1);
        assert_eq!(service.deletes(), vec![AlertId::from(1)]);
    }

    #[test]
    fn test_dry_run_id_shape() {
        let id = dry_run_id();
        assert_eq!(id.as_str().len(), DRY_RUN_ID_LEN);
        assert!(id.as_str().bytes().all(|b| DRY_RUN_ID_CHARS.contains(&b)));
    }
}
