//! In-memory alert service that records every call, for reconcile tests

use crate::error::ServiceError;
use crate::model::{AlertId, AlertInstance, RemoteAlert, TagFilter};
use crate::service::AlertService;
use std::cell::{Cell, RefCell};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    List(Vec<String>),
    Get(AlertId),
    Create(AlertInstance),
    Update(AlertId, RemoteAlert),
    Delete(AlertId),
}

/// Service double holding alerts in memory and behaving like the real
/// service: disjunctive tag listing, ids assigned on create
pub(crate) struct RecordingService {
    alerts: RefCell<Vec<RemoteAlert>>,
    calls: RefCell<Vec<Call>>,
    next_id: Cell<u64>,
}

impl RecordingService {
    pub(crate) fn new() -> Self {
        Self::with_alerts(Vec::new())
    }

    pub(crate) fn with_alerts(alerts: Vec<RemoteAlert>) -> Self {
        Self {
            alerts: RefCell::new(alerts),
            calls: RefCell::new(Vec::new()),
            next_id: Cell::new(1000),
        }
    }

    pub(crate) fn alerts(&self) -> Vec<RemoteAlert> {
        self.alerts.borrow().clone()
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub(crate) fn creates(&self) -> Vec<AlertInstance> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Create(alert) => Some(alert),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn updates(&self) -> Vec<(AlertId, RemoteAlert)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Update(id, alert) => Some((id, alert)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn deletes(&self) -> Vec<AlertId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Number of create, update and delete calls
    pub(crate) fn mutations(&self) -> usize {
        self.creates().len() + self.updates().len() + self.deletes().len()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl AlertService for RecordingService {
    fn list(&self, tags: &TagFilter) -> Result<Vec<RemoteAlert>, ServiceError> {
        let wanted = tags.to_wire();
        self.record(Call::List(wanted.clone()));
        Ok(self
            .alerts
            .borrow()
            .iter()
            .filter(|alert| wanted.is_empty() || alert.tags.iter().any(|t| wanted.contains(t)))
            .cloned()
            .collect())
    }

    fn get(&self, id: &AlertId) -> Result<RemoteAlert, ServiceError> {
        self.record(Call::Get(id.clone()));
        self.alerts
            .borrow()
            .iter()
            .find(|alert| alert.id.as_ref() == Some(id))
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    fn create(&self, alert: &AlertInstance) -> Result<RemoteAlert, ServiceError> {
        self.record(Call::Create(alert.clone()));
        let id = AlertId::from(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);

        let created = RemoteAlert::from_instance(alert, Some(id));
        self.alerts.borrow_mut().push(created.clone());
        Ok(created)
    }

    fn update(&self, id: &AlertId, alert: &RemoteAlert) -> Result<RemoteAlert, ServiceError> {
        self.record(Call::Update(id.clone(), alert.clone()));
        let mut alerts = self.alerts.borrow_mut();
        let stored = alerts
            .iter_mut()
            .find(|stored| stored.id.as_ref() == Some(id))
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
        *stored = alert.clone();
        stored.id = Some(id.clone());
        Ok(stored.clone())
    }

    fn delete(&self, id: &AlertId) -> Result<(), ServiceError> {
        self.record(Call::Delete(id.clone()));
        self.alerts
            .borrow_mut()
            .retain(|alert| alert.id.as_ref() != Some(id));
        Ok(())
    }
}
