/// Remote alert service: the trait the engine talks to and its implementations
pub mod datadog;

#[cfg(test)]
pub(crate) mod recording;

pub use datadog::DatadogClient;

use crate::error::ServiceError;
use crate::model::{AlertId, AlertInstance, RemoteAlert, TagFilter};

/// Client for the monitoring service holding the live alerts.
///
/// The service is the only store of alert state; implementations perform one
/// blocking request per call and do no caching.
#[cfg_attr(test, mockall::automock)]
pub trait AlertService {
    /// Alerts carrying any of the given tags (the service filter is disjunctive)
    fn list(&self, tags: &TagFilter) -> Result<Vec<RemoteAlert>, ServiceError>;

    /// Fetch a single alert
    fn get(&self, id: &AlertId) -> Result<RemoteAlert, ServiceError>;

    /// Create an alert and return it as stored, with its assigned id
    fn create(&self, alert: &AlertInstance) -> Result<RemoteAlert, ServiceError>;

    /// Replace the definition of an existing alert
    fn update(&self, id: &AlertId, alert: &RemoteAlert) -> Result<RemoteAlert, ServiceError>;

    /// Delete an alert
    fn delete(&self, id: &AlertId) -> Result<(), ServiceError>;
}
