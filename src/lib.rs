/// Error types for configuration, service calls and reconciliation
pub mod error;

/// Alert templates, instances, remote alerts and tags
pub mod model;

/// Interpolation, identity tags and composite decomposition
pub mod alerts;

/// Alert definition files and credentials
pub mod config;

/// Remote alert service client
pub mod service;

/// Reconciliation of desired and live alerts
pub mod reconcile;

/// List, update and delete over a catalog and a service
pub mod kennel;

// Re-export commonly used types
pub use config::{Config, Credentials};
pub use error::{ConfigError, ReconcileError, ServiceError};
pub use kennel::Kennel;
pub use model::{AlertId, AlertInstance, AlertSummary, AlertTemplate, RemoteAlert, Role, Tags};
pub use reconcile::{Action, ReconcileReport, Reconciler};
pub use service::{AlertService, DatadogClient};
