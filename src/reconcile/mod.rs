//! Reconciliation of desired alert instances against live remote alerts

pub mod live;
pub mod matcher;
pub mod merge;
pub mod reconciler;

pub use live::LiveSet;
pub use matcher::{AlertMatcher, NameMatcher, NameOrQueryMatcher};
pub use merge::{changed_fields, merge};
pub use reconciler::{Action, ReconcileReport, Reconciler};
