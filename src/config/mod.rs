//! Alert definition files and service credentials

pub mod config;
pub mod credentials;

pub use config::{AlertDocument, Config, TeamSection};
pub use credentials::Credentials;
