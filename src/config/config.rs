use crate::alerts::{self, composite};
use crate::error::ConfigError;
use crate::model::{AlertInstance, AlertTemplate, TagFilter};
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Alert types the service accepts for managed alerts
pub const ALLOWED_TYPES: &[&str] = &[
    "metric alert",
    "service check",
    "event alert",
    "query alert",
    "composite",
];

/// Header of an alert file naming the team that owns its alerts
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TeamSection {
    pub team: String,
}

/// One parsed alert file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AlertDocument {
    pub kennel: TeamSection,
    #[serde(default)]
    pub alerts: Vec<AlertTemplate>,
}

impl AlertDocument {
    /// Parse an alert file from TOML text
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Check the shape rules expansion and reconciliation rely on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let team = self.kennel.team.trim();
        if team.is_empty() {
            return Err(ConfigError::ValidationError(
                "kennel.team must not be empty".to_string(),
            ));
        }

        for (index, alert) in self.alerts.iter().enumerate() {
            if alert.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "team '{}': alert #{} has an empty name",
                    team,
                    index + 1
                )));
            }
            if alert.query.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "team '{}': alert '{}' has an empty query",
                    team, alert.name
                )));
            }
            if !ALLOWED_TYPES.contains(&alert.alert_type.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "team '{}': alert '{}' has type '{}', expected one of: {}",
                    team,
                    alert.name,
                    alert.alert_type,
                    ALLOWED_TYPES.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Catalog of desired alert instances, grouped by owning team.
///
/// Instances are fully expanded and carry their namespaced principal name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    teams: BTreeMap<String, Vec<AlertInstance>>,
}

impl Config {
    /// Build the catalog from already-parsed documents.
    ///
    /// Documents of the same team are merged in the given order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for the first document that
    /// breaks a shape rule.
    pub fn from_documents(documents: Vec<AlertDocument>) -> Result<Self, ConfigError> {
        let mut teams: BTreeMap<String, Vec<AlertInstance>> = BTreeMap::new();

        for document in documents {
            document.validate()?;
            let team = document.kennel.team.trim().to_string();
            let instances = teams.entry(team.clone()).or_default();

            for mut template in document.alerts {
                template.team = team.clone();
                for mut instance in alerts::expand(&template) {
                    instance.name = composite::principal_name(&team, &instance.name);
                    instances.push(instance);
                }
            }
        }

        for (team, instances) in &teams {
            let mut seen = BTreeSet::new();
            for instance in instances {
                if !seen.insert(instance.name.as_str()) {
                    warn!("Team '{}' declares alert '{}' more than once", team, instance.name);
                }
            }
            debug!("Team '{}' declares {} alert instance(s)", team, instances.len());
        }

        Ok(Self { teams })
    }

    /// Load a single alert file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to a TOML alert file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_documents(vec![read_document(path)?])
    }

    /// Load every `*.toml` file of a directory, in path order
    ///
    /// # Arguments
    ///
    /// * `dir` - Directory holding one or more alert files
    pub fn from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", dir.display(), e)))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            warn!("No alert files found in {}", dir.display());
        }

        let documents = paths
            .iter()
            .map(|path| read_document(path))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_documents(documents)
    }

    /// Load a file or a directory of alert files
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading alert definitions from: {}", path.display());
        if path.is_dir() {
            Self::from_dir(path)
        } else {
            Self::from_file(path)
        }
    }

    /// Teams with at least one alert file, in name order
    pub fn teams(&self) -> impl Iterator<Item = &str> {
        self.teams.keys().map(String::as_str)
    }

    /// Instances declared by `team`
    pub fn instances(&self, team: &str) -> &[AlertInstance] {
        self.teams.get(team).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Instances of `team` whose tags include all of `filter`
    pub fn desired_for(&self, team: &str, filter: &TagFilter) -> Vec<AlertInstance> {
        self.instances(team)
            .iter()
            .filter(|instance| filter.is_subset_of(&instance.tags))
            .cloned()
            .collect()
    }
}

fn read_document(path: &Path) -> Result<AlertDocument, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
    AlertDocument::parse(&text).map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
}

/// Default location of alert definitions when none is given
pub fn default_path() -> PathBuf {
    PathBuf::from("alerts")
}
