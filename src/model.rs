//! Core alert types shared by the interpolator, the reconciler and the service client
//!
//! Templates are what users author, instances are what the interpolator and the
//! decomposer produce, and remote alerts are what the monitoring service returns.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Tag key carrying the alert role
pub const ROLE_TAG: &str = "role";

/// One mapping of variable names to replacement values
pub type BindingSet = BTreeMap<String, String>;

/// Role of an alert instance within the alerts this tool owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// Top-level alert, visible in listings
    #[default]
    Principal,
    /// One condition of a composite alert
    SubAlert,
}

impl Role {
    /// Tag value used for this role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Principal => "principal",
            Role::SubAlert => "sub-alert",
        }
    }

    /// Read the role from wire-form tags.
    ///
    /// Alerts without a role tag, or with a value this version does not know,
    /// predate role tagging and count as principals.
    pub fn of_tags(tags: &[String]) -> Role {
        let sub_alert = format!("{}:{}", ROLE_TAG, Role::SubAlert.as_str());
        if tags.iter().any(|tag| *tag == sub_alert) {
            Role::SubAlert
        } else {
            Role::Principal
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of `key:value` tags, at most one value per key
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Tags(BTreeMap<String, String>);

/// Conjunctive tag filter: an alert matches when it carries every pair
pub type TagFilter = Tags;

impl Tags {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Set a tag, replacing any previous value for the key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay `other` onto these tags; `other` wins on key collision
    pub fn extend(&mut self, other: &Tags) {
        for (key, value) in other.iter() {
            self.insert(key, value);
        }
    }

    /// Parse wire-form tags, splitting each on its first `:`.
    ///
    /// Tags without a value map to an empty string.
    pub fn parse(tags: &[String]) -> Self {
        tags.iter()
            .map(|tag| match tag.split_once(':') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (tag.clone(), String::new()),
            })
            .collect()
    }

    /// Parse a single `key:value` pair as given on the command line
    pub fn parse_pair(pair: &str) -> Option<(String, String)> {
        let (key, value) = pair.split_once(':')?;
        if key.is_empty() {
            return None;
        }
        Some((key.to_string(), value.to_string()))
    }

    /// Wire form: one `key:value` string per tag, ordered by key
    pub fn to_wire(&self) -> Vec<String> {
        self.0.iter().map(|(k, v)| format!("{}:{}", k, v)).collect()
    }

    /// True when every pair of `self` appears in `tags`
    pub fn is_subset_of(&self, tags: &Tags) -> bool {
        self.iter().all(|(key, value)| tags.get(key) == Some(value))
    }

    /// True when every pair of `self` appears in the wire-form `tags`
    pub fn matches_wire(&self, tags: &[String]) -> bool {
        self.to_wire().iter().all(|tag| tags.contains(tag))
    }
}

impl FromIterator<(String, String)> for Tags {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<String>> for Tags {
    fn from(tags: Vec<String>) -> Self {
        Tags::parse(&tags)
    }
}

impl From<Tags> for Vec<String> {
    fn from(tags: Tags) -> Self {
        tags.to_wire()
    }
}

/// Alert query as authored or as returned by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Query {
    /// Plain query string, possibly several conditions joined by `&&`
    Text(String),
    /// List of alternatives; reserved for OR-joined composites and not decomposable
    AnyOf(Vec<String>),
}

impl Default for Query {
    fn default() -> Self {
        Query::Text(String::new())
    }
}

impl Query {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Query::Text(text) => Some(text),
            Query::AnyOf(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Query::Text(text) => text.trim().is_empty(),
            Query::AnyOf(items) => items.is_empty(),
        }
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::Text(text.to_string())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Text(text) => f.write_str(text),
            Query::AnyOf(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

/// Identifier assigned by the monitoring service.
///
/// The service hands out numeric ids; dry-run synthesizes hexadecimal ones.
/// Both are kept as text and numeric ids go back on the wire as numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlertId(String);

impl AlertId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for AlertId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for AlertId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Serialize for AlertId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.parse::<u64>() {
            Ok(number) => serializer.serialize_u64(number),
            Err(_) => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for AlertId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(u64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(number) => AlertId::from(number),
            RawId::Text(text) => AlertId(text),
        })
    }
}

/// Alert definition as authored in a team's alert file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTemplate {
    pub name: String,
    pub query: Query,
    #[serde(rename = "type")]
    pub alert_type: String,
    #[serde(default)]
    pub message: String,
    /// Notification handles, rendered as `@handle` at the end of the message
    #[serde(default)]
    pub notify: Vec<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_variables: Option<Vec<BindingSet>>,
    /// Owning team, taken from the file header rather than the alert entry
    #[serde(skip)]
    pub team: String,
}

/// A fully expanded alert, free of placeholders, ready to send to the service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertInstance {
    pub name: String,
    pub query: Query,
    #[serde(rename = "type")]
    pub alert_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub tags: Tags,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
    #[serde(skip)]
    pub role: Role,
}

impl AlertInstance {
    /// Value of the `team` identity tag
    pub fn team(&self) -> Option<&str> {
        self.tags.get("team")
    }
}

/// Alert as known to the monitoring service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAlert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AlertId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub query: Query,
    #[serde(rename = "type", default)]
    pub alert_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
    /// Everything else the service attaches (state, timestamps, creator...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RemoteAlert {
    /// Build the remote view of an instance, as the service would store it
    pub fn from_instance(instance: &AlertInstance, id: Option<AlertId>) -> Self {
        Self {
            id,
            name: instance.name.clone(),
            query: instance.query.clone(),
            alert_type: instance.alert_type.clone(),
            message: instance.message.clone(),
            tags: instance.tags.to_wire(),
            options: instance.options.clone(),
            extra: Map::new(),
        }
    }

    pub fn role(&self) -> Role {
        Role::of_tags(&self.tags)
    }

    pub fn is_principal(&self) -> bool {
        self.role() == Role::Principal
    }

    /// Overall state reported by the service, when present
    pub fn state(&self) -> Option<&str> {
        self.extra.get("overall_state").and_then(Value::as_str)
    }
}

/// One row of an alert listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSummary {
    pub name: String,
    pub state: Option<String>,
    pub tags: Vec<String>,
}

impl From<&RemoteAlert> for AlertSummary {
    fn from(alert: &RemoteAlert) -> Self {
        Self {
            name: alert.name.clone(),
            state: alert.state().map(str::to_string),
            tags: alert.tags.clone(),
        }
    }
}
