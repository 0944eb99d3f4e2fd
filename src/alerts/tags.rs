//! Identity tags stamped on every alert this tool manages

use crate::model::{Role, Tags, ROLE_TAG};

/// Value of the `source` tag identifying alerts owned by this tool
pub const SOURCE: &str = "kennel";

/// Release of this tool, recorded in the `tool-version` tag
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the tag set for an alert instance.
///
/// `extra` is overlaid with the four identity keys (`source`, `team`,
/// `tool-version`, `role`); identity keys always win.
pub fn build(role: Role, team: &str, extra: &Tags) -> Tags {
    let mut tags = extra.clone();
    tags.insert("source", SOURCE);
    tags.insert("team", team);
    tags.insert("tool-version", TOOL_VERSION);
    tags.insert(ROLE_TAG, role.as_str());
    tags
}

/// Tags every alert of `team` carries, used to scope remote listings
pub fn system_filter(team: &str) -> Tags {
    let mut tags = Tags::new();
    tags.insert("source", SOURCE);
    tags.insert("team", team);
    tags
}
