//! Diff verdicts, per-application counts, and the diff policy handed to
//! the structural differ.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Result of comparing one live/target pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffVerdict {
    /// Whether applying the target would change the live object.
    pub modified: bool,
    /// Serialized JSON of what the live object would look like after the
    /// target is applied.
    pub predicted_live: Vec<u8>,
}

/// Added/modified/removed tallies for one application's diff run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
}

impl ReportCounts {
    pub fn total(&self) -> usize {
        self.added + self.modified + self.removed
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl fmt::Display for ReportCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} modified, {} removed",
            self.added, self.modified, self.removed
        )
    }
}

/// How the owning application of a live object is identified.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TrackingMethod {
    #[default]
    Label,
    Annotation,
    AnnotationAndLabel,
}

/// A rule telling the differ to disregard part of a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreDifference {
    pub group: String,
    pub kind: String,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub json_pointers: Vec<String>,
    pub jq_path_expressions: Vec<String>,
    pub managed_fields_managers: Vec<String>,
}

/// Per-resource-kind customisation, keyed by `group/kind` in
/// [`DiffPolicy::resource_overrides`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceOverride {
    pub ignore_differences: Option<String>,
    pub known_type_fields: Vec<String>,
}

/// Everything the structural differ needs besides the two documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffPolicy {
    pub ignore_differences: Vec<IgnoreDifference>,
    pub resource_overrides: BTreeMap<String, ResourceOverride>,
    pub tracking_method: TrackingMethod,
    pub no_cache: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_summary_text() {
        let counts = ReportCounts { added: 1, modified: 2, removed: 0 };
        assert_eq!(counts.to_string(), "1 added, 2 modified, 0 removed");
        assert_eq!(counts.total(), 3);
        assert!(!counts.is_empty());
        assert!(ReportCounts::default().is_empty());
    }

    #[test]
    fn policy_parses_from_toml() {
        let policy: DiffPolicy = toml::from_str(
            r#"
tracking_method = "annotation-and-label"
no_cache = true

[[ignore_differences]]
group = "apps"
kind = "Deployment"
json_pointers = ["/spec/replicas"]

[resource_overrides."apps/Deployment"]
known_type_fields = ["spec.template"]
"#,
        )
        .unwrap();
        assert_eq!(policy.tracking_method, TrackingMethod::AnnotationAndLabel);
        assert!(policy.no_cache);
        assert_eq!(policy.ignore_differences[0].json_pointers, vec!["/spec/replicas"]);
        assert!(policy.resource_overrides.contains_key("apps/Deployment"));
    }
}
