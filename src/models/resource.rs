//! Kubernetes resource identity and live/target pairing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A structured Kubernetes manifest (live or rendered).
pub type Document = serde_json::Value;

/// Argo CD hook annotation.
const ARGO_HOOK_ANNOTATION: &str = "argocd.argoproj.io/hook";

/// Helm hook annotation.
const HELM_HOOK_ANNOTATION: &str = "helm.sh/hook";

/// Annotation carrying comparison options for a resource.
const COMPARE_OPTIONS_ANNOTATION: &str = "argocd.argoproj.io/compare-options";

/// Uniquely identifies a managed resource within an application scope.
///
/// Ordering is (group, kind, namespace, name), which is also the order
/// diff blocks appear in a report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(
        group: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Derive the key from a manifest.
    ///
    /// Returns `None` when the document has no `kind` or `metadata.name`.
    pub fn from_document(doc: &Document) -> Option<Self> {
        let kind = doc.get("kind")?.as_str()?;
        let name = metadata_str(doc, "name")?;
        if kind.is_empty() || name.is_empty() {
            return None;
        }
        let api_version = doc.get("apiVersion").and_then(|v| v.as_str()).unwrap_or("");
        Some(Self::new(
            group_of(api_version),
            kind,
            metadata_str(doc, "namespace").unwrap_or(""),
            name,
        ))
    }

    /// Core-group `Secret`s are never diffed: their data is not available
    /// to the diff engine.
    pub fn is_core_secret(&self) -> bool {
        self.group.is_empty() && self.kind == "Secret"
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}/{}", self.group, self.kind, self.namespace, self.name)
    }
}

/// A matched (key, live, target) record under diff.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedResourceTriple {
    pub key: ResourceKey,
    pub live: Option<Document>,
    pub target: Option<Document>,
}

/// Extract the API group from an `apiVersion` (`apps/v1` → `apps`, `v1` → ``).
pub fn group_of(api_version: &str) -> &str {
    match api_version.split_once('/') {
        Some((group, _)) => group,
        None => "",
    }
}

/// Read a string field from `metadata`.
pub fn metadata_str<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    doc.get("metadata")?.get(field)?.as_str()
}

/// Read an annotation value.
pub fn annotation<'a>(doc: &'a Document, name: &str) -> Option<&'a str> {
    doc.get("metadata")?.get("annotations")?.get(name)?.as_str()
}

/// Whether the object runs as a lifecycle hook rather than a steady-state
/// resource.
///
/// Helm's legacy `crd-install` hook installs ordinary CRDs and does not
/// count.
pub fn is_hook(doc: &Document) -> bool {
    if annotation(doc, ARGO_HOOK_ANNOTATION).is_some_and(|v| !v.trim().is_empty()) {
        return true;
    }
    match annotation(doc, HELM_HOOK_ANNOTATION) {
        Some(hooks) => hooks
            .split(',')
            .map(str::trim)
            .any(|h| !h.is_empty() && h != "crd-install"),
        None => false,
    }
}

/// Whether compare options mark the object as excluded from diffing.
pub fn is_ignored_extraneous(doc: &Document) -> bool {
    annotation(doc, COMPARE_OPTIONS_ANNOTATION)
        .is_some_and(|opts| opts.split(',').any(|o| o.trim() == "IgnoreExtraneous"))
}
