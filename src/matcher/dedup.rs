//! Target deduplication and namespace normalisation.
//!
//! Rendered manifests may declare the same logical resource more than once
//! across files, and frequently leave `metadata.namespace` empty for
//! namespaced objects that the application deploys into its default
//! namespace. Before matching, every target is normalised against the
//! scope information learned from the live objects, then collapsed so one
//! definition per [`ResourceKey`] survives.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::models::resource::{Document, ResourceKey};

/// Kinds that are cluster-scoped even when no live instance tells us so.
const WELL_KNOWN_CLUSTER_SCOPED: &[(&str, &str)] = &[
    ("", "Namespace"),
    ("", "Node"),
    ("", "PersistentVolume"),
    ("apiextensions.k8s.io", "CustomResourceDefinition"),
    ("apiregistration.k8s.io", "APIService"),
    ("rbac.authorization.k8s.io", "ClusterRole"),
    ("rbac.authorization.k8s.io", "ClusterRoleBinding"),
    ("storage.k8s.io", "StorageClass"),
    ("scheduling.k8s.io", "PriorityClass"),
    ("networking.k8s.io", "IngressClass"),
    ("admissionregistration.k8s.io", "ValidatingWebhookConfiguration"),
    ("admissionregistration.k8s.io", "MutatingWebhookConfiguration"),
];

/// (group, kind) → namespaced lookup built from live objects.
#[derive(Debug, Clone, Default)]
pub struct NamespaceScope {
    kinds: HashMap<(String, String), bool>,
}

impl NamespaceScope {
    /// Learn scope from live objects: a live object carrying a namespace
    /// marks its kind as namespaced, one without marks it cluster-scoped.
    pub fn from_live(live: &[Document]) -> Self {
        let mut kinds = HashMap::new();
        for doc in live {
            if let Some(key) = ResourceKey::from_document(doc) {
                kinds
                    .entry((key.group, key.kind))
                    .or_insert(!key.namespace.is_empty());
            }
        }
        Self { kinds }
    }

    /// Whether objects of this kind live in a namespace.
    ///
    /// Kinds with no live instance fall back to the well-known
    /// cluster-scoped list and are otherwise assumed namespaced.
    pub fn is_namespaced(&self, group: &str, kind: &str) -> bool {
        if let Some(namespaced) = self.kinds.get(&(group.to_string(), kind.to_string())) {
            return *namespaced;
        }
        !WELL_KNOWN_CLUSTER_SCOPED
            .iter()
            .any(|(g, k)| *g == group && *k == kind)
    }
}

/// Chooses the dominant definition when targets collide.
pub trait DedupPolicy: Send + Sync {
    /// Normalise and deduplicate rendered targets.
    ///
    /// The returned map holds exactly one document per key.
    fn deduplicate(
        &self,
        targets: Vec<Document>,
        scope: &NamespaceScope,
        default_namespace: &str,
    ) -> BTreeMap<ResourceKey, Document>;
}

/// The definition that appears last in render order wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastDefinitionWins;

impl DedupPolicy for LastDefinitionWins {
    fn deduplicate(
        &self,
        targets: Vec<Document>,
        scope: &NamespaceScope,
        default_namespace: &str,
    ) -> BTreeMap<ResourceKey, Document> {
        let mut out = BTreeMap::new();
        for mut doc in targets {
            let Some(mut key) = ResourceKey::from_document(&doc) else {
                debug!("skipping target without kind or name");
                continue;
            };

            if scope.is_namespaced(&key.group, &key.kind) {
                if key.namespace.is_empty() && !default_namespace.is_empty() {
                    set_namespace(&mut doc, Some(default_namespace));
                    key.namespace = default_namespace.to_string();
                }
            } else if !key.namespace.is_empty() {
                set_namespace(&mut doc, None);
                key.namespace.clear();
            }

            if out.insert(key.clone(), doc).is_some() {
                debug!(resource = %key, "duplicate target definition, keeping the later one");
            }
        }
        out
    }
}

/// Set or clear `metadata.namespace` in place.
fn set_namespace(doc: &mut Document, namespace: Option<&str>) {
    let Some(meta) = doc.get_mut("metadata").and_then(|m| m.as_object_mut()) else {
        return;
    };
    match namespace {
        Some(ns) => {
            meta.insert("namespace".into(), serde_json::Value::String(ns.to_string()));
        }
        None => {
            meta.remove("namespace");
        }
    }
}
