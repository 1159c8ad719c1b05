//! Diff engine: classifies matched resources and renders unified diffs.
//!
//! For every [`ManagedResourceTriple`] the engine asks the
//! [`StructuralDiffer`] for a verdict, classifies the pair as added,
//! modified, removed or unchanged, and renders a diff block for anything
//! that changes. Added resources that turn out to be Argo CD
//! `Application`s are surfaced so the caller can check them too.

pub mod overlay;
pub mod render;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::constants::NO_CHANGES;
use crate::models::report::{DiffPolicy, DiffVerdict, ReportCounts};
use crate::models::resource::{self, Document, ManagedResourceTriple, ResourceKey};

pub use overlay::OverlayDiffer;

/// Errors from the diff engine.
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("structural diff failed for {key}: {message}")]
    Differ { key: String, message: String },

    #[error("failed to encode predicted document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Capability that decides whether applying a target changes a live object.
///
/// Implementations own all normalisation (ignore rules, resource
/// overrides, server-side defaults); the engine only consumes the verdict.
#[async_trait]
pub trait StructuralDiffer: Send + Sync {
    async fn diff(
        &self,
        live: Option<&Document>,
        target: Option<&Document>,
        policy: &DiffPolicy,
    ) -> Result<DiffVerdict, DiffError>;
}

/// How a single resource changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// A resource that changes, with its rendered diff block.
#[derive(Debug, Clone)]
pub struct ResourceChange {
    pub key: ResourceKey,
    pub kind: ChangeKind,
    pub text: String,
    /// Set when an added resource is itself an application definition.
    pub child_app: Option<ChildApplication>,
}

/// An Argo CD `Application` found among the added resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildApplication {
    pub name: String,
    pub namespace: String,
    pub destination_namespace: String,
    pub repo_url: Option<String>,
    pub path: Option<String>,
    pub target_revision: Option<String>,
}

/// Everything the engine produced for one application.
#[derive(Debug, Clone, Default)]
pub struct DiffReport {
    pub counts: ReportCounts,
    /// Concatenated diff blocks, or `No changes`.
    pub diff_text: String,
    /// `N added, M modified, K removed`.
    pub summary: String,
    pub child_apps: Vec<ChildApplication>,
}

/// Runs the structural differ over matched triples.
pub struct DiffEngine {
    differ: Arc<dyn StructuralDiffer>,
    policy: DiffPolicy,
}

impl DiffEngine {
    pub fn new(differ: Arc<dyn StructuralDiffer>, policy: DiffPolicy) -> Self {
        Self { differ, policy }
    }

    pub fn policy(&self) -> &DiffPolicy {
        &self.policy
    }

    /// Classify a single triple.
    ///
    /// Returns `None` for unchanged resources and for any pair where either
    /// side is a hook.
    pub async fn diff_triple(
        &self,
        triple: &ManagedResourceTriple,
    ) -> Result<Option<ResourceChange>, DiffError> {
        let live = triple.live.as_ref();
        let target = triple.target.as_ref();

        if live.is_some_and(resource::is_hook) || target.is_some_and(resource::is_hook) {
            debug!(resource = %triple.key, "skipping hook resource");
            return Ok(None);
        }

        let verdict = self.differ.diff(live, target, &self.policy).await?;

        let change = match (live, target) {
            (None, None) => None,
            (Some(live), None) => Some(ResourceChange {
                key: triple.key.clone(),
                kind: ChangeKind::Removed,
                text: render::render_block(&triple.key, Some(live), None),
                child_app: None,
            }),
            (None, Some(target)) => {
                let predicted = decode_predicted(&verdict.predicted_live);
                let child_app = predicted
                    .as_ref()
                    .and_then(as_child_application)
                    .or_else(|| as_child_application(target));
                Some(ResourceChange {
                    key: triple.key.clone(),
                    kind: ChangeKind::Added,
                    text: render::render_block(&triple.key, None, Some(target)),
                    child_app,
                })
            }
            (Some(live), Some(target)) if verdict.modified => {
                // Render against the predicted object so server-defaulted
                // fields the target omits don't show up as removals.
                let predicted = decode_predicted(&verdict.predicted_live);
                let new_side = predicted.as_ref().unwrap_or(target);
                Some(ResourceChange {
                    key: triple.key.clone(),
                    kind: ChangeKind::Modified,
                    text: render::render_block(&triple.key, Some(live), Some(new_side)),
                    child_app: None,
                })
            }
            (Some(_), Some(_)) => None,
        };

        Ok(change)
    }

    /// Diff every triple of an application and aggregate the results.
    pub async fn diff_application(
        &self,
        triples: &[ManagedResourceTriple],
    ) -> Result<DiffReport, DiffError> {
        let mut report = DiffReport::default();
        let mut text = String::new();

        for triple in triples {
            let Some(change) = self.diff_triple(triple).await? else {
                continue;
            };
            match change.kind {
                ChangeKind::Added => report.counts.added += 1,
                ChangeKind::Modified => report.counts.modified += 1,
                ChangeKind::Removed => report.counts.removed += 1,
            }
            if let Some(child) = change.child_app {
                report.child_apps.push(child);
            }
            text.push_str(&change.text);
        }

        report.diff_text = if report.counts.is_empty() {
            NO_CHANGES.to_string()
        } else {
            text
        };
        report.summary = report.counts.to_string();
        Ok(report)
    }
}

/// Decode the differ's predicted document; an empty or null payload (or
/// garbage) yields `None`.
fn decode_predicted(bytes: &[u8]) -> Option<Document> {
    match serde_json::from_slice::<Document>(bytes) {
        Ok(Document::Null) | Err(_) => None,
        Ok(doc) => Some(doc),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationManifest {
    api_version: String,
    kind: String,
    metadata: ApplicationMetadata,
    spec: ApplicationSpec,
}

#[derive(Deserialize)]
struct ApplicationMetadata {
    name: String,
    #[serde(default)]
    namespace: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationSpec {
    #[serde(default)]
    destination: ApplicationDestination,
    source: Option<ApplicationSource>,
}

#[derive(Deserialize, Default)]
struct ApplicationDestination {
    #[serde(default)]
    namespace: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationSource {
    #[serde(rename = "repoURL")]
    repo_url: Option<String>,
    path: Option<String>,
    target_revision: Option<String>,
}

/// Interpret a document as an Argo CD `Application`.
///
/// Anything that does not deserialize as one is simply not an
/// application.
pub fn as_child_application(doc: &Document) -> Option<ChildApplication> {
    let app: ApplicationManifest = serde_json::from_value(doc.clone()).ok()?;
    if resource::group_of(&app.api_version) != "argoproj.io" || app.kind != "Application" {
        return None;
    }
    let source = app.spec.source;
    Some(ChildApplication {
        name: app.metadata.name,
        namespace: app.metadata.namespace,
        destination_namespace: app.spec.destination.namespace,
        repo_url: source.as_ref().and_then(|s| s.repo_url.clone()),
        path: source.as_ref().and_then(|s| s.path.clone()),
        target_revision: source.and_then(|s| s.target_revision),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::match_resources;
    use serde_json::json;

    /// Differ that returns a fixed verdict for every pair.
    struct FixedDiffer {
        modified: bool,
    }

    #[async_trait]
    impl StructuralDiffer for FixedDiffer {
        async fn diff(
            &self,
            _live: Option<&Document>,
            target: Option<&Document>,
            _policy: &DiffPolicy,
        ) -> Result<DiffVerdict, DiffError> {
            Ok(DiffVerdict {
                modified: self.modified,
                predicted_live: serde_json::to_vec(&target.cloned().unwrap_or(Document::Null))?,
            })
        }
    }

    fn engine(differ: impl StructuralDiffer + 'static) -> DiffEngine {
        DiffEngine::new(Arc::new(differ), DiffPolicy::default())
    }

    fn deployment(name: &str, image: &str) -> Document {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": name, "namespace": "ns"},
            "spec": {"template": {"spec": {"containers": [{"name": "app", "image": image}]}}}
        })
    }

    fn triple(live: Option<Document>, target: Option<Document>) -> ManagedResourceTriple {
        let key = ResourceKey::from_document(live.as_ref().or(target.as_ref()).unwrap()).unwrap();
        ManagedResourceTriple { key, live, target }
    }

    #[tokio::test]
    async fn end_to_end_modified_and_added() {
        let live = vec![deployment("foo", "app:1")];
        let targets = vec![deployment("foo", "app:2"), deployment("bar", "app:1")];
        let triples = match_resources(targets, live, "ns");

        let report = engine(OverlayDiffer).diff_application(&triples).await.unwrap();
        assert_eq!(report.counts, ReportCounts { added: 1, modified: 1, removed: 0 });
        assert_eq!(report.summary, "1 added, 1 modified, 0 removed");
        assert!(report.diff_text.contains("===== apps/Deployment ns/foo ======"));
        assert!(report.diff_text.contains("===== apps/Deployment ns/bar ======"));
        assert!(report
            .diff_text
            .lines()
            .any(|l| l.starts_with('-') && l.contains("image: app:1")));
        assert!(report
            .diff_text
            .lines()
            .any(|l| l.starts_with('+') && l.contains("image: app:2")));
    }

    #[tokio::test]
    async fn unchanged_pairs_emit_no_changes_marker() {
        let triples = vec![triple(Some(deployment("foo", "a")), Some(deployment("foo", "a")))];
        let report = engine(FixedDiffer { modified: false })
            .diff_application(&triples)
            .await
            .unwrap();
        assert!(report.counts.is_empty());
        assert_eq!(report.diff_text, NO_CHANGES);
        assert_eq!(report.summary, "0 added, 0 modified, 0 removed");
    }

    #[tokio::test]
    async fn counts_match_non_unchanged_triples() {
        let triples = vec![
            triple(Some(deployment("a", "1")), None),
            triple(None, Some(deployment("b", "1"))),
            triple(Some(deployment("c", "1")), Some(deployment("c", "2"))),
            triple(Some(deployment("d", "1")), Some(deployment("d", "2"))),
        ];
        let report = engine(FixedDiffer { modified: true })
            .diff_application(&triples)
            .await
            .unwrap();
        assert_eq!(report.counts, ReportCounts { added: 1, modified: 2, removed: 1 });
        let headers = report.diff_text.lines().filter(|l| l.starts_with("===== ")).count();
        assert_eq!(headers, report.counts.total());
    }

    #[tokio::test]
    async fn mixed_hook_triples_are_skipped() {
        let mut hook = deployment("migrate", "x");
        hook["metadata"]["annotations"] = json!({"argocd.argoproj.io/hook": "Sync"});

        let live_hook = triple(Some(hook.clone()), Some(deployment("migrate", "y")));
        let target_hook = triple(Some(deployment("migrate", "y")), Some(hook.clone()));
        let only_hook = triple(Some(hook), None);

        let engine = engine(FixedDiffer { modified: true });
        for t in [live_hook, target_hook, only_hook] {
            assert!(engine.diff_triple(&t).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn added_application_is_surfaced_as_child() {
        let app = json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "Application",
            "metadata": {"name": "child", "namespace": "argocd"},
            "spec": {
                "destination": {"namespace": "child-ns", "server": "https://kubernetes.default.svc"},
                "source": {"repoURL": "https://git.example.com/r.git", "path": "apps/child", "targetRevision": "HEAD"}
            }
        });
        let report = engine(OverlayDiffer)
            .diff_application(&[triple(None, Some(app))])
            .await
            .unwrap();
        assert_eq!(report.child_apps.len(), 1);
        let child = &report.child_apps[0];
        assert_eq!(child.name, "child");
        assert_eq!(child.destination_namespace, "child-ns");
        assert_eq!(child.path.as_deref(), Some("apps/child"));
    }

    #[test]
    fn malformed_application_is_not_an_application() {
        let bad = json!({"apiVersion": "argoproj.io/v1alpha1", "kind": "Application", "metadata": {}});
        assert!(as_child_application(&bad).is_none());
        let other = json!({
            "apiVersion": "apps/v1", "kind": "Application",
            "metadata": {"name": "x"}, "spec": {}
        });
        assert!(as_child_application(&other).is_none());
    }
}
