//! Manifest loading: live and rendered documents for an application.
//!
//! The [`ManifestSource`] trait is the seam between the diff pipeline and
//! wherever manifests come from (a cluster API, a GitOps controller, a
//! rendering step). [`FileManifestSource`] reads both sides from YAML or
//! JSON files on disk, which is how the CLI drives the pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::models::resource::Document;

/// Errors while loading manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml_ng::Error,
    },

    #[error("unknown application: {0}")]
    UnknownApp(String),
}

/// Where one application's manifests live on disk.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct AppManifests {
    pub name: String,
    /// File or directory holding the live objects.
    pub live: PathBuf,
    /// File or directory holding the rendered target objects.
    pub target: PathBuf,
    /// Namespace assigned to namespaced targets that omit one.
    #[serde(default)]
    pub namespace: String,
}

/// Supplies live and target documents per application.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Whether the source can supply this application at all.
    fn knows(&self, app: &str) -> bool;

    /// Default namespace for the application's namespaced targets.
    fn default_namespace(&self, app: &str) -> String;

    async fn live_documents(&self, app: &str) -> Result<Vec<Document>, ManifestError>;

    async fn target_documents(&self, app: &str) -> Result<Vec<Document>, ManifestError>;
}

/// Reads manifests from files and directories.
#[derive(Debug, Clone, Default)]
pub struct FileManifestSource {
    apps: BTreeMap<String, AppManifests>,
}

impl FileManifestSource {
    pub fn new(apps: impl IntoIterator<Item = AppManifests>) -> Self {
        Self {
            apps: apps.into_iter().map(|a| (a.name.clone(), a)).collect(),
        }
    }

    /// Register another application, replacing any with the same name.
    pub fn insert(&mut self, app: AppManifests) {
        self.apps.insert(app.name.clone(), app);
    }

    /// Application names in sorted order.
    pub fn app_names(&self) -> Vec<String> {
        self.apps.keys().cloned().collect()
    }

    fn app(&self, name: &str) -> Result<&AppManifests, ManifestError> {
        self.apps
            .get(name)
            .ok_or_else(|| ManifestError::UnknownApp(name.to_string()))
    }
}

#[async_trait]
impl ManifestSource for FileManifestSource {
    fn knows(&self, app: &str) -> bool {
        self.apps.contains_key(app)
    }

    fn default_namespace(&self, app: &str) -> String {
        self.apps
            .get(app)
            .map(|a| a.namespace.clone())
            .unwrap_or_default()
    }

    async fn live_documents(&self, app: &str) -> Result<Vec<Document>, ManifestError> {
        load_path(&self.app(app)?.live).await
    }

    async fn target_documents(&self, app: &str) -> Result<Vec<Document>, ManifestError> {
        load_path(&self.app(app)?.target).await
    }
}

/// Load every document from a file, or from all manifest files below a
/// directory (sorted by path so render order is deterministic).
pub async fn load_path(path: &Path) -> Result<Vec<Document>, ManifestError> {
    if !path.exists() {
        return Err(ManifestError::PathNotFound(path.to_path_buf()));
    }

    let files: Vec<PathBuf> = if path.is_dir() {
        let mut files: Vec<PathBuf> = WalkDir::new(path)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file() && is_manifest_file(e.path()))
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut docs = Vec::new();
    for file in files {
        let content = tokio::fs::read_to_string(&file)
            .await
            .map_err(|source| ManifestError::Read {
                path: file.clone(),
                source,
            })?;
        docs.extend(parse_documents(&content).map_err(|source| ManifestError::Parse {
            path: file.clone(),
            source,
        })?);
    }
    Ok(docs)
}

fn is_manifest_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml" | "json")
    )
}

/// Parse a multi-document YAML (or JSON) stream.
///
/// Empty documents are skipped and `kind: List` wrappers are flattened
/// into their items.
pub fn parse_documents(content: &str) -> Result<Vec<Document>, serde_yaml_ng::Error> {
    let mut docs = Vec::new();
    for de in serde_yaml_ng::Deserializer::from_str(content) {
        let doc = Document::deserialize(de)?;
        push_flattened(&mut docs, doc);
    }
    Ok(docs)
}

fn push_flattened(out: &mut Vec<Document>, doc: Document) {
    match doc {
        Document::Null => {}
        Document::Object(ref obj)
            if obj.get("kind").and_then(|k| k.as_str()) == Some("List")
                && obj.get("items").is_some_and(|i| i.is_array()) =>
        {
            if let Some(Document::Array(items)) = doc.get("items").cloned() {
                for item in items {
                    push_flattened(out, item);
                }
            }
        }
        other => out.push(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multi_document_stream() {
        let docs = parse_documents(
            "---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n---\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: b\n",
        )
        .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["metadata"]["name"], "b");
    }

    #[test]
    fn flattens_list_kind() {
        let docs = parse_documents(
            "apiVersion: v1\nkind: List\nitems:\n- kind: ConfigMap\n  metadata: {name: a}\n- kind: ConfigMap\n  metadata: {name: b}\n",
        )
        .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["kind"], "ConfigMap");
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(parse_documents("kind: [unterminated").is_err());
    }

    #[tokio::test]
    async fn loads_directory_recursively_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.yaml"), "kind: ConfigMap\nmetadata: {name: b}\n").unwrap();
        std::fs::write(dir.path().join("nested/a.yml"), "kind: ConfigMap\nmetadata: {name: a}\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "# not a manifest").unwrap();

        let docs = load_path(dir.path()).await.unwrap();
        let names: Vec<_> = docs.iter().map(|d| d["metadata"]["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn missing_path_is_reported() {
        let err = load_path(Path::new("/tmp/kubereport_no_such_dir")).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn file_source_serves_registered_apps() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("live.yaml");
        let target = dir.path().join("target.yaml");
        std::fs::write(&live, "kind: ConfigMap\nmetadata: {name: a}\n").unwrap();
        std::fs::write(&target, "").unwrap();

        let source = FileManifestSource::new([AppManifests {
            name: "demo".into(),
            live,
            target,
            namespace: "demo-ns".into(),
        }]);
        assert!(source.knows("demo"));
        assert_eq!(source.default_namespace("demo"), "demo-ns");
        assert_eq!(source.live_documents("demo").await.unwrap().len(), 1);
        assert!(source.target_documents("demo").await.unwrap().is_empty());
        assert!(matches!(
            source.live_documents("other").await,
            Err(ManifestError::UnknownApp(_))
        ));
    }
}
