//! Minimal built-in structural differ.
//!
//! Predicts the post-apply live object by overlaying the target onto the
//! live object: maps merge recursively, every other value is replaced.
//! Fields the API server owns are ignored when deciding whether anything
//! changed. Ignore rules and resource overrides in the policy are not
//! evaluated here; plug in a full [`StructuralDiffer`] for that.

use async_trait::async_trait;
use serde_json::Value;

use super::{DiffError, StructuralDiffer};
use crate::models::report::{DiffPolicy, DiffVerdict};
use crate::models::resource::Document;

/// Metadata fields populated by the API server.
const SERVER_METADATA_FIELDS: &[&str] = &[
    "managedFields",
    "resourceVersion",
    "uid",
    "generation",
    "creationTimestamp",
    "selfLink",
];

/// Annotation `kubectl apply` stores the previous configuration in.
const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Overlay-based differ used when no other capability is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayDiffer;

#[async_trait]
impl StructuralDiffer for OverlayDiffer {
    async fn diff(
        &self,
        live: Option<&Document>,
        target: Option<&Document>,
        _policy: &DiffPolicy,
    ) -> Result<DiffVerdict, DiffError> {
        let (modified, predicted) = match (live, target) {
            (None, None) => (false, Value::Null),
            (Some(_), None) => (true, Value::Null),
            (None, Some(target)) => (true, strip_server_fields(target)),
            (Some(live), Some(target)) => {
                let mut predicted = live.clone();
                overlay(&mut predicted, &strip_server_fields(target));
                let modified = strip_server_fields(&predicted) != strip_server_fields(live);
                (modified, predicted)
            }
        };

        Ok(DiffVerdict {
            modified,
            predicted_live: serde_json::to_vec(&predicted)?,
        })
    }
}

/// Recursively merge `patch` into `base`.
pub fn overlay(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(key) {
                    Some(existing) => overlay(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

/// Copy of `doc` without `status` and server-owned metadata.
pub fn strip_server_fields(doc: &Document) -> Document {
    let mut doc = doc.clone();
    let Some(obj) = doc.as_object_mut() else {
        return doc;
    };
    obj.remove("status");
    if let Some(meta) = obj.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in SERVER_METADATA_FIELDS {
            meta.remove(*field);
        }
        let drop_annotations = match meta.get_mut("annotations").and_then(Value::as_object_mut) {
            Some(annotations) => {
                annotations.remove(LAST_APPLIED_ANNOTATION);
                annotations.is_empty()
            }
            None => false,
        };
        if drop_annotations {
            meta.remove("annotations");
        }
    }
    doc
}
