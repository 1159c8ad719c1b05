//! Canonical text rendering and unified diffs for resource blocks.

use similar::TextDiff;

use crate::models::resource::{Document, ResourceKey};

/// Lines of unchanged context around each change.
pub const CONTEXT_LINES: usize = 2;

/// Serialize a document to canonical YAML.
///
/// Object keys come out sorted, so two semantically equal documents always
/// render identically. An absent (or null) document renders as an empty
/// string.
pub fn canonical_yaml(doc: Option<&Document>) -> String {
    match doc {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(value) => serde_yaml_ng::to_string(value).unwrap_or_else(|_| {
            serde_json::to_string_pretty(value).unwrap_or_default() + "\n"
        }),
    }
}

/// Unified diff between two texts, without file-name headers.
pub fn unified_diff(old: &str, new: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .to_string()
}

/// Header line that opens a resource's diff block.
pub fn block_header(key: &ResourceKey) -> String {
    format!("===== {key} ======")
}

/// Render one resource's diff block: header line followed by the unified
/// diff of the two sides.
pub fn render_block(key: &ResourceKey, old: Option<&Document>, new: Option<&Document>) -> String {
    let diff = unified_diff(&canonical_yaml(old), &canonical_yaml(new));
    let mut block = block_header(key);
    block.push('\n');
    block.push_str(&diff);
    if !block.ends_with('\n') {
        block.push('\n');
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn canonical_yaml_sorts_keys() {
        let a = json!({"b": 1, "a": {"d": 2, "c": 3}});
        assert_eq!(canonical_yaml(Some(&a)), "a:\n  c: 3\n  d: 2\nb: 1\n");
    }

    #[test]
    fn canonical_yaml_of_absent_is_empty() {
        assert_eq!(canonical_yaml(None), "");
        assert_eq!(canonical_yaml(Some(&serde_json::Value::Null)), "");
    }

    #[test]
    fn unified_diff_uses_two_lines_of_context() {
        let old = "a\nb\nc\nd\ne\nf\ng\n";
        let new = "a\nb\nc\nD\ne\nf\ng\n";
        let diff = unified_diff(old, new);
        assert_eq!(diff, "@@ -2,5 +2,5 @@\n b\n c\n-d\n+D\n e\n f\n");
    }

    #[test]
    fn unified_diff_has_no_file_headers() {
        let diff = unified_diff("x\n", "y\n");
        assert!(!diff.contains("---"));
        assert!(!diff.contains("+++"));
    }

    #[test]
    fn block_starts_with_resource_header() {
        let key = ResourceKey::new("apps", "Deployment", "ns", "foo");
        let block = render_block(&key, None, Some(&json!({"kind": "Deployment"})));
        assert!(block.starts_with("===== apps/Deployment ns/foo ======\n"));
        assert!(block.contains("+kind: Deployment"));
    }
}
