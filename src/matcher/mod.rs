//! Pairs live cluster objects with rendered targets.
//!
//! Produces the complete set of [`ManagedResourceTriple`]s for one
//! application: every live object paired with its target (if any), plus
//! every target that has no live counterpart. Core-group `Secret`s are
//! discarded from both sides, and targets flagged as hooks or excluded by
//! compare options never produce an added triple.

pub mod dedup;

use std::collections::BTreeMap;

use tracing::debug;

use crate::models::resource::{self, Document, ManagedResourceTriple, ResourceKey};

pub use dedup::{DedupPolicy, LastDefinitionWins, NamespaceScope};

/// Match targets against live objects with the default dedup policy.
pub fn match_resources(
    targets: Vec<Document>,
    live: Vec<Document>,
    default_namespace: &str,
) -> Vec<ManagedResourceTriple> {
    match_resources_with(targets, live, default_namespace, &LastDefinitionWins)
}

/// Match targets against live objects.
///
/// Triples are returned sorted by key so rendered diffs come out in a
/// stable order.
pub fn match_resources_with(
    targets: Vec<Document>,
    live: Vec<Document>,
    default_namespace: &str,
    policy: &dyn DedupPolicy,
) -> Vec<ManagedResourceTriple> {
    let scope = NamespaceScope::from_live(&live);

    // Excluded targets never produce an "added" triple. They are kept
    // aside so a live counterpart is still paired with them, which lets
    // the diff engine skip the mixed pair instead of reporting a removal.
    let (mut excluded, mut pending): (BTreeMap<_, _>, BTreeMap<_, _>) = policy
        .deduplicate(targets, &scope, default_namespace)
        .into_iter()
        .partition(|(_, doc)| resource::is_hook(doc) || resource::is_ignored_extraneous(doc));
    for key in excluded.keys() {
        debug!(resource = %key, "target excluded from diff (hook or ignored)");
    }

    let mut live_index: BTreeMap<ResourceKey, Document> = BTreeMap::new();
    for doc in live {
        match ResourceKey::from_document(&doc) {
            Some(key) => {
                live_index.insert(key, doc);
            }
            None => debug!("skipping live object without kind or name"),
        }
    }

    let mut triples = Vec::with_capacity(live_index.len() + pending.len());

    for (key, live_doc) in live_index {
        let target = pending.remove(&key).or_else(|| excluded.remove(&key));
        if key.is_core_secret() {
            continue;
        }
        triples.push(ManagedResourceTriple {
            key,
            live: Some(live_doc),
            target,
        });
    }

    for (key, target_doc) in pending {
        if key.is_core_secret() {
            continue;
        }
        triples.push(ManagedResourceTriple {
            key,
            live: None,
            target: Some(target_doc),
        });
    }

    triples.sort_by(|a, b| a.key.cmp(&b.key));
    triples
}
