//! Bulk removal of everything one environment owns.

use std::collections::BTreeMap;

use strata_core::Registry;

use crate::client::GraphError;
use crate::query::{DeleteBatch, DeleteTarget};
use crate::store::GraphStore;

/// Deleted node counts by label. `None` marks shared labels that were left
/// in place.
pub type RemovalStats = BTreeMap<String, Option<u64>>;

async fn delete_until_zero<S: GraphStore>(
    store: &S,
    target: DeleteTarget,
    uuid: &str,
    batch: usize,
) -> Result<u64, GraphError> {
    let query = DeleteBatch {
        target,
        uuid: uuid.to_string(),
        limit: batch.max(1),
    };
    let mut total = 0;
    loop {
        let deleted = store.delete_batch(&query).await?;
        if deleted == 0 {
            return Ok(total);
        }
        total += deleted;
    }
}

/// Delete the environment `uuid` and every non-shared node under it.
///
/// Labels are pruned deepest first so that each batch only detaches from
/// nodes that are about to go anyway.
pub async fn remove_environment<S: GraphStore>(
    store: &S,
    registry: &Registry,
    uuid: &str,
    batch: usize,
) -> Result<RemovalStats, GraphError> {
    let mut paths: Vec<Vec<String>> = registry
        .labels()
        .map(|label| {
            let mut path: Vec<String> = registry.path(label).into_iter().map(|(l, _)| l).collect();
            path.push(label.to_string());
            path
        })
        .collect();
    paths.sort_by_key(Vec::len);

    let mut stats = RemovalStats::new();
    for path in paths.iter().rev() {
        let Some(leaf) = path.last() else { continue };
        if registry.is_shared(leaf) {
            stats.insert(leaf.clone(), None);
            continue;
        }
        let model = registry.model(leaf)?;
        let is_environment = leaf == "Environment";

        if model.has_state() {
            let state_label = model.state_label().to_string();
            let target = if is_environment {
                DeleteTarget::EnvironmentState(state_label.clone())
            } else {
                DeleteTarget::StateOf {
                    label: leaf.clone(),
                    state_label: state_label.clone(),
                }
            };
            let deleted = delete_until_zero(store, target, uuid, batch).await?;
            stats.insert(state_label, Some(deleted));
        }

        let target = if is_environment {
            DeleteTarget::Environment
        } else {
            DeleteTarget::Nodes(leaf.clone())
        };
        let deleted = delete_until_zero(store, target, uuid, batch).await?;
        stats.insert(leaf.clone(), Some(deleted));
    }

    tracing::info!(%uuid, ?stats, "Deleted node counts by type");
    Ok(stats)
}
