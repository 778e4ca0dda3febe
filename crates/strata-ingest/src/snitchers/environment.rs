use strata_graph::GraphStore;

use crate::error::Result;
use crate::run::SyncContext;

/// Record the environment itself: identity from the manifest, state from
/// the run's status and completion time.
pub async fn snitch<S: GraphStore>(ctx: &SyncContext<'_, S>) -> Result<usize> {
    let outcome = ctx.graph.update(ctx.environment(), ctx.time_ms).await?;
    tracing::debug!(uuid = %ctx.uuid(), ?outcome, "Environment updated");
    Ok(1)
}
