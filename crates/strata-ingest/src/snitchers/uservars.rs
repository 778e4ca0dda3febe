//! `uservars.json`: deployment variables supplied by the operator.

use strata_graph::{Entity, GraphStore};

use crate::error::Result;
use crate::run::SyncContext;

pub const DOCUMENT: &str = "uservars.json";

pub async fn snitch<S: GraphStore>(ctx: &SyncContext<'_, S>) -> Result<usize> {
    let Some(data) = ctx.run.data(DOCUMENT)? else {
        return Ok(0);
    };
    let model = ctx.model("Uservar")?;
    let vars = data
        .as_object()
        .into_iter()
        .flatten()
        .map(|(name, value)| {
            Entity::builder(model)
                .set("name", name.as_str())
                .set("environment", ctx.uuid())
                .set_json("value", Some(value))
                .build()
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ctx.reconcile(ctx.environment(), "uservars", &vars).await?)
}
