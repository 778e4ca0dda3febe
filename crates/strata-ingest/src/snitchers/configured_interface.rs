//! `configuredinterface_<host>.json`: interfaces as configured on disk,
//! keyed by device.

use strata_graph::{Entity, GraphStore};

use super::declared;
use crate::error::Result;
use crate::run::SyncContext;

pub async fn snitch<S: GraphStore>(ctx: &SyncContext<'_, S>) -> Result<usize> {
    let model = ctx.model("ConfiguredInterface")?;
    let mut count = 0;

    for (hostname, member) in ctx.run.host_files("configuredinterface") {
        let Some(host) = ctx.find_host(&hostname).await? else {
            continue;
        };
        let data = ctx.run.data(&member)?.unwrap_or_default();
        let interfaces = data
            .as_object()
            .into_iter()
            .flatten()
            .map(|(device, settings)| {
                declared(Entity::builder(model), model, settings)
                    .set("device", device.as_str())
                    .set("host", host.identity().clone())
                    .build()
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        count += ctx.reconcile(&host, "configuredinterfaces", &interfaces).await?;
    }

    Ok(count)
}
