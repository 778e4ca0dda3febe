//! `dpkg_list_<host>.json`: installed Debian packages.

use strata_graph::{Entity, GraphStore};

use crate::error::Result;
use crate::run::SyncContext;

pub async fn snitch<S: GraphStore>(ctx: &SyncContext<'_, S>) -> Result<usize> {
    let model = ctx.model("AptPackage")?;
    let mut count = 0;

    for (hostname, member) in ctx.run.host_files("dpkg_list") {
        let Some(host) = ctx.find_host(&hostname).await? else {
            continue;
        };
        let data = ctx.run.data(&member)?.unwrap_or_default();
        let packages = data
            .as_array()
            .into_iter()
            .flatten()
            .map(|pkg| {
                Entity::builder(model)
                    .set_json("name", pkg.get("name"))
                    .set_json("version", pkg.get("version"))
                    .build()
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        count += ctx.reconcile(&host, "aptpackages", &packages).await?;
    }

    Ok(count)
}
