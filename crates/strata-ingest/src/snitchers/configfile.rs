//! `file_dict_<host>.json`: tracked configuration files keyed by path.

use std::path::Path;

use strata_graph::{Entity, GraphStore};

use super::declared;
use crate::error::Result;
use crate::run::SyncContext;

pub async fn snitch<S: GraphStore>(ctx: &SyncContext<'_, S>) -> Result<usize> {
    let model = ctx.model("Configfile")?;
    let mut count = 0;

    for (hostname, member) in ctx.run.host_files("file_dict") {
        let Some(host) = ctx.find_host(&hostname).await? else {
            continue;
        };
        let data = ctx.run.data(&member)?.unwrap_or_default();

        let mut files = Vec::new();
        for (path, meta) in data.as_object().into_iter().flatten() {
            let name = Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            files.push(
                declared(Entity::builder(model), model, meta)
                    .set("path", path.as_str())
                    .set("host", host.identity().clone())
                    .set("name", name)
                    .build()?,
            );
        }
        count += ctx.reconcile(&host, "configfiles", &files).await?;
    }

    Ok(count)
}
