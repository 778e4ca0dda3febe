//! `kernelmodules_<host>.json`: loaded modules and their parameters.

use strata_graph::{Entity, GraphStore};

use crate::error::Result;
use crate::run::SyncContext;

pub async fn snitch<S: GraphStore>(ctx: &SyncContext<'_, S>) -> Result<usize> {
    let module_model = ctx.model("KernelModule")?;
    let param_model = ctx.model("KernelModuleParameter")?;
    let mut count = 0;

    for (hostname, member) in ctx.run.host_files("kernelmodules") {
        let Some(host) = ctx.find_host(&hostname).await? else {
            continue;
        };
        let data = ctx.run.data(&member)?.unwrap_or_default();

        let mut modules = Vec::new();
        let mut parameters = Vec::new();
        for (name, module) in data.as_object().into_iter().flatten() {
            modules.push(
                Entity::builder(module_model)
                    .set("name", name.as_str())
                    .set("host", host.identity().clone())
                    .build()?,
            );
            let params = module
                .get("parameters")
                .and_then(|p| p.as_object())
                .into_iter()
                .flatten()
                .map(|(param, value)| {
                    Entity::builder(param_model)
                        .set("name", param.as_str())
                        .set_json("value", Some(value))
                        .build()
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            parameters.push(params);
        }

        count += ctx.reconcile(&host, "kernelmodules", &modules).await?;
        for (module, params) in modules.iter().zip(&parameters) {
            count += ctx.reconcile(module, "parameters", params).await?;
        }
    }

    Ok(count)
}
