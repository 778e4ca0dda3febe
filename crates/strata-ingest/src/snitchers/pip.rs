//! `pip_list_<host>.json`: virtualenvs and the python packages in each.

use strata_graph::{Entity, GraphStore};

use crate::error::Result;
use crate::run::SyncContext;

pub async fn snitch<S: GraphStore>(ctx: &SyncContext<'_, S>) -> Result<usize> {
    let venv_model = ctx.model("Virtualenv")?;
    let pkg_model = ctx.model("PythonPackage")?;
    let mut count = 0;

    for (hostname, member) in ctx.run.host_files("pip_list") {
        let Some(host) = ctx.find_host(&hostname).await? else {
            continue;
        };
        let data = ctx.run.data(&member)?.unwrap_or_default();
        let Some(venvs) = data.as_object() else {
            ctx.reconcile(&host, "virtualenvs", &[]).await?;
            continue;
        };

        let mut virtualenvs = Vec::with_capacity(venvs.len());
        let mut packages = Vec::with_capacity(venvs.len());
        for (path, pkgs) in venvs {
            virtualenvs.push(
                Entity::builder(venv_model)
                    .set("path", path.as_str())
                    .set("host", host.identity().clone())
                    .build()?,
            );
            packages.push(
                pkgs.as_array()
                    .into_iter()
                    .flatten()
                    .map(|pkg| {
                        Entity::builder(pkg_model)
                            .set_json("name", pkg.get("name"))
                            .set_json("version", pkg.get("version"))
                            .build()
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            );
        }

        count += ctx.reconcile(&host, "virtualenvs", &virtualenvs).await?;
        for (venv, pkgs) in virtualenvs.iter().zip(&packages) {
            count += ctx.reconcile(venv, "pythonpackages", pkgs).await?;
        }
    }

    Ok(count)
}
