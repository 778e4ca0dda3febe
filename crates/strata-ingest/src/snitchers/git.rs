//! `gitrepos.json`: git checkouts used to deploy the environment.

use serde_json::Value;
use strata_graph::{Entity, GraphStore};

use super::declared;
use crate::error::Result;
use crate::run::SyncContext;

pub const DOCUMENT: &str = "gitrepos.json";

pub async fn snitch<S: GraphStore>(ctx: &SyncContext<'_, S>) -> Result<usize> {
    let Some(data) = ctx.run.data(DOCUMENT)? else {
        return Ok(0);
    };
    let repo_model = ctx.model("GitRepo")?;
    let file_model = ctx.model("GitUntrackedFile")?;
    let remote_model = ctx.model("GitRemote")?;
    let url_model = ctx.model("GitUrl")?;

    let docs: Vec<&Value> = data.as_array().into_iter().flatten().collect();
    let repos = docs
        .iter()
        .map(|doc| {
            declared(Entity::builder(repo_model), repo_model, doc)
                .set("environment", ctx.uuid())
                .build()
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut count = ctx.reconcile(ctx.environment(), "gitrepos", &repos).await?;

    for (repo, doc) in repos.iter().zip(docs) {
        let files = doc
            .get("untracked_files")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|path| Entity::builder(file_model).set_json("path", Some(path)).build())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        count += ctx.reconcile(repo, "untrackedfiles", &files).await?;

        let remote_docs: Vec<&Value> = doc
            .get("remotes")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .collect();
        let remotes = remote_docs
            .iter()
            .map(|r| {
                Entity::builder(remote_model)
                    .set_json("name", r.get("name"))
                    .set("repo", repo.identity().clone())
                    .build()
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        count += ctx.reconcile(repo, "remotes", &remotes).await?;

        for (remote, r) in remotes.iter().zip(remote_docs) {
            let urls = r
                .get("urls")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .map(|url| Entity::builder(url_model).set_json("url", Some(url)).build())
                .collect::<std::result::Result<Vec<_>, _>>()?;
            count += ctx.reconcile(remote, "urls", &urls).await?;
        }
    }

    Ok(count)
}
