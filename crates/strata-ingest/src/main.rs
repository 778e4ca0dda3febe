//! CLI entry point for syncing collection runs into the Strata graph.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use strata_core::catalog;
use strata_core::config::Settings;
use strata_graph::{GraphClient, GraphConfig};
use strata_ingest::{Run, SyncPipeline};

#[derive(Parser)]
#[command(name = "strata-sync")]
#[command(about = "Ingest collection runs into the Strata graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: strata).
    #[arg(short, long, default_value = "strata", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Sync one or more run archives, oldest first.
    Sync {
        /// Paths to run archives (.tar.gz).
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Base64 encoded 256 bit AES key (overrides sync.key).
        #[arg(long)]
        key: Option<String>,
    },
    /// Remove an environment and everything it owns.
    Remove {
        /// UUID of the environment.
        uuid: String,
        /// Skip interactive confirmation.
        #[arg(short, long)]
        skip: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    let graph = GraphClient::connect(&GraphConfig::from(settings.neo4j.clone())).await?;
    let registry = Arc::new(catalog::registry()?);
    let pipeline = SyncPipeline::new(graph, registry);

    match cli.command {
        Command::Sync { paths, key } => {
            let key = key.or(settings.sync.key.clone());
            sync(&pipeline, &paths, key.as_deref()).await
        }
        Command::Remove { uuid, skip } => {
            let uuid = Uuid::parse_str(&uuid)?.to_string();
            let env = pipeline.find_environment(&uuid).await?;
            let prompt = format!("Remove environment {} {} ({uuid})?", env.account_number, env.name);
            if !confirm(&prompt, skip)? {
                tracing::info!(%uuid, "Removal cancelled");
                return Ok(());
            }
            let stats = pipeline.remove(env, settings.sync.delete_batch).await?;
            println!("{}", serde_json::to_string(&stats)?);
            Ok(())
        }
    }
}

async fn sync(
    pipeline: &SyncPipeline<GraphClient>,
    paths: &[PathBuf],
    key: Option<&str>,
) -> anyhow::Result<()> {
    let start = std::time::Instant::now();
    let mut failed = 0;

    let mut runs = Vec::new();
    for path in paths {
        match Run::open(path, key) {
            Ok(run) => runs.push(run),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Could not open run");
                failed += 1;
            }
        }
    }
    runs.sort_by_key(|run| run.completed());

    for run in &runs {
        match pipeline.sync_run(run).await {
            Ok(report) => println!("{}", serde_json::to_string(&report)?),
            Err(e) => {
                tracing::error!(path = %run.path().display(), error = %e, "Could not sync");
                failed += 1;
            }
        }
    }

    tracing::info!(
        runs = paths.len(),
        failed,
        elapsed_secs = start.elapsed().as_secs_f64(),
        "Finished"
    );
    if failed > 0 {
        anyhow::bail!("{failed} of {} runs failed to sync", paths.len());
    }
    Ok(())
}

/// Ask until the answer is y or n. `skip` answers yes.
fn confirm(msg: &str, skip: bool) -> anyhow::Result<bool> {
    if skip {
        return Ok(true);
    }
    let stdin = std::io::stdin();
    let mut answer = String::new();
    loop {
        print!("{msg} (y/n) --> ");
        std::io::stdout().flush()?;
        answer.clear();
        if stdin.lock().read_line(&mut answer)? == 0 {
            return Ok(false);
        }
        match answer.trim().to_lowercase().as_str() {
            "y" => return Ok(true),
            "n" => return Ok(false),
            _ => continue,
        }
    }
}
