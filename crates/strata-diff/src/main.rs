//! CLI entry point for the strata-diff engine.
//!
//! Prints a JSON document on stdout. Logs go to stderr.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use strata_core::config::Settings;
use strata_core::{catalog, now_ms};
use strata_diff::DiffEngine;
use strata_graph::{GraphClient, GraphConfig};

#[derive(Parser)]
#[command(name = "strata-diff")]
#[command(about = "Compare an environment graph at two points in time")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: strata).
    #[arg(short, long, default_value = "strata", global = true)]
    config: String,
}

#[derive(clap::Args)]
struct Target {
    /// Model label of the entity, e.g. Environment.
    #[arg(long)]
    model: String,
    /// Identity value of the entity.
    #[arg(long)]
    identity: String,
    /// Earlier instant, ms since the epoch.
    #[arg(long)]
    t1: i64,
    /// Later instant, ms since the epoch (default: now).
    #[arg(long)]
    t2: Option<i64>,
}

#[derive(Subcommand)]
enum Command {
    /// Diff the subtree rooted at an entity.
    Subtree(Target),
    /// Diff the properties of a single entity.
    Node(Target),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    let graph = GraphClient::connect(&GraphConfig::from(settings.neo4j.clone())).await?;
    let registry = Arc::new(catalog::registry()?);
    let engine = DiffEngine::new(graph, registry).with_page_size(settings.diff.page_size);

    match cli.command {
        Command::Subtree(target) => {
            let t2 = target.t2.unwrap_or_else(now_ms);
            let tree = engine
                .subtree(&target.model, target.identity.as_str(), target.t1, t2)
                .await?;
            println!("{}", serde_json::to_string(&tree)?);
        }
        Command::Node(target) => {
            let t2 = target.t2.unwrap_or_else(now_ms);
            let diff = engine
                .node(&target.model, target.identity.as_str(), target.t1, t2)
                .await?;
            println!("{}", serde_json::to_string(&diff)?);
        }
    }

    Ok(())
}
