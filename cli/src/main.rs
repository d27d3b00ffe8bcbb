use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use anyhow::bail;
use clap::Args;
use clap::Parser;
use serde_json::json;
use tracing::info;

use gauntlet_config::GauntletConfig;
use gauntlet_council::Council;
use gauntlet_council::OpenRouterTransport;
use gauntlet_council::RateLimiter;
use gauntlet_engine::RuleEngine;
use gauntlet_engine::build_snapshot;
use gauntlet_protocol::Checkpoint;
use gauntlet_protocol::SessionState;
use gauntlet_server::AppState;
use gauntlet_store::MemoryStore;

/// Gauntlet: task review pipeline with an agentic quality gate.
#[derive(Debug, Parser)]
#[clap(author, version, bin_name = "gauntlet")]
struct MultitoolCli {
    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
enum Subcommand {
    /// Run the API server.
    Serve(ServeArgs),

    /// Run the rule engine over a session JSON file (or the built-in
    /// demo) without a server. Exits 1 when the review fails.
    Review(ReviewArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "gauntlet.yaml")]
    config: PathBuf,

    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8765")]
    bind: SocketAddr,
}

#[derive(Debug, Args)]
struct ReviewArgs {
    /// Path to a session JSON file, or `demo` for the built-in demo.
    session: String,

    /// `preflight` or `final`.
    checkpoint: String,

    /// For preflight: the 4 selected hunt ids.
    #[arg(long, num_args = 1..)]
    ids: Option<Vec<u32>>,

    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    match MultitoolCli::parse().subcommand {
        Subcommand::Serve(args) => serve(args).await,
        Subcommand::Review(args) => review(args).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = gauntlet_config::load(&args.config)?;
    let state = AppState::with_openrouter(config, Arc::new(MemoryStore::new()))
        .context("failed to build the model transport")?;
    let router = gauntlet_server::router(state);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!("listening on http://{}", args.bind);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn review(args: ReviewArgs) -> anyhow::Result<()> {
    let checkpoint = Checkpoint::from_str(&args.checkpoint)
        .map_err(|_| anyhow::anyhow!("checkpoint must be `preflight` or `final`"))?;

    let (session, ids) = if args.session == "demo" {
        let ids = match checkpoint {
            Checkpoint::Preflight => Some(args.ids.unwrap_or_else(|| vec![1, 2, 3, 4])),
            Checkpoint::Final => args.ids,
        };
        (demo_session()?, ids)
    } else {
        let raw = std::fs::read_to_string(&args.session)
            .with_context(|| format!("session file not found: {}", args.session))?;
        (serde_json::from_str(&raw)?, args.ids)
    };

    if checkpoint == Checkpoint::Preflight && ids.as_ref().is_none_or(|ids| ids.len() != 4) {
        bail!("preflight requires --ids with exactly 4 hunt IDs");
    }

    let config = match &args.config {
        Some(path) => gauntlet_config::load(path)?,
        None => GauntletConfig::default(),
    };
    let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));
    let transport = Arc::new(OpenRouterTransport::new(
        &config.llm,
        config.secrets.openrouter_api_key.clone(),
        limiter,
    )?);
    let council = Council::new(
        config.agentic.council.clone(),
        &config.llm,
        &config.resilience,
        transport,
    );
    let engine = RuleEngine::new(config.agentic.rules.clone(), council);

    let snapshot = build_snapshot(&session, checkpoint, ids.as_deref())?;
    let result = engine.run_review(&snapshot).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.passed {
        std::process::exit(1);
    }
    Ok(())
}

fn demo_session() -> anyhow::Result<SessionState> {
    Ok(serde_json::from_value(json!({
        "session_id": "demo",
        "notebook": {
            "prompt": "Write a haiku.",
            "response_reference": r#"[{"id":"C1","criteria1":"3 lines"},{"id":"C2","criteria2":"Mention code"}]"#
        },
        "config": { "models": ["model-a", "model-b"] },
        "all_results": (1..=4).map(|i| json!({
            "hunt_id": i,
            "model": "qwen/qwen3-235b",
            "response": format!("r{i}")
        })).collect::<Vec<_>>(),
    }))?)
}
