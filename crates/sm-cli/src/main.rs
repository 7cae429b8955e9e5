mod app;
mod server;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sm_core::{AuditLogEntry, RelevanceMatcher, drift_over};
use sm_store::DataDir;

use crate::app::App;
use crate::server::SmServer;

#[derive(Parser)]
#[command(name = "sm", about = "Symbolic memory engine CLI and HTTP server")]
struct Cli {
    /// Data directory (default: $SM_DATA_DIR, then ~/.symbolic-memory)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:7341")]
        addr: SocketAddr,
    },

    /// Rank stored memories by relevance to some text
    Query {
        /// Text to match against
        text: String,

        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Upsert memory nodes from a JSON file
    Seed {
        /// Node array or snapshot JSON
        path: PathBuf,
    },

    /// Store and inspect reasoning traces
    Trace {
        #[command(subcommand)]
        action: TraceAction,
    },

    /// Apply a stored trace's mutations to memory
    Mutate {
        /// Trace to apply
        trace_id: String,
    },

    /// Read or write the self-audit log
    Audit {
        #[command(subcommand)]
        action: AuditAction,
    },

    /// Record a snapshot of current memory
    Snapshot,

    /// Show drift between consecutive snapshots
    Drift,

    /// List nodes whose trust has reached zero
    Prune {
        /// Delete the listed nodes
        #[arg(long)]
        apply: bool,
    },

    /// Show system statistics
    Stats,

    /// Export memory nodes to a JSON file
    Export {
        /// Output file path
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum TraceAction {
    /// Store a trace from a JSON file
    Add { path: PathBuf },
    /// List stored traces, oldest first
    List,
    /// Show a trace with its recorded mutation outcomes
    Show { trace_id: String },
}

#[derive(Subcommand)]
enum AuditAction {
    /// Most recent entries first
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Append an entry
    Log {
        kind: String,
        message: String,
        /// Extra JSON payload
        #[arg(long)]
        details: Option<String>,
    },
}

fn data_dir(cli: &Cli) -> Result<DataDir> {
    let root = cli
        .data_dir
        .clone()
        .or_else(|| std::env::var("SM_DATA_DIR").ok().map(PathBuf::from));
    DataDir::resolve(root).context("failed to prepare data directory")
}

fn open_app(cli: &Cli) -> Result<App> {
    App::open(&data_dir(cli)?)
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let app = open_app(&cli)?;
    match &cli.command {
        Commands::Serve { addr } => cmd_serve(app, *addr).await,
        Commands::Query { text, limit } => cmd_query(&app, text, *limit),
        Commands::Seed { path } => cmd_seed(&app, path),
        Commands::Trace { action } => cmd_trace(&app, action),
        Commands::Mutate { trace_id } => cmd_mutate(&app, trace_id),
        Commands::Audit { action } => cmd_audit(&app, action),
        Commands::Snapshot => cmd_snapshot(&app),
        Commands::Drift => cmd_drift(&app),
        Commands::Prune { apply } => cmd_prune(&app, *apply),
        Commands::Stats => cmd_stats(&app),
        Commands::Export { path } => cmd_export(&app, path),
    }
}

async fn cmd_serve(app: App, addr: SocketAddr) -> Result<()> {
    let app = Arc::new(app);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    println!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, SmServer::new(Arc::clone(&app)).router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    app.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

fn cmd_query(app: &App, text: &str, limit: Option<usize>) -> Result<()> {
    let loaded = app.memory.load().context("failed to load memory")?;
    let mut config = app.config.relevance.clone();
    if limit.is_some() {
        config.limit = limit;
    }

    let results = RelevanceMatcher::find_relevant_memories(text, &loaded.nodes, &config);
    if results.is_empty() {
        println!("(no memories found)");
    }
    for r in &results {
        println!("{:.3}  {}  {}", r.score, r.node.id, r.node.content);
    }

    if !loaded.skipped.is_empty() {
        eprintln!("--- skipped {} unreadable nodes ---", loaded.skipped.len());
    }
    Ok(())
}

fn cmd_seed(app: &App, path: &Path) -> Result<()> {
    let count = app
        .memory
        .import_json_file(path)
        .context("failed to import nodes")?;
    println!("seeded {count} nodes from {}", path.display());
    Ok(())
}

fn cmd_trace(app: &App, action: &TraceAction) -> Result<()> {
    match action {
        TraceAction::Add { path } => {
            let trace = app
                .traces
                .import_trace_file(path)
                .with_context(|| format!("failed to store trace from {}", path.display()))?;
            println!(
                "stored trace {} ({} mutations)",
                trace.trace_id,
                trace.mutation_count()
            );
        }
        TraceAction::List => {
            let mut any = false;
            for trace in app.traces.list_all() {
                let trace = trace.context("failed to read traces")?;
                any = true;
                println!(
                    "{}  {}  {} mutations  {}",
                    trace.timestamp,
                    trace.trace_id,
                    trace.mutation_count(),
                    trace.input
                );
            }
            if !any {
                println!("(no traces)");
            }
        }
        TraceAction::Show { trace_id } => {
            let trace = app
                .traces
                .load_by_id(trace_id)
                .context("failed to load trace")?
                .with_context(|| format!("trace not found: {trace_id}"))?;
            let outcomes = app
                .outcomes
                .for_trace(trace_id)
                .context("failed to load outcomes")?;
            let json = serde_json::json!({ "trace": trace, "outcomes": outcomes });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

fn cmd_mutate(app: &App, trace_id: &str) -> Result<()> {
    let summary = app
        .run_mutation_cycle(trace_id)
        .with_context(|| format!("mutation cycle failed for {trace_id}"))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_audit(app: &App, action: &AuditAction) -> Result<()> {
    match action {
        AuditAction::List { limit } => {
            let entries = app.audit.get_recent_audit_logs(*limit);
            if entries.is_empty() {
                println!("(no audit entries)");
            }
            for e in entries {
                println!("{}  [{}] {}", e.timestamp, e.kind, e.message);
            }
        }
        AuditAction::Log {
            kind,
            message,
            details,
        } => {
            let mut entry = AuditLogEntry::new(kind.as_str(), message.as_str());
            if let Some(raw) = details {
                let value: serde_json::Value =
                    serde_json::from_str(raw).context("--details must be valid JSON")?;
                entry = entry.with_details(value);
            }
            let entry = app.audit.log_self_audit(entry);
            println!("logged {}", entry.id);
        }
    }
    Ok(())
}

fn cmd_snapshot(app: &App) -> Result<()> {
    let snapshot = app.memory.snapshot().context("failed to read memory")?;
    app.memory
        .save_snapshot(&snapshot)
        .context("failed to save snapshot")?;
    println!("snapshot {}: {} nodes", snapshot.id, snapshot.nodes.len());
    Ok(())
}

fn cmd_drift(app: &App) -> Result<()> {
    let snapshots = app
        .memory
        .list_snapshots()
        .context("failed to load snapshots")?;
    if snapshots.len() < 2 {
        println!("(need at least two snapshots)");
        return Ok(());
    }

    let scores = drift_over(&snapshots, app.config.drift.trend_epsilon);
    for (pair, score) in snapshots.windows(2).zip(&scores) {
        let parts: Vec<String> = score
            .components
            .iter()
            .map(|c| format!("{}={:.3} ({})", c.name, c.score, trend_label(c.trend)))
            .collect();
        println!(
            "{} -> {}  overall={:.3}  {}",
            pair[0].taken_at,
            pair[1].taken_at,
            score.overall_score,
            parts.join(", ")
        );
    }
    Ok(())
}

fn trend_label(trend: sm_core::Trend) -> &'static str {
    match trend {
        sm_core::Trend::Increasing => "increasing",
        sm_core::Trend::Decreasing => "decreasing",
        sm_core::Trend::Stable => "stable",
    }
}

fn cmd_prune(app: &App, apply: bool) -> Result<()> {
    let candidates = app
        .memory
        .prune_candidates()
        .context("failed to list prune candidates")?;
    if candidates.is_empty() {
        println!("(no prune candidates)");
        return Ok(());
    }

    for node in &candidates {
        println!("{}  {}", node.id, node.content);
    }
    if !apply {
        println!("{} candidates (use --apply to delete)", candidates.len());
        return Ok(());
    }

    let mut removed = Vec::new();
    for node in &candidates {
        if app.memory.delete(&node.id).context("failed to delete node")? {
            removed.push(node.id.clone());
        }
    }
    app.audit.log_self_audit(
        AuditLogEntry::new("prune", format!("deleted {} zero-trust nodes", removed.len()))
            .with_details(serde_json::json!({ "nodeIds": removed })),
    );
    println!("pruned {} nodes", removed.len());
    Ok(())
}

fn cmd_stats(app: &App) -> Result<()> {
    let nodes = app.memory.count().context("failed to count nodes")?;
    let traces = app.traces.count().context("failed to count traces")?;
    let outcomes = app.outcomes.count().context("failed to count outcomes")?;
    let snapshots = app
        .memory
        .list_snapshots()
        .context("failed to load snapshots")?
        .len();
    let candidates = app
        .memory
        .prune_candidates()
        .context("failed to list prune candidates")?
        .len();

    println!("nodes:      {nodes}");
    println!("traces:     {traces}");
    println!("outcomes:   {outcomes}");
    println!("snapshots:  {snapshots}");
    println!("prunable:   {candidates}");
    println!("audit:      {}", app.audit.len());
    println!(
        "db_size:    {:.1}MB",
        app.store.db_size() as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}

fn cmd_export(app: &App, path: &Path) -> Result<()> {
    app.memory
        .export_json_file(path)
        .context("failed to export nodes")?;
    println!("exported to {}", path.display());
    Ok(())
}
