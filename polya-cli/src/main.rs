//! Polya CLI - walk through a math problem from the terminal

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use polya_core::prelude::*;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

#[derive(Parser)]
#[command(name = "polya")]
#[command(about = "Guided math-problem sessions on a local engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a problem, then answer follow-up questions read from stdin
    Solve {
        /// JSON file holding an array of problem records
        #[arg(short, long, env = "POLYA_PROBLEMS")]
        problems: PathBuf,

        /// Problem ID
        #[arg(short, long)]
        id: String,

        /// Configuration file (defaults to polya.toml and POLYA_ overrides)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Use a scripted engine instead of the llama.cpp server
        #[arg(long)]
        dry_run: bool,

        /// Print session events as JSON lines instead of streamed text
        #[arg(long)]
        events_json: bool,
    },
    /// Version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("polya {}", env!("CARGO_PKG_VERSION"));
            println!("polya-core {}", polya_core::VERSION);
        }
        Commands::Solve {
            problems,
            id,
            config,
            dry_run,
            events_json,
        } => solve(problems, id, config, dry_run, events_json).await?,
    }

    Ok(())
}

async fn solve(
    problems: PathBuf,
    id: String,
    config: Option<PathBuf>,
    dry_run: bool,
    events_json: bool,
) -> Result<()> {
    let config = match config {
        Some(path) => PolyaConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PolyaConfig::load().context("loading config")?,
    };

    let store = ProblemStore::from_json_file(&problems)
        .with_context(|| format!("loading problems from {}", problems.display()))?;
    let problem = store
        .get(&id)
        .with_context(|| format!("no problem with id {:?}", id))?;

    let loader: Arc<dyn EngineLoader> = if dry_run {
        Arc::new(
            ScriptedLoader::new()
                .with_completion([
                    "1. Restate the problem.\n",
                    "2. Apply the technique.\n",
                    "3. State the final answer.",
                ])
                .with_default_completion(["This is a dry run; no engine is attached."]),
        )
    } else {
        Arc::new(LlamaServerLoader::from_config(&config.engine)?)
    };

    let (session, events) = SessionManager::new(loader, config).with_event_channel();
    let printer = spawn_printer(events, events_json);

    println!("{}\n", problem.body);
    session.open_problem(problem).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let reply = session.continue_conversation(&line).await;
        if reply == messages::STOP_ACK {
            break;
        }
    }

    session.shutdown().await;
    drop(session);
    printer.await?;
    Ok(())
}

/// Render session events on stdout until the channel closes
fn spawn_printer(mut events: EventReceiver, json: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut streamed = String::new();

        while let Some(event) = events.recv().await {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!(error = %e, "failed to encode event"),
                }
                continue;
            }

            match event {
                SessionEvent::GenerationStarted { .. } => streamed.clear(),
                SessionEvent::StreamChunk { text, .. } => {
                    // Each chunk extends the previous one
                    if let Some(delta) = text.get(streamed.len()..) {
                        print!("{}", delta);
                    }
                    streamed = text;
                }
                SessionEvent::Reply { text, .. } => {
                    if streamed.is_empty() {
                        println!("{}\n", text);
                    } else if streamed.trim() == text {
                        println!("\n");
                    } else {
                        println!("\n{}\n", text);
                    }
                    streamed.clear();
                }
                SessionEvent::ReadinessChanged { ready, .. } => {
                    tracing::debug!(ready, "engine readiness changed");
                }
                SessionEvent::GenerationFinished { raw, .. } => {
                    // Chunks may have been dropped while the printer lagged
                    if let Some(rest) = raw.get(streamed.len()..) {
                        print!("{}", rest);
                    }
                    streamed = raw;
                }
            }
            let _ = std::io::stdout().flush();
        }
    })
}
