use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strand_core::context::ExecutionContext;
use strand_core::event::{TraceBus, TraceEvent};
use strand_core::traits::Invocable;
use strand_core::types::Kwargs;
use strand_core::StrandConfig;
use strand_graph::Graph;
use strand_runnable::{
    coerce_with, AsyncImpl, CoerceOptions, EventTracer, LogTracer, RunnableLike, SyncImpl,
};

#[derive(Parser)]
#[command(name = "strand", version, about = "Compose invocables and their execution graphs")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "strand.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge a child graph into a parent graph
    Merge {
        /// Parent graph (JSON)
        parent: PathBuf,
        /// Child graph (JSON)
        child: PathBuf,
        /// Prefix for readable child node ids
        #[arg(long, short)]
        prefix: String,
        /// Print Mermaid instead of JSON
        #[arg(long)]
        mermaid: bool,
        /// Write the merged graph here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Check that every edge of a graph resolves
    Validate {
        /// Graph file (JSON)
        graph: PathBuf,
    },
    /// Render a graph as Mermaid
    Draw {
        /// Graph file (JSON)
        graph: PathBuf,
    },
    /// Coerce the built-in sample functions into a fan-out and run it
    Demo {
        /// Input passed to every branch
        #[arg(default_value = "3")]
        input: i64,
        /// Print the fan-out's graph instead of running it
        #[arg(long)]
        graph: bool,
        /// Publish trace events and print them as JSON lines
        #[arg(long)]
        events: bool,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "strand", &mut std::io::stdout());
        return Ok(());
    }

    let config = StrandConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Merge {
            parent,
            child,
            prefix,
            mermaid,
            output,
        } => {
            let mut graph = read_graph(&parent)?;
            let sub = read_graph(&child)?;
            let (first, last) = graph.extend(&sub, &prefix);
            match (&first, &last) {
                (Some(first), Some(last)) => {
                    info!(first = %first.id, last = %last.id, "Merged child graph")
                }
                _ => warn!(child = %child.display(), "Child graph has no unique entry and exit"),
            }
            graph.validate()?;

            let rendered = if mermaid {
                graph.draw_mermaid()
            } else {
                graph.to_json()?
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Wrote {}", path.display());
                }
                None => println!("{rendered}"),
            }
        }
        Commands::Validate { graph } => {
            let loaded = read_graph(&graph)?;
            println!(
                "{}: {} nodes, {} edges, ok",
                graph.display(),
                loaded.nodes.len(),
                loaded.edges.len()
            );
        }
        Commands::Draw { graph } => {
            print!("{}", read_graph(&graph)?.draw_mermaid());
        }
        Commands::Demo {
            input,
            graph,
            events,
        } => {
            run_demo(&config, input, graph, events).await?;
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn read_graph(path: &Path) -> anyhow::Result<Graph> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Graph::from_json(&text).with_context(|| format!("parsing {}", path.display()))
}

// ── Demo ──────────────────────────────────────────────────────

fn square(input: Value) -> strand_core::Result<Value> {
    let n = input.as_i64().unwrap_or(0);
    Ok(json!(n * n))
}

fn describe(input: Value, kwargs: &Kwargs) -> strand_core::Result<Value> {
    let label = kwargs.get("label").and_then(|v| v.as_str()).unwrap_or("value");
    Ok(json!(format!("{label} = {input}")))
}

async fn successor(input: Value) -> strand_core::Result<Value> {
    tokio::task::yield_now().await;
    Ok(json!(input.as_i64().unwrap_or(0) + 1))
}

async fn run_demo(config: &StrandConfig, input: i64, graph: bool, events: bool) -> anyhow::Result<()> {
    let options = CoerceOptions::from_config(&config.executor);

    let mut branches: BTreeMap<String, RunnableLike> = BTreeMap::new();
    branches.insert("square".into(), SyncImpl::new(square).into());
    branches.insert("describe".into(), SyncImpl::with_args(describe).into());
    branches.insert("successor".into(), AsyncImpl::new(successor).into());
    let runnable = coerce_with(RunnableLike::Map(branches), Some("demo"), &options)?;

    if graph {
        print!("{}", runnable.get_graph()?.draw_mermaid());
        return Ok(());
    }

    let bus = Arc::new(TraceBus::default());
    let mut rx = bus.subscribe();
    let context = if events {
        ExecutionContext::from_tags(vec!["demo".into()])
            .with_tracer(Arc::new(EventTracer::new(bus.clone())))
    } else {
        ExecutionContext::from_tags(vec!["demo".into()]).with_tracer(Arc::new(LogTracer))
    };
    let context = match config.executor.max_concurrency {
        0 => context,
        limit => context.with_max_concurrency(limit),
    };

    let output = runnable
        .ainvoke(json!(input), Some(&context), Kwargs::new())
        .await?;
    println!("{}", serde_json::to_string_pretty(&output.into_value()?)?);

    if events {
        while let Ok(event) = rx.try_recv() {
            print_event(&event)?;
        }
    }
    Ok(())
}

fn print_event(event: &TraceEvent) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
