//! Fixtures shared by the Strand test suites.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::{json, Value};

use strand_core::error::{Result, StrandError};
use strand_core::traits::{TraceRun, Tracer};
use strand_core::types::Output;
use strand_core::StrandConfig;
use strand_graph::{Edge, Graph};

/// One observed tracer callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Start { name: String, tags: Vec<String> },
    End { name: String, ok: bool },
}

/// Tracer that keeps every callback for later assertions.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Names of the runs that started, in order.
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Start { name, .. } => Some(name),
                Recorded::End { .. } => None,
            })
            .collect()
    }

    fn push(&self, event: Recorded) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Tracer for RecordingTracer {
    fn on_start(&self, run: &TraceRun) {
        self.push(Recorded::Start {
            name: run.name.clone(),
            tags: run.context.tags.clone(),
        });
    }

    fn on_end(&self, run: &TraceRun, outcome: std::result::Result<&Output, &StrandError>) {
        self.push(Recorded::End {
            name: run.name.clone(),
            ok: outcome.is_ok(),
        });
    }
}

/// Counts how many times it was called.
#[derive(Debug, Default)]
pub struct CallCounter(AtomicUsize);

impl CallCounter {
    pub fn hit(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Sample functions ──────────────────────────────────────────

pub fn double(input: Value) -> Result<Value> {
    Ok(json!(input.as_i64().unwrap_or(0) * 2))
}

pub fn add_one(input: Value) -> Result<Value> {
    Ok(json!(input.as_i64().unwrap_or(0) + 1))
}

pub async fn add_one_async(input: Value) -> Result<Value> {
    add_one(input)
}

pub fn always_fails(_: Value) -> Result<Value> {
    Err(StrandError::invocation("always_fails", "intentional failure"))
}

// ── Sample graphs ─────────────────────────────────────────────

/// `n1 -> n2` with human-readable ids.
pub fn readable_chain() -> Graph {
    chain(&["n1", "n2"])
}

/// A linear graph over the given readable ids.
pub fn chain(ids: &[&str]) -> Graph {
    let mut graph = Graph::new();
    for id in ids {
        graph.nodes.insert(
            id.to_string(),
            strand_graph::Node::new(*id, json!({"name": id})),
        );
    }
    for pair in ids.windows(2) {
        graph.edges.push(Edge::new(pair[0], pair[1]));
    }
    graph
}

/// Two nodes with UUID ids joined by one edge.
pub fn uuid_chain() -> Graph {
    let mut graph = Graph::new();
    let a = graph.next_id();
    let b = graph.next_id();
    graph.nodes.insert(a.clone(), strand_graph::Node::new(a.clone(), json!({"name": "a"})));
    graph.nodes.insert(b.clone(), strand_graph::Node::new(b.clone(), json!({"name": "b"})));
    graph.edges.push(Edge::new(a, b));
    graph
}

// ── Config fixtures ───────────────────────────────────────────

/// A temp directory holding `strand.toml` with the given contents.
pub fn config_file(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("strand.toml");
    std::fs::write(&path, contents).expect("write config");
    (dir, path)
}

/// Parse a config string the way the loader does, without touching disk.
pub fn parse_config(contents: &str) -> StrandConfig {
    toml::from_str(contents).expect("parse config")
}
