use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Lifecycle events of traced invocations.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    Started {
        run_id: Uuid,
        name: String,
        tags: Vec<String>,
        at: DateTime<Utc>,
    },
    Finished {
        run_id: Uuid,
        name: String,
        elapsed_ms: u64,
    },
    Failed {
        run_id: Uuid,
        name: String,
        error: String,
        elapsed_ms: u64,
    },
}

impl TraceEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::Started { run_id, .. }
            | Self::Finished { run_id, .. }
            | Self::Failed { run_id, .. } => *run_id,
        }
    }
}

/// Trace event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct TraceBus {
    tx: tokio::sync::broadcast::Sender<TraceEvent>,
}

impl TraceBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: TraceEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TraceEvent> {
        self.tx.subscribe()
    }
}

impl Default for TraceBus {
    fn default() -> Self {
        Self::new(256)
    }
}
