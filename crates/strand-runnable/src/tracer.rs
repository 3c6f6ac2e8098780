use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn, Instrument};

use strand_core::context::ExecutionContext;
use strand_core::error::{Result, StrandError};
use strand_core::event::{TraceBus, TraceEvent};
use strand_core::traits::{TraceRun, Tracer};
use strand_core::types::{Kwargs, Output};

/// Tracer that reports invocations through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn on_start(&self, run: &TraceRun) {
        info!(
            run_id = %run.run_id,
            name = %run.name,
            tags = ?run.context.tags,
            "Invocation started"
        );
    }

    fn on_end(&self, run: &TraceRun, outcome: std::result::Result<&Output, &StrandError>) {
        let elapsed_ms = elapsed_ms(run);
        match outcome {
            Ok(_) => info!(run_id = %run.run_id, name = %run.name, elapsed_ms, "Invocation finished"),
            Err(e) => warn!(
                run_id = %run.run_id,
                name = %run.name,
                elapsed_ms,
                error = %e,
                "Invocation failed"
            ),
        }
    }
}

/// Tracer that publishes [`TraceEvent`]s on a [`TraceBus`].
#[derive(Clone)]
pub struct EventTracer {
    bus: Arc<TraceBus>,
}

impl EventTracer {
    pub fn new(bus: Arc<TraceBus>) -> Self {
        Self { bus }
    }
}

impl Tracer for EventTracer {
    fn on_start(&self, run: &TraceRun) {
        self.bus.publish(TraceEvent::Started {
            run_id: run.run_id,
            name: run.name.clone(),
            tags: run.context.tags.clone(),
            at: run.started_at,
        });
    }

    fn on_end(&self, run: &TraceRun, outcome: std::result::Result<&Output, &StrandError>) {
        let elapsed_ms = elapsed_ms(run);
        let event = match outcome {
            Ok(_) => TraceEvent::Finished {
                run_id: run.run_id,
                name: run.name.clone(),
                elapsed_ms,
            },
            Err(e) => TraceEvent::Failed {
                run_id: run.run_id,
                name: run.name.clone(),
                error: e.to_string(),
                elapsed_ms,
            },
        };
        self.bus.publish(event);
    }
}

fn elapsed_ms(run: &TraceRun) -> u64 {
    (Utc::now() - run.started_at).num_milliseconds().max(0) as u64
}

/// Run `call` inside a span, reporting to the context's tracer if one is
/// attached. Without a tracer this is a plain call.
pub(crate) fn traced<F>(
    name: &str,
    input: &Value,
    context: &ExecutionContext,
    kwargs: &Kwargs,
    call: F,
) -> Result<Output>
where
    F: FnOnce() -> Result<Output>,
{
    let span = tracing::debug_span!("invoke", name = %name);
    let _enter = span.enter();

    let Some(tracer) = context.tracer.as_ref() else {
        return call();
    };
    let run = TraceRun::new(name, input.clone(), context.clone(), kwargs.clone());
    tracer.on_start(&run);
    let result = call();
    tracer.on_end(&run, result.as_ref());
    debug!(name, ok = result.is_ok(), "Traced call complete");
    result
}

/// Async counterpart of [`traced`].
pub(crate) async fn traced_async<Fut>(
    name: &str,
    input: &Value,
    context: &ExecutionContext,
    kwargs: &Kwargs,
    call: Fut,
) -> Result<Output>
where
    Fut: Future<Output = Result<Output>>,
{
    let span = tracing::debug_span!("ainvoke", name = %name);

    let Some(tracer) = context.tracer.as_ref() else {
        return call.instrument(span).await;
    };
    let run = TraceRun::new(name, input.clone(), context.clone(), kwargs.clone());
    tracer.on_start(&run);
    let result = call.instrument(span).await;
    tracer.on_end(&run, result.as_ref());
    debug!(name, ok = result.is_ok(), "Traced call complete");
    result
}
