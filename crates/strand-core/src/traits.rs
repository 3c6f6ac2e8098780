use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::error::{Result, StrandError};
use crate::types::{Kwargs, Output};

/// Anything that can be called with an input and an optional context,
/// synchronously or asynchronously.
pub trait Invocable: Send + Sync + 'static {
    /// Name used for tracing and graph rendering.
    fn name(&self) -> &str;

    /// Run to completion on the calling thread.
    fn invoke(
        &self,
        input: Value,
        context: Option<&ExecutionContext>,
        kwargs: Kwargs,
    ) -> Result<Output>;

    /// Run cooperatively on an async scheduler.
    fn ainvoke<'a>(
        &'a self,
        input: Value,
        context: Option<&'a ExecutionContext>,
        kwargs: Kwargs,
    ) -> BoxFuture<'a, Result<Output>>;
}

/// One traced invocation, as seen by a [`Tracer`].
#[derive(Debug, Clone)]
pub struct TraceRun {
    pub run_id: Uuid,
    pub name: String,
    pub input: Value,
    pub context: ExecutionContext,
    pub kwargs: Kwargs,
    pub started_at: DateTime<Utc>,
}

impl TraceRun {
    pub fn new(
        name: impl Into<String>,
        input: Value,
        context: ExecutionContext,
        kwargs: Kwargs,
    ) -> Self {
        Self {
            run_id: context.run_id.unwrap_or_else(Uuid::new_v4),
            name: name.into(),
            input,
            context,
            kwargs,
            started_at: Utc::now(),
        }
    }
}

/// External observer of traced invocations.
pub trait Tracer: Send + Sync + 'static {
    /// Called before the implementation runs.
    fn on_start(&self, run: &TraceRun);

    /// Called with the implementation's outcome.
    fn on_end(&self, run: &TraceRun, outcome: std::result::Result<&Output, &StrandError>);
}

/// A blocking unit of work handed to [`Scheduler::run_blocking`].
pub type BlockingJob = Box<dyn FnOnce() -> Result<Output> + Send + 'static>;

/// Isolation a scheduler can give to spawned async work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// Work runs as its own task with its own copy of the call context.
    Spawn,
    /// Work runs inline on the caller's task (reduced isolation).
    Inline,
}

/// Scheduling substrate used by the async invocation path.
pub trait Scheduler: Send + Sync + 'static {
    /// Run a blocking job without stalling the async scheduler.
    fn run_blocking(&self, job: BlockingJob) -> BoxFuture<'static, Result<Output>>;

    /// The isolation level currently available.
    fn isolation(&self) -> Isolation;

    /// Run `work` as an isolated unit. The work owns its context, so nothing
    /// it does is visible to other invocations.
    fn spawn_isolated(
        &self,
        work: BoxFuture<'static, Result<Output>>,
    ) -> BoxFuture<'static, Result<Output>>;
}
