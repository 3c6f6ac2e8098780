use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use strand_core::context::{merge_contexts, ExecutionContext};
use strand_core::error::{Result, StrandError};
use strand_core::traits::{Invocable, Isolation, Scheduler};
use strand_core::types::{Kwargs, Output};

use crate::callable::{AsyncImpl, SyncImpl};
use crate::scheduler::default_scheduler;
use crate::tracer::{traced, traced_async};

const DEFAULT_NAME: &str = "ExecutionAdapter";

/// Dual-mode invocable over a synchronous and/or asynchronous implementation.
///
/// Immutable once built; safe to share across concurrent invocations. Every
/// call merges the adapter's base context with the caller's into a fresh
/// value, so calls never see each other's configuration.
pub struct ExecutionAdapter {
    name: String,
    sync_impl: Option<SyncImpl>,
    async_impl: Option<AsyncImpl>,
    kwargs: Kwargs,
    config: Option<ExecutionContext>,
    trace: bool,
    recurse: bool,
    scheduler: Arc<dyn Scheduler>,
}

impl ExecutionAdapter {
    fn build(sync_impl: Option<SyncImpl>, async_impl: Option<AsyncImpl>) -> Self {
        let name = sync_impl
            .as_ref()
            .and_then(|f| f.name())
            .or_else(|| async_impl.as_ref().and_then(|f| f.name()))
            .unwrap_or(DEFAULT_NAME)
            .to_string();
        Self {
            name,
            sync_impl,
            async_impl,
            kwargs: Kwargs::new(),
            config: None,
            trace: true,
            recurse: true,
            scheduler: default_scheduler(),
        }
    }

    /// Adapter over a synchronous implementation only. `ainvoke` falls back
    /// to `invoke` on the calling task.
    pub fn from_sync(sync_impl: SyncImpl) -> Self {
        Self::build(Some(sync_impl), None)
    }

    /// Adapter over an asynchronous implementation only. `invoke` fails.
    pub fn from_async(async_impl: AsyncImpl) -> Self {
        Self::build(None, Some(async_impl))
    }

    /// Adapter with both implementations.
    pub fn dual(sync_impl: SyncImpl, async_impl: AsyncImpl) -> Self {
        Self::build(Some(sync_impl), Some(async_impl))
    }

    /// Adapter over a synchronous implementation whose async path runs it on
    /// the scheduler's blocking pool. The synthesized async implementation
    /// keeps the original's name and context contract.
    pub fn offloaded(sync_impl: SyncImpl, scheduler: Arc<dyn Scheduler>) -> Self {
        let raw = sync_impl.raw();
        let pool = scheduler.clone();
        let async_impl = AsyncImpl::from_raw(
            Arc::new(
                move |input: Value,
                      context: Option<ExecutionContext>,
                      kwargs: Kwargs|
                      -> BoxFuture<'static, Result<Output>> {
                let raw = raw.clone();
                pool.run_blocking(Box::new(move || (*raw)(input, context.as_ref(), &kwargs)))
            },
            ),
            sync_impl.name().map(str::to_string),
            sync_impl.accepts_context(),
        );
        Self::dual(sync_impl, async_impl).with_scheduler(scheduler)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Tags added to every call's context, on top of any base config.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        if tags.is_empty() {
            return self;
        }
        let mut config = self.config.take().unwrap_or_default();
        for tag in tags {
            if !config.tags.contains(&tag) {
                config.tags.push(tag);
            }
        }
        self.config = Some(config);
        self
    }

    /// Base context merged into every call. Replaces earlier tags.
    pub fn with_config(mut self, config: ExecutionContext) -> Self {
        self.config = Some(config);
        self
    }

    /// Keyword values passed on every call; call-time keywords win.
    pub fn with_kwargs(mut self, kwargs: Kwargs) -> Self {
        self.kwargs = kwargs;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_recurse(mut self, recurse: bool) -> Self {
        self.recurse = recurse;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn has_sync(&self) -> bool {
        self.sync_impl.is_some()
    }

    pub fn has_async(&self) -> bool {
        self.async_impl.is_some()
    }

    pub fn trace(&self) -> bool {
        self.trace
    }

    pub fn recurse(&self) -> bool {
        self.recurse
    }

    fn merge_kwargs(&self, call_kwargs: Kwargs) -> Kwargs {
        let mut kwargs = self.kwargs.clone();
        kwargs.extend(call_kwargs);
        kwargs
    }

    fn recursion_context(&self, original: Option<&ExecutionContext>) -> Result<ExecutionContext> {
        ExecutionContext::descend(original).ok_or_else(|| StrandError::RecursionLimit {
            name: self.name.clone(),
        })
    }
}

impl Invocable for ExecutionAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(
        &self,
        input: Value,
        context: Option<&ExecutionContext>,
        kwargs: Kwargs,
    ) -> Result<Output> {
        let sync_impl = self
            .sync_impl
            .as_ref()
            .ok_or_else(|| StrandError::NoSynchronousImplementation {
                name: self.name.clone(),
            })?;
        let kwargs = self.merge_kwargs(kwargs);
        let merged = merge_contexts(self.config.as_ref(), context);

        let ret = if self.trace {
            traced(&self.name, &input, &merged, &kwargs, || {
                sync_impl.call(input.clone(), &merged, &kwargs)
            })?
        } else {
            sync_impl.call(input.clone(), &merged, &kwargs)?
        };

        match ret {
            Output::Runnable(next) if self.recurse => {
                debug!(name = %self.name, next = %next.name(), "Resolving returned runnable");
                let next_context = self.recursion_context(context)?;
                next.invoke(input, Some(&next_context), Kwargs::new())
            }
            ret => Ok(ret),
        }
    }

    fn ainvoke<'a>(
        &'a self,
        input: Value,
        context: Option<&'a ExecutionContext>,
        kwargs: Kwargs,
    ) -> BoxFuture<'a, Result<Output>> {
        Box::pin(async move {
            let Some(async_impl) = self.async_impl.as_ref() else {
                return self.invoke(input, context, kwargs);
            };
            let kwargs = self.merge_kwargs(kwargs);
            let merged = merge_contexts(self.config.as_ref(), context);

            let ret = if self.trace {
                let call = async_impl.call(input.clone(), &merged, kwargs.clone());
                traced_async(&self.name, &input, &merged, &kwargs, call).await?
            } else {
                let call = async_impl.call(input.clone(), &merged, kwargs);
                match self.scheduler.isolation() {
                    Isolation::Spawn => self.scheduler.spawn_isolated(call).await?,
                    Isolation::Inline => call.await?,
                }
            };

            match ret {
                Output::Runnable(next) if self.recurse => {
                    debug!(name = %self.name, next = %next.name(), "Resolving returned runnable");
                    let next_context = self.recursion_context(context)?;
                    next.ainvoke(input, Some(&next_context), Kwargs::new()).await
                }
                ret => Ok(ret),
            }
        })
    }
}

impl fmt::Debug for ExecutionAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(recurse={})", self.name, self.recurse)
    }
}
