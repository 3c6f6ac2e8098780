use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use strand_core::context::ExecutionContext;
use strand_core::error::{Result, StrandError};
use strand_core::traits::{Invocable, Scheduler};
use strand_core::types::{Kwargs, Output, Sequence};

use crate::callable::{AsyncGeneratorImpl, GeneratorImpl};
use crate::scheduler::default_scheduler;
use crate::tracer::{traced, traced_async};

const DEFAULT_NAME: &str = "LazySequenceAdapter";

/// The generator behind a [`LazySequenceAdapter`].
#[derive(Clone)]
pub enum Generator {
    Sync(GeneratorImpl),
    Async(AsyncGeneratorImpl),
}

/// Invocable over a generator function. Each call produces a fresh
/// [`Sequence`]; a sequence is consumed once and cannot be restarted.
pub struct LazySequenceAdapter {
    name: String,
    generator: Generator,
    trace: bool,
    scheduler: Arc<dyn Scheduler>,
}

impl LazySequenceAdapter {
    pub fn new(generator: Generator) -> Self {
        let name = match &generator {
            Generator::Sync(g) => g.name(),
            Generator::Async(g) => g.name(),
        }
        .unwrap_or(DEFAULT_NAME)
        .to_string();
        Self {
            name,
            generator,
            trace: true,
            scheduler: default_scheduler(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn is_async(&self) -> bool {
        matches!(self.generator, Generator::Async(_))
    }
}

impl Invocable for LazySequenceAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(
        &self,
        input: Value,
        context: Option<&ExecutionContext>,
        kwargs: Kwargs,
    ) -> Result<Output> {
        let Generator::Sync(generator) = &self.generator else {
            return Err(StrandError::NoSynchronousImplementation {
                name: self.name.clone(),
            });
        };
        let context = context.cloned().unwrap_or_default();
        let produce = || generator.call(input.clone(), &context).map(Output::Sequence);
        if self.trace {
            traced(&self.name, &input, &context, &kwargs, produce)
        } else {
            produce()
        }
    }

    fn ainvoke<'a>(
        &'a self,
        input: Value,
        context: Option<&'a ExecutionContext>,
        kwargs: Kwargs,
    ) -> BoxFuture<'a, Result<Output>> {
        Box::pin(async move {
            let context = context.cloned().unwrap_or_default();
            let produce: BoxFuture<'static, Result<Output>> = match &self.generator {
                Generator::Async(generator) => {
                    let sequence = generator.call(input.clone(), &context);
                    Box::pin(async move { Ok(Output::Sequence(sequence)) })
                }
                Generator::Sync(generator) => {
                    let generator = generator.clone();
                    let (job_input, job_context) = (input.clone(), context.clone());
                    let started = self.scheduler.run_blocking(Box::new(move || {
                        generator
                            .call(job_input, &job_context)
                            .map(Output::Sequence)
                    }));
                    let scheduler = self.scheduler.clone();
                    Box::pin(async move {
                        match started.await? {
                            Output::Sequence(Sequence::Iter(iter)) => Ok(Output::Sequence(
                                Sequence::Stream(offload_items(&*scheduler, iter)),
                            )),
                            other => Ok(other),
                        }
                    })
                }
            };
            if self.trace {
                traced_async(&self.name, &input, &context, &kwargs, produce).await
            } else {
                produce.await
            }
        })
    }
}

/// Pull the items of a synchronous sequence on the blocking pool through a
/// one-slot channel, so the producer stays close behind the consumer.
/// Without a runtime there is nothing to stall and items are pulled inline.
fn offload_items(
    scheduler: &dyn Scheduler,
    iter: Box<dyn Iterator<Item = Result<Value>> + Send>,
) -> BoxStream<'static, Result<Value>> {
    if Handle::try_current().is_err() {
        return Box::pin(stream::iter(iter));
    }

    let (tx, rx) = mpsc::channel(1);
    let producer = scheduler.run_blocking(Box::new(move || {
        for item in iter {
            // Receiver gone: the consumer dropped the sequence.
            if tx.blocking_send(item).is_err() {
                break;
            }
        }
        Ok(Output::Value(Value::Null))
    }));

    let items = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    // Surfaces a failed producer (panic, closed pool) as a trailing error.
    let failures = stream::once(producer).filter_map(|done| async move { done.err().map(Err) });
    Box::pin(stream::select(items, failures))
}

impl fmt::Debug for LazySequenceAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySequenceAdapter")
            .field("name", &self.name)
            .field("async", &self.is_async())
            .finish()
    }
}
