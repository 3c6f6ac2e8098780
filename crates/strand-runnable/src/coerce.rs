use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use strand_core::config::ExecutorConfig;
use strand_core::error::{Result, StrandError};
use strand_core::traits::{Invocable, Scheduler};

use crate::adapter::ExecutionAdapter;
use crate::callable::{AsyncImpl, Callable, SyncImpl};
use crate::fanout::FanOutAdapter;
use crate::lazy::{Generator, LazySequenceAdapter};
use crate::predicates::{accepts_context, is_async_callable, is_async_generator, is_sync_generator};
use crate::runnable::Runnable;
use crate::scheduler::{default_scheduler, scheduler_for};

/// Anything [`coerce`] accepts.
pub enum RunnableLike {
    Runnable(Runnable),
    Invocable(Arc<dyn Invocable>),
    Callable(Callable),
    Map(BTreeMap<String, RunnableLike>),
    /// A plain payload. Never invocable; coercing it fails.
    Value(Value),
}

impl RunnableLike {
    fn type_name(&self) -> String {
        match self {
            Self::Runnable(r) => format!("runnable '{}'", r.name()),
            Self::Invocable(r) => format!("invocable '{}'", r.name()),
            Self::Callable(_) => "callable".to_string(),
            Self::Map(_) => "map".to_string(),
            Self::Value(v) => match v {
                Value::Null => "null",
                Value::Bool(_) => "bool",
                Value::Number(_) => "number",
                Value::String(_) => "string",
                Value::Array(_) => "array",
                Value::Object(_) => "object",
            }
            .to_string(),
        }
    }
}

impl From<Runnable> for RunnableLike {
    fn from(r: Runnable) -> Self {
        Self::Runnable(r)
    }
}

impl From<Arc<dyn Invocable>> for RunnableLike {
    fn from(r: Arc<dyn Invocable>) -> Self {
        Self::Invocable(r)
    }
}

impl From<Callable> for RunnableLike {
    fn from(c: Callable) -> Self {
        Self::Callable(c)
    }
}

impl From<SyncImpl> for RunnableLike {
    fn from(f: SyncImpl) -> Self {
        Self::Callable(Callable::Sync(f))
    }
}

impl From<AsyncImpl> for RunnableLike {
    fn from(f: AsyncImpl) -> Self {
        Self::Callable(Callable::Async(f))
    }
}

impl From<Value> for RunnableLike {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl<K: Into<String>, V: Into<RunnableLike>> FromIterator<(K, V)> for RunnableLike {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Settings applied to every adapter built during one coercion.
#[derive(Clone)]
pub struct CoerceOptions {
    pub trace: bool,
    pub recurse: bool,
    pub scheduler: Arc<dyn Scheduler>,
    /// Fan-out concurrency cap; `None` runs every branch at once.
    pub max_concurrency: Option<usize>,
}

impl Default for CoerceOptions {
    fn default() -> Self {
        Self {
            trace: true,
            recurse: true,
            scheduler: default_scheduler(),
            max_concurrency: None,
        }
    }
}

impl CoerceOptions {
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            trace: config.trace,
            recurse: config.recurse,
            scheduler: scheduler_for(config),
            max_concurrency: (config.max_concurrency > 0).then_some(config.max_concurrency),
        }
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}

/// Coerce `thing` into a [`Runnable`] with default options.
///
/// `name` overrides the name derived from the function's identity.
pub fn coerce(thing: impl Into<RunnableLike>, name: Option<&str>, trace: bool) -> Result<Runnable> {
    coerce_with(thing, name, &CoerceOptions::default().with_trace(trace))
}

/// Coerce `thing` into a [`Runnable`].
///
/// First match wins: existing invocables pass through unchanged, generator
/// functions become lazy sequences, async functions fill the async slot,
/// sync functions fill the sync slot and get an offloaded async path, maps
/// become fan-outs over their recursively coerced values. Anything else is
/// rejected.
pub fn coerce_with(
    thing: impl Into<RunnableLike>,
    name: Option<&str>,
    options: &CoerceOptions,
) -> Result<Runnable> {
    let runnable = match thing.into() {
        RunnableLike::Runnable(r) => return Ok(r),
        RunnableLike::Invocable(r) => return Ok(Runnable::Custom(r)),
        RunnableLike::Callable(callable) => coerce_callable(callable, name, options),
        RunnableLike::Map(entries) => {
            let branches = entries
                .into_iter()
                .map(|(key, value)| Ok((key, coerce_with(value, None, options)?)))
                .collect::<Result<BTreeMap<_, _>>>()?;
            let mut fan_out = FanOutAdapter::new(branches).with_max_concurrency(options.max_concurrency);
            if let Some(name) = name {
                fan_out = fan_out.with_name(name);
            }
            Runnable::from(fan_out)
        }
        other @ RunnableLike::Value(_) => {
            return Err(StrandError::UnsupportedInvocableType {
                type_name: other.type_name(),
            })
        }
    };
    debug!(name = %runnable.name(), kind = runnable.kind(), "Coerced runnable");
    Ok(runnable)
}

fn coerce_callable(callable: Callable, name: Option<&str>, options: &CoerceOptions) -> Runnable {
    debug!(
        async_callable = is_async_callable(&callable),
        async_generator = is_async_generator(&callable),
        sync_generator = is_sync_generator(&callable),
        accepts_context = accepts_context(&callable),
        "Classifying callable"
    );

    let lazy = |generator: Generator| {
        let adapter = LazySequenceAdapter::new(generator)
            .with_trace(options.trace)
            .with_scheduler(options.scheduler.clone());
        Runnable::from(match name {
            Some(name) => adapter.with_name(name),
            None => adapter,
        })
    };

    let adapter = match callable {
        Callable::Generator(g) => return lazy(Generator::Sync(g)),
        Callable::AsyncGenerator(g) => return lazy(Generator::Async(g)),
        Callable::Async(f) => {
            ExecutionAdapter::from_async(f).with_scheduler(options.scheduler.clone())
        }
        Callable::Sync(f) => ExecutionAdapter::offloaded(f, options.scheduler.clone()),
    };
    let adapter = adapter.with_trace(options.trace).with_recurse(options.recurse);
    Runnable::from(match name {
        Some(name) => adapter.with_name(name),
        None => adapter,
    })
}
