//! Uniform invocation over plain functions, async functions, generators and
//! maps of those.
//!
//! [`coerce`] turns a [`RunnableLike`] into a [`Runnable`]: an
//! [`ExecutionAdapter`] for functions, a [`LazySequenceAdapter`] for
//! generators, or a [`FanOutAdapter`] for maps. Every runnable can be called
//! synchronously with `invoke` or cooperatively with `ainvoke`, and renders
//! itself as a [`strand_graph::Graph`].

pub mod adapter;
pub mod callable;
pub mod coerce;
pub mod fanout;
pub mod lazy;
pub mod predicates;
pub mod runnable;
pub mod scheduler;
pub mod tracer;

pub use adapter::ExecutionAdapter;
pub use callable::{
    AsyncCallable, AsyncGeneratorImpl, AsyncImpl, Callable, GeneratorImpl, SyncCallable, SyncImpl,
};
pub use coerce::{coerce, coerce_with, CoerceOptions, RunnableLike};
pub use fanout::FanOutAdapter;
pub use lazy::{Generator, LazySequenceAdapter};
pub use predicates::{accepts_context, is_async_callable, is_async_generator, is_sync_generator};
pub use runnable::Runnable;
pub use scheduler::{default_scheduler, scheduler_for, InlineScheduler, TokioScheduler};
pub use tracer::{EventTracer, LogTracer};
