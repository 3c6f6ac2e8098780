use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{BoxStream, Stream};
use serde_json::Value;

use strand_core::context::ExecutionContext;
use strand_core::error::Result;
use strand_core::types::{Kwargs, Output, Sequence};

type SyncCall = dyn Fn(Value, Option<&ExecutionContext>, &Kwargs) -> Result<Output> + Send + Sync;
type AsyncCall =
    dyn Fn(Value, Option<ExecutionContext>, Kwargs) -> BoxFuture<'static, Result<Output>> + Send + Sync;
type GeneratorCall = dyn Fn(Value, Option<&ExecutionContext>) -> Result<Sequence> + Send + Sync;
type AsyncGeneratorCall =
    dyn Fn(Value, Option<ExecutionContext>) -> BoxStream<'static, Result<Value>> + Send + Sync;

/// Name of a function or callable object, or `None` for closures and
/// function pointers.
pub(crate) fn identity_name<F: ?Sized>() -> Option<String> {
    let full = std::any::type_name::<F>();
    if full.contains("{{closure}}") || full.starts_with("fn(") {
        return None;
    }
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().map(str::to_string)
}

/// An object whose call entry point is synchronous.
pub trait SyncCallable: Send + Sync + 'static {
    fn call(&self, input: Value, context: &ExecutionContext, kwargs: &Kwargs) -> Result<Output>;
}

/// An object whose call entry point is asynchronous.
pub trait AsyncCallable: Send + Sync + 'static {
    fn call(
        &self,
        input: Value,
        context: ExecutionContext,
        kwargs: Kwargs,
    ) -> BoxFuture<'_, Result<Output>>;
}

/// A synchronous implementation.
#[derive(Clone)]
pub struct SyncImpl {
    func: Arc<SyncCall>,
    name: Option<String>,
    accepts_context: bool,
}

impl SyncImpl {
    /// Wrap `fn(input)`.
    pub fn new<F, O>(f: F) -> Self
    where
        F: Fn(Value) -> Result<O> + Send + Sync + 'static,
        O: Into<Output>,
    {
        Self {
            func: Arc::new(move |input: Value, _: Option<&ExecutionContext>, _: &Kwargs| {
                f(input).map(Into::into)
            }),
            name: identity_name::<F>(),
            accepts_context: false,
        }
    }

    /// Wrap `fn(input, kwargs)`.
    pub fn with_args<F, O>(f: F) -> Self
    where
        F: Fn(Value, &Kwargs) -> Result<O> + Send + Sync + 'static,
        O: Into<Output>,
    {
        Self {
            func: Arc::new(move |input: Value, _: Option<&ExecutionContext>, kwargs: &Kwargs| {
                f(input, kwargs).map(Into::into)
            }),
            name: identity_name::<F>(),
            accepts_context: false,
        }
    }

    /// Wrap `fn(input, context, kwargs)`; the merged context is passed in.
    pub fn with_context<F, O>(f: F) -> Self
    where
        F: Fn(Value, &ExecutionContext, &Kwargs) -> Result<O> + Send + Sync + 'static,
        O: Into<Output>,
    {
        Self {
            func: Arc::new(move |input: Value, context: Option<&ExecutionContext>, kwargs: &Kwargs| {
                let out = match context {
                    Some(context) => f(input, context, kwargs),
                    None => f(input, &ExecutionContext::default(), kwargs),
                };
                out.map(Into::into)
            }),
            name: identity_name::<F>(),
            accepts_context: true,
        }
    }

    /// Wrap an object implementing [`SyncCallable`].
    pub fn from_object<T: SyncCallable>(object: Arc<T>) -> Self {
        Self {
            func: Arc::new(move |input: Value, context: Option<&ExecutionContext>, kwargs: &Kwargs| match context {
                Some(context) => object.call(input, context, kwargs),
                None => object.call(input, &ExecutionContext::default(), kwargs),
            }),
            name: identity_name::<T>(),
            accepts_context: true,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn accepts_context(&self) -> bool {
        self.accepts_context
    }

    /// Call, passing `context` only if the implementation declares it.
    pub fn call(&self, input: Value, context: &ExecutionContext, kwargs: &Kwargs) -> Result<Output> {
        (self.func)(input, self.accepts_context.then_some(context), kwargs)
    }

    pub(crate) fn raw(&self) -> Arc<SyncCall> {
        self.func.clone()
    }
}

/// An asynchronous implementation.
#[derive(Clone)]
pub struct AsyncImpl {
    func: Arc<AsyncCall>,
    name: Option<String>,
    accepts_context: bool,
}

impl AsyncImpl {
    /// Wrap `async fn(input)`.
    pub fn new<F, Fut, O>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
        O: Into<Output>,
    {
        Self {
            func: Arc::new(move |input: Value, _: Option<ExecutionContext>, _: Kwargs| -> BoxFuture<'static, Result<Output>> {
                let fut = f(input);
                Box::pin(async move { fut.await.map(Into::into) })
            }),
            name: identity_name::<F>(),
            accepts_context: false,
        }
    }

    /// Wrap `async fn(input, context, kwargs)`; the merged context is passed in.
    pub fn with_context<F, Fut, O>(f: F) -> Self
    where
        F: Fn(Value, ExecutionContext, Kwargs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
        O: Into<Output>,
    {
        Self {
            func: Arc::new(move |input: Value, context: Option<ExecutionContext>, kwargs: Kwargs| -> BoxFuture<'static, Result<Output>> {
                let fut = f(input, context.unwrap_or_default(), kwargs);
                Box::pin(async move { fut.await.map(Into::into) })
            }),
            name: identity_name::<F>(),
            accepts_context: true,
        }
    }

    /// Wrap an object implementing [`AsyncCallable`].
    pub fn from_object<T: AsyncCallable>(object: Arc<T>) -> Self {
        Self {
            func: Arc::new(move |input: Value, context: Option<ExecutionContext>, kwargs: Kwargs| -> BoxFuture<'static, Result<Output>> {
                let object = object.clone();
                Box::pin(async move {
                    object
                        .call(input, context.unwrap_or_default(), kwargs)
                        .await
                })
            }),
            name: identity_name::<T>(),
            accepts_context: true,
        }
    }

    /// Build from a raw call, preserving another implementation's contract.
    pub(crate) fn from_raw(func: Arc<AsyncCall>, name: Option<String>, accepts_context: bool) -> Self {
        Self {
            func,
            name,
            accepts_context,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn accepts_context(&self) -> bool {
        self.accepts_context
    }

    /// Start the call, passing `context` only if the implementation declares it.
    pub fn call(
        &self,
        input: Value,
        context: &ExecutionContext,
        kwargs: Kwargs,
    ) -> BoxFuture<'static, Result<Output>> {
        (self.func)(input, self.accepts_context.then(|| context.clone()), kwargs)
    }
}

/// A synchronous generator function.
#[derive(Clone)]
pub struct GeneratorImpl {
    func: Arc<GeneratorCall>,
    name: Option<String>,
    accepts_context: bool,
}

impl GeneratorImpl {
    pub fn new<F, I>(f: F) -> Self
    where
        F: Fn(Value) -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Result<Value>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            func: Arc::new(move |input: Value, _: Option<&ExecutionContext>| {
                Ok(Sequence::from_items(f(input)))
            }),
            name: identity_name::<F>(),
            accepts_context: false,
        }
    }

    pub fn with_context<F, I>(f: F) -> Self
    where
        F: Fn(Value, &ExecutionContext) -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Result<Value>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            func: Arc::new(move |input: Value, context: Option<&ExecutionContext>| {
                let items = match context {
                    Some(context) => f(input, context),
                    None => f(input, &ExecutionContext::default()),
                };
                Ok(Sequence::from_items(items))
            }),
            name: identity_name::<F>(),
            accepts_context: true,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn accepts_context(&self) -> bool {
        self.accepts_context
    }

    /// Produce a fresh sequence.
    pub fn call(&self, input: Value, context: &ExecutionContext) -> Result<Sequence> {
        (self.func)(input, self.accepts_context.then_some(context))
    }
}

/// An asynchronous generator function.
#[derive(Clone)]
pub struct AsyncGeneratorImpl {
    func: Arc<AsyncGeneratorCall>,
    name: Option<String>,
    accepts_context: bool,
}

impl AsyncGeneratorImpl {
    pub fn new<F, S>(f: F) -> Self
    where
        F: Fn(Value) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Value>> + Send + 'static,
    {
        Self {
            func: Arc::new(move |input: Value, _: Option<ExecutionContext>| -> BoxStream<'static, Result<Value>> {
                Box::pin(f(input))
            }),
            name: identity_name::<F>(),
            accepts_context: false,
        }
    }

    pub fn with_context<F, S>(f: F) -> Self
    where
        F: Fn(Value, ExecutionContext) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Value>> + Send + 'static,
    {
        Self {
            func: Arc::new(move |input: Value, context: Option<ExecutionContext>| -> BoxStream<'static, Result<Value>> {
                Box::pin(f(input, context.unwrap_or_default()))
            }),
            name: identity_name::<F>(),
            accepts_context: true,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn accepts_context(&self) -> bool {
        self.accepts_context
    }

    /// Produce a fresh sequence.
    pub fn call(&self, input: Value, context: &ExecutionContext) -> Sequence {
        Sequence::Stream((self.func)(input, self.accepts_context.then(|| context.clone())))
    }
}

/// A raw callable value, classified by shape.
#[derive(Clone)]
pub enum Callable {
    Sync(SyncImpl),
    Async(AsyncImpl),
    Generator(GeneratorImpl),
    AsyncGenerator(AsyncGeneratorImpl),
}

impl Callable {
    pub fn sync<F, O>(f: F) -> Self
    where
        F: Fn(Value) -> Result<O> + Send + Sync + 'static,
        O: Into<Output>,
    {
        Self::Sync(SyncImpl::new(f))
    }

    pub fn from_async<F, Fut, O>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
        O: Into<Output>,
    {
        Self::Async(AsyncImpl::new(f))
    }

    pub fn generator<F, I>(f: F) -> Self
    where
        F: Fn(Value) -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Result<Value>>,
        I::IntoIter: Send + 'static,
    {
        Self::Generator(GeneratorImpl::new(f))
    }

    pub fn async_generator<F, S>(f: F) -> Self
    where
        F: Fn(Value) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Value>> + Send + 'static,
    {
        Self::AsyncGenerator(AsyncGeneratorImpl::new(f))
    }

    /// Name derived from the function's identity, if it has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Sync(f) => f.name(),
            Self::Async(f) => f.name(),
            Self::Generator(f) => f.name(),
            Self::AsyncGenerator(f) => f.name(),
        }
    }
}

impl From<SyncImpl> for Callable {
    fn from(f: SyncImpl) -> Self {
        Self::Sync(f)
    }
}

impl From<AsyncImpl> for Callable {
    fn from(f: AsyncImpl) -> Self {
        Self::Async(f)
    }
}
