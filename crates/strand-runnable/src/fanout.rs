use std::collections::BTreeMap;
use std::fmt;

use futures::future::{self, BoxFuture};
use futures::stream::{self, StreamExt, TryStreamExt};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde_json::Value;
use tracing::debug;

use strand_core::context::ExecutionContext;
use strand_core::error::{Result, StrandError};
use strand_core::traits::Invocable;
use strand_core::types::{Kwargs, Output};

use crate::runnable::Runnable;

/// Invokes every branch with the same input and joins the results into a
/// map with the same keys.
///
/// Any branch failure fails the whole call. Results of branches that
/// already finished are discarded, never cached.
pub struct FanOutAdapter {
    name: String,
    branches: BTreeMap<String, Runnable>,
    max_concurrency: Option<usize>,
}

impl FanOutAdapter {
    pub fn new(branches: BTreeMap<String, Runnable>) -> Self {
        let name = format!(
            "FanOut<{}>",
            branches.keys().map(String::as_str).collect::<Vec<_>>().join(",")
        );
        Self {
            name,
            branches,
            max_concurrency: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Cap on concurrently running branches when the call context sets none.
    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit.filter(|n| *n > 0);
        self
    }

    pub fn branches(&self) -> &BTreeMap<String, Runnable> {
        &self.branches
    }

    fn concurrency(&self, context: Option<&ExecutionContext>) -> Option<usize> {
        context
            .and_then(|c| c.max_concurrency)
            .filter(|n| *n > 0)
            .or(self.max_concurrency)
    }
}

impl Invocable for FanOutAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(
        &self,
        input: Value,
        context: Option<&ExecutionContext>,
        _kwargs: Kwargs,
    ) -> Result<Output> {
        let limit = self.concurrency(context);
        debug!(name = %self.name, branches = self.branches.len(), ?limit, "Fanning out");
        let run_all = || {
            self.branches
                .par_iter()
                .map(|(key, branch)| -> Result<(String, Output)> {
                    let output = branch.invoke(input.clone(), context, Kwargs::new())?;
                    Ok((key.clone(), output))
                })
                .collect::<Result<BTreeMap<String, Output>>>()
        };

        let joined = match limit {
            Some(limit) => ThreadPoolBuilder::new()
                .num_threads(limit)
                .thread_name(|i| format!("strand-fanout-{i}"))
                .build()
                .map_err(|e| StrandError::TaskJoin(e.to_string()))?
                .install(run_all)?,
            None => run_all()?,
        };
        Ok(Output::Map(joined))
    }

    fn ainvoke<'a>(
        &'a self,
        input: Value,
        context: Option<&'a ExecutionContext>,
        _kwargs: Kwargs,
    ) -> BoxFuture<'a, Result<Output>> {
        Box::pin(async move {
            let calls: Vec<BoxFuture<'a, Result<(String, Output)>>> = self
                .branches
                .iter()
                .map(|(key, branch)| {
                    let (key, branch, input) = (key.clone(), branch.clone(), input.clone());
                    Box::pin(async move {
                        let output = branch.ainvoke(input, context, Kwargs::new()).await?;
                        Ok::<_, StrandError>((key, output))
                    }) as BoxFuture<'a, Result<(String, Output)>>
                })
                .collect();

            let joined: Vec<(String, Output)> = match self.concurrency(context) {
                Some(limit) => {
                    debug!(name = %self.name, limit, "Fanning out with concurrency limit");
                    stream::iter(calls).buffer_unordered(limit).try_collect().await?
                }
                None => future::try_join_all(calls).await?,
            };
            Ok(Output::Map(joined.into_iter().collect()))
        })
    }
}

impl fmt::Debug for FanOutAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanOutAdapter")
            .field("name", &self.name)
            .field("branches", &self.branches.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use strand_test_utils::CallCounter;

    use crate::adapter::ExecutionAdapter;
    use crate::callable::{AsyncImpl, SyncImpl};

    fn inc(x: Value) -> Result<Value> {
        Ok(json!(x.as_i64().unwrap_or(0) + 1))
    }

    fn square(x: Value) -> Result<Value> {
        let n = x.as_i64().unwrap_or(0);
        Ok(json!(n * n))
    }

    fn fail(_: Value) -> Result<Value> {
        Err(StrandError::invocation("fail", "branch exploded"))
    }

    fn branch(f: fn(Value) -> Result<Value>) -> Runnable {
        Runnable::Adapter(Arc::new(ExecutionAdapter::from_sync(SyncImpl::new(f))))
    }

    fn fan(entries: Vec<(&str, Runnable)>) -> FanOutAdapter {
        FanOutAdapter::new(
            entries
                .into_iter()
                .map(|(k, r)| (k.to_string(), r))
                .collect(),
        )
    }

    #[test]
    fn test_invoke_joins_by_key() {
        let adapter = fan(vec![("a", branch(inc)), ("b", branch(square))]);
        let out = adapter.invoke(json!(3), None, Kwargs::new()).unwrap();
        assert_eq!(out.into_value().unwrap(), json!({"a": 4, "b": 9}));
        assert_eq!(adapter.name(), "FanOut<a,b>");
    }

    #[test]
    fn test_invoke_branch_failure_fails_whole_call() {
        let adapter = fan(vec![("a", branch(fail)), ("b", branch(square))]);
        let err = adapter.invoke(json!(3), None, Kwargs::new()).unwrap_err();
        assert!(err.to_string().contains("branch exploded"));
    }

    #[tokio::test]
    async fn test_ainvoke_joins_by_key() {
        let adapter = fan(vec![("a", branch(inc)), ("b", branch(square))]);
        let out = adapter.ainvoke(json!(4), None, Kwargs::new()).await.unwrap();
        assert_eq!(out.into_value().unwrap(), json!({"a": 5, "b": 16}));
    }

    #[tokio::test]
    async fn test_ainvoke_branch_failure_discards_results() {
        let adapter = fan(vec![("a", branch(inc)), ("z", branch(fail))]);
        let err = adapter.ainvoke(json!(1), None, Kwargs::new()).await.unwrap_err();
        assert!(matches!(err, StrandError::Invocation { .. }));
    }

    #[tokio::test]
    async fn test_context_concurrency_limit_is_honored() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let make = || {
            let (running, peak) = (running.clone(), peak.clone());
            Runnable::Adapter(Arc::new(
                ExecutionAdapter::from_async(AsyncImpl::new(move |x: Value| {
                    let (running, peak) = (running.clone(), peak.clone());
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, StrandError>(x)
                    }
                }))
                .with_trace(false),
            ))
        };
        let adapter = fan(vec![("a", make()), ("b", make()), ("c", make()), ("d", make())]);
        let ctx = ExecutionContext::new().with_max_concurrency(1);
        let out = adapter.ainvoke(json!(7), Some(&ctx), Kwargs::new()).await.unwrap();

        assert_eq!(out.into_value().unwrap(), json!({"a": 7, "b": 7, "c": 7, "d": 7}));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    fn tracked_sleeper(running: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>) -> Runnable {
        let (running, peak) = (running.clone(), peak.clone());
        Runnable::Adapter(Arc::new(
            ExecutionAdapter::from_sync(SyncImpl::new(move |x: Value| -> Result<Value> {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(50));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(x)
            }))
            .with_trace(false),
        ))
    }

    #[test]
    fn test_invoke_context_concurrency_limit_is_honored() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let adapter = fan(
            ["a", "b", "c", "d"]
                .into_iter()
                .map(|k| (k, tracked_sleeper(&running, &peak)))
                .collect(),
        );
        let ctx = ExecutionContext::new().with_max_concurrency(1);
        let out = adapter.invoke(json!(2), Some(&ctx), Kwargs::new()).unwrap();

        assert_eq!(out.into_value().unwrap(), json!({"a": 2, "b": 2, "c": 2, "d": 2}));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invoke_adapter_default_limit_applies() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let adapter = fan(
            ["a", "b", "c", "d"]
                .into_iter()
                .map(|k| (k, tracked_sleeper(&running, &peak)))
                .collect(),
        )
        .with_max_concurrency(Some(2));
        adapter.invoke(json!(0), None, Kwargs::new()).unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failed_branch_runs_once() {
        let calls = Arc::new(CallCounter::default());
        let counted = calls.clone();
        let flaky = Runnable::Adapter(Arc::new(ExecutionAdapter::from_sync(SyncImpl::new(
            move |_: Value| -> Result<Value> {
                counted.hit();
                Err(StrandError::invocation("flaky", "gave up"))
            },
        ))));
        let adapter = fan(vec![("ok", branch(inc)), ("flaky", flaky)]);

        assert!(adapter.invoke(json!(1), None, Kwargs::new()).is_err());
        assert_eq!(calls.count(), 1);
        assert!(adapter.ainvoke(json!(1), None, Kwargs::new()).await.is_err());
        assert_eq!(calls.count(), 2);
    }

    #[test]
    fn test_branches_share_caller_context() {
        let tags = || {
            Runnable::Adapter(Arc::new(ExecutionAdapter::from_sync(SyncImpl::with_context(
                |_: Value, ctx: &ExecutionContext, _: &Kwargs| Ok(json!(ctx.tags.clone())),
            ))))
        };
        let adapter = fan(vec![("x", tags()), ("y", tags())]);
        let ctx = ExecutionContext::from_tags(vec!["shared".into()]);
        let out = adapter.invoke(json!(null), Some(&ctx), Kwargs::new()).unwrap();
        assert_eq!(
            out.into_value().unwrap(),
            json!({"x": ["shared"], "y": ["shared"]})
        );
    }
}
