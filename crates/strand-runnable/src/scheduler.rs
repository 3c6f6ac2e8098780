use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::warn;

use strand_core::config::{ExecutorConfig, IsolationMode};
use strand_core::error::{Result, StrandError};
use strand_core::traits::{BlockingJob, Isolation, Scheduler};
use strand_core::types::Output;

/// Scheduler backed by the ambient Tokio runtime.
///
/// Blocking jobs go to Tokio's blocking pool, optionally capped by a
/// semaphore. Isolated work is spawned as its own task. Outside a runtime
/// both degrade to inline execution.
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler {
    blocking_permits: Option<Arc<Semaphore>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow at most `limit` blocking jobs to run at once.
    pub fn with_blocking_limit(limit: usize) -> Self {
        Self {
            blocking_permits: (limit > 0).then(|| Arc::new(Semaphore::new(limit))),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn run_blocking(&self, job: BlockingJob) -> BoxFuture<'static, Result<Output>> {
        let permits = self.blocking_permits.clone();
        Box::pin(async move {
            if Handle::try_current().is_err() {
                return job();
            }
            let _permit = match permits {
                Some(permits) => Some(
                    permits
                        .acquire_owned()
                        .await
                        .map_err(|e| StrandError::TaskJoin(e.to_string()))?,
                ),
                None => None,
            };
            tokio::task::spawn_blocking(job)
                .await
                .map_err(|e| StrandError::TaskJoin(e.to_string()))?
        })
    }

    fn isolation(&self) -> Isolation {
        if Handle::try_current().is_ok() {
            Isolation::Spawn
        } else {
            Isolation::Inline
        }
    }

    fn spawn_isolated(
        &self,
        work: BoxFuture<'static, Result<Output>>,
    ) -> BoxFuture<'static, Result<Output>> {
        Box::pin(async move {
            match Handle::try_current() {
                Ok(handle) => handle
                    .spawn(work)
                    .await
                    .map_err(|e| StrandError::TaskJoin(e.to_string()))?,
                Err(_) => {
                    warn!("No async runtime available, running isolated work inline");
                    work.await
                }
            }
        })
    }
}

/// Scheduler without isolated spawning: async work runs on the caller's
/// task. Blocking jobs still go to the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct InlineScheduler {
    blocking: TokioScheduler,
}

impl InlineScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow at most `limit` blocking jobs to run at once.
    pub fn with_blocking_limit(limit: usize) -> Self {
        Self {
            blocking: TokioScheduler::with_blocking_limit(limit),
        }
    }
}

impl Scheduler for InlineScheduler {
    fn run_blocking(&self, job: BlockingJob) -> BoxFuture<'static, Result<Output>> {
        self.blocking.run_blocking(job)
    }

    fn isolation(&self) -> Isolation {
        Isolation::Inline
    }

    fn spawn_isolated(
        &self,
        work: BoxFuture<'static, Result<Output>>,
    ) -> BoxFuture<'static, Result<Output>> {
        work
    }
}

/// Build the scheduler described by `config`.
pub fn scheduler_for(config: &ExecutorConfig) -> Arc<dyn Scheduler> {
    match config.isolation {
        IsolationMode::Spawn => Arc::new(TokioScheduler::with_blocking_limit(
            config.max_blocking_threads,
        )),
        IsolationMode::Inline => Arc::new(InlineScheduler::with_blocking_limit(
            config.max_blocking_threads,
        )),
    }
}

/// The scheduler used when none is configured.
pub fn default_scheduler() -> Arc<dyn Scheduler> {
    Arc::new(TokioScheduler::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_blocking_leaves_runtime_thread() {
        let scheduler = TokioScheduler::new();
        let caller = std::thread::current().id();
        let out = scheduler
            .run_blocking(Box::new(move || {
                let same = std::thread::current().id() == caller;
                Ok(Output::Value(json!(same)))
            }))
            .await
            .unwrap();
        assert_eq!(out.as_value(), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_blocking_limit_still_completes() {
        let scheduler = TokioScheduler::with_blocking_limit(1);
        let jobs = (0..4).map(|i| {
            scheduler.run_blocking(Box::new(move || Ok(Output::Value(json!(i)))))
        });
        let results = futures::future::try_join_all(jobs).await.unwrap();
        assert_eq!(results.len(), 4);
    }

    async fn explode() -> Result<Output> {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_spawned_panic_becomes_error() {
        let scheduler = TokioScheduler::new();
        let err = scheduler
            .spawn_isolated(Box::pin(explode()))
            .await
            .unwrap_err();
        assert!(matches!(err, StrandError::TaskJoin(_)));
    }

    #[test]
    fn test_degrades_outside_runtime() {
        let scheduler = TokioScheduler::new();
        assert_eq!(scheduler.isolation(), Isolation::Inline);
        let out = futures::executor::block_on(
            scheduler.run_blocking(Box::new(|| Ok(Output::Value(json!("inline"))))),
        )
        .unwrap();
        assert_eq!(out.as_value(), Some(&json!("inline")));
    }

    #[tokio::test]
    async fn test_isolation_inside_runtime() {
        assert_eq!(TokioScheduler::new().isolation(), Isolation::Spawn);
        assert_eq!(InlineScheduler::new().isolation(), Isolation::Inline);
    }

    #[test]
    fn test_scheduler_for_config() {
        let config = ExecutorConfig {
            isolation: IsolationMode::Inline,
            ..ExecutorConfig::default()
        };
        assert_eq!(scheduler_for(&config).isolation(), Isolation::Inline);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_inline_scheduler_still_offloads_blocking_jobs() {
        let scheduler = InlineScheduler::new();
        let caller = std::thread::current().id();
        let out = scheduler
            .run_blocking(Box::new(move || {
                let same = std::thread::current().id() == caller;
                Ok(Output::Value(json!(same)))
            }))
            .await
            .unwrap();
        assert_eq!(out.as_value(), Some(&json!(false)));
    }
}
