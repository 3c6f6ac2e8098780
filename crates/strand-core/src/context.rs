use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::traits::Tracer;

/// Remaining hops allowed when a runnable's output is itself a runnable.
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Call-scoped metadata threaded through every invocation.
///
/// A context is never mutated once handed to an invocation. Combining a
/// caller context with an adapter's base context always builds a new value
/// (see [`merge_contexts`]), so concurrent calls sharing one adapter never
/// observe each other's configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Tags attached to this call and every nested call.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form metadata, forwarded to tracers.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Nested overrides consumed by implementations.
    #[serde(default)]
    pub configurable: Map<String, Value>,
    /// Display name for this call only.
    #[serde(default)]
    pub run_name: Option<String>,
    /// Identifier for this call only.
    #[serde(default)]
    pub run_id: Option<Uuid>,
    /// Upper bound on concurrently running fan-out branches.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Remaining recursive resolutions before failing.
    #[serde(default)]
    pub recursion_limit: Option<usize>,
    /// Tracer receiving traced invocations.
    #[serde(skip)]
    pub tracer: Option<Arc<dyn Tracer>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context carrying only the given tags.
    pub fn from_tags(tags: Vec<String>) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_configurable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.configurable.insert(key.into(), value);
        self
    }

    pub fn with_run_name(mut self, name: impl Into<String>) -> Self {
        self.run_name = Some(name.into());
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = Some(limit);
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Look up a nested override.
    pub fn configurable(&self, key: &str) -> Option<&Value> {
        self.configurable.get(key)
    }

    /// Context for resolving a runnable returned by an implementation.
    ///
    /// Starts from the caller's original context and spends one unit of the
    /// recursion budget. Returns `None` once the budget is exhausted.
    pub fn descend(original: Option<&ExecutionContext>) -> Option<ExecutionContext> {
        let mut next = original.cloned().unwrap_or_default();
        let remaining = next.recursion_limit.unwrap_or(DEFAULT_RECURSION_LIMIT);
        if remaining == 0 {
            return None;
        }
        next.recursion_limit = Some(remaining - 1);
        next.run_id = None;
        Some(next)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("tags", &self.tags)
            .field("metadata", &self.metadata)
            .field("configurable", &self.configurable)
            .field("run_name", &self.run_name)
            .field("run_id", &self.run_id)
            .field("max_concurrency", &self.max_concurrency)
            .field("recursion_limit", &self.recursion_limit)
            .field("tracer", &self.tracer.is_some())
            .finish()
    }
}

/// Merge an adapter's base context with a caller-supplied context.
///
/// Caller keys win on collision. Tags concatenate (base first, duplicates
/// skipped). `metadata` and `configurable` merge key by key. `run_id` and
/// `run_name` belong to a single call and are never inherited from the base.
pub fn merge_contexts(
    base: Option<&ExecutionContext>,
    caller: Option<&ExecutionContext>,
) -> ExecutionContext {
    let mut merged = match base {
        Some(base) => ExecutionContext {
            run_id: None,
            run_name: None,
            ..base.clone()
        },
        None => ExecutionContext::default(),
    };

    let Some(caller) = caller else {
        return merged;
    };

    for tag in &caller.tags {
        if !merged.tags.contains(tag) {
            merged.tags.push(tag.clone());
        }
    }
    for (k, v) in &caller.metadata {
        merged.metadata.insert(k.clone(), v.clone());
    }
    for (k, v) in &caller.configurable {
        merged.configurable.insert(k.clone(), v.clone());
    }

    merged.run_name = caller.run_name.clone();
    merged.run_id = caller.run_id;
    if caller.max_concurrency.is_some() {
        merged.max_concurrency = caller.max_concurrency;
    }
    if caller.recursion_limit.is_some() {
        merged.recursion_limit = caller.recursion_limit;
    }
    if caller.tracer.is_some() {
        merged.tracer = caller.tracer.clone();
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_without_base_copies_caller() {
        let caller = ExecutionContext::from_tags(vec!["a".into()]).with_run_name("call");
        let merged = merge_contexts(None, Some(&caller));
        assert_eq!(merged.tags, vec!["a"]);
        assert_eq!(merged.run_name.as_deref(), Some("call"));
    }

    #[test]
    fn test_merge_concatenates_tags() {
        let base = ExecutionContext::from_tags(vec!["base".into(), "shared".into()]);
        let caller = ExecutionContext::from_tags(vec!["shared".into(), "call".into()]);
        let merged = merge_contexts(Some(&base), Some(&caller));
        assert_eq!(merged.tags, vec!["base", "shared", "call"]);
    }

    #[test]
    fn test_merge_caller_wins_on_collision() {
        let base = ExecutionContext::new()
            .with_metadata("model", json!("small"))
            .with_metadata("team", json!("infra"))
            .with_configurable("depth", json!(1))
            .with_max_concurrency(2);
        let caller = ExecutionContext::new()
            .with_metadata("model", json!("large"))
            .with_configurable("depth", json!(3))
            .with_max_concurrency(8);

        let merged = merge_contexts(Some(&base), Some(&caller));
        assert_eq!(merged.metadata.get("model"), Some(&json!("large")));
        assert_eq!(merged.metadata.get("team"), Some(&json!("infra")));
        assert_eq!(merged.configurable("depth"), Some(&json!(3)));
        assert_eq!(merged.max_concurrency, Some(8));
    }

    #[test]
    fn test_merge_keeps_base_scalars_when_caller_unset() {
        let base = ExecutionContext::new().with_recursion_limit(4);
        let merged = merge_contexts(Some(&base), Some(&ExecutionContext::new()));
        assert_eq!(merged.recursion_limit, Some(4));
    }

    #[test]
    fn test_merge_does_not_inherit_run_identity() {
        let mut base = ExecutionContext::new().with_run_name("base-run");
        base.run_id = Some(Uuid::new_v4());
        let merged = merge_contexts(Some(&base), None);
        assert!(merged.run_id.is_none());
        assert!(merged.run_name.is_none());
    }

    #[test]
    fn test_merge_leaves_inputs_untouched() {
        let base = ExecutionContext::from_tags(vec!["base".into()]);
        let caller = ExecutionContext::from_tags(vec!["call".into()]);
        let _ = merge_contexts(Some(&base), Some(&caller));
        assert_eq!(base.tags, vec!["base"]);
        assert_eq!(caller.tags, vec!["call"]);
    }

    #[test]
    fn test_descend_spends_budget() {
        let ctx = ExecutionContext::new().with_recursion_limit(1);
        let next = ExecutionContext::descend(Some(&ctx)).unwrap();
        assert_eq!(next.recursion_limit, Some(0));
        assert!(ExecutionContext::descend(Some(&next)).is_none());
    }

    #[test]
    fn test_descend_defaults_budget() {
        let next = ExecutionContext::descend(None).unwrap();
        assert_eq!(next.recursion_limit, Some(DEFAULT_RECURSION_LIMIT - 1));
    }

    #[test]
    fn test_serialization_skips_tracer() {
        let ctx = ExecutionContext::from_tags(vec!["x".into()]).with_configurable("k", json!(true));
        let json = serde_json::to_string(&ctx).unwrap();
        let parsed: ExecutionContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.tags, vec!["x"]);
        assert_eq!(parsed.configurable("k"), Some(&json!(true)));
        assert!(parsed.tracer.is_none());
    }
}
