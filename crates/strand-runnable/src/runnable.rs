use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use strand_core::context::ExecutionContext;
use strand_core::error::Result;
use strand_core::traits::Invocable;
use strand_core::types::{Kwargs, Output};
use strand_graph::Graph;

use crate::adapter::ExecutionAdapter;
use crate::fanout::FanOutAdapter;
use crate::lazy::LazySequenceAdapter;

/// The uniform result of coercion.
///
/// Which variant a value becomes is decided once, when it is coerced; the
/// call path never re-inspects the wrapped value's shape.
#[derive(Clone)]
pub enum Runnable {
    Adapter(Arc<ExecutionAdapter>),
    Sequence(Arc<LazySequenceAdapter>),
    FanOut(Arc<FanOutAdapter>),
    /// An invocable that was already uniform and is passed through as-is.
    Custom(Arc<dyn Invocable>),
}

impl Runnable {
    fn inner(&self) -> &dyn Invocable {
        match self {
            Self::Adapter(r) => &**r,
            Self::Sequence(r) => &**r,
            Self::FanOut(r) => &**r,
            Self::Custom(r) => &**r,
        }
    }

    /// Short label for the variant, used in graph node data.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Adapter(_) => "adapter",
            Self::Sequence(_) => "sequence",
            Self::FanOut(_) => "fan_out",
            Self::Custom(_) => "custom",
        }
    }

    pub fn into_invocable(self) -> Arc<dyn Invocable> {
        match self {
            Self::Adapter(r) => r as Arc<dyn Invocable>,
            Self::Sequence(r) => r as Arc<dyn Invocable>,
            Self::FanOut(r) => r as Arc<dyn Invocable>,
            Self::Custom(r) => r,
        }
    }

    /// Wrap as an [`Output`], for implementations that return the next step.
    pub fn into_output(self) -> Output {
        Output::Runnable(self.into_invocable())
    }

    /// Structural graph of this runnable.
    ///
    /// A single runnable renders as `input -> runnable -> output`. A fan-out
    /// renders each branch's graph between a shared input and output, with
    /// the branch's own input/output trimmed and its nodes merged under the
    /// branch key.
    pub fn get_graph(&self) -> Result<Graph> {
        let mut graph = Graph::new();
        let input = graph.add_node(schema(format!("{}Input", self.name())), None)?;

        match self {
            Self::FanOut(fan) => {
                let output = graph.add_node(schema(format!("{}Output", self.name())), None)?;
                for (key, branch) in fan.branches() {
                    let mut sub = branch.get_graph()?;
                    sub.trim_first_node();
                    sub.trim_last_node();
                    match graph.extend(&sub, key) {
                        (Some(first), Some(last)) => {
                            graph.add_edge(&input.id, &first.id, None, false)?;
                            graph.add_edge(&last.id, &output.id, None, false)?;
                        }
                        _ => {
                            graph.add_edge(&input.id, &output.id, None, false)?;
                        }
                    }
                }
            }
            _ => {
                let node = graph.add_node(
                    json!({"name": self.name(), "kind": "runnable", "variant": self.kind()}),
                    None,
                )?;
                let output = graph.add_node(schema(format!("{}Output", self.name())), None)?;
                graph.add_edge(&input.id, &node.id, None, false)?;
                graph.add_edge(&node.id, &output.id, None, false)?;
            }
        }
        Ok(graph)
    }
}

fn schema(name: String) -> Value {
    json!({"name": name, "kind": "schema"})
}

impl Invocable for Runnable {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn invoke(
        &self,
        input: Value,
        context: Option<&ExecutionContext>,
        kwargs: Kwargs,
    ) -> Result<Output> {
        self.inner().invoke(input, context, kwargs)
    }

    fn ainvoke<'a>(
        &'a self,
        input: Value,
        context: Option<&'a ExecutionContext>,
        kwargs: Kwargs,
    ) -> BoxFuture<'a, Result<Output>> {
        self.inner().ainvoke(input, context, kwargs)
    }
}

impl From<ExecutionAdapter> for Runnable {
    fn from(adapter: ExecutionAdapter) -> Self {
        Self::Adapter(Arc::new(adapter))
    }
}

impl From<LazySequenceAdapter> for Runnable {
    fn from(adapter: LazySequenceAdapter) -> Self {
        Self::Sequence(Arc::new(adapter))
    }
}

impl From<FanOutAdapter> for Runnable {
    fn from(adapter: FanOutAdapter) -> Self {
        Self::FanOut(Arc::new(adapter))
    }
}

impl fmt::Debug for Runnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adapter(r) => fmt::Debug::fmt(r, f),
            Self::Sequence(r) => fmt::Debug::fmt(r, f),
            Self::FanOut(r) => fmt::Debug::fmt(r, f),
            Self::Custom(r) => write!(f, "Custom({})", r.name()),
        }
    }
}
