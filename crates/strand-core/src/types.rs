use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::TryStreamExt;
use serde_json::{Map, Value};

use crate::error::{Result, StrandError};
use crate::traits::Invocable;

/// Additional keyword values supplied at construction or call time.
pub type Kwargs = Map<String, Value>;

/// What an invocation produces.
pub enum Output {
    /// A plain payload.
    Value(Value),
    /// Another invocable, resolved by the caller when recursion is enabled.
    Runnable(Arc<dyn Invocable>),
    /// A lazily produced sequence of payloads.
    Sequence(Sequence),
    /// Fan-out results keyed like the fan-out's branches.
    Map(BTreeMap<String, Output>),
}

impl Output {
    /// Wrap an invocable as an output.
    pub fn runnable(invocable: impl Invocable) -> Self {
        Self::Runnable(Arc::new(invocable))
    }

    pub fn is_runnable(&self) -> bool {
        matches!(self, Self::Runnable(_))
    }

    /// Borrow the payload if this output is a plain value.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Convert into a JSON value.
    ///
    /// Maps convert to objects recursively. Runnables and sequences are
    /// rejected: sequences must be collected first.
    pub fn into_value(self) -> Result<Value> {
        match self {
            Self::Value(v) => Ok(v),
            Self::Map(entries) => {
                let mut object = Map::new();
                for (key, output) in entries {
                    object.insert(key, output.into_value()?);
                }
                Ok(Value::Object(object))
            }
            Self::Runnable(r) => Err(StrandError::UnresolvedOutput(format!(
                "runnable '{}'",
                r.name()
            ))),
            Self::Sequence(_) => Err(StrandError::UnresolvedOutput(
                "lazy sequence (collect it first)".into(),
            )),
        }
    }

    /// Unwrap a lazy sequence.
    pub fn into_sequence(self) -> Result<Sequence> {
        match self {
            Self::Sequence(seq) => Ok(seq),
            other => Err(StrandError::UnresolvedOutput(format!(
                "expected a lazy sequence, got {}",
                other.kind()
            ))),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Runnable(_) => "runnable",
            Self::Sequence(_) => "sequence",
            Self::Map(_) => "map",
        }
    }
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Runnable(r) => f.debug_tuple("Runnable").field(&r.name()).finish(),
            Self::Sequence(s) => f.debug_tuple("Sequence").field(s).finish(),
            Self::Map(m) => f.debug_tuple("Map").field(m).finish(),
        }
    }
}

/// A realized lazy sequence. Not restartable: consuming it exhausts it.
pub enum Sequence {
    /// Produced by a synchronous generator.
    Iter(Box<dyn Iterator<Item = Result<Value>> + Send>),
    /// Produced asynchronously.
    Stream(BoxStream<'static, Result<Value>>),
}

impl Sequence {
    pub fn from_items<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Result<Value>>,
        I::IntoIter: Send + 'static,
    {
        Self::Iter(Box::new(iter.into_iter()))
    }

    /// Drain a synchronous sequence. Streams must use [`Sequence::collect_async`].
    pub fn collect(self) -> Result<Vec<Value>> {
        match self {
            Self::Iter(iter) => iter.collect(),
            Self::Stream(_) => Err(StrandError::UnresolvedOutput(
                "asynchronous sequence cannot be drained synchronously".into(),
            )),
        }
    }

    pub async fn collect_async(self) -> Result<Vec<Value>> {
        self.into_stream().try_collect().await
    }

    /// View the sequence as a stream. Items of a synchronous sequence are
    /// pulled inline on the polling task.
    pub fn into_stream(self) -> BoxStream<'static, Result<Value>> {
        match self {
            Self::Iter(iter) => Box::pin(stream::iter(iter)),
            Self::Stream(s) => s,
        }
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iter(_) => f.write_str("Iter(..)"),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_into_value() {
        let mut entries = BTreeMap::new();
        entries.insert("a".to_string(), Output::Value(json!(1)));
        entries.insert("b".to_string(), Output::Value(json!("two")));
        let value = Output::Map(entries).into_value().unwrap();
        assert_eq!(value, json!({"a": 1, "b": "two"}));
    }

    #[test]
    fn test_sequence_rejected_as_value() {
        let out = Output::Sequence(Sequence::from_items(vec![Ok(json!(1))]));
        assert!(matches!(
            out.into_value(),
            Err(StrandError::UnresolvedOutput(_))
        ));
    }

    #[test]
    fn test_sync_sequence_collect() {
        let seq = Sequence::from_items(vec![Ok(json!(1)), Ok(json!(2))]);
        assert_eq!(seq.collect().unwrap(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_sequence_collect_stops_at_error() {
        let seq = Sequence::from_items(vec![
            Ok(json!(1)),
            Err(StrandError::invocation("gen", "boom")),
            Ok(json!(3)),
        ]);
        assert!(seq.collect().is_err());
    }

    #[tokio::test]
    async fn test_stream_collect_async() {
        let seq = Sequence::Stream(Box::pin(stream::iter(vec![Ok::<_, StrandError>(json!("x"))])));
        assert_eq!(seq.collect_async().await.unwrap(), vec![json!("x")]);
    }

    #[test]
    fn test_stream_rejects_sync_collect() {
        let seq = Sequence::Stream(Box::pin(stream::empty::<Result<Value>>()));
        assert!(seq.collect().is_err());
    }
}
