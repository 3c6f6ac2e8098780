//! Capability predicates used to pick an adapter at coercion time.

use crate::callable::Callable;

/// True if calling the value is asynchronous, whether it was declared as an
/// async function or is an object with an async call entry point.
pub fn is_async_callable(value: &Callable) -> bool {
    matches!(value, Callable::Async(_))
}

/// True if calling the value yields an asynchronously produced sequence.
pub fn is_async_generator(value: &Callable) -> bool {
    matches!(value, Callable::AsyncGenerator(_))
}

/// True if calling the value yields a synchronously produced sequence.
pub fn is_sync_generator(value: &Callable) -> bool {
    matches!(value, Callable::Generator(_))
}

/// True if the value declares that it takes the call context.
pub fn accepts_context(value: &Callable) -> bool {
    match value {
        Callable::Sync(f) => f.accepts_context(),
        Callable::Async(f) => f.accepts_context(),
        Callable::Generator(f) => f.accepts_context(),
        Callable::AsyncGenerator(f) => f.accepts_context(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::{json, Value};
    use strand_core::error::{Result, StrandError};

    async fn fetch(input: Value) -> Result<Value> {
        Ok(input)
    }

    #[test]
    fn test_sync_function() {
        let f = Callable::sync(|x: Value| Ok(x));
        assert!(!is_async_callable(&f));
        assert!(!is_async_generator(&f));
        assert!(!is_sync_generator(&f));
        assert!(!accepts_context(&f));
    }

    #[test]
    fn test_async_function() {
        let f = Callable::from_async(fetch);
        assert!(is_async_callable(&f));
        assert!(!is_async_generator(&f));
    }

    #[test]
    fn test_generators() {
        let g = Callable::generator(|_: Value| vec![Ok::<_, StrandError>(json!(1))]);
        assert!(is_sync_generator(&g));
        assert!(!is_async_callable(&g));

        let ag = Callable::async_generator(|_: Value| stream::iter(vec![Ok::<_, StrandError>(json!(1))]));
        assert!(is_async_generator(&ag));
        assert!(!is_async_callable(&ag));
    }
}
