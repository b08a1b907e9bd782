//! Per-run memoization of expensive lookups.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::Mutex;
use tracing::trace;

use sellerreport_shared::Result;

/// Caches successful lookups by key for the lifetime of one source instance.
///
/// Failed lookups are not cached. The lock is held while a lookup runs, so a
/// key is never computed twice even by concurrent callers.
#[derive(Debug)]
pub struct Memo<V> {
    entries: Mutex<HashMap<String, V>>,
}

impl<V: Clone> Memo<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, or run `lookup` and cache its result.
    pub async fn get_or_try_insert_with<F, Fut>(&self, key: &str, lookup: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(value) = entries.get(key) {
            trace!(key, "memo hit");
            return Ok(value.clone());
        }

        let value = lookup().await?;
        entries.insert(key.to_string(), value.clone());
        Ok(value)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl<V: Clone> Default for Memo<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sellerreport_shared::ReportError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn same_key_is_looked_up_once() {
        let memo = Memo::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = memo
                .get_or_try_insert_with("42", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("mug".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "mug");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(memo.len().await, 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let memo: Memo<String> = Memo::new();
        let err = memo
            .get_or_try_insert_with("1", || async { Err(ReportError::parse("boom")) })
            .await;
        assert!(err.is_err());

        let ok = memo
            .get_or_try_insert_with("1", || async { Ok("later".to_string()) })
            .await
            .unwrap();
        assert_eq!(ok, "later");
    }
}
