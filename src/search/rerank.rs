//! Reranker abstraction and retry decorator.
//!
//! The reranker is an opaque (usually remote cross-encoder) service: given
//! a query and a candidate document list it returns one score per document
//! in the *input* order. [`RetryingReranker`] adds the retry/backoff
//! discipline for transient transport failures.

use crate::Result;
use crate::error::{EmbeddingError, Error};
use std::time::Duration;

/// Default number of retries (total attempts = retries + 1).
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Base unit for the quadratic backoff between attempts.
const BACKOFF_UNIT: Duration = Duration::from_millis(100);

/// Trait for cross-encoder style rerankers.
pub trait Reranker: Send + Sync {
    /// Returns the model identifier.
    fn model(&self) -> &str;

    /// Scores each document against the query.
    ///
    /// The returned scores are positionally aligned with `documents` (not
    /// the provider's sorted order). Empty input yields empty output with
    /// no error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails.
    fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;
}

/// Decorator that retries transient reranker failures.
///
/// Attempts are spaced by a quadratic backoff of `(attempt^2) * 100 ms`.
/// Network errors and 5xx remote statuses are retried; every other error
/// propagates immediately.
pub struct RetryingReranker {
    inner: Box<dyn Reranker>,
    max_retries: usize,
    backoff_unit: Duration,
}

impl RetryingReranker {
    /// Wraps a reranker with the default retry budget.
    #[must_use]
    pub fn new(inner: Box<dyn Reranker>) -> Self {
        Self {
            inner,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: BACKOFF_UNIT,
        }
    }

    /// Overrides the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Overrides the backoff unit. Intended for tests.
    #[must_use]
    pub const fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    fn is_retryable(error: &Error) -> bool {
        if error.is_network_error() {
            return true;
        }
        matches!(
            error,
            Error::Embedding(EmbeddingError::Remote { status, .. }) if *status >= 500
        )
    }
}

impl Reranker for RetryingReranker {
    fn model(&self) -> &str {
        self.inner.model()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        let attempts = self.max_retries + 1;
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                std::thread::sleep(self.backoff_unit * (attempt * attempt) as u32);
            }
            match self.inner.rerank(query, documents) {
                Ok(scores) => return Ok(scores),
                Err(err) if Self::is_retryable(&err) => {
                    tracing::debug!(
                        attempt = attempt + 1,
                        attempts,
                        error = %err,
                        "rerank attempt failed"
                    );
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::Embedding(EmbeddingError::Failed("rerank retries exhausted".to_string()))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedReranker {
        failures: usize,
        calls: AtomicUsize,
        error: fn() -> Error,
    }

    impl Reranker for ScriptedReranker {
        fn model(&self) -> &str {
            "scripted"
        }

        fn rerank(&self, _query: &str, documents: &[String]) -> Result<Vec<f32>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err((self.error)());
            }
            Ok(documents.iter().map(|d| d.len() as f32).collect())
        }
    }

    fn server_error() -> Error {
        Error::Embedding(EmbeddingError::Remote {
            status: 500,
            message: "internal".to_string(),
        })
    }

    fn client_error() -> Error {
        Error::Embedding(EmbeddingError::Remote {
            status: 422,
            message: "bad payload".to_string(),
        })
    }

    #[test]
    fn test_retries_transient_failures() {
        let reranker = RetryingReranker::new(Box::new(ScriptedReranker {
            failures: 2,
            calls: AtomicUsize::new(0),
            error: server_error,
        }))
        .with_backoff_unit(Duration::from_millis(0));

        let scores = reranker
            .rerank("q", &["abc".to_string(), "de".to_string()])
            .unwrap();
        assert_eq!(scores, vec![3.0, 2.0]);
    }

    #[test]
    fn test_exhausts_retry_budget() {
        let inner = ScriptedReranker {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
            error: server_error,
        };
        let reranker = RetryingReranker::new(Box::new(inner))
            .with_max_retries(2)
            .with_backoff_unit(Duration::from_millis(0));

        let err = reranker.rerank("q", &["doc".to_string()]).unwrap_err();
        assert!(matches!(
            err,
            Error::Embedding(EmbeddingError::Remote { status: 500, .. })
        ));
    }

    #[test]
    fn test_non_retryable_error_propagates_immediately() {
        let inner = ScriptedReranker {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
            error: client_error,
        };
        let reranker = RetryingReranker::new(Box::new(inner))
            .with_backoff_unit(Duration::from_millis(0));

        let err = reranker.rerank("q", &["doc".to_string()]).unwrap_err();
        assert!(matches!(
            err,
            Error::Embedding(EmbeddingError::Remote { status: 422, .. })
        ));
    }

    #[test]
    fn test_empty_documents_round_trip() {
        let reranker = RetryingReranker::new(Box::new(ScriptedReranker {
            failures: 0,
            calls: AtomicUsize::new(0),
            error: server_error,
        }));
        let scores = reranker.rerank("q", &[]).unwrap();
        assert!(scores.is_empty());
    }
}
