use std::{collections::HashMap, future::Future, hash::Hash, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::foundation::error::{MatrixError, MatrixResult};

pub const MAX_ATTEMPTS: usize = 3;

/// How long a board waits for its preload: half its render delay.
pub fn preload_deadline(render_delay: Duration) -> Duration {
    render_delay / 2
}

/// Call `fetch` until it succeeds, at most `attempts` times, retrying immediately.
///
/// Cancellation is never retried: a canceled token or a cancellation error from
/// `fetch` ends the loop with [`MatrixError::Canceled`].
pub async fn fetch_with_retry<T, F, Fut>(
    cancel: &CancellationToken,
    attempts: usize,
    mut fetch: F,
) -> MatrixResult<T>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = MatrixResult<T>>,
{
    let mut last_err = None;
    for attempt in 1..=attempts.max(1) {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MatrixError::Canceled),
            r = fetch(cancel.clone()) => r,
        };
        match result {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "fetch succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_cancellation() => return Err(MatrixError::Canceled),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "fetch failed");
                last_err = Some(e);
            }
        }
    }

    let attempts = attempts.max(1);
    Err(MatrixError::fetch(match last_err {
        Some(e) => format!("failed {attempts} attempts, last error: {e}"),
        None => format!("failed {attempts} attempts"),
    }))
}

/// What a caller sees after waiting on a [`Preload`].
#[derive(Debug)]
pub enum Outcome<T> {
    Ready(T),
    Failed(MatrixError),
    /// The deadline passed first. The fetch keeps running and can be waited on again.
    TimedOut,
    Canceled,
}

/// A fetch running in the background while the current frame renders.
#[derive(Debug)]
pub struct Preload<T> {
    handle: Option<JoinHandle<MatrixResult<T>>>,
}

impl<T: Send + 'static> Preload<T> {
    pub fn spawn<F, Fut>(cancel: CancellationToken, fetch: F) -> Self
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = MatrixResult<T>> + Send + 'static,
    {
        let handle =
            tokio::spawn(async move { fetch_with_retry(&cancel, MAX_ATTEMPTS, fetch).await });
        Self {
            handle: Some(handle),
        }
    }

    /// True once the fetch finished and its result was not collected yet.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.is_finished())
    }

    pub fn is_pending(&self) -> bool {
        self.handle.is_some()
    }

    /// Race completion against `deadline`.
    pub async fn wait(&mut self, deadline: Duration) -> Outcome<T> {
        let Some(handle) = self.handle.as_mut() else {
            return Outcome::Failed(MatrixError::fetch("preload result already taken"));
        };

        let joined = match tokio::time::timeout(deadline, handle).await {
            Ok(joined) => joined,
            Err(_) => return Outcome::TimedOut,
        };
        self.handle = None;

        match joined {
            Ok(Ok(value)) => Outcome::Ready(value),
            Ok(Err(e)) if e.is_cancellation() => Outcome::Canceled,
            Ok(Err(e)) => Outcome::Failed(e),
            Err(e) if e.is_cancelled() => Outcome::Canceled,
            Err(e) => Outcome::Failed(MatrixError::fetch(format!("preload task failed: {e}"))),
        }
    }
}

impl<T> Drop for Preload<T> {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

struct Entry<T> {
    last_good: Option<T>,
    pending: Option<Preload<T>>,
}

impl<T> Default for Entry<T> {
    fn default() -> Self {
        Self {
            last_good: None,
            pending: None,
        }
    }
}

/// Keyed preloads that remember the last good value of every key.
///
/// A preload that misses its deadline keeps running; until it lands, `get` answers
/// with the previous value (or `None` if there never was one).
pub struct Prefetcher<K, T> {
    entries: HashMap<K, Entry<T>>,
}

impl<K, T> Default for Prefetcher<K, T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K, T> Prefetcher<K, T>
where
    K: Eq + Hash + std::fmt::Debug,
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a preload for `key` unless one is already in flight.
    pub fn start<F, Fut>(&mut self, key: K, cancel: CancellationToken, fetch: F) -> bool
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = MatrixResult<T>> + Send + 'static,
    {
        let entry = self.entries.entry(key).or_default();
        if entry.pending.is_some() {
            return false;
        }
        entry.pending = Some(Preload::spawn(cancel, fetch));
        true
    }

    /// Wait up to `deadline` for the in-flight preload of `key`, then answer with the
    /// freshest value known.
    pub async fn get(&mut self, key: &K, deadline: Duration) -> Option<T> {
        let entry = self.entries.get_mut(key)?;
        if let Some(pending) = entry.pending.as_mut() {
            match pending.wait(deadline).await {
                Outcome::Ready(value) => {
                    entry.last_good = Some(value);
                    entry.pending = None;
                }
                Outcome::Failed(e) => {
                    tracing::warn!(key = ?key, error = %e, "preload failed, using stale data");
                    entry.pending = None;
                }
                Outcome::TimedOut => {
                    tracing::debug!(key = ?key, "preload missed its deadline");
                }
                Outcome::Canceled => {
                    entry.pending = None;
                }
            }
        }
        entry.last_good.clone()
    }

    pub fn last_good(&self, key: &K) -> Option<&T> {
        self.entries.get(key).and_then(|e| e.last_good.as_ref())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
