//! Bounded-concurrency fan-out with index-preserving error aggregation.
//!
//! The executor does not cancel siblings when one item's function returns an
//! error — callers wanting fail-fast behaviour can signal cancellation
//! through their own context (a `CancellationToken`, an `AtomicBool`, …)
//! threaded through `f`.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Errors collected from a [`run`] call, rendered as `#i: msg; #j: msg` with
/// the original index preserved and `Ok` results skipped.
#[derive(Debug, Default)]
pub struct ErrorGroup {
    errors: Vec<(usize, String)>,
}

impl ErrorGroup {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), ErrorGroup> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for ErrorGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self.errors.iter().map(|(i, e)| format!("#{i}: {e}")).collect();
        write!(f, "{}", rendered.join("; "))
    }
}

impl std::error::Error for ErrorGroup {}

/// Run `f` over `items` with at most `concurrency` in flight at once.
/// Returns an [`ErrorGroup`] of every item's error, indexed by its position
/// in `items`.
pub async fn run<T, E, F, Fut>(items: Vec<T>, concurrency: usize, f: F) -> Result<(), ErrorGroup>
where
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    assert!(concurrency > 0, "concurrency must be > 0");
    let sem = Arc::new(Semaphore::new(concurrency));
    let f = Arc::new(f);

    let mut handles = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        let sem = sem.clone();
        let f = f.clone();
        handles.push(tokio::spawn(async move {
            let _permit = sem.acquire_owned().await.expect("semaphore never closed");
            (idx, f(item).await)
        }));
    }

    let mut group = ErrorGroup::default();
    for handle in handles {
        let (idx, result) = handle.await.expect("worker task panicked");
        if let Err(e) = result {
            group.errors.push((idx, e.to_string()));
        }
    }
    group.errors.sort_by_key(|(i, _)| *i);

    group.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn error_group_renders_with_indices_preserved() {
        let items = vec![Some("hello"), None, Some("world"), None];
        let result = run(items, 2, |item| async move {
            match item {
                Some(_) => Err::<(), &str>("boom"),
                None => Ok(()),
            }
        })
        .await;
        // items[0]="hello" err, items[1]=None ok, items[2]="world" err, items[3]=None ok
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "#0: boom; #2: boom");
    }

    #[tokio::test]
    async fn run_respects_concurrency_cap() {
        let inflight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let items: Vec<usize> = (0..20).collect();

        let inflight2 = inflight.clone();
        let peak2 = peak.clone();
        let result = run(items, 3, move |_i| {
            let inflight = inflight2.clone();
            let peak = peak2.clone();
            async move {
                let cur = inflight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(cur, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                inflight.fetch_sub(1, Ordering::SeqCst);
                Ok::<(), String>(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn all_ok_yields_no_error() {
        let items = vec![1, 2, 3];
        let result = run(items, 5, |_| async move { Ok::<(), String>(()) }).await;
        assert!(result.is_ok());
    }
}
