//! Bounded fan-out / 有界并发
//!
//! Runs one batch of independent store calls and waits for all of them
//! before returning. Results come back in input order.

use std::future::Future;

use futures::future::join_all;
use futures::stream::{self, StreamExt};

/// Drive every future to completion, at most `limit` at a time.
/// A limit of 0 starts the whole batch at once.
pub async fn run_batch<I, F>(futures: I, limit: usize) -> Vec<F::Output>
where
    I: IntoIterator<Item = F>,
    F: Future,
{
    let futures: Vec<F> = futures.into_iter().collect();
    if limit == 0 {
        return join_all(futures).await;
    }
    stream::iter(futures).buffered(limit).collect().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_order_preserved() {
        let out = run_batch((0..10u64).map(|i| async move {
            tokio::time::sleep(Duration::from_millis(10 - i)).await;
            i
        }), 3)
        .await;
        assert_eq!(out, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_limit_caps_in_flight() {
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let jobs = (0..20).map(|_| {
            let live = live.clone();
            let peak = peak.clone();
            async move {
                let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                live.fetch_sub(1, Ordering::SeqCst);
            }
        });
        run_batch(jobs, 4).await;
        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_over_borrowed_items_can_be_spawned() {
        let words = vec!["夏".to_string(), "天".to_string(), "海".to_string()];
        let handle = tokio::spawn(async move {
            let lens = words.iter().map(|w| async move { w.len() });
            run_batch(lens, 2).await
        });
        assert_eq!(handle.await.unwrap(), vec![3, 3, 3]);
    }

    #[tokio::test]
    async fn test_unbounded_batch() {
        let out = run_batch((0..5).map(|i| async move { i * 2 }), 0).await;
        assert_eq!(out, vec![0, 2, 4, 6, 8]);
    }
}
