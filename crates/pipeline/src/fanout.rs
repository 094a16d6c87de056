//! Bounded concurrent map-then-join.

use std::future::Future;

use futures::stream::{self, StreamExt, TryStreamExt};

/// Run `f` over every item with at most `limit` calls in flight and collect
/// the results in input order.
///
/// Calls complete in any order. The first error to arrive is returned at
/// once; calls still in flight are dropped and items not yet started are
/// never started.
pub async fn fan_out<I, T, F, Fut, U, E>(items: I, limit: usize, mut f: F) -> Result<Vec<U>, E>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<U, E>>,
{
    let mut indexed: Vec<(usize, U)> = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| {
            let call = f(item);
            async move { call.await.map(|out| (index, out)) }
        })
        .buffer_unordered(limit.max(1))
        .try_collect()
        .await?;
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, out)| out).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn preserves_input_order() {
        let out: Result<Vec<u64>, ()> = fan_out(vec![30u64, 5, 15], 3, |ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(ms)
        })
        .await;
        assert_eq!(out.unwrap(), vec![30, 5, 15]);
    }

    #[tokio::test]
    async fn never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let out: Result<Vec<usize>, ()> = fan_out(0..10usize, 3, |i| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(i)
            }
        })
        .await;
        assert_eq!(out.unwrap().len(), 10);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn first_failure_stops_remaining() {
        let started = Arc::new(AtomicUsize::new(0));
        let out: Result<Vec<usize>, String> = fan_out(0..20usize, 2, |i| {
            let started = started.clone();
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                if i == 1 {
                    Err(format!("item {i} failed"))
                } else {
                    Ok(i)
                }
            }
        })
        .await;
        assert_eq!(out.unwrap_err(), "item 1 failed");
        assert!(started.load(Ordering::SeqCst) < 20);
    }

    #[tokio::test]
    async fn failure_is_not_held_behind_a_slow_call() {
        let out: Result<Vec<usize>, String> = tokio::time::timeout(
            Duration::from_secs(2),
            fan_out(0..2usize, 2, |i| async move {
                if i == 0 {
                    std::future::pending::<()>().await;
                    Ok(i)
                } else {
                    Err(format!("item {i} failed"))
                }
            }),
        )
        .await
        .expect("fan-out waited on the stalled call");
        assert_eq!(out.unwrap_err(), "item 1 failed");
    }

    #[tokio::test]
    async fn empty_input_is_ok() {
        let out: Result<Vec<u8>, ()> = fan_out(Vec::<u8>::new(), 3, |x| async move { Ok(x) }).await;
        assert!(out.unwrap().is_empty());
    }
}
