use std::{future::Future, time::Duration};

use tokio::{select, time::sleep};
use tokio_util::sync::CancellationToken;

/// How a race against a deadline ended. Exactly one branch wins.
#[derive(Debug, PartialEq, Eq)]
pub enum Raced<T> {
    Ready(T),
    TimedOut,
    Cancelled,
}

/// Race `future` against a `duration` timer and a cancellation token.
///
/// The losers are dropped before this returns, so a late readiness event or
/// timer tick has nothing left to wake.
pub async fn race_deadline<F: Future>(
    future: F,
    duration: Duration,
    cancel: &CancellationToken,
) -> Raced<F::Output> {
    select! {
        biased;
        _ = cancel.cancelled() => Raced::Cancelled,
        v = future => Raced::Ready(v),
        _ = sleep(duration) => Raced::TimedOut,
    }
}

/// Run `future` until it completes or `cancel` fires, whichever is first.
pub async fn or_cancel<F: Future>(future: F, cancel: &CancellationToken) -> Option<F::Output> {
    select! {
        biased;
        _ = cancel.cancelled() => None,
        v = future => Some(v),
    }
}

#[cfg(test)]
mod tests {
    use std::future::pending;

    use tokio::time::Instant;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ready_before_deadline() {
        let cancel = CancellationToken::new();
        let fut = async {
            sleep(Duration::from_secs(1)).await;
            7
        };
        assert_eq!(
            race_deadline(fut, Duration::from_secs(3), &cancel).await,
            Raced::Ready(7)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_wins() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let raced = race_deadline(pending::<()>(), Duration::from_secs(3), &cancel).await;
        assert_eq!(raced, Raced::TimedOut);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_wins() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let raced = race_deadline(pending::<()>(), Duration::from_secs(3), &cancel).await;
        assert_eq!(raced, Raced::Cancelled);
    }

    #[tokio::test]
    async fn test_or_cancel() {
        let cancel = CancellationToken::new();
        assert_eq!(or_cancel(async { 1 }, &cancel).await, Some(1));
        cancel.cancel();
        assert_eq!(or_cancel(async { 1 }, &cancel).await, None);
    }
}
