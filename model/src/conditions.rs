/*!

Fixed-interval condition polling against eventually-consistent cluster state.
`wait` repeatedly invokes an operation until a predicate accepts its result;
`call_until_success` retries an operation until it completes at all. Both
treat a caller-specified set of [`ErrorKind`]s as "no result yet" and
propagate everything else immediately.

!*/

use crate::clients::{ErrorClass, ErrorKind};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The interval used by call sites that have no opinion of their own.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Per-call polling policy. `timeout: None` polls forever.
#[derive(Debug, Clone)]
pub struct PollParams {
    /// Exact sleep between attempts. No backoff, no jitter.
    pub interval: Duration,
    /// Wall-clock bound for the whole wait, or `None` for no bound.
    pub timeout: Option<Duration>,
    /// Error kinds to treat as "try again" rather than "abort".
    pub ignore: Vec<ErrorKind>,
}

impl Default for PollParams {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: None,
            ignore: Vec::new(),
        }
    }
}

/// Polls `operation` until `condition` accepts its result (`Ok(true)`), the
/// timeout elapses (`Ok(false)`), or a non-ignorable error occurs (`Err`).
///
/// An empty result (e.g. an object list with no items) is a value like any
/// other; the condition decides what it means. Cancelling the token unblocks
/// the wait promptly and reports `Ok(false)`.
pub async fn wait<T, E, F, Fut, C>(
    mut operation: F,
    condition: C,
    params: &PollParams,
    cancel: &CancellationToken,
) -> Result<bool, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&T) -> bool,
    E: ErrorClass,
{
    let deadline = params.timeout.map(|timeout| Instant::now() + timeout);
    loop {
        if expired(deadline) {
            return Ok(false);
        }
        match operation().await {
            Ok(value) if condition(&value) => return Ok(true),
            Ok(_) => {}
            Err(error) if is_ignorable(&error, &params.ignore) => {}
            Err(error) => return Err(error),
        }
        if !sleep_or_cancelled(params.interval, cancel).await {
            return Ok(false);
        }
    }
}

/// Like [`wait`], but the result value is irrelevant: the poll succeeds the
/// instant `operation` completes without a non-ignorable error. Used to retry
/// flaky, idempotent calls.
pub async fn call_until_success<T, E, F, Fut>(
    mut operation: F,
    params: &PollParams,
    cancel: &CancellationToken,
) -> Result<bool, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ErrorClass,
{
    let deadline = params.timeout.map(|timeout| Instant::now() + timeout);
    loop {
        if expired(deadline) {
            return Ok(false);
        }
        match operation().await {
            Ok(_) => return Ok(true),
            Err(error) if is_ignorable(&error, &params.ignore) => {}
            Err(error) => return Err(error),
        }
        if !sleep_or_cancelled(params.interval, cancel).await {
            return Ok(false);
        }
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline
        .map(|deadline| Instant::now() >= deadline)
        .unwrap_or(false)
}

fn is_ignorable<E: ErrorClass>(error: &E, ignore: &[ErrorKind]) -> bool {
    ignore.contains(&error.error_kind())
}

/// Returns `false` if the token was cancelled while sleeping.
async fn sleep_or_cancelled(interval: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct FlakyError(ErrorKind);

    impl ErrorClass for FlakyError {
        fn error_kind(&self) -> ErrorKind {
            self.0
        }
    }

    fn quick(timeout: Option<Duration>, ignore: Vec<ErrorKind>) -> PollParams {
        PollParams {
            interval: Duration::from_millis(10),
            timeout,
            ignore,
        }
    }

    #[tokio::test]
    async fn succeeds_once_condition_holds() {
        let attempts = AtomicUsize::new(0);
        let met = wait(
            || async {
                Ok::<usize, FlakyError>(attempts.fetch_add(1, Ordering::SeqCst))
            },
            |attempt| *attempt >= 3,
            &quick(None, Vec::new()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(met);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn bounded_timeout_reports_false() {
        let met = wait(
            || async { Ok::<u32, FlakyError>(0) },
            |_| false,
            &quick(Some(Duration::from_millis(50)), Vec::new()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(!met);
    }

    #[tokio::test]
    async fn ignorable_errors_are_retried_with_sleeps() {
        let attempts = AtomicUsize::new(0);
        let start = Instant::now();
        let met = wait(
            || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(FlakyError(ErrorKind::Transient))
                } else {
                    Ok(())
                }
            },
            |_| true,
            &quick(None, vec![ErrorKind::Transient]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(met);
        // Three failed attempts means at least three full sleep intervals.
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn non_ignorable_error_propagates_immediately() {
        let result = wait(
            || async { Err::<(), FlakyError>(FlakyError(ErrorKind::Fatal)) },
            |_| true,
            &quick(None, vec![ErrorKind::Transient]),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(FlakyError(ErrorKind::Fatal))));
    }

    #[tokio::test]
    async fn empty_result_is_not_failure() {
        // An empty list is a value; the condition decides.
        let met = wait(
            || async { Ok::<Vec<u32>, FlakyError>(Vec::new()) },
            |list| list.is_empty(),
            &quick(Some(Duration::from_secs(5)), Vec::new()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(met);
    }

    #[tokio::test]
    async fn cancellation_unblocks_forever_poll() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });
        let met = wait(
            || async { Ok::<u32, FlakyError>(0) },
            |_| false,
            &quick(None, Vec::new()),
            &cancel,
        )
        .await
        .unwrap();
        assert!(!met);
    }

    #[tokio::test]
    async fn call_until_success_retries_ignorable_errors() {
        let attempts = AtomicUsize::new(0);
        let succeeded = call_until_success(
            || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FlakyError(ErrorKind::Transient))
                } else {
                    Ok(())
                }
            },
            &quick(None, vec![ErrorKind::Transient]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(succeeded);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn call_until_success_propagates_fatal_errors() {
        let result = call_until_success(
            || async { Err::<(), FlakyError>(FlakyError(ErrorKind::Conflict)) },
            &quick(None, vec![ErrorKind::Transient]),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(FlakyError(ErrorKind::Conflict))));
    }

    #[tokio::test]
    async fn call_until_success_times_out() {
        let succeeded = call_until_success(
            || async { Err::<(), FlakyError>(FlakyError(ErrorKind::Transient)) },
            &quick(Some(Duration::from_millis(50)), vec![ErrorKind::Transient]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(!succeeded);
    }
}
