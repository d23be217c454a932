use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

/// A computation shared by every caller that asked for it while it was pending.
///
/// Polling any clone drives the computation; once it settles every clone
/// yields the same `Result`.
pub type InFlight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

/// A pending entry. The token ties the entry to the computation that created
/// it, so a computation settling after a reset never evicts its successor.
pub(crate) struct Pending<T, E> {
    pub(crate) token: u64,
    pub(crate) future: InFlight<T, E>,
}

pub(crate) fn next_token() -> u64 {
    NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
}

/// Shares `computation`, running `on_settle` with the outcome as soon as it
/// completes and before any caller observes the result.
///
/// A panic counts as a failed settle: `on_settle(false)` runs, then the panic
/// resumes and reaches whoever is polling.
pub(crate) fn settle_with<T, E, Fut, S>(computation: Fut, on_settle: S) -> InFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    S: FnOnce(bool) + Send + 'static,
{
    async move {
        match AssertUnwindSafe(computation).catch_unwind().await {
            Ok(result) => {
                on_settle(result.is_ok());
                result
            }
            Err(payload) => {
                on_settle(false);
                panic::resume_unwind(payload)
            }
        }
    }
    .boxed()
    .shared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_on_settle_runs_before_result_is_seen() {
        let settled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&settled);
        let shared = settle_with(async { Ok::<_, ()>(5) }, move |ok| {
            assert!(ok);
            flag.store(true, Ordering::SeqCst);
        });

        assert!(!settled.load(Ordering::SeqCst));
        let copy = shared.clone();
        assert_eq!(shared.await, Ok(5));
        assert!(settled.load(Ordering::SeqCst));
        assert_eq!(copy.await, Ok(5));
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let shared = settle_with(async { Err::<(), _>("boom") }, |ok| assert!(!ok));
        assert_eq!(shared.await, Err("boom"));
    }

    #[tokio::test]
    async fn test_panic_still_settles() {
        let settled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&settled);
        let shared = settle_with(
            async {
                if true {
                    panic!("computation failed");
                }
                Ok::<u8, ()>(0)
            },
            move |ok| {
                assert!(!ok);
                flag.store(true, Ordering::SeqCst);
            },
        );

        assert!(tokio::spawn(shared).await.is_err());
        assert!(settled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(next_token(), next_token());
    }
}
