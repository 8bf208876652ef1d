//! Bounded concurrency runner
//!
//! [`BoundedRunner::run`] drives one future per input item on the calling
//! task, keeping at most `limit` of them unsettled at once. Items are admitted
//! in input order; a settled item frees its slot for the next one right away.
//! Every item settles: a worker error or panic becomes a
//! [`Outcome::Rejected`] and never disturbs its siblings.

use futures::FutureExt;
use futures::stream::{self, StreamExt};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use crate::error::{Error, Result};

/// Why a scheduled item did not produce a value
#[derive(Debug)]
pub enum Rejection<E> {
    /// The worker returned an error
    Failed(E),
    /// The worker panicked; holds the panic message
    Panicked(String),
}

impl<E: std::fmt::Display> std::fmt::Display for Rejection<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Failed(e) => write!(f, "{e}"),
            Rejection::Panicked(msg) => write!(f, "worker panicked: {msg}"),
        }
    }
}

/// Settled result of one scheduled item
#[derive(Debug)]
pub enum Outcome<U, E> {
    /// The worker produced a value
    Fulfilled(U),
    /// The worker failed or panicked
    Rejected(Rejection<E>),
}

impl<U, E> Outcome<U, E> {
    /// True for [`Outcome::Fulfilled`]
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Outcome::Fulfilled(_))
    }

    /// True for [`Outcome::Rejected`]
    pub fn is_rejected(&self) -> bool {
        !self.is_fulfilled()
    }

    /// The value, if fulfilled
    pub fn fulfilled(&self) -> Option<&U> {
        match self {
            Outcome::Fulfilled(value) => Some(value),
            Outcome::Rejected(_) => None,
        }
    }

    /// Convert into a `Result`
    pub fn into_result(self) -> std::result::Result<U, Rejection<E>> {
        match self {
            Outcome::Fulfilled(value) => Ok(value),
            Outcome::Rejected(reason) => Err(reason),
        }
    }
}

/// Runs async workers with a fixed ceiling on in-flight items
#[derive(Clone, Copy, Debug)]
pub struct BoundedRunner {
    limit: usize,
}

impl BoundedRunner {
    /// Create a runner admitting at most `limit` items at once
    ///
    /// Fails with [`Error::Validation`] when `limit` is zero.
    pub fn new(limit: usize) -> Result<Self> {
        if limit < 1 {
            return Err(Error::Validation(format!(
                "concurrency limit must be >= 1, got {limit}"
            )));
        }
        Ok(Self { limit })
    }

    /// Maximum number of in-flight items
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `worker` over `items`, returning one outcome per item in input order
    ///
    /// Returns only after every item has settled.
    pub async fn run<T, U, E, F, Fut>(
        &self,
        items: impl IntoIterator<Item = T>,
        worker: F,
    ) -> Vec<Outcome<U, E>>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = std::result::Result<U, E>>,
    {
        let worker = &worker;

        let mut settled: Vec<(usize, Outcome<U, E>)> = stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| async move {
                // The worker is invoked inside the guarded future so a panic
                // before its first await is captured as well
                let guarded = AssertUnwindSafe(async move { worker(item).await }).catch_unwind();
                let outcome = match guarded.await {
                    Ok(Ok(value)) => Outcome::Fulfilled(value),
                    Ok(Err(e)) => Outcome::Rejected(Rejection::Failed(e)),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        tracing::error!(index, panic = %message, "worker panicked");
                        Outcome::Rejected(Rejection::Panicked(message))
                    }
                };
                (index, outcome)
            })
            .buffer_unordered(self.limit)
            .collect()
            .await;

        settled.sort_unstable_by_key(|(index, _)| *index);
        settled.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn zero_limit_is_rejected() {
        let err = BoundedRunner::new(0).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn outcomes_follow_input_order() {
        let runner = BoundedRunner::new(3).unwrap();
        // Later items finish first
        let outcomes = runner
            .run(0..6u64, |i| async move {
                tokio::time::sleep(Duration::from_millis(60 - i * 10)).await;
                Ok::<_, String>(i * 2)
            })
            .await;

        let values: Vec<u64> = outcomes
            .iter()
            .map(|o| *o.fulfilled().unwrap())
            .collect();
        assert_eq!(values, vec![0, 2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn never_exceeds_limit() {
        let runner = BoundedRunner::new(2).unwrap();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcomes = runner
            .run(0..10, |i| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    if i % 3 == 0 {
                        Err(format!("item {i} failed"))
                    } else {
                        Ok(i)
                    }
                }
            })
            .await;

        assert_eq!(outcomes.len(), 10);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(peak.load(Ordering::SeqCst), 2, "slots should be used fully");
    }

    #[tokio::test]
    async fn failures_do_not_affect_siblings() {
        let runner = BoundedRunner::new(1).unwrap();
        let outcomes = runner
            .run(vec!["ok", "bad", "ok"], |s| async move {
                if s == "bad" { Err("boom") } else { Ok(s.len()) }
            })
            .await;

        assert!(outcomes[0].is_fulfilled());
        match &outcomes[1] {
            Outcome::Rejected(Rejection::Failed(e)) => assert_eq!(*e, "boom"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(outcomes[2].is_fulfilled());
    }

    #[tokio::test]
    async fn panicking_worker_is_captured() {
        let runner = BoundedRunner::new(2).unwrap();
        let outcomes = runner
            .run(0..3, |i| {
                if i == 1 {
                    panic!("synchronous panic in worker {i}");
                }
                async move { Ok::<_, String>(i) }
            })
            .await;

        assert!(outcomes[0].is_fulfilled());
        match &outcomes[1] {
            Outcome::Rejected(Rejection::Panicked(msg)) => {
                assert!(msg.contains("synchronous panic"), "{msg}")
            }
            other => panic!("expected panic rejection, got {other:?}"),
        }
        assert!(outcomes[2].is_fulfilled());
    }

    #[tokio::test]
    async fn empty_input_yields_no_outcomes() {
        let runner = BoundedRunner::new(4).unwrap();
        let outcomes = runner
            .run(Vec::<u32>::new(), |i| async move { Ok::<_, ()>(i) })
            .await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn failed_item_frees_its_slot() {
        let runner = BoundedRunner::new(1).unwrap();
        let started = Arc::new(AtomicUsize::new(0));

        let outcomes = runner
            .run(0..3, |i| {
                let started = started.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    if i == 0 { Err("first fails") } else { Ok(i) }
                }
            })
            .await;

        assert_eq!(started.load(Ordering::SeqCst), 3);
        assert!(outcomes[0].is_rejected());
        assert!(outcomes[1].is_fulfilled() && outcomes[2].is_fulfilled());
    }
}
