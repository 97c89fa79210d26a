use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::Status;

/// Deadline and cancellation state for one call.
///
/// A context is done once it is canceled or its deadline passes, and it never
/// becomes un-done. The first cause recorded is the one every observer sees.
/// Contexts are cheap to clone; clones share state.
///
/// Deadlines are timer driven: [`CallContext::done`] wakes when the deadline
/// passes, and blocked stream operations return promptly with the cause.
#[derive(Debug, Clone)]
pub struct CallContext {
    state: Arc<ContextState>,
}

#[derive(Debug)]
struct ContextState {
    deadline: Option<Instant>,
    token: CancellationToken,
    /// The first cause, and when it happened.
    cause: OnceLock<(Status, Instant)>,
    parent: Option<CallContext>,
}

impl CallContext {
    /// A root context with no deadline. It is done only when canceled.
    pub fn background() -> Self {
        Self {
            state: Arc::new(ContextState {
                deadline: None,
                token: CancellationToken::new(),
                cause: OnceLock::new(),
                parent: None,
            }),
        }
    }

    /// Derive a context that expires after `duration`, or when this context is done,
    /// whichever comes first.
    pub fn with_deadline(&self, duration: Duration) -> Self {
        let own_deadline = Instant::now().checked_add(duration);
        let deadline = match (self.state.deadline, own_deadline) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (parent, own) => parent.or(own),
        };
        Self {
            state: Arc::new(ContextState {
                deadline,
                token: self.state.token.child_token(),
                cause: OnceLock::new(),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Cancel this context and every context derived from it.
    ///
    /// Only the first cause is kept. If the context is already done, this does nothing.
    pub fn cancel(&self, cause: Status) {
        if let Some(existing) = self.err() {
            log::trace!("context already done with {existing}, ignoring {cause}");
            return;
        }
        let (recorded, _) = self.record(cause, Instant::now());
        log::debug!("context canceled: {recorded}");
    }

    /// True once the context is canceled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Why the context is done, or `None` while it is live.
    pub fn err(&self) -> Option<Status> {
        self.outcome().map(|(cause, _)| cause)
    }

    /// The cause and when it happened. When several causes have happened by the
    /// time anyone asks, the earliest one wins.
    fn outcome(&self) -> Option<(Status, Instant)> {
        if let Some(outcome) = self.state.cause.get() {
            return Some(outcome.clone());
        }
        let expired = self
            .state
            .deadline
            .filter(|deadline| *deadline <= Instant::now());
        if self.state.token.is_cancelled() {
            let (inherited, at) = self
                .state
                .parent
                .as_ref()
                .and_then(CallContext::outcome)
                .unwrap_or_else(|| (Status::canceled("context canceled"), Instant::now()));
            return Some(match expired {
                Some(deadline) if deadline <= at => {
                    self.record(Status::deadline_exceeded(), deadline)
                }
                _ => self.record(inherited, at),
            });
        }
        expired.map(|deadline| self.record(Status::deadline_exceeded(), deadline))
    }

    /// The deadline, if this context has one.
    pub fn deadline(&self) -> Option<Instant> {
        self.state.deadline
    }

    /// Time left before the deadline. `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.state
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Wait until the context is done, and return why.
    pub async fn done(&self) -> Status {
        if let Some(cause) = self.err() {
            return cause;
        }
        match self.state.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.state.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.state.token.cancelled().await,
        }
        self.err()
            .unwrap_or_else(|| self.record(Status::deadline_exceeded(), Instant::now()).0)
    }

    fn record(&self, cause: Status, at: Instant) -> (Status, Instant) {
        let recorded = self.state.cause.get_or_init(|| (cause, at)).clone();
        self.state.token.cancel();
        recorded
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::{CallContext, Code, Status};

    #[test]
    fn background_is_live_until_canceled() {
        let context = CallContext::background();
        assert!(!context.is_done());
        assert_eq!(None, context.err());
        assert_eq!(None, context.remaining());

        context.cancel(Status::canceled("user gave up"));
        assert!(context.is_done());
        assert_eq!(Some(Status::canceled("user gave up")), context.err());
    }

    #[test]
    fn cancellation_is_monotonic_and_keeps_the_first_cause() {
        let context = CallContext::background();
        context.cancel(Status::canceled("first"));
        context.cancel(Status::internal("second"));
        assert_eq!(Some(Status::canceled("first")), context.err());
    }

    #[test]
    fn canceling_a_parent_cancels_derived_contexts_with_the_parent_cause() {
        let parent = CallContext::background();
        let child = parent.with_deadline(Duration::from_secs(60));
        let clone = child.clone();

        parent.cancel(Status::canceled("shutting down"));
        assert_eq!(Some(Status::canceled("shutting down")), child.err());
        assert_eq!(Some(Status::canceled("shutting down")), clone.err());
    }

    #[test]
    fn canceling_a_child_leaves_the_parent_live() {
        let parent = CallContext::background();
        let child = parent.with_deadline(Duration::from_secs(60));
        child.cancel(Status::canceled("only this call"));
        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_without_polling() {
        let context = CallContext::background().with_deadline(Duration::from_secs(1));
        assert!(!context.is_done());

        let started = tokio::time::Instant::now();
        let cause = context.done().await;
        assert_eq!(Code::DeadlineExceeded, cause.code());
        let elapsed = started.elapsed();
        assert!(
            Duration::from_secs(1) <= elapsed && elapsed < Duration::from_millis(1010),
            "woke after {elapsed:?}"
        );
        assert_eq!(Some(cause), context.err());
    }

    #[tokio::test(start_paused = true)]
    async fn derived_deadline_never_outlives_its_parent() {
        let parent = CallContext::background().with_deadline(Duration::from_secs(1));
        let child = parent.with_deadline(Duration::from_secs(5));
        assert_eq!(parent.deadline(), child.deadline());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(Code::DeadlineExceeded, child.done().await.code());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_expiry_keeps_deadline_exceeded() {
        let context = CallContext::background().with_deadline(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(20)).await;
        context.cancel(Status::canceled("too late"));
        assert_eq!(
            Some(Code::DeadlineExceeded),
            context.err().map(|status| status.code())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn an_earlier_deadline_beats_a_later_parent_cancel() {
        let parent = CallContext::background();
        let child = parent.with_deadline(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        parent.cancel(Status::canceled("shutting down"));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            Some(Code::DeadlineExceeded),
            child.err().map(|status| status.code())
        );
        assert_eq!(Some(Status::canceled("shutting down")), parent.err());
    }

    #[tokio::test(start_paused = true)]
    async fn an_earlier_parent_cancel_beats_a_later_deadline() {
        let parent = CallContext::background();
        let child = parent.with_deadline(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(1)).await;
        parent.cancel(Status::canceled("shutting down"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(Some(Status::canceled("shutting down")), child.err());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_cancel_wakes_a_waiter() {
        let context = CallContext::background().with_deadline(Duration::from_secs(30));
        let waiter = tokio::spawn({
            let context = context.clone();
            async move { context.done().await }
        });
        tokio::task::yield_now().await;
        context.cancel(Status::canceled("stop"));
        let cause = waiter.await.expect("waiter completes");
        assert_eq!(Status::canceled("stop"), cause);
    }
}
