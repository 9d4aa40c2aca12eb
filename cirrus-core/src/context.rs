use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::AccountError;

/// Per-request cancellation and deadline carried into every service call.
///
/// Work wrapped with [`RequestContext::run`] is dropped as soon as the token is
/// cancelled or the deadline passes. Nothing is retried.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline_at(Instant::now() + timeout)
    }

    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            deadline: None,
        }
    }

    /// Tighten the deadline; an earlier existing deadline wins.
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled()
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub async fn run<F, T>(&self, work: F) -> Result<T, AccountError>
    where
        F: Future<Output = T>,
    {
        if self.cancel.is_cancelled() {
            return Err(AccountError::Cancelled("request cancelled".into()));
        }

        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    Err(AccountError::Cancelled("request cancelled".into()))
                }
                _ = tokio::time::sleep_until(deadline) => {
                    Err(AccountError::Cancelled("deadline exceeded".into()))
                }
                out = work => Ok(out),
            },
            None => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    Err(AccountError::Cancelled("request cancelled".into()))
                }
                out = work => Ok(out),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_work_to_completion() {
        let ctx = RequestContext::background();
        assert_eq!(ctx.run(async { 42 }).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let ctx = RequestContext::background();
        ctx.cancel();
        let err = ctx.run(async { 1 }).await.unwrap_err();
        assert!(matches!(err, AccountError::Cancelled(_)));
        assert!(ctx.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_pending_work() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(50));
        let err = ctx
            .run(tokio::time::sleep(Duration::from_secs(60)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccountError::Cancelled(msg) if msg.contains("deadline")
        ));
    }

    #[tokio::test]
    async fn cancellation_interrupts_in_flight_work() {
        let ctx = RequestContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let err = ctx
            .run(tokio::time::sleep(Duration::from_secs(60)))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Cancelled(_)));
    }

    #[test]
    fn earlier_deadline_wins() {
        let now = Instant::now();
        let ctx = RequestContext::background()
            .deadline_at(now + Duration::from_secs(1))
            .deadline_at(now + Duration::from_secs(5));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));
    }
}
