//! Cancellation helpers shared by the loop, the resolver and the strategies.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};

/// Returns `Err(AgentError::Cancelled)` if the token exists and is cancelled.
pub(crate) fn check_cancelled(token: Option<&CancellationToken>) -> Result<()> {
    match token {
        Some(token) if token.is_cancelled() => Err(AgentError::Cancelled),
        _ => Ok(()),
    }
}

/// Drive `future` until it completes or the token fires, whichever is first.
pub(crate) async fn cancellable<F: Future>(
    token: Option<&CancellationToken>,
    future: F,
) -> Result<F::Output> {
    match token {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => Err(AgentError::Cancelled),
            output = future => Ok(output),
        },
        None => Ok(future.await),
    }
}

/// Whether an error means the run was cancelled
pub(crate) fn is_cancelled(err: &AgentError) -> bool {
    matches!(err, AgentError::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fired_token_wins_over_pending_future() {
        let token = CancellationToken::new();
        token.cancel();

        let outcome = cancellable(Some(&token), std::future::pending::<()>()).await;
        assert!(matches!(outcome, Err(AgentError::Cancelled)));
        assert!(check_cancelled(Some(&token)).is_err());
    }

    #[tokio::test]
    async fn no_token_just_awaits() {
        assert_eq!(cancellable(None, async { 7 }).await.unwrap(), 7);
        assert!(check_cancelled(None).is_ok());
    }
}
