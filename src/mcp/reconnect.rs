//! Reconnect guard
//!
//! Wraps a protocol operation so that a lost connection gets one chance to
//! recover: drop the session, reconnect once (no retry policy), run the
//! operation again. If recovery fails the caller sees the original error.

use std::future::Future;

use async_trait::async_trait;

use super::error::{McpClientError, McpClientResult, SessionError};

/// Message fragments that mark a protocol error as a dead connection
const LOSS_SIGNATURES: &[&str] = &["connection closed", "peer closed connection"];

/// How the guard treats a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The session is unusable; reconnecting may help
    ConnectionLoss,
    /// The request failed but the session is fine
    Operational,
    /// Not a session failure at all; the guard never looks at it
    Unwatched,
}

/// Whether `message` carries a connection-loss signature (case-insensitive).
pub fn has_loss_signature(message: &str) -> bool {
    let message = message.to_lowercase();
    LOSS_SIGNATURES.iter().any(|sig| message.contains(sig))
}

pub fn classify(error: &McpClientError) -> FailureKind {
    let McpClientError::Session(session) = error else {
        return FailureKind::Unwatched;
    };

    match session {
        SessionError::ConnectionLost(_) | SessionError::TransportBroken(_) => {
            FailureKind::ConnectionLoss
        }
        SessionError::Protocol { message, .. } | SessionError::Other(message)
            if has_loss_signature(message) =>
        {
            FailureKind::ConnectionLoss
        }
        _ => FailureKind::Operational,
    }
}

/// Something the guard can tear down and bring back.
#[async_trait]
pub trait Reconnect: Send {
    /// Name used in diagnostics
    fn label(&self) -> &str;

    /// Release the current session. Must not fail.
    async fn drop_session(&mut self);

    /// One connect attempt, without retries.
    async fn reestablish(&mut self) -> McpClientResult<()>;
}

/// Run `op` against `target`, recovering once from connection loss.
///
/// `op` is invoked at most twice. Any failure that is not connection loss is
/// returned untouched on the first attempt.
pub async fn guard<S, T, F, Fut>(target: &mut S, operation: &str, mut op: F) -> McpClientResult<T>
where
    S: Reconnect + ?Sized,
    F: FnMut(&S) -> Fut,
    Fut: Future<Output = McpClientResult<T>>,
{
    let original = match op(&*target).await {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if classify(&original) != FailureKind::ConnectionLoss {
        return Err(original);
    }

    tracing::warn!(
        server = %target.label(),
        operation,
        error = %original,
        "connection lost, reconnecting"
    );

    target.drop_session().await;

    if let Err(e) = target.reestablish().await {
        tracing::error!(
            server = %target.label(),
            operation,
            error = %e,
            "reconnection failed"
        );
        return Err(original);
    }

    tracing::info!(server = %target.label(), operation, "reconnected");

    match op(&*target).await {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::error!(
                server = %target.label(),
                operation,
                error = %e,
                "retry after reconnect failed"
            );
            Err(original)
        }
    }
}
