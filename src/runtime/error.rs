//! Error types for runtime operations.

use crate::core::Pid;
use crate::dist::DistError;
use thiserror::Error;

/// Errors from process-level operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The process does not exist (or no longer exists).
    #[error("process not found: {0}")]
    ProcessNotFound(Pid),

    /// A distribution-layer failure while reaching a remote peer.
    #[error(transparent)]
    Dist(#[from] DistError),
}

/// Why a `receive` returned without a matching message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReceiveError {
    /// The `after` period elapsed before any message matched.
    #[error("timeout")]
    Timeout,

    /// The mailbox can never produce another message.
    #[error("mailbox closed")]
    Closed,
}
