//! Error type for the distribution layer.

use crate::atom::Atom;
use crate::core::InvalidNodeName;
use crate::dist::epmd::EpmdError;
use crate::term::{DecodeError, EncodeError};
use thiserror::Error;

/// Errors raised while talking to EPMD or a remote node.
#[derive(Debug, Error)]
pub enum DistError {
    /// Socket-level failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// EPMD could not resolve the node.
    #[error(transparent)]
    Epmd(#[from] EpmdError),

    /// The node atom does not parse as `short@host`.
    #[error(transparent)]
    InvalidName(#[from] InvalidNodeName),

    /// The peer broke the handshake protocol.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The peer's challenge digest did not verify against our cookie.
    #[error("peer digest did not verify (cookie mismatch?)")]
    BadDigest,

    /// A term on this connection failed to decode; the connection is
    /// closed when this happens mid-stream.
    #[error(transparent)]
    Codec(#[from] DecodeError),

    /// A term could not be encoded for this connection.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// No connection to the node, and none could be established.
    #[error("not connected to {0}")]
    NotConnected(Atom),

    /// The connection went away mid-operation.
    #[error("connection closed")]
    ConnectionClosed,
}
