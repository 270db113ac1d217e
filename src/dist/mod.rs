//! The distribution protocol: EPMD lookup, the node handshake, and framed
//! control-message traffic with remote Erlang VMs.
//!
//! [`epmd`] resolves a node's short name to its listener port, [`handshake`]
//! authenticates with the cookie digest and negotiates capabilities, and the
//! connection machinery (internal) frames pass-through messages and routes
//! control messages (sends, links, unlinks and exit signals) into the
//! process runtime. Connections are established on demand by the first send
//! addressed to an unconnected node.

pub(crate) mod connection;
pub mod epmd;
mod error;
pub mod flags;
pub mod handshake;

pub use error::DistError;
