//! # Waxwing, a native Rust client node for Erlang distribution
//!
//! Waxwing impersonates a full Erlang node: it resolves peers through
//! EPMD, performs the version-6 distribution handshake with cookie
//! authentication, exchanges External Term Format control and payload
//! messages with remote VMs, and hosts a local Erlang-style process
//! runtime so remote messages have somewhere to land.
//!
//! - **Terms**: [`Term`] with an encoder/decoder for the External Term
//!   Format, including node-identity elision for PIDs and references.
//! - **Processes**: lightweight [`spawn`](NodeHandle::spawn)ed tasks with
//!   FIFO mailboxes, selective receive, links and exit-signal propagation.
//! - **Distribution**: EPMD lookup, handshake, framed pass-through
//!   messaging and control dispatch, with connections established on
//!   demand by the first send to an unconnected node.
//! - **RPC**: [`NodeHandle::rpc`] against the remote `rex` server, with a
//!   kill-on-timeout worker.
//!
//! # Quick start
//!
//! ```ignore
//! use waxwing::{atom, NodeConfig, Term};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = NodeConfig::new().name("wax@localhost").start()?;
//!     let handle = node.handle();
//!
//!     let pong = handle
//!         .rpc(
//!             atom!("other@localhost"),
//!             atom!("erlang"),
//!             atom!("node"),
//!             Term::Nil,
//!         )
//!         .await?;
//!     println!("remote node says: {pong}");
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]

pub mod atom;
pub mod config;
pub mod core;
pub mod dist;
pub mod node;
pub mod rpc;
pub mod runtime;
pub mod term;

pub use crate::core::{ExitReason, NodeName, Pid, Ref};
pub use atom::Atom;
pub use config::ConfigError;
pub use dist::DistError;
pub use node::{Dest, Node, NodeConfig, NodeHandle};
pub use rpc::RpcError;
pub use runtime::{Context, ReceiveError, RuntimeError};
pub use term::Term;

/// Commonly needed imports in one place.
pub mod prelude {
    pub use crate::atom;
    pub use crate::atom::Atom;
    pub use crate::core::{ExitReason, NodeName, Pid, Ref};
    pub use crate::node::{Dest, Node, NodeConfig, NodeHandle};
    pub use crate::rpc::RpcError;
    pub use crate::runtime::{Context, ReceiveError, RuntimeError};
    pub use crate::term::Term;
}
