//! The Erlang-style process runtime.
//!
//! Processes are tokio tasks with Erlang semantics layered on top: a FIFO
//! mailbox of [`Term`](crate::term::Term)s with selective receive,
//! bidirectional links that propagate exit signals, and an atom-keyed name
//! registry. All shared state lives in the owning
//! [`Node`](crate::node::Node); there is no module-level mutability.
//!
//! Scheduling is the cooperative model a tokio runtime provides: a process
//! runs until it suspends at `receive`, `yield_now`, or another await
//! point, and is woken when a message or timer arrives. Sends between two
//! processes preserve per-sender order; nothing is guaranteed across
//! different senders.

mod context;
mod error;
pub(crate) mod mailbox;
pub(crate) mod process;
pub(crate) mod registry;

pub use context::Context;
pub use error::{ReceiveError, RuntimeError};
