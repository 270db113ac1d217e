//! Core identity types shared by the term codec, the process runtime and
//! the distribution layer: process identifiers, references, exit reasons
//! and node names.

mod exit_reason;
mod node;
mod pid;
mod reference;

pub use exit_reason::ExitReason;
pub use node::{InvalidNodeName, NodeName};
pub use pid::Pid;
pub use reference::Ref;
