//! Process identifier type.
//!
//! A [`Pid`] names a process the way Erlang does: `(node, id, serial,
//! creation)`. Local processes carry no node at all: their node field is
//! `None` until the moment they are written to a distribution channel, at
//! which point the codec fills in the identity that the peer assigned to
//! this connection. Symmetrically, the decoder erases the node field of any
//! PID that turns out to name a process of ours, so a PID that stays inside
//! the runtime never mentions a node name.
//!
//! The creation number distinguishes PIDs that survive a node restart from
//! PIDs of the current boot; for local PIDs it is zero until stamped.

use crate::atom::Atom;
use std::fmt;

/// A process identifier.
///
/// `Pid` is `Copy` and hashable, and is used directly as the key of the
/// process table. Two PIDs are the same process only if node, id, serial
/// and creation all match.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid {
    /// Owning node, `None` for processes of this client node.
    node: Option<Atom>,
    /// Process id within the node.
    id: u32,
    /// Serial: overflow counter for the id field.
    serial: u32,
    /// Boot epoch of the owning node; zero while local.
    creation: u32,
}

impl Pid {
    /// Creates a local PID from a monotonically assigned counter value.
    ///
    /// The counter's low 32 bits become the id and the high bits the
    /// serial, so local PIDs never collide within a single boot.
    pub(crate) fn local(counter: u64) -> Self {
        Self {
            node: None,
            id: (counter & 0xFFFF_FFFF) as u32,
            serial: (counter >> 32) as u32,
            creation: 0,
        }
    }

    /// Creates a PID naming a process on another node.
    pub fn external(node: Atom, id: u32, serial: u32, creation: u32) -> Self {
        Self {
            node: Some(node),
            id,
            serial,
            creation,
        }
    }

    /// The owning node, or `None` for a process of this client node.
    #[inline]
    pub fn node(&self) -> Option<Atom> {
        self.node
    }

    /// Process id within the owning node.
    #[inline]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Serial component of the identifier.
    #[inline]
    pub const fn serial(&self) -> u32 {
        self.serial
    }

    /// Boot epoch of the owning node.
    #[inline]
    pub const fn creation(&self) -> u32 {
        self.creation
    }

    /// Returns `true` if this PID names a process of this client node.
    #[inline]
    pub fn is_local(&self) -> bool {
        self.node.is_none()
    }

    /// The same PID with its node identity filled in, as written to the
    /// wire for a given connection.
    pub(crate) fn stamped(&self, node: Atom, creation: u32) -> Self {
        Self {
            node: Some(node),
            creation,
            ..*self
        }
    }

    /// The same PID with its node identity erased, as read from the wire
    /// when the identity turns out to be our own.
    pub(crate) fn elided(&self) -> Self {
        Self {
            node: None,
            creation: 0,
            ..*self
        }
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // PIDs read better unquoted, so Debug mirrors Display.
        write!(f, "Pid{}", self)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node {
            None => write!(f, "<0.{}.{}>", self.id, self.serial),
            Some(node) => write!(f, "<{}.{}.{}>", node, self.id, self.serial),
        }
    }
}
