//! Unique reference type.
//!
//! A [`Ref`] is the Erlang `make_ref()` value: a node-scoped identifier
//! made of up to five 32-bit words plus the node's creation. References
//! tag RPC replies and unlink acknowledgements so that unrelated messages
//! can never be mistaken for each other.
//!
//! Local references follow the same elision rule as PIDs: the node field
//! stays `None` inside the runtime and is stamped with the connection's
//! local identity on encode.

use crate::atom::Atom;
use std::fmt;

/// A unique reference.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Ref {
    /// Owning node, `None` for references made on this client node.
    node: Option<Atom>,
    /// Boot epoch of the owning node; zero while local.
    creation: u32,
    /// 1 to 5 32-bit id words, least significant first.
    words: Vec<u32>,
}

impl Ref {
    /// Maximum number of id words a reference may carry on the wire.
    pub const MAX_WORDS: usize = 5;

    /// Creates a local reference from a monotonically assigned counter.
    ///
    /// The counter is split into two 32-bit words; the counter space only
    /// wraps after 2^64 references, which no single boot approaches.
    pub(crate) fn local(counter: u64) -> Self {
        Self {
            node: None,
            creation: 0,
            words: vec![(counter & 0xFFFF_FFFF) as u32, (counter >> 32) as u32],
        }
    }

    /// Creates a reference owned by another node.
    pub fn external(node: Atom, creation: u32, words: Vec<u32>) -> Self {
        debug_assert!(!words.is_empty() && words.len() <= Self::MAX_WORDS);
        Self {
            node: Some(node),
            creation,
            words,
        }
    }

    /// The owning node, or `None` for a reference made on this node.
    #[inline]
    pub fn node(&self) -> Option<Atom> {
        self.node
    }

    /// Boot epoch of the owning node.
    #[inline]
    pub const fn creation(&self) -> u32 {
        self.creation
    }

    /// The id words, least significant first.
    #[inline]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Returns `true` if this reference was made on this client node.
    #[inline]
    pub fn is_local(&self) -> bool {
        self.node.is_none()
    }

    /// The same reference with its node identity filled in for the wire.
    pub(crate) fn stamped(&self, node: Atom, creation: u32) -> Self {
        Self {
            node: Some(node),
            creation,
            words: self.words.clone(),
        }
    }

    /// The same reference with its node identity erased.
    pub(crate) fn elided(&self) -> Self {
        Self {
            node: None,
            creation: 0,
            words: self.words.clone(),
        }
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#Ref<")?;
        match self.node {
            None => write!(f, "0")?,
            Some(node) => write!(f, "{}", node)?,
        }
        for word in self.words.iter().rev() {
            write!(f, ".{}", word)?;
        }
        write!(f, ">")
    }
}
