//! Erlang terms and the External Term Format codec.
//!
//! [`Term`] is the value domain exchanged with remote Erlang VMs: integers
//! of arbitrary precision, floats, atoms, tuples, lists (proper and
//! improper), binaries, maps, PIDs and references. [`encode`] and
//! [`decode`] translate terms to and from the External Term Format, the
//! tagged binary representation every distribution frame carries.
//!
//! PID and reference identity is node-scoped. Inside this runtime a local
//! PID carries no node name; the codec fills in the identity a connection
//! was assigned during its handshake (the [`WireScope`]) on the way out,
//! and erases it again on the way in when a decoded PID turns out to be
//! ours. Terms without PIDs or references need no scope at all.

mod decode;
mod encode;

pub use decode::{decode, decode_stream, DecodeError};
pub use encode::{encode, EncodeError};

use crate::atom::Atom;
use crate::core::{Pid, Ref};
use malachite::Integer;
use std::fmt;

/// External Term Format version byte; every encoded term starts with it.
pub const VERSION: u8 = 131;

/// Wire tags, per the distribution protocol term table.
pub(crate) mod tag {
    pub const COMPRESSED: u8 = 80;
    pub const SMALL_INTEGER_EXT: u8 = 97;
    pub const INTEGER_EXT: u8 = 98;
    pub const ATOM_EXT: u8 = 100;
    pub const SMALL_TUPLE_EXT: u8 = 104;
    pub const LARGE_TUPLE_EXT: u8 = 105;
    pub const NIL_EXT: u8 = 106;
    pub const STRING_EXT: u8 = 107;
    pub const LIST_EXT: u8 = 108;
    pub const BINARY_EXT: u8 = 109;
    pub const SMALL_BIG_EXT: u8 = 110;
    pub const LARGE_BIG_EXT: u8 = 111;
    pub const SMALL_ATOM_EXT: u8 = 115;
    pub const MAP_EXT: u8 = 116;
    pub const ATOM_UTF8_EXT: u8 = 118;
    pub const SMALL_ATOM_UTF8_EXT: u8 = 119;
    pub const NEW_FLOAT_EXT: u8 = 70;
    pub const NEW_PID_EXT: u8 = 88;
    pub const NEWER_REFERENCE_EXT: u8 = 90;
}

/// The node identity under which PIDs and references cross one connection.
///
/// This is the name and creation the *peer* assigned to us during the
/// handshake; it is owned by the connection and threaded through every
/// encode and decode on that connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WireScope {
    /// Our node name on this connection.
    pub local_name: Atom,
    /// Our creation on this connection.
    pub local_creation: u32,
}

/// An Erlang term.
///
/// Integers that fit `i64` always normalize to [`Term::Int`]; `BigInt` is
/// reserved for values beyond that, so equality is structural regardless of
/// which wire tag a value arrived under. Maps are association vectors in
/// arrival order; Erlang maps are unordered, and a vector keeps float and
/// compound keys representable.
#[derive(Clone, Debug, PartialEq)]
pub enum Term {
    /// A signed integer within the `i64` range.
    Int(i64),
    /// An arbitrary-precision integer outside the `i64` range.
    BigInt(Integer),
    /// An IEEE-754 double.
    Float(f64),
    /// An atom.
    Atom(Atom),
    /// A fixed-size ordered tuple.
    Tuple(Vec<Term>),
    /// The empty list `[]`.
    Nil,
    /// A non-empty list; `tail` is [`Term::Nil`] for proper lists.
    List {
        /// The list elements in order.
        elements: Vec<Term>,
        /// The tail after the last element; anything but `Nil` makes the
        /// list improper.
        tail: Box<Term>,
    },
    /// A byte string.
    Binary(Vec<u8>),
    /// A map as key/value pairs.
    Map(Vec<(Term, Term)>),
    /// A process identifier.
    Pid(Pid),
    /// A unique reference.
    Ref(Ref),
}

impl Term {
    /// An integer term.
    pub fn int(value: i64) -> Self {
        Term::Int(value)
    }

    /// An atom term, interning the name.
    pub fn atom(name: &str) -> Self {
        Term::Atom(Atom::new(name))
    }

    /// A tuple term.
    pub fn tuple(elements: Vec<Term>) -> Self {
        Term::Tuple(elements)
    }

    /// A proper list term; the empty vector becomes `Nil`.
    pub fn list(elements: Vec<Term>) -> Self {
        if elements.is_empty() {
            Term::Nil
        } else {
            Term::List {
                elements,
                tail: Box::new(Term::Nil),
            }
        }
    }

    /// An improper list term with an explicit tail.
    pub fn improper_list(elements: Vec<Term>, tail: Term) -> Self {
        debug_assert!(!elements.is_empty());
        Term::List {
            elements,
            tail: Box::new(tail),
        }
    }

    /// A binary term from any byte source.
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Term::Binary(bytes.into())
    }

    /// An Erlang string: the proper list of the character codes of `s`.
    pub fn charlist(s: &str) -> Self {
        Term::list(s.chars().map(|c| Term::Int(c as i64)).collect())
    }

    /// A map term from key/value pairs.
    pub fn map(pairs: Vec<(Term, Term)>) -> Self {
        Term::Map(pairs)
    }

    /// The atom, if this term is one.
    pub fn as_atom(&self) -> Option<Atom> {
        match self {
            Term::Atom(a) => Some(*a),
            _ => None,
        }
    }

    /// The integer value, if this term is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Term::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The tuple elements, if this term is a tuple.
    pub fn as_tuple(&self) -> Option<&[Term]> {
        match self {
            Term::Tuple(elements) => Some(elements),
            _ => None,
        }
    }

    /// The PID, if this term is one.
    pub fn as_pid(&self) -> Option<Pid> {
        match self {
            Term::Pid(pid) => Some(*pid),
            _ => None,
        }
    }

    /// Returns `true` for the empty list.
    pub fn is_nil(&self) -> bool {
        matches!(self, Term::Nil)
    }
}

impl From<i64> for Term {
    fn from(value: i64) -> Self {
        Term::Int(value)
    }
}

impl From<Atom> for Term {
    fn from(value: Atom) -> Self {
        Term::Atom(value)
    }
}

impl From<Pid> for Term {
    fn from(value: Pid) -> Self {
        Term::Pid(value)
    }
}

impl From<Ref> for Term {
    fn from(value: Ref) -> Self {
        Term::Ref(value)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Int(n) => write!(f, "{}", n),
            Term::BigInt(n) => write!(f, "{}", n),
            Term::Float(x) => write!(f, "{:?}", x),
            Term::Atom(a) => write!(f, "{}", a),
            Term::Tuple(elements) => {
                write!(f, "{{")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "}}")
            }
            Term::Nil => write!(f, "[]"),
            Term::List { elements, tail } => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", element)?;
                }
                if !tail.is_nil() {
                    write!(f, "|{}", tail)?;
                }
                write!(f, "]")
            }
            Term::Binary(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => write!(f, "<<{:?}>>", text),
                Err(_) => {
                    write!(f, "<<")?;
                    for (i, byte) in bytes.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{}", byte)?;
                    }
                    write!(f, ">>")
                }
            },
            Term::Map(pairs) => {
                write!(f, "#{{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{} => {}", key, value)?;
                }
                write!(f, "}}")
            }
            Term::Pid(pid) => write!(f, "{}", pid),
            Term::Ref(r) => write!(f, "{}", r),
        }
    }
}
