//! Interned atoms.
//!
//! Erlang atoms are symbols compared by identity, and node names, registered
//! names and control-message atoms repeat endlessly on a distribution
//! connection. An [`Atom`] is therefore a `Copy` id into a process-wide
//! interner: comparing two atoms never looks at the text, and the text
//! itself is stored once, shared out as `Arc<str>` when somebody needs it.
//! Like an Erlang VM's atom table, the interner only ever grows.
//!
//! # Example
//!
//! ```
//! use waxwing::atom::Atom;
//! use waxwing::atom;
//!
//! let a = atom!("rex");
//! let b = Atom::new("rex");
//! assert_eq!(a, b);
//! assert_eq!(&*a.as_str(), "rex");
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// An interned symbol.
///
/// Atoms are ids, so equality, hashing and ordering are integer operations
/// and never consult the interner. The ordering is interning order, not
/// lexicographic; it exists so atoms can key ordered collections.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(u32);

/// Both directions of the atom table. The id side and the name side share
/// their `Arc<str>` allocations, so each atom text exists exactly once.
#[derive(Default)]
struct Interner {
    /// Id to name; an [`Atom`] is an index into this vector.
    names: Vec<Arc<str>>,
    /// Name to id.
    ids: HashMap<Arc<str>, u32>,
}

impl Interner {
    fn intern(&mut self, name: &str) -> Atom {
        if let Some(&id) = self.ids.get(name) {
            return Atom(id);
        }
        let id = self.names.len() as u32;
        let shared: Arc<str> = Arc::from(name);
        self.names.push(shared.clone());
        self.ids.insert(shared, id);
        Atom(id)
    }

    fn name_of(&self, atom: Atom) -> Arc<str> {
        // Ids are only handed out by intern(), so the index is in range.
        self.names[atom.0 as usize].clone()
    }
}

/// The process-wide interner behind one mutex. Only interning and text
/// lookup take it; every comparison works on the ids alone.
static INTERNER: Mutex<Option<Interner>> = Mutex::new(None);

fn with_interner<R>(f: impl FnOnce(&mut Interner) -> R) -> R {
    let mut interner = INTERNER.lock();
    f(interner.get_or_insert_with(Interner::default))
}

impl Atom {
    /// Interns `name`. The same text always yields the same atom, no
    /// matter which thread interned it first.
    pub fn new(name: &str) -> Self {
        with_interner(|interner| interner.intern(name))
    }

    /// The atom text, shared with the interner.
    pub fn as_str(&self) -> Arc<str> {
        with_interner(|interner| interner.name_of(*self))
    }

    /// Length of the atom text in bytes.
    pub fn len(&self) -> usize {
        self.as_str().len()
    }

    /// Returns `true` for the empty atom `''`.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Atom {
    fn from(name: &str) -> Self {
        Atom::new(name)
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({:?})", self.as_str())
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// Interns an atom.
///
/// A bare string literal is interned as written; with further arguments
/// the literal acts as a `format!` string.
///
/// # Examples
///
/// ```
/// use waxwing::atom;
///
/// let rex = atom!("rex");
/// let node = atom!("worker_{}@{}", 3, "localhost");
/// assert_eq!(&*node.as_str(), "worker_3@localhost");
/// ```
#[macro_export]
macro_rules! atom {
    ($name:literal) => {
        $crate::atom::Atom::new($name)
    };
    ($fmt:literal, $($arg:tt)+) => {
        $crate::atom::Atom::new(&format!($fmt, $($arg)+))
    };
}
