//! Process exit reasons.
//!
//! An [`ExitReason`] is the term a process terminates with. Two atoms get
//! dedicated variants because the runtime treats them specially: `normal`
//! (not propagated through links) and `kill` (terminates unconditionally,
//! recorded and propagated as `killed`). Every other reason is an arbitrary
//! term carried verbatim through exit signals, local and remote alike.

use crate::atom;
use crate::term::Term;
use std::fmt;

/// The reason a process exited.
#[derive(Clone, Debug, PartialEq)]
pub enum ExitReason {
    /// The process finished its work; links ignore this.
    Normal,
    /// Unconditional termination request. A process killed this way is
    /// recorded as having exited with [`ExitReason::Killed`].
    Kill,
    /// What the victim of a `kill` actually exits with, and what its
    /// linked peers receive.
    Killed,
    /// Any other reason, carried as an Erlang term.
    Other(Term),
}

impl ExitReason {
    /// Returns `true` for `normal`, the reason links do not propagate.
    #[inline]
    pub fn is_normal(&self) -> bool {
        matches!(self, ExitReason::Normal)
    }

    /// Returns `true` for the unconditional `kill` request.
    #[inline]
    pub fn is_kill(&self) -> bool {
        matches!(self, ExitReason::Kill)
    }

    /// An error reason from any displayable value, as the atom-free
    /// convenience most callers want.
    pub fn error(reason: impl fmt::Display) -> Self {
        ExitReason::Other(Term::Binary(reason.to_string().into_bytes()))
    }

    /// The reason as an Erlang term, for exit signals on the wire.
    pub fn to_term(&self) -> Term {
        match self {
            ExitReason::Normal => Term::Atom(atom!("normal")),
            ExitReason::Kill => Term::Atom(atom!("kill")),
            ExitReason::Killed => Term::Atom(atom!("killed")),
            ExitReason::Other(term) => term.clone(),
        }
    }

    /// Parses a reason term received in an exit signal.
    pub fn from_term(term: Term) -> Self {
        match &term {
            Term::Atom(a) if *a == atom!("normal") => ExitReason::Normal,
            Term::Atom(a) if *a == atom!("kill") => ExitReason::Kill,
            Term::Atom(a) if *a == atom!("killed") => ExitReason::Killed,
            _ => ExitReason::Other(term),
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Normal => write!(f, "normal"),
            ExitReason::Kill => write!(f, "kill"),
            ExitReason::Killed => write!(f, "killed"),
            ExitReason::Other(term) => write!(f, "{}", term),
        }
    }
}

impl From<Term> for ExitReason {
    fn from(term: Term) -> Self {
        ExitReason::from_term(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_atoms_round_trip() {
        for reason in [ExitReason::Normal, ExitReason::Kill, ExitReason::Killed] {
            assert_eq!(ExitReason::from_term(reason.to_term()), reason);
        }
    }

    #[test]
    fn other_terms_carried_verbatim() {
        let term = Term::tuple(vec![Term::atom("badarg"), Term::int(3)]);
        let reason = ExitReason::from_term(term.clone());
        assert_eq!(reason, ExitReason::Other(term.clone()));
        assert_eq!(reason.to_term(), term);
    }

    #[test]
    fn classification() {
        assert!(ExitReason::Normal.is_normal());
        assert!(!ExitReason::Kill.is_normal());
        assert!(ExitReason::Kill.is_kill());
        assert!(!ExitReason::Killed.is_kill());
        assert!(!ExitReason::Other(Term::atom("oops")).is_normal());
    }
}
