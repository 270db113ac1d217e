//! Node names.
//!
//! Every participant in Erlang distribution is named `short@host`. The
//! short part identifies the node on its host, the host part is where EPMD
//! answers for it. Any atom used as a node identifier must parse into this
//! shape; anything else is rejected before a connection is attempted.

use crate::atom::Atom;
use std::fmt;
use thiserror::Error;

/// A parsed `short@host` node name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeName {
    short: String,
    host: String,
}

/// Error for node names that do not match `short@host`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid node name {0:?}: expected short@host")]
pub struct InvalidNodeName(pub String);

impl NodeName {
    /// Parses a `short@host` name.
    ///
    /// Exactly one `@` with non-empty text on both sides is required.
    pub fn parse(name: &str) -> Result<Self, InvalidNodeName> {
        match name.split_once('@') {
            Some((short, host))
                if !short.is_empty() && !host.is_empty() && !host.contains('@') =>
            {
                Ok(Self {
                    short: short.to_string(),
                    host: host.to_string(),
                })
            }
            _ => Err(InvalidNodeName(name.to_string())),
        }
    }

    /// Parses a node name given as an atom.
    pub fn parse_atom(name: Atom) -> Result<Self, InvalidNodeName> {
        Self::parse(&name.as_str())
    }

    /// The part before the `@`.
    pub fn short(&self) -> &str {
        &self.short
    }

    /// The host part after the `@`.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The full `short@host` name as an atom.
    pub fn as_atom(&self) -> Atom {
        Atom::new(&format!("{}@{}", self.short, self.host))
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.short, self.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom;

    #[test]
    fn parse_ok() {
        let name = NodeName::parse("rabbit@warren").unwrap();
        assert_eq!(name.short(), "rabbit");
        assert_eq!(name.host(), "warren");
        assert_eq!(name.as_atom(), atom!("rabbit@warren"));
        assert_eq!(format!("{}", name), "rabbit@warren");
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["", "noat", "@host", "name@", "a@b@c"] {
            assert!(NodeName::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
