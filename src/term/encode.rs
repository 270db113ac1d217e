//! Term encoder.
//!
//! Produces the External Term Format bytes for a [`Term`], always prefixed
//! with the version byte. Integers pick the smallest tag that fits the
//! value; atoms are written UTF-8 (SMALL_ATOM_UTF8 when the name fits a
//! byte length, ATOM_UTF8 otherwise); proper lists of byte-sized integers
//! collapse to STRING_EXT exactly as an Erlang VM would emit them.

use super::{tag, Term, WireScope, VERSION};
use malachite::Integer;
use thiserror::Error;

/// Errors the encoder can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// A local PID or reference was encoded without a connection scope to
    /// supply the node identity.
    #[error("local pid/ref needs a connection scope to name its node")]
    MissingScope,

    /// Atom text exceeds the 65535-byte wire limit.
    #[error("atom of {0} bytes exceeds the wire limit")]
    AtomTooLong(usize),
}

/// Encodes a term, version byte included.
///
/// `scope` is the identity of the connection the bytes are written to; it
/// is only consulted for local PIDs and references and may be `None` for
/// terms that contain neither.
pub fn encode(term: &Term, scope: Option<WireScope>) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(64);
    out.push(VERSION);
    enc_term(&mut out, term, scope)?;
    Ok(out)
}

fn enc_term(out: &mut Vec<u8>, term: &Term, scope: Option<WireScope>) -> Result<(), EncodeError> {
    match term {
        Term::Int(n) => enc_int(out, *n),
        Term::BigInt(n) => {
            let (magnitude, negative) = big_magnitude_le(n);
            enc_big(out, &magnitude, negative);
        }
        Term::Float(x) => {
            out.push(tag::NEW_FLOAT_EXT);
            out.extend_from_slice(&x.to_bits().to_be_bytes());
        }
        Term::Atom(a) => enc_atom(out, &a.as_str())?,
        Term::Tuple(elements) => {
            if elements.len() <= u8::MAX as usize {
                out.push(tag::SMALL_TUPLE_EXT);
                out.push(elements.len() as u8);
            } else {
                out.push(tag::LARGE_TUPLE_EXT);
                out.extend_from_slice(&(elements.len() as u32).to_be_bytes());
            }
            for element in elements {
                enc_term(out, element, scope)?;
            }
        }
        Term::Nil => out.push(tag::NIL_EXT),
        Term::List { elements, tail } => {
            if let Some(bytes) = as_string_bytes(elements, tail) {
                out.push(tag::STRING_EXT);
                out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                out.extend_from_slice(&bytes);
            } else {
                out.push(tag::LIST_EXT);
                out.extend_from_slice(&(elements.len() as u32).to_be_bytes());
                for element in elements {
                    enc_term(out, element, scope)?;
                }
                enc_term(out, tail, scope)?;
            }
        }
        Term::Binary(bytes) => {
            out.push(tag::BINARY_EXT);
            out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            out.extend_from_slice(bytes);
        }
        Term::Map(pairs) => {
            out.push(tag::MAP_EXT);
            out.extend_from_slice(&(pairs.len() as u32).to_be_bytes());
            for (key, value) in pairs {
                enc_term(out, key, scope)?;
                enc_term(out, value, scope)?;
            }
        }
        Term::Pid(pid) => {
            let (node, creation) = match pid.node() {
                Some(node) => (node, pid.creation()),
                None => {
                    let scope = scope.ok_or(EncodeError::MissingScope)?;
                    (scope.local_name, scope.local_creation)
                }
            };
            out.push(tag::NEW_PID_EXT);
            enc_atom(out, &node.as_str())?;
            out.extend_from_slice(&pid.id().to_be_bytes());
            out.extend_from_slice(&pid.serial().to_be_bytes());
            out.extend_from_slice(&creation.to_be_bytes());
        }
        Term::Ref(r) => {
            let (node, creation) = match r.node() {
                Some(node) => (node, r.creation()),
                None => {
                    let scope = scope.ok_or(EncodeError::MissingScope)?;
                    (scope.local_name, scope.local_creation)
                }
            };
            out.push(tag::NEWER_REFERENCE_EXT);
            out.extend_from_slice(&(r.words().len() as u16).to_be_bytes());
            enc_atom(out, &node.as_str())?;
            out.extend_from_slice(&creation.to_be_bytes());
            for word in r.words() {
                out.extend_from_slice(&word.to_be_bytes());
            }
        }
    }
    Ok(())
}

/// Smallest-fitting integer encoding: SMALL_INTEGER for 0..=255, INTEGER
/// for the signed 32-bit range, SMALL_BIG beyond that.
fn enc_int(out: &mut Vec<u8>, n: i64) {
    if (0..=255).contains(&n) {
        out.push(tag::SMALL_INTEGER_EXT);
        out.push(n as u8);
    } else if let Ok(n32) = i32::try_from(n) {
        out.push(tag::INTEGER_EXT);
        out.extend_from_slice(&n32.to_be_bytes());
    } else {
        let mut magnitude = n.unsigned_abs().to_le_bytes().to_vec();
        while magnitude.last() == Some(&0) {
            magnitude.pop();
        }
        enc_big(out, &magnitude, n < 0);
    }
}

fn enc_big(out: &mut Vec<u8>, magnitude: &[u8], negative: bool) {
    if magnitude.len() <= u8::MAX as usize {
        out.push(tag::SMALL_BIG_EXT);
        out.push(magnitude.len() as u8);
    } else {
        out.push(tag::LARGE_BIG_EXT);
        out.extend_from_slice(&(magnitude.len() as u32).to_be_bytes());
    }
    out.push(u8::from(negative));
    out.extend_from_slice(magnitude);
}

fn enc_atom(out: &mut Vec<u8>, name: &str) -> Result<(), EncodeError> {
    let bytes = name.as_bytes();
    if bytes.len() <= u8::MAX as usize {
        out.push(tag::SMALL_ATOM_UTF8_EXT);
        out.push(bytes.len() as u8);
    } else if bytes.len() <= u16::MAX as usize {
        out.push(tag::ATOM_UTF8_EXT);
        out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    } else {
        return Err(EncodeError::AtomTooLong(bytes.len()));
    }
    out.extend_from_slice(bytes);
    Ok(())
}

/// Little-endian magnitude and sign of an arbitrary-precision integer,
/// extracted by repeated division.
fn big_magnitude_le(value: &Integer) -> (Vec<u8>, bool) {
    let zero = Integer::from(0);
    let negative = *value < zero;
    let mut v = if negative {
        -value.clone()
    } else {
        value.clone()
    };
    if v == zero {
        return (vec![0], false);
    }

    let base = Integer::from(256u32);
    let mut magnitude = Vec::new();
    while v > zero {
        let rem = &v % &base;
        magnitude.push(u64::try_from(&rem).unwrap_or(0) as u8);
        v = &v / &base;
    }
    (magnitude, negative)
}

/// A proper list of 1..=65535 byte-valued integers qualifies for
/// STRING_EXT.
fn as_string_bytes(elements: &[Term], tail: &Term) -> Option<Vec<u8>> {
    if !tail.is_nil() || elements.is_empty() || elements.len() > u16::MAX as usize {
        return None;
    }
    elements
        .iter()
        .map(|element| match element {
            Term::Int(n) if (0..=255).contains(n) => Some(*n as u8),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom;
    use crate::core::Pid;

    fn bytes(term: &Term) -> Vec<u8> {
        encode(term, None).unwrap()
    }

    #[test]
    fn known_integer_vectors() {
        assert_eq!(bytes(&Term::int(-1)), vec![131, 98, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(
            bytes(&Term::int(-0x8000_0000)),
            vec![131, 98, 0x80, 0x00, 0x00, 0x00]
        );
        assert_eq!(bytes(&Term::int(255)), vec![131, 97, 255]);
        assert_eq!(
            bytes(&Term::int(-1000)),
            vec![131, 98, 0xFF, 0xFF, 0xFC, 0x18]
        );
    }

    #[test]
    fn tag_minimality() {
        assert_eq!(bytes(&Term::int(0))[1], tag::SMALL_INTEGER_EXT);
        assert_eq!(bytes(&Term::int(255))[1], tag::SMALL_INTEGER_EXT);
        assert_eq!(bytes(&Term::int(256))[1], tag::INTEGER_EXT);
        assert_eq!(bytes(&Term::int(i32::MAX as i64))[1], tag::INTEGER_EXT);
        assert_eq!(bytes(&Term::int(-1))[1], tag::INTEGER_EXT);
        assert_eq!(bytes(&Term::int(i32::MIN as i64))[1], tag::INTEGER_EXT);
        assert_eq!(
            bytes(&Term::int(i32::MAX as i64 + 1))[1],
            tag::SMALL_BIG_EXT
        );
        assert_eq!(
            bytes(&Term::int(i32::MIN as i64 - 1))[1],
            tag::SMALL_BIG_EXT
        );
    }

    #[test]
    fn small_big_layout() {
        // 2^32 = [0, 0, 0, 0, 1] little-endian.
        assert_eq!(
            bytes(&Term::int(1 << 32)),
            vec![131, 110, 5, 0, 0, 0, 0, 0, 1]
        );
        // Sign byte is 1 for negatives.
        assert_eq!(
            bytes(&Term::int(-(1 << 32))),
            vec![131, 110, 5, 1, 0, 0, 0, 0, 1]
        );
    }

    #[test]
    fn i64_min_magnitude() {
        // unsigned_abs of i64::MIN must not overflow.
        assert_eq!(
            bytes(&Term::int(i64::MIN)),
            vec![131, 110, 8, 1, 0, 0, 0, 0, 0, 0, 0, 0x80]
        );
    }

    #[test]
    fn rex_tuple_vector() {
        // {rex, <<"hej">>} under the UTF-8 atom + binary policy.
        let term = Term::tuple(vec![Term::atom("rex"), Term::binary(&b"hej"[..])]);
        assert_eq!(
            bytes(&term),
            vec![
                131, 104, 2, 119, 3, b'r', b'e', b'x', 109, 0, 0, 0, 3, b'h', b'e', b'j'
            ]
        );
    }

    #[test]
    fn charlist_uses_string_ext() {
        let encoded = bytes(&Term::charlist("hej"));
        assert_eq!(encoded, vec![131, 107, 0, 3, b'h', b'e', b'j']);
    }

    #[test]
    fn list_with_non_byte_element_uses_list_ext() {
        let term = Term::list(vec![Term::int(1), Term::int(1000)]);
        assert_eq!(bytes(&term)[1], tag::LIST_EXT);
    }

    #[test]
    fn float_bits() {
        let encoded = bytes(&Term::Float(1.5));
        assert_eq!(encoded[1], tag::NEW_FLOAT_EXT);
        assert_eq!(encoded[2..10], 1.5f64.to_bits().to_be_bytes());

        let inf = bytes(&Term::Float(f64::INFINITY));
        assert_eq!(inf[2..10], f64::INFINITY.to_bits().to_be_bytes());
    }

    #[test]
    fn local_pid_requires_scope() {
        let term = Term::Pid(Pid::local(1));
        assert_eq!(encode(&term, None), Err(EncodeError::MissingScope));

        let scope = WireScope {
            local_name: atom!("us@box"),
            local_creation: 9,
        };
        let encoded = encode(&term, Some(scope)).unwrap();
        assert_eq!(encoded[1], tag::NEW_PID_EXT);
        // Trailing four bytes are the stamped creation.
        assert_eq!(encoded[encoded.len() - 4..], 9u32.to_be_bytes());
    }

    #[test]
    fn remote_pid_needs_no_scope() {
        let term = Term::Pid(Pid::external(atom!("other@host"), 7, 0, 3));
        assert!(encode(&term, None).is_ok());
    }

    #[test]
    fn bigint_encoding() {
        let huge = Integer::from(u64::MAX) * Integer::from(u64::MAX);
        let encoded = bytes(&Term::BigInt(huge));
        assert_eq!(encoded[1], tag::SMALL_BIG_EXT);
        assert_eq!(encoded[2], 16); // 128-bit magnitude
        assert_eq!(encoded[3], 0); // non-negative
    }
}
