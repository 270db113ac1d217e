//! Term decoder.
//!
//! Parses External Term Format bytes back into [`Term`] values. The
//! decoder accepts the full tag set the encoder emits plus the legacy
//! Latin-1 atom tags real peers still send, and inflates zlib-compressed
//! terms transparently. Integers normalize to [`Term::Int`] whenever the
//! value fits, so `decode(encode(x)) == x` holds on values regardless of
//! the wire tag they travelled under.

use super::{tag, Term, WireScope, VERSION};
use crate::atom::Atom;
use crate::core::{Pid, Ref};
use flate2::read::ZlibDecoder;
use malachite::Integer;
use std::io::Read;
use thiserror::Error;

/// Errors the decoder can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// First byte was not the term format version.
    #[error("bad version byte {0}, expected 131")]
    BadVersion(u8),

    /// A tag outside the supported set.
    #[error("unknown term tag {0}")]
    UnknownTag(u8),

    /// Input ended in the middle of a term.
    #[error("truncated input")]
    TruncatedInput,

    /// A compressed term did not inflate to the advertised size.
    #[error("decompress failed: {0}")]
    DecompressFailed(String),

    /// Atom bytes were not valid text.
    #[error("atom bytes are not valid UTF-8")]
    InvalidAtom,

    /// A reference with zero or more than five id words.
    #[error("reference carries {0} id words, expected 1 to 5")]
    InvalidRef(u16),
}

/// Decodes one version-prefixed term, ignoring any trailing bytes.
pub fn decode(bytes: &[u8], scope: Option<WireScope>) -> Result<Term, DecodeError> {
    decode_stream(bytes, scope).map(|(term, _)| term)
}

/// Decodes one version-prefixed term and reports how many bytes it used,
/// so a caller can pull several consecutive terms out of one buffer (a
/// distribution frame carries a control term and often a payload term).
pub fn decode_stream(
    bytes: &[u8],
    scope: Option<WireScope>,
) -> Result<(Term, usize), DecodeError> {
    let mut cursor = Cursor::new(bytes);
    let version = cursor.u8()?;
    if version != VERSION {
        return Err(DecodeError::BadVersion(version));
    }

    if cursor.peek() == Some(tag::COMPRESSED) {
        cursor.u8()?;
        let expected = cursor.u32()? as usize;
        let mut inflater = ZlibDecoder::new(cursor.rest());
        let mut inflated = Vec::with_capacity(expected);
        inflater
            .read_to_end(&mut inflated)
            .map_err(|e| DecodeError::DecompressFailed(e.to_string()))?;
        if inflated.len() != expected {
            return Err(DecodeError::DecompressFailed(format!(
                "inflated to {} bytes, header said {}",
                inflated.len(),
                expected
            )));
        }
        let consumed = cursor.pos + inflater.total_in() as usize;

        // The compressed body is a bare term, no inner version byte.
        let mut inner = Cursor::new(&inflated);
        let term = dec_term(&mut inner, scope)?;
        return Ok((term, consumed));
    }

    let term = dec_term(&mut cursor, scope)?;
    Ok((term, cursor.pos))
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.data.len() - self.pos < n {
            return Err(DecodeError::TruncatedInput);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

fn dec_term(cursor: &mut Cursor<'_>, scope: Option<WireScope>) -> Result<Term, DecodeError> {
    let tag_byte = cursor.u8()?;
    match tag_byte {
        tag::SMALL_INTEGER_EXT => Ok(Term::Int(cursor.u8()? as i64)),
        tag::INTEGER_EXT => Ok(Term::Int(cursor.u32()? as i32 as i64)),
        tag::SMALL_BIG_EXT => {
            let len = cursor.u8()? as usize;
            dec_big(cursor, len)
        }
        tag::LARGE_BIG_EXT => {
            let len = cursor.u32()? as usize;
            dec_big(cursor, len)
        }
        tag::NEW_FLOAT_EXT => {
            let b = cursor.take(8)?;
            let bits = u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
            Ok(Term::Float(f64::from_bits(bits)))
        }
        tag::SMALL_ATOM_UTF8_EXT
        | tag::ATOM_UTF8_EXT
        | tag::ATOM_EXT
        | tag::SMALL_ATOM_EXT => {
            let atom = dec_atom_body(cursor, tag_byte)?;
            Ok(Term::Atom(atom))
        }
        tag::SMALL_TUPLE_EXT => {
            let arity = cursor.u8()? as usize;
            dec_tuple(cursor, arity, scope)
        }
        tag::LARGE_TUPLE_EXT => {
            let arity = cursor.u32()? as usize;
            dec_tuple(cursor, arity, scope)
        }
        tag::NIL_EXT => Ok(Term::Nil),
        tag::STRING_EXT => {
            let len = cursor.u16()? as usize;
            let bytes = cursor.take(len)?;
            Ok(Term::list(
                bytes.iter().map(|&b| Term::Int(b as i64)).collect(),
            ))
        }
        tag::LIST_EXT => {
            let len = cursor.u32()? as usize;
            let mut elements = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                elements.push(dec_term(cursor, scope)?);
            }
            let tail = dec_term(cursor, scope)?;
            if elements.is_empty() {
                Ok(tail)
            } else {
                Ok(Term::List {
                    elements,
                    tail: Box::new(tail),
                })
            }
        }
        tag::BINARY_EXT => {
            let len = cursor.u32()? as usize;
            Ok(Term::Binary(cursor.take(len)?.to_vec()))
        }
        tag::MAP_EXT => {
            let arity = cursor.u32()? as usize;
            let mut pairs = Vec::with_capacity(arity.min(4096));
            for _ in 0..arity {
                let key = dec_term(cursor, scope)?;
                let value = dec_term(cursor, scope)?;
                pairs.push((key, value));
            }
            Ok(Term::Map(pairs))
        }
        tag::NEW_PID_EXT => {
            let node = dec_atom(cursor)?;
            let id = cursor.u32()?;
            let serial = cursor.u32()?;
            let creation = cursor.u32()?;
            let pid = Pid::external(node, id, serial, creation);
            Ok(Term::Pid(elide_pid(pid, scope)))
        }
        tag::NEWER_REFERENCE_EXT => {
            let len = cursor.u16()?;
            if len == 0 || len as usize > Ref::MAX_WORDS {
                return Err(DecodeError::InvalidRef(len));
            }
            let node = dec_atom(cursor)?;
            let creation = cursor.u32()?;
            let mut words = Vec::with_capacity(len as usize);
            for _ in 0..len {
                words.push(cursor.u32()?);
            }
            let reference = Ref::external(node, creation, words);
            Ok(Term::Ref(elide_ref(reference, scope)))
        }
        other => Err(DecodeError::UnknownTag(other)),
    }
}

fn dec_tuple(
    cursor: &mut Cursor<'_>,
    arity: usize,
    scope: Option<WireScope>,
) -> Result<Term, DecodeError> {
    let mut elements = Vec::with_capacity(arity.min(4096));
    for _ in 0..arity {
        elements.push(dec_term(cursor, scope)?);
    }
    Ok(Term::Tuple(elements))
}

/// Reads a tagged atom; used where the grammar requires an atom, such as
/// the node field of PIDs and references.
fn dec_atom(cursor: &mut Cursor<'_>) -> Result<Atom, DecodeError> {
    let tag_byte = cursor.u8()?;
    dec_atom_body(cursor, tag_byte)
}

fn dec_atom_body(cursor: &mut Cursor<'_>, tag_byte: u8) -> Result<Atom, DecodeError> {
    let (len, latin1) = match tag_byte {
        tag::SMALL_ATOM_UTF8_EXT => (cursor.u8()? as usize, false),
        tag::ATOM_UTF8_EXT => (cursor.u16()? as usize, false),
        tag::SMALL_ATOM_EXT => (cursor.u8()? as usize, true),
        tag::ATOM_EXT => (cursor.u16()? as usize, true),
        other => return Err(DecodeError::UnknownTag(other)),
    };
    let bytes = cursor.take(len)?;
    let name = if latin1 {
        bytes.iter().map(|&b| b as char).collect()
    } else {
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidAtom)?
    };
    Ok(Atom::new(&name))
}

/// Builds the integer from a little-endian magnitude, normalizing to
/// `Term::Int` when the value fits `i64`.
fn dec_big(cursor: &mut Cursor<'_>, len: usize) -> Result<Term, DecodeError> {
    let negative = cursor.u8()? != 0;
    let bytes = cursor.take(len)?;

    let mut value = Integer::from(0);
    let mut multiplier = Integer::from(1u32);
    for &byte in bytes {
        value += Integer::from(byte) * &multiplier;
        multiplier *= Integer::from(256u32);
    }
    if negative {
        value = -value;
    }

    match i64::try_from(&value) {
        Ok(small) => Ok(Term::Int(small)),
        Err(_) => Ok(Term::BigInt(value)),
    }
}

fn elide_pid(pid: Pid, scope: Option<WireScope>) -> Pid {
    match scope {
        Some(scope)
            if pid.node() == Some(scope.local_name)
                && pid.creation() == scope.local_creation =>
        {
            pid.elided()
        }
        _ => pid,
    }
}

fn elide_ref(reference: Ref, scope: Option<WireScope>) -> Ref {
    match scope {
        Some(scope)
            if reference.node() == Some(scope.local_name)
                && reference.creation() == scope.local_creation =>
        {
            reference.elided()
        }
        _ => reference,
    }
}
