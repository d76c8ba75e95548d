//! The [`ScopedId`] value type and its byte/text forms.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::base32;
use crate::error::IdError;
use crate::varint;

/// A namespace-scoped identifier: a 32-bit scope plus opaque local bytes.
///
/// Values are immutable. Equality, hashing and ordering only look at the
/// scope and the canonical local bytes, so a long-backed id and a
/// byte-backed id holding the same bytes are interchangeable.
///
/// Ordering is by scope, then unsigned lexicographic order of the local
/// bytes. Long-backed ids encode their local part as a big-endian VLQ (see
/// [`crate::varint`]).
#[derive(Clone)]
pub struct ScopedId(Repr);

#[derive(Clone)]
enum Repr {
    None,
    Long { scope: i32, id: i64 },
    Bytes { scope: i32, id: Box<[u8]> },
}

impl ScopedId {
    /// The reserved "no id" sentinel: scope 0, empty local part.
    pub const NONE: ScopedId = ScopedId(Repr::None);

    /// Creates a long-backed id.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidLocalId`] if `id <= 0`; zero is reserved
    /// for [`ScopedId::NONE`].
    pub fn from_long(scope: i32, id: i64) -> Result<Self, IdError> {
        if id <= 0 {
            return Err(IdError::InvalidLocalId(id));
        }
        Ok(Self(Repr::Long { scope, id }))
    }

    /// Creates several long-backed ids sharing one scope.
    ///
    /// # Errors
    ///
    /// Fails on the first non-positive id.
    pub fn from_longs(
        scope: i32,
        ids: impl IntoIterator<Item = i64>,
    ) -> Result<Vec<Self>, IdError> {
        ids.into_iter().map(|id| Self::from_long(scope, id)).collect()
    }

    /// Creates a byte-backed id.
    ///
    /// `(0, [])` yields [`ScopedId::NONE`].
    ///
    /// # Errors
    ///
    /// Returns [`IdError::EmptyLocalId`] for an empty local part in any
    /// other scope.
    pub fn from_bytes(scope: i32, id: impl Into<Vec<u8>>) -> Result<Self, IdError> {
        let id = id.into();
        if id.is_empty() {
            if scope == 0 {
                return Ok(Self::NONE);
            }
            return Err(IdError::EmptyLocalId(scope));
        }
        Ok(Self(Repr::Bytes {
            scope,
            id: id.into_boxed_slice(),
        }))
    }

    /// The scope within which the local id is valid.
    pub fn scope(&self) -> i32 {
        match &self.0 {
            Repr::None => 0,
            Repr::Long { scope, .. } | Repr::Bytes { scope, .. } => *scope,
        }
    }

    /// The canonical byte form of the local part.
    pub fn as_bytes(&self) -> Cow<'_, [u8]> {
        match &self.0 {
            Repr::None => Cow::Borrowed(&[]),
            Repr::Long { id, .. } => {
                let mut out = Vec::with_capacity(varint::vlq_len(*id as u64));
                varint::put_vlq(*id as u64, &mut out);
                Cow::Owned(out)
            }
            Repr::Bytes { id, .. } => Cow::Borrowed(id),
        }
    }

    /// The local part as an integer.
    ///
    /// [`ScopedId::NONE`] yields 0. Byte-backed ids succeed when their bytes
    /// are a canonical VLQ of a positive value that fits in 63 bits.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::NotRepresentable`] otherwise. Values are never
    /// truncated.
    pub fn as_long(&self) -> Result<i64, IdError> {
        match &self.0 {
            Repr::None => Ok(0),
            Repr::Long { id, .. } => Ok(*id),
            Repr::Bytes { id, .. } => varint::get_vlq(id)
                .and_then(|v| i64::try_from(v).ok())
                .filter(|v| *v > 0)
                .ok_or(IdError::NotRepresentable),
        }
    }

    /// Size of the local part in bytes.
    pub fn byte_len(&self) -> usize {
        match &self.0 {
            Repr::None => 0,
            Repr::Long { id, .. } => varint::vlq_len(*id as u64),
            Repr::Bytes { id, .. } => id.len(),
        }
    }

    /// Whether this is the [`ScopedId::NONE`] sentinel.
    pub fn is_none(&self) -> bool {
        self.scope() == 0 && self.byte_len() == 0
    }

    /// Whether the local part is stored as an integer.
    pub fn is_long_backed(&self) -> bool {
        matches!(self.0, Repr::Long { .. })
    }

    /// Compares by scope, then unsigned lexicographic local bytes.
    pub fn compare(a: &ScopedId, b: &ScopedId) -> Ordering {
        a.scope()
            .cmp(&b.scope())
            .then_with(|| a.as_bytes().as_ref().cmp(b.as_bytes().as_ref()))
    }

    /// Compares by scope, then numeric local value.
    ///
    /// Agrees in sign with [`ScopedId::compare`] whenever both byte forms
    /// have the same length.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::NotRepresentable`] if either local part has no
    /// integer form.
    pub fn compare_as_long(a: &ScopedId, b: &ScopedId) -> Result<Ordering, IdError> {
        let scopes = a.scope().cmp(&b.scope());
        if scopes != Ordering::Equal {
            return Ok(scopes);
        }
        Ok(a.as_long()?.cmp(&b.as_long()?))
    }

    /// Appends `[LEB128 scope][local bytes]` to `out`.
    pub fn write_prefixed(&self, out: &mut Vec<u8>) {
        varint::put_leb128(u64::from(self.scope() as u32), out);
        out.extend_from_slice(&self.as_bytes());
    }

    /// Returns `[LEB128 scope][local bytes]`.
    pub fn to_prefixed_bytes(&self) -> Vec<u8> {
        let scope = u64::from(self.scope() as u32);
        let mut out = Vec::with_capacity(varint::leb128_len(scope) + self.byte_len());
        self.write_prefixed(&mut out);
        out
    }

    /// Parses the output of [`ScopedId::to_prefixed_bytes`].
    ///
    /// `input` is only used to name the offending value in errors.
    pub(crate) fn from_prefixed_bytes(buf: &[u8], input: &str) -> Result<Self, IdError> {
        let (scope, used) =
            varint::get_leb128(buf).ok_or_else(|| IdError::decode(input, "truncated scope"))?;
        let scope = u32::try_from(scope)
            .map_err(|_| IdError::decode(input, "scope out of range"))? as i32;
        let local = &buf[used..];
        if local.is_empty() && scope != 0 {
            return Err(IdError::decode(input, "empty local id"));
        }
        Self::from_bytes(scope, local).map_err(|_| IdError::decode(input, "invalid local id"))
    }
}

impl PartialEq for ScopedId {
    fn eq(&self, other: &Self) -> bool {
        self.scope() == other.scope() && self.as_bytes() == other.as_bytes()
    }
}

impl Eq for ScopedId {}

impl Hash for ScopedId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scope().hash(state);
        self.as_bytes().as_ref().hash(state);
    }
}

impl PartialOrd for ScopedId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScopedId {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::compare(self, other)
    }
}

impl fmt::Display for ScopedId {
    /// Writes the base32hex text form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&base32::encode(&self.to_prefixed_bytes()))
    }
}

impl fmt::Debug for ScopedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::None => f.write_str("ScopedId::NONE"),
            Repr::Long { scope, id } => write!(f, "ScopedId({scope}:{id})"),
            Repr::Bytes { scope, id } => write!(f, "ScopedId({scope}:{id:02x?})"),
        }
    }
}

impl FromStr for ScopedId {
    type Err = IdError;

    /// Parses the base32hex text form (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let buf = base32::decode(s).ok_or_else(|| IdError::decode(s, "invalid base32"))?;
        Self::from_prefixed_bytes(&buf, s)
    }
}

impl Serialize for ScopedId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScopedId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(id: &ScopedId) -> u64 {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn long_and_bytes_forms_are_equal() {
        let long = ScopedId::from_long(5, 42).expect("valid long id");
        let bytes = ScopedId::from_bytes(5, long.as_bytes().into_owned()).expect("valid byte id");

        assert!(long.is_long_backed());
        assert!(!bytes.is_long_backed());
        assert_eq!(long, bytes);
        assert_eq!(hash_of(&long), hash_of(&bytes));
        assert_eq!(bytes.as_long().expect("bytes are a valid vlq"), 42);
    }

    #[test]
    fn long_ids_must_be_positive() {
        assert!(matches!(
            ScopedId::from_long(1, 0),
            Err(IdError::InvalidLocalId(0))
        ));
        assert!(matches!(
            ScopedId::from_long(1, -7),
            Err(IdError::InvalidLocalId(-7))
        ));
    }

    #[test]
    fn empty_local_is_reserved_for_none() {
        assert_eq!(ScopedId::from_bytes(0, Vec::new()).expect("none"), ScopedId::NONE);
        assert!(matches!(
            ScopedId::from_bytes(3, Vec::new()),
            Err(IdError::EmptyLocalId(3))
        ));
    }

    #[test]
    fn as_long_never_truncates() {
        let wide = ScopedId::from_bytes(1, vec![0xff; 12]).expect("valid byte id");
        assert!(matches!(wide.as_long(), Err(IdError::NotRepresentable)));

        let text = ScopedId::from_bytes(1, b"sensor".to_vec()).expect("valid byte id");
        assert!(matches!(text.as_long(), Err(IdError::NotRepresentable)));
    }

    #[test]
    fn none_sentinel() {
        assert!(ScopedId::NONE.is_none());
        assert_eq!(ScopedId::NONE.scope(), 0);
        assert_eq!(ScopedId::NONE.byte_len(), 0);
        assert_eq!(ScopedId::NONE.as_long().expect("none has a long form"), 0);
        assert_eq!(ScopedId::NONE.to_string(), "00");
        assert_eq!("00".parse::<ScopedId>().expect("parses"), ScopedId::NONE);
    }

    #[test]
    fn ordering_is_scope_then_bytes() {
        let a = ScopedId::from_long(1, 500).expect("valid");
        let b = ScopedId::from_long(2, 1).expect("valid");
        assert!(a < b);

        let c = ScopedId::from_bytes(1, vec![0x01]).expect("valid");
        let d = ScopedId::from_bytes(1, vec![0xf0]).expect("valid");
        assert!(c < d, "bytes compare unsigned");
    }

    #[test]
    fn text_form_round_trips() {
        let id = ScopedId::from_long(-3, 123_456_789).expect("valid");
        let text = id.to_string();
        assert!(text.bytes().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        let parsed: ScopedId = text.parse().expect("round trip");
        assert_eq!(parsed, id);
        assert_eq!(parsed.scope(), -3);

        let upper: ScopedId = text.to_uppercase().parse().expect("case-insensitive");
        assert_eq!(upper, id);
    }

    #[test]
    fn decode_error_names_input() {
        let err = "not-base32!".parse::<ScopedId>().expect_err("should fail");
        assert!(err.to_string().contains("not-base32!"));
        match err {
            IdError::Decode { input, .. } => assert_eq!(input, "not-base32!"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn serde_uses_text_form() {
        let id = ScopedId::from_long(7, 99).expect("valid");
        let json = serde_json::to_string(&id).expect("serialises");
        assert_eq!(json, format!("\"{id}\""));
        let back: ScopedId = serde_json::from_str(&json).expect("deserialises");
        assert_eq!(back, id);
    }
}
