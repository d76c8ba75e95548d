//! Scoped identifiers for the obshub persistence core.
//!
//! Every stored resource is keyed by a [`ScopedId`]: a 32-bit scope (which
//! database or provider issued the id) plus an opaque local id. This crate
//! provides the identifier type, its canonical byte and text encodings, and
//! the per-resource-kind [`IdEncoder`] used to obfuscate ids before they
//! leave the process.
//!
//! # Encodings
//!
//! | Form | Layout |
//! |------|--------|
//! | byte form | `[varint scope][local bytes]` |
//! | text form | base32hex (RFC 4648 §7), lower-case, unpadded, of the byte form |
//! | external form | base32hex of the byte form after a keyed Feistel permutation |
//!
//! # Usage
//!
//! ```rust,ignore
//! use obshub_id::{IdEncoders, ResourceKind, ScopedId};
//!
//! let id = ScopedId::from_long(1, 42)?;
//! let text = id.to_string();
//! assert_eq!(text.parse::<ScopedId>()?, id);
//!
//! let encoders = IdEncoders::generate()?;
//! let public = encoders.encode(ResourceKind::DataStream, &id);
//! assert_eq!(encoders.decode(ResourceKind::DataStream, &public)?, id);
//! ```

pub mod base32;
mod encoder;
mod error;
mod scoped_id;
pub mod varint;

pub use encoder::{IdEncoder, IdEncoders, ResourceKind};
pub use error::IdError;
pub use scoped_id::ScopedId;
