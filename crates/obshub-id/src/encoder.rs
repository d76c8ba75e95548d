//! Reversible obfuscation of [`ScopedId`]s for use outside the process.
//!
//! Internal ids are usually allocated in sequence, so exposing them would let
//! a caller infer the existence of neighbouring resources. Each resource kind
//! gets its own [`IdEncoder`] with an independent key; the byte form of an id
//! goes through a keyed, length-preserving Feistel permutation and is then
//! written as base32hex.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::base32;
use crate::error::IdError;
use crate::scoped_id::ScopedId;

type HmacSha256 = Hmac<Sha256>;

/// Size of an encoder key in bytes.
pub const KEY_LEN: usize = 32;

const ROUNDS: u8 = 8;

/// Resource kinds that get their own id encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Feature,
    Procedure,
    System,
    Deployment,
    Foi,
    DataStream,
    Observation,
    CommandStream,
    Command,
    Property,
}

impl ResourceKind {
    /// Every kind, in key-file order.
    pub const ALL: [ResourceKind; 10] = [
        Self::Feature,
        Self::Procedure,
        Self::System,
        Self::Deployment,
        Self::Foi,
        Self::DataStream,
        Self::Observation,
        Self::CommandStream,
        Self::Command,
        Self::Property,
    ];

    /// Returns the canonical label, also used as the key-file entry name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Procedure => "procedure",
            Self::System => "system",
            Self::Deployment => "deployment",
            Self::Foi => "foi",
            Self::DataStream => "datastream",
            Self::Observation => "observation",
            Self::CommandStream => "command_stream",
            Self::Command => "command",
            Self::Property => "property",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encodes and decodes the ids of a single resource kind.
#[derive(Clone)]
pub struct IdEncoder {
    kind: ResourceKind,
    mac: HmacSha256,
}

impl fmt::Debug for IdEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdEncoder")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl IdEncoder {
    /// Creates an encoder keyed with `key`.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidKey`] if the key is rejected by the MAC.
    pub fn new(kind: ResourceKind, key: &[u8; KEY_LEN]) -> Result<Self, IdError> {
        let mac = HmacSha256::new_from_slice(key).map_err(|e| IdError::InvalidKey {
            kind: kind.as_str(),
            reason: e.to_string(),
        })?;
        Ok(Self { kind, mac })
    }

    /// The resource kind this encoder is bound to.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Encodes `id` into its opaque public form.
    pub fn encode(&self, id: &ScopedId) -> String {
        let mut buf = id.to_prefixed_bytes();
        self.permute(&mut buf, true);
        base32::encode(&buf)
    }

    /// Decodes a string produced by [`IdEncoder::encode`] with the same key.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::Decode`] naming `encoded` if it is not valid
    /// base32hex or does not decipher to a well-formed id.
    pub fn decode(&self, encoded: &str) -> Result<ScopedId, IdError> {
        let mut buf =
            base32::decode(encoded).ok_or_else(|| IdError::decode(encoded, "invalid base32"))?;
        self.permute(&mut buf, false);
        ScopedId::from_prefixed_bytes(&buf, encoded)
    }

    /// Unbalanced Feistel network over the whole buffer. Even rounds mix the
    /// right half into the left, odd rounds the left into the right.
    fn permute(&self, buf: &mut [u8], forward: bool) {
        let split = buf.len() / 2;
        let total = buf.len() as u32;
        let (left, right) = buf.split_at_mut(split);

        let mut apply = |round: u8| {
            if round % 2 == 0 {
                let mask = self.round_mask(round, total, right, left.len());
                xor_in_place(left, &mask);
            } else {
                let mask = self.round_mask(round, total, left, right.len());
                xor_in_place(right, &mask);
            }
        };

        if forward {
            (0..ROUNDS).for_each(&mut apply);
        } else {
            (0..ROUNDS).rev().for_each(&mut apply);
        }
    }

    fn round_mask(&self, round: u8, total: u32, input: &[u8], len: usize) -> Vec<u8> {
        let mut mask = Vec::with_capacity(len);
        let mut block = 0u32;
        while mask.len() < len {
            let mut mac = self.mac.clone();
            mac.update(&[round]);
            mac.update(&total.to_le_bytes());
            mac.update(&block.to_le_bytes());
            mac.update(input);
            let digest = mac.finalize().into_bytes();
            let take = (len - mask.len()).min(digest.len());
            mask.extend_from_slice(&digest[..take]);
            block += 1;
        }
        mask
    }
}

fn xor_in_place(target: &mut [u8], mask: &[u8]) {
    for (byte, m) in target.iter_mut().zip(mask) {
        *byte ^= m;
    }
}

/// One [`IdEncoder`] per [`ResourceKind`].
#[derive(Debug, Clone)]
pub struct IdEncoders {
    encoders: HashMap<ResourceKind, IdEncoder>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyFile {
    #[serde(default)]
    keys: BTreeMap<String, String>,
}

impl IdEncoders {
    /// Creates encoders with fresh keys from the operating system RNG.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidKey`] if a key is rejected.
    pub fn generate() -> Result<Self, IdError> {
        Self::from_rng(&mut OsRng)
    }

    /// Creates encoders with keys derived deterministically from `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidKey`] if a key is rejected.
    pub fn from_seed(seed: u64) -> Result<Self, IdError> {
        Self::from_rng(&mut StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: &mut impl RngCore) -> Result<Self, IdError> {
        let mut encoders = HashMap::with_capacity(ResourceKind::ALL.len());
        for kind in ResourceKind::ALL {
            let mut key = [0u8; KEY_LEN];
            rng.fill_bytes(&mut key);
            encoders.insert(kind, IdEncoder::new(kind, &key)?);
        }
        Ok(Self { encoders })
    }

    /// Loads keys from a TOML key file, generating and saving any that are
    /// missing.
    ///
    /// The file holds one base64 key per kind under a `[keys]` table. It is
    /// created if it does not exist, so ids stay stable across restarts.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or written, or
    /// if a stored key is not valid base64 of the right length.
    pub fn load_or_create(path: &Path) -> Result<Self, IdError> {
        let mut file = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str::<KeyFile>(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => KeyFile::default(),
            Err(e) => return Err(IdError::KeyFileIo(e)),
        };

        let mut generated = 0usize;
        let mut encoders = HashMap::with_capacity(ResourceKind::ALL.len());
        for kind in ResourceKind::ALL {
            let key = match file.keys.get(kind.as_str()) {
                Some(encoded) => decode_key(kind, encoded)?,
                None => {
                    let mut key = [0u8; KEY_LEN];
                    OsRng.fill_bytes(&mut key);
                    file.keys
                        .insert(kind.as_str().to_string(), BASE64.encode(key));
                    generated += 1;
                    key
                }
            };
            encoders.insert(kind, IdEncoder::new(kind, &key)?);
        }

        if generated > 0 {
            std::fs::write(path, toml::to_string(&file)?)?;
            tracing::info!(
                path = %path.display(),
                count = generated,
                "generated and saved new id encoder keys"
            );
        }

        Ok(Self { encoders })
    }

    /// Returns the encoder for `kind`.
    pub fn encoder(&self, kind: ResourceKind) -> &IdEncoder {
        // every constructor fills all kinds
        &self.encoders[&kind]
    }

    /// Encodes `id` with the key of `kind`.
    pub fn encode(&self, kind: ResourceKind, id: &ScopedId) -> String {
        self.encoder(kind).encode(id)
    }

    /// Decodes `encoded` with the key of `kind`.
    ///
    /// # Errors
    ///
    /// See [`IdEncoder::decode`].
    pub fn decode(&self, kind: ResourceKind, encoded: &str) -> Result<ScopedId, IdError> {
        self.encoder(kind).decode(encoded)
    }
}

fn decode_key(kind: ResourceKind, encoded: &str) -> Result<[u8; KEY_LEN], IdError> {
    let bytes = BASE64.decode(encoded).map_err(|e| IdError::InvalidKey {
        kind: kind.as_str(),
        reason: e.to_string(),
    })?;
    <[u8; KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| IdError::InvalidKey {
        kind: kind.as_str(),
        reason: format!("expected {KEY_LEN} bytes, got {}", bytes.len()),
    })
}
