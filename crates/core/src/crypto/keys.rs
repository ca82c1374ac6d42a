//! Key material decoded from a key generator frame
//!
//! A generator emits one frame per keypair:
//!
//! ```text
//! [0, 64)    public key   (hex text)
//! [64]       separator    (ignored)
//! [65, 193)  private key  (hex text of seed || public key)
//! ```
//!
//! Every byte of the frame is XORed with a single-byte mask. The mask only
//! undoes the generator's scrambling; it is not a confidentiality layer.

use ed25519_dalek::SigningKey;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::frame::{DEFAULT_MASK, FRAME_LEN, PRIVATE_LEN, PUBLIC_LEN, SEPARATOR_LEN};
use crate::error::{ConfigError, ProvisionError};

/// Byte width of a raw Ed25519 public key
const RAW_PUBLIC_LEN: usize = PUBLIC_LEN / 2;

/// Byte width of a raw private key (seed || public key)
const RAW_PRIVATE_LEN: usize = PRIVATE_LEN / 2;

/// XOR every byte with `mask`. Applying it twice restores the input.
pub fn apply_mask(buf: &mut [u8], mask: u8) {
    for byte in buf.iter_mut() {
        *byte ^= mask;
    }
}

/// What to do with bytes that follow a complete frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingBytes {
    /// Drop them. Generators commonly append a line terminator.
    #[default]
    Ignore,
    /// Treat anything past the frame as a malformed frame
    Reject,
}

/// How raw generator output is turned into [`KeyMaterial`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLayout {
    pub mask: u8,
    pub trailing: TrailingBytes,
}

impl Default for DecodeLayout {
    fn default() -> Self {
        Self {
            mask: DEFAULT_MASK,
            trailing: TrailingBytes::default(),
        }
    }
}

impl DecodeLayout {
    pub fn with_mask(mut self, mask: u8) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_trailing(mut self, trailing: TrailingBytes) -> Self {
        self.trailing = trailing;
        self
    }

    /// Decode one frame of raw generator output.
    ///
    /// The buffer is consumed and wiped whether or not decoding succeeds.
    pub fn decode(&self, mut raw: Vec<u8>) -> Result<KeyMaterial, ProvisionError> {
        let result = self.decode_frame(&mut raw);
        raw.zeroize();
        result
    }

    fn decode_frame(&self, raw: &mut [u8]) -> Result<KeyMaterial, ProvisionError> {
        if raw.len() < FRAME_LEN {
            return Err(ProvisionError::TruncatedOutput {
                expected: FRAME_LEN,
                actual: raw.len(),
            });
        }

        if raw.len() > FRAME_LEN {
            match self.trailing {
                TrailingBytes::Reject => {
                    return Err(ProvisionError::UnexpectedLength {
                        expected: FRAME_LEN,
                        actual: raw.len(),
                    });
                }
                TrailingBytes::Ignore => {
                    debug!("Ignoring {} trailing bytes after key frame", raw.len() - FRAME_LEN);
                }
            }
        }

        let frame = &mut raw[..FRAME_LEN];
        apply_mask(frame, self.mask);

        let (public_key, rest) = frame.split_at(PUBLIC_LEN);
        let private_key = &rest[SEPARATOR_LEN..];

        Ok(KeyMaterial {
            public_key: public_key.to_vec(),
            private_key: private_key.to_vec(),
        })
    }
}

/// A public/private key pair of fixed widths
///
/// Wiped on drop. There is no way to clear it in place, so a live value always
/// holds both halves.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    public_key: Vec<u8>,
    private_key: Vec<u8>,
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.public_key.zeroize();
        self.private_key.zeroize();
    }
}

impl ZeroizeOnDrop for KeyMaterial {}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("public_key", &String::from_utf8_lossy(&self.public_key))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl KeyMaterial {
    /// Build key material from two regions, or `None` if either has the wrong width.
    pub fn from_parts(public_key: &[u8], private_key: &[u8]) -> Option<Self> {
        if public_key.len() != PUBLIC_LEN || private_key.len() != PRIVATE_LEN {
            return None;
        }
        Some(Self {
            public_key: public_key.to_vec(),
            private_key: private_key.to_vec(),
        })
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    pub fn public_key_str(&self) -> Result<&str, ProvisionError> {
        std::str::from_utf8(&self.public_key).map_err(|_| ProvisionError::InvalidKeyText)
    }

    pub fn private_key_str(&self) -> Result<&str, ProvisionError> {
        std::str::from_utf8(&self.private_key).map_err(|_| ProvisionError::InvalidKeyText)
    }

    /// Check that both halves are hex and belong to the same Ed25519 key.
    pub fn verify_pair(&self) -> Result<(), ConfigError> {
        let public_hex = std::str::from_utf8(&self.public_key).map_err(|_| ConfigError::MalformedKey {
            field: "PublicKey",
            expected: PUBLIC_LEN,
        })?;
        let private_hex = std::str::from_utf8(&self.private_key).map_err(|_| ConfigError::MalformedKey {
            field: "PrivateKey",
            expected: PRIVATE_LEN,
        })?;
        check_keypair(public_hex, private_hex)
    }
}

/// Decode a hex public key, rejecting anything but `PUBLIC_LEN` hex characters.
pub fn parse_public_key(hex_str: &str) -> Option<[u8; RAW_PUBLIC_LEN]> {
    let mut out = [0u8; RAW_PUBLIC_LEN];
    hex::decode_to_slice(hex_str, &mut out).ok()?;
    Some(out)
}

/// Verify that a hex private key (seed || public) matches a hex public key.
pub fn check_keypair(public_hex: &str, private_hex: &str) -> Result<(), ConfigError> {
    let public = parse_public_key(public_hex).ok_or(ConfigError::MalformedKey {
        field: "PublicKey",
        expected: PUBLIC_LEN,
    })?;

    let mut private = [0u8; RAW_PRIVATE_LEN];
    hex::decode_to_slice(private_hex, &mut private).map_err(|_| ConfigError::MalformedKey {
        field: "PrivateKey",
        expected: PRIVATE_LEN,
    })?;

    let mut seed = [0u8; RAW_PUBLIC_LEN];
    seed.copy_from_slice(&private[..RAW_PUBLIC_LEN]);
    let derived = SigningKey::from_bytes(&seed).verifying_key().to_bytes();
    let embedded_matches = private[RAW_PUBLIC_LEN..] == public;

    seed.zeroize();
    private.zeroize();

    if derived != public || !embedded_matches {
        return Err(ConfigError::KeypairMismatch);
    }
    Ok(())
}
