//! Error types for key provisioning and node configuration.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while provisioning a keypair.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The generator program could not be launched
    #[error("failed to launch key generator {program}: {source}")]
    SpawnFailed {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The generator ran but did not complete successfully
    #[error("key generator failed: {0}")]
    GeneratorFailed(#[from] GeneratorFailure),

    /// Generator output is shorter than one key frame
    #[error("truncated generator output: expected {expected} bytes, got {actual}")]
    TruncatedOutput { expected: usize, actual: usize },

    /// Generator output is longer than one key frame and trailing bytes are rejected
    #[error("unexpected generator output length: expected {expected} bytes, got {actual}")]
    UnexpectedLength { expected: usize, actual: usize },

    /// Key bytes cannot be stored as configuration text
    #[error("key material is not valid UTF-8 text")]
    InvalidKeyText,
}

/// Ways a launched generator can fail.
#[derive(Debug, Error)]
pub enum GeneratorFailure {
    /// Process exited with a failure status
    #[error("exited with {0}")]
    Exit(ExitStatus),

    /// Process did not finish within the allowed time and was killed
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// Reading output or waiting for the process failed
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while loading, saving or validating a node configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config format error: {0}")]
    Format(#[from] serde_json::Error),

    /// MTU below the minimum a TUN adapter accepts
    #[error("IfMTU {mtu} is below the minimum of {min}")]
    MtuTooSmall { mtu: u64, min: u64 },

    /// A key field holds something other than hex of the expected width
    #[error("{field} must be {expected} hex characters")]
    MalformedKey { field: &'static str, expected: usize },

    /// AllowedPublicKeys contains an entry that is not a public key
    #[error("AllowedPublicKeys entry {index} is not a {expected}-character hex key")]
    MalformedAllowedKey { index: usize, expected: usize },

    /// Only one half of the keypair is set
    #[error("PublicKey and PrivateKey must be set together")]
    IncompleteKeypair,

    /// Public and private key do not belong together
    #[error("PublicKey does not match PrivateKey")]
    KeypairMismatch,

    /// Multicast interface entry with an empty pattern
    #[error("MulticastInterfaces entry {index} has an empty Regex")]
    EmptyMulticastRegex { index: usize },
}
