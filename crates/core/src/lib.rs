//! Mesh Node Core Library
//!
//! Node configuration and key provisioning for mesh network nodes. Keys come
//! from a key generator (an external program by default) whose masked output
//! is decoded into a fixed-width keypair and installed into [`NodeConfig`].

pub mod config;
pub mod constants;
pub mod crypto;
pub mod defaults;
pub mod error;

// Re-export important types for easier access
pub use config::{MulticastInterfaceConfig, NodeConfig, FIELD_DESCRIPTIONS};
pub use crypto::{
    DecodeLayout, ExternalGenerator, KeyGenerator, KeyMaterial, KeyProvisioner, NativeGenerator,
    TrailingBytes,
};
pub use defaults::{get_defaults, Defaults};
pub use error::{ConfigError, GeneratorFailure, ProvisionError};

/// Generate a keypair with the external generator next to this executable.
pub fn generate_keys() -> Result<KeyMaterial, ProvisionError> {
    KeyProvisioner::external().generate_keys()
}

/// Install a keypair from the external generator into `config`.
///
/// On failure the existing keys are left untouched and the error is returned.
pub fn install_new_keys(config: &mut NodeConfig) -> Result<(), ProvisionError> {
    config.install_new_keys(&KeyProvisioner::external())
}
