//! Key provisioning: run a generator and decode its frame

use tracing::{debug, info, warn};

use crate::crypto::generator::{ExternalGenerator, KeyGenerator, NativeGenerator};
use crate::crypto::keys::{DecodeLayout, KeyMaterial};
use crate::error::ProvisionError;

/// Produces fresh key material from a generator.
///
/// Every call runs the generator again; results are never cached.
pub struct KeyProvisioner {
    generator: Box<dyn KeyGenerator>,
    layout: DecodeLayout,
}

impl std::fmt::Debug for KeyProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyProvisioner")
            .field("generator", &self.generator.describe())
            .field("layout", &self.layout)
            .finish()
    }
}

impl KeyProvisioner {
    pub fn new(generator: impl KeyGenerator + 'static) -> Self {
        Self {
            generator: Box::new(generator),
            layout: DecodeLayout::default(),
        }
    }

    /// Provisioner backed by a closure returning raw frames
    pub fn from_fn<F>(generate: F) -> Self
    where
        F: Fn() -> Result<Vec<u8>, ProvisionError> + Send + Sync + 'static,
    {
        Self::new(generate)
    }

    /// Provisioner backed by the external generator next to this executable
    pub fn external() -> Self {
        Self::new(ExternalGenerator::colocated())
    }

    /// Provisioner backed by in-process Ed25519 generation
    pub fn native() -> Self {
        Self::new(NativeGenerator::default())
    }

    pub fn with_layout(mut self, layout: DecodeLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn layout(&self) -> &DecodeLayout {
        &self.layout
    }

    /// Run the generator once and decode its output.
    ///
    /// Generator failures are returned as-is; output from a failed run is
    /// never decoded.
    pub fn generate_keys(&self) -> Result<KeyMaterial, ProvisionError> {
        let source = self.generator.describe();
        debug!("Requesting new keypair from {}", source);

        let raw = self.generator.generate().map_err(|e| {
            warn!("Key generation via {} failed: {}", source, e);
            e
        })?;

        let keys = self.layout.decode(raw)?;
        info!("Provisioned new keypair from {}", source);
        Ok(keys)
    }
}
