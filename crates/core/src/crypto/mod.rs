//! Key material, generators and provisioning

pub mod generator;
pub mod keys;
pub mod provisioner;

pub use generator::*;
pub use keys::*;
pub use provisioner::*;
