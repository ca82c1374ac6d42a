//! Global constants for mesh node configuration

use std::time::Duration;

/// Key generator wire frame
pub mod frame {
    /// Width of the public key region (hex text of a 32-byte Ed25519 key)
    pub const PUBLIC_LEN: usize = 64;

    /// Width of the separator between the two key regions
    pub const SEPARATOR_LEN: usize = 1;

    /// Width of the private key region (hex text of seed || public key)
    pub const PRIVATE_LEN: usize = 128;

    /// Total bytes a generator must emit for one keypair
    pub const FRAME_LEN: usize = PUBLIC_LEN + SEPARATOR_LEN + PRIVATE_LEN;

    /// Single-byte XOR mask applied by the generator to every output byte
    pub const DEFAULT_MASK: u8 = 0x3F;

    /// Separator written by the native generator. Never checked on decode.
    pub const SEPARATOR: u8 = b'\n';
}

/// External generator process
pub mod generator {
    use super::*;

    /// File name of the external key generator
    #[cfg(windows)]
    pub const PROGRAM_NAME: &str = "realmain.exe";
    #[cfg(not(windows))]
    pub const PROGRAM_NAME: &str = "realmain";

    /// Relative fallback used when the running executable cannot be located
    #[cfg(windows)]
    pub const FALLBACK_PATH: &str = ".\\realmain.exe";
    #[cfg(not(windows))]
    pub const FALLBACK_PATH: &str = "./realmain";

    /// Upper bound on how long a generator may run
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Most output accepted from a generator: one frame plus room for a terminator
    pub const MAX_OUTPUT_LEN: usize = 256;

    /// How often a generator that closed its output is checked for exit
    pub const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);
}

/// Node configuration limits and defaults
pub mod node {
    /// Smallest MTU a TUN adapter may be configured with
    pub const MIN_MTU: u64 = 1280;

    /// Default TUN MTU
    pub const DEFAULT_MTU: u64 = 65535;

    /// Default TUN interface selection
    pub const DEFAULT_IF_NAME: &str = "auto";

    /// Default multicast interface pattern (all interfaces)
    pub const DEFAULT_MULTICAST_REGEX: &str = ".*";

    /// Admin endpoint on platforms with UNIX sockets
    pub const UNIX_ADMIN_LISTEN: &str = "unix:///var/run/yggdrasil.sock";

    /// Admin endpoint elsewhere
    pub const TCP_ADMIN_LISTEN: &str = "tcp://localhost:9001";
}
