//! Platform defaults for node configuration

use crate::constants::node::{DEFAULT_IF_NAME, DEFAULT_MTU, DEFAULT_MULTICAST_REGEX};

/// Values a fresh configuration starts from on this platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub admin_listen: &'static str,
    pub multicast_regex: &'static str,
    pub if_name: &'static str,
    pub if_mtu: u64,
}

/// Defaults for the platform this binary was built for
pub fn get_defaults() -> Defaults {
    Defaults {
        admin_listen: admin_listen(),
        multicast_regex: DEFAULT_MULTICAST_REGEX,
        if_name: DEFAULT_IF_NAME,
        if_mtu: DEFAULT_MTU,
    }
}

#[cfg(unix)]
fn admin_listen() -> &'static str {
    crate::constants::node::UNIX_ADMIN_LISTEN
}

#[cfg(not(unix))]
fn admin_listen() -> &'static str {
    crate::constants::node::TCP_ADMIN_LISTEN
}
