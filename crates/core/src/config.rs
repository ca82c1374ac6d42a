//! Node configuration
//!
//! The configuration is plain data. The only behavior it carries is key
//! installation, file persistence and validation; the subsystems its fields
//! describe (peering, multicast, TUN, admin socket) live elsewhere.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;
use zeroize::Zeroize;

use crate::constants::frame::PUBLIC_LEN;
use crate::constants::node::MIN_MTU;
use crate::crypto::keys::{check_keypair, parse_public_key};
use crate::crypto::KeyProvisioner;
use crate::defaults::get_defaults;
use crate::error::{ConfigError, ProvisionError};

/// Multicast discovery settings for interfaces matching `regex`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MulticastInterfaceConfig {
    pub regex: String,
    pub beacon: bool,
    pub listen: bool,
    pub port: u16,
    pub priority: u64,
}

impl Default for MulticastInterfaceConfig {
    fn default() -> Self {
        Self {
            regex: get_defaults().multicast_regex.to_string(),
            beacon: true,
            listen: true,
            port: 0,
            priority: 0,
        }
    }
}

/// Everything a node needs to start
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeConfig {
    pub peers: Vec<String>,
    pub interface_peers: BTreeMap<String, Vec<String>>,
    pub listen: Vec<String>,
    pub admin_listen: String,
    pub multicast_interfaces: Vec<MulticastInterfaceConfig>,
    pub allowed_public_keys: Vec<String>,
    pub public_key: String,
    pub private_key: String,
    pub if_name: String,
    #[serde(rename = "IfMTU")]
    pub if_mtu: u64,
    pub node_info_privacy: bool,
    pub node_info: Option<serde_json::Map<String, serde_json::Value>>,
}

impl std::fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("peers", &self.peers)
            .field("interface_peers", &self.interface_peers)
            .field("listen", &self.listen)
            .field("admin_listen", &self.admin_listen)
            .field("multicast_interfaces", &self.multicast_interfaces)
            .field("allowed_public_keys", &self.allowed_public_keys)
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .field("if_name", &self.if_name)
            .field("if_mtu", &self.if_mtu)
            .field("node_info_privacy", &self.node_info_privacy)
            .field("node_info", &self.node_info)
            .finish()
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        let defaults = get_defaults();
        Self {
            peers: Vec::new(),
            interface_peers: BTreeMap::new(),
            listen: Vec::new(),
            admin_listen: defaults.admin_listen.to_string(),
            multicast_interfaces: vec![MulticastInterfaceConfig::default()],
            allowed_public_keys: Vec::new(),
            public_key: String::new(),
            private_key: String::new(),
            if_name: defaults.if_name.to_string(),
            if_mtu: defaults.if_mtu,
            node_info_privacy: false,
            node_info: None,
        }
    }
}

impl NodeConfig {
    /// Default configuration with a freshly provisioned keypair
    pub fn generate(provisioner: &KeyProvisioner) -> Result<Self, ProvisionError> {
        let mut config = Self::default();
        config.install_new_keys(provisioner)?;
        Ok(config)
    }

    /// Replace the keypair with a freshly generated one.
    ///
    /// Both key fields change together or not at all.
    pub fn install_new_keys(&mut self, provisioner: &KeyProvisioner) -> Result<(), ProvisionError> {
        let keys = provisioner.generate_keys()?;
        let public_key = keys.public_key_str()?.to_string();
        let private_key = keys.private_key_str()?.to_string();

        self.public_key = public_key;
        self.private_key.zeroize();
        self.private_key = private_key;

        info!("Installed new keypair, public key {}", self.public_key);
        Ok(())
    }

    /// Whether both halves of the keypair are set
    pub fn has_keys(&self) -> bool {
        !self.public_key.is_empty() && !self.private_key.is_empty()
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: NodeConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON.
    ///
    /// The file is written beside the target and renamed into place, so an
    /// existing configuration is never left half-written.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        let staging = staging_path(path);
        fs::write(&staging, content).map_err(io_err)?;
        if let Err(source) = fs::rename(&staging, path) {
            let _ = fs::remove_file(&staging);
            return Err(io_err(source));
        }
        Ok(())
    }

    /// Check the configuration for values a node would refuse to start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.if_mtu < MIN_MTU {
            return Err(ConfigError::MtuTooSmall {
                mtu: self.if_mtu,
                min: MIN_MTU,
            });
        }

        match (self.public_key.is_empty(), self.private_key.is_empty()) {
            (true, true) => {}
            (false, false) => check_keypair(&self.public_key, &self.private_key)?,
            _ => return Err(ConfigError::IncompleteKeypair),
        }

        for (index, key) in self.allowed_public_keys.iter().enumerate() {
            if parse_public_key(key).is_none() {
                return Err(ConfigError::MalformedAllowedKey {
                    index,
                    expected: PUBLIC_LEN,
                });
            }
        }

        for (index, interface) in self.multicast_interfaces.iter().enumerate() {
            if interface.regex.is_empty() {
                return Err(ConfigError::EmptyMulticastRegex { index });
            }
        }

        Ok(())
    }

    /// Human-readable description of a configuration field
    pub fn field_description(name: &str) -> Option<&'static str> {
        FIELD_DESCRIPTIONS
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, description)| *description)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialized field names and what they control
pub const FIELD_DESCRIPTIONS: &[(&str, &str)] = &[
    (
        "Peers",
        "Outbound peer connection strings in URI form, such as tls://a.b.c.d:e or \
         socks://a.b.c.d:e/f.g.h.i:j. These follow the operating system routing table.",
    ),
    (
        "InterfacePeers",
        "Outbound peer connection strings grouped by source interface, such as \
         { \"eth0\": [ \"tls://a.b.c.d:e\" ] }. SOCKS peerings belong in Peers instead.",
    ),
    (
        "Listen",
        "Listen addresses for incoming peerings in URI form, such as tls://0.0.0.0:0 \
         or tls://[::]:0 to listen on all interfaces. Multicast discovery works without them.",
    ),
    (
        "AdminListen",
        "Listen address for admin connections, a UNIX socket or TCP endpoint. \
         Use \"none\" to disable the admin socket.",
    ),
    (
        "MulticastInterfaces",
        "Interfaces to run multicast peer discovery on. Each entry holds Regex (matched \
         against interface names, first match wins), Beacon (advertise this node), \
         Listen (accept beacons and connect out), Port and Priority.",
    ),
    (
        "AllowedPublicKeys",
        "Peer public keys allowed to open incoming peerings. Empty allows everyone. \
         Outgoing and multicast-discovered peerings are not affected.",
    ),
    (
        "PublicKey",
        "This node's public key. Peers add it to their AllowedPublicKeys.",
    ),
    (
        "PrivateKey",
        "This node's private key. Never share it.",
    ),
    (
        "IfName",
        "TUN adapter name, \"auto\" to pick one automatically, or \"none\" to run without TUN.",
    ),
    (
        "IfMTU",
        "TUN adapter MTU. Defaults to the largest the platform supports; at least 1280.",
    ),
    (
        "NodeInfoPrivacy",
        "Omit the default platform, architecture and version entries from nodeinfo, \
         leaving only what NodeInfo sets.",
    ),
    (
        "NodeInfo",
        "Optional { \"key\": \"value\" } map visible to the whole network on request, or null.",
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::frame::{DEFAULT_MASK, PRIVATE_LEN};
    use crate::crypto::keys::apply_mask;
    use crate::error::GeneratorFailure;
    use tempfile::tempdir;

    fn failing_provisioner() -> KeyProvisioner {
        KeyProvisioner::from_fn(|| {
            Err(ProvisionError::GeneratorFailed(GeneratorFailure::Io(
                std::io::Error::other("generator crashed"),
            )))
        })
    }

    fn keyed_config() -> NodeConfig {
        NodeConfig::generate(&KeyProvisioner::native()).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert!(config.peers.is_empty());
        assert!(config.listen.is_empty());
        assert_eq!(config.if_name, "auto");
        assert_eq!(config.if_mtu, 65535);
        assert_eq!(config.multicast_interfaces, vec![MulticastInterfaceConfig::default()]);
        assert!(config.multicast_interfaces[0].beacon);
        assert!(!config.has_keys());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(NodeConfig::default()).unwrap();
        let object = json.as_object().unwrap();
        for (field, _) in FIELD_DESCRIPTIONS {
            assert!(object.contains_key(*field), "missing {field}");
        }
        assert_eq!(object.len(), FIELD_DESCRIPTIONS.len());
        assert_eq!(json["MulticastInterfaces"][0]["Regex"], ".*");
        assert!(json["NodeInfo"].is_null());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: NodeConfig =
            serde_json::from_str(r#"{ "Peers": ["tls://10.0.0.1:443"], "IfMTU": 1400 }"#).unwrap();
        assert_eq!(config.peers, vec!["tls://10.0.0.1:443".to_string()]);
        assert_eq!(config.if_mtu, 1400);
        assert_eq!(config.if_name, "auto");
        assert_eq!(config.admin_listen, NodeConfig::default().admin_listen);
    }

    #[test]
    fn test_partial_multicast_entry_takes_defaults() {
        let config: NodeConfig = serde_json::from_str(
            r#"{ "MulticastInterfaces": [
                { "Regex": "eth.*", "Beacon": false, "Listen": true, "Port": 9001 },
                { "Regex": "wlan0" }
            ] }"#,
        )
        .unwrap();

        let wired = &config.multicast_interfaces[0];
        assert_eq!(wired.regex, "eth.*");
        assert!(!wired.beacon);
        assert_eq!(wired.port, 9001);
        assert_eq!(wired.priority, 0);

        let wireless = &config.multicast_interfaces[1];
        assert_eq!(wireless.regex, "wlan0");
        assert!(wireless.beacon && wireless.listen);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_multicast_entry_loads_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("node.conf");
        fs::write(
            &path,
            r#"{ "MulticastInterfaces": [ { "Regex": ".*", "Beacon": true, "Listen": true, "Port": 0 } ] }"#,
        )
        .unwrap();

        let config = NodeConfig::load_from_file(&path).unwrap();
        assert_eq!(config.multicast_interfaces, vec![MulticastInterfaceConfig::default()]);
    }

    #[test]
    fn test_install_new_keys() {
        let mut config = NodeConfig::default();
        config.install_new_keys(&KeyProvisioner::native()).unwrap();
        assert_eq!(config.public_key.len(), PUBLIC_LEN);
        assert_eq!(config.private_key.len(), PRIVATE_LEN);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_install_replaces_existing_keys() {
        let mut config = keyed_config();
        let old_public = config.public_key.clone();
        config.install_new_keys(&KeyProvisioner::native()).unwrap();
        assert_ne!(config.public_key, old_public);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_failed_install_keeps_existing_keys() {
        let mut config = keyed_config();
        let before = config.clone();

        let err = config.install_new_keys(&failing_provisioner()).unwrap_err();
        assert!(matches!(err, ProvisionError::GeneratorFailed(_)));
        assert_eq!(config.public_key, before.public_key);
        assert_eq!(config.private_key, before.private_key);
    }

    #[test]
    fn test_truncated_install_keeps_existing_keys() {
        let mut config = keyed_config();
        let before = config.clone();

        let provisioner = KeyProvisioner::from_fn(|| Ok(vec![0u8; 10]));
        assert!(matches!(
            config.install_new_keys(&provisioner),
            Err(ProvisionError::TruncatedOutput { .. })
        ));
        assert_eq!(config, before);
    }

    #[test]
    fn test_non_text_install_keeps_existing_keys() {
        let mut config = keyed_config();
        let before = config.clone();

        let provisioner = KeyProvisioner::from_fn(|| {
            let mut raw = vec![b'a'; PUBLIC_LEN + 1];
            raw.extend_from_slice(&[0xFF; PRIVATE_LEN]);
            apply_mask(&mut raw, DEFAULT_MASK);
            Ok(raw)
        });
        assert!(matches!(
            config.install_new_keys(&provisioner),
            Err(ProvisionError::InvalidKeyText)
        ));
        assert_eq!(config, before);
    }

    #[test]
    fn test_generate_fails_without_generator() {
        assert!(NodeConfig::generate(&failing_provisioner()).is_err());
    }

    #[test]
    fn test_validate_mtu() {
        let mut config = NodeConfig::default();
        config.if_mtu = 1279;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MtuTooSmall { mtu: 1279, min: 1280 })
        ));
        config.if_mtu = 1280;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_keys() {
        let mut config = keyed_config();
        config.private_key.clear();
        assert!(matches!(config.validate(), Err(ConfigError::IncompleteKeypair)));

        let mut config = keyed_config();
        config.public_key = keyed_config().public_key;
        assert!(matches!(config.validate(), Err(ConfigError::KeypairMismatch)));

        let mut config = keyed_config();
        config.private_key.truncate(100);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MalformedKey { field: "PrivateKey", .. })
        ));
    }

    #[test]
    fn test_validate_allowed_keys() {
        let mut config = NodeConfig::default();
        config.allowed_public_keys = vec![keyed_config().public_key, "not-a-key".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MalformedAllowedKey { index: 1, .. })
        ));
    }

    #[test]
    fn test_validate_multicast_regex() {
        let mut config = NodeConfig::default();
        config.multicast_interfaces.push(MulticastInterfaceConfig {
            regex: String::new(),
            ..Default::default()
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyMulticastRegex { index: 1 })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("node.conf");

        let mut config = keyed_config();
        config.peers.push("tls://192.0.2.1:443".to_string());
        config
            .interface_peers
            .insert("eth0".to_string(), vec!["tcp://[fe80::1]:9000".to_string()]);
        let mut info = serde_json::Map::new();
        info.insert("name".to_string(), serde_json::Value::from("node-a"));
        config.node_info = Some(info);

        config.save_to_file(&path).unwrap();
        assert!(!staging_path(&path).exists());

        let loaded = NodeConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.conf");
        assert!(matches!(
            NodeConfig::load_from_file(&path),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.conf");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            NodeConfig::load_from_file(&path),
            Err(ConfigError::Format(_))
        ));
    }

    #[test]
    fn test_field_description() {
        assert!(NodeConfig::field_description("PrivateKey").unwrap().contains("Never share"));
        assert!(NodeConfig::field_description("ifmtu").is_some());
        assert!(NodeConfig::field_description("Bogus").is_none());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let config = keyed_config();
        let rendered = format!("{config:?}");
        assert!(rendered.contains(&config.public_key));
        assert!(!rendered.contains(&config.private_key));
    }
}
