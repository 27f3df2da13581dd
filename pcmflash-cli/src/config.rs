//! Configuration file support for pcmflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (PCMFLASH_*)
//! 3. Local config file (./pcmflash.toml)
//! 4. Global config file (~/.config/pcmflash/config.toml)

use anyhow::Context;
use directories::ProjectDirs;
use log::{debug, info, warn};
use pcmflash::DeviceId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// Name of the local configuration file.
pub const LOCAL_CONFIG: &str = "pcmflash.toml";

/// Network configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Multicast group.
    pub group: Option<Ipv4Addr>,
    /// LIA UDP port.
    pub port: Option<u16>,
    /// TCP control port for the reset trigger.
    pub control_port: Option<u16>,
    /// Local interface address.
    pub interface: Option<Ipv4Addr>,
    /// Multicast TTL.
    pub ttl: Option<u32>,
}

/// Target configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Address the target should use.
    pub ip: Option<Ipv4Addr>,
    /// Known device identity; skips discovery when set.
    pub device_id: Option<DeviceId>,
}

/// Burn defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BurnConfig {
    /// Skip image verification by default.
    #[serde(default)]
    pub skip_verify: bool,
    /// Do not send the reset trigger.
    #[serde(default)]
    pub no_reboot: bool,
    /// Do not force the target IP.
    #[serde(default)]
    pub no_force_ip: bool,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Target configuration.
    #[serde(default)]
    pub target: TargetConfig,
    /// Burn configuration.
    #[serde(default)]
    pub burn: BurnConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "pcmflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        // Network config
        let net = other.network;
        if net.group.is_some() {
            self.network.group = net.group;
        }
        if net.port.is_some() {
            self.network.port = net.port;
        }
        if net.control_port.is_some() {
            self.network.control_port = net.control_port;
        }
        if net.interface.is_some() {
            self.network.interface = net.interface;
        }
        if net.ttl.is_some() {
            self.network.ttl = net.ttl;
        }

        // Target config
        if other.target.ip.is_some() {
            self.target.ip = other.target.ip;
        }
        if other.target.device_id.is_some() {
            self.target.device_id = other.target.device_id;
        }

        // Burn config
        if other.burn.skip_verify {
            self.burn.skip_verify = true;
        }
        if other.burn.no_reboot {
            self.burn.no_reboot = true;
        }
        if other.burn.no_force_ip {
            self.burn.no_force_ip = true;
        }
    }

    /// Remember a discovered target in the local config file.
    ///
    /// Other sections of an existing local file are preserved; a file that
    /// cannot be read or parsed is left untouched and reported as an error.
    pub fn remember_target(
        &mut self,
        ip: Ipv4Addr,
        device_id: DeviceId,
    ) -> anyhow::Result<PathBuf> {
        self.remember_target_in(Path::new(LOCAL_CONFIG), ip, device_id)
    }

    fn remember_target_in(
        &mut self,
        path: &Path,
        ip: Ipv4Addr,
        device_id: DeviceId,
    ) -> anyhow::Result<PathBuf> {
        let mut local: Self = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str(&content).with_context(|| {
                format!("Refusing to rewrite {}: it is not valid TOML", path.display())
            })?
        } else {
            Self::default()
        };
        local.target.ip = Some(ip);
        local.target.device_id = Some(device_id);

        let content = toml::to_string_pretty(&local)?;
        fs::write(path, content)?;
        info!("Saved target {device_id} ({ip}) to {}", path.display());

        self.target.ip = Some(ip);
        self.target.device_id = Some(device_id);
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Default values ----

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.network.group.is_none());
        assert!(config.network.interface.is_none());
        assert!(config.target.ip.is_none());
        assert!(config.target.device_id.is_none());
        assert!(!config.burn.skip_verify);
        assert!(!config.burn.no_reboot);
        assert!(!config.burn.no_force_ip);
    }

    // ---- Config merge ----

    #[test]
    fn test_config_merge_network() {
        let mut base = Config::default();
        base.network.port = Some(16384);

        let mut other = Config::default();
        other.network.port = Some(17000);
        other.network.group = Some(Ipv4Addr::new(239, 1, 1, 1));

        base.merge(other);
        assert_eq!(base.network.port, Some(17000));
        assert_eq!(base.network.group, Some(Ipv4Addr::new(239, 1, 1, 1)));
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.target.ip = Some(Ipv4Addr::new(10, 0, 0, 42));
        base.network.ttl = Some(4);

        base.merge(Config::default());

        assert_eq!(base.target.ip, Some(Ipv4Addr::new(10, 0, 0, 42)));
        assert_eq!(base.network.ttl, Some(4));
    }

    #[test]
    fn test_config_merge_burn_flags() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.burn.skip_verify = true;
        other.burn.no_force_ip = true;
        base.merge(other);
        assert!(base.burn.skip_verify);
        assert!(!base.burn.no_reboot);
        assert!(base.burn.no_force_ip);
    }

    // ---- TOML serialization/deserialization ----

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[network]
group = "230.10.10.11"
port = 16384
control_port = 1000
interface = "10.0.0.1"
ttl = 2

[target]
ip = "10.0.0.42"
device_id = "3c7e"

[burn]
skip_verify = true
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.network.group, Some(Ipv4Addr::new(230, 10, 10, 11)));
        assert_eq!(config.network.port, Some(16384));
        assert_eq!(config.network.control_port, Some(1000));
        assert_eq!(config.network.interface, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(config.network.ttl, Some(2));
        assert_eq!(config.target.ip, Some(Ipv4Addr::new(10, 0, 0, 42)));
        assert_eq!(config.target.device_id, Some(DeviceId::new(0x3c7e)));
        assert!(config.burn.skip_verify);
        assert!(!config.burn.no_reboot);
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.network.port.is_none());
        assert!(config.target.ip.is_none());
    }

    #[test]
    fn test_config_rejects_bad_device_id() {
        let result: Result<Config, _> = toml::from_str("[target]\ndevice_id = \"xyz\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_roundtrip_toml() {
        let mut config = Config::default();
        config.network.interface = Some(Ipv4Addr::new(192, 168, 1, 5));
        config.target.device_id = Some(DeviceId::new(0x00ab));
        config.burn.no_reboot = true;

        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(deserialized.network.interface, config.network.interface);
        assert_eq!(deserialized.target.device_id, Some(DeviceId::new(0x00ab)));
        assert!(deserialized.burn.no_reboot);
    }

    // ---- files ----

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_config.toml");
        fs::write(
            &path,
            r#"
[network]
interface = "10.1.1.1"
[target]
ip = "10.1.1.42"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.network.interface, Some(Ipv4Addr::new(10, 1, 1, 1)));
        assert_eq!(config.target.ip, Some(Ipv4Addr::new(10, 1, 1, 42)));
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        assert!(config.target.ip.is_none());
    }

    #[test]
    fn test_load_from_path_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[network\nport = ").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.network.port.is_none());
    }

    #[test]
    fn test_remember_target_keeps_other_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCAL_CONFIG);
        fs::write(&path, "[burn]\nno_reboot = true\n").unwrap();

        let mut config = Config::default();
        config
            .remember_target_in(&path, Ipv4Addr::new(10, 0, 0, 42), DeviceId::new(0x3c7e))
            .unwrap();

        let saved = Config::load_from_path(&path);
        assert!(saved.burn.no_reboot);
        assert_eq!(saved.target.ip, Some(Ipv4Addr::new(10, 0, 0, 42)));
        assert_eq!(saved.target.device_id, Some(DeviceId::new(0x3c7e)));
        assert_eq!(config.target.device_id, Some(DeviceId::new(0x3c7e)));
    }

    #[test]
    fn test_remember_target_leaves_invalid_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCAL_CONFIG);
        let original = "[network]\nport = 17000\n[target\n";
        fs::write(&path, original).unwrap();

        let mut config = Config::default();
        let err = config
            .remember_target_in(&path, Ipv4Addr::new(10, 0, 0, 42), DeviceId::new(0x3c7e))
            .unwrap_err();

        assert!(err.to_string().contains("not valid TOML"));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        assert!(config.target.ip.is_none());
    }

    // ---- global_config_path ----

    #[test]
    fn test_global_config_path() {
        if let Some(p) = Config::global_config_path() {
            assert!(p.to_str().unwrap().contains("pcmflash"));
            assert!(p.to_str().unwrap().ends_with("config.toml"));
        }
    }
}
