//! Bridge configuration.
//!
//! Loaded from TOML. Every section has defaults, so an empty file (or a
//! missing one, via [`BridgeConfig::load_or_default`]) yields a working
//! software-only bridge with snooping and the unknown-multicast limiter on.

use crate::error::{BridgeError, Result};
use crate::info_log;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use sonic_bridge_types::{GroupAddress, MacAddress};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Upper bound on the unknown-flow table size.
pub const MAX_LIMITER_CAPACITY: usize = 1024;

/// Default number of forwarding database entries.
pub const DEFAULT_FDB_MAX_ENTRIES: usize = 4096;

bitflags! {
    /// Optional engine capabilities, selected once at startup.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// 802.1Q VLAN filtering and egress tagging.
        const VLAN_AWARE = 1 << 0;
        /// A hardware multicast table is present.
        const HARDWARE_OFFLOAD = 1 << 1;
        /// More than one bridge may program the hardware table.
        const MULTI_BRIDGE = 1 << 2;
    }
}

/// What the limiter does when every slot is live and none can be reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Admit the frame untracked.
    #[default]
    FailOpen,
    /// Block the frame.
    FailClosed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityConfig {
    #[serde(default)]
    pub vlan_aware: bool,
    #[serde(default)]
    pub hardware_offload: bool,
    #[serde(default)]
    pub multi_bridge: bool,
}

/// Delivery filter policies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Reject delivery between devices on different device VLANs.
    #[serde(default)]
    pub vlan_isolation: bool,

    /// Reject broadcast/unicast delivery between ports of the same LAN group.
    #[serde(default)]
    pub lan_isolation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnoopingConfig {
    /// When false, IP multicast is flooded like broadcast.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Unknown-multicast rate limiter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Number of tracked flows.
    #[serde(default = "default_limiter_capacity")]
    pub capacity: usize,

    /// Packets admitted per flow per window.
    #[serde(default = "default_max_packets_per_window")]
    pub max_packets_per_window: u64,

    /// Window length in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    #[serde(default)]
    pub exhaustion_policy: ExhaustionPolicy,

    /// Key flows on (source, group) instead of group only.
    #[serde(default)]
    pub track_source: bool,

    /// Only gate frames entering on upstream ports.
    #[serde(default)]
    pub upstream_only: bool,

    /// Groups exempt from limiting in addition to the built-in reserved set.
    #[serde(default)]
    pub extra_reserved_groups: Vec<GroupAddress>,
}

/// Forwarding database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FdbConfig {
    /// Entries kept, static ones included. Once reached, new source
    /// addresses are not learned until the table drains.
    #[serde(default = "default_fdb_max_entries")]
    pub max_entries: usize,
}

/// Hardware multicast offload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffloadConfig {
    /// The bridge allowed to program the hardware table.
    #[serde(default = "default_bridge_name")]
    pub primary_bridge: String,

    /// Additional bridges allowed when MULTI_BRIDGE is set.
    #[serde(default)]
    pub offload_bridges: Vec<String>,
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_name")]
    pub name: String,

    /// MAC of the bridge device; frames to it are delivered locally only.
    #[serde(default)]
    pub bridge_mac: Option<MacAddress>,

    /// Hand the bridge device its own copy of flooded frames.
    #[serde(default)]
    pub local_delivery: bool,

    /// Drop frames larger than the egress port MTU.
    #[serde(default = "default_true")]
    pub mtu_check: bool,

    #[serde(default)]
    pub capabilities: CapabilityConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub snooping: SnoopingConfig,

    #[serde(default)]
    pub limiter: LimiterConfig,

    #[serde(default)]
    pub offload: OffloadConfig,

    #[serde(default)]
    pub fdb: FdbConfig,
}

fn default_true() -> bool {
    true
}

fn default_bridge_name() -> String {
    "br0".to_string()
}

fn default_limiter_capacity() -> usize {
    16
}

fn default_max_packets_per_window() -> u64 {
    1500
}

fn default_window_ms() -> u64 {
    1000
}

fn default_fdb_max_entries() -> usize {
    DEFAULT_FDB_MAX_ENTRIES
}

impl Default for SnoopingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            capacity: default_limiter_capacity(),
            max_packets_per_window: default_max_packets_per_window(),
            window_ms: default_window_ms(),
            exhaustion_policy: ExhaustionPolicy::default(),
            track_source: false,
            upstream_only: false,
            extra_reserved_groups: Vec::new(),
        }
    }
}

impl Default for FdbConfig {
    fn default() -> Self {
        Self {
            max_entries: default_fdb_max_entries(),
        }
    }
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            primary_bridge: default_bridge_name(),
            offload_bridges: Vec::new(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: default_bridge_name(),
            bridge_mac: None,
            local_delivery: false,
            mtu_check: default_true(),
            capabilities: CapabilityConfig::default(),
            filter: FilterConfig::default(),
            snooping: SnoopingConfig::default(),
            limiter: LimiterConfig::default(),
            offload: OffloadConfig::default(),
            fdb: FdbConfig::default(),
        }
    }
}

impl LimiterConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl BridgeConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| BridgeError::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config: BridgeConfig = toml::from_str(&content).map_err(|e| {
                    BridgeError::Configuration(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info_log!(
                    "BridgeConfig",
                    path = %path.display(),
                    "bridge config file not found, using defaults"
                );
                Ok(Self::default())
            }
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            BridgeError::Configuration(format!("Failed to serialize config: {}", e))
        })?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::empty();
        caps.set(Capabilities::VLAN_AWARE, self.capabilities.vlan_aware);
        caps.set(Capabilities::HARDWARE_OFFLOAD, self.capabilities.hardware_offload);
        caps.set(Capabilities::MULTI_BRIDGE, self.capabilities.multi_bridge);
        caps
    }

    /// Returns true if this bridge may program the hardware multicast table.
    pub fn offload_enabled(&self) -> bool {
        let caps = self.capabilities();
        if !caps.contains(Capabilities::HARDWARE_OFFLOAD) {
            return false;
        }
        if self.name == self.offload.primary_bridge {
            return true;
        }
        caps.contains(Capabilities::MULTI_BRIDGE)
            && self.offload.offload_bridges.iter().any(|b| *b == self.name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(BridgeError::Configuration(
                "bridge name must not be empty".to_string(),
            ));
        }

        let limiter = &self.limiter;
        if limiter.capacity == 0 || limiter.capacity > MAX_LIMITER_CAPACITY {
            return Err(BridgeError::Configuration(format!(
                "limiter capacity must be 1-{}",
                MAX_LIMITER_CAPACITY
            )));
        }
        if limiter.window_ms == 0 {
            return Err(BridgeError::Configuration(
                "limiter window_ms must be > 0".to_string(),
            ));
        }
        if limiter.max_packets_per_window == 0 {
            return Err(BridgeError::Configuration(
                "limiter max_packets_per_window must be > 0".to_string(),
            ));
        }
        if self.fdb.max_entries == 0 {
            return Err(BridgeError::Configuration(
                "fdb max_entries must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
