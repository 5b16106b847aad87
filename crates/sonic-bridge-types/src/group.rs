//! Multicast group addresses and the flow keys built from them.

use crate::{MacAddress, ParseError, VlanId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// SSDP / UPnP discovery group, always flooded.
const SSDP_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// A validated IPv4 (224.0.0.0/4) or IPv6 (ff00::/8) multicast group.
///
/// ```
/// use sonic_bridge_types::GroupAddress;
///
/// let group: GroupAddress = "239.1.2.3".parse().unwrap();
/// assert!(!group.is_reserved());
/// assert!("10.0.0.1".parse::<GroupAddress>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupAddress(IpAddr);

impl GroupAddress {
    /// Returns `None` when `addr` is not a multicast address.
    pub fn new(addr: IpAddr) -> Option<Self> {
        addr.is_multicast().then_some(GroupAddress(addr))
    }

    pub fn from_v4(addr: Ipv4Addr) -> Option<Self> {
        Self::new(IpAddr::V4(addr))
    }

    pub fn from_v6(addr: Ipv6Addr) -> Option<Self> {
        Self::new(IpAddr::V6(addr))
    }

    pub const fn addr(&self) -> IpAddr {
        self.0
    }

    pub const fn is_ipv4(&self) -> bool {
        matches!(self.0, IpAddr::V4(_))
    }

    /// Returns true for groups that must never be rate limited or offloaded:
    /// the IPv4 local network control block (224.0.0.0/24), the SSDP group,
    /// and IPv6 groups of interface-local or link-local scope.
    pub fn is_reserved(&self) -> bool {
        match self.0 {
            IpAddr::V4(v4) => {
                let o = v4.octets();
                (o[0] == 224 && o[1] == 0 && o[2] == 0) || v4 == SSDP_GROUP
            }
            IpAddr::V6(v6) => (v6.segments()[0] & 0x000f) <= 2,
        }
    }

    /// Ethernet destination this group maps to.
    pub fn mac(&self) -> MacAddress {
        match self.0 {
            IpAddr::V4(v4) => MacAddress::from_ipv4_group(v4),
            IpAddr::V6(v6) => MacAddress::from_ipv6_group(v6),
        }
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: IpAddr = s
            .parse()
            .map_err(|_| ParseError::InvalidGroupAddress(s.to_string()))?;
        GroupAddress::new(addr).ok_or_else(|| ParseError::InvalidGroupAddress(s.to_string()))
    }
}

impl TryFrom<String> for GroupAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<GroupAddress> for String {
    fn from(group: GroupAddress) -> String {
        group.to_string()
    }
}

/// Key identifying multicast state: group, optional source (source-specific
/// mode), and optional VLAN (absent when the bridge is not VLAN aware).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey {
    pub group: GroupAddress,
    pub source: Option<IpAddr>,
    pub vlan: Option<VlanId>,
}

impl FlowKey {
    pub fn new(group: GroupAddress) -> Self {
        Self {
            group,
            source: None,
            vlan: None,
        }
    }

    pub fn with_source(mut self, source: IpAddr) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_vlan(mut self, vlan: VlanId) -> Self {
        self.vlan = Some(vlan);
        self
    }

    /// The any-source (*,G) key for the same group and VLAN.
    pub fn any_source(&self) -> Self {
        Self {
            source: None,
            ..*self
        }
    }

    pub fn is_source_specific(&self) -> bool {
        self.source.is_some()
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            Some(src) => write!(f, "({}, {})", src, self.group)?,
            None => write!(f, "(*, {})", self.group)?,
        }
        if let Some(vlan) = self.vlan {
            write!(f, " vlan {}", vlan)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_group_requires_multicast() {
        assert!("239.1.1.1".parse::<GroupAddress>().is_ok());
        assert!("ff3e::8000:1".parse::<GroupAddress>().is_ok());
        assert!("192.168.1.1".parse::<GroupAddress>().is_err());
        assert!("2001:db8::1".parse::<GroupAddress>().is_err());
        assert!("not-an-ip".parse::<GroupAddress>().is_err());
    }

    #[test]
    fn test_reserved_groups() {
        let reserved = ["224.0.0.1", "224.0.0.251", "239.255.255.250", "ff02::1", "ff01::2"];
        for g in reserved {
            assert!(g.parse::<GroupAddress>().unwrap().is_reserved(), "{g}");
        }
        let regular = ["224.0.1.1", "239.1.2.3", "ff05::1:3", "ff0e::1"];
        for g in regular {
            assert!(!g.parse::<GroupAddress>().unwrap().is_reserved(), "{g}");
        }
    }

    #[test]
    fn test_group_mac() {
        let group: GroupAddress = "239.1.2.3".parse().unwrap();
        assert_eq!(group.mac().to_string(), "01:00:5e:01:02:03");
    }

    #[test]
    fn test_flow_key_display_and_any_source() {
        let group: GroupAddress = "239.1.2.3".parse().unwrap();
        let key = FlowKey::new(group)
            .with_source("10.0.0.1".parse().unwrap())
            .with_vlan(VlanId::new(10).unwrap());

        assert!(key.is_source_specific());
        assert_eq!(key.to_string(), "(10.0.0.1, 239.1.2.3) vlan 10");
        assert_eq!(key.any_source().to_string(), "(*, 239.1.2.3) vlan 10");
    }
}
