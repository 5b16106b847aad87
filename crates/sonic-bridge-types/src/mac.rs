//! Ethernet MAC address with the classification the forwarding engine needs.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// A 48-bit Ethernet MAC address.
///
/// # Examples
///
/// ```
/// use sonic_bridge_types::MacAddress;
///
/// let mac: MacAddress = "01:00:5e:01:02:03".parse().unwrap();
/// assert!(mac.is_multicast());
/// assert!(mac.is_ipv4_multicast());
///
/// let mac2: MacAddress = "01-00-5e-01-02-03".parse().unwrap();
/// assert_eq!(mac, mac2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// The broadcast MAC address (FF:FF:FF:FF:FF:FF).
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    /// The zero/null MAC address (00:00:00:00:00:00).
    pub const ZERO: MacAddress = MacAddress([0; 6]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Returns true if the group bit (LSB of the first octet) is set.
    ///
    /// Broadcast is a multicast address by this definition.
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub const fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }

    pub const fn is_broadcast(&self) -> bool {
        let b = &self.0;
        b[0] == 0xff && b[1] == 0xff && b[2] == 0xff && b[3] == 0xff && b[4] == 0xff && b[5] == 0xff
    }

    pub const fn is_zero(&self) -> bool {
        let b = &self.0;
        b[0] == 0 && b[1] == 0 && b[2] == 0 && b[3] == 0 && b[4] == 0 && b[5] == 0
    }

    /// Returns true for the IANA IPv4 multicast block 01:00:5e:00:00:00/25.
    pub const fn is_ipv4_multicast(&self) -> bool {
        self.0[0] == 0x01 && self.0[1] == 0x00 && self.0[2] == 0x5e && self.0[3] & 0x80 == 0
    }

    /// Returns true for the IPv6 multicast block 33:33:xx:xx:xx:xx.
    pub const fn is_ipv6_multicast(&self) -> bool {
        self.0[0] == 0x33 && self.0[1] == 0x33
    }

    /// Returns true for the IEEE 802.1D reserved block 01:80:c2:00:00:0x
    /// (STP, LACP, LLDP and friends).
    pub const fn is_link_local_control(&self) -> bool {
        self.0[0] == 0x01
            && self.0[1] == 0x80
            && self.0[2] == 0xc2
            && self.0[3] == 0x00
            && self.0[4] == 0x00
            && self.0[5] & 0xf0 == 0
    }

    /// Maps an IPv4 group to its Ethernet multicast address (low 23 bits).
    pub const fn from_ipv4_group(group: Ipv4Addr) -> Self {
        let o = group.octets();
        MacAddress([0x01, 0x00, 0x5e, o[1] & 0x7f, o[2], o[3]])
    }

    /// Maps an IPv6 group to its Ethernet multicast address (low 32 bits).
    pub const fn from_ipv6_group(group: Ipv6Addr) -> Self {
        let o = group.octets();
        MacAddress([0x33, 0x33, o[12], o[13], o[14], o[15]])
    }
}

impl Default for MacAddress {
    fn default() -> Self {
        MacAddress::ZERO
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let separator = if s.contains(':') { ':' } else { '-' };

        let mut bytes = [0u8; 6];
        let mut count = 0;
        for part in s.split(separator) {
            if count == 6 || part.len() != 2 {
                return Err(ParseError::InvalidMacAddress(s.to_string()));
            }
            bytes[count] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseError::InvalidMacAddress(s.to_string()))?;
            count += 1;
        }

        if count != 6 {
            return Err(ParseError::InvalidMacAddress(s.to_string()));
        }
        Ok(MacAddress(bytes))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> String {
        mac.to_string()
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_both_separators() {
        let a: MacAddress = "00:11:22:33:44:55".parse().unwrap();
        let b: MacAddress = "00-11-22-33-44-55".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_bytes(), &[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    }

    #[test]
    fn test_invalid_format() {
        assert!("invalid".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44:55:66".parse::<MacAddress>().is_err());
        assert!("gg:11:22:33:44:55".parse::<MacAddress>().is_err());
        assert!("0:11:22:33:44:55".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_broadcast_is_multicast() {
        assert!(MacAddress::BROADCAST.is_broadcast());
        assert!(MacAddress::BROADCAST.is_multicast());
        assert!(!MacAddress::BROADCAST.is_ipv4_multicast());
        assert!(MacAddress::ZERO.is_zero());
        assert!(MacAddress::ZERO.is_unicast());
    }

    #[test]
    fn test_ip_multicast_blocks() {
        let v4: MacAddress = "01:00:5e:7f:00:01".parse().unwrap();
        assert!(v4.is_ipv4_multicast());
        assert!(!v4.is_ipv6_multicast());

        // Upper half of the OUI block is not mapped from IPv4.
        let not_v4: MacAddress = "01:00:5e:80:00:01".parse().unwrap();
        assert!(!not_v4.is_ipv4_multicast());

        let v6: MacAddress = "33:33:00:00:00:01".parse().unwrap();
        assert!(v6.is_ipv6_multicast());
    }

    #[test]
    fn test_link_local_control() {
        let stp: MacAddress = "01:80:c2:00:00:00".parse().unwrap();
        let lldp: MacAddress = "01:80:c2:00:00:0e".parse().unwrap();
        let other: MacAddress = "01:80:c2:00:00:21".parse().unwrap();
        assert!(stp.is_link_local_control());
        assert!(lldp.is_link_local_control());
        assert!(!other.is_link_local_control());
    }

    #[test]
    fn test_group_mapping() {
        let mac = MacAddress::from_ipv4_group(Ipv4Addr::new(239, 129, 2, 3));
        assert_eq!(mac.to_string(), "01:00:5e:01:02:03");

        let mac6 = MacAddress::from_ipv6_group("ff02::1:ff00:1234".parse().unwrap());
        assert_eq!(mac6.to_string(), "33:33:ff:00:12:34");
    }
}
