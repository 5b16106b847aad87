//! VLAN identifiers and per-port VLAN membership sets.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// IEEE 802.1Q VLAN identifier (1-4094).
///
/// VLAN 0 (priority tagged) and VLAN 4095 are reserved and rejected.
///
/// ```
/// use sonic_bridge_types::VlanId;
///
/// let vlan = VlanId::new(100).unwrap();
/// assert_eq!(vlan.as_u16(), 100);
/// assert!(VlanId::new(0).is_err());
/// assert!(VlanId::new(4095).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    pub const MIN: u16 = 1;
    pub const MAX: u16 = 4094;

    /// Default VLAN ID (VLAN 1).
    pub const DEFAULT: VlanId = VlanId(1);

    /// # Errors
    ///
    /// Returns an error if the VLAN ID is not in the valid range (1-4094).
    pub const fn new(id: u16) -> Result<Self, ParseError> {
        if id >= Self::MIN && id <= Self::MAX {
            Ok(VlanId(id))
        } else {
            Err(ParseError::InvalidVlanId(id))
        }
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns true if `id` lies in the valid 1-4094 range.
    pub const fn is_valid(id: u16) -> bool {
        id >= Self::MIN && id <= Self::MAX
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VlanId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accepts "Vlan100" as well as "100"
        let id_str = match s.get(..4) {
            Some(prefix) if prefix.eq_ignore_ascii_case("vlan") => &s[4..],
            _ => s,
        };

        let id: u16 = id_str.parse().map_err(|_| ParseError::InvalidVlanId(0))?;
        VlanId::new(id)
    }
}

impl TryFrom<u16> for VlanId {
    type Error = ParseError;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        VlanId::new(id)
    }
}

impl From<VlanId> for u16 {
    fn from(vlan: VlanId) -> u16 {
        vlan.0
    }
}

const VLAN_WORDS: usize = 4096 / 64;

/// Fixed-size VLAN membership bitmap covering the whole 12-bit VLAN space.
///
/// Membership tests are O(1); the set never allocates.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct VlanSet {
    words: [u64; VLAN_WORDS],
}

impl VlanSet {
    pub const fn new() -> Self {
        Self {
            words: [0; VLAN_WORDS],
        }
    }

    /// Inserts a VLAN. Returns true if it was not already present.
    pub fn insert(&mut self, vlan: VlanId) -> bool {
        let (word, bit) = Self::slot(vlan);
        let was_set = self.words[word] & bit != 0;
        self.words[word] |= bit;
        !was_set
    }

    /// Removes a VLAN. Returns true if it was present.
    pub fn remove(&mut self, vlan: VlanId) -> bool {
        let (word, bit) = Self::slot(vlan);
        let was_set = self.words[word] & bit != 0;
        self.words[word] &= !bit;
        was_set
    }

    pub fn contains(&self, vlan: VlanId) -> bool {
        let (word, bit) = Self::slot(vlan);
        self.words[word] & bit != 0
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterates member VLANs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = VlanId> + '_ {
        (VlanId::MIN..=VlanId::MAX)
            .filter_map(|id| VlanId::new(id).ok())
            .filter(move |vlan| self.contains(*vlan))
    }

    const fn slot(vlan: VlanId) -> (usize, u64) {
        let id = vlan.0 as usize;
        (id / 64, 1u64 << (id % 64))
    }
}

impl Default for VlanSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VlanSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|v| v.as_u16())).finish()
    }
}

impl FromIterator<VlanId> for VlanSet {
    fn from_iter<T: IntoIterator<Item = VlanId>>(iter: T) -> Self {
        let mut set = VlanSet::new();
        for vlan in iter {
            set.insert(vlan);
        }
        set
    }
}
