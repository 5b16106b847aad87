//! Forwarding database: learned MAC locations.

use crate::config::DEFAULT_FDB_MAX_ENTRIES;
use crate::ports::PortId;
use parking_lot::RwLock;
use serde::Serialize;
use sonic_bridge_types::{MacAddress, VlanId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FdbKey {
    pub mac: MacAddress,
    pub vlan: Option<VlanId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FdbEntry {
    pub port: PortId,
    /// Configured, never moved by learning.
    pub is_static: bool,
}

/// MAC + VLAN to port table.
///
/// Ageing belongs to the FDB management collaborator; entries stay until
/// it flushes them or their port leaves the bridge. Learning stops adding
/// addresses at `max_entries`; known addresses still move.
#[derive(Debug)]
pub struct ForwardingDatabase {
    entries: RwLock<HashMap<FdbKey, FdbEntry>>,
    max_entries: usize,
}

impl Default for ForwardingDatabase {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_FDB_MAX_ENTRIES)
    }
}

impl ForwardingDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Records that `mac` lives behind `port`. Group and zero addresses are
    /// never learned; static entries are never moved.
    ///
    /// Returns false only when a new address was refused because the table
    /// is full.
    pub fn learn(&self, mac: MacAddress, vlan: Option<VlanId>, port: PortId) -> bool {
        if mac.is_multicast() || mac.is_zero() {
            return true;
        }
        let key = FdbKey { mac, vlan };

        if let Some(entry) = self.entries.read().get(&key) {
            if entry.is_static || entry.port == port {
                return true;
            }
        }

        let mut entries = self.entries.write();
        let full = entries.len() >= self.max_entries;
        match entries.get_mut(&key) {
            Some(entry) if entry.is_static => true,
            Some(entry) => {
                entry.port = port;
                true
            }
            None if full => false,
            None => {
                entries.insert(
                    key,
                    FdbEntry {
                        port,
                        is_static: false,
                    },
                );
                true
            }
        }
    }

    pub fn add_static(&self, mac: MacAddress, vlan: Option<VlanId>, port: PortId) {
        self.entries.write().insert(
            FdbKey { mac, vlan },
            FdbEntry {
                port,
                is_static: true,
            },
        );
    }

    pub fn lookup(&self, mac: MacAddress, vlan: Option<VlanId>) -> Option<PortId> {
        self.entries
            .read()
            .get(&FdbKey { mac, vlan })
            .map(|e| e.port)
    }

    pub fn remove(&self, mac: MacAddress, vlan: Option<VlanId>) -> Option<FdbEntry> {
        self.entries.write().remove(&FdbKey { mac, vlan })
    }

    /// Removes every entry pointing at `port`, static ones included.
    pub fn purge_port(&self, port: PortId) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.port != port);
        before - entries.len()
    }

    /// Removes learned entries.
    pub fn flush(&self) {
        self.entries.write().retain(|_, e| e.is_static);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0x02, 0, 0, 0, 0, last])
    }

    fn pid(id: u8) -> PortId {
        PortId::new(id).unwrap()
    }

    #[test]
    fn test_learn_and_move() {
        let fdb = ForwardingDatabase::new();
        fdb.learn(mac(1), None, pid(0));
        assert_eq!(fdb.lookup(mac(1), None), Some(pid(0)));

        fdb.learn(mac(1), None, pid(3));
        assert_eq!(fdb.lookup(mac(1), None), Some(pid(3)));
        assert_eq!(fdb.len(), 1);
    }

    #[test]
    fn test_group_addresses_not_learned() {
        let fdb = ForwardingDatabase::new();
        fdb.learn(MacAddress::BROADCAST, None, pid(0));
        fdb.learn("01:00:5e:00:00:01".parse().unwrap(), None, pid(0));
        fdb.learn(MacAddress::ZERO, None, pid(0));
        assert!(fdb.is_empty());
    }

    #[test]
    fn test_vlan_scoped() {
        let fdb = ForwardingDatabase::new();
        let vlan = VlanId::new(10).unwrap();
        fdb.learn(mac(1), Some(vlan), pid(1));
        assert_eq!(fdb.lookup(mac(1), None), None);
        assert_eq!(fdb.lookup(mac(1), Some(vlan)), Some(pid(1)));
    }

    #[test]
    fn test_static_entries_pinned() {
        let fdb = ForwardingDatabase::new();
        fdb.add_static(mac(1), None, pid(2));
        fdb.learn(mac(1), None, pid(0));
        assert_eq!(fdb.lookup(mac(1), None), Some(pid(2)));

        fdb.learn(mac(2), None, pid(0));
        fdb.flush();
        assert_eq!(fdb.lookup(mac(2), None), None);
        assert_eq!(fdb.lookup(mac(1), None), Some(pid(2)));
    }

    #[test]
    fn test_learning_stops_when_full() {
        let fdb = ForwardingDatabase::with_capacity(2);
        assert!(fdb.learn(mac(1), None, pid(0)));
        assert!(fdb.learn(mac(2), None, pid(0)));
        assert!(!fdb.learn(mac(3), None, pid(0)));
        assert_eq!(fdb.len(), 2);
        assert_eq!(fdb.lookup(mac(3), None), None);

        // Known addresses still move.
        assert!(fdb.learn(mac(1), None, pid(4)));
        assert_eq!(fdb.lookup(mac(1), None), Some(pid(4)));

        fdb.flush();
        assert!(fdb.learn(mac(3), None, pid(0)));
        assert_eq!(fdb.lookup(mac(3), None), Some(pid(0)));
    }

    #[test]
    fn test_default_capacity() {
        let fdb = ForwardingDatabase::new();
        assert_eq!(fdb.max_entries(), DEFAULT_FDB_MAX_ENTRIES);
    }

    #[test]
    fn test_purge_port() {
        let fdb = ForwardingDatabase::new();
        fdb.learn(mac(1), None, pid(0));
        fdb.learn(mac(2), None, pid(0));
        fdb.add_static(mac(3), None, pid(0));
        fdb.learn(mac(4), None, pid(1));

        assert_eq!(fdb.purge_port(pid(0)), 3);
        assert_eq!(fdb.len(), 1);
        assert!(fdb.remove(mac(4), None).is_some());
    }
}
