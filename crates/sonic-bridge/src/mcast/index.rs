use super::types::{GroupEntry, IndexChange, Membership, MembershipUpdate, MembershipView};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::ports::{PortId, PortMask};
use parking_lot::{Mutex, RwLock};
use sonic_bridge_types::FlowKey;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct IndexState {
    entries: HashMap<FlowKey, GroupEntry>,
    /// Bridge-wide multicast router ports.
    router_ports: PortMask,
    /// Bumped by every change to who receives what.
    generation: u64,
    /// Flows programmed into hardware, keyed as programmed, with the ports
    /// each entry touches (forward mask plus ingress).
    installed: HashMap<FlowKey, PortMask>,
}

impl IndexState {
    /// Removes and returns the programmed flows a change to `key` affects.
    /// An any-source key covers every source of its group.
    fn release_matching(&mut self, key: &FlowKey, vlan_aware: bool) -> Vec<FlowKey> {
        self.release_where(|flow, _| covers(key, flow, vlan_aware))
    }

    fn release_where(&mut self, mut pred: impl FnMut(&FlowKey, PortMask) -> bool) -> Vec<FlowKey> {
        let mut released: Vec<FlowKey> = self
            .installed
            .iter()
            .filter(|(flow, ports)| pred(*flow, **ports))
            .map(|(flow, _)| *flow)
            .collect();
        for flow in &released {
            self.installed.remove(flow);
        }
        released.sort();
        released
    }
}

/// Whether a membership entry for `key` feeds the programmed `flow`.
fn covers(key: &FlowKey, flow: &FlowKey, vlan_aware: bool) -> bool {
    flow.group == key.group
        && (!vlan_aware || flow.vlan == key.vlan)
        && (key.source.is_none() || flow.source == key.source)
}

/// Snooped multicast membership, keyed by [`FlowKey`].
///
/// Lookups read an immutable state snapshot; updates copy, modify and
/// republish it, serialized by a writer mutex.
///
/// The index also remembers which flows were programmed into hardware
/// from its membership, so every membership change can hand back exactly
/// the hardware entries it made stale.
#[derive(Debug)]
pub struct MulticastGroupIndex {
    vlan_aware: bool,
    state: RwLock<Arc<IndexState>>,
    writer: Mutex<()>,
}

impl MulticastGroupIndex {
    pub fn new(vlan_aware: bool) -> Self {
        Self {
            vlan_aware,
            state: RwLock::new(Arc::new(IndexState::default())),
            writer: Mutex::new(()),
        }
    }

    fn normalize(&self, key: FlowKey) -> FlowKey {
        if self.vlan_aware {
            key
        } else {
            FlowKey { vlan: None, ..key }
        }
    }

    fn current(&self) -> Arc<IndexState> {
        Arc::clone(&*self.state.read())
    }

    fn update<R>(&self, f: impl FnOnce(&mut IndexState) -> R) -> R {
        let _guard = self.writer.lock();
        let mut next = (*self.current()).clone();
        let result = f(&mut next);
        *self.state.write() = Arc::new(next);
        result
    }

    /// Looks up the ports a flow goes to.
    ///
    /// A source-specific key matches its own entry and the any-source
    /// entry of the same group; the view is the union of both plus the
    /// bridge-wide router ports.
    pub fn lookup(&self, key: &FlowKey) -> Membership {
        let key = self.normalize(*key);
        let state = self.current();

        let exact = state.entries.get(&key);
        let any = if key.is_source_specific() {
            state.entries.get(&key.any_source())
        } else {
            None
        };

        if exact.is_none() && any.is_none() {
            return Membership::Unknown;
        }

        let mut view = MembershipView {
            router_ports: state.router_ports,
            generation: state.generation,
            ..Default::default()
        };
        for entry in exact.into_iter().chain(any) {
            view.members = view.members.union(entry.members);
            view.router_ports = view.router_ports.union(entry.router_ports);
        }
        Membership::Known(view)
    }

    pub fn get(&self, key: &FlowKey) -> Option<GroupEntry> {
        self.current().entries.get(&self.normalize(*key)).cloned()
    }

    /// Applies a snooping report. Ports outside `valid` are ignored.
    pub fn update_membership(&self, update: MembershipUpdate, valid: PortMask) -> IndexChange {
        let key = self.normalize(update.key);
        let ports = update.ports.intersect(valid);

        let ignored = update.ports.difference(valid);
        let (entry, released) = self.update(|state| {
            state.generation += 1;
            let entry = state
                .entries
                .entry(key)
                .or_insert_with(|| GroupEntry::new(key));
            if update.is_router_port {
                entry.router_ports = ports;
            } else {
                entry.members = ports;
            }
            let entry = entry.clone();
            (entry, state.release_matching(&key, self.vlan_aware))
        });

        audit_log!(AuditRecord::new(
            AuditCategory::GroupMembership,
            "MulticastGroupIndex",
            "update_membership"
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(key.to_string())
        .with_object_type("multicast_group")
        .with_details(serde_json::json!({
            "members": entry.members.bits(),
            "router_ports": entry.router_ports.bits(),
            "ignored_ports": ignored.bits(),
            "released_hw_flows": released.len(),
        })));

        IndexChange {
            removed: None,
            released,
        }
    }

    /// Removes a flow's entry.
    pub fn expire(&self, key: &FlowKey) -> IndexChange {
        let key = self.normalize(*key);
        let change = self.update(|state| match state.entries.remove(&key) {
            Some(entry) => {
                state.generation += 1;
                IndexChange {
                    removed: Some(entry),
                    released: state.release_matching(&key, self.vlan_aware),
                }
            }
            None => IndexChange::default(),
        });

        if change.removed.is_some() {
            audit_log!(AuditRecord::new(
                AuditCategory::GroupMembership,
                "MulticastGroupIndex",
                "expire_membership"
            )
            .with_outcome(AuditOutcome::Success)
            .with_object_id(key.to_string())
            .with_object_type("multicast_group")
            .with_details(serde_json::json!({
                "released_hw_flows": change.released.len(),
            })));
        }
        change
    }

    /// Adds or removes a bridge-wide multicast router port. Router ports
    /// receive every flow, so any real change releases every programmed
    /// flow.
    pub fn set_router_port(&self, port: PortId, enabled: bool) -> IndexChange {
        self.update(|state| {
            if state.router_ports.contains(port) == enabled {
                return IndexChange::default();
            }
            if enabled {
                state.router_ports.insert(port);
            } else {
                state.router_ports.remove(port);
            }
            state.generation += 1;
            IndexChange {
                removed: None,
                released: state.release_where(|_, _| true),
            }
        })
    }

    pub fn router_ports(&self) -> PortMask {
        self.current().router_ports
    }

    /// Records a hardware entry programmed from a view read at
    /// `generation`. `ports` is the entry's forward mask plus its ingress.
    ///
    /// Returns false, recording nothing, if membership changed since the
    /// view was read. The caller must then invalidate the entry.
    pub fn record_install(&self, key: &FlowKey, ports: PortMask, generation: u64) -> bool {
        let state = self.current();
        if state.generation != generation {
            return false;
        }
        if state
            .installed
            .get(key)
            .is_some_and(|recorded| ports.is_subset_of(*recorded))
        {
            return true;
        }
        self.update(|state| {
            if state.generation != generation {
                return false;
            }
            let recorded = state.installed.entry(*key).or_default();
            *recorded = recorded.union(ports);
            true
        })
    }

    /// Returns true if a programmed flow is recorded for `key`'s group (or,
    /// for a source-specific key, for that source).
    pub fn is_offloaded(&self, key: &FlowKey) -> bool {
        let key = self.normalize(*key);
        self.current()
            .installed
            .keys()
            .any(|flow| covers(&key, flow, self.vlan_aware))
    }

    /// Programmed flows, as recorded.
    pub fn installed(&self) -> Vec<FlowKey> {
        let mut flows: Vec<_> = self.current().installed.keys().copied().collect();
        flows.sort();
        flows
    }

    /// Clears a departing port from every entry and the router-port set,
    /// and releases programmed flows that forward to it or enter on it.
    pub fn purge_port(&self, port: PortId) -> IndexChange {
        self.update(|state| {
            state.generation += 1;
            state.router_ports.remove(port);
            for entry in state.entries.values_mut() {
                entry.members.remove(port);
                entry.router_ports.remove(port);
            }
            IndexChange {
                removed: None,
                released: state.release_where(|_, ports| ports.contains(port)),
            }
        })
    }

    pub fn entries(&self) -> Vec<GroupEntry> {
        let mut entries: Vec<_> = self.current().entries.values().cloned().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    pub fn len(&self) -> usize {
        self.current().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_bridge_types::{GroupAddress, VlanId};
    use std::net::{IpAddr, Ipv4Addr};

    fn pid(id: u8) -> PortId {
        PortId::new(id).unwrap()
    }

    fn group(last: u8) -> FlowKey {
        FlowKey::new(GroupAddress::from_v4(Ipv4Addr::new(239, 1, 1, last)).unwrap())
    }

    fn all_ports() -> PortMask {
        PortMask::from_bits(0xff)
    }

    #[test]
    fn test_unknown_without_entry() {
        let index = MulticastGroupIndex::new(false);
        index.set_router_port(pid(1), true);
        assert_eq!(index.lookup(&group(1)), Membership::Unknown);
    }

    #[test]
    fn test_members_union_router_ports() {
        let index = MulticastGroupIndex::new(false);
        index.update_membership(
            MembershipUpdate::members(group(1), PortMask::of(&[pid(0), pid(2)])),
            all_ports(),
        );
        index.set_router_port(pid(1), true);

        let Membership::Known(view) = index.lookup(&group(1)) else {
            panic!("expected known group");
        };
        assert_eq!(view.ports(), PortMask::of(&[pid(0), pid(1), pid(2)]));
    }

    #[test]
    fn test_per_group_router_ports() {
        let index = MulticastGroupIndex::new(false);
        index.update_membership(
            MembershipUpdate::router_ports(group(1), PortMask::of(&[pid(3)])),
            all_ports(),
        );
        index.update_membership(
            MembershipUpdate::members(group(1), PortMask::of(&[pid(4)])),
            all_ports(),
        );

        let entry = index.get(&group(1)).unwrap();
        assert_eq!(entry.members, PortMask::of(&[pid(4)]));
        assert_eq!(entry.router_ports, PortMask::of(&[pid(3)]));
    }

    #[test]
    fn test_source_specific_includes_any_source() {
        let index = MulticastGroupIndex::new(false);
        let source = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        index.update_membership(
            MembershipUpdate::members(group(1), PortMask::of(&[pid(0)])),
            all_ports(),
        );
        index.update_membership(
            MembershipUpdate::members(group(1).with_source(source), PortMask::of(&[pid(5)])),
            all_ports(),
        );

        let Membership::Known(view) = index.lookup(&group(1).with_source(source)) else {
            panic!("expected known group");
        };
        assert_eq!(view.members, PortMask::of(&[pid(0), pid(5)]));

        let other = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        let Membership::Known(view) = index.lookup(&group(1).with_source(other)) else {
            panic!("expected known group");
        };
        assert_eq!(view.members, PortMask::of(&[pid(0)]));
    }

    #[test]
    fn test_vlan_ignored_when_not_vlan_aware() {
        let vlan = VlanId::new(10).unwrap();
        let unaware = MulticastGroupIndex::new(false);
        unaware.update_membership(
            MembershipUpdate::members(group(1).with_vlan(vlan), PortMask::of(&[pid(0)])),
            all_ports(),
        );
        assert!(unaware.lookup(&group(1)).is_known());

        let aware = MulticastGroupIndex::new(true);
        aware.update_membership(
            MembershipUpdate::members(group(1).with_vlan(vlan), PortMask::of(&[pid(0)])),
            all_ports(),
        );
        assert!(!aware.lookup(&group(1)).is_known());
        assert!(aware.lookup(&group(1).with_vlan(vlan)).is_known());
    }

    #[test]
    fn test_membership_masked_to_valid_ports() {
        let index = MulticastGroupIndex::new(false);
        index.update_membership(
            MembershipUpdate::members(group(1), PortMask::of(&[pid(0), pid(9)])),
            PortMask::of(&[pid(0), pid(1)]),
        );
        assert_eq!(index.get(&group(1)).unwrap().members, PortMask::of(&[pid(0)]));
    }

    #[test]
    fn test_expire_and_purge() {
        let index = MulticastGroupIndex::new(false);
        index.update_membership(
            MembershipUpdate::members(group(1), PortMask::of(&[pid(0), pid(1)])),
            all_ports(),
        );
        index.update_membership(
            MembershipUpdate::members(group(2), PortMask::of(&[pid(1)])),
            all_ports(),
        );
        index.set_router_port(pid(1), true);

        index.purge_port(pid(1));
        assert_eq!(index.get(&group(1)).unwrap().members, PortMask::of(&[pid(0)]));
        assert!(index.get(&group(2)).unwrap().members.is_empty());
        assert!(index.router_ports().is_empty());

        assert!(index.expire(&group(1)).removed.is_some());
        assert!(index.expire(&group(1)).removed.is_none());
        assert_eq!(index.len(), 1);
    }

    fn view(index: &MulticastGroupIndex, key: &FlowKey) -> MembershipView {
        match index.lookup(key) {
            Membership::Known(view) => view,
            Membership::Unknown => panic!("expected known group"),
        }
    }

    fn source(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_membership_change_releases_source_flows() {
        let index = MulticastGroupIndex::new(false);
        index.update_membership(
            MembershipUpdate::members(group(1), PortMask::of(&[pid(1), pid(2)])),
            all_ports(),
        );
        let flow = group(1).with_source(source(9));
        let other_group = group(2).with_source(source(9));
        index.update_membership(
            MembershipUpdate::members(group(2), PortMask::of(&[pid(1)])),
            all_ports(),
        );

        let g = view(&index, &flow).generation;
        assert!(index.record_install(&flow, PortMask::of(&[pid(0), pid(1), pid(2)]), g));
        assert!(index.record_install(&other_group, PortMask::of(&[pid(0), pid(1)]), g));
        assert!(index.is_offloaded(&group(1)));

        // A report for the any-source entry covers the programmed (S,G) flow.
        let change = index.update_membership(
            MembershipUpdate::members(group(1), PortMask::of(&[pid(1)])),
            all_ports(),
        );
        assert_eq!(change.released, vec![flow]);
        assert!(!index.is_offloaded(&group(1)));
        assert_eq!(index.installed(), vec![other_group]);
    }

    #[test]
    fn test_source_report_leaves_other_sources() {
        let index = MulticastGroupIndex::new(false);
        index.update_membership(
            MembershipUpdate::members(group(1), PortMask::of(&[pid(1)])),
            all_ports(),
        );
        let a = group(1).with_source(source(1));
        let b = group(1).with_source(source(2));
        let g = view(&index, &a).generation;
        assert!(index.record_install(&a, PortMask::of(&[pid(0), pid(1)]), g));
        assert!(index.record_install(&b, PortMask::of(&[pid(0), pid(1)]), g));

        let change = index.update_membership(
            MembershipUpdate::members(a, PortMask::of(&[pid(2)])),
            all_ports(),
        );
        assert_eq!(change.released, vec![a]);
        assert_eq!(index.installed(), vec![b]);

        let change = index.expire(&group(1));
        assert!(change.removed.is_some());
        assert_eq!(change.released, vec![b]);
    }

    #[test]
    fn test_tagged_flow_released_when_not_vlan_aware() {
        let index = MulticastGroupIndex::new(false);
        index.update_membership(
            MembershipUpdate::members(group(1), PortMask::of(&[pid(1), pid(2)])),
            all_ports(),
        );
        let flow = group(1)
            .with_source(source(9))
            .with_vlan(VlanId::new(10).unwrap());
        let g = view(&index, &flow).generation;
        assert!(index.record_install(&flow, PortMask::of(&[pid(0), pid(1), pid(2)]), g));
        assert!(index.is_offloaded(&group(1)));

        let change = index.update_membership(
            MembershipUpdate::members(group(1), PortMask::of(&[pid(1)])),
            all_ports(),
        );
        assert_eq!(change.released, vec![flow]);
    }

    #[test]
    fn test_stale_install_not_recorded() {
        let index = MulticastGroupIndex::new(false);
        index.update_membership(
            MembershipUpdate::members(group(1), PortMask::of(&[pid(1), pid(2)])),
            all_ports(),
        );
        let flow = group(1).with_source(source(9));
        let seen = view(&index, &flow);

        // Membership shrinks while the entry is being programmed.
        let change = index.update_membership(
            MembershipUpdate::members(group(1), PortMask::of(&[pid(1)])),
            all_ports(),
        );
        assert!(change.released.is_empty());

        assert!(!index.record_install(&flow, seen.ports().with(pid(0)), seen.generation));
        assert!(!index.is_offloaded(&flow));
        assert!(index.installed().is_empty());
    }

    #[test]
    fn test_purge_releases_flows_touching_port() {
        let index = MulticastGroupIndex::new(false);
        index.update_membership(
            MembershipUpdate::members(group(1), PortMask::of(&[pid(1), pid(2)])),
            all_ports(),
        );
        index.update_membership(
            MembershipUpdate::members(group(2), PortMask::of(&[pid(1)])),
            all_ports(),
        );
        let f1 = group(1).with_source(source(9));
        let f2 = group(2).with_source(source(9));
        let g = view(&index, &f1).generation;
        assert!(index.record_install(&f1, PortMask::of(&[pid(0), pid(1), pid(2)]), g));
        assert!(index.record_install(&f2, PortMask::of(&[pid(0), pid(1)]), g));

        let change = index.purge_port(pid(2));
        assert_eq!(change.released, vec![f1]);
        assert_eq!(index.installed(), vec![f2]);

        // Ingress leaving releases too.
        let change = index.purge_port(pid(0));
        assert_eq!(change.released, vec![f2]);
    }

    #[test]
    fn test_router_port_change_releases_all() {
        let index = MulticastGroupIndex::new(false);
        index.update_membership(
            MembershipUpdate::members(group(1), PortMask::of(&[pid(1)])),
            all_ports(),
        );
        let flow = group(1).with_source(source(9));
        let g = view(&index, &flow).generation;
        assert!(index.record_install(&flow, PortMask::of(&[pid(0), pid(1)]), g));

        assert!(index.set_router_port(pid(1), false).released.is_empty());
        assert_eq!(index.set_router_port(pid(3), true).released, vec![flow]);
        assert!(index.set_router_port(pid(3), true).released.is_empty());
    }
}
