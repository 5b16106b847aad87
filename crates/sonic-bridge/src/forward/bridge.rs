use super::types::{
    Disposition, ForwardPath, IngressDrop, MulticastOutcome, MulticastPath, Transmit,
};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::clock::{Clock, SystemClock};
use crate::config::{BridgeConfig, Capabilities};
use crate::error::{BridgeError, DropReason, Result};
use crate::fanout::{FanoutEngine, FanoutOutcome};
use crate::fdb::ForwardingDatabase;
use crate::filter::{DeliveryFilter, StandardFilter};
use crate::frame::{Frame, FrameAllocator, HeapAllocator};
use crate::limiter::{UnknownMulticastLimiter, Verdict};
use crate::mcast::{
    IndexChange, Membership, MembershipUpdate, MembershipView, MulticastGroupIndex,
};
use crate::offload::{HardwareOffloadBridge, MulticastOffload, NoOffload, OffloadDecision};
use crate::ports::{
    Port, PortDescriptor, PortFlags, PortId, PortMask, PortSnapshot, PortState, PortTable,
};
use crate::stats::{BridgeStats, StatsSnapshot};
use crate::{audit_log, debug_log, info_log};
use parking_lot::Mutex;
use sonic_bridge_types::FlowKey;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Assembles a [`Bridge`] from its configuration and collaborators.
///
/// Only the egress collaborator is mandatory; everything else defaults to
/// the software implementation.
pub struct BridgeBuilder {
    config: BridgeConfig,
    transmit: Arc<dyn Transmit>,
    offload: Arc<dyn MulticastOffload>,
    allocator: Arc<dyn FrameAllocator>,
    clock: Arc<dyn Clock>,
    filter: Option<Arc<dyn DeliveryFilter>>,
}

impl BridgeBuilder {
    pub fn new(config: BridgeConfig, transmit: Arc<dyn Transmit>) -> Self {
        Self {
            config,
            transmit,
            offload: Arc::new(NoOffload),
            allocator: Arc::new(HeapAllocator),
            clock: Arc::new(SystemClock),
            filter: None,
        }
    }

    pub fn offload(mut self, driver: Arc<dyn MulticastOffload>) -> Self {
        self.offload = driver;
        self
    }

    pub fn allocator(mut self, allocator: Arc<dyn FrameAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the standard delivery rules.
    pub fn filter(mut self, filter: Arc<dyn DeliveryFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn build(self) -> Result<Bridge> {
        self.config.validate()?;

        let caps = self.config.capabilities();
        let stats = Arc::new(BridgeStats::new());
        let filter: Arc<dyn DeliveryFilter> = match self.filter {
            Some(filter) => filter,
            None => Arc::new(StandardFilter::new(caps, &self.config.filter)),
        };
        let engine = FanoutEngine::new(filter, self.allocator, stats.clone());
        let offload = HardwareOffloadBridge::new(
            self.config.offload_enabled(),
            self.config.name.clone(),
            self.offload,
            stats.clone(),
        );
        let limiter = UnknownMulticastLimiter::new(&self.config.limiter, self.clock);

        info_log!(
            "Bridge",
            bridge = %self.config.name,
            vlan_aware = caps.contains(Capabilities::VLAN_AWARE),
            hardware_offload = offload.is_enabled(),
            snooping = self.config.snooping.enabled,
            "bridge forwarding engine created"
        );
        audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "Bridge", "create")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(self.config.name.clone())
            .with_object_type("bridge")
            .with_details(serde_json::json!({
                "capabilities": caps.bits(),
                "limiter_capacity": self.config.limiter.capacity,
                "fdb_max_entries": self.config.fdb.max_entries,
            })));

        Ok(Bridge {
            caps,
            ports: PortTable::new(),
            groups: MulticastGroupIndex::new(caps.contains(Capabilities::VLAN_AWARE)),
            fdb: ForwardingDatabase::with_capacity(self.config.fdb.max_entries),
            limiter,
            offload,
            engine,
            transmit: self.transmit,
            stats,
            admin: Mutex::new(()),
            config: self.config,
        })
    }
}

/// One bridge's forwarding engine.
///
/// All methods take `&self`; share the bridge between receive threads
/// with an `Arc`.
pub struct Bridge {
    config: BridgeConfig,
    caps: Capabilities,
    ports: PortTable,
    groups: MulticastGroupIndex,
    fdb: ForwardingDatabase,
    limiter: UnknownMulticastLimiter,
    offload: HardwareOffloadBridge,
    engine: FanoutEngine,
    transmit: Arc<dyn Transmit>,
    stats: Arc<BridgeStats>,
    /// Serializes port removal against membership updates, so membership
    /// never names a departed port.
    admin: Mutex<()>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("name", &self.config.name)
            .field("caps", &self.caps)
            .field("ports", &self.ports.snapshot().len())
            .finish_non_exhaustive()
    }
}

/// Flood-time port policy, on top of the delivery filter.
fn flood_eligible(port: &Port, unicast: bool, proxyarp_replied: bool) -> bool {
    if unicast && !port.has_flag(PortFlags::FLOOD) {
        return false;
    }
    if port.has_flag(PortFlags::PROXYARP) {
        return false;
    }
    !(port.has_flag(PortFlags::PROXYARP_WIFI) && proxyarp_replied)
}

impl Bridge {
    pub fn builder(config: BridgeConfig, transmit: Arc<dyn Transmit>) -> BridgeBuilder {
        BridgeBuilder::new(config, transmit)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn ports(&self) -> Arc<PortSnapshot> {
        self.ports.snapshot()
    }

    pub fn groups(&self) -> &MulticastGroupIndex {
        &self.groups
    }

    pub fn fdb(&self) -> &ForwardingDatabase {
        &self.fdb
    }

    pub fn limiter(&self) -> &UnknownMulticastLimiter {
        &self.limiter
    }

    fn vlan_aware(&self) -> bool {
        self.caps.contains(Capabilities::VLAN_AWARE)
    }

    /// Last step of every delivery: egress VLAN tagging, MTU check, then
    /// the transmit collaborator.
    fn egress(&self, port: &Port, mut frame: Frame) {
        if self.vlan_aware() {
            if let Some(vlan) = frame.meta.vlan {
                frame.meta.tagged = !port.egress_untagged(vlan);
            }
        }

        if self.config.mtu_check && frame.l2_payload_len() > port.mtu as usize {
            self.egress_drop(port, DropReason::Oversize);
            return;
        }

        match self.transmit.transmit(port, frame) {
            Ok(()) => BridgeStats::bump(&self.stats.delivered),
            Err(reason) => self.egress_drop(port, reason),
        }
    }

    fn egress_drop(&self, port: &Port, reason: DropReason) {
        BridgeStats::bump(&self.stats.egress_dropped);
        port.stats.tx_dropped.fetch_add(1, Ordering::Relaxed);
        debug_log!(
            "Bridge",
            port = %port.name,
            reason = %reason,
            "egress drop"
        );
    }

    fn dispatch<'p, I>(&self, candidates: I, frame: Frame, retain: bool) -> (FanoutOutcome, Option<Frame>)
    where
        I: IntoIterator<Item = &'p Arc<Port>>,
    {
        if retain {
            let outcome = self
                .engine
                .fanout_retaining(candidates, &frame, |port, copy| self.egress(port, copy));
            (outcome, Some(frame))
        } else {
            let outcome = self
                .engine
                .fanout(candidates, frame, |port, f| self.egress(port, f));
            (outcome, None)
        }
    }

    fn account(&self, outcome: FanoutOutcome) -> FanoutOutcome {
        if outcome == FanoutOutcome::NoEligiblePort {
            BridgeStats::bump(&self.stats.filtered);
        }
        outcome
    }

    fn send_one(&self, to: PortId, frame: Frame) -> FanoutOutcome {
        let snap = self.ports.snapshot();
        let outcome = match snap.get(to) {
            Some(port) => self.engine.fanout(std::iter::once(port), frame, |p, f| self.egress(p, f)),
            None => FanoutOutcome::NoEligiblePort,
        };
        self.account(outcome)
    }

    /// Sends a frame originated by the bridge device itself out of one port.
    pub fn deliver(&self, to: PortId, mut frame: Frame) -> FanoutOutcome {
        frame.meta.ingress = None;
        self.send_one(to, frame)
    }

    /// Relays a frame received on another port out of one port.
    pub fn forward(&self, to: PortId, frame: Frame) -> FanoutOutcome {
        self.send_one(to, frame)
    }

    /// Floods a broadcast or unknown-unicast frame to every eligible port.
    pub fn flood(&self, frame: Frame, unicast: bool) -> FanoutOutcome {
        let snap = self.ports.snapshot();
        self.flood_in(&snap, frame, unicast, false).0
    }

    fn flood_in(
        &self,
        snap: &PortSnapshot,
        frame: Frame,
        unicast: bool,
        retain: bool,
    ) -> (FanoutOutcome, Option<Frame>) {
        BridgeStats::bump(&self.stats.flooded);
        let replied = frame.meta.proxyarp_replied;
        let candidates = snap
            .iter()
            .filter(move |p| flood_eligible(p, unicast, replied));
        let (outcome, local) = self.dispatch(candidates, frame, retain);
        (self.account(outcome), local)
    }

    /// Floods a multicast frame according to snooped membership.
    pub fn flood_multicast(&self, frame: Frame) -> MulticastOutcome {
        let snap = self.ports.snapshot();
        self.multicast_in(&snap, frame, false).0
    }

    fn multicast_in(
        &self,
        snap: &PortSnapshot,
        frame: Frame,
        retain: bool,
    ) -> (MulticastOutcome, Option<Frame>) {
        if !self.config.snooping.enabled {
            let (fanout, local) = self.flood_in(snap, frame, false, retain);
            return (mcast_outcome(MulticastPath::Unsnooped, fanout), local);
        }

        let Some(key) = frame.flow_key(self.vlan_aware()) else {
            // Unparseable group: flood it as unknown, but do not track it.
            BridgeStats::bump(&self.stats.mcast_unknown);
            let (fanout, local) = self.flood_in(snap, frame, false, retain);
            return (mcast_outcome(MulticastPath::Unknown, fanout), local);
        };

        if key.group.is_reserved() {
            let (fanout, local) = self.flood_in(snap, frame, false, retain);
            return (mcast_outcome(MulticastPath::Reserved, fanout), local);
        }

        match self.groups.lookup(&key) {
            Membership::Known(view) => {
                BridgeStats::bump(&self.stats.mcast_known);
                self.known_multicast(snap, &key, view, frame, retain)
            }
            Membership::Unknown => {
                BridgeStats::bump(&self.stats.mcast_unknown);
                self.unknown_multicast(snap, &key, frame, retain)
            }
        }
    }

    fn known_multicast(
        &self,
        snap: &PortSnapshot,
        key: &FlowKey,
        view: MembershipView,
        frame: Frame,
        retain: bool,
    ) -> (MulticastOutcome, Option<Frame>) {
        let members = view.ports();
        let decision = match frame.ingress() {
            Some(ingress) => {
                let decision = self
                    .offload
                    .try_accelerate(key, ingress, members, snap.hw_mask());
                match decision {
                    OffloadDecision::Installed(hw) | OffloadDecision::AlreadyInstalled(hw) => {
                        self.track_install(key, hw.with(ingress.port), view.generation);
                    }
                    OffloadDecision::Blocked => {
                        self.track_install(key, PortMask::of(&[ingress.port]), view.generation);
                    }
                    OffloadDecision::NotApplicable => {}
                }
                decision
            }
            None => OffloadDecision::NotApplicable,
        };

        let path = match decision {
            OffloadDecision::NotApplicable => MulticastPath::Known,
            OffloadDecision::Blocked => MulticastPath::HardwareBlocked,
            OffloadDecision::Installed(hw_mask) | OffloadDecision::AlreadyInstalled(hw_mask) => {
                BridgeStats::bump(&self.stats.hw_forwarded);
                MulticastPath::HardwareAssisted { hw_mask }
            }
        };

        let residual = members.difference(decision.hw_mask());
        let (fanout, local) = self.dispatch(snap.ports_in(residual), frame, retain);
        let fanout = if path == MulticastPath::Known {
            self.account(fanout)
        } else {
            fanout
        };
        (mcast_outcome(path, fanout), local)
    }

    /// Records a programmed flow against the membership it was built from.
    /// If that membership changed meanwhile, the entry is already stale and
    /// is dropped from hardware; the next frame reprograms it.
    fn track_install(&self, key: &FlowKey, ports: PortMask, generation: u64) {
        if !self.groups.record_install(key, ports, generation) {
            debug_log!(
                "Bridge",
                flow = %key,
                "membership changed during hardware install, invalidating"
            );
            self.offload.invalidate(key);
        }
    }

    /// Drops hardware entries made stale by a membership change.
    fn release_offloaded(&self, change: &IndexChange) {
        for key in &change.released {
            self.offload.invalidate(key);
        }
    }

    fn unknown_multicast(
        &self,
        snap: &PortSnapshot,
        key: &FlowKey,
        frame: Frame,
        retain: bool,
    ) -> (MulticastOutcome, Option<Frame>) {
        let gated = match frame.ingress() {
            Some(ingress) => !self.config.limiter.upstream_only || ingress.upstream,
            None => false,
        };

        if gated && self.limiter.admit(key) == Verdict::Block {
            BridgeStats::bump(&self.stats.limiter_blocked);
            if let Some(ingress) = frame.ingress() {
                self.offload.block_flow(key, ingress);
            }
            debug_log!(
                "Bridge",
                flow = %key,
                "unknown multicast over ceiling, dropped"
            );
            return (
                mcast_outcome(MulticastPath::RateLimited, FanoutOutcome::NoEligiblePort),
                None,
            );
        }

        let (fanout, local) = self.flood_in(snap, frame, false, retain);
        (mcast_outcome(MulticastPath::Unknown, fanout), local)
    }

    /// Handles a frame received on a bridge port.
    pub fn on_frame_received(&self, port_id: PortId, mut frame: Frame) -> Disposition {
        let snap = self.ports.snapshot();
        let Some(port) = snap.get(port_id) else {
            return Disposition::dropped(IngressDrop::UnknownPort);
        };

        frame.meta.ingress = Some(port.stamp());

        if self.vlan_aware() {
            if frame.meta.vlan.is_none() {
                frame.meta.vlan = port.pvid;
                frame.meta.tagged = false;
            }
            match frame.meta.vlan {
                Some(vlan) if port.allows_vlan(vlan) => {}
                _ => return Disposition::dropped(IngressDrop::VlanNotAllowed),
            }
        }

        if !port.state.learns() {
            return Disposition::dropped(IngressDrop::PortState(port.state));
        }
        let fdb_vlan = if self.vlan_aware() { frame.meta.vlan } else { None };
        if !self.fdb.learn(frame.src(), fdb_vlan, port.id) {
            BridgeStats::bump(&self.stats.fdb_full);
        }
        if port.state != PortState::Forwarding {
            return Disposition::dropped(IngressDrop::PortState(port.state));
        }

        let dst = frame.dst();
        let retain = self.config.local_delivery;

        if self.config.bridge_mac == Some(dst) {
            return Disposition {
                path: ForwardPath::Local,
                fanout: FanoutOutcome::NoEligiblePort,
                local: Some(frame),
            };
        }

        if dst.is_unicast() {
            return match self.fdb.lookup(dst, fdb_vlan) {
                Some(out) => Disposition {
                    path: ForwardPath::KnownUnicast(out),
                    fanout: self.forward(out, frame),
                    local: None,
                },
                None => Disposition {
                    path: ForwardPath::UnknownUnicast,
                    fanout: self.flood_in(&snap, frame, true, false).0,
                    local: None,
                },
            };
        }

        if dst.is_broadcast() || !(dst.is_ipv4_multicast() || dst.is_ipv6_multicast()) {
            let (fanout, local) = self.flood_in(&snap, frame, false, retain);
            return Disposition {
                path: ForwardPath::Broadcast,
                fanout,
                local,
            };
        }

        let (mcast, local) = self.multicast_in(&snap, frame, retain);
        Disposition {
            path: ForwardPath::Multicast(mcast.path),
            fanout: mcast.fanout,
            local,
        }
    }

    pub fn add_port(&self, desc: PortDescriptor) -> Result<PortId> {
        let _guard = self.admin.lock();
        self.ports.add(desc)
    }

    /// Detaches a port and clears it from multicast membership and the
    /// forwarding database.
    pub fn remove_port(&self, id: PortId) -> Result<()> {
        let _guard = self.admin.lock();
        self.ports.remove(id)?;
        let change = self.groups.purge_port(id);
        self.release_offloaded(&change);
        let purged = self.fdb.purge_port(id);
        debug_log!("Bridge", port_id = id.index(), fdb_purged = purged, "port state purged");
        Ok(())
    }

    pub fn set_port_state(&self, id: PortId, state: PortState) -> Result<()> {
        self.ports.set_state(id, state)?;
        Ok(())
    }

    pub fn set_port_flags(&self, id: PortId, flags: PortFlags) -> Result<()> {
        self.ports.set_flags(id, flags)?;
        Ok(())
    }

    /// Applies a membership report from the snooping collaborator.
    pub fn update_group_membership(&self, update: MembershipUpdate) {
        let _guard = self.admin.lock();
        let change = self
            .groups
            .update_membership(update, self.ports.snapshot().valid_mask());
        self.release_offloaded(&change);
    }

    pub fn expire_group_membership(&self, key: &FlowKey) {
        let _guard = self.admin.lock();
        let change = self.groups.expire(key);
        self.release_offloaded(&change);
    }

    /// Marks a port as a multicast router port for every group.
    pub fn set_router_port(&self, id: PortId, enabled: bool) -> Result<()> {
        let _guard = self.admin.lock();
        if self.ports.snapshot().get(id).is_none() {
            return Err(BridgeError::PortNotFound(id));
        }
        let change = self.groups.set_router_port(id, enabled);
        self.release_offloaded(&change);

        audit_log!(AuditRecord::new(
            AuditCategory::GroupMembership,
            "Bridge",
            "set_router_port"
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(id.to_string())
        .with_object_type("bridge_port")
        .with_details(serde_json::json!({ "enabled": enabled })));
        Ok(())
    }
}

fn mcast_outcome(path: MulticastPath, fanout: FanoutOutcome) -> MulticastOutcome {
    MulticastOutcome { path, fanout }
}
