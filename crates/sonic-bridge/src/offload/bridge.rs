use super::types::{ForwardDescriptor, MulticastOffload, OffloadDecision};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::frame::IngressStamp;
use crate::ports::PortMask;
use crate::stats::BridgeStats;
use crate::{audit_log, debug_log, warn_log};
use sonic_bridge_types::FlowKey;
use std::sync::Arc;

/// Mirrors multicast forwarding decisions into the hardware table.
///
/// Advisory only: it never touches frames. Every driver failure degrades
/// to [`OffloadDecision::NotApplicable`] and the frame stays on the
/// software path.
pub struct HardwareOffloadBridge {
    enabled: bool,
    bridge: String,
    driver: Arc<dyn MulticastOffload>,
    stats: Arc<BridgeStats>,
}

impl std::fmt::Debug for HardwareOffloadBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareOffloadBridge")
            .field("enabled", &self.enabled)
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

impl HardwareOffloadBridge {
    pub fn new(
        enabled: bool,
        bridge: impl Into<String>,
        driver: Arc<dyn MulticastOffload>,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self {
            enabled,
            bridge: bridge.into(),
            driver,
            stats,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn applies(&self, key: &FlowKey, ingress: &IngressStamp) -> bool {
        self.enabled && ingress.hw_backed && !key.group.is_reserved()
    }

    /// Tries to hand a known flow to hardware.
    ///
    /// `membership` is the flow's software delivery set and `hw_mask` the
    /// ports the switch can reach. The ingress port is never part of the
    /// programmed mask.
    pub fn try_accelerate(
        &self,
        key: &FlowKey,
        ingress: &IngressStamp,
        membership: PortMask,
        hw_mask: PortMask,
    ) -> OffloadDecision {
        if !self.applies(key, ingress) {
            return OffloadDecision::NotApplicable;
        }

        if let Some(existing) = self.driver.find_entry(key, ingress.port) {
            if existing.in_hardware {
                return OffloadDecision::AlreadyInstalled(existing.fwd_mask);
            }
        }

        let receivers = membership.without(ingress.port);
        if receivers.is_empty() {
            return match self.driver.block_flow(key, ingress.port) {
                Ok(()) => {
                    debug_log!(
                        "HardwareOffloadBridge",
                        flow = %key,
                        "no receivers, flow blocked in hardware"
                    );
                    OffloadDecision::Blocked
                }
                Err(e) => self.failed(key, "block_flow", &e.to_string()),
            };
        }

        let fwd_mask = receivers.intersect(hw_mask);
        if fwd_mask.is_empty() {
            return OffloadDecision::NotApplicable;
        }

        let desc = ForwardDescriptor {
            bridge: self.bridge.clone(),
            key: *key,
            ingress: ingress.port,
            fwd_mask,
            to_cpu: !receivers.is_subset_of(hw_mask),
        };
        match self.driver.add_entry(&desc) {
            Ok(()) => {
                debug_log!(
                    "HardwareOffloadBridge",
                    flow = %key,
                    fwd_mask = fwd_mask.bits(),
                    to_cpu = desc.to_cpu,
                    "hardware multicast entry installed"
                );
                OffloadDecision::Installed(fwd_mask)
            }
            Err(e) => self.failed(key, "add_entry", &e.to_string()),
        }
    }

    /// Blocks a rate-limited flow in hardware and drops its forwarding
    /// entry, so further frames of the flow stop reaching software.
    /// Returns true if the block rule was installed.
    pub fn block_flow(&self, key: &FlowKey, ingress: &IngressStamp) -> bool {
        if !self.applies(key, ingress) {
            return false;
        }

        if let Err(e) = self.driver.block_flow(key, ingress.port) {
            self.failed(key, "block_flow", &e.to_string());
            return false;
        }
        if let Err(e) = self.driver.invalidate_entry(key) {
            warn_log!(
                "HardwareOffloadBridge",
                flow = %key,
                error = %e,
                "failed to invalidate hardware entry"
            );
        }

        audit_log!(AuditRecord::new(
            AuditCategory::HardwareOffload,
            "HardwareOffloadBridge",
            "block_flow"
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(key.to_string())
        .with_object_type("multicast_flow")
        .with_details(serde_json::json!({
            "bridge": self.bridge,
            "ingress_port": ingress.port.index(),
        })));
        true
    }

    /// Drops the hardware entry of a flow, e.g. after its membership
    /// expired.
    pub fn invalidate(&self, key: &FlowKey) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.driver.invalidate_entry(key) {
            warn_log!(
                "HardwareOffloadBridge",
                flow = %key,
                error = %e,
                "failed to invalidate hardware entry"
            );
        }
    }

    fn failed(&self, key: &FlowKey, op: &str, error: &str) -> OffloadDecision {
        BridgeStats::bump(&self.stats.offload_failures);
        warn_log!(
            "HardwareOffloadBridge",
            flow = %key,
            op = op,
            error = error,
            "hardware offload failed, using software path"
        );
        OffloadDecision::NotApplicable
    }
}
