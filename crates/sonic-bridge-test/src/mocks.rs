//! Collaborator doubles: egress, hardware table driver and frame allocator.

use parking_lot::Mutex;
use sonic_bridge::{
    DropReason, ForwardDescriptor, Frame, FrameAllocator, HwMulticastEntry, MulticastOffload,
    OffloadError, Port, PortId, Transmit,
};
use sonic_bridge_types::{FlowKey, VlanId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// One frame handed to the egress collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub port: String,
    pub port_id: PortId,
    /// The frame was an allocator copy rather than the original.
    pub cloned: bool,
    pub vlan: Option<VlanId>,
    pub tagged: bool,
    pub len: usize,
}

/// Egress collaborator that records every delivery.
#[derive(Debug, Default)]
pub struct RecordingTransmit {
    deliveries: Mutex<Vec<Delivery>>,
    failing: Mutex<HashMap<String, DropReason>>,
}

impl RecordingTransmit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every transmit on `port` fail with `reason`.
    pub fn fail_port(&self, port: &str, reason: DropReason) {
        self.failing.lock().insert(port.to_string(), reason);
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    /// Names of the ports delivered to, in delivery order.
    pub fn ports(&self) -> Vec<String> {
        self.deliveries.lock().iter().map(|d| d.port.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.deliveries.lock().len()
    }

    /// Number of deliveries that carried an allocator copy.
    pub fn clones(&self) -> usize {
        self.deliveries.lock().iter().filter(|d| d.cloned).count()
    }

    pub fn clear(&self) {
        self.deliveries.lock().clear();
    }
}

impl Transmit for RecordingTransmit {
    fn transmit(&self, port: &Port, frame: Frame) -> Result<(), DropReason> {
        if let Some(reason) = self.failing.lock().get(&port.name) {
            return Err(*reason);
        }
        self.deliveries.lock().push(Delivery {
            port: port.name.clone(),
            port_id: port.id,
            cloned: frame.is_clone(),
            vlan: frame.meta.vlan,
            tagged: frame.meta.tagged,
            len: frame.len(),
        });
        Ok(())
    }
}

/// A call made to the hardware table driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OffloadCall {
    Find { key: FlowKey, ingress: PortId },
    Add(ForwardDescriptor),
    Block { key: FlowKey, ingress: PortId },
    Invalidate(FlowKey),
}

/// Hardware table driver with preset contents and injectable failures.
#[derive(Debug, Default)]
pub struct ScriptedOffload {
    entries: Mutex<HashMap<(FlowKey, PortId), HwMulticastEntry>>,
    calls: Mutex<Vec<OffloadCall>>,
    add_error: Mutex<Option<OffloadError>>,
    block_error: Mutex<Option<OffloadError>>,
}

impl ScriptedOffload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an entry as if programmed earlier.
    pub fn preset(&self, entry: HwMulticastEntry) {
        self.entries.lock().insert((entry.key, entry.ingress), entry);
    }

    pub fn fail_adds(&self, err: OffloadError) {
        *self.add_error.lock() = Some(err);
    }

    pub fn fail_blocks(&self, err: OffloadError) {
        *self.block_error.lock() = Some(err);
    }

    pub fn calls(&self) -> Vec<OffloadCall> {
        self.calls.lock().clone()
    }

    pub fn adds(&self) -> Vec<ForwardDescriptor> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                OffloadCall::Add(desc) => Some(desc.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn blocks(&self) -> Vec<(FlowKey, PortId)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                OffloadCall::Block { key, ingress } => Some((*key, *ingress)),
                _ => None,
            })
            .collect()
    }

    pub fn invalidations(&self) -> Vec<FlowKey> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                OffloadCall::Invalidate(key) => Some(*key),
                _ => None,
            })
            .collect()
    }

    pub fn entry(&self, key: &FlowKey, ingress: PortId) -> Option<HwMulticastEntry> {
        self.entries.lock().get(&(*key, ingress)).cloned()
    }
}

impl MulticastOffload for ScriptedOffload {
    fn find_entry(&self, key: &FlowKey, ingress: PortId) -> Option<HwMulticastEntry> {
        self.calls.lock().push(OffloadCall::Find { key: *key, ingress });
        self.entry(key, ingress)
    }

    fn add_entry(&self, desc: &ForwardDescriptor) -> Result<(), OffloadError> {
        self.calls.lock().push(OffloadCall::Add(desc.clone()));
        if let Some(err) = self.add_error.lock().clone() {
            return Err(err);
        }
        self.preset(HwMulticastEntry {
            key: desc.key,
            ingress: desc.ingress,
            fwd_mask: desc.fwd_mask,
            in_hardware: true,
        });
        Ok(())
    }

    fn block_flow(&self, key: &FlowKey, ingress: PortId) -> Result<(), OffloadError> {
        self.calls.lock().push(OffloadCall::Block { key: *key, ingress });
        match self.block_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn invalidate_entry(&self, key: &FlowKey) -> Result<(), OffloadError> {
        self.calls.lock().push(OffloadCall::Invalidate(*key));
        self.entries.lock().retain(|(k, _), _| k != key);
        Ok(())
    }
}

/// Allocator that succeeds a fixed number of times, then fails.
#[derive(Debug)]
pub struct FlakyAllocator {
    remaining: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyAllocator {
    pub fn new(successes: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(successes),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl FrameAllocator for FlakyAllocator {
    fn try_clone(&self, frame: &Frame) -> Option<Frame> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| frame.shallow_clone())
    }
}

/// Names of ports that must never see a delivery.
pub fn assert_not_delivered(transmit: &RecordingTransmit, ports: &[&str]) {
    let forbidden: HashSet<&str> = ports.iter().copied().collect();
    for d in transmit.deliveries() {
        assert!(
            !forbidden.contains(d.port.as_str()),
            "unexpected delivery to {}",
            d.port
        );
    }
}
