//! Port table with snapshot reads.
//!
//! Readers take an `Arc<PortSnapshot>` under a read lock held only long
//! enough to clone the pointer, then iterate the snapshot lock-free.
//! Writers are serialized by a separate mutex, build the next snapshot
//! without blocking readers, and swap it in under a brief write lock.

use super::types::{
    DeviceHandle, Port, PortDescriptor, PortFlags, PortId, PortMask, PortState, MAX_PORTS,
};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::error::{BridgeError, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Immutable view of the bridge ports at one point in time.
#[derive(Debug, Clone, Default)]
pub struct PortSnapshot {
    /// Ports in attach order; this is the flood iteration order.
    ports: Vec<Arc<Port>>,
    valid: PortMask,
}

impl PortSnapshot {
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Port>> {
        self.ports.iter()
    }

    pub fn get(&self, id: PortId) -> Option<&Arc<Port>> {
        if !self.valid.contains(id) {
            return None;
        }
        self.ports.iter().find(|p| p.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<Port>> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn by_device(&self, device: DeviceHandle) -> Option<&Arc<Port>> {
        self.ports.iter().find(|p| p.device == device)
    }

    /// Ids of every attached port.
    pub fn valid_mask(&self) -> PortMask {
        self.valid
    }

    /// Ports reachable by the hardware multicast table.
    pub fn hw_mask(&self) -> PortMask {
        self.ports
            .iter()
            .filter(|p| p.has_flag(PortFlags::HW_OFFLOAD))
            .map(|p| p.id)
            .collect()
    }

    /// Ports whose id is in `mask`, in attach order.
    pub fn ports_in(&self, mask: PortMask) -> impl Iterator<Item = &Arc<Port>> {
        self.ports.iter().filter(move |p| mask.contains(p.id))
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

/// The set of ports attached to one bridge.
#[derive(Debug, Default)]
pub struct PortTable {
    current: RwLock<Arc<PortSnapshot>>,
    writer: Mutex<()>,
}

impl PortTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot. Cheap; never blocks on writers for longer than a
    /// pointer swap.
    pub fn snapshot(&self) -> Arc<PortSnapshot> {
        Arc::clone(&*self.current.read())
    }

    fn publish(&self, next: PortSnapshot) {
        *self.current.write() = Arc::new(next);
    }

    /// Attaches a device and assigns it the lowest free port id.
    pub fn add(&self, desc: PortDescriptor) -> Result<PortId> {
        let _guard = self.writer.lock();
        let mut next = (*self.snapshot()).clone();

        if next.by_device(desc.device).is_some() || next.by_name(&desc.name).is_some() {
            return Err(BridgeError::DuplicateDevice(desc.name));
        }
        let id = next
            .valid
            .first_free()
            .ok_or(BridgeError::PortTableFull(MAX_PORTS))?;

        let name = desc.name.clone();
        next.ports.push(Arc::new(Port::from_descriptor(id, desc)));
        next.valid.insert(id);
        self.publish(next);

        audit_log!(AuditRecord::new(AuditCategory::PortLifecycle, "PortTable", "add_port")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(name)
            .with_object_type("bridge_port")
            .with_details(serde_json::json!({ "port_id": id.index() })));

        Ok(id)
    }

    /// Detaches a port. Its id becomes free for the next `add`.
    pub fn remove(&self, id: PortId) -> Result<Arc<Port>> {
        let _guard = self.writer.lock();
        let mut next = (*self.snapshot()).clone();

        let pos = next
            .ports
            .iter()
            .position(|p| p.id == id)
            .ok_or(BridgeError::PortNotFound(id))?;
        let removed = next.ports.remove(pos);
        next.valid.remove(id);
        self.publish(next);

        audit_log!(AuditRecord::new(AuditCategory::PortLifecycle, "PortTable", "remove_port")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(removed.name.clone())
            .with_object_type("bridge_port")
            .with_details(serde_json::json!({ "port_id": id.index() })));

        Ok(removed)
    }

    /// Sets the spanning-tree state. Returns the previous state.
    pub fn set_state(&self, id: PortId, state: PortState) -> Result<PortState> {
        let old = self.modify(id, |port| std::mem::replace(&mut port.state, state))?;
        if old != state {
            audit_log!(AuditRecord::new(AuditCategory::PortConfig, "PortTable", "set_port_state")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(id.to_string())
                .with_object_type("bridge_port")
                .with_details(serde_json::json!({
                    "old_state": old.as_str(),
                    "new_state": state.as_str(),
                })));
        }
        Ok(old)
    }

    /// Replaces the port flags. Returns the previous flags.
    pub fn set_flags(&self, id: PortId, flags: PortFlags) -> Result<PortFlags> {
        let old = self.modify(id, |port| std::mem::replace(&mut port.flags, flags))?;
        if old != flags {
            audit_log!(AuditRecord::new(AuditCategory::PortConfig, "PortTable", "set_port_flags")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(id.to_string())
                .with_object_type("bridge_port")
                .with_details(serde_json::json!({
                    "old_flags": old.bits(),
                    "new_flags": flags.bits(),
                })));
        }
        Ok(old)
    }

    /// Publishes a modified copy of one port.
    pub fn modify<R>(&self, id: PortId, f: impl FnOnce(&mut Port) -> R) -> Result<R> {
        let _guard = self.writer.lock();
        let mut next = (*self.snapshot()).clone();

        let slot = next
            .ports
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(BridgeError::PortNotFound(id))?;
        let mut port = (**slot).clone();
        let result = f(&mut port);
        *slot = Arc::new(port);
        self.publish(next);

        Ok(result)
    }
}
