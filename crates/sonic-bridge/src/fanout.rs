//! FanoutEngine - turns one frame into N deliveries.
//!
//! Eligible ports are visited in candidate order. Each delivery is held
//! back until the next eligible port is found: earlier ports get clones,
//! the last one gets the original buffer. A frame with no eligible port is
//! dropped once, here.

use crate::debug_log;
use crate::filter::DeliveryFilter;
use crate::frame::{Frame, FrameAllocator};
use crate::ports::Port;
use crate::stats::BridgeStats;
use std::sync::Arc;

/// Result of one fanout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutOutcome {
    /// No candidate passed the filter; the frame was released.
    NoEligiblePort,
    /// Every eligible port received a frame.
    Delivered(usize),
    /// A clone failed after `delivered` deliveries; the rest were dropped.
    Aborted { delivered: usize },
}

impl FanoutOutcome {
    pub fn delivered(&self) -> usize {
        match *self {
            FanoutOutcome::NoEligiblePort => 0,
            FanoutOutcome::Delivered(n) => n,
            FanoutOutcome::Aborted { delivered } => delivered,
        }
    }
}

#[derive(Clone)]
pub struct FanoutEngine {
    filter: Arc<dyn DeliveryFilter>,
    allocator: Arc<dyn FrameAllocator>,
    stats: Arc<BridgeStats>,
}

impl std::fmt::Debug for FanoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutEngine").finish_non_exhaustive()
    }
}

impl FanoutEngine {
    pub fn new(
        filter: Arc<dyn DeliveryFilter>,
        allocator: Arc<dyn FrameAllocator>,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self {
            filter,
            allocator,
            stats,
        }
    }

    pub fn filter(&self) -> &dyn DeliveryFilter {
        self.filter.as_ref()
    }

    /// Delivers `frame` to every candidate the filter admits, consuming it.
    pub fn fanout<'p, I, F>(&self, candidates: I, frame: Frame, mut deliver: F) -> FanoutOutcome
    where
        I: IntoIterator<Item = &'p Arc<Port>>,
        F: FnMut(&Port, Frame),
    {
        let mut prev: Option<&Port> = None;
        let mut delivered = 0usize;

        for port in candidates {
            if !self.filter.should_deliver(port, &frame) {
                continue;
            }
            if let Some(target) = prev {
                match self.allocator.try_clone(&frame) {
                    Some(copy) => {
                        deliver(target, copy);
                        delivered += 1;
                    }
                    None => {
                        self.clone_failed(target, delivered);
                        return FanoutOutcome::Aborted { delivered };
                    }
                }
            }
            prev = Some(port.as_ref());
        }

        match prev {
            Some(target) => {
                deliver(target, frame);
                FanoutOutcome::Delivered(delivered + 1)
            }
            None => FanoutOutcome::NoEligiblePort,
        }
    }

    /// Like [`fanout`](Self::fanout) but every delivery is a clone and the
    /// original stays with the caller.
    pub fn fanout_retaining<'p, I, F>(
        &self,
        candidates: I,
        frame: &Frame,
        mut deliver: F,
    ) -> FanoutOutcome
    where
        I: IntoIterator<Item = &'p Arc<Port>>,
        F: FnMut(&Port, Frame),
    {
        let mut delivered = 0usize;
        let mut eligible = false;

        for port in candidates {
            if !self.filter.should_deliver(port, frame) {
                continue;
            }
            eligible = true;
            match self.allocator.try_clone(frame) {
                Some(copy) => {
                    deliver(port.as_ref(), copy);
                    delivered += 1;
                }
                None => {
                    self.clone_failed(port, delivered);
                    return FanoutOutcome::Aborted { delivered };
                }
            }
        }

        if eligible {
            FanoutOutcome::Delivered(delivered)
        } else {
            FanoutOutcome::NoEligiblePort
        }
    }

    fn clone_failed(&self, port: &Port, delivered: usize) {
        BridgeStats::bump(&self.stats.tx_dropped);
        debug_log!(
            "FanoutEngine",
            port = %port.name,
            delivered = delivered,
            "frame clone failed, aborting fanout"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Capabilities, FilterConfig};
    use crate::filter::StandardFilter;
    use crate::frame::{FrameMeta, HeapAllocator};
    use crate::ports::{DeviceHandle, PortDescriptor, PortId, PortState};
    use pretty_assertions::assert_eq;
    use sonic_bridge_types::MacAddress;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Allocator that succeeds `budget` times.
    struct Budget(AtomicUsize);

    impl FrameAllocator for Budget {
        fn try_clone(&self, frame: &Frame) -> Option<Frame> {
            self.0
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .ok()
                .map(|_| frame.shallow_clone())
        }
    }

    fn engine(allocator: Arc<dyn FrameAllocator>) -> (FanoutEngine, Arc<BridgeStats>) {
        let stats = Arc::new(BridgeStats::new());
        let filter = Arc::new(StandardFilter::new(
            Capabilities::empty(),
            &FilterConfig::default(),
        ));
        (FanoutEngine::new(filter, allocator, stats.clone()), stats)
    }

    fn ports(states: &[PortState]) -> Vec<Arc<Port>> {
        states
            .iter()
            .enumerate()
            .map(|(i, state)| {
                Arc::new(Port::from_descriptor(
                    PortId::new(i as u8).unwrap(),
                    PortDescriptor::new(format!("eth{i}"), DeviceHandle(i as u32))
                        .with_state(*state),
                ))
            })
            .collect()
    }

    fn frame() -> Frame {
        Frame::new(
            vec![0u8; 64],
            FrameMeta {
                dst: MacAddress::BROADCAST,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_last_delivery_gets_original() {
        let (engine, _) = engine(Arc::new(HeapAllocator));
        let ports = ports(&[PortState::Forwarding; 4]);
        let mut seen = Vec::new();

        let outcome = engine.fanout(&ports, frame(), |port, f| {
            seen.push((port.name.clone(), f.is_clone()))
        });

        assert_eq!(outcome, FanoutOutcome::Delivered(4));
        assert_eq!(
            seen,
            vec![
                ("eth0".to_string(), true),
                ("eth1".to_string(), true),
                ("eth2".to_string(), true),
                ("eth3".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_skips_filtered_ports() {
        let (engine, _) = engine(Arc::new(HeapAllocator));
        let ports = ports(&[
            PortState::Forwarding,
            PortState::Blocking,
            PortState::Forwarding,
            PortState::Disabled,
        ]);
        let mut seen = Vec::new();

        let outcome = engine.fanout(&ports, frame(), |port, f| {
            seen.push((port.id.index(), f.is_clone()))
        });

        assert_eq!(outcome, FanoutOutcome::Delivered(2));
        assert_eq!(seen, vec![(0, true), (2, false)]);
    }

    #[test]
    fn test_no_eligible_port() {
        let (engine, stats) = engine(Arc::new(HeapAllocator));
        let ports = ports(&[PortState::Blocking, PortState::Learning]);

        let outcome = engine.fanout(&ports, frame(), |_, _| panic!("unexpected delivery"));
        assert_eq!(outcome, FanoutOutcome::NoEligiblePort);
        assert_eq!(stats.snapshot().tx_dropped, 0);
    }

    #[test]
    fn test_clone_failure_aborts() {
        let (engine, stats) = engine(Arc::new(Budget(AtomicUsize::new(1))));
        let ports = ports(&[PortState::Forwarding; 4]);
        let mut seen = Vec::new();

        let outcome = engine.fanout(&ports, frame(), |port, _| seen.push(port.id.index()));

        assert_eq!(outcome, FanoutOutcome::Aborted { delivered: 1 });
        assert_eq!(seen, vec![0]);
        assert_eq!(stats.snapshot().tx_dropped, 1);
    }

    #[test]
    fn test_retaining_clones_every_delivery() {
        let (engine, _) = engine(Arc::new(HeapAllocator));
        let ports = ports(&[PortState::Forwarding, PortState::Forwarding]);
        let original = frame();
        let mut clones = 0;

        let outcome = engine.fanout_retaining(&ports, &original, |_, f| {
            assert!(f.is_clone());
            clones += 1;
        });

        assert_eq!(outcome, FanoutOutcome::Delivered(2));
        assert_eq!(clones, 2);
        assert!(!original.is_clone());
    }

    #[test]
    fn test_same_candidates_same_order() {
        let (engine, _) = engine(Arc::new(HeapAllocator));
        let ports = ports(&[PortState::Forwarding; 6]);

        let mut first = Vec::new();
        engine.fanout(&ports, frame(), |p, _| first.push(p.id));
        let mut second = Vec::new();
        engine.fanout(&ports, frame(), |p, _| second.push(p.id));

        assert_eq!(first, second);
    }
}
