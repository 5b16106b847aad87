//! Delivery ownership: one original, clones for everyone else, and every
//! buffer released exactly once.

use pretty_assertions::assert_eq;
use sonic_bridge::{
    Bridge, BridgeConfig, FanoutOutcome, ForwardPath, Frame, FrameMeta, PortState,
};
use sonic_bridge_test::frame_fixtures::broadcast;
use sonic_bridge_test::port_fixtures::ethernet;
use sonic_bridge_test::{host_mac, FlakyAllocator, RecordingTransmit, ReleaseCounter};
use sonic_bridge_types::MacAddress;
use std::sync::Arc;

fn bridge_with_ports(n: u32) -> (Bridge, Arc<RecordingTransmit>) {
    let transmit = Arc::new(RecordingTransmit::new());
    let bridge = Bridge::builder(BridgeConfig::default(), transmit.clone())
        .build()
        .unwrap();
    for dev in 0..n {
        bridge.add_port(ethernet(&format!("eth{dev}"), dev)).unwrap();
    }
    (bridge, transmit)
}

fn counted_broadcast(counter: &ReleaseCounter) -> Frame {
    Frame::new(
        counter.payload(64),
        FrameMeta {
            dst: MacAddress::BROADCAST,
            src: host_mac(1),
            ..Default::default()
        },
    )
}

#[test]
fn test_n_deliveries_use_n_minus_one_clones() {
    for n in 1..=6u32 {
        let (bridge, transmit) = bridge_with_ports(n + 1);
        let ingress = bridge.ports().by_name("eth0").unwrap().id;

        let d = bridge.on_frame_received(ingress, broadcast(1));

        assert_eq!(d.fanout, FanoutOutcome::Delivered(n as usize));
        let deliveries = transmit.deliveries();
        assert_eq!(deliveries.len(), n as usize);
        assert_eq!(transmit.clones(), n as usize - 1);
        // The original goes to the last eligible port in iteration order.
        assert!(!deliveries.last().unwrap().cloned);
        assert_eq!(deliveries.last().unwrap().port, format!("eth{n}"));
    }
}

#[test]
fn test_payload_released_once_after_fanout() {
    let (bridge, transmit) = bridge_with_ports(4);
    let counter = ReleaseCounter::new();

    let ingress = bridge.ports().by_name("eth0").unwrap().id;
    bridge.on_frame_received(ingress, counted_broadcast(&counter));

    assert_eq!(transmit.count(), 3);
    assert_eq!(counter.released(), 1);
}

#[test]
fn test_no_eligible_port_releases_once() {
    let (bridge, transmit) = bridge_with_ports(3);
    let counter = ReleaseCounter::new();
    for name in ["eth1", "eth2"] {
        let id = bridge.ports().by_name(name).unwrap().id;
        bridge.set_port_state(id, PortState::Blocking).unwrap();
    }

    let ingress = bridge.ports().by_name("eth0").unwrap().id;
    let d = bridge.on_frame_received(ingress, counted_broadcast(&counter));

    assert_eq!(d.path, ForwardPath::Broadcast);
    assert_eq!(d.fanout, FanoutOutcome::NoEligiblePort);
    assert_eq!(transmit.count(), 0);
    assert_eq!(counter.released(), 1);
    assert_eq!(bridge.stats().filtered, 1);
}

#[test]
fn test_dropped_at_ingress_releases_once() {
    let (bridge, _transmit) = bridge_with_ports(2);
    let counter = ReleaseCounter::new();
    let ingress = bridge.ports().by_name("eth0").unwrap().id;
    bridge.set_port_state(ingress, PortState::Disabled).unwrap();

    let d = bridge.on_frame_received(ingress, counted_broadcast(&counter));

    assert!(matches!(d.path, ForwardPath::Dropped(_)));
    assert_eq!(counter.released(), 1);
}

#[test]
fn test_clone_failure_aborts_and_releases() {
    let transmit = Arc::new(RecordingTransmit::new());
    let allocator = Arc::new(FlakyAllocator::new(1));
    let bridge = Bridge::builder(BridgeConfig::default(), transmit.clone())
        .allocator(allocator.clone())
        .build()
        .unwrap();
    for dev in 0..5 {
        bridge.add_port(ethernet(&format!("eth{dev}"), dev)).unwrap();
    }
    let counter = ReleaseCounter::new();

    let ingress = bridge.ports().by_name("eth0").unwrap().id;
    let d = bridge.on_frame_received(ingress, counted_broadcast(&counter));

    assert_eq!(d.fanout, FanoutOutcome::Aborted { delivered: 1 });
    assert_eq!(transmit.ports(), vec!["eth1"]);
    assert_eq!(allocator.attempts(), 2);
    assert_eq!(bridge.stats().tx_dropped, 1);
    assert_eq!(counter.released(), 1);
}

#[test]
fn test_local_delivery_keeps_original() {
    let transmit = Arc::new(RecordingTransmit::new());
    let config = BridgeConfig {
        local_delivery: true,
        ..Default::default()
    };
    let bridge = Bridge::builder(config, transmit.clone()).build().unwrap();
    for dev in 0..3 {
        bridge.add_port(ethernet(&format!("eth{dev}"), dev)).unwrap();
    }
    let counter = ReleaseCounter::new();

    let ingress = bridge.ports().by_name("eth0").unwrap().id;
    let d = bridge.on_frame_received(ingress, counted_broadcast(&counter));

    assert_eq!(d.delivered(), 2);
    assert_eq!(transmit.clones(), 2);
    let local = d.local.expect("bridge device copy");
    assert!(!local.is_clone());
    assert_eq!(counter.released(), 0);
    drop(local);
    assert_eq!(counter.released(), 1);
}
