// Integration smoke test for the relay server.
//
// Starts a relay on localhost and drives it with real `Transport` clients:
// seating, command filtering, identical broadcasts, disconnects and the
// full-server refusal. No simulation involved.

use std::time::Duration;

use empires_protocol::{Color, InputFlags, Packet, Point, Snapshot};
use empires_relay::{RelayConfig, Transport, TransportError, start_relay};

fn config() -> RelayConfig {
    RelayConfig {
        port: 0,
        tick_ms: 5,
        service_timeout_ms: 2,
        ..RelayConfig::default()
    }
}

fn input(flags: InputFlags) -> Snapshot {
    Snapshot {
        cursor: Point::new(400, 300),
        resolution: Point::new(800, 600),
        flags,
        ..Snapshot::EMPTY
    }
}

/// Read packets until one carries a snapshot for `color`.
fn wait_for_command(transport: &mut Transport, color: Color) -> Packet {
    for _ in 0..2000 {
        if let Some(packet) = transport.poll_packet(Duration::from_millis(50)).unwrap()
            && !packet.get(color).is_empty()
        {
            return packet;
        }
    }
    panic!("no packet with a {color} command");
}

/// Read packets until the one stamped `cycle`.
fn wait_for_cycle(transport: &mut Transport, cycle: u64) -> Packet {
    for _ in 0..2000 {
        let packet = transport.recv_packet().unwrap();
        if packet.cycle == cycle {
            return packet;
        }
        assert!(packet.cycle < cycle, "skipped past cycle {cycle}");
    }
    panic!("never saw cycle {cycle}");
}

#[test]
fn commands_are_fanned_out_and_motion_is_dropped() {
    let (handle, addr) = start_relay(config()).unwrap();

    let mut a = Transport::connect("127.0.0.1", addr.port()).unwrap();
    let mut b = Transport::connect("127.0.0.1", addr.port()).unwrap();
    assert_eq!(a.color(), Color::Blue);
    assert_eq!(b.color(), Color::Red);

    let order = input(InputFlags::MOUSE_RU);
    a.send_snapshot(&order).unwrap();
    b.send_snapshot(&input(InputFlags::MOUSE_L)).unwrap();

    let seen_a = wait_for_command(&mut a, Color::Blue);
    assert_eq!(*seen_a.get(Color::Blue), order);
    assert!(seen_a.get(Color::Red).is_empty());

    let seen_b = wait_for_cycle(&mut b, seen_a.cycle);
    assert_eq!(seen_b, seen_a);

    // Delivered once, not repeated in later windows.
    let next = a.recv_packet().unwrap();
    assert!(next.cycle > seen_a.cycle);
    assert!(next.get(Color::Blue).is_empty());

    a.disconnect();
    b.disconnect();
    let stats = handle.stop();
    assert_eq!(stats.seated, 2);
    assert_eq!(stats.relayed_snapshots, 1);
    assert_eq!(stats.filtered_snapshots, 1);
}

#[test]
fn disconnected_slot_is_freed_and_reused() {
    let (handle, addr) = start_relay(config()).unwrap();

    let mut a = Transport::connect("127.0.0.1", addr.port()).unwrap();
    let b = Transport::connect("127.0.0.1", addr.port()).unwrap();
    assert_eq!(b.color(), Color::Red);
    b.disconnect();

    // Give the relay a few dozen cycles to notice.
    for _ in 0..40 {
        a.recv_packet().unwrap();
    }
    let c = Transport::connect("127.0.0.1", addr.port()).unwrap();
    assert_eq!(c.color(), Color::Red);

    c.disconnect();
    a.disconnect();
    let stats = handle.stop();
    assert!(stats.disconnects >= 1);
}

#[test]
fn ninth_client_is_refused() {
    let (handle, addr) = start_relay(config()).unwrap();

    let seated: Vec<Transport> = (0..8)
        .map(|_| Transport::connect("127.0.0.1", addr.port()).unwrap())
        .collect();
    let colors: Vec<Color> = seated.iter().map(Transport::color).collect();
    assert_eq!(colors, Color::ALL.to_vec());

    assert!(matches!(
        Transport::connect("127.0.0.1", addr.port()),
        Err(TransportError::ServerFull)
    ));

    drop(seated);
    let stats = handle.stop();
    assert_eq!(stats.dropped_connections, 1);
}

#[test]
fn handle_pushes_restore_to_a_running_client() {
    let (handle, addr) = start_relay(config()).unwrap();
    let mut client = Transport::connect("127.0.0.1", addr.port()).unwrap();
    // Let a few broadcasts queue up ahead of the restore.
    client.recv_packet().unwrap();

    let peer = std::thread::spawn(move || {
        let frame = client.recv_restore().unwrap();
        client.send_restore_ack().unwrap();
        let after = client.recv_packet().unwrap();
        (frame, after, client)
    });
    handle
        .push_restore(Color::Blue, 321, b"{\"units\":[]}".to_vec())
        .unwrap();

    let (frame, after, client) = peer.join().unwrap();
    assert_eq!(frame.cycle, 321);
    assert_eq!(frame.payload, b"{\"units\":[]}");
    assert!(after.is_empty());

    client.disconnect();
    handle.stop();
}

#[test]
fn unresolvable_host_is_an_error() {
    assert!(matches!(
        Transport::connect("no-such-host.invalid", 1111),
        Err(TransportError::Resolve { .. })
    ));
}
