// Test-only game client for multiplayer integration tests.
//
// Wraps the real `Transport` (from `empires_relay::client`) and a real
// `Units` (from `empires_sim::units`) to provide a synchronous,
// test-friendly API for exercising the full lockstep pipeline:
// snapshot → relay → packet → units.step() → checksum.
//
// The only test-specific code here is the blocking helpers and the shared
// starting population. All networking and sim logic uses the same code
// paths as a real game client.
//
// See also: `tests/full_pipeline.rs` for the integration test scenarios.

use std::net::SocketAddr;
use std::time::Duration;

use empires_protocol::{Color, InputFlags, Packet, Point, Snapshot};
use empires_relay::Transport;
use empires_sim::{Grid, SimConfig, UnitKind, Units};

/// Default timeout for blocking waits.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on packets read while waiting for a specific one.
const MAX_PACKETS: usize = 5000;

pub const PAN: Point = Point::new(0, 0);
pub const RESOLUTION: Point = Point::new(800, 600);

/// Unit cap for test sims.
pub const MAX_UNITS: usize = 256;

/// A 32x32 map, small enough to stay on one 800x600 screen at pan 0.
pub fn test_grid() -> Grid {
    Grid::new(32, 64, 32)
}

pub fn new_units(cpu_count: usize) -> Units {
    Units::new(test_grid(), SimConfig::default(), MAX_UNITS, cpu_count)
}

/// The starting population every test client agrees on: a few units per
/// side for the first two seats.
pub fn populate(units: &mut Units) {
    for (i, kind) in UnitKind::ALL.into_iter().enumerate() {
        let offset = i as i32;
        units.spawn(Color::Blue, kind, Point::new(2 + offset, 2));
        units.spawn(Color::Red, kind, Point::new(20 + offset, 20));
    }
}

/// Screen-space input aimed at the center of `cell`.
pub fn input_at(cell: Point, flags: InputFlags) -> Snapshot {
    let grid = test_grid();
    let cursor = grid.cart_to_screen(grid.cell_to_cart(cell), PAN, RESOLUTION);
    Snapshot {
        cursor,
        selection_a: cursor,
        selection_b: cursor,
        pan: PAN,
        resolution: RESOLUTION,
        flags,
        ..Snapshot::EMPTY
    }
}

/// A test game client wrapping a real Transport and Units.
pub struct TestGameClient {
    transport: Transport,
    pub units: Units,
    /// `(packet cycle, checksum after stepping it)` for every stepped packet.
    pub history: Vec<(u64, u64)>,
}

impl TestGameClient {
    /// Connect to a relay and set up the shared starting population.
    pub fn connect(addr: SocketAddr, cpu_count: usize) -> Self {
        let mut client = Self::connect_empty(addr, cpu_count);
        populate(&mut client.units);
        client
    }

    /// Connect with no units, for clients that expect a restore.
    pub fn connect_empty(addr: SocketAddr, cpu_count: usize) -> Self {
        let transport = Transport::connect(&addr.ip().to_string(), addr.port())
            .expect("TestGameClient::connect failed");
        Self {
            transport,
            units: new_units(cpu_count),
            history: Vec::new(),
        }
    }

    pub fn color(&self) -> Color {
        self.transport.color()
    }

    /// Left click on `cell`: selects one of our units standing there.
    pub fn send_click(&mut self, cell: Point) {
        self.send(&input_at(cell, InputFlags::MOUSE_LU));
    }

    /// Right click on `cell`: orders the selection there.
    pub fn send_order(&mut self, cell: Point) {
        self.send(&input_at(cell, InputFlags::MOUSE_RU));
    }

    /// Mouse held with no button release. Never a command.
    pub fn send_motion(&mut self, cell: Point) {
        self.send(&input_at(cell, InputFlags::MOUSE_L | InputFlags::KEY_W));
    }

    pub fn send(&mut self, snapshot: &Snapshot) {
        self.transport
            .send_snapshot(snapshot)
            .expect("send_snapshot failed");
    }

    /// Blocking read of the next packet, without stepping it.
    pub fn next_packet(&mut self) -> Packet {
        self.transport
            .poll_packet(POLL_TIMEOUT)
            .expect("poll_packet failed")
            .expect("timed out waiting for a packet")
    }

    /// Read the next packet and step the sim with it.
    pub fn step_next(&mut self) -> Packet {
        let packet = self.next_packet();
        let checksum = self.units.step(&packet);
        self.history.push((packet.cycle, checksum));
        packet
    }

    /// Discard packets before `cycle`, then step the one stamped `cycle`.
    /// Used to line up a client that joined earlier than its peer.
    pub fn sync_to(&mut self, cycle: u64) {
        for _ in 0..MAX_PACKETS {
            let packet = self.next_packet();
            if packet.cycle < cycle {
                continue;
            }
            assert_eq!(packet.cycle, cycle, "skipped past cycle {cycle}");
            let checksum = self.units.step(&packet);
            self.history.push((packet.cycle, checksum));
            return;
        }
        panic!("never reached cycle {cycle}");
    }

    /// Step packets until one carries a command from `color`. Returns it.
    pub fn step_until_command(&mut self, color: Color) -> Packet {
        for _ in 0..MAX_PACKETS {
            let packet = self.step_next();
            if !packet.get(color).is_empty() {
                return packet;
            }
        }
        panic!("no command from {color}");
    }

    /// Step packets up to and including the one stamped `cycle`.
    pub fn step_through(&mut self, cycle: u64) {
        for _ in 0..MAX_PACKETS {
            if self.history.last().is_some_and(|&(c, _)| c >= cycle) {
                return;
            }
            self.step_next();
        }
        panic!("never reached cycle {cycle}");
    }

    /// Receive a restore, apply it and acknowledge. Returns the restore's
    /// cycle.
    pub fn accept_restore(&mut self) -> u64 {
        let frame = self
            .transport
            .recv_restore()
            .expect("recv_restore failed");
        self.units
            .apply_restore_bytes(&frame.payload)
            .expect("apply_restore failed");
        self.transport
            .send_restore_ack()
            .expect("send_restore_ack failed");
        frame.cycle
    }

    pub fn last_checksum(&self) -> Option<u64> {
        self.history.last().map(|&(_, checksum)| checksum)
    }

    pub fn disconnect(self) {
        self.transport.disconnect();
    }
}
