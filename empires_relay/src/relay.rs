// Player slot table and the per-tick accept / service / relay cycle.
//
// `Relay` is the central data structure that `server.rs` drives. It owns one
// optional socket per color slot and the packet being accumulated for the
// next broadcast. All mutation happens from the server's single loop thread;
// there is no internal locking.
//
// Per tick the loop calls, in order:
// - `accept`: binds each pending connection to the first free slot and
//   writes its seat record. With no free slot the connection is dropped,
//   counted and logged.
// - `service`: waits (bounded) for slot sockets to become readable and
//   reads exactly one snapshot from each ready one. A zero-length, short or
//   failed read frees the slot. Only command snapshots (a mouse button
//   release) are kept; anything else is read to keep the stream aligned and
//   then discarded.
// - `relay`: on flush cycles (`cycle % interval == 0`) logs the occupancy
//   heartbeat, sends the packet to every occupied slot, and starts a fresh
//   accumulation window. A failed send is only logged; the next `service`
//   notices the dead socket and frees its slot. Slot streams carry a write
//   timeout, so a peer that stays connected but stops reading cannot block
//   the loop. A timed-out send may have written part of a packet, which
//   leaves that peer's stream unaligned, so its slot is freed at once.
//
// Restores bypass the tick cycle: `push_restore` writes a restore frame to
// one slot and `await_restore_ack` blocks for that slot's single ack byte.
// The threaded server reaches these through `RelayHandle::push_restore`.
//
// Writing to client streams: the relay writes unbuffered with `write_all`.
// Snapshots and packets are small fixed-size records and every write is a
// complete record.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use empires_protocol::{
    AckError, COLOR_COUNT, Color, Packet, SNAPSHOT_SIZE, Seat, Snapshot, read_ack, write_restore,
};
use tracing::{debug, info, warn};

use crate::poll;

/// Floor for socket read timeouts (zero means "no timeout" to the OS).
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Default bound on one packet write to a slot.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(50);

/// Outcome of offering one connection to the slot table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Seated(Color),
    /// Every slot was taken; the connection was closed.
    ServerFull,
    /// The listener had no pending connection.
    NoPending,
}

/// Counters for events that are otherwise only visible in the log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub seated: u64,
    pub dropped_connections: u64,
    pub disconnects: u64,
    pub relayed_snapshots: u64,
    pub filtered_snapshots: u64,
    pub broadcasts: u64,
    pub failed_sends: u64,
}

struct Slot {
    stream: TcpStream,
    peer: Option<SocketAddr>,
}

pub struct Relay {
    slots: [Option<Slot>; COLOR_COUNT],
    packet: Packet,
    stats: RelayStats,
    send_timeout: Duration,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    pub fn new() -> Self {
        Self::with_send_timeout(DEFAULT_SEND_TIMEOUT)
    }

    /// A relay whose packet writes give up after `send_timeout`.
    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            packet: Packet::default(),
            stats: RelayStats::default(),
            send_timeout: send_timeout.max(MIN_READ_TIMEOUT),
        }
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// The packet accumulated since the last flush.
    pub fn pending(&self) -> &Packet {
        &self.packet
    }

    pub fn is_occupied(&self, color: Color) -> bool {
        self.slots[color.index()].is_some()
    }

    pub fn occupancy(&self) -> [bool; COLOR_COUNT] {
        std::array::from_fn(|i| self.slots[i].is_some())
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// One digit per slot, `1` for occupied.
    pub fn heartbeat(&self) -> String {
        self.occupancy()
            .iter()
            .map(|o| if *o { "1" } else { "0" })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Take one pending connection from a non-blocking listener.
    pub fn accept(&mut self, listener: &TcpListener) -> io::Result<Admission> {
        match listener.accept() {
            Ok((stream, peer)) => self.admit(stream, Some(peer)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Admission::NoPending),
            Err(e) => Err(e),
        }
    }

    /// Bind an accepted stream to the first free slot and send its seat.
    pub fn admit(&mut self, stream: TcpStream, peer: Option<SocketAddr>) -> io::Result<Admission> {
        let Some(index) = self.slots.iter().position(Option::is_none) else {
            self.stats.dropped_connections += 1;
            warn!(?peer, "server full, dropping connection");
            return Ok(Admission::ServerFull);
        };
        let color = Color::ALL[index];

        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(self.send_timeout))?;
        (&stream).write_all(&Seat { color }.encode())?;

        self.slots[index] = Some(Slot { stream, peer });
        self.stats.seated += 1;
        info!(%color, ?peer, "client seated");
        Ok(Admission::Seated(color))
    }

    /// Free a slot. Does nothing if it is already empty.
    pub fn drop_slot(&mut self, color: Color, reason: &str) {
        if let Some(slot) = self.slots[color.index()].take() {
            self.stats.disconnects += 1;
            info!(%color, peer = ?slot.peer, reason, "client disconnected");
        }
    }

    /// Read at most one snapshot from every ready slot, waiting up to
    /// `timeout` for any to become ready. Returns how many slots were read.
    pub fn service(&mut self, timeout: Duration) -> io::Result<usize> {
        let occupied: Vec<usize> = (0..COLOR_COUNT).filter(|&i| self.slots[i].is_some()).collect();
        if occupied.is_empty() {
            return Ok(0);
        }
        let ready = {
            let streams: Vec<&TcpStream> = occupied
                .iter()
                .filter_map(|&i| self.slots[i].as_ref().map(|s| &s.stream))
                .collect();
            poll::readable(&streams, timeout)?
        };

        let mut serviced = 0;
        for (&i, _) in occupied.iter().zip(ready).filter(|(_, r)| *r) {
            self.read_slot(Color::ALL[i], timeout);
            serviced += 1;
        }
        Ok(serviced)
    }

    fn read_slot(&mut self, color: Color, timeout: Duration) {
        let Some(slot) = self.slots[color.index()].as_mut() else {
            return;
        };
        let mut buf = [0u8; SNAPSHOT_SIZE];
        let got = slot
            .stream
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))
            .and_then(|()| read_full(&mut slot.stream, &mut buf));
        match got {
            Ok(0) => self.drop_slot(color, "closed"),
            Ok(n) if n < SNAPSHOT_SIZE => self.drop_slot(color, "short read"),
            Ok(_) => match Snapshot::decode(&buf) {
                Ok(snapshot) if snapshot.is_command() => {
                    self.packet.set(color, snapshot);
                    self.stats.relayed_snapshots += 1;
                }
                Ok(snapshot) => {
                    self.stats.filtered_snapshots += 1;
                    debug!(%color, flags = snapshot.flags.0, "filtered non-command snapshot");
                }
                Err(_) => self.drop_slot(color, "undecodable snapshot"),
            },
            Err(e) => {
                debug!(%color, error = %e, "read failed");
                self.drop_slot(color, "read error");
            }
        }
    }

    /// Flush the accumulated packet if `cycle` is a flush cycle. Returns the
    /// packet that was sent.
    pub fn relay(&mut self, cycle: u64, interval: u64) -> Option<Packet> {
        if cycle % interval.max(1) != 0 {
            return None;
        }
        info!(cycle, slots = %self.heartbeat(), "relay");
        self.packet.cycle = cycle;
        let bytes = self.packet.encode();
        let mut stalled = Vec::new();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let Some(slot) = slot else { continue };
            if let Err(e) = slot.stream.write_all(&bytes) {
                self.stats.failed_sends += 1;
                warn!(color = %Color::ALL[i], error = %e, "send failed");
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) {
                    stalled.push(Color::ALL[i]);
                }
            }
        }
        for color in stalled {
            self.drop_slot(color, "send timed out");
        }
        self.stats.broadcasts += 1;
        Some(std::mem::take(&mut self.packet))
    }

    /// Send a restore frame to one slot.
    pub fn push_restore(&mut self, color: Color, cycle: u64, payload: &[u8]) -> io::Result<()> {
        let slot = self.slots[color.index()]
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, format!("slot {color} is empty")))?;
        // A restore can be megabytes; the peer gets as long as it needs.
        slot.stream.set_write_timeout(None)?;
        let sent = write_restore(&mut slot.stream, cycle, payload);
        slot.stream.set_write_timeout(Some(self.send_timeout))?;
        sent?;
        info!(%color, cycle, bytes = payload.len(), "restore sent");
        Ok(())
    }

    /// Block until the slot acknowledges a restore, or `timeout` passes.
    pub fn await_restore_ack(&mut self, color: Color, timeout: Duration) -> Result<(), AckError> {
        let slot = self.slots[color.index()].as_mut().ok_or_else(|| {
            AckError::Io(io::Error::new(io::ErrorKind::NotConnected, format!("slot {color} is empty")))
        })?;
        slot.stream.set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;
        match read_ack(&mut slot.stream) {
            Ok(()) => {
                info!(%color, "restore acknowledged");
                Ok(())
            }
            Err(e) => {
                warn!(%color, error = %e, "restore not acknowledged");
                Err(e)
            }
        }
    }
}

/// Read until `buf` is full, EOF, or the read times out. Returns the byte
/// count, which is short on EOF or timeout.
fn read_full(stream: &mut TcpStream, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e)
                if filled > 0
                    && matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
