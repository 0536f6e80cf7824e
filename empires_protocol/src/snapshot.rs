// Per-tick input records and their fixed-width wire encoding.
//
// A client sends one `Snapshot` per tick: where the cursor is, how the
// camera is panned, which keys and buttons are held or just changed, and its
// own last checksum (`parity`). The relay folds the snapshots of all slots
// into a `Packet` and broadcasts it on every flush boundary.
//
// Wire layout is explicit: every field is fixed-width little-endian, in the
// order listed below. Snapshots travel with no header (the relay reads
// exactly `SNAPSHOT_SIZE` bytes per snapshot). Packets carry a 12-byte
// header so a receiver can reject foreign or mismatched streams:
//
//   magic "OE" (2) | version (1) | slot count (1) | cycle (u64 LE)
//   then COLOR_COUNT snapshots in slot order.
//
// See also: `seat.rs` for the accept-time seat record, `restore.rs` for the
// variable-size restore frame.

use crate::error::ProtocolError;
use crate::types::{COLOR_COUNT, Color, Point};

/// Current protocol version, shared by packets, seats and restore frames.
pub const PROTOCOL_VERSION: u8 = 1;

/// Encoded size of one snapshot.
pub const SNAPSHOT_SIZE: usize = 60;

/// Packet header size.
pub const PACKET_HEADER_SIZE: usize = 12;

/// Encoded size of one packet.
pub const PACKET_SIZE: usize = PACKET_HEADER_SIZE + COLOR_COUNT * SNAPSHOT_SIZE;

const PACKET_MAGIC: u16 = u16::from_le_bytes(*b"OE");

/// Boolean input state for one tick, as a bit set.
///
/// `*_D` / `*_U` bits are edges (pressed / released this tick); `MOUSE_L` and
/// `MOUSE_R` are the held state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct InputFlags(pub u32);

impl InputFlags {
    pub const MOUSE_L: InputFlags = InputFlags(1 << 0);
    pub const MOUSE_R: InputFlags = InputFlags(1 << 1);
    pub const MOUSE_LD: InputFlags = InputFlags(1 << 2);
    pub const MOUSE_LU: InputFlags = InputFlags(1 << 3);
    pub const MOUSE_RD: InputFlags = InputFlags(1 << 4);
    pub const MOUSE_RU: InputFlags = InputFlags(1 << 5);
    pub const KEY_W: InputFlags = InputFlags(1 << 6);
    pub const KEY_A: InputFlags = InputFlags(1 << 7);
    pub const KEY_S: InputFlags = InputFlags(1 << 8);
    pub const KEY_D: InputFlags = InputFlags(1 << 9);
    pub const KEY_Q: InputFlags = InputFlags(1 << 10);
    pub const KEY_E: InputFlags = InputFlags(1 << 11);
    pub const KEY_R: InputFlags = InputFlags(1 << 12);
    pub const KEY_T: InputFlags = InputFlags(1 << 13);
    pub const KEY_F: InputFlags = InputFlags(1 << 14);
    pub const KEY_G: InputFlags = InputFlags(1 << 15);
    pub const KEY_Z: InputFlags = InputFlags(1 << 16);
    pub const KEY_X: InputFlags = InputFlags(1 << 17);
    pub const KEY_C: InputFlags = InputFlags(1 << 18);
    pub const KEY_V: InputFlags = InputFlags(1 << 19);
    pub const KEY_B: InputFlags = InputFlags(1 << 20);
    pub const KEY_1: InputFlags = InputFlags(1 << 21);
    pub const KEY_2: InputFlags = InputFlags(1 << 22);
    pub const KEY_3: InputFlags = InputFlags(1 << 23);
    pub const LEFT_SHIFT: InputFlags = InputFlags(1 << 24);
    pub const LEFT_ALT: InputFlags = InputFlags(1 << 25);
    pub const TAB: InputFlags = InputFlags(1 << 26);

    pub const NONE: InputFlags = InputFlags(0);

    pub const fn contains(self, other: InputFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: InputFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: InputFlags) -> InputFlags {
        InputFlags(self.0 | other.0)
    }

    /// True when a mouse button was released this tick. Only these
    /// snapshots count as issued commands and survive the relay filter.
    pub const fn is_command(self) -> bool {
        self.intersects(InputFlags(Self::MOUSE_LU.0 | Self::MOUSE_RU.0))
    }
}

impl std::ops::BitOr for InputFlags {
    type Output = InputFlags;
    fn bitor(self, rhs: InputFlags) -> InputFlags {
        self.union(rhs)
    }
}

/// One player's input for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Cursor position in screen pixels.
    pub cursor: Point,
    /// Drag-selection corners in screen pixels (`a` = where the drag began).
    pub selection_a: Point,
    pub selection_b: Point,
    /// Camera pan in iso pixels.
    pub pan: Point,
    /// Screen resolution, used to undo the centering of the camera.
    pub resolution: Point,
    pub flags: InputFlags,
    /// Sender's most recent checksum.
    pub parity: u64,
    /// Sender's tick counter when the snapshot was taken.
    pub cycle: u64,
}

impl Snapshot {
    /// The all-zero snapshot ("nothing happened in this slot").
    pub const EMPTY: Snapshot = Snapshot {
        cursor: Point::ZERO,
        selection_a: Point::ZERO,
        selection_b: Point::ZERO,
        pan: Point::ZERO,
        resolution: Point::ZERO,
        flags: InputFlags::NONE,
        parity: 0,
        cycle: 0,
    };

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    pub fn is_command(&self) -> bool {
        self.flags.is_command()
    }

    pub fn encode(&self) -> [u8; SNAPSHOT_SIZE] {
        let mut w = WireWriter::<SNAPSHOT_SIZE>::new();
        w.point(self.cursor);
        w.point(self.selection_a);
        w.point(self.selection_b);
        w.point(self.pan);
        w.point(self.resolution);
        w.u32(self.flags.0);
        w.u64(self.parity);
        w.u64(self.cycle);
        w.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < SNAPSHOT_SIZE {
            return Err(ProtocolError::Truncated {
                what: "snapshot",
                got: bytes.len(),
                need: SNAPSHOT_SIZE,
            });
        }
        let mut r = WireReader::new(&bytes[..SNAPSHOT_SIZE]);
        Ok(Self {
            cursor: r.point(),
            selection_a: r.point(),
            selection_b: r.point(),
            pan: r.point(),
            resolution: r.point(),
            flags: InputFlags(r.u32()),
            parity: r.u64(),
            cycle: r.u64(),
        })
    }
}

/// The per-tick aggregate: one snapshot per slot, all slots present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Relay cycle at which this packet was flushed.
    pub cycle: u64,
    pub snapshots: [Snapshot; COLOR_COUNT],
}

impl Default for Packet {
    fn default() -> Self {
        Self {
            cycle: 0,
            snapshots: [Snapshot::EMPTY; COLOR_COUNT],
        }
    }
}

impl Packet {
    pub fn get(&self, color: Color) -> &Snapshot {
        &self.snapshots[color.index()]
    }

    pub fn set(&mut self, color: Color, snapshot: Snapshot) {
        self.snapshots[color.index()] = snapshot;
    }

    /// Zero every slot. The cycle stamp is left alone.
    pub fn clear(&mut self) {
        self.snapshots = [Snapshot::EMPTY; COLOR_COUNT];
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.iter().all(Snapshot::is_empty)
    }

    /// Occupied (non-empty) slots in slot order.
    pub fn commands(&self) -> impl Iterator<Item = (Color, &Snapshot)> {
        Color::ALL
            .iter()
            .zip(self.snapshots.iter())
            .filter(|(_, s)| !s.is_empty())
            .map(|(c, s)| (*c, s))
    }

    pub fn encode(&self) -> [u8; PACKET_SIZE] {
        let mut out = [0u8; PACKET_SIZE];
        out[0..2].copy_from_slice(&PACKET_MAGIC.to_le_bytes());
        out[2] = PROTOCOL_VERSION;
        out[3] = COLOR_COUNT as u8;
        out[4..12].copy_from_slice(&self.cycle.to_le_bytes());
        for (i, snapshot) in self.snapshots.iter().enumerate() {
            let start = PACKET_HEADER_SIZE + i * SNAPSHOT_SIZE;
            out[start..start + SNAPSHOT_SIZE].copy_from_slice(&snapshot.encode());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < PACKET_SIZE {
            return Err(ProtocolError::Truncated {
                what: "packet",
                got: bytes.len(),
                need: PACKET_SIZE,
            });
        }
        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        if magic != PACKET_MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }
        if bytes[2] != PROTOCOL_VERSION {
            return Err(ProtocolError::Version(bytes[2]));
        }
        if usize::from(bytes[3]) != COLOR_COUNT {
            return Err(ProtocolError::SlotCount {
                got: bytes[3],
                expected: COLOR_COUNT as u8,
            });
        }
        let mut cycle = [0u8; 8];
        cycle.copy_from_slice(&bytes[4..12]);

        let mut packet = Packet {
            cycle: u64::from_le_bytes(cycle),
            ..Packet::default()
        };
        for (i, slot) in packet.snapshots.iter_mut().enumerate() {
            let start = PACKET_HEADER_SIZE + i * SNAPSHOT_SIZE;
            *slot = Snapshot::decode(&bytes[start..start + SNAPSHOT_SIZE])?;
        }
        Ok(packet)
    }
}

/// Sequential little-endian writer into a fixed buffer.
struct WireWriter<const N: usize> {
    buf: [u8; N],
    pos: usize,
}

impl<const N: usize> WireWriter<N> {
    fn new() -> Self {
        Self {
            buf: [0u8; N],
            pos: 0,
        }
    }

    fn bytes(&mut self, b: &[u8]) {
        self.buf[self.pos..self.pos + b.len()].copy_from_slice(b);
        self.pos += b.len();
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.bytes(&v.to_le_bytes());
    }

    fn point(&mut self, p: Point) {
        self.bytes(&p.x.to_le_bytes());
        self.bytes(&p.y.to_le_bytes());
    }

    fn finish(self) -> [u8; N] {
        debug_assert_eq!(self.pos, N, "wire layout does not fill its buffer");
        self.buf
    }
}

/// Sequential little-endian reader. Callers check the length up front.
struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn point(&mut self) -> Point {
        let x = self.i32();
        let y = self.i32();
        Point::new(x, y)
    }
}
