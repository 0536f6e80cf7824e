// empires_protocol — wire protocol for the lockstep input relay.
//
// This crate defines the byte-level formats exchanged between game clients
// and the relay (`empires_relay`). It is shared by both sides and by the sim
// (`empires_sim`), which interprets decoded snapshots as player commands.
//
// Module overview:
// - `types.rs`:    `Color` (player slot) and the integer `Point`.
// - `snapshot.rs`: `InputFlags`, `Snapshot` and `Packet` with their
//                  fixed-width little-endian encodings.
// - `seat.rs`:     Seat record the relay sends on accept.
// - `restore.rs`:  Length-prefixed restore frame and the ack byte.
// - `error.rs`:    `ProtocolError`.
//
// Design decisions:
// - **Explicit layout.** Every field is encoded with `to_le_bytes`, never by
//   reinterpreting a struct in memory, so the format is identical on every
//   platform.
// - **Fixed sizes.** Snapshots and packets have compile-time sizes; the relay
//   reads exactly `SNAPSHOT_SIZE` bytes per snapshot and there is no framing.
//   Only restores are length-prefixed.
// - **No async runtime.** Everything is built on `std::io::Read`/`Write`.

pub mod error;
pub mod restore;
pub mod seat;
pub mod snapshot;
pub mod types;

pub use error::ProtocolError;
pub use restore::{
    AckError, MAX_RESTORE_SIZE, RESTORE_ACK, RESTORE_TAG, RestoreFrame, read_ack, read_restore, write_ack,
    write_restore,
};
pub use seat::{SEAT_SIZE, Seat};
pub use snapshot::{
    InputFlags, PACKET_HEADER_SIZE, PACKET_SIZE, PROTOCOL_VERSION, Packet, SNAPSHOT_SIZE, Snapshot,
};
pub use types::{COLOR_COUNT, Color, Point};
