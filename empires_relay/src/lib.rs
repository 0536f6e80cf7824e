// empires_relay — lockstep input relay and its client transport.
//
// The relay is a thin fan-out: clients send one input snapshot per tick,
// the relay keeps only command snapshots (mouse button releases), and at
// every flush cycle sends the same packet of all slots' snapshots to every
// connected client. It never runs the simulation; clients do, in lockstep,
// from the packets. Restores cross the relay as opaque bytes.
//
// Module overview:
// - `relay.rs`:  `Relay`, the color slot table with accept / service /
//                relay and the server side of the restore handshake. The
//                core data structure that `server.rs` drives.
// - `server.rs`: `RelayConfig`, `start_relay` and the paced loop thread.
// - `client.rs`: `Transport`, the client side of the connection.
// - `poll.rs`:   Readiness wait over slot sockets (`poll(2)` on unix).
// - `error.rs`:  `RelayError`, `TransportError`.
//
// Dependencies: `empires_protocol` for every byte on the wire. No
// dependency on the sim crate.
//
// The relay runs as a standalone binary (`main.rs`) or embedded in a host
// process through `start_relay`.

pub mod client;
pub mod error;
pub mod poll;
pub mod relay;
pub mod server;

pub use client::Transport;
pub use error::{RelayError, TransportError};
pub use relay::{Admission, Relay, RelayStats};
pub use server::{RelayConfig, RelayHandle, start_relay};
