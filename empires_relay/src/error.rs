// Error types for the relay server and the client transport.
//
// `RelayError` covers starting the server and restores pushed through a
// `RelayHandle`. Once it runs, per-socket failures are not errors at all:
// they free the slot and the loop carries on.
//
// `TransportError` is everything a client can hit. Callers decide how fatal
// each one is. Anything before the seat is read means there is no session
// to degrade into, so game clients exit on it.

use std::io;

use empires_protocol::{AckError, Color, ProtocolError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("bad relay config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("restore to {color} failed: {source}")]
    Restore {
        color: Color,
        #[source]
        source: AckError,
    },

    #[error("relay is not running")]
    Stopped,

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("{host} resolved to no addresses")]
    NoAddress { host: String },

    #[error("cannot connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("server full: connection closed before a seat was assigned")]
    ServerFull,

    #[error("connection closed by peer")]
    Closed,

    #[error("resync failed: expected ack {expected:#04x}, got {got:#04x}")]
    ResyncFailed { expected: u8, got: u8 },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
