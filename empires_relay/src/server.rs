// TCP listener and the fixed-rate relay loop.
//
// Architecture: one background thread owns the listener and the `Relay`
// slot table and runs a paced loop. Each tick it:
// 1. accepts every pending connection (the listener is non-blocking),
// 2. services the slot sockets with a bounded wait of
//    `service_timeout_ms`,
// 3. calls `Relay::relay(cycle, interval)`, which broadcasts on flush
//    cycles,
// 4. advances `cycle` and sleeps out the rest of `tick_ms`.
//
// Nothing else touches the slot table, so there is no locking. Readers and
// writers never run concurrently on one socket: the loop does all I/O.
//
// Restores: `RelayHandle::push_restore` queues a request on a channel. The
// loop takes queued requests after servicing, writes the frame, blocks for
// the ack (bounded by `restore_timeout_ms`) and sends the outcome back. No
// packets go out while it waits. The receiving client must not send
// snapshots between the frame and its ack, since the next byte read from it
// is taken as the ack.
//
// Shutdown: `RelayHandle::stop` clears `keep_running`; the loop notices at
// the top of the next tick, drops every socket and returns its counters.

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use empires_protocol::{AckError, Color};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::RelayError;
use crate::relay::{Admission, Relay, RelayStats};

/// Configuration for starting a relay server. Every field has a default, so
/// a partial JSON object is a valid config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub host: String,
    /// 0 lets the OS pick a free port.
    pub port: u16,
    /// Flush every `interval` cycles. 0 is treated as 1.
    pub interval: u64,
    /// Target duration of one cycle.
    pub tick_ms: u64,
    /// Bounded wait for slot sockets each cycle.
    pub service_timeout_ms: u64,
    /// A packet write that takes longer frees the slot.
    pub send_timeout_ms: u64,
    /// How long a pushed restore waits for its ack.
    pub restore_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 1111,
            interval: 1,
            tick_ms: 10,
            service_timeout_ms: 5,
            send_timeout_ms: 50,
            restore_timeout_ms: 5000,
        }
    }
}

impl RelayConfig {
    pub fn from_json(json: &str) -> Result<Self, RelayError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A request for the loop thread.
struct RestoreRequest {
    color: Color,
    cycle: u64,
    payload: Vec<u8>,
    reply: Sender<Result<(), RelayError>>,
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    restores: Sender<RestoreRequest>,
    thread: Option<thread::JoinHandle<RelayStats>>,
}

impl RelayHandle {
    /// Send a restore to the client in `color`'s slot and wait until it is
    /// acknowledged. Blocks for up to `restore_timeout_ms` after the frame
    /// is written.
    pub fn push_restore(&self, color: Color, cycle: u64, payload: Vec<u8>) -> Result<(), RelayError> {
        let (reply, outcome) = mpsc::channel();
        self.restores
            .send(RestoreRequest {
                color,
                cycle,
                payload,
                reply,
            })
            .map_err(|_| RelayError::Stopped)?;
        outcome.recv().map_err(|_| RelayError::Stopped)?
    }

    /// Signal the relay to stop, wait for it, and return its counters.
    pub fn stop(self) -> RelayStats {
        self.keep_running.store(false, Ordering::SeqCst);
        self.join()
    }

    /// Wait for the relay thread without asking it to stop.
    pub fn join(mut self) -> RelayStats {
        self.thread
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

/// Bind the listener and start the relay loop on a background thread.
/// Returns a handle for stopping it and the bound address.
pub fn start_relay(config: RelayConfig) -> Result<(RelayHandle, SocketAddr), RelayError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).map_err(|source| RelayError::Bind {
        addr: addr.clone(),
        source,
    })?;
    listener.set_nonblocking(true)?;
    let local = listener.local_addr()?;

    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_loop = keep_running.clone();
    let (restores, restore_queue) = mpsc::channel();
    let thread = thread::Builder::new()
        .name("relay".into())
        .spawn(move || run_relay(listener, config, keep_running_loop, restore_queue))?;

    info!(addr = %local, "relay listening");
    Ok((
        RelayHandle {
            keep_running,
            restores,
            thread: Some(thread),
        },
        local,
    ))
}

fn run_relay(
    listener: TcpListener,
    config: RelayConfig,
    keep_running: Arc<AtomicBool>,
    restore_queue: Receiver<RestoreRequest>,
) -> RelayStats {
    let mut relay = Relay::with_send_timeout(Duration::from_millis(config.send_timeout_ms));
    let restore_timeout = Duration::from_millis(config.restore_timeout_ms);
    let tick = Duration::from_millis(config.tick_ms);
    let service_timeout = Duration::from_millis(config.service_timeout_ms);
    let mut cycle: u64 = 0;

    while keep_running.load(Ordering::SeqCst) {
        let started = Instant::now();

        loop {
            match relay.accept(&listener) {
                Ok(Admission::NoPending) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }

        if let Err(e) = relay.service(service_timeout) {
            warn!(error = %e, "service failed");
        }

        while let Ok(request) = restore_queue.try_recv() {
            handle_restore(&mut relay, request, restore_timeout);
        }
        relay.relay(cycle, config.interval);
        cycle = cycle.wrapping_add(1);

        if let Some(rest) = tick.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }

    let stats = relay.stats();
    info!(cycle, ?stats, "relay stopped");
    stats
}

fn handle_restore(relay: &mut Relay, request: RestoreRequest, timeout: Duration) {
    let RestoreRequest {
        color,
        cycle,
        payload,
        reply,
    } = request;
    let outcome = relay
        .push_restore(color, cycle, &payload)
        .map_err(AckError::Io)
        .and_then(|()| relay.await_restore_ack(color, timeout))
        .map_err(|source| RelayError::Restore { color, source });
    // The caller may have given up waiting; nothing to do then.
    let _ = reply.send(outcome);
}
