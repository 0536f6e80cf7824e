// Client side of the relay connection.
//
// `Transport` is one blocking TCP stream to the relay plus a small inbox
// buffer. The protocol is lockstep, so there is no reader thread: a game
// client sends its snapshot and then waits for (or polls for) the next
// packet on its own loop.
//
// Connection setup:
// - The host name is resolved inside a process-wide lock. The lock covers
//   only the resolve call; connecting and all later I/O happen outside it.
// - After connecting, the client reads its 4-byte seat record. EOF instead
//   of a seat means every slot was taken (`TransportError::ServerFull`).
//
// Stream alignment: packets are fixed size and unframed, so a read that
// stops mid-packet must not lose bytes. `poll_packet` keeps partial bytes in
// `inbox` across calls and every other reader drains `inbox` first.
//
// Restore handshake: `recv_restore` reads one restore frame, the caller
// applies it, then `send_restore_ack` answers with the ack byte. Packets
// that arrive ahead of the frame are superseded by it and skipped. The
// opposite direction uses `await_restore_ack`, which turns a wrong byte
// into `TransportError::ResyncFailed` instead of aborting.

use std::io::{self, Cursor, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use empires_protocol::{
    AckError, Color, PACKET_SIZE, Packet, RESTORE_TAG, RestoreFrame, SEAT_SIZE, Seat, Snapshot,
    read_ack, read_restore, write_ack, write_restore,
};
use tracing::{debug, info};

use crate::error::TransportError;

/// Serializes calls into the platform resolver.
static RESOLVER: Mutex<()> = Mutex::new(());

/// How long `connect` waits for the seat record.
const SEAT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Transport {
    stream: TcpStream,
    color: Color,
    inbox: Vec<u8>,
}

fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, TransportError> {
    let _guard = RESOLVER.lock().unwrap_or_else(PoisonError::into_inner);
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            host: host.into(),
            source,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(TransportError::NoAddress { host: host.into() });
    }
    Ok(addrs)
}

impl Transport {
    /// Resolve, connect and read the seat record.
    pub fn connect(host: &str, port: u16) -> Result<Self, TransportError> {
        let addrs = resolve(host, port)?;
        let stream = TcpStream::connect(&addrs[..]).map_err(|source| TransportError::Connect {
            host: host.into(),
            port,
            source,
        })?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(SEAT_TIMEOUT))?;

        let mut record = [0u8; SEAT_SIZE];
        match (&stream).read_exact(&mut record) {
            Ok(()) => {}
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset
                ) =>
            {
                return Err(TransportError::ServerFull);
            }
            Err(e) => return Err(e.into()),
        }
        let seat = Seat::decode(&record)?;
        stream.set_read_timeout(None)?;

        info!(color = %seat.color, %host, port, "seated");
        Ok(Self {
            stream,
            color: seat.color,
            inbox: Vec::with_capacity(PACKET_SIZE),
        })
    }

    /// The slot the relay bound this connection to.
    pub fn color(&self) -> Color {
        self.color
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    pub fn send_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), TransportError> {
        self.stream.write_all(&snapshot.encode())?;
        Ok(())
    }

    /// Block until the next packet has arrived.
    pub fn recv_packet(&mut self) -> Result<Packet, TransportError> {
        self.stream.set_read_timeout(None)?;
        loop {
            if let Some(packet) = self.take_packet()? {
                return Ok(packet);
            }
            self.fill()?;
        }
    }

    /// Wait up to `timeout` for the next packet. Partial bytes stay
    /// buffered for the next call.
    pub fn poll_packet(&mut self, timeout: Duration) -> Result<Option<Packet>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(packet) = self.take_packet()? {
                return Ok(Some(packet));
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(None);
            }
            self.stream
                .set_read_timeout(Some(left.max(Duration::from_millis(1))))?;
            match self.fill() {
                Ok(()) => {}
                Err(TransportError::Io(e))
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn take_packet(&mut self) -> Result<Option<Packet>, TransportError> {
        if self.inbox.len() < PACKET_SIZE {
            return Ok(None);
        }
        let packet = Packet::decode(&self.inbox[..PACKET_SIZE])?;
        self.inbox.drain(..PACKET_SIZE);
        Ok(Some(packet))
    }

    /// One read into the inbox, up to the end of the current packet.
    fn fill(&mut self) -> Result<(), TransportError> {
        let mut buf = [0u8; PACKET_SIZE];
        let want = PACKET_SIZE - self.inbox.len() % PACKET_SIZE;
        loop {
            match self.stream.read(&mut buf[..want]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => {
                    self.inbox.extend_from_slice(&buf[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Block until a restore frame arrives.
    pub fn recv_restore(&mut self) -> Result<RestoreFrame, TransportError> {
        self.stream.set_read_timeout(None)?;
        loop {
            if self.inbox.is_empty() {
                self.fill()?;
            }
            if self.inbox.first() == Some(&RESTORE_TAG) {
                break;
            }
            while self.inbox.len() < PACKET_SIZE {
                self.fill()?;
            }
            if let Some(skipped) = self.take_packet()? {
                debug!(cycle = skipped.cycle, "packet skipped ahead of restore");
            }
        }
        let buffered = Cursor::new(std::mem::take(&mut self.inbox));
        let mut reader = buffered.chain(&self.stream);
        let frame = read_restore(&mut reader);
        let (buffered, _) = reader.into_inner();
        let used = buffered.position() as usize;
        self.inbox = buffered.into_inner().split_off(used);
        let frame = frame?;
        debug!(cycle = frame.cycle, bytes = frame.payload.len(), "restore received");
        Ok(frame)
    }

    /// Tell the sender the restore has been applied.
    pub fn send_restore_ack(&mut self) -> Result<(), TransportError> {
        write_ack(&mut self.stream)?;
        Ok(())
    }

    /// Send a restore frame to the peer.
    pub fn send_restore(&mut self, cycle: u64, payload: &[u8]) -> Result<(), TransportError> {
        write_restore(&mut self.stream, cycle, payload)?;
        Ok(())
    }

    /// Block until the peer acknowledges a restore.
    pub fn await_restore_ack(&mut self) -> Result<(), TransportError> {
        self.stream.set_read_timeout(None)?;
        let buffered = Cursor::new(std::mem::take(&mut self.inbox));
        let mut reader = buffered.chain(&self.stream);
        let result = read_ack(&mut reader);
        let (buffered, _) = reader.into_inner();
        let used = buffered.position() as usize;
        self.inbox = buffered.into_inner().split_off(used);
        match result {
            Ok(()) => Ok(()),
            Err(AckError::Mismatch { expected, got }) => {
                Err(TransportError::ResyncFailed { expected, got })
            }
            Err(AckError::Io(e)) => Err(e.into()),
        }
    }

    /// Close the connection. The relay frees the slot on its next service.
    pub fn disconnect(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        info!(color = %self.color, "disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use empires_protocol::{InputFlags, Point, RESTORE_ACK};
    use std::net::TcpListener;
    use std::thread;

    /// Fake relay: accepts one client, seats it as `color`, hands back the
    /// server side of the stream.
    fn fake_relay(color: Color) -> (u16, thread::JoinHandle<TcpStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(&Seat { color }.encode()).unwrap();
            stream
        });
        (port, handle)
    }

    #[test]
    fn connect_reads_seat() {
        let (port, server) = fake_relay(Color::Cyan);
        let transport = Transport::connect("127.0.0.1", port).unwrap();
        assert_eq!(transport.color(), Color::Cyan);
        server.join().unwrap();
    }

    #[test]
    fn closed_before_seat_is_server_full() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || drop(listener.accept().unwrap()));
        assert!(matches!(
            Transport::connect("127.0.0.1", port),
            Err(TransportError::ServerFull)
        ));
        server.join().unwrap();
    }

    #[test]
    fn refused_connection_is_a_connect_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(matches!(
            Transport::connect("127.0.0.1", port),
            Err(TransportError::Connect { .. })
        ));
    }

    #[test]
    fn snapshot_reaches_the_relay() {
        let (port, server) = fake_relay(Color::Blue);
        let mut transport = Transport::connect("127.0.0.1", port).unwrap();
        let mut server = server.join().unwrap();
        let snapshot = Snapshot {
            cursor: Point::new(3, 4),
            flags: InputFlags::MOUSE_RU,
            ..Snapshot::EMPTY
        };
        transport.send_snapshot(&snapshot).unwrap();
        let mut buf = [0u8; empires_protocol::SNAPSHOT_SIZE];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(Snapshot::decode(&buf).unwrap(), snapshot);
    }

    #[test]
    fn poll_keeps_partial_packets() {
        let (port, server) = fake_relay(Color::Blue);
        let mut transport = Transport::connect("127.0.0.1", port).unwrap();
        let mut server = server.join().unwrap();

        let packet = Packet {
            cycle: 12,
            ..Packet::default()
        };
        let bytes = packet.encode();
        server.write_all(&bytes[..100]).unwrap();
        assert_eq!(transport.poll_packet(Duration::from_millis(50)).unwrap(), None);
        server.write_all(&bytes[100..]).unwrap();
        assert_eq!(
            transport.poll_packet(Duration::from_secs(5)).unwrap(),
            Some(packet)
        );
        assert_eq!(transport.poll_packet(Duration::from_millis(10)).unwrap(), None);
    }

    #[test]
    fn recv_packet_after_partial_poll() {
        let (port, server) = fake_relay(Color::Blue);
        let mut transport = Transport::connect("127.0.0.1", port).unwrap();
        let mut server = server.join().unwrap();
        let first = Packet {
            cycle: 1,
            ..Packet::default()
        };
        let second = Packet {
            cycle: 2,
            ..Packet::default()
        };
        let first_bytes = first.encode();
        server.write_all(&first_bytes[..7]).unwrap();
        assert_eq!(transport.poll_packet(Duration::from_millis(30)).unwrap(), None);
        server.write_all(&first_bytes[7..]).unwrap();
        server.write_all(&second.encode()).unwrap();
        assert_eq!(transport.recv_packet().unwrap(), first);
        assert_eq!(transport.recv_packet().unwrap(), second);
    }

    #[test]
    fn closed_stream_is_reported() {
        let (port, server) = fake_relay(Color::Blue);
        let mut transport = Transport::connect("127.0.0.1", port).unwrap();
        drop(server.join().unwrap());
        assert!(matches!(transport.recv_packet(), Err(TransportError::Closed)));
    }

    #[test]
    fn restore_then_ack() {
        let (port, server) = fake_relay(Color::Red);
        let mut transport = Transport::connect("127.0.0.1", port).unwrap();
        let mut server = server.join().unwrap();
        write_restore(&mut server, 77, b"state").unwrap();
        let follow = Packet {
            cycle: 78,
            ..Packet::default()
        };
        server.write_all(&follow.encode()).unwrap();

        let frame = transport.recv_restore().unwrap();
        assert_eq!(frame.cycle, 77);
        assert_eq!(frame.payload, b"state");
        transport.send_restore_ack().unwrap();

        let mut ack = [0u8; 1];
        server.read_exact(&mut ack).unwrap();
        assert_eq!(ack[0], RESTORE_ACK);
        assert_eq!(transport.recv_packet().unwrap(), follow);
    }

    #[test]
    fn packets_ahead_of_a_restore_are_skipped() {
        let (port, server) = fake_relay(Color::Blue);
        let mut transport = Transport::connect("127.0.0.1", port).unwrap();
        let mut server = server.join().unwrap();
        for cycle in 1..=3 {
            let stale = Packet {
                cycle,
                ..Packet::default()
            };
            server.write_all(&stale.encode()).unwrap();
        }
        write_restore(&mut server, 500, b"fresh").unwrap();
        let follow = Packet {
            cycle: 4,
            ..Packet::default()
        };
        server.write_all(&follow.encode()).unwrap();

        let first = transport.poll_packet(Duration::from_secs(5)).unwrap();
        assert_eq!(first.map(|p| p.cycle), Some(1));
        let frame = transport.recv_restore().unwrap();
        assert_eq!(frame.cycle, 500);
        assert_eq!(frame.payload, b"fresh");
        assert_eq!(transport.recv_packet().unwrap(), follow);
    }

    #[test]
    fn bad_ack_is_resync_failure() {
        let (port, server) = fake_relay(Color::Red);
        let mut transport = Transport::connect("127.0.0.1", port).unwrap();
        let mut server = server.join().unwrap();
        server.write_all(&[0x13]).unwrap();
        match transport.await_restore_ack() {
            Err(TransportError::ResyncFailed { expected, got }) => {
                assert_eq!(expected, RESTORE_ACK);
                assert_eq!(got, 0x13);
            }
            other => panic!("expected resync failure, got {other:?}"),
        }
    }

    #[test]
    fn good_ack_is_accepted() {
        let (port, server) = fake_relay(Color::Red);
        let mut transport = Transport::connect("127.0.0.1", port).unwrap();
        let mut server = server.join().unwrap();
        write_ack(&mut server).unwrap();
        transport.await_restore_ack().unwrap();
    }
}
