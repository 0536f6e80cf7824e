// Readiness polling over the relay's slot sockets.
//
// `readable` waits up to `timeout` for any of the given streams to have
// something to read, and reports which ones do. "Something to read" includes
// EOF and socket errors: the caller's read will then fail and free the slot,
// which is exactly what should happen.
//
// On unix this is one `poll(2)` call. Elsewhere it falls back to a
// non-blocking one-byte peek on every stream, retried once after sleeping
// the timeout if nothing was ready.

use std::io;
use std::net::TcpStream;
use std::time::Duration;

#[cfg(unix)]
pub fn readable(streams: &[&TcpStream], timeout: Duration) -> io::Result<Vec<bool>> {
    use std::os::unix::io::AsRawFd;

    if streams.is_empty() {
        return Ok(Vec::new());
    }
    let mut fds: Vec<libc::pollfd> = streams
        .iter()
        .map(|s| libc::pollfd {
            fd: s.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();
    let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

    // SAFETY: `fds` is a valid, exclusively borrowed array of `fds.len()`
    // pollfd structs for the whole call, and every fd belongs to a live
    // `TcpStream` borrowed by `streams`.
    let n = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, millis) };
    if n < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(vec![false; streams.len()]);
        }
        return Err(err);
    }
    let ready = libc::POLLIN | libc::POLLHUP | libc::POLLERR;
    Ok(fds.iter().map(|fd| fd.revents & ready != 0).collect())
}

#[cfg(not(unix))]
pub fn readable(streams: &[&TcpStream], timeout: Duration) -> io::Result<Vec<bool>> {
    let ready = peek_all(streams)?;
    if ready.iter().any(|r| *r) || streams.is_empty() {
        return Ok(ready);
    }
    std::thread::sleep(timeout);
    peek_all(streams)
}

#[cfg(not(unix))]
fn peek_all(streams: &[&TcpStream]) -> io::Result<Vec<bool>> {
    let mut out = Vec::with_capacity(streams.len());
    let mut probe = [0u8; 1];
    for stream in streams {
        stream.set_nonblocking(true)?;
        let ready = match stream.peek(&mut probe) {
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
            Err(_) => true,
        };
        stream.set_nonblocking(false)?;
        out.push(ready);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn quiet_streams_are_not_ready() {
        let (_client, server) = tcp_pair();
        let ready = readable(&[&server], Duration::from_millis(10)).unwrap();
        assert_eq!(ready, vec![false]);
    }

    #[test]
    fn data_and_eof_are_ready() {
        let (mut a_client, a_server) = tcp_pair();
        let (b_client, b_server) = tcp_pair();
        let (_c_client, c_server) = tcp_pair();
        a_client.write_all(b"x").unwrap();
        drop(b_client);
        std::thread::sleep(Duration::from_millis(20));
        let ready = readable(&[&a_server, &b_server, &c_server], Duration::from_millis(100)).unwrap();
        assert_eq!(ready, vec![true, true, false]);
    }

    #[test]
    fn no_streams_returns_immediately() {
        assert!(readable(&[], Duration::from_secs(5)).unwrap().is_empty());
    }
}
