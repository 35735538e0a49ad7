//! Blocking byte-stream transport with a non-blocking readiness poll
//! (spec.md §4.2).

use std::io::{self, Read, Write};
use std::net::TcpStream;

use crate::error::Error;

/// A bytewise bidirectional transport to a connected peer.
///
/// Modeled on the teacher's `Comm` trait: a short read is retried until the
/// requested count is satisfied; a zero-byte read means the peer hung up; a
/// negative-length condition (signalled by the underlying `Read` returning
/// an error) is a connection error. One peer is served at a time; a new
/// accept is not attempted until this one disconnects (spec.md §4.2, §5).
pub trait Transport {
    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<(), Error>;
    fn send_all(&mut self, buf: &[u8]) -> Result<(), Error>;
    /// Non-blocking peek: true if at least one byte is available to read
    /// without blocking.
    fn has_data(&mut self) -> Result<bool, Error>;
}

/// `Transport` over a connected `TcpStream` (spec.md §6's TCP transport).
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(TcpTransport { stream })
    }
}

impl Transport for TcpTransport {
    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        let mut read = 0;
        while read < buf.len() {
            match self.stream.read(&mut buf[read..]) {
                Ok(0) => return Err(Error::ConnectionClosed),
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::ConnectionError(e)),
            }
        }
        Ok(())
    }

    fn send_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut written = 0;
        while written < buf.len() {
            match self.stream.write(&buf[written..]) {
                Ok(0) => return Err(Error::ConnectionClosed),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::ConnectionError(e)),
            }
        }
        Ok(())
    }

    fn has_data(&mut self) -> Result<bool, Error> {
        let mut peek = [0u8; 1];
        match self.stream.peek(&mut peek) {
            Ok(n) => Ok(n > 0),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(Error::ConnectionError(e)),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;

    /// An in-memory `Transport` double, used by core/breakpoint tests that
    /// don't need a real socket.
    pub struct MemTransport {
        pub inbox: VecDeque<u8>,
        pub outbox: Vec<u8>,
        pub closed: bool,
    }

    impl MemTransport {
        pub fn new(inbox: Vec<u8>) -> Self {
            MemTransport {
                inbox: inbox.into(),
                outbox: Vec::new(),
                closed: false,
            }
        }
    }

    impl Transport for MemTransport {
        fn recv_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
            if self.inbox.len() < buf.len() {
                return Err(Error::ConnectionClosed);
            }
            for b in buf.iter_mut() {
                *b = self.inbox.pop_front().unwrap();
            }
            Ok(())
        }

        fn send_all(&mut self, buf: &[u8]) -> Result<(), Error> {
            self.outbox.extend_from_slice(buf);
            Ok(())
        }

        fn has_data(&mut self) -> Result<bool, Error> {
            Ok(!self.inbox.is_empty())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MemTransport;
    use super::*;

    #[test]
    fn recv_exact_reads_requested_length() {
        let mut t = MemTransport::new(vec![1, 2, 3, 4]);
        let mut buf = [0u8; 4];
        t.recv_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn recv_exact_on_short_input_is_connection_closed() {
        let mut t = MemTransport::new(vec![1, 2]);
        let mut buf = [0u8; 4];
        assert!(matches!(t.recv_exact(&mut buf), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn has_data_reflects_inbox_state() {
        let mut t = MemTransport::new(vec![1]);
        assert!(t.has_data().unwrap());
        let mut buf = [0u8; 1];
        t.recv_exact(&mut buf).unwrap();
        assert!(!t.has_data().unwrap());
    }
}
