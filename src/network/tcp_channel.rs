use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{ArenaError, ArenaResult};
use crate::network::codec::{decode_message, encode_message};
use crate::network::messages::Message;
use crate::report_violation;
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::{Channel, ChannelEvent, EndpointId, Transport};

pub use crate::network::codec::MAX_FRAME_LEN;

/// Length prefix in front of every frame, little-endian `u32`.
const FRAME_HEADER_LEN: usize = 4;
const READ_CHUNK_SIZE: usize = 4096;
/// How long [`TcpTransport::dial`](Transport::dial) waits unless overridden.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// A [`Transport`] over plain TCP. The endpoint identifier is the listening socket address.
///
/// Listening and accepting never block. Dialing blocks the calling thread for up to the
/// connect timeout ([`DEFAULT_CONNECT_TIMEOUT`] unless set with
/// [`with_connect_timeout`](Self::with_connect_timeout)), and so does
/// [`MatchContext::join_match`](crate::MatchContext::join_match) over this transport.
#[derive(Debug)]
pub struct TcpTransport {
    bind_addr: SocketAddr,
    connect_timeout: Duration,
    listener: Option<TcpListener>,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::bind_to(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
    }
}

impl TcpTransport {
    /// A transport that listens on an ephemeral loopback port.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that listens on `addr` unless a preferred endpoint is given.
    #[must_use]
    pub fn bind_to(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            listener: None,
        }
    }

    /// Overrides how long [`Transport::dial`] waits for the connection.
    ///
    /// A zero timeout is raised to one millisecond, since the socket layer rejects zero.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// The longest [`Transport::dial`] blocks.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    fn local_endpoint(listener: &TcpListener) -> ArenaResult<EndpointId> {
        Ok(EndpointId::new(listener.local_addr()?.to_string()))
    }
}

fn parse_endpoint(id: &EndpointId) -> ArenaResult<SocketAddr> {
    id.as_str()
        .parse()
        .map_err(|e| ArenaError::PeerUnavailable {
            endpoint: format!("{id} ({e})"),
        })
}

impl Transport for TcpTransport {
    fn listen(&mut self, preferred: Option<&EndpointId>) -> ArenaResult<EndpointId> {
        if let Some(listener) = &self.listener {
            return Self::local_endpoint(listener);
        }
        let addr = match preferred {
            Some(id) => parse_endpoint(id)?,
            None => self.bind_addr,
        };
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let id = Self::local_endpoint(&listener)?;
        debug!("tcp transport listening on {id}");
        self.listener = Some(listener);
        Ok(id)
    }

    fn dial(&mut self, remote: &EndpointId) -> ArenaResult<Box<dyn Channel>> {
        let addr = parse_endpoint(remote)?;
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|e| {
            debug!("dial {remote} failed: {e}");
            ArenaError::PeerUnavailable {
                endpoint: remote.to_string(),
            }
        })?;
        Ok(Box::new(TcpChannel::from_stream(stream)?))
    }

    fn accept(&mut self) -> Option<Box<dyn Channel>> {
        let listener = self.listener.as_ref()?;
        match listener.accept() {
            Ok((stream, peer)) => match TcpChannel::from_stream(stream) {
                Ok(channel) => {
                    debug!("accepted tcp connection from {peer}");
                    Some(Box::new(channel))
                },
                Err(e) => {
                    report_violation!(
                        ViolationSeverity::Warning,
                        ViolationKind::Channel,
                        "could not configure accepted stream from {}: {}",
                        peer,
                        e
                    );
                    None
                },
            },
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => None,
            Err(e) => {
                report_violation!(
                    ViolationSeverity::Warning,
                    ViolationKind::Channel,
                    "accept failed: {:?}: {}",
                    e.kind(),
                    e
                );
                None
            },
        }
    }

    fn stop_listening(&mut self) {
        if self.listener.take().is_some() {
            debug!("tcp transport stopped listening");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    Closed,
    Failed,
}

/// A [`Channel`] over a non-blocking TCP stream with length-prefixed frames.
///
/// # Performance
///
/// Outgoing bytes that the socket cannot take right away stay in a write buffer and are
/// flushed on the next [`send`](Channel::send) or [`receive_all`](Channel::receive_all).
#[derive(Debug)]
pub struct TcpChannel {
    stream: TcpStream,
    read_buffer: Vec<u8>,
    write_buffer: Vec<u8>,
    state: StreamState,
    unreported_failure: Option<String>,
}

impl TcpChannel {
    /// Wraps a connected stream and switches it to non-blocking mode.
    pub fn from_stream(stream: TcpStream) -> ArenaResult<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            read_buffer: Vec::with_capacity(READ_CHUNK_SIZE),
            write_buffer: Vec::new(),
            state: StreamState::Open,
            unreported_failure: None,
        })
    }

    fn flush(&mut self) -> std::io::Result<()> {
        while !self.write_buffer.is_empty() {
            match self.stream.write(&self.write_buffer) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.write_buffer.drain(..n);
                },
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn fail(&mut self, context: String, events: &mut Vec<ChannelEvent>) {
        report_violation!(
            ViolationSeverity::Warning,
            ViolationKind::Channel,
            "tcp channel failed: {}",
            context
        );
        self.state = StreamState::Failed;
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        events.push(ChannelEvent::Errored(context));
    }

    /// Reads whatever is available. Returns `Ok(true)` on end of stream.
    fn fill_read_buffer(&mut self) -> std::io::Result<bool> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(true),
                Ok(n) => self.read_buffer.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Splits complete frames off the read buffer.
    fn parse_frames(&mut self, events: &mut Vec<ChannelEvent>) -> Result<(), String> {
        loop {
            let Some(header) = self.read_buffer.get(..FRAME_HEADER_LEN) else {
                return Ok(());
            };
            let mut len_bytes = [0u8; FRAME_HEADER_LEN];
            len_bytes.copy_from_slice(header);
            let len = u32::from_le_bytes(len_bytes) as usize;
            if len > MAX_FRAME_LEN {
                return Err(format!(
                    "frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}"
                ));
            }
            let end = FRAME_HEADER_LEN + len;
            let Some(body) = self.read_buffer.get(FRAME_HEADER_LEN..end) else {
                return Ok(());
            };
            let msg = decode_message(body).map_err(|e| e.to_string())?;
            trace!("tcp channel received {}", msg.body.kind());
            events.push(ChannelEvent::Message(msg));
            self.read_buffer.drain(..end);
        }
    }
}

impl Channel for TcpChannel {
    fn send(&mut self, msg: &Message) -> ArenaResult<()> {
        if self.state != StreamState::Open {
            return Err(ArenaError::ChannelNotOpen);
        }
        let body = encode_message(msg)?;
        if body.len() > MAX_FRAME_LEN {
            return Err(ArenaError::SerializationError {
                context: format!(
                    "{} of {} bytes exceeds frame limit of {MAX_FRAME_LEN}",
                    msg.body.kind(),
                    body.len()
                ),
            });
        }
        self.write_buffer
            .extend_from_slice(&(body.len() as u32).to_le_bytes());
        self.write_buffer.extend_from_slice(&body);
        if let Err(e) = self.flush() {
            self.state = StreamState::Failed;
            self.unreported_failure = Some(format!("write failed: {e}"));
            return Err(e.into());
        }
        Ok(())
    }

    fn receive_all(&mut self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        if let Some(context) = self.unreported_failure.take() {
            events.push(ChannelEvent::Errored(context));
            return events;
        }
        if self.state != StreamState::Open {
            return events;
        }
        if let Err(e) = self.flush() {
            self.fail(format!("write failed: {e}"), &mut events);
            return events;
        }
        let eof = match self.fill_read_buffer() {
            Ok(eof) => eof,
            Err(e) => {
                // Frames that arrived before the failure are still delivered.
                if let Err(context) = self.parse_frames(&mut events) {
                    self.fail(context, &mut events);
                    return events;
                }
                self.fail(format!("read failed: {e}"), &mut events);
                return events;
            },
        };
        if let Err(context) = self.parse_frames(&mut events) {
            self.fail(context, &mut events);
            return events;
        }
        if eof {
            debug!("tcp peer closed the stream");
            self.state = StreamState::Closed;
            events.push(ChannelEvent::Closed);
        }
        events
    }

    fn close(&mut self) {
        if self.state == StreamState::Open {
            let _ = self.flush();
            let _ = self.stream.shutdown(std::net::Shutdown::Both);
            self.state = StreamState::Closed;
        }
    }

    fn is_open(&self) -> bool {
        self.state == StreamState::Open
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn parse_endpoint_rejects_garbage() {
        let err = parse_endpoint(&EndpointId::from("not-an-address")).unwrap_err();
        assert!(matches!(err, ArenaError::PeerUnavailable { .. }));
    }

    #[test]
    fn dial_blocks_for_at_most_a_couple_of_seconds_by_default() {
        let transport = TcpTransport::new();
        assert_eq!(transport.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert!(DEFAULT_CONNECT_TIMEOUT <= Duration::from_secs(2));
    }

    #[test]
    fn zero_connect_timeout_is_raised() {
        let transport = TcpTransport::new().with_connect_timeout(Duration::ZERO);
        assert_eq!(transport.connect_timeout(), Duration::from_millis(1));
    }

    #[test]
    fn accept_without_listener_is_none() {
        let mut transport = TcpTransport::new();
        assert!(transport.accept().is_none());
    }

    #[test]
    fn listen_reports_bound_address() {
        let mut transport = TcpTransport::new();
        let id = transport.listen(None).unwrap();
        let addr: SocketAddr = id.as_str().parse().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
        assert_eq!(transport.listen(None).unwrap(), id);
    }
}
