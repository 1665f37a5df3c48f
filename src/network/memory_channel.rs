//! In-process [`Transport`] for tests, demos and same-device play.
//!
//! A [`MemoryHub`] plays the part of the signaling service: transports created from the same
//! hub can find each other by [`EndpointId`]. Messages still go through the wire codec so a
//! pairing behaves like one over a real socket.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{ArenaError, ArenaResult};
use crate::network::codec::{decode_message, encode_message};
use crate::network::messages::Message;
use crate::report_violation;
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::{Channel, ChannelEvent, EndpointId, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Dialer,
    Acceptor,
}

#[derive(Debug, Default)]
struct Pipe {
    to_dialer: VecDeque<Vec<u8>>,
    to_acceptor: VecDeque<Vec<u8>>,
    closed: bool,
    failure: Option<String>,
}

impl Pipe {
    fn inbox(&mut self, end: End) -> &mut VecDeque<Vec<u8>> {
        match end {
            End::Dialer => &mut self.to_dialer,
            End::Acceptor => &mut self.to_acceptor,
        }
    }
}

#[derive(Debug, Default)]
struct HubInner {
    listeners: BTreeMap<EndpointId, VecDeque<MemoryChannel>>,
    next_room: u32,
    links: Vec<Weak<Mutex<Pipe>>>,
}

/// Rendezvous point for [`MemoryTransport`]s. Cloning shares the hub.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport registered with this hub.
    #[must_use]
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            hub: self.clone(),
            listening: None,
        }
    }

    /// Number of endpoints currently listening.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// Fails every live channel. Both ends observe [`ChannelEvent::Errored`] with `reason`.
    pub fn sever_all(&self, reason: &str) {
        let mut inner = self.inner.lock();
        inner.links.retain(|link| {
            let Some(pipe) = link.upgrade() else {
                return false;
            };
            let mut pipe = pipe.lock();
            if !pipe.closed && pipe.failure.is_none() {
                pipe.failure = Some(reason.to_owned());
            }
            true
        });
        debug!("severed {} memory channels: {reason}", inner.links.len());
    }
}

/// A [`Transport`] whose channels live in process memory.
#[derive(Debug)]
pub struct MemoryTransport {
    hub: MemoryHub,
    listening: Option<EndpointId>,
}

impl MemoryTransport {
    /// The identifier this transport listens on, if any.
    #[must_use]
    pub fn listening_on(&self) -> Option<&EndpointId> {
        self.listening.as_ref()
    }
}

impl Transport for MemoryTransport {
    fn listen(&mut self, preferred: Option<&EndpointId>) -> ArenaResult<EndpointId> {
        if let Some(id) = &self.listening {
            return Ok(id.clone());
        }
        let mut inner = self.hub.inner.lock();
        let id = match preferred {
            Some(id) => id.clone(),
            None => loop {
                inner.next_room = inner.next_room.wrapping_add(1);
                let candidate = EndpointId::new(format!("room-{:04}", inner.next_room));
                if !inner.listeners.contains_key(&candidate) {
                    break candidate;
                }
            },
        };
        if inner.listeners.contains_key(&id) {
            return Err(ArenaError::SocketError {
                context: format!("endpoint {id} is already in use"),
            });
        }
        inner.listeners.insert(id.clone(), VecDeque::new());
        self.listening = Some(id.clone());
        debug!("memory transport listening on {id}");
        Ok(id)
    }

    fn dial(&mut self, remote: &EndpointId) -> ArenaResult<Box<dyn Channel>> {
        let mut inner = self.hub.inner.lock();
        let HubInner {
            listeners, links, ..
        } = &mut *inner;
        let Some(pending) = listeners.get_mut(remote) else {
            return Err(ArenaError::PeerUnavailable {
                endpoint: remote.to_string(),
            });
        };

        let pipe = Arc::new(Mutex::new(Pipe::default()));
        links.retain(|link| link.strong_count() > 0);
        links.push(Arc::downgrade(&pipe));
        pending.push_back(MemoryChannel::new(pipe.clone(), End::Acceptor));
        debug!("dialed memory endpoint {remote}");
        Ok(Box::new(MemoryChannel::new(pipe, End::Dialer)))
    }

    fn accept(&mut self) -> Option<Box<dyn Channel>> {
        let id = self.listening.as_ref()?;
        let mut inner = self.hub.inner.lock();
        let channel = inner.listeners.get_mut(id)?.pop_front()?;
        Some(Box::new(channel))
    }

    fn stop_listening(&mut self) {
        if let Some(id) = self.listening.take() {
            // Unaccepted channels are dropped here and close on the dialer's side.
            let pending = self.hub.inner.lock().listeners.remove(&id);
            drop(pending);
            debug!("memory transport stopped listening on {id}");
        }
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.stop_listening();
    }
}

/// One end of an in-memory channel.
#[derive(Debug)]
pub struct MemoryChannel {
    pipe: Arc<Mutex<Pipe>>,
    end: End,
    closed_here: bool,
    failed_here: bool,
    end_reported: bool,
}

impl MemoryChannel {
    fn new(pipe: Arc<Mutex<Pipe>>, end: End) -> Self {
        Self {
            pipe,
            end,
            closed_here: false,
            failed_here: false,
            end_reported: false,
        }
    }

    fn peer(&self) -> End {
        match self.end {
            End::Dialer => End::Acceptor,
            End::Acceptor => End::Dialer,
        }
    }
}

impl Channel for MemoryChannel {
    fn send(&mut self, msg: &Message) -> ArenaResult<()> {
        if !self.is_open() {
            return Err(ArenaError::ChannelNotOpen);
        }
        let frame = encode_message(msg)?;
        trace!("memory channel sending {} bytes", frame.len());
        let peer = self.peer();
        self.pipe.lock().inbox(peer).push_back(frame);
        Ok(())
    }

    fn receive_all(&mut self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        if self.closed_here || self.end_reported {
            return events;
        }

        let mut pipe = self.pipe.lock();
        while let Some(frame) = pipe.inbox(self.end).pop_front() {
            match decode_message(&frame) {
                Ok(msg) => events.push(ChannelEvent::Message(msg)),
                Err(e) => {
                    report_violation!(
                        ViolationSeverity::Error,
                        ViolationKind::Channel,
                        "undecodable memory frame: {}",
                        e
                    );
                    pipe.failure = Some(e.to_string());
                    break;
                },
            }
        }

        if let Some(reason) = &pipe.failure {
            events.push(ChannelEvent::Errored(reason.clone()));
            self.failed_here = true;
            self.end_reported = true;
        } else if pipe.closed {
            events.push(ChannelEvent::Closed);
            self.end_reported = true;
        }
        events
    }

    fn close(&mut self) {
        if self.closed_here {
            return;
        }
        self.closed_here = true;
        self.pipe.lock().closed = true;
    }

    fn is_open(&self) -> bool {
        if self.closed_here || self.failed_here {
            return false;
        }
        let pipe = self.pipe.lock();
        !pipe.closed && pipe.failure.is_none()
    }
}

impl Drop for MemoryChannel {
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
    use crate::{Action, RoundId};

    fn pair(hub: &MemoryHub) -> (MemoryTransport, Box<dyn Channel>, Box<dyn Channel>) {
        let mut host = hub.transport();
        let mut guest = hub.transport();
        let id = host.listen(None).unwrap();
        let dialer = guest.dial(&id).unwrap();
        let acceptor = host.accept().unwrap();
        (host, dialer, acceptor)
    }

    #[test]
    fn generated_ids_are_room_numbers() {
        let hub = MemoryHub::new();
        let mut a = hub.transport();
        let mut b = hub.transport();
        assert_eq!(a.listen(None).unwrap().as_str(), "room-0001");
        assert_eq!(b.listen(None).unwrap().as_str(), "room-0002");
        assert_eq!(hub.listener_count(), 2);
    }

    #[test]
    fn listen_is_idempotent() {
        let hub = MemoryHub::new();
        let mut a = hub.transport();
        let first = a.listen(None).unwrap();
        assert_eq!(a.listen(None).unwrap(), first);
        assert_eq!(hub.listener_count(), 1);
    }

    #[test]
    fn preferred_id_in_use_is_rejected() {
        let hub = MemoryHub::new();
        let id = EndpointId::from("lobby");
        let mut a = hub.transport();
        a.listen(Some(&id)).unwrap();
        let err = hub.transport().listen(Some(&id)).unwrap_err();
        assert!(matches!(err, ArenaError::SocketError { .. }));
    }

    #[test]
    fn dial_unknown_endpoint_fails() {
        let hub = MemoryHub::new();
        let err = hub
            .transport()
            .dial(&EndpointId::from("room-9999"))
            .err()
            .unwrap();
        assert_eq!(
            err,
            ArenaError::PeerUnavailable {
                endpoint: "room-9999".to_owned()
            }
        );
    }

    #[test]
    fn messages_arrive_in_order_both_ways() {
        let hub = MemoryHub::new();
        let (_host, mut dialer, mut acceptor) = pair(&hub);

        dialer.send(&Message::handshake("Ada")).unwrap();
        dialer
            .send(&Message::action_reveal(RoundId::ZERO, Action::Rock))
            .unwrap();
        acceptor.send(&Message::handshake("Grace")).unwrap();

        assert_eq!(
            acceptor.receive_all(),
            vec![
                ChannelEvent::Message(Message::handshake("Ada")),
                ChannelEvent::Message(Message::action_reveal(RoundId::ZERO, Action::Rock)),
            ]
        );
        assert_eq!(
            dialer.receive_all(),
            vec![ChannelEvent::Message(Message::handshake("Grace"))]
        );
        assert!(dialer.receive_all().is_empty());
    }

    #[test]
    fn close_is_reported_once_after_pending_messages() {
        let hub = MemoryHub::new();
        let (_host, mut dialer, mut acceptor) = pair(&hub);

        dialer.send(&Message::rematch_ready(RoundId::ZERO)).unwrap();
        dialer.close();
        dialer.close();

        assert!(!acceptor.is_open());
        assert_eq!(
            acceptor.receive_all(),
            vec![
                ChannelEvent::Message(Message::rematch_ready(RoundId::ZERO)),
                ChannelEvent::Closed,
            ]
        );
        assert!(acceptor.receive_all().is_empty());
        assert_eq!(
            acceptor.send(&Message::handshake("late")),
            Err(ArenaError::ChannelNotOpen)
        );
    }

    #[test]
    fn dropping_a_channel_closes_it() {
        let hub = MemoryHub::new();
        let (_host, dialer, mut acceptor) = pair(&hub);
        drop(dialer);
        assert_eq!(acceptor.receive_all(), vec![ChannelEvent::Closed]);
    }

    #[test]
    fn stop_listening_closes_unaccepted_dials() {
        let hub = MemoryHub::new();
        let mut host = hub.transport();
        let id = host.listen(None).unwrap();
        let mut dialer = hub.transport().dial(&id).unwrap();

        host.stop_listening();

        assert_eq!(hub.listener_count(), 0);
        assert!(host.accept().is_none());
        assert_eq!(dialer.receive_all(), vec![ChannelEvent::Closed]);
    }

    #[test]
    fn sever_all_errors_both_ends() {
        let hub = MemoryHub::new();
        let (_host, mut dialer, mut acceptor) = pair(&hub);

        hub.sever_all("network down");

        assert_eq!(
            dialer.receive_all(),
            vec![ChannelEvent::Errored("network down".to_owned())]
        );
        assert_eq!(
            acceptor.receive_all(),
            vec![ChannelEvent::Errored("network down".to_owned())]
        );
        assert!(!dialer.is_open());
    }
}
