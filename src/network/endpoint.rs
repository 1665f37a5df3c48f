//! Owner of the local transport and the single channel to the peer.

use std::collections::vec_deque::Drain;
use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{ArenaError, ArenaResult};
use crate::network::messages::Message;
use crate::report_violation_to;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{Channel, ChannelEvent, ConnectionRole, EndpointId, Transport};

/// What the endpoint observed since it was last polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    /// A channel to the peer is open.
    Opened {
        /// Whether we dialed or accepted.
        role: ConnectionRole,
    },
    /// A message from the peer.
    Message(Message),
    /// The peer closed the channel.
    Closed,
    /// The channel failed.
    Errored {
        /// What went wrong.
        context: String,
    },
}

/// The local network identity: a [`Transport`] plus at most one open [`Channel`].
///
/// Created idle once the player has a name. Listening, dialing and channel lifecycle are
/// surfaced through [`poll`](Self::poll) as [`EndpointEvent`]s.
pub struct ConnectionEndpoint {
    transport: Box<dyn Transport>,
    channel: Option<Box<dyn Channel>>,
    role: Option<ConnectionRole>,
    listening: Option<EndpointId>,
    event_queue: VecDeque<EndpointEvent>,
    observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for ConnectionEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEndpoint")
            .field("connected", &self.channel.is_some())
            .field("role", &self.role)
            .field("listening", &self.listening)
            .field("queued_events", &self.event_queue.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionEndpoint {
    /// Wraps `transport`. Nothing is opened yet.
    #[must_use]
    pub fn new(
        transport: Box<dyn Transport>,
        observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Self {
        Self {
            transport,
            channel: None,
            role: None,
            listening: None,
            event_queue: VecDeque::new(),
            observer,
        }
    }

    /// Starts listening and returns the identifier to share. Idempotent while listening.
    pub fn open(&mut self, preferred: Option<&EndpointId>) -> ArenaResult<EndpointId> {
        if let Some(id) = &self.listening {
            return Ok(id.clone());
        }
        let id = self.transport.listen(preferred)?;
        debug!("endpoint listening on {id}");
        self.listening = Some(id.clone());
        Ok(id)
    }

    /// Stops accepting new channels. An open channel stays open.
    pub fn stop_listening(&mut self) {
        if self.listening.take().is_some() {
            self.transport.stop_listening();
        }
    }

    /// Opens a channel to `remote`. [`EndpointEvent::Opened`] follows on the next poll.
    ///
    /// # Errors
    ///
    /// - [`ArenaError::InternalError`] if a channel is already open.
    /// - Whatever the transport reports when the remote cannot be reached.
    pub fn dial(&mut self, remote: &EndpointId) -> ArenaResult<()> {
        if self.channel.is_some() {
            return Err(ArenaError::InternalError {
                context: "dial while a channel is already open".to_owned(),
            });
        }
        let channel = self.transport.dial(remote)?;
        debug!("endpoint dialed {remote}");
        self.channel = Some(channel);
        self.role = Some(ConnectionRole::Initiator);
        self.event_queue.push_back(EndpointEvent::Opened {
            role: ConnectionRole::Initiator,
        });
        Ok(())
    }

    /// Sends `msg` over the open channel.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::ChannelNotOpen`] without a channel, or the channel's send error.
    pub fn send(&mut self, msg: &Message) -> ArenaResult<()> {
        match self.channel.as_mut() {
            Some(channel) => channel.send(msg),
            None => Err(ArenaError::ChannelNotOpen),
        }
    }

    /// Accepts a pending peer and drains the channel.
    ///
    /// After [`EndpointEvent::Closed`] or [`EndpointEvent::Errored`] the channel is gone and
    /// nothing else is reported for it.
    pub fn poll(&mut self) -> Drain<'_, EndpointEvent> {
        self.accept_pending();

        let received = match self.channel.as_mut() {
            Some(channel) => channel.receive_all(),
            None => Vec::new(),
        };
        for event in received {
            match event {
                ChannelEvent::Message(msg) => {
                    trace!("endpoint received {}", msg.body.kind());
                    self.event_queue.push_back(EndpointEvent::Message(msg));
                },
                ChannelEvent::Closed => {
                    debug!("peer closed the channel");
                    self.drop_channel();
                    self.event_queue.push_back(EndpointEvent::Closed);
                    break;
                },
                ChannelEvent::Errored(context) => {
                    debug!("channel failed: {context}");
                    self.drop_channel();
                    self.event_queue
                        .push_back(EndpointEvent::Errored { context });
                    break;
                },
            }
        }

        self.event_queue.drain(..)
    }

    fn accept_pending(&mut self) {
        if self.listening.is_none() {
            return;
        }
        while let Some(mut incoming) = self.transport.accept() {
            if self.channel.is_some() {
                report_violation_to!(
                    &self.observer,
                    ViolationSeverity::Warning,
                    ViolationKind::Channel,
                    "rejecting extra peer while a channel is open"
                );
                incoming.close();
                continue;
            }
            debug!("endpoint accepted a peer");
            self.channel = Some(incoming);
            self.role = Some(ConnectionRole::Acceptor);
            self.event_queue.push_back(EndpointEvent::Opened {
                role: ConnectionRole::Acceptor,
            });
        }
    }

    fn drop_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.role = None;
    }

    /// Closes the channel, stops listening and forgets queued events. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.drop_channel();
        self.stop_listening();
        self.event_queue.clear();
    }

    /// Returns `true` while a channel is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| c.is_open())
    }

    /// The identifier we listen on, if any.
    #[must_use]
    pub fn listening_on(&self) -> Option<&EndpointId> {
        self.listening.as_ref()
    }

    /// How the current channel was obtained.
    #[must_use]
    pub fn role(&self) -> Option<ConnectionRole> {
        self.role
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
    use crate::network::memory_channel::MemoryHub;
    use crate::telemetry::CollectingObserver;

    fn endpoint(hub: &MemoryHub) -> ConnectionEndpoint {
        ConnectionEndpoint::new(Box::new(hub.transport()), None)
    }

    #[test]
    fn send_without_channel_fails() {
        let hub = MemoryHub::new();
        let mut ep = endpoint(&hub);
        assert_eq!(
            ep.send(&Message::handshake("Ada")),
            Err(ArenaError::ChannelNotOpen)
        );
    }

    #[test]
    fn dial_and_accept_report_roles() {
        let hub = MemoryHub::new();
        let mut host = endpoint(&hub);
        let mut guest = endpoint(&hub);

        let id = host.open(None).unwrap();
        guest.dial(&id).unwrap();

        let guest_events: Vec<_> = guest.poll().collect();
        assert_eq!(
            guest_events,
            vec![EndpointEvent::Opened {
                role: ConnectionRole::Initiator
            }]
        );
        let host_events: Vec<_> = host.poll().collect();
        assert_eq!(
            host_events,
            vec![EndpointEvent::Opened {
                role: ConnectionRole::Acceptor
            }]
        );
        assert!(host.is_connected());
        assert_eq!(host.role(), Some(ConnectionRole::Acceptor));
    }

    #[test]
    fn extra_peer_is_rejected() {
        let hub = MemoryHub::new();
        let observer = Arc::new(CollectingObserver::new());
        let mut host = ConnectionEndpoint::new(Box::new(hub.transport()), Some(observer.clone()));
        let mut first = endpoint(&hub);
        let mut second = endpoint(&hub);

        let id = host.open(None).unwrap();
        first.dial(&id).unwrap();
        second.dial(&id).unwrap();
        let _ = host.poll().count();

        assert!(observer.has_violation(ViolationKind::Channel));
        let second_events: Vec<_> = second.poll().collect();
        assert_eq!(second_events.last(), Some(&EndpointEvent::Closed));
        assert!(!second.is_connected());
        assert!(host.is_connected());
    }

    #[test]
    fn peer_close_drops_channel() {
        let hub = MemoryHub::new();
        let mut host = endpoint(&hub);
        let mut guest = endpoint(&hub);
        let id = host.open(None).unwrap();
        guest.dial(&id).unwrap();
        let _ = host.poll().count();

        guest.send(&Message::handshake("Grace")).unwrap();
        guest.close();

        let events: Vec<_> = host.poll().collect();
        assert_eq!(
            events,
            vec![
                EndpointEvent::Message(Message::handshake("Grace")),
                EndpointEvent::Closed
            ]
        );
        assert!(!host.is_connected());
        assert_eq!(host.role(), None);
        assert_eq!(host.poll().count(), 0);
    }

    #[test]
    fn close_is_idempotent() {
        let hub = MemoryHub::new();
        let mut host = endpoint(&hub);
        host.open(None).unwrap();
        host.close();
        host.close();
        assert!(host.listening_on().is_none());
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn dial_unknown_room_fails() {
        let hub = MemoryHub::new();
        let mut guest = endpoint(&hub);
        let err = guest.dial(&EndpointId::from("room-0404")).unwrap_err();
        assert!(matches!(err, ArenaError::PeerUnavailable { .. }));
        assert_eq!(guest.poll().count(), 0);
    }
}
