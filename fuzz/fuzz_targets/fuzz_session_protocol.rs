//! Fuzz target for the session protocol.
//!
//! Drives a [`SessionProtocol`] with an arbitrary mix of local decisions and peer messages.
//!
//! # Safety Properties Tested
//! - No panics on any sequence of operations
//! - At most one remote action and one remote ready per round
//! - Nothing is sent or reported once the protocol is closed

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use rps_arena::__internal::{ProtocolEvent, ProtocolState, SessionProtocol};
use rps_arena::{Action, Message, MessageBody, MessageHeader, RoundId};

#[derive(Debug, Clone, Copy, Arbitrary)]
enum FuzzAction {
    Rock,
    Paper,
    Scissors,
}

impl From<FuzzAction> for Action {
    fn from(action: FuzzAction) -> Self {
        match action {
            FuzzAction::Rock => Action::Rock,
            FuzzAction::Paper => Action::Paper,
            FuzzAction::Scissors => Action::Scissors,
        }
    }
}

#[derive(Debug, Arbitrary)]
enum Op {
    ChannelOpen,
    SendReveal(FuzzAction),
    SendReady,
    AdvanceRound,
    Close,
    Handshake { version: u16, name: String },
    Reveal { version: u16, round: u8, action: FuzzAction },
    Ready { version: u16, round: u8 },
}

fuzz_target!(|ops: Vec<Op>| {
    let mut protocol = SessionProtocol::new("Fuzz", None);
    let mut actions_this_round = 0;
    let mut readies_this_round = 0;

    for op in ops.into_iter().take(256) {
        let msg = match op {
            Op::ChannelOpen => {
                protocol.on_channel_open();
                None
            },
            Op::SendReveal(action) => {
                let _ = protocol.send_reveal(action.into());
                None
            },
            Op::SendReady => {
                let _ = protocol.send_rematch_ready();
                None
            },
            Op::AdvanceRound => {
                protocol.advance_round();
                actions_this_round = 0;
                readies_this_round = 0;
                None
            },
            Op::Close => {
                protocol.close();
                None
            },
            Op::Handshake { version, name } => Some(Message {
                header: MessageHeader { version },
                body: MessageBody::Handshake { display_name: name },
            }),
            Op::Reveal {
                version,
                round,
                action,
            } => Some(Message {
                header: MessageHeader { version },
                body: MessageBody::ActionReveal {
                    round: RoundId::new(u32::from(round)),
                    action: action.into(),
                },
            }),
            Op::Ready { version, round } => Some(Message {
                header: MessageHeader { version },
                body: MessageBody::RematchReady {
                    round: RoundId::new(u32::from(round)),
                },
            }),
        };

        if let Some(msg) = msg {
            protocol.handle_message(&msg);
        }

        let closed = protocol.state() == ProtocolState::Closed;
        for event in protocol.events() {
            assert!(!closed, "event after close: {event:?}");
            match event {
                ProtocolEvent::RemoteAction { .. } => actions_this_round += 1,
                ProtocolEvent::RemoteReady => readies_this_round += 1,
                ProtocolEvent::HandshakeReceived { .. } => {},
            }
        }
        assert!(actions_this_round <= 1);
        assert!(readies_this_round <= 1);

        let sent = protocol.drain_send_queue().count();
        assert!(!closed || sent == 0);
    }
});
