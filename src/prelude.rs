//! Convenient re-exports for common usage.
//!
//! ```rust
//! use rps_arena::prelude::*;
//! ```
//!
//! # What's Included
//!
//! - **Match types**: [`MatchContext`], [`MatchBuilder`], [`MatchConfig`], [`MatchSession`]
//! - **Fundamental types**: [`Action`], [`Side`], [`Outcome`], [`PlayMode`], [`MatchPhase`],
//!   [`RoundId`], [`EndpointId`], [`ConnectionRole`]
//! - **Events and requests**: [`MatchEvent`], [`MatchRequest`], [`EventDrain`]
//! - **Opponents**: [`OpponentStrategy`], [`RandomOpponent`], [`ScriptedOpponent`]
//! - **Transports**: [`Transport`], [`Channel`], [`MemoryHub`], [`TcpTransport`]
//! - **Commentary**: [`CommentaryService`], [`CommentaryRequest`], [`CommentaryReply`],
//!   [`fulfill`]
//! - **Error handling**: [`ArenaError`], [`ArenaResult`]
//!
//! # Example
//!
//! ```rust
//! use rps_arena::prelude::*;
//!
//! struct Quiet;
//!
//! impl CommentaryService for Quiet {
//!     fn request_commentary(&mut self, _: &CommentaryRequest) -> Result<String, CommentaryError> {
//!         Ok("Well played.".to_owned())
//!     }
//! }
//!
//! let mut ctx = MatchBuilder::new()
//!     .with_opponent(ScriptedOpponent::new(vec![Action::Paper]))
//!     .build()
//!     .unwrap();
//! ctx.submit_display_name("Ada").unwrap();
//! ctx.select_mode(PlayMode::Automated).unwrap();
//! ctx.commit_action(Action::Scissors).unwrap();
//!
//! for request in ctx.take_requests() {
//!     let MatchRequest::Commentary(request) = request else { continue };
//!     let reply = fulfill(&mut Quiet, &request);
//!     assert!(ctx.apply_commentary(reply));
//! }
//! assert_eq!(ctx.commentary(), Some("Well played."));
//! ```

// Match types
pub use crate::sessions::builder::{MatchBuilder, MatchConfig};
pub use crate::sessions::event_drain::EventDrain;
pub use crate::sessions::match_context::{MatchContext, MatchSession};

// Fundamental types
pub use crate::{Action, ConnectionRole, EndpointId, MatchPhase, Outcome, PlayMode, RoundId, Side};

// Events and requests
pub use crate::{MatchEvent, MatchRequest};

// Opponents
pub use crate::sessions::opponent::{OpponentStrategy, RandomOpponent, ScriptedOpponent};

// Transports
pub use crate::{Channel, MemoryHub, TcpTransport, Transport};

// Commentary
pub use crate::commentary::{
    fulfill, CommentaryError, CommentaryReply, CommentaryRequest, CommentaryService,
};

// Error handling
pub use crate::{ArenaError, ArenaResult};

// Round bookkeeping
pub use crate::round::{ReadyFlags, RoundState, Score};
