//! Commentary Adapter.
//!
//! After a round resolves, the match asks for a one-line description of the result. The
//! engine never waits for it: it emits a [`MatchRequest::Commentary`](crate::MatchRequest) and
//! keeps going. Whoever fulfills the request hands a [`CommentaryReply`] back to
//! [`MatchContext::apply_commentary`](crate::MatchContext::apply_commentary), which shows it only
//! if the same result is still on screen.
//!
//! Two ways to fulfill requests are provided:
//!
//! - [`CommentaryService`] + [`fulfill`] for blocking lookups on the host's own thread.
//! - `CommentaryDriver` (feature `tokio`) for async services, bounded by a timeout.

use std::error::Error;
use std::fmt;

use crate::{Action, Outcome, PlayMode, RoundId};

/// Shown when no commentary service is configured at all.
pub const UNAVAILABLE_COMMENTARY: &str = "GG! Play again?";

/// Deterministic commentary derived from the outcome alone.
///
/// ```
/// use rps_arena::{fallback_commentary, Outcome};
///
/// assert_eq!(fallback_commentary(Outcome::Draw, "Ada"), "It's a draw!");
/// assert_eq!(fallback_commentary(Outcome::SideAWins, "Ada"), "Ada takes the round!");
/// ```
#[must_use]
pub fn fallback_commentary(outcome: Outcome, winner_name: &str) -> String {
    match outcome {
        Outcome::Draw => "It's a draw!".to_owned(),
        Outcome::SideAWins | Outcome::SideBWins => format!("{winner_name} takes the round!"),
    }
}

/// Identifies which displayed result a commentary belongs to.
///
/// The epoch changes on every match reset, so a reply for round 0 of an old match never
/// lands on round 0 of a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommentaryTicket {
    /// Match generation the request was issued in.
    pub match_epoch: u64,
    /// Round the request describes.
    pub round: RoundId,
}

/// Everything a commentary service may use to describe a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentaryRequest {
    /// Echo this back in the reply.
    pub ticket: CommentaryTicket,
    /// Side A's action.
    pub local_action: Action,
    /// Side B's action.
    pub remote_action: Action,
    /// Result from side A's point of view.
    pub outcome: Outcome,
    /// How the match is being played.
    pub mode: PlayMode,
    /// Side A's display name.
    pub local_name: String,
    /// Side B's display name.
    pub opponent_name: String,
}

impl CommentaryRequest {
    /// Display name of the winner, or `None` for a draw.
    #[must_use]
    pub fn winner_name(&self) -> Option<&str> {
        match self.outcome {
            Outcome::SideAWins => Some(&self.local_name),
            Outcome::SideBWins => Some(&self.opponent_name),
            Outcome::Draw => None,
        }
    }

    /// The text used when the service fails or returns nothing.
    #[must_use]
    pub fn fallback(&self) -> String {
        fallback_commentary(self.outcome, self.winner_name().unwrap_or_default())
    }
}

/// Why a commentary lookup produced no text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentaryError {
    /// No service is configured.
    Unavailable,
    /// The service reported an error.
    Failed(String),
    /// The service did not answer in time.
    TimedOut,
    /// The service answered with empty text.
    Empty,
}

impl fmt::Display for CommentaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentaryError::Unavailable => write!(f, "commentary service unavailable"),
            CommentaryError::Failed(reason) => write!(f, "commentary service failed: {reason}"),
            CommentaryError::TimedOut => write!(f, "commentary service timed out"),
            CommentaryError::Empty => write!(f, "commentary service returned no text"),
        }
    }
}

impl Error for CommentaryError {}

/// The outcome of one commentary lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentaryReply {
    /// Copied from the request.
    pub ticket: CommentaryTicket,
    /// The text, or why there is none.
    pub result: Result<String, CommentaryError>,
}

impl CommentaryReply {
    /// Creates a reply for `ticket`.
    #[must_use]
    pub fn new(ticket: CommentaryTicket, result: Result<String, CommentaryError>) -> Self {
        Self { ticket, result }
    }

    /// The text to display: the trimmed reply, or `fallback` when it failed or was blank.
    #[must_use]
    pub fn text_or(&self, fallback: &str) -> String {
        match &self.result {
            Ok(text) if !text.trim().is_empty() => text.trim().to_owned(),
            Err(CommentaryError::Unavailable) => UNAVAILABLE_COMMENTARY.to_owned(),
            Ok(_) | Err(_) => fallback.to_owned(),
        }
    }
}

/// A blocking commentary source.
pub trait CommentaryService {
    /// Describes the round in `request`.
    fn request_commentary(&mut self, request: &CommentaryRequest) -> Result<String, CommentaryError>;
}

// Whitespace-only text counts as no answer.
fn reject_blank(result: Result<String, CommentaryError>) -> Result<String, CommentaryError> {
    match result {
        Ok(text) if text.trim().is_empty() => Err(CommentaryError::Empty),
        other => other,
    }
}

/// Runs `service` for `request` and wraps the answer in a reply.
///
/// A blank answer becomes [`CommentaryError::Empty`].
pub fn fulfill<S: CommentaryService + ?Sized>(
    service: &mut S,
    request: &CommentaryRequest,
) -> CommentaryReply {
    let result = reject_blank(service.request_commentary(request));
    if let Err(err) = &result {
        tracing::debug!(round = %request.ticket.round, %err, "commentary lookup failed");
    }
    CommentaryReply::new(request.ticket, result)
}

#[cfg(feature = "tokio")]
pub use driver::{AsyncCommentaryService, CommentaryDriver};

#[cfg(feature = "tokio")]
mod driver {
    use std::future::Future;
    use std::sync::Arc;

    use tokio::runtime::Handle;
    use tokio::sync::mpsc;
    use web_time::Duration;

    use super::{reject_blank, CommentaryError, CommentaryReply, CommentaryRequest};

    /// An asynchronous commentary source, such as a hosted text model.
    pub trait AsyncCommentaryService: Send + Sync + 'static {
        /// Describes the round in `request`.
        fn request_commentary(
            &self,
            request: &CommentaryRequest,
        ) -> impl Future<Output = Result<String, CommentaryError>> + Send;
    }

    /// Runs commentary lookups on a tokio runtime and collects their replies.
    ///
    /// Each submitted request becomes one task bounded by `timeout`. Nothing is ever
    /// cancelled; stale replies are filtered by the match when applied.
    pub struct CommentaryDriver<S> {
        service: Arc<S>,
        handle: Handle,
        timeout: Duration,
        tx: mpsc::UnboundedSender<CommentaryReply>,
        rx: mpsc::UnboundedReceiver<CommentaryReply>,
    }

    impl<S: AsyncCommentaryService> CommentaryDriver<S> {
        /// Creates a driver spawning onto `handle`.
        pub fn new(service: S, handle: Handle, timeout: Duration) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                service: Arc::new(service),
                handle,
                timeout,
                tx,
                rx,
            }
        }

        /// Starts a lookup for `request`. Returns immediately.
        pub fn submit(&self, request: CommentaryRequest) {
            let service = Arc::clone(&self.service);
            let tx = self.tx.clone();
            let timeout = self.timeout;
            self.handle.spawn(async move {
                let result =
                    match tokio::time::timeout(timeout, service.request_commentary(&request)).await
                    {
                        Ok(result) => reject_blank(result),
                        Err(_elapsed) => Err(CommentaryError::TimedOut),
                    };
                // The receiver lives as long as the driver; a send error only means it was dropped.
                let _ = tx.send(CommentaryReply::new(request.ticket, result));
            });
        }

        /// Returns every reply that finished since the last call. Never blocks.
        pub fn try_recv_all(&mut self) -> Vec<CommentaryReply> {
            let mut replies = Vec::new();
            while let Ok(reply) = self.rx.try_recv() {
                replies.push(reply);
            }
            replies
        }

        /// Waits for the next reply.
        pub async fn recv(&mut self) -> Option<CommentaryReply> {
            self.rx.recv().await
        }
    }

    impl<S> std::fmt::Debug for CommentaryDriver<S> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("CommentaryDriver")
                .field("timeout", &self.timeout)
                .finish_non_exhaustive()
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
        use crate::commentary::CommentaryTicket;
        use crate::{Action, Outcome, PlayMode, RoundId};

        struct Echo;

        impl AsyncCommentaryService for Echo {
            async fn request_commentary(
                &self,
                request: &CommentaryRequest,
            ) -> Result<String, CommentaryError> {
                Ok(format!("{} vs {}", request.local_action, request.remote_action))
            }
        }

        struct Mute;

        impl AsyncCommentaryService for Mute {
            async fn request_commentary(
                &self,
                _request: &CommentaryRequest,
            ) -> Result<String, CommentaryError> {
                Ok("\n".to_owned())
            }
        }

        struct Sleepy;

        impl AsyncCommentaryService for Sleepy {
            async fn request_commentary(
                &self,
                _request: &CommentaryRequest,
            ) -> Result<String, CommentaryError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("too late".to_owned())
            }
        }

        fn request() -> CommentaryRequest {
            CommentaryRequest {
                ticket: CommentaryTicket {
                    match_epoch: 0,
                    round: RoundId::new(2),
                },
                local_action: Action::Rock,
                remote_action: Action::Paper,
                outcome: Outcome::SideBWins,
                mode: PlayMode::Networked,
                local_name: "Ada".to_owned(),
                opponent_name: "Bo".to_owned(),
            }
        }

        #[tokio::test]
        async fn delivers_reply_with_ticket() {
            let mut driver = CommentaryDriver::new(Echo, Handle::current(), Duration::from_secs(1));
            driver.submit(request());
            let reply = driver.recv().await.unwrap();
            assert_eq!(reply.ticket.round, RoundId::new(2));
            assert_eq!(reply.result, Ok("ROCK vs PAPER".to_owned()));
        }

        #[tokio::test]
        async fn slow_service_times_out() {
            let mut driver =
                CommentaryDriver::new(Sleepy, Handle::current(), Duration::from_millis(20));
            driver.submit(request());
            let reply = driver.recv().await.unwrap();
            assert_eq!(reply.result, Err(CommentaryError::TimedOut));
            assert_eq!(reply.text_or(&request().fallback()), "Bo takes the round!");
        }

        #[tokio::test]
        async fn blank_async_reply_is_empty() {
            let mut driver = CommentaryDriver::new(Mute, Handle::current(), Duration::from_secs(1));
            driver.submit(request());
            let reply = driver.recv().await.unwrap();
            assert_eq!(reply.result, Err(CommentaryError::Empty));
        }

        #[tokio::test]
        async fn try_recv_all_is_empty_before_completion() {
            let mut driver =
                CommentaryDriver::new(Sleepy, Handle::current(), Duration::from_secs(1));
            driver.submit(request());
            assert!(driver.try_recv_all().is_empty());
        }
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

    fn request(outcome: Outcome) -> CommentaryRequest {
        CommentaryRequest {
            ticket: CommentaryTicket {
                match_epoch: 1,
                round: RoundId::ZERO,
            },
            local_action: Action::Rock,
            remote_action: Action::Scissors,
            outcome,
            mode: PlayMode::Automated,
            local_name: "Ada".to_owned(),
            opponent_name: "CPU".to_owned(),
        }
    }

    struct Failing;

    impl CommentaryService for Failing {
        fn request_commentary(&mut self, _: &CommentaryRequest) -> Result<String, CommentaryError> {
            Err(CommentaryError::Failed("503".to_owned()))
        }
    }

    #[test]
    fn winner_name_follows_outcome() {
        assert_eq!(request(Outcome::SideAWins).winner_name(), Some("Ada"));
        assert_eq!(request(Outcome::SideBWins).winner_name(), Some("CPU"));
        assert_eq!(request(Outcome::Draw).winner_name(), None);
    }

    #[test]
    fn failures_fall_back_to_outcome_text() {
        let req = request(Outcome::SideBWins);
        let reply = fulfill(&mut Failing, &req);
        assert_eq!(reply.ticket, req.ticket);
        assert_eq!(reply.text_or(&req.fallback()), "CPU takes the round!");
    }

    struct Shrugging;

    impl CommentaryService for Shrugging {
        fn request_commentary(&mut self, _: &CommentaryRequest) -> Result<String, CommentaryError> {
            Ok(" \t ".to_owned())
        }
    }

    #[test]
    fn blank_service_answer_is_empty() {
        let req = request(Outcome::SideAWins);
        let reply = fulfill(&mut Shrugging, &req);
        assert_eq!(reply.result, Err(CommentaryError::Empty));
        assert_eq!(reply.text_or(&req.fallback()), "Ada takes the round!");
    }

    #[test]
    fn blank_text_falls_back() {
        let req = request(Outcome::Draw);
        let reply = CommentaryReply::new(req.ticket, Ok("   ".to_owned()));
        assert_eq!(reply.text_or(&req.fallback()), "It's a draw!");
    }

    #[test]
    fn text_is_trimmed() {
        let req = request(Outcome::SideAWins);
        let reply = CommentaryReply::new(req.ticket, Ok("  Stone cold.\n".to_owned()));
        assert_eq!(reply.text_or(&req.fallback()), "Stone cold.");
    }

    #[test]
    fn unavailable_service_says_gg() {
        let req = request(Outcome::SideAWins);
        let reply = CommentaryReply::new(req.ticket, Err(CommentaryError::Unavailable));
        assert_eq!(reply.text_or(&req.fallback()), UNAVAILABLE_COMMENTARY);
    }
}
