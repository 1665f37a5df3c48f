//! Structured telemetry pipeline for protocol and state-machine violations.
//!
//! Peers are allowed to misbehave: a duplicate reveal, a message from a finished round, a
//! late commentary reply. None of that reaches the player, but all of it is worth seeing.
//! Instead of a bare `tracing::warn!`, violations are structured data that can be:
//!
//! - Logged via tracing (default behavior)
//! - Collected programmatically for testing
//! - Sent to custom observers (metrics, alerting, etc.)
//!
//! # Example
//!
//! ```
//! use rps_arena::telemetry::CollectingObserver;
//! use std::sync::Arc;
//!
//! let observer = Arc::new(CollectingObserver::new());
//!
//! // Hand it to MatchBuilder::with_violation_observer, play, then inspect.
//! assert!(observer.violations().is_empty(), "unexpected violations");
//! ```

use crate::RoundId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// How bad a violation is, least severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Unexpected but recoverable; the offending input was ignored.
    Warning,
    /// Serious issue; behavior may be degraded.
    Error,
    /// Match state can no longer be trusted.
    Critical,
}

impl ViolationSeverity {
    /// Label used in log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a violation came from.
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]`. Always include a wildcard arm when matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// The peer broke the session protocol.
    ///
    /// Examples:
    /// - Message before handshake
    /// - Duplicate or stale action reveal
    /// - Unknown protocol version
    SessionProtocol,
    /// The match state machine saw an input it cannot apply.
    MatchState,
    /// A channel or transport misbehaved (undecodable frame, extra connection).
    Channel,
    /// A commentary reply was stale or failed.
    Commentary,
    /// A value outside its valid range reached the engine.
    Configuration,
    /// The engine contradicted itself.
    InternalError,
}

impl ViolationKind {
    /// Label used in log fields and JSON.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SessionProtocol => "session_protocol",
            Self::MatchState => "match_state",
            Self::Channel => "channel",
            Self::Commentary => "commentary",
            Self::Configuration => "configuration",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One misbehavior, with where it was detected and what it concerned.
///
/// # Example
///
/// ```
/// use rps_arena::telemetry::{ProtocolViolation, ViolationSeverity, ViolationKind};
/// use rps_arena::RoundId;
///
/// let violation = ProtocolViolation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::SessionProtocol,
///     "duplicate action reveal",
///     "protocol.rs:42",
/// ).with_round(RoundId::new(3))
///  .with_context("kept", "ROCK");
///
/// let json = serde_json::to_string(&violation).unwrap();
/// assert!(json.contains(r#""kind":"session_protocol""#));
/// assert!(json.contains(r#""round":3"#));
/// ```
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProtocolViolation {
    /// How bad it is.
    pub severity: ViolationSeverity,
    /// Which part of the engine noticed.
    pub kind: ViolationKind,
    /// What happened.
    pub message: String,
    /// `file:line` of the report.
    pub location: &'static str,
    /// The round concerned, if any.
    pub round: Option<RoundId>,
    /// Extra key-value details, sorted by key.
    pub context: BTreeMap<String, String>,
}

impl ProtocolViolation {
    /// Creates a new violation.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
            round: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the round this violation refers to.
    #[must_use]
    pub fn with_round(mut self, round: RoundId) -> Self {
        self.round = Some(round);
        self
    }

    /// Adds a context key-value pair.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Serializes to JSON, or `None` if serde fails.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    /// Like [`to_json`](Self::to_json), indented.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json_pretty(&self) -> Option<String> {
        serde_json::to_string_pretty(self).ok()
    }
}

impl std::fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}] {} (at {}",
            self.severity, self.kind, self.message, self.location
        )?;
        if let Some(round) = self.round {
            write!(f, ", round={round}")?;
        }
        if !self.context.is_empty() {
            write!(f, ", context={:?}", self.context)?;
        }
        write!(f, ")")
    }
}

/// Receives every violation a match reports.
///
/// # Example
///
/// ```
/// use rps_arena::telemetry::{ViolationObserver, ProtocolViolation};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct CountingObserver(AtomicUsize);
///
/// impl ViolationObserver for CountingObserver {
///     fn on_violation(&self, _violation: &ProtocolViolation) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait ViolationObserver {
    /// Called synchronously from the reporting code.
    fn on_violation(&self, violation: &ProtocolViolation);
}

/// Logs violations through `tracing`: warnings at `warn`, everything else at `error`.
///
/// The round and context travel as structured fields so a subscriber can filter on them.
#[derive(Debug, Default, Clone)]
pub struct TracingObserver;

impl TracingObserver {
    /// Creates a new tracing observer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &ProtocolViolation) {
        let round = violation.round.map(RoundId::as_u32);
        let context = &violation.context;
        if violation.severity == ViolationSeverity::Warning {
            tracing::warn!(
                kind = violation.kind.as_str(),
                location = violation.location,
                round,
                ?context,
                "{}",
                violation.message
            );
        } else {
            tracing::error!(
                severity = violation.severity.as_str(),
                kind = violation.kind.as_str(),
                location = violation.location,
                round,
                ?context,
                "{}",
                violation.message
            );
        }
    }
}

/// Keeps every violation in memory, for assertions in tests.
///
/// ```
/// use rps_arena::telemetry::{CollectingObserver, ViolationKind, ViolationObserver, ProtocolViolation, ViolationSeverity};
///
/// let observer = CollectingObserver::new();
/// observer.on_violation(&ProtocolViolation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::Channel,
///     "test violation",
///     "test.rs:1",
/// ));
///
/// assert_eq!(observer.len(), 1);
/// assert!(observer.has_violation(ViolationKind::Channel));
/// ```
#[derive(Debug, Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<ProtocolViolation>>,
}

impl CollectingObserver {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything collected so far, oldest first.
    #[must_use]
    pub fn violations(&self) -> Vec<ProtocolViolation> {
        self.violations.lock().clone()
    }

    /// Number collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.lock().len()
    }

    /// `true` until something is reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// Whether any collected violation is of `kind`.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.violations.lock().iter().any(|v| v.kind == kind)
    }

    /// The collected violations of `kind`.
    #[must_use]
    pub fn violations_of_kind(&self, kind: ViolationKind) -> Vec<ProtocolViolation> {
        self.violations
            .lock()
            .iter()
            .filter(|v| v.kind == kind)
            .cloned()
            .collect()
    }

    /// Forgets everything collected.
    pub fn clear(&self) {
        self.violations.lock().clear();
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &ProtocolViolation) {
        self.violations.lock().push(violation.clone());
    }
}

/// Fans each violation out to several observers, in the order they were added.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ViolationObserver>>,
}

impl CompositeObserver {
    /// Creates a composite with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `observer`.
    pub fn add(&mut self, observer: Arc<dyn ViolationObserver>) {
        self.observers.push(observer);
    }
}

impl ViolationObserver for CompositeObserver {
    fn on_violation(&self, violation: &ProtocolViolation) {
        for observer in &self.observers {
            observer.on_violation(violation);
        }
    }
}

impl std::fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Sends `violation` to `observer`, or logs it when there is none.
pub fn report_to_observer<O: ViolationObserver + ?Sized>(
    observer: Option<&Arc<O>>,
    violation: &ProtocolViolation,
) {
    match observer {
        Some(obs) => obs.on_violation(violation),
        None => TracingObserver.on_violation(violation),
    }
}

/// Logs a violation through [`TracingObserver`], recording the call site.
///
/// ```
/// use rps_arena::{report_violation, telemetry::{ViolationSeverity, ViolationKind}};
///
/// report_violation!(ViolationSeverity::Warning, ViolationKind::Channel,
///     "dropped frame of {} bytes", 12);
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $msg:literal) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::ProtocolViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};

    ($severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::ProtocolViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};
}

/// Reports a violation to an `Option<Arc<dyn ViolationObserver>>`, logging it when `None`.
///
/// `round = expr` before the message attaches a round.
///
/// ```
/// use rps_arena::{report_violation_to, telemetry::{ViolationSeverity, ViolationKind, CollectingObserver, ViolationObserver}};
/// use rps_arena::RoundId;
/// use std::sync::Arc;
///
/// let observer: Option<Arc<dyn ViolationObserver>> = Some(Arc::new(CollectingObserver::new()));
///
/// report_violation_to!(&observer, ViolationSeverity::Warning, ViolationKind::SessionProtocol,
///     round = RoundId::new(2), "stale reveal for round {}", 1);
/// ```
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, $severity:expr, $kind:expr, round = $round:expr, $msg:literal) => {{
        let violation = $crate::telemetry::ProtocolViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        )
        .with_round($round);
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, $severity:expr, $kind:expr, round = $round:expr, $fmt:literal, $($arg:tt)+) => {{
        let violation = $crate::telemetry::ProtocolViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        )
        .with_round($round);
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, $severity:expr, $kind:expr, $msg:literal) => {{
        let violation = $crate::telemetry::ProtocolViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, $severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        let violation = $crate::telemetry::ProtocolViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};
}

/// Asserts that no violations have been collected.
///
/// # Panics
///
/// Panics if the observer contains any violations, printing them for debugging.
#[macro_export]
macro_rules! assert_no_violations {
    ($observer:expr) => {{
        let violations = $observer.violations();
        assert!(
            violations.is_empty(),
            "Expected no violations, but found {}:\n{:#?}",
            violations.len(),
            violations
        );
    }};
}

/// Asserts that a violation of the specified kind was collected.
///
/// # Panics
///
/// Panics if no violation of the specified kind was found.
#[macro_export]
macro_rules! assert_violation {
    ($observer:expr, $kind:expr) => {{
        assert!(
            $observer.has_violation($kind),
            "Expected violation of kind {:?}, but found: {:#?}",
            $kind,
            $observer.violations()
        );
    }};
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
    fn test_violation_severity_ordering() {
        assert!(ViolationSeverity::Warning < ViolationSeverity::Error);
        assert!(ViolationSeverity::Error < ViolationSeverity::Critical);
    }

    #[test]
    fn test_violation_kind_as_str() {
        assert_eq!(ViolationKind::SessionProtocol.as_str(), "session_protocol");
        assert_eq!(ViolationKind::MatchState.as_str(), "match_state");
        assert_eq!(ViolationKind::Channel.as_str(), "channel");
        assert_eq!(ViolationKind::Commentary.as_str(), "commentary");
        assert_eq!(ViolationKind::Configuration.as_str(), "configuration");
        assert_eq!(ViolationKind::InternalError.as_str(), "internal_error");
    }

    #[test]
    fn test_protocol_violation_display() {
        let violation = ProtocolViolation::new(
            ViolationSeverity::Warning,
            ViolationKind::SessionProtocol,
            "duplicate reveal",
            "test.rs:10",
        )
        .with_round(RoundId::new(5))
        .with_context("kept", "ROCK");

        let display = violation.to_string();
        assert!(display.contains("warning"));
        assert!(display.contains("session_protocol"));
        assert!(display.contains("duplicate reveal"));
        assert!(display.contains("round=5"));
        assert!(display.contains("kept"));
    }

    #[test]
    fn test_round_serializes_as_null_when_absent() {
        let violation = ProtocolViolation::new(
            ViolationSeverity::Error,
            ViolationKind::Channel,
            "x",
            "test.rs:1",
        );
        let json = serde_json::to_string(&violation).unwrap();
        assert!(json.contains(r#""round":null"#));
    }

    #[test]
    fn test_collecting_observer_filters() {
        let observer = CollectingObserver::new();
        observer.on_violation(&ProtocolViolation::new(
            ViolationSeverity::Warning,
            ViolationKind::SessionProtocol,
            "a",
            "test.rs:1",
        ));
        observer.on_violation(&ProtocolViolation::new(
            ViolationSeverity::Warning,
            ViolationKind::Commentary,
            "b",
            "test.rs:2",
        ));
        assert_eq!(observer.len(), 2);
        assert_eq!(observer.violations_of_kind(ViolationKind::Commentary).len(), 1);
        assert!(!observer.has_violation(ViolationKind::Channel));
        observer.clear();
        assert!(observer.is_empty());
    }

    #[test]
    fn test_report_violation_to_attaches_round() {
        let collector = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
        report_violation_to!(
            &observer,
            ViolationSeverity::Warning,
            ViolationKind::SessionProtocol,
            round = RoundId::new(9),
            "stale reveal"
        );
        let violations = collector.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].round, Some(RoundId::new(9)));
    }

    #[test]
    fn test_report_violation_to_without_observer_uses_tracing() {
        let observer: Option<Arc<dyn ViolationObserver>> = None;
        report_violation_to!(
            &observer,
            ViolationSeverity::Warning,
            ViolationKind::Channel,
            "falls back to {}",
            "tracing"
        );
    }

    #[test]
    fn test_composite_forwards_to_all() {
        let a = Arc::new(CollectingObserver::new());
        let b = Arc::new(CollectingObserver::new());
        let mut composite = CompositeObserver::new();
        composite.add(a.clone());
        composite.add(b.clone());
        composite.on_violation(&ProtocolViolation::new(
            ViolationSeverity::Critical,
            ViolationKind::InternalError,
            "boom",
            "test.rs:3",
        ));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert!(format!("{composite:?}").contains("observers: 2"));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_to_json() {
        let violation = ProtocolViolation::new(
            ViolationSeverity::Warning,
            ViolationKind::MatchState,
            "x",
            "test.rs:1",
        );
        assert!(violation.to_json().unwrap().contains("match_state"));
    }
}
