//! Connection lifecycle state.

use std::fmt;

/// Ready state of an [`EventSource`](crate::EventSource).
///
/// Transitions: `Connecting → Open`, `Open → Connecting` on a transient
/// failure, and `Connecting | Open → Closing → Closed` on a terminal failure
/// or an explicit close. `Closed` is absorbing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReadyState {
    /// A connection attempt is in progress or scheduled.
    Connecting,
    /// The stream is open and being decoded.
    Open,
    /// Teardown has been claimed and is in progress.
    Closing,
    /// Closed for good; the source will never reconnect.
    Closed,
}

impl ReadyState {
    /// Returns `true` if the stream is open.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` once the source is fully closed.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if teardown has started or finished.
    pub fn is_shutting_down(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_state_predicates() {
        assert!(ReadyState::Open.is_open());
        assert!(!ReadyState::Connecting.is_open());
        assert!(ReadyState::Closed.is_closed());
        assert!(!ReadyState::Closing.is_closed());
        assert!(ReadyState::Closing.is_shutting_down());
        assert!(ReadyState::Closed.is_shutting_down());
        assert!(!ReadyState::Open.is_shutting_down());
    }

    #[test]
    fn test_ready_state_display() {
        assert_eq!(ReadyState::Connecting.to_string(), "Connecting");
        assert_eq!(ReadyState::Open.to_string(), "Open");
        assert_eq!(ReadyState::Closing.to_string(), "Closing");
        assert_eq!(ReadyState::Closed.to_string(), "Closed");
    }
}
