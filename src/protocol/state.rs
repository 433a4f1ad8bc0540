//! Transport readiness codes.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// ReadyState
// ============================================================================

/// Readiness of a transport session.
///
/// Mirrors the `readyState` codes of the underlying socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReadyState {
    /// Handshake in progress.
    Connecting,
    /// Ready to carry traffic.
    Open,
    /// Close requested, not yet completed.
    Closing,
    /// No usable session.
    #[default]
    Closed,
}

impl ReadyState {
    /// Returns `true` for [`ReadyState::Open`].
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns the numeric socket code (0-3).
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Open => 1,
            Self::Closing => 2,
            Self::Closed => 3,
        }
    }

    /// Returns the upper-case name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
