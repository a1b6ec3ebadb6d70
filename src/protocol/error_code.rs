// (c) 2024 Ross Younger

//! Session error codes
//!
//! Sessions share their connection with other sessions, so they cannot use the transport's
//! error code space directly. Application codes are 32 bits wide and are carried inside the
//! HTTP/3 error code range reserved for WebTransport, skipping the reserved
//! codepoints (`0x1f * N + 0x21`).

use std::fmt::Display;

const FIRST: u64 = 0x52e4_a40f_a8db;
const LAST: u64 = 0x52e5_ac98_3162;

/// An application error code used when resetting or stopping a session stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    /// Orderly closure
    pub const NO_ERROR: Self = Self(0);
    /// The local side failed part way through
    pub const INTERNAL: Self = Self(1);
    /// The request on this stream was not acceptable
    pub const REQUEST_REJECTED: Self = Self(2);
    /// The stream does not belong to any session we know about
    pub const UNKNOWN_SESSION: Self = Self(3);

    /// Translates to the code carried on the wire
    #[must_use]
    pub fn to_transport(self) -> u64 {
        let n = u64::from(self.0);
        FIRST + n + n / 0x1e
    }

    /// Translates from a code received on the wire.
    ///
    /// Returns `None` if the code is outside the session range or is a reserved codepoint.
    #[must_use]
    pub fn from_transport(code: u64) -> Option<Self> {
        if !(FIRST..=LAST).contains(&code) || (code - 0x21) % 0x1f == 0 {
            return None;
        }
        let shifted = code - FIRST;
        u32::try_from(shifted - shifted / 0x1f).ok().map(Self)
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::NO_ERROR => f.write_str("no error"),
            Self::INTERNAL => f.write_str("internal error"),
            Self::REQUEST_REJECTED => f.write_str("request rejected"),
            Self::UNKNOWN_SESSION => f.write_str("unknown session"),
            Self(other) => write!(f, "application code {other}"),
        }
    }
}
