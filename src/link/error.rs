//! Link error types.

use thiserror::Error;

/// Errors that can occur on a controller link.
///
/// Transport-level failures are fatal to the link: they are reported once
/// through the injected disable hook and the link must be reconstructed.
/// `MalformedFrame` is the one exception — a bad line is logged and dropped
/// without taking the link down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The serial port could not be opened.
    #[error("could not open serial port: {0}")]
    TransportOpen(String),

    /// No `start` frame arrived within the handshake window.
    #[error("no response from room controller (timeout of {secs} seconds exceeded)")]
    HandshakeTimeout {
        /// Length of the window that elapsed.
        secs: u64,
    },

    /// The firmware reported a version other than the expected one.
    #[error("incompatible firmware (expected '{expected}', got '{actual}')")]
    VersionMismatch {
        /// Version this driver speaks.
        expected: String,
        /// Version the firmware reported.
        actual: String,
    },

    /// A write to the serial port failed.
    #[error("serial write failed: {0}")]
    Write(String),

    /// An incoming line was not a decodable frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The link was closed or disabled while the operation was pending.
    #[error("link closed")]
    LinkClosed,

    /// A correlated request got no response within the bounded wait.
    #[error("response timeout")]
    ResponseTimeout,

    /// Every correlation code currently has a request outstanding.
    #[error("all correlation codes are in use")]
    CorrelationExhausted,
}
