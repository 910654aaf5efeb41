//! Frame encoding/decoding.
//!
//! The wire format is line-oriented: each frame's bytes are hex-encoded as
//! ASCII digits and terminated with `\r\n`.
//!
//! ```text
//! frame bytes:  [opcode, pin, value]
//! on the wire:  "00070d" "\r\n"
//! ```
//!
//! Outgoing frames carry an opcode, a pin, and an optional value byte
//! (omitted for read-only commands). Incoming frames are an opcode followed
//! by opcode-specific payload bytes.

use crate::link::error::LinkError;
use crate::link::types::Frame;
use bytes::{Buf, BytesMut};

/// Encode an outgoing command frame as a hex line.
///
/// Produces `[opcode, pin]` or `[opcode, pin, value]`, hex-encoded and
/// terminated with `\r\n`.
pub fn encode_frame(opcode: u8, pin: u8, value: Option<u8>) -> Vec<u8> {
    let bytes = match value {
        Some(v) => vec![opcode, pin, v],
        None => vec![opcode, pin],
    };
    let mut line = hex::encode(bytes).into_bytes();
    line.extend_from_slice(b"\r\n");
    line
}

/// Decode one hex line (delimiters already stripped) into a frame.
///
/// The first byte is the opcode, the remainder is the payload. Hex digit
/// case is not significant.
pub fn decode_line(line: &[u8]) -> Result<Frame, LinkError> {
    if line.is_empty() {
        return Err(LinkError::MalformedFrame("empty line".to_string()));
    }
    let bytes = hex::decode(line).map_err(|e| {
        LinkError::MalformedFrame(format!(
            "invalid hex '{}': {}",
            String::from_utf8_lossy(line),
            e
        ))
    })?;
    let opcode = bytes[0];
    Ok(Frame {
        opcode,
        payload: bytes[1..].to_vec(),
    })
}

/// Accumulates raw received bytes and splits out complete CRLF-terminated
/// frames as they become available.
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl LineFramer {
    /// Create a new framer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to split the next complete line out of the buffer and decode it.
    ///
    /// Returns `None` if no complete line is buffered yet. A complete line
    /// that is not a valid frame yields `Some(Err(MalformedFrame))`; the
    /// caller drops that line and the link stays up.
    pub fn next_frame(&mut self) -> Option<Result<Frame, LinkError>> {
        let nl = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line = self.buffer.split_to(nl);
        self.buffer.advance(1); // consume '\n'
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(decode_line(&line))
    }

    /// Number of buffered bytes not yet forming a complete line.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_with_value() {
        // digitalWrite pin 13 HIGH
        assert_eq!(encode_frame(1, 13, Some(1)), b"010d01\r\n".to_vec());
    }

    #[test]
    fn test_encode_without_value() {
        // digitalRead pin 7
        assert_eq!(encode_frame(2, 7, None), b"0207\r\n".to_vec());
    }

    #[test]
    fn test_round_trip() {
        for &(cmd, pin, value) in &[(0u8, 0u8, Some(2u8)), (1, 13, Some(1)), (4, 255, None)] {
            let mut wire = encode_frame(cmd, pin, value);
            wire.truncate(wire.len() - 2);
            let frame = decode_line(&wire).unwrap();
            assert_eq!(frame.opcode, cmd);
            assert_eq!(frame.payload[0], pin);
            assert_eq!(frame.payload.get(1).copied(), value);
        }
    }

    #[test]
    fn test_decode_case_insensitive() {
        let lower = decode_line(b"0a0bff").unwrap();
        let upper = decode_line(b"0A0BFF").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.opcode, 0x0A);
        assert_eq!(lower.payload, vec![0x0B, 0xFF]);
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(matches!(
            decode_line(b""),
            Err(LinkError::MalformedFrame(_))
        ));
        assert!(matches!(
            decode_line(b"zz"),
            Err(LinkError::MalformedFrame(_))
        ));
        // Odd number of hex digits
        assert!(matches!(
            decode_line(b"012"),
            Err(LinkError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_framer_splits_lines() {
        let mut framer = LineFramer::new();
        framer.push(b"0005");
        assert!(framer.next_frame().is_none());
        framer.push(b"01\r\n0107");
        let frame = framer.next_frame().unwrap().unwrap();
        assert_eq!(frame.opcode, 0);
        assert_eq!(frame.payload, vec![0x05, 0x01]);
        // Second line is still incomplete
        assert!(framer.next_frame().is_none());
        framer.push(b"00\r\n");
        let frame = framer.next_frame().unwrap().unwrap();
        assert_eq!(frame.opcode, 1);
        assert_eq!(frame.payload, vec![0x07, 0x00]);
    }

    #[test]
    fn test_framer_tolerates_bare_newline() {
        let mut framer = LineFramer::new();
        framer.push(b"0102\n");
        let frame = framer.next_frame().unwrap().unwrap();
        assert_eq!(frame.opcode, 1);
    }

    #[test]
    fn test_framer_reports_malformed_line_and_recovers() {
        let mut framer = LineFramer::new();
        framer.push(b"not-hex\r\n0203\r\n");
        assert!(matches!(
            framer.next_frame(),
            Some(Err(LinkError::MalformedFrame(_)))
        ));
        let frame = framer.next_frame().unwrap().unwrap();
        assert_eq!(frame.opcode, 2);
        assert_eq!(frame.payload, vec![3]);
    }
}
