//! # Arduino Link – Serial room-controller driver
//!
//! Host-side driver for Arduino-based room controllers speaking a minimal
//! binary command/event protocol over a serial link:
//!
//! - **Transport** – abstracted read/write over a serial port with DTR
//!   control, injected by the host via the `SerialTransport` trait
//! - **Framing** – frames are hex-encoded ASCII lines terminated by `\r\n`;
//!   one opcode byte followed by opcode-specific payload bytes
//! - **Handshake** – DTR reset pulse, then a `start` frame carrying the
//!   firmware version, validated against the expected protocol version
//! - **Command Dispatch** – serialized writes, plus request/response
//!   correlation over ephemeral opcodes with bounded waits
//! - **Event Routing** – decoded frames fan out to per-opcode subscribers
//! - **Switch Debouncing** – raw pin-change events become toggle actions
//!   under configurable wiring and behavior modes

pub mod link;
