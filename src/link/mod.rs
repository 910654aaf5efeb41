//! Link crate: sub-modules.

pub mod types;
pub mod error;
pub mod codec;
pub mod transport;
pub mod router;
pub mod session;
pub mod handshake;
pub mod switch;
pub mod dht;

// Re-export top-level items for convenience.
pub use types::*;
pub use error::LinkError;
pub use session::LinkHandle;
pub use handshake::connect;
pub use switch::{PhysicalSwitch, SwitchDebouncer};
pub use dht::{DhtKind, DhtReading};
