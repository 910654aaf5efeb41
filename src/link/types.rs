//! Shared types for the Arduino link crate.
//!
//! Covers protocol opcodes, pin semantics, link configuration,
//! physical-switch settings, and link lifecycle state.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Protocol constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Firmware identifier the controller must report during the handshake.
pub const PROTOCOL_VERSION: &str = "arduino:serial 0.0.1";

/// Incoming opcode: handshake frame carrying the firmware version string.
pub const EVENT_START: u8 = 0;

/// Incoming opcode: pin-change notification, payload `[pin, level]`.
pub const EVENT_PIN_CHANGE: u8 = 1;

/// First opcode usable as a request/response correlation code.
/// Values below this are reserved for protocol-level events.
pub const CORRELATION_MIN: u8 = 10;

/// Last opcode usable as a correlation code.
pub const CORRELATION_MAX: u8 = 255;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Commands and pin semantics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outgoing command opcodes understood by the controller firmware.
///
/// Sensor-read opcodes occupy the 50+ sub-range so they never collide
/// with correlation codes echoed back as response opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    PinMode,
    DigitalWrite,
    DigitalRead,
    AnalogWrite,
    AnalogRead,
    ListenPin,
    Dht11,
    Dht21,
    Dht22,
}

impl Command {
    /// Wire opcode for this command.
    pub fn opcode(self) -> u8 {
        match self {
            Self::PinMode => 0,
            Self::DigitalWrite => 1,
            Self::DigitalRead => 2,
            Self::AnalogWrite => 3,
            Self::AnalogRead => 4,
            Self::ListenPin => 5,
            Self::Dht11 => 50,
            Self::Dht21 => 51,
            Self::Dht22 => 52,
        }
    }
}

/// Electrical mode of a controller pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinMode {
    Input,
    Output,
    InputPullup,
}

impl PinMode {
    /// Wire value of the mode.
    pub fn value(self) -> u8 {
        match self {
            Self::Input => 0,
            Self::Output => 1,
            Self::InputPullup => 2,
        }
    }
}

/// Binary level of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinState {
    Low,
    High,
}

impl PinState {
    /// Wire value of the level.
    pub fn value(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Frames
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One decoded protocol message: opcode plus opcode-specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub payload: Vec<u8>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Link configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for one controller link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Serial port name (`COM3`, `/dev/ttyUSB0`, ...).
    pub port_name: String,
    /// Baud rate in bits per second.
    pub baud_rate: u32,
    /// Firmware identifier expected in the `start` frame.
    pub expected_version: String,
    /// How long to wait for the `start` frame before giving up.
    pub handshake_timeout_ms: u64,
    /// How long a correlated request may wait for its response.
    pub response_timeout_ms: u64,
    /// How long DTR is asserted to reset the controller before listening.
    pub reset_pulse_ms: u64,
    /// Poll interval of the read loop.
    pub read_interval_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 9600,
            expected_version: PROTOCOL_VERSION.to_string(),
            handshake_timeout_ms: 5_000,
            response_timeout_ms: 5_000,
            reset_pulse_ms: 500,
            read_interval_ms: 10,
        }
    }
}

impl LinkConfig {
    /// Config for the given port with all defaults.
    pub fn for_port(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Link state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lifecycle state of a link. `Ready` and `Disabled` are terminal;
/// recovery means constructing a new link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    Closed,
    Opening,
    AwaitingVersion,
    Ready,
    Disabled,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Physical switch settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How presses of a momentary switch are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MomentaryBehavior {
    /// Every press toggles the device.
    TogglePress,
    /// Device is on exactly while the switch is held.
    HoldToOn,
    /// Press toggles; releasing a long hold (>300ms) toggles back off.
    Hybrid,
}

/// Wiring/behavior mode of a physical switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "behavior")]
pub enum SwitchMode {
    /// Latching switch: any settled edge is a toggle.
    Toggle,
    /// Spring-return switch with the given press semantics.
    Momentary(MomentaryBehavior),
}

/// Settings of one physical switch input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchSettings {
    /// Controller pin the switch is wired to.
    pub pin: u8,
    /// Invert the raw level (switch wired to VCC instead of GND).
    pub invert: bool,
    /// Enable the controller's internal pull-up on the pin.
    pub pullup: bool,
    /// Wiring/behavior mode.
    pub mode: SwitchMode,
}

impl Default for SwitchSettings {
    fn default() -> Self {
        Self {
            pin: 0,
            invert: false,
            pullup: true,
            mode: SwitchMode::Toggle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_opcodes() {
        assert_eq!(Command::PinMode.opcode(), 0);
        assert_eq!(Command::ListenPin.opcode(), 5);
        assert_eq!(Command::Dht11.opcode(), 50);
        assert_eq!(Command::Dht22.opcode(), 52);
        // Sensor opcodes stay above the reserved event range but are
        // distinct from every value a correlation-less command uses.
        assert!(Command::Dht11.opcode() >= 50);
    }

    #[test]
    fn test_config_defaults() {
        let cfg = LinkConfig::for_port("/dev/ttyUSB0");
        assert_eq!(cfg.port_name, "/dev/ttyUSB0");
        assert_eq!(cfg.baud_rate, 9600);
        assert_eq!(cfg.expected_version, PROTOCOL_VERSION);
        assert_eq!(cfg.handshake_timeout_ms, 5_000);
        assert_eq!(cfg.reset_pulse_ms, 500);
    }

    #[test]
    fn test_switch_settings_serde() {
        let settings = SwitchSettings {
            pin: 7,
            invert: false,
            pullup: true,
            mode: SwitchMode::Momentary(MomentaryBehavior::Hybrid),
        };
        let json = serde_json::to_string(&settings).unwrap();
        let back: SwitchSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pin, 7);
        assert_eq!(back.mode, SwitchMode::Momentary(MomentaryBehavior::Hybrid));
    }
}
