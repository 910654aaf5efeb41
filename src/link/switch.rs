//! Physical switch input.
//!
//! Converts raw pin-change frames into toggle actions: a debounce window
//! filters contact bounce, and the configured wiring/behavior mode decides
//! which settled edges count as a toggle.  The state machine runs inside
//! the link task's event dispatch, so its timestamps are never touched from
//! more than one thread.

use crate::link::error::LinkError;
use crate::link::router::SubscriptionToken;
use crate::link::session::LinkHandle;
use crate::link::types::*;
use std::time::{Duration, Instant};

/// Minimum time between two raw edges before both count as distinct.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// A hybrid-mode press held longer than this toggles again on release.
pub const LONG_HOLD: Duration = Duration::from_millis(300);

/// Reports whether the owning device is currently on.
pub type StateHook = Box<dyn Fn() -> bool + Send>;

/// Invoked for each semantic toggle action.
pub type ToggleHook = Box<dyn FnMut() + Send>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Debounce state machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-switch debounce/interpretation state machine.
///
/// Pure and synchronous: `process` takes the event time explicitly so the
/// windowing rules can be tested without a clock.
#[derive(Debug)]
pub struct SwitchDebouncer {
    invert: bool,
    mode: SwitchMode,
    last_pin_change: Option<Instant>,
    last_press: Option<Instant>,
    last_release: Option<Instant>,
}

impl SwitchDebouncer {
    /// State machine for the given settings, with all timestamps at "never".
    pub fn new(settings: &SwitchSettings) -> Self {
        Self {
            invert: settings.invert,
            mode: settings.mode,
            last_pin_change: None,
            last_press: None,
            last_release: None,
        }
    }

    /// Feed one raw pin-change event.  Returns whether to toggle.
    ///
    /// `device_on` is the owning device's current state, consulted by the
    /// hold-to-on and hybrid modes.  The rule is evaluated against the
    /// timestamps as they were *before* this event; only then are they
    /// updated.
    pub fn process(&mut self, raw_level: u8, now: Instant, device_on: bool) -> bool {
        let pressed = (raw_level != 0) != self.invert;

        let fire = match self.mode {
            SwitchMode::Toggle => settled(self.last_pin_change, now),
            SwitchMode::Momentary(MomentaryBehavior::TogglePress) => {
                pressed && settled(self.last_press, now)
            }
            SwitchMode::Momentary(MomentaryBehavior::HoldToOn) => {
                let edge = if pressed {
                    self.last_press
                } else {
                    self.last_release
                };
                device_on != pressed && settled(edge, now)
            }
            SwitchMode::Momentary(MomentaryBehavior::Hybrid) => {
                if pressed {
                    settled(self.last_press, now)
                } else {
                    // Releasing a long hold toggles the device back off.
                    settled(self.last_release, now)
                        && device_on
                        && self
                            .last_press
                            .is_some_and(|press| now.saturating_duration_since(press) > LONG_HOLD)
                }
            }
        };

        self.last_pin_change = Some(now);
        if pressed {
            self.last_press = Some(now);
        } else {
            self.last_release = Some(now);
        }
        fire
    }
}

/// Whether the relevant previous edge is outside the debounce window.
fn settled(last: Option<Instant>, now: Instant) -> bool {
    last.map_or(true, |t| now.saturating_duration_since(t) >= DEBOUNCE_WINDOW)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Link attachment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A physical switch attached to a link.
///
/// Holds the pin-change subscription for the switch's pin; the debouncer
/// itself lives inside the subscription callback.
pub struct PhysicalSwitch {
    link: LinkHandle,
    settings: SwitchSettings,
    token: SubscriptionToken,
}

impl PhysicalSwitch {
    /// Subscribe the switch to its pin's change events.
    ///
    /// `is_on` reports the owning device's state; `on_toggle` is invoked
    /// for each semantic toggle.  Call `init` afterwards to configure the
    /// controller pin.
    pub async fn attach(
        link: &LinkHandle,
        settings: SwitchSettings,
        is_on: StateHook,
        mut on_toggle: ToggleHook,
    ) -> Result<Self, LinkError> {
        let pin = settings.pin;
        let mut debouncer = SwitchDebouncer::new(&settings);
        let token = link
            .subscribe(
                EVENT_PIN_CHANGE,
                Box::new(move |payload| {
                    // Payload is [pin, level]; other pins share the opcode.
                    if payload.len() < 2 || payload[0] != pin {
                        return;
                    }
                    if debouncer.process(payload[1], Instant::now(), is_on()) {
                        on_toggle();
                    }
                }),
            )
            .await?;
        Ok(Self {
            link: link.clone(),
            settings,
            token,
        })
    }

    /// Configure the controller pin and start change notifications.
    pub async fn init(&self) -> Result<(), LinkError> {
        let mode = if self.settings.pullup {
            PinMode::InputPullup
        } else {
            PinMode::Input
        };
        self.link
            .send(Command::PinMode, self.settings.pin, Some(mode.value()))
            .await?;
        self.link
            .send(Command::ListenPin, self.settings.pin, Some(1))
            .await
    }

    /// Stop change notifications and drop the subscription.
    pub async fn dispose(&self) -> Result<(), LinkError> {
        self.link
            .send(Command::ListenPin, self.settings.pin, Some(0))
            .await?;
        self.link.unsubscribe(self.token).await
    }

    /// The switch's settings.
    pub fn settings(&self) -> &SwitchSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::codec::LineFramer;
    use crate::link::session::spawn_runner;
    use crate::link::transport::{SerialTransport, SimulatedTransport};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    const MS: Duration = Duration::from_millis(1);

    fn debouncer(mode: SwitchMode, invert: bool) -> SwitchDebouncer {
        SwitchDebouncer::new(&SwitchSettings {
            pin: 3,
            invert,
            pullup: true,
            mode,
        })
    }

    #[test]
    fn test_toggle_debounces_within_window() {
        let mut d = debouncer(SwitchMode::Toggle, false);
        let base = Instant::now();
        assert!(d.process(1, base, false));
        // 50ms later: still bouncing, swallowed.
        assert!(!d.process(0, base + 50 * MS, true));
        // The swallowed edge still advanced lastPinChange, so the window
        // is measured from 50ms, not 0.
        assert!(d.process(1, base + 150 * MS, true));
    }

    #[test]
    fn test_toggle_fires_on_both_edges_when_settled() {
        let mut d = debouncer(SwitchMode::Toggle, false);
        let base = Instant::now();
        assert!(d.process(1, base, false));
        assert!(d.process(0, base + 150 * MS, true));
    }

    #[test]
    fn test_toggle_press_ignores_release() {
        let mut d = debouncer(
            SwitchMode::Momentary(MomentaryBehavior::TogglePress),
            false,
        );
        let base = Instant::now();
        assert!(d.process(1, base, false));
        assert!(!d.process(0, base + 30 * MS, true));
        // Second press within 100ms of the first press: bounce.
        assert!(!d.process(1, base + 60 * MS, true));
        assert!(!d.process(0, base + 90 * MS, true));
        // Settled press, measured against the bounce press at 60ms.
        assert!(d.process(1, base + 200 * MS, true));
    }

    #[test]
    fn test_hold_to_on_tracks_level() {
        let mut d = debouncer(SwitchMode::Momentary(MomentaryBehavior::HoldToOn), false);
        let base = Instant::now();
        // Device off, switch pressed: turn on.
        assert!(d.process(1, base, false));
        // Device on, still pressed (bounce): states agree, nothing to do.
        assert!(!d.process(1, base + 150 * MS, true));
        // Device on, released: turn off.
        assert!(d.process(0, base + 300 * MS, true));
        // Release bounce within the window.
        assert!(!d.process(0, base + 350 * MS, false));
    }

    #[test]
    fn test_hybrid_long_hold_toggles_twice() {
        let mut d = debouncer(SwitchMode::Momentary(MomentaryBehavior::Hybrid), false);
        let base = Instant::now();
        // Press: toggle on.
        assert!(d.process(1, base, false));
        // Release after 400ms while the device is on: toggle off too.
        assert!(d.process(0, base + 400 * MS, true));
    }

    #[test]
    fn test_hybrid_short_press_toggles_once() {
        let mut d = debouncer(SwitchMode::Momentary(MomentaryBehavior::Hybrid), false);
        let base = Instant::now();
        assert!(d.process(1, base, false));
        // Release after 100ms: the press already toggled, do nothing.
        assert!(!d.process(0, base + 100 * MS, true));
    }

    #[test]
    fn test_hybrid_long_hold_release_needs_device_on() {
        let mut d = debouncer(SwitchMode::Momentary(MomentaryBehavior::Hybrid), false);
        let base = Instant::now();
        assert!(d.process(1, base, false));
        // Something else turned the device off during the hold.
        assert!(!d.process(0, base + 400 * MS, false));
    }

    #[test]
    fn test_invert_flips_pressed_level() {
        let mut d = debouncer(
            SwitchMode::Momentary(MomentaryBehavior::TogglePress),
            true,
        );
        let base = Instant::now();
        // Inverted wiring: raw low is a press.
        assert!(d.process(0, base, false));
        assert!(!d.process(1, base + 200 * MS, true));
    }

    async fn ready_link(port: &str) -> (Arc<SimulatedTransport>, LinkHandle) {
        let transport = SimulatedTransport::new(port);
        transport.open(&LinkConfig::default()).await.unwrap();
        let handle = spawn_runner(
            transport.clone() as Arc<dyn SerialTransport>,
            LinkConfig::for_port(port),
            LineFramer::new(),
            Arc::new(|_| {}),
        );
        (transport, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_attached_switch_toggles_only_for_its_pin() {
        let (transport, handle) = ready_link("COM1").await;
        let toggles = Arc::new(AtomicUsize::new(0));
        let device_on = Arc::new(AtomicBool::new(false));

        let sink = toggles.clone();
        let state = device_on.clone();
        let _switch = PhysicalSwitch::attach(
            &handle,
            SwitchSettings {
                pin: 7,
                ..SwitchSettings::default()
            },
            Box::new(move || state.load(Ordering::SeqCst)),
            Box::new(move || {
                sink.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await
        .unwrap();

        // Change on another pin, then on ours.
        transport.inject_rx(b"010501\r\n").await;
        transport.inject_rx(b"010701\r\n").await;
        while toggles.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(toggles.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_init_and_dispose_commands() {
        let (transport, handle) = ready_link("COM1").await;
        let switch = PhysicalSwitch::attach(
            &handle,
            SwitchSettings {
                pin: 7,
                pullup: true,
                ..SwitchSettings::default()
            },
            Box::new(|| false),
            Box::new(|| {}),
        )
        .await
        .unwrap();

        switch.init().await.unwrap();
        // pinMode(7, INPUT_PULLUP) then listenPin(7, on)
        assert_eq!(transport.drain_tx().await, b"000702\r\n050701\r\n".to_vec());

        switch.dispose().await.unwrap();
        assert_eq!(transport.drain_tx().await, b"050700\r\n".to_vec());
    }
}
