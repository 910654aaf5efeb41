//! Startup handshake.
//!
//! Drives `Closed → Opening → AwaitingVersion → {Ready | Disabled}`:
//! open the port, pulse DTR to reset the controller, then wait for the
//! `start` frame carrying the firmware version.  An exact version match
//! yields a ready link; a mismatch, a transport failure, or silence
//! disables the link.  Both outcomes are terminal — recovery means
//! calling `connect` again.

use crate::link::codec::LineFramer;
use crate::link::error::LinkError;
use crate::link::session::{spawn_runner, DisableHook, LinkHandle};
use crate::link::transport::SerialTransport;
use crate::link::types::*;
use std::sync::Arc;
use tokio::time::Duration;

/// Open the transport, run the handshake, and spawn the link task.
///
/// `on_disable` is invoked once with a human-readable reason whenever the
/// link becomes non-functional — here during the handshake, or later when
/// the running link hits a fatal transport error.
pub async fn connect(
    transport: Arc<dyn SerialTransport>,
    config: LinkConfig,
    on_disable: DisableHook,
) -> Result<LinkHandle, LinkError> {
    let port = transport.port_name().to_string();
    let mut state = LinkState::Opening;
    log::info!("{}: opening serial port at {} baud", port, config.baud_rate);

    if let Err(e) = transport.open(&config).await {
        log::debug!("{}: {:?} -> {:?}", port, state, LinkState::Disabled);
        let err = LinkError::TransportOpen(e);
        on_disable(&err.to_string());
        return Err(err);
    }

    // Pulse DTR to reset the controller.  Deassertion happens in the
    // background so we are already listening when the firmware boots.
    let _ = transport.set_dtr(true).await;
    {
        let transport = transport.clone();
        let pulse = Duration::from_millis(config.reset_pulse_ms);
        tokio::spawn(async move {
            tokio::time::sleep(pulse).await;
            let _ = transport.set_dtr(false).await;
        });
    }

    log::debug!("{}: {:?} -> {:?}", port, state, LinkState::AwaitingVersion);
    state = LinkState::AwaitingVersion;
    let mut framer = LineFramer::new();
    let wait = Duration::from_millis(config.handshake_timeout_ms);
    let version = match tokio::time::timeout(wait, await_start_frame(&transport, &mut framer)).await
    {
        Ok(Ok(version)) => version,
        Ok(Err(read_error)) => {
            log::debug!("{}: {:?} -> {:?}", port, state, LinkState::Disabled);
            let _ = transport.close().await;
            on_disable(&format!("Serial port error: {}", read_error));
            return Err(LinkError::LinkClosed);
        }
        Err(_) => {
            log::debug!("{}: {:?} -> {:?}", port, state, LinkState::Disabled);
            let err = LinkError::HandshakeTimeout {
                secs: config.handshake_timeout_ms / 1000,
            };
            let _ = transport.close().await;
            on_disable(&err.to_string());
            return Err(err);
        }
    };

    if version != config.expected_version {
        log::debug!("{}: {:?} -> {:?}", port, state, LinkState::Disabled);
        let err = LinkError::VersionMismatch {
            expected: config.expected_version.clone(),
            actual: version,
        };
        let _ = transport.close().await;
        on_disable(&err.to_string());
        return Err(err);
    }

    log::debug!("{}: {:?} -> {:?}", port, state, LinkState::Ready);
    log::info!("{}: firmware '{}' accepted, link ready", port, version);
    Ok(spawn_runner(transport, config, framer, on_disable))
}

/// Read frames until the first `start` frame and return its version string.
///
/// Frames with other opcodes during the wait are leftovers from before the
/// reset and are skipped.  Bytes that arrive after the start frame stay in
/// the framer and carry over to the link task.
async fn await_start_frame(
    transport: &Arc<dyn SerialTransport>,
    framer: &mut LineFramer,
) -> Result<String, String> {
    let mut read_buf = [0u8; 256];
    loop {
        let n = transport.read(&mut read_buf).await?;
        if n == 0 {
            continue;
        }
        framer.push(&read_buf[..n]);
        while let Some(result) = framer.next_frame() {
            match result {
                Ok(frame) if frame.opcode == EVENT_START => {
                    return Ok(String::from_utf8_lossy(&frame.payload).into_owned());
                }
                Ok(frame) => {
                    log::debug!(
                        "{}: skipping pre-handshake frame with opcode {}",
                        transport.port_name(),
                        frame.opcode
                    );
                }
                Err(e) => {
                    log::warn!("{}: dropped line: {}", transport.port_name(), e);
                }
            }
        }
    }
}
