//! Link session: serialized command dispatch and event processing.
//!
//! Each ready link is one background task owning the transport, the line
//! framer, the event router, and the table of pending correlated requests.
//! Commands arrive over an mpsc channel and incoming frames are processed
//! one at a time, in arrival order, so writes are never concurrent and the
//! debounce/router callbacks stay confined to this task.

use crate::link::codec::{encode_frame, LineFramer};
use crate::link::error::LinkError;
use crate::link::router::{EventCallback, EventRouter, SubscriptionToken};
use crate::link::transport::SerialTransport;
use crate::link::types::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant};

/// How often the runner sweeps the pending table for expired requests.
const SWEEP_INTERVAL_MS: u64 = 100;

/// Hook invoked once with a human-readable reason when the link becomes
/// non-functional.  The owner decides on messaging and restart policy.
pub type DisableHook = Arc<dyn Fn(&str) + Send + Sync>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Link commands (handle → runner)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Commands that can be sent to a running link task.
pub enum LinkCommand {
    /// Encode and write one command frame.
    Send {
        command: Command,
        pin: u8,
        value: Option<u8>,
        done: oneshot::Sender<Result<(), LinkError>>,
    },
    /// Write a command frame carrying a fresh correlation code and resolve
    /// the reply with the matching response payload.
    Request {
        command: Command,
        pin: u8,
        reply: oneshot::Sender<Result<Vec<u8>, LinkError>>,
    },
    /// Register an event callback for an opcode.
    Subscribe {
        opcode: u8,
        callback: EventCallback,
        reply: oneshot::Sender<SubscriptionToken>,
    },
    /// Remove a previously registered callback.
    Unsubscribe { token: SubscriptionToken },
    /// Shut the link down, resolving all pending requests with `LinkClosed`.
    Disconnect,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Link handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handle to a ready link.  Cheap to clone; all clones talk to the same
/// background task.
#[derive(Clone)]
pub struct LinkHandle {
    transport: Arc<dyn SerialTransport>,
    cmd_tx: mpsc::Sender<LinkCommand>,
    connected: Arc<AtomicBool>,
}

impl LinkHandle {
    /// Send a command to the controller.
    ///
    /// The value byte is omitted from the frame for read-only commands.
    /// Resolves once the write completed; writes are serialized by the
    /// link task so at most one is in flight at a time.
    pub async fn send(
        &self,
        command: Command,
        pin: u8,
        value: Option<u8>,
    ) -> Result<(), LinkError> {
        let (done, done_rx) = oneshot::channel();
        self.cmd_tx
            .send(LinkCommand::Send {
                command,
                pin,
                value,
                done,
            })
            .await
            .map_err(|_| LinkError::LinkClosed)?;
        done_rx.await.map_err(|_| LinkError::LinkClosed)?
    }

    /// Send a command and wait for the correlated response payload.
    ///
    /// The wait is bounded by `LinkConfig::response_timeout_ms`; expiry
    /// yields `ResponseTimeout` and frees the correlation code.
    pub async fn send_with_response(&self, command: Command, pin: u8) -> Result<Vec<u8>, LinkError> {
        let (reply, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(LinkCommand::Request {
                command,
                pin,
                reply,
            })
            .await
            .map_err(|_| LinkError::LinkClosed)?;
        reply_rx.await.map_err(|_| LinkError::LinkClosed)?
    }

    /// Register a callback for incoming frames with the given opcode.
    pub async fn subscribe(
        &self,
        opcode: u8,
        callback: EventCallback,
    ) -> Result<SubscriptionToken, LinkError> {
        let (reply, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(LinkCommand::Subscribe {
                opcode,
                callback,
                reply,
            })
            .await
            .map_err(|_| LinkError::LinkClosed)?;
        reply_rx.await.map_err(|_| LinkError::LinkClosed)
    }

    /// Remove a previously registered callback.
    pub async fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), LinkError> {
        self.cmd_tx
            .send(LinkCommand::Unsubscribe { token })
            .await
            .map_err(|_| LinkError::LinkClosed)
    }

    /// Shut the link down.  All pending correlated requests are resolved
    /// with `LinkClosed` and the transport is closed.
    pub async fn dispose(&self) {
        let _ = self.cmd_tx.send(LinkCommand::Disconnect).await;
    }

    /// Whether the link task is still running.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Lifecycle state as seen through this handle.  A handle only exists
    /// past the handshake, so this is `Ready` until the link goes down.
    pub fn state(&self) -> LinkState {
        if self.is_connected() {
            LinkState::Ready
        } else {
            LinkState::Disabled
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<dyn SerialTransport> {
        &self.transport
    }

    /// Name of the serial port behind this link.
    pub fn port_name(&self) -> &str {
        self.transport.port_name()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Link runner (async task)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A correlated request awaiting its response frame.
struct PendingRequest {
    reply: oneshot::Sender<Result<Vec<u8>, LinkError>>,
    deadline: Instant,
}

/// Internal state for the link task.
struct LinkRunner {
    transport: Arc<dyn SerialTransport>,
    config: LinkConfig,
    framer: LineFramer,
    router: EventRouter,
    pending: HashMap<u8, PendingRequest>,
    next_code: u8,
    connected: Arc<AtomicBool>,
    on_disable: DisableHook,
}

impl LinkRunner {
    /// Main link loop.
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<LinkCommand>) {
        let mut read_buf = vec![0u8; 256];
        let read_interval = Duration::from_millis(self.config.read_interval_ms.max(1));
        let mut sweep = tokio::time::interval(Duration::from_millis(SWEEP_INTERVAL_MS));
        let mut fatal: Option<String> = None;

        // Frames buffered during the handshake may already be complete.
        self.process_frames();

        loop {
            tokio::select! {
                // Read data from the port
                _ = tokio::time::sleep(read_interval) => {
                    match self.transport.read(&mut read_buf).await {
                        Ok(0) => {},
                        Ok(n) => {
                            self.framer.push(&read_buf[..n]);
                            self.process_frames();
                        }
                        Err(e) => {
                            fatal = Some(format!("Serial port error: {}", e));
                            break;
                        }
                    }
                }

                // Process commands from the handles
                cmd = cmd_rx.recv() => {
                    match cmd {
                        None | Some(LinkCommand::Disconnect) => break,
                        Some(LinkCommand::Send { command, pin, value, done }) => {
                            let result = self.write_frame(command.opcode(), pin, value).await;
                            if let Err(LinkError::Write(ref msg)) = result {
                                fatal = Some(msg.clone());
                            }
                            let _ = done.send(result);
                            if fatal.is_some() {
                                break;
                            }
                        }
                        Some(LinkCommand::Request { command, pin, reply }) => {
                            if let Err(msg) = self.handle_request(command, pin, reply).await {
                                fatal = Some(msg);
                                break;
                            }
                        }
                        Some(LinkCommand::Subscribe { opcode, callback, reply }) => {
                            let token = self.router.subscribe(opcode, callback);
                            let _ = reply.send(token);
                        }
                        Some(LinkCommand::Unsubscribe { token }) => {
                            self.router.unsubscribe(token);
                        }
                    }
                }

                // Periodic pending-request expiry
                _ = sweep.tick() => {
                    self.sweep_expired();
                }
            }
        }

        self.shutdown(fatal).await;
    }

    /// Encode and write one frame.
    async fn write_frame(&mut self, opcode: u8, pin: u8, value: Option<u8>) -> Result<(), LinkError> {
        let line = encode_frame(opcode, pin, value);
        log::debug!(
            "{}: sending command {} pin {} value {:?}",
            self.transport.port_name(),
            opcode,
            pin,
            value
        );
        self.transport
            .write(&line)
            .await
            .map(|_| ())
            .map_err(LinkError::Write)
    }

    /// Allocate a correlation code and send a correlated request.
    ///
    /// Returns `Err(reason)` only for write failures, which are fatal to
    /// the link; allocation failures resolve the caller and keep the link
    /// up.
    async fn handle_request(
        &mut self,
        command: Command,
        pin: u8,
        reply: oneshot::Sender<Result<Vec<u8>, LinkError>>,
    ) -> Result<(), String> {
        let code = match self.allocate_code() {
            Ok(code) => code,
            Err(e) => {
                let _ = reply.send(Err(e));
                return Ok(());
            }
        };
        match self.write_frame(command.opcode(), pin, Some(code)).await {
            Ok(()) => {
                let deadline =
                    Instant::now() + Duration::from_millis(self.config.response_timeout_ms);
                self.pending.insert(code, PendingRequest { reply, deadline });
                Ok(())
            }
            Err(LinkError::Write(msg)) => {
                let _ = reply.send(Err(LinkError::Write(msg.clone())));
                Err(msg)
            }
            Err(other) => {
                let _ = reply.send(Err(other));
                Ok(())
            }
        }
    }

    /// Next free correlation code from the cyclic [10,255] range.
    ///
    /// Codes with a still-pending request are skipped; a fully busy table
    /// is rejected rather than silently reusing a live code.
    fn allocate_code(&mut self) -> Result<u8, LinkError> {
        let span = CORRELATION_MAX as usize - CORRELATION_MIN as usize + 1;
        for _ in 0..span {
            let code = self.next_code;
            self.next_code = if code == CORRELATION_MAX {
                CORRELATION_MIN
            } else {
                code + 1
            };
            if !self.pending.contains_key(&code) {
                return Ok(code);
            }
        }
        Err(LinkError::CorrelationExhausted)
    }

    /// Decode and route every complete buffered frame.
    fn process_frames(&mut self) {
        while let Some(result) = self.framer.next_frame() {
            match result {
                Ok(frame) => {
                    if frame.opcode == EVENT_START {
                        // The controller reset behind our back; a stale
                        // start frame is not actionable mid-session.
                        log::warn!(
                            "{}: unexpected start frame after handshake",
                            self.transport.port_name()
                        );
                        continue;
                    }
                    if let Some(pending) = self.pending.remove(&frame.opcode) {
                        let _ = pending.reply.send(Ok(frame.payload));
                    } else {
                        self.router.dispatch(&frame);
                    }
                }
                Err(e) => {
                    // Transient line noise: drop the line, keep the link.
                    log::warn!("{}: dropped line: {}", self.transport.port_name(), e);
                }
            }
        }
    }

    /// Resolve expired pending requests with `ResponseTimeout`.
    fn sweep_expired(&mut self) {
        let now = Instant::now();
        let expired: Vec<u8> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(code, _)| *code)
            .collect();
        for code in expired {
            if let Some(pending) = self.pending.remove(&code) {
                log::warn!(
                    "{}: request with correlation code {} timed out",
                    self.transport.port_name(),
                    code
                );
                let _ = pending.reply.send(Err(LinkError::ResponseTimeout));
            }
        }
    }

    /// Resolve everything outstanding, close the port, and report a fatal
    /// reason (if any) through the disable hook.
    async fn shutdown(mut self, fatal: Option<String>) {
        self.connected.store(false, Ordering::SeqCst);
        for (_, pending) in self.pending.drain() {
            let _ = pending.reply.send(Err(LinkError::LinkClosed));
        }
        if self.transport.is_open() {
            let _ = self.transport.close().await;
        }
        if let Some(reason) = fatal {
            log::warn!("{}: link disabled: {}", self.transport.port_name(), reason);
            (self.on_disable)(&reason);
        } else {
            log::info!("{}: link closed", self.transport.port_name());
        }
    }
}

/// Spawn the link task over an already-handshaken transport.
///
/// `framer` carries over bytes that arrived after the `start` frame.
pub(crate) fn spawn_runner(
    transport: Arc<dyn SerialTransport>,
    config: LinkConfig,
    framer: LineFramer,
    on_disable: DisableHook,
) -> LinkHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel::<LinkCommand>(64);
    let connected = Arc::new(AtomicBool::new(true));

    let runner = LinkRunner {
        transport: transport.clone(),
        config,
        framer,
        router: EventRouter::new(),
        pending: HashMap::new(),
        next_code: CORRELATION_MIN,
        connected: connected.clone(),
        on_disable,
    };
    tokio::spawn(runner.run(cmd_rx));

    LinkHandle {
        transport,
        cmd_tx,
        connected,
    }
}
