//! Serial port transport abstraction.
//!
//! Provides a platform-agnostic wrapper around OS-level serial port I/O:
//! byte-level read/write plus the DTR control line used to reset the
//! controller before the handshake.  The actual platform back-end is
//! injected by the host via the `SerialTransport` trait; an in-memory
//! implementation is provided for tests and offline use.

use crate::link::types::LinkConfig;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Transport trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Platform-agnostic serial port transport.
///
/// Implementations must be `Send + Sync` so they can be held behind an
/// `Arc` and used from the link task and the host side alike.  Errors are
/// plain strings; the link layer wraps them into its typed error taxonomy.
#[async_trait::async_trait]
pub trait SerialTransport: Send + Sync {
    /// Open the port with the given configuration.  Fails if already open.
    async fn open(&self, config: &LinkConfig) -> Result<(), String>;

    /// Close the port.
    async fn close(&self) -> Result<(), String>;

    /// Read up to `buf.len()` bytes into `buf`.  Returns number of bytes read.
    async fn read(&self, buf: &mut [u8]) -> Result<usize, String>;

    /// Write all bytes in `buf`.
    async fn write(&self, buf: &[u8]) -> Result<usize, String>;

    /// Set DTR (Data Terminal Ready), used to pulse the controller reset.
    async fn set_dtr(&self, state: bool) -> Result<(), String>;

    /// Check whether the port is open.
    fn is_open(&self) -> bool;

    /// Retrieve the port name.
    fn port_name(&self) -> &str;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Simulated transport (for testing & offline use)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A fully in-memory transport useful for unit tests.
pub struct SimulatedTransport {
    name: String,
    open: AtomicBool,
    dtr: AtomicBool,
    faulted: AtomicBool,
    rx_buf: Mutex<VecDeque<u8>>,
    tx_buf: Mutex<VecDeque<u8>>,
    rx_notify: Notify,
}

impl SimulatedTransport {
    /// Create a new simulated transport for the given port name.
    pub fn new(port_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: port_name.into(),
            open: AtomicBool::new(false),
            dtr: AtomicBool::new(false),
            faulted: AtomicBool::new(false),
            rx_buf: Mutex::new(VecDeque::with_capacity(4096)),
            tx_buf: Mutex::new(VecDeque::with_capacity(4096)),
            rx_notify: Notify::new(),
        })
    }

    /// Inject bytes into the receive buffer (simulate incoming data).
    pub async fn inject_rx(&self, data: &[u8]) {
        let mut buf = self.rx_buf.lock().await;
        buf.extend(data);
        self.rx_notify.notify_waiters();
    }

    /// Drain all bytes from the transmit buffer (for test assertions).
    pub async fn drain_tx(&self) -> Vec<u8> {
        let mut buf = self.tx_buf.lock().await;
        buf.drain(..).collect()
    }

    /// Peek at the transmit buffer contents without draining.
    pub async fn peek_tx(&self) -> Vec<u8> {
        let buf = self.tx_buf.lock().await;
        buf.iter().copied().collect()
    }

    /// Simulate a port fault: all subsequent reads and writes fail.
    pub fn set_faulted(&self, faulted: bool) {
        self.faulted.store(faulted, Ordering::SeqCst);
        self.rx_notify.notify_waiters();
    }

    /// Current DTR line state.
    pub fn dtr_state(&self) -> bool {
        self.dtr.load(Ordering::SeqCst)
    }

    fn check_usable(&self) -> Result<(), String> {
        if !self.open.load(Ordering::SeqCst) {
            return Err("Port not open".to_string());
        }
        if self.faulted.load(Ordering::SeqCst) {
            return Err(format!("Port {} I/O error", self.name));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SerialTransport for SimulatedTransport {
    async fn open(&self, _config: &LinkConfig) -> Result<(), String> {
        if self.open.swap(true, Ordering::SeqCst) {
            return Err(format!("Port {} already open", self.name));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), String> {
        self.open.store(false, Ordering::SeqCst);
        self.dtr.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, String> {
        self.check_usable()?;
        let mut rx = self.rx_buf.lock().await;
        if rx.is_empty() {
            drop(rx);
            // Wait for data with a short timeout
            tokio::select! {
                _ = self.rx_notify.notified() => {},
                _ = tokio::time::sleep(tokio::time::Duration::from_millis(50)) => {},
            }
            self.check_usable()?;
            rx = self.rx_buf.lock().await;
        }
        let count = buf.len().min(rx.len());
        for b in buf.iter_mut().take(count) {
            *b = rx.pop_front().unwrap();
        }
        Ok(count)
    }

    async fn write(&self, buf: &[u8]) -> Result<usize, String> {
        self.check_usable()?;
        let mut tx = self.tx_buf.lock().await;
        tx.extend(buf);
        Ok(buf.len())
    }

    async fn set_dtr(&self, state: bool) -> Result<(), String> {
        self.dtr.store(state, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}
