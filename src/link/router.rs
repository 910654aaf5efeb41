//! Event router: per-opcode callback registry.
//!
//! Decoded frames fan out to callbacks registered for their opcode, in
//! registration order.  Registrations are identified by tokens so a
//! specific one can be removed later (one-shot correlated responses and
//! switch disposal both rely on this).

use crate::link::types::Frame;
use std::collections::HashMap;

/// Callback invoked with the payload of a dispatched frame.
pub type EventCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Identifies one registration so it can be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

/// Registry mapping opcodes to ordered callback lists.
#[derive(Default)]
pub struct EventRouter {
    listeners: HashMap<u8, Vec<(SubscriptionToken, EventCallback)>>,
    next_token: u64,
}

impl EventRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for an opcode.  Returns its removal token.
    pub fn subscribe(&mut self, opcode: u8, callback: EventCallback) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token);
        self.next_token += 1;
        self.listeners
            .entry(opcode)
            .or_default()
            .push((token, callback));
        token
    }

    /// Remove one registration.  Returns whether it was present.
    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        let mut removed = false;
        let mut emptied = None;
        for (&opcode, list) in self.listeners.iter_mut() {
            if let Some(idx) = list.iter().position(|(t, _)| *t == token) {
                list.remove(idx);
                removed = true;
                if list.is_empty() {
                    emptied = Some(opcode);
                }
                break;
            }
        }
        if let Some(opcode) = emptied {
            self.listeners.remove(&opcode);
        }
        removed
    }

    /// Invoke every callback registered for the frame's opcode, in
    /// registration order.  An unregistered opcode is a no-op.
    pub fn dispatch(&mut self, frame: &Frame) {
        if let Some(list) = self.listeners.get_mut(&frame.opcode) {
            for (_, callback) in list.iter_mut() {
                callback(&frame.payload);
            }
        }
    }

    /// Number of callbacks registered for an opcode.
    pub fn listener_count(&self, opcode: u8) -> usize {
        self.listeners.get(&opcode).map_or(0, Vec::len)
    }
}
