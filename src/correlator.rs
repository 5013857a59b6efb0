//! # RESPONSE CORRELATOR
//!
//! A map from conversation-id to a pending [`oneshot::Sender`], guarded so that
//! insertion (from any number of sender threads), completion (from the single
//! receive loop), and shutdown (from teardown) are mutually atomic.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::message::{ErrorRecord, Message};

enum State {
    Open(HashMap<u64, oneshot::Sender<Message>>),
    ShutDown,
}

/// ## CORRELATOR
pub struct Correlator {
    state: Mutex<State>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::Open(HashMap::new())),
        }
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pending entry and returns the receiving half. A duplicate
    /// `conversation_id` or an `add` after `shutdown()` is a programmer error
    /// (conversation ids are allocated by the engine and never reused) and is
    /// therefore fatal.
    pub fn add(&self, conversation_id: u64) -> oneshot::Receiver<Message> {
        let mut guard = self.state.lock().unwrap();
        match &mut *guard {
            State::Open(map) => {
                let (tx, rx) = oneshot::channel();
                if map.insert(conversation_id, tx).is_some() {
                    panic!("conversation id {conversation_id} registered twice");
                }
                rx
            }
            State::ShutDown => panic!("correlator used after shutdown"),
        }
    }

    /// Resolves and removes a pending entry. Returns `false` (and logs) if no
    /// entry was registered for `conversation_id` — an unmatched response is
    /// not a protocol violation, just noise to drop.
    pub fn complete(&self, conversation_id: u64, message: Message) -> bool {
        let mut guard = self.state.lock().unwrap();
        match &mut *guard {
            State::Open(map) => match map.remove(&conversation_id) {
                Some(tx) => {
                    // The receiver may already be gone (e.g. the caller timed
                    // out and dropped it); that is harmless, not an error.
                    let _ = tx.send(message);
                    true
                }
                None => {
                    tracing::warn!(conversation_id, "unmatched response, dropping");
                    false
                }
            },
            State::ShutDown => false,
        }
    }

    /// Removes a pending entry without completing it, used when a caller's
    /// per-request deadline elapses: the conversation id is
    /// burned, and any response that arrives afterward is simply unmatched.
    pub fn remove(&self, conversation_id: u64) {
        let mut guard = self.state.lock().unwrap();
        if let State::Open(map) = &mut *guard {
            map.remove(&conversation_id);
        }
    }

    /// Marks the correlator terminal and fails every remaining pending entry
    /// with a synthetic transport error. Idempotent: a second call is a no-op.
    pub fn shutdown(&self) {
        let mut guard = self.state.lock().unwrap();
        let previous = std::mem::replace(&mut *guard, State::ShutDown);
        if let State::Open(map) = previous {
            for (conversation_id, tx) in map {
                let _ = tx.send(Message::Error(ErrorRecord::transport_closed()));
                tracing::debug!(conversation_id, "failed pending request at shutdown");
            }
        }
    }
}
