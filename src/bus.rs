//! The message bus contract (spec §6) and a reference in-process
//! transport.
//!
//! The concrete transport is deliberately out of scope for the protocol
//! (spec §1): any request/response key-value bus satisfying the four
//! operations below suffices. [`LocalBus`] is the one this crate ships —
//! the direct generalization of how the teacher crate simulates the
//! network by routing values through `VirtualMachine` hash maps, except
//! wrapped in a proper trait and made safe to share across real OS threads
//! (spec §5's "each participant runs as an independent parallel
//! process/thread").

use crate::error::{Result, SmcError};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A participant's address on the bus.
pub type ParticipantId = String;

/// The message bus contract participants and the trusted dealer run
/// against (spec §6).
///
/// `send_private`/`read_private` model a private inbox, delivered
/// at-most-once per `(sender, recipient, label)`. `publish`/`read_public`
/// model a read-after-write-consistent public bulletin board: once a value
/// is posted under `(self, label)`, any later `read_public(self, label)`
/// returns it, and readers that arrive first block until it appears.
pub trait MessageBus: Send + Sync {
    /// Delivers `bytes` once to `to`'s private inbox under `label`.
    fn send_private(&self, from: &str, to: &str, label: &str, bytes: Vec<u8>) -> Result<()>;

    /// Blocks until a private message addressed to `to` under `label`
    /// exists, then returns its bytes.
    fn read_private(&self, to: &str, label: &str) -> Result<Vec<u8>>;

    /// Posts `bytes` on the public bulletin under `(from, label)`.
    fn publish(&self, from: &str, label: &str, bytes: Vec<u8>) -> Result<()>;

    /// Blocks until `(from, label)` exists on the public bulletin, then
    /// returns its bytes.
    fn read_public(&self, from: &str, label: &str) -> Result<Vec<u8>>;
}

#[derive(Default)]
struct Inner {
    private: HashMap<(String, String, String), Vec<u8>>,
    public: HashMap<(String, String), Vec<u8>>,
}

/// An in-process, thread-safe bus. Shared via `Arc<LocalBus>` between
/// participant threads and the dealer within a single session.
///
/// Blocking reads are implemented with a `Condvar`, woken on every write —
/// the idiomatic std-only realization of the "long-poll until the value
/// appears" contract spec §5 asks of the bus.
pub struct LocalBus {
    state: Mutex<Inner>,
    notify: Condvar,
    poll_timeout: Duration,
}

impl LocalBus {
    /// Creates an empty bus.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(Inner::default()),
            notify: Condvar::new(),
            poll_timeout: Duration::from_millis(50),
        })
    }

    fn block_until<F, R>(&self, mut poll: F) -> Result<R>
    where
        F: FnMut(&Inner) -> Option<R>,
    {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| SmcError::BusFailure("bus mutex poisoned".into()))?;
        loop {
            if let Some(value) = poll(&guard) {
                return Ok(value);
            }
            let (next_guard, _) = self
                .notify
                .wait_timeout(guard, self.poll_timeout)
                .map_err(|_| SmcError::BusFailure("bus mutex poisoned".into()))?;
            guard = next_guard;
        }
    }
}

impl Default for Arc<LocalBus> {
    fn default() -> Self {
        LocalBus::new()
    }
}

impl MessageBus for LocalBus {
    fn send_private(&self, from: &str, to: &str, label: &str, bytes: Vec<u8>) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| SmcError::BusFailure("bus mutex poisoned".into()))?;
        guard
            .private
            .insert((from.to_string(), to.to_string(), label.to_string()), bytes);
        drop(guard);
        self.notify.notify_all();
        Ok(())
    }

    fn read_private(&self, to: &str, label: &str) -> Result<Vec<u8>> {
        self.block_until(|inner| {
            inner
                .private
                .iter()
                .find(|((_, recipient, l), _)| recipient == to && l == label)
                .map(|(_, bytes)| bytes.clone())
        })
    }

    fn publish(&self, from: &str, label: &str, bytes: Vec<u8>) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| SmcError::BusFailure("bus mutex poisoned".into()))?;
        guard
            .public
            .insert((from.to_string(), label.to_string()), bytes);
        drop(guard);
        self.notify.notify_all();
        Ok(())
    }

    fn read_public(&self, from: &str, label: &str) -> Result<Vec<u8>> {
        let key = (from.to_string(), label.to_string());
        self.block_until(|inner| inner.public.get(&key).cloned())
    }
}
