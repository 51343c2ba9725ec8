use super::{AdapterEvent, ReadyState};
use crate::{error::WalletError, event::EventEmitter, key::PublicKey};
use std::cell::Cell;

/// The bookkeeping shared by all adapters: readiness, account, in-flight
/// connect flag and the event channel.
///
/// Every state change publishes the matching [`AdapterEvent`], adapters only
/// have to call the right method at the right time.
#[derive(Debug)]
pub struct AdapterState {
    ready_state: Cell<ReadyState>,
    public_key: Cell<Option<PublicKey>>,
    connecting: Cell<bool>,
    events: EventEmitter<AdapterEvent>,
}

/// Clears the connecting flag when dropped, whichever way `connect` exits.
#[must_use = "the adapter stops being `connecting` as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ConnectGuard<'a>(&'a AdapterState);

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        self.0.connecting.set(false);
    }
}

impl AdapterState {
    pub fn new(ready_state: ReadyState) -> Self {
        Self {
            ready_state: Cell::new(ready_state),
            public_key: Cell::new(None),
            connecting: Cell::new(false),
            events: EventEmitter::new(),
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state.get()
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        self.public_key.get()
    }

    pub fn connecting(&self) -> bool {
        self.connecting.get()
    }

    pub fn connected(&self) -> bool {
        self.public_key.get().is_some()
    }

    pub fn events(&self) -> &EventEmitter<AdapterEvent> {
        &self.events
    }

    /// `Unsupported` is terminal, any other change is published.
    pub fn set_ready_state(&self, ready_state: ReadyState) {
        let current = self.ready_state.get();
        if current == ready_state {
            return;
        }
        if current == ReadyState::Unsupported {
            log::warn!("ignoring ready state change to {ready_state} of an unsupported wallet");
            return;
        }

        self.ready_state.set(ready_state);
        self.events
            .emit(&AdapterEvent::ReadyStateChange(ready_state));
    }

    /// Mark the start of a connection attempt.
    ///
    /// Returns `None` if the adapter is already connected or a connection is
    /// in flight: the caller must then return without doing anything.
    pub fn begin_connect(&self) -> Option<ConnectGuard<'_>> {
        if self.connected() || self.connecting.get() {
            return None;
        }
        self.connecting.set(true);
        Some(ConnectGuard(self))
    }

    /// Set (or change) the connected account.
    pub fn set_connected(&self, public_key: PublicKey) {
        if self.public_key.replace(Some(public_key)) == Some(public_key) {
            return;
        }
        self.events.emit(&AdapterEvent::Connect(public_key));
    }

    /// Forget the account, publishes `Disconnect` only if we had one.
    pub fn set_disconnected(&self) {
        if self.public_key.take().is_some() {
            self.events.emit(&AdapterEvent::Disconnect);
        }
    }

    /// Publish `error` and hand it back so it can be returned as well.
    pub fn fail(&self, error: WalletError) -> WalletError {
        self.report(error.clone());
        error
    }

    /// Publish `error` without failing the current operation.
    pub fn report(&self, error: WalletError) {
        self.events.emit(&AdapterEvent::Error(error));
    }
}
