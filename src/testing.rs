//! Scripted adapters for the unit tests.

use crate::{
    adapter::{Adapter, AdapterEvent, AdapterState, Capabilities, ReadyState, sign_and_send},
    error::{WalletError, WalletErrorKind},
    event::EventEmitter,
    key::{PublicKey, Signature},
    transaction::{Connection, SendOptions, Transaction},
};
use async_trait::async_trait;
use futures::channel::oneshot;
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

pub(crate) type Journal = Rc<RefCell<Vec<String>>>;

/// An adapter holding a real ed25519 keypair derived from its name.
pub(crate) struct MockAdapter {
    name: String,
    state: AdapterState,
    capabilities: Capabilities,
    keypair: [u8; 64],
    public_key: [u8; 32],
    connect_calls: Cell<u32>,
    disconnect_calls: Cell<u32>,
    silent_connects: Cell<u32>,
    pub fail_connect: Cell<bool>,
    pub fail_disconnect: Cell<bool>,
    gate: RefCell<Option<oneshot::Receiver<()>>>,
    journal: Journal,
}

impl MockAdapter {
    pub fn new(name: &str, ready_state: ReadyState) -> Self {
        let mut seed = [0u8; 32];
        for (byte, name_byte) in seed.iter_mut().zip(name.bytes()) {
            *byte = name_byte;
        }
        let (keypair, public_key) = cryptoxide::ed25519::keypair(&seed);

        Self {
            name: name.to_owned(),
            state: AdapterState::new(ready_state),
            capabilities: Capabilities::all(),
            keypair,
            public_key,
            connect_calls: Cell::new(0),
            disconnect_calls: Cell::new(0),
            silent_connects: Cell::new(0),
            fail_connect: Cell::new(false),
            fail_disconnect: Cell::new(false),
            gate: RefCell::new(None),
            journal: Journal::default(),
        }
    }

    pub fn installed(name: &str) -> Self {
        Self::new(name, ReadyState::Installed)
    }

    pub fn not_detected(name: &str) -> Self {
        Self::new(name, ReadyState::NotDetected)
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn key(&self) -> PublicKey {
        PublicKey::new(self.public_key)
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.get()
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.disconnect_calls.get()
    }

    /// connections started through `auto_connect`
    pub fn silent_connects(&self) -> u32 {
        self.silent_connects.get()
    }

    /// the next `connect` waits until the returned sender fires (or is
    /// dropped)
    pub fn hold_connect(&self) -> oneshot::Sender<()> {
        let (sender, receiver) = oneshot::channel();
        *self.gate.borrow_mut() = Some(receiver);
        sender
    }

    /// the user locked the wallet from the extension
    pub fn vendor_disconnect(&self) {
        self.state.set_disconnected();
    }

    pub fn set_ready_state(&self, ready_state: ReadyState) {
        self.state.set_ready_state(ready_state);
    }

    pub fn emit(&self, event: AdapterEvent) {
        self.state.events().emit(&event);
    }

    fn log(&self, operation: &str) {
        self.journal
            .borrow_mut()
            .push(format!("{}.{operation}", self.name));
    }

    fn require_connected(&self, kind: WalletErrorKind) -> Result<(), WalletError> {
        if self.state.connected() {
            Ok(())
        } else {
            Err(self.state.fail(WalletError::new(kind, "not connected")))
        }
    }

    fn sign(&self, transaction: &Transaction) -> Transaction {
        let signature = cryptoxide::ed25519::signature(transaction.as_bytes(), &self.keypair);
        let mut signed = signature.to_vec();
        signed.extend_from_slice(transaction.as_bytes());
        transaction.with_bytes(signed)
    }
}

#[async_trait(?Send)]
impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn icon(&self) -> &str {
        "data:image/svg+xml;base64,"
    }

    fn url(&self) -> &str {
        "https://example.com"
    }

    fn ready_state(&self) -> ReadyState {
        self.state.ready_state()
    }

    fn public_key(&self) -> Option<PublicKey> {
        self.state.public_key()
    }

    fn connecting(&self) -> bool {
        self.state.connecting()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn events(&self) -> &EventEmitter<AdapterEvent> {
        self.state.events()
    }

    async fn connect(&self) -> Result<(), WalletError> {
        let Some(_connecting) = self.state.begin_connect() else {
            return Ok(());
        };
        self.connect_calls.set(self.connect_calls.get() + 1);
        self.log("connect");

        let gate = self.gate.borrow_mut().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        if self.fail_connect.get() {
            return Err(self.state.fail(WalletError::new(
                WalletErrorKind::Connection,
                "User rejected the request.",
            )));
        }

        self.state.set_connected(self.key());
        Ok(())
    }

    async fn auto_connect(&self) -> Result<(), WalletError> {
        self.silent_connects.set(self.silent_connects.get() + 1);
        self.connect().await
    }

    async fn disconnect(&self) {
        self.disconnect_calls.set(self.disconnect_calls.get() + 1);
        self.log("disconnect");

        if self.fail_disconnect.get() {
            self.state.report(WalletError::new(
                WalletErrorKind::Disconnection,
                "extension context invalidated",
            ));
        }
        self.state.set_disconnected();
    }

    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, WalletError> {
        self.require_connected(WalletErrorKind::SignTransaction)?;
        Ok(self.sign(&transaction))
    }

    async fn sign_all_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError> {
        self.require_connected(WalletErrorKind::SignTransaction)?;
        Ok(transactions.iter().map(|tx| self.sign(tx)).collect())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, WalletError> {
        self.require_connected(WalletErrorKind::SignMessage)?;
        Ok(Signature::new(cryptoxide::ed25519::signature(
            message,
            &self.keypair,
        )))
    }

    async fn send_transaction(
        &self,
        transaction: Transaction,
        connection: &dyn Connection,
        options: &SendOptions,
    ) -> Result<Signature, WalletError> {
        sign_and_send(self, transaction, connection, options).await
    }
}

/// Accepts every transaction, remembering what was sent.
#[derive(Default)]
pub(crate) struct MockConnection {
    pub sent: RefCell<Vec<Vec<u8>>>,
    pub fail: Cell<bool>,
}

#[async_trait(?Send)]
impl Connection for MockConnection {
    async fn send_raw_transaction(
        &self,
        transaction: &[u8],
        _options: &SendOptions,
    ) -> Result<Signature, WalletError> {
        if self.fail.get() {
            return Err(WalletError::new(
                WalletErrorKind::Timeout,
                "blockhash not found",
            ));
        }
        self.sent.borrow_mut().push(transaction.to_vec());

        let mut signature = [0; 64];
        signature.copy_from_slice(&transaction[..64]);
        Ok(Signature::new(signature))
    }
}
