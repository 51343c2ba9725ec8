/*!
Wallets following the wallet standard.

Instead of being looked up on `window`, such wallets announce themselves to
the page (see [`web::standard`](crate::web::standard)) and describe what they
can do as a list of named features. [`StandardWalletRegistry`] keeps the
compatible ones, wrapped into a [`StandardWalletAdapter`], and hands them to
a [`WalletManager`].
*/

use crate::{
    adapter::{
        Adapter, AdapterEvent, AdapterState, Capabilities, Capability, ReadyState, sign_and_send,
        unsupported,
    },
    error::{WalletError, WalletErrorKind},
    event::{Cancel, EventEmitter, ListenerId},
    key::{PublicKey, Signature},
    manager::WalletManager,
    transaction::{Connection, SendOptions, Transaction, TransactionVersion},
};
use async_trait::async_trait;
use std::{
    cell::RefCell,
    collections::BTreeSet,
    rc::{Rc, Weak},
};

pub const CONNECT: &str = "standard:connect";
pub const DISCONNECT: &str = "standard:disconnect";
pub const EVENTS: &str = "standard:events";
pub const SIGN_TRANSACTION: &str = "solana:signTransaction";
pub const SIGN_AND_SEND_TRANSACTION: &str = "solana:signAndSendTransaction";
pub const SIGN_MESSAGE: &str = "solana:signMessage";

/// where to learn about the standard, standard wallets have no download page
pub const STANDARD_URL: &str = "https://github.com/solana-labs/wallet-standard";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StandardFeature {
    /// e.g. [`SIGN_TRANSACTION`]
    pub name: String,
    pub version: String,
    /// only meaningful for the transaction features
    pub supported_transaction_versions: Option<BTreeSet<TransactionVersion>>,
}

impl StandardFeature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".to_owned(),
            supported_transaction_versions: None,
        }
    }

    pub fn with_versions(mut self, versions: impl IntoIterator<Item = TransactionVersion>) -> Self {
        self.supported_transaction_versions = Some(versions.into_iter().collect());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardAccount {
    pub address: String,
    pub public_key: PublicKey,
}

impl StandardAccount {
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            address: public_key.to_string(),
            public_key,
        }
    }
}

/// What a wallet reports on its `change` event. Fields the wallet did not
/// touch are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StandardChange {
    pub accounts: Option<Vec<StandardAccount>>,
    pub features: Option<Vec<StandardFeature>>,
}

/// A wallet as described by the wallet standard.
///
/// The operations map one to one to the standard features, callers check
/// [`StandardWallet::features`] before invoking one.
#[async_trait(?Send)]
pub trait StandardWallet {
    fn name(&self) -> String;

    fn icon(&self) -> String;

    fn version(&self) -> String;

    fn features(&self) -> Vec<StandardFeature>;

    /// the accounts the page is already authorized to use
    fn accounts(&self) -> Vec<StandardAccount>;

    /// `standard:connect`, `silent` asks the wallet not to prompt the user
    async fn connect(&self, silent: bool) -> Result<Vec<StandardAccount>, WalletError>;

    /// `standard:disconnect`
    async fn disconnect(&self) -> Result<(), WalletError>;

    /// `standard:events`, subscribe to the `change` event
    fn on_change(&self, listener: Box<dyn Fn(&StandardChange)>) -> Cancel;

    async fn sign_transaction(
        &self,
        account: &StandardAccount,
        transaction: &Transaction,
    ) -> Result<Transaction, WalletError>;

    async fn sign_and_send_transaction(
        &self,
        account: &StandardAccount,
        transaction: &Transaction,
        options: &SendOptions,
    ) -> Result<Signature, WalletError>;

    async fn sign_message(
        &self,
        account: &StandardAccount,
        message: &[u8],
    ) -> Result<Signature, WalletError>;
}

fn feature(wallet: &dyn StandardWallet, name: &str) -> Option<StandardFeature> {
    wallet
        .features()
        .into_iter()
        .find(|feature| feature.name == name)
}

fn has_feature(wallet: &dyn StandardWallet, name: &str) -> bool {
    feature(wallet, name).is_some()
}

/// Whether the wallet can be driven as an [`Adapter`]: it must connect,
/// report changes and be able to get a transaction signed one way or
/// another.
pub fn is_wallet_adapter_compatible(wallet: &dyn StandardWallet) -> bool {
    has_feature(wallet, CONNECT)
        && has_feature(wallet, EVENTS)
        && (has_feature(wallet, SIGN_AND_SEND_TRANSACTION) || has_feature(wallet, SIGN_TRANSACTION))
}

/// [`Adapter`] for a [`StandardWallet`].
///
/// Always [`ReadyState::Installed`]: the wallet registered itself. Account
/// changes reported by the wallet are followed while connected, losing every
/// account is a disconnection.
pub struct StandardWalletAdapter {
    this: Weak<Self>,
    wallet: Rc<dyn StandardWallet>,
    name: String,
    icon: String,
    state: AdapterState,
    account: RefCell<Option<StandardAccount>>,
    subscription: RefCell<Option<Cancel>>,
}

impl StandardWalletAdapter {
    pub fn new(wallet: Rc<dyn StandardWallet>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            name: wallet.name(),
            icon: wallet.icon(),
            wallet,
            state: AdapterState::new(ReadyState::Installed),
            account: RefCell::new(None),
            subscription: RefCell::new(None),
        })
    }

    pub fn wallet(&self) -> &Rc<dyn StandardWallet> {
        &self.wallet
    }

    fn has(&self, name: &str) -> bool {
        has_feature(&*self.wallet, name)
    }

    fn subscribe(&self) {
        let this = self.this.clone();
        let subscription = self.wallet.on_change(Box::new(move |change| {
            if let Some(adapter) = this.upgrade() {
                adapter.on_change(change);
            }
        }));
        *self.subscription.borrow_mut() = Some(subscription);
    }

    fn on_change(&self, change: &StandardChange) {
        let Some(accounts) = &change.accounts else {
            return;
        };
        if !self.state.connected() {
            return;
        }

        match accounts.first() {
            None => {
                log::debug!("`{}' has no account left", self.name);
                self.disconnected();
            }
            Some(account) => {
                *self.account.borrow_mut() = Some(account.clone());
                self.state.set_connected(account.public_key);
            }
        }
    }

    fn disconnected(&self) {
        let subscription = self.subscription.borrow_mut().take();
        drop(subscription);
        self.account.borrow_mut().take();
        self.state.set_disconnected();
    }

    fn account(&self, kind: WalletErrorKind) -> Result<StandardAccount, WalletError> {
        let account = self.account.borrow().clone();
        account.ok_or_else(|| {
            self.state
                .fail(WalletError::new(kind, "the wallet is not connected"))
        })
    }

    async fn connect_with(&self, silent: bool) -> Result<(), WalletError> {
        let Some(_connecting) = self.state.begin_connect() else {
            return Ok(());
        };

        let mut accounts = self.wallet.accounts();
        if accounts.is_empty() {
            accounts = self
                .wallet
                .connect(silent)
                .await
                .map_err(|error| self.state.fail(error.with_kind(WalletErrorKind::Connection)))?;
        }

        let Some(account) = accounts.into_iter().next() else {
            return Err(self.state.fail(WalletError::new(
                WalletErrorKind::Account,
                "the wallet did not authorize any account",
            )));
        };

        self.subscribe();
        *self.account.borrow_mut() = Some(account.clone());
        self.state.set_connected(account.public_key);
        Ok(())
    }
}

impl Drop for StandardWalletAdapter {
    fn drop(&mut self) {
        self.subscription.get_mut().take();
    }
}

#[async_trait(?Send)]
impl Adapter for StandardWalletAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn icon(&self) -> &str {
        &self.icon
    }

    fn url(&self) -> &str {
        STANDARD_URL
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
        let wallet = &*self.wallet;
        let sign = feature(wallet, SIGN_TRANSACTION);
        let send = feature(wallet, SIGN_AND_SEND_TRANSACTION);

        Capabilities {
            sign_transaction: sign.is_some(),
            sign_all_transactions: sign.is_some(),
            sign_message: has_feature(wallet, SIGN_MESSAGE),
            send_transaction: sign.is_some() || send.is_some(),
            supported_transaction_versions: send
                .or(sign)
                .and_then(|feature| feature.supported_transaction_versions),
        }
    }

    fn events(&self) -> &EventEmitter<AdapterEvent> {
        self.state.events()
    }

    async fn connect(&self) -> Result<(), WalletError> {
        self.connect_with(false).await
    }

    async fn auto_connect(&self) -> Result<(), WalletError> {
        self.connect_with(true).await
    }

    async fn disconnect(&self) {
        if self.has(DISCONNECT) {
            if let Err(error) = self.wallet.disconnect().await {
                self.state
                    .report(error.with_kind(WalletErrorKind::Disconnection));
            }
        }
        self.disconnected();
    }

    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, WalletError> {
        if !self.has(SIGN_TRANSACTION) {
            unsupported(&self.name, Capability::SignTransaction);
        }
        let account = self.account(WalletErrorKind::SignTransaction)?;

        self.wallet
            .sign_transaction(&account, &transaction)
            .await
            .map_err(|error| self.state.fail(error.with_kind(WalletErrorKind::SignTransaction)))
    }

    async fn sign_all_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError> {
        let mut signed = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            signed.push(self.sign_transaction(transaction).await?);
        }
        Ok(signed)
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, WalletError> {
        if !self.has(SIGN_MESSAGE) {
            unsupported(&self.name, Capability::SignMessage);
        }
        let account = self.account(WalletErrorKind::SignMessage)?;

        self.wallet
            .sign_message(&account, message)
            .await
            .map_err(|error| self.state.fail(error.with_kind(WalletErrorKind::SignMessage)))
    }

    async fn send_transaction(
        &self,
        transaction: Transaction,
        connection: &dyn Connection,
        options: &SendOptions,
    ) -> Result<Signature, WalletError> {
        if !self.has(SIGN_AND_SEND_TRANSACTION) {
            if self.has(SIGN_TRANSACTION) {
                return sign_and_send(self, transaction, connection, options).await;
            }
            unsupported(&self.name, Capability::SendTransaction);
        }

        let account = self.account(WalletErrorKind::SendTransaction)?;
        if !self
            .capabilities()
            .supports_version(transaction.version())
        {
            return Err(self.state.fail(WalletError::new(
                WalletErrorKind::SendTransaction,
                format!(
                    "Sending {:?} transactions isn't supported by this wallet",
                    transaction.version()
                ),
            )));
        }

        self.wallet
            .sign_and_send_transaction(&account, &transaction, options)
            .await
            .map_err(|error| self.state.fail(error.with_kind(WalletErrorKind::SendTransaction)))
    }
}

/// The standard wallets registered so far.
#[derive(Default)]
pub struct StandardWalletRegistry {
    adapters: RefCell<Vec<Rc<StandardWalletAdapter>>>,
    events: EventEmitter<Rc<StandardWalletAdapter>>,
}

impl StandardWalletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the wallet if it is compatible and not known yet.
    ///
    /// Returns the adapter wrapping the newly registered wallet, also
    /// published on [`StandardWalletRegistry::events`].
    pub fn register(&self, wallet: Rc<dyn StandardWallet>) -> Option<Rc<StandardWalletAdapter>> {
        let name = wallet.name();

        if !is_wallet_adapter_compatible(&*wallet) {
            log::debug!("ignoring standard wallet `{name}', missing required features");
            return None;
        }
        if self
            .adapters
            .borrow()
            .iter()
            .any(|adapter| adapter.name() == name)
        {
            log::debug!("standard wallet `{name}' is already registered");
            return None;
        }

        log::debug!("standard wallet `{name}' ({}) registered", wallet.version());
        let adapter = StandardWalletAdapter::new(wallet);
        self.adapters.borrow_mut().push(adapter.clone());
        self.events.emit(&adapter);
        Some(adapter)
    }

    pub fn adapters(&self) -> Vec<Rc<StandardWalletAdapter>> {
        self.adapters.borrow().clone()
    }

    pub fn events(&self) -> &EventEmitter<Rc<StandardWalletAdapter>> {
        &self.events
    }

    /// Add the registered wallets to `manager`, now and as they register.
    ///
    /// The registry does not keep the manager alive.
    pub fn attach_to(&self, manager: &WalletManager) -> ListenerId {
        for adapter in self.adapters() {
            manager.add_adapter(adapter);
        }

        let manager = manager.downgrade();
        self.events.on(move |adapter| {
            if let Some(manager) = manager.upgrade() {
                manager.add_adapter(adapter.clone());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ManagerConfig,
        manager::Spawner,
        storage::{MemoryStorage, Storage as _},
        testing::MockConnection,
    };
    use futures::{
        executor::{LocalPool, block_on},
        future::LocalBoxFuture,
        task::LocalSpawnExt as _,
    };
    use std::cell::Cell;

    struct FakeWallet {
        name: String,
        features: RefCell<Vec<StandardFeature>>,
        accounts: RefCell<Vec<StandardAccount>>,
        authorized: Cell<bool>,
        silent_connects: Cell<u32>,
        changes: Rc<EventEmitter<StandardChange>>,
        keypair: [u8; 64],
        public_key: PublicKey,
    }

    impl FakeWallet {
        fn new(name: &str, features: &[&str]) -> Self {
            let mut seed = [7u8; 32];
            for (byte, name_byte) in seed.iter_mut().zip(name.bytes()) {
                *byte = name_byte;
            }
            let (keypair, public_key) = cryptoxide::ed25519::keypair(&seed);

            Self {
                name: name.to_owned(),
                features: RefCell::new(
                    features
                        .iter()
                        .map(|feature| StandardFeature::new(*feature))
                        .collect(),
                ),
                accounts: RefCell::new(Vec::new()),
                authorized: Cell::new(true),
                silent_connects: Cell::new(0),
                changes: Rc::new(EventEmitter::new()),
                keypair,
                public_key: PublicKey::new(public_key),
            }
        }

        fn complete(name: &str) -> Self {
            Self::new(
                name,
                &[CONNECT, DISCONNECT, EVENTS, SIGN_TRANSACTION, SIGN_MESSAGE],
            )
        }

        fn change_accounts(&self, accounts: Vec<StandardAccount>) {
            *self.accounts.borrow_mut() = accounts.clone();
            self.changes.emit(&StandardChange {
                accounts: Some(accounts),
                features: None,
            });
        }

        fn sign(&self, bytes: &[u8]) -> [u8; 64] {
            cryptoxide::ed25519::signature(bytes, &self.keypair)
        }
    }

    #[async_trait(?Send)]
    impl StandardWallet for FakeWallet {
        fn name(&self) -> String {
            self.name.clone()
        }

        fn icon(&self) -> String {
            "data:image/svg+xml;base64,".to_owned()
        }

        fn version(&self) -> String {
            "1.0.0".to_owned()
        }

        fn features(&self) -> Vec<StandardFeature> {
            self.features.borrow().clone()
        }

        fn accounts(&self) -> Vec<StandardAccount> {
            self.accounts.borrow().clone()
        }

        async fn connect(&self, silent: bool) -> Result<Vec<StandardAccount>, WalletError> {
            if silent {
                self.silent_connects.set(self.silent_connects.get() + 1);
                if !self.authorized.get() {
                    return Ok(Vec::new());
                }
            }
            let accounts = vec![StandardAccount::new(self.public_key)];
            *self.accounts.borrow_mut() = accounts.clone();
            Ok(accounts)
        }

        async fn disconnect(&self) -> Result<(), WalletError> {
            self.accounts.borrow_mut().clear();
            Ok(())
        }

        fn on_change(&self, listener: Box<dyn Fn(&StandardChange)>) -> Cancel {
            let id = self.changes.on(listener);
            let changes = self.changes.clone();
            Cancel::new(move || {
                changes.off(id);
            })
        }

        async fn sign_transaction(
            &self,
            _account: &StandardAccount,
            transaction: &Transaction,
        ) -> Result<Transaction, WalletError> {
            let mut signed = self.sign(transaction.as_bytes()).to_vec();
            signed.extend_from_slice(transaction.as_bytes());
            Ok(transaction.with_bytes(signed))
        }

        async fn sign_and_send_transaction(
            &self,
            _account: &StandardAccount,
            transaction: &Transaction,
            _options: &SendOptions,
        ) -> Result<Signature, WalletError> {
            Ok(Signature::new(self.sign(transaction.as_bytes())))
        }

        async fn sign_message(
            &self,
            _account: &StandardAccount,
            message: &[u8],
        ) -> Result<Signature, WalletError> {
            Ok(Signature::new(self.sign(message)))
        }
    }

    fn record(adapter: &StandardWalletAdapter) -> Rc<RefCell<Vec<AdapterEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        adapter
            .events()
            .on(move |event| sink.borrow_mut().push(event.clone()));
        events
    }

    #[test]
    fn compatibility_requires_connect_events_and_signing() {
        assert!(is_wallet_adapter_compatible(&FakeWallet::complete("A")));
        assert!(is_wallet_adapter_compatible(&FakeWallet::new(
            "A",
            &[CONNECT, EVENTS, SIGN_AND_SEND_TRANSACTION]
        )));
        assert!(!is_wallet_adapter_compatible(&FakeWallet::new(
            "A",
            &[CONNECT, SIGN_TRANSACTION]
        )));
        assert!(!is_wallet_adapter_compatible(&FakeWallet::new(
            "A",
            &[CONNECT, EVENTS, SIGN_MESSAGE]
        )));
    }

    #[test]
    fn registry_filters_and_dedupes() {
        let registry = StandardWalletRegistry::new();
        let registered = Rc::new(Cell::new(0));
        let counter = registered.clone();
        registry
            .events()
            .on(move |_| counter.set(counter.get() + 1));

        assert!(registry.register(Rc::new(FakeWallet::complete("A"))).is_some());
        assert!(registry.register(Rc::new(FakeWallet::complete("A"))).is_none());
        assert!(
            registry
                .register(Rc::new(FakeWallet::new("B", &[CONNECT])))
                .is_none()
        );

        assert_eq!(registry.adapters().len(), 1);
        assert_eq!(registered.get(), 1);
    }

    #[test]
    fn capabilities_follow_the_features() {
        let wallet = FakeWallet::new("A", &[CONNECT, EVENTS]);
        wallet.features.borrow_mut().push(
            StandardFeature::new(SIGN_AND_SEND_TRANSACTION)
                .with_versions([TransactionVersion::Legacy, TransactionVersion::V0]),
        );
        let adapter = StandardWalletAdapter::new(Rc::new(wallet));

        let capabilities = adapter.capabilities();

        assert!(capabilities.send_transaction);
        assert!(!capabilities.sign_transaction);
        assert!(!capabilities.sign_message);
        assert!(capabilities.supports_version(TransactionVersion::V0));
        assert_eq!(adapter.ready_state(), ReadyState::Installed);
        assert_eq!(adapter.url(), STANDARD_URL);
    }

    #[test]
    fn connect_uses_the_first_account() -> anyhow::Result<()> {
        let wallet = Rc::new(FakeWallet::complete("A"));
        let adapter = StandardWalletAdapter::new(wallet.clone());

        block_on(adapter.connect())?;
        assert_eq!(adapter.public_key(), Some(wallet.public_key));

        let message = b"hello";
        let signature = block_on(adapter.sign_message(message))?;
        assert!(cryptoxide::ed25519::verify(
            message,
            &wallet.public_key.to_bytes(),
            &signature.to_bytes()
        ));
        Ok(())
    }

    #[test]
    fn account_changes_are_followed() {
        let wallet = Rc::new(FakeWallet::complete("A"));
        let adapter = StandardWalletAdapter::new(wallet.clone());
        block_on(adapter.connect()).unwrap();
        let events = record(&adapter);

        let other = PublicKey::new([9; 32]);
        wallet.change_accounts(vec![StandardAccount::new(other)]);
        assert_eq!(adapter.public_key(), Some(other));

        wallet.change_accounts(Vec::new());
        assert_eq!(adapter.public_key(), None);
        assert_eq!(
            *events.borrow(),
            vec![AdapterEvent::Connect(other), AdapterEvent::Disconnect]
        );
        // unsubscribed
        assert_eq!(wallet.changes.listener_count(), 0);
    }

    #[test]
    fn disconnect_unsubscribes() {
        let wallet = Rc::new(FakeWallet::complete("A"));
        let adapter = StandardWalletAdapter::new(wallet.clone());
        block_on(adapter.connect()).unwrap();
        assert_eq!(wallet.changes.listener_count(), 1);

        block_on(adapter.disconnect());

        assert!(!adapter.connected());
        assert!(wallet.accounts().is_empty());
        assert_eq!(wallet.changes.listener_count(), 0);
    }

    #[test]
    fn auto_connect_does_not_prompt() {
        let wallet = Rc::new(FakeWallet::complete("A"));
        wallet.authorized.set(false);
        let adapter = StandardWalletAdapter::new(wallet.clone());

        let error = block_on(adapter.auto_connect()).unwrap_err();

        assert_eq!(error.kind(), WalletErrorKind::Account);
        assert_eq!(wallet.silent_connects.get(), 1);
        assert!(!adapter.connected());
    }

    #[test]
    fn send_falls_back_to_sign_and_submit() {
        let wallet = Rc::new(FakeWallet::complete("A"));
        let adapter = StandardWalletAdapter::new(wallet.clone());
        block_on(adapter.connect()).unwrap();
        let connection = MockConnection::default();

        let signature = block_on(adapter.send_transaction(
            Transaction::legacy(vec![1, 2, 3]),
            &connection,
            &SendOptions::default(),
        ))
        .unwrap();

        assert_eq!(connection.sent.borrow().len(), 1);
        assert!(cryptoxide::ed25519::verify(
            &[1, 2, 3],
            &wallet.public_key.to_bytes(),
            &signature.to_bytes()
        ));
    }

    #[test]
    fn late_wallet_resumes_the_remembered_selection() {
        let mut pool = LocalPool::new();
        let spawner = pool.spawner();
        let spawner: Spawner = Rc::new(move |future: LocalBoxFuture<'static, ()>| {
            spawner
                .spawn_local(future)
                .expect("the test pool accepts tasks")
        });
        let storage = Rc::new(MemoryStorage::new());
        storage.set_item("walletName", "\"Late\"");
        let manager = WalletManager::new(
            Vec::<Rc<dyn Adapter>>::new(),
            storage,
            ManagerConfig {
                auto_connect: true,
                ..ManagerConfig::default()
            },
            spawner,
        );
        let registry = StandardWalletRegistry::new();
        registry.register(Rc::new(FakeWallet::complete("Early")));
        registry.attach_to(&manager);
        pool.run_until(manager.auto_connect());
        assert_eq!(manager.wallets().len(), 1);
        assert_eq!(manager.wallet(), None);

        let wallet = Rc::new(FakeWallet::complete("Late"));
        registry.register(wallet.clone());
        pool.run_until_stalled();

        assert_eq!(manager.wallets().len(), 2);
        assert_eq!(manager.wallet().unwrap().name, "Late");
        assert_eq!(manager.public_key(), Some(wallet.public_key));
        assert_eq!(wallet.silent_connects.get(), 1);
    }
}
