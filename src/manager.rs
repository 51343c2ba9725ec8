/*!
The connection lifecycle manager.

[`WalletManager`] owns the active adapter: it is the only one selecting,
connecting and disconnecting it, and the only one writing the remembered
selection. Applications observe it through [`WalletManager::events`] or
[`WalletManager::snapshot`].
*/

use crate::{
    adapter::{Adapter, AdapterEvent, Capabilities, Capability, ReadyState, unsupported},
    config::ManagerConfig,
    error::{WalletError, WalletErrorKind},
    event::{EventEmitter, ListenerId},
    key::{PublicKey, Signature},
    storage::{PersistedSelection, Storage},
    transaction::{Connection, SendOptions, Transaction, TransactionVersion},
};
use futures::future::LocalBoxFuture;
use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

/// Runs background work on the page's event loop, see
/// [`spawner`](crate::spawner) for the browser one.
pub type Spawner = Rc<dyn Fn(LocalBoxFuture<'static, ()>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    NoWalletSelected,
    /// a wallet is selected but not connected
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl LifecycleState {
    pub fn connection_state(self) -> ConnectionState {
        match self {
            LifecycleState::NoWalletSelected | LifecycleState::Disconnected => {
                ConnectionState::Disconnected
            }
            LifecycleState::Connecting => ConnectionState::Connecting,
            LifecycleState::Connected => ConnectionState::Connected,
            LifecycleState::Disconnecting => ConnectionState::Disconnecting,
        }
    }
}

/// What the application gets to know about an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletInfo {
    pub name: String,
    pub icon: String,
    pub url: String,
    pub ready_state: ReadyState,
    pub capabilities: Capabilities,
}

impl WalletInfo {
    fn of(adapter: &dyn Adapter) -> Self {
        Self {
            name: adapter.name().to_owned(),
            icon: adapter.icon().to_owned(),
            url: adapter.url().to_owned(),
            ready_state: adapter.ready_state(),
            capabilities: adapter.capabilities(),
        }
    }
}

/// Everything a UI renders from, taken at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSnapshot {
    pub wallet: Option<WalletInfo>,
    pub wallets: Vec<WalletInfo>,
    pub public_key: Option<PublicKey>,
    pub state: LifecycleState,
}

impl WalletSnapshot {
    pub fn connected(&self) -> bool {
        self.state == LifecycleState::Connected
    }

    pub fn connecting(&self) -> bool {
        self.state == LifecycleState::Connecting
    }

    pub fn disconnecting(&self) -> bool {
        self.state == LifecycleState::Disconnecting
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// the selected wallet changed
    WalletChange(Option<String>),
    StateChange(LifecycleState),
    Connect(PublicKey),
    Disconnect,
    Error(WalletError),
    ReadyStateChange {
        wallet: String,
        ready_state: ReadyState,
    },
    /// a wallet was registered after the manager was created
    WalletAdded(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AutoConnect {
    Idle,
    /// requested, waiting for the wallet to register or become ready
    Pending,
    Done,
}

struct Active {
    adapter: Rc<dyn Adapter>,
    listener: ListenerId,
}

struct Inner {
    config: ManagerConfig,
    selection: PersistedSelection,
    spawner: Spawner,
    adapters: RefCell<Vec<Rc<dyn Adapter>>>,
    watchers: RefCell<Vec<(Rc<dyn Adapter>, ListenerId)>>,
    active: RefCell<Option<Active>>,
    // bumped on every selection change, events tagged with an older
    // generation come from a deselected adapter
    generation: Cell<u64>,
    // bumped by every disconnect, a connect resolving after one is undone
    disconnects: Cell<u64>,
    pending_selection: RefCell<Option<String>>,
    connecting: Cell<bool>,
    disconnecting: Cell<bool>,
    auto_connect: Cell<AutoConnect>,
    events: EventEmitter<ManagerEvent>,
}

/// Raises a flag for as long as it lives.
struct Flag<'a>(&'a Cell<bool>);

impl<'a> Flag<'a> {
    fn raise(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for Flag<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Inner {
    fn find(&self, name: &str) -> Option<Rc<dyn Adapter>> {
        self.adapters
            .borrow()
            .iter()
            .find(|adapter| adapter.name() == name)
            .cloned()
    }

    fn active_adapter(&self) -> Option<Rc<dyn Adapter>> {
        self.active
            .borrow()
            .as_ref()
            .map(|active| active.adapter.clone())
    }

    fn is_active(&self, name: &str) -> bool {
        self.active
            .borrow()
            .as_ref()
            .is_some_and(|active| active.adapter.name() == name)
    }

    fn state(&self) -> LifecycleState {
        let Some(adapter) = self.active_adapter() else {
            return LifecycleState::NoWalletSelected;
        };

        if self.disconnecting.get() {
            LifecycleState::Disconnecting
        } else if adapter.connected() {
            LifecycleState::Connected
        } else if self.connecting.get() || adapter.connecting() {
            LifecycleState::Connecting
        } else {
            LifecycleState::Disconnected
        }
    }

    fn emit(&self, event: ManagerEvent) {
        self.events.emit(&event);
    }

    fn notify_state(&self) {
        self.emit(ManagerEvent::StateChange(self.state()));
    }

    fn fail(&self, error: WalletError) -> WalletError {
        self.emit(ManagerEvent::Error(error.clone()));
        error
    }

    /// Swap the active adapter.
    ///
    /// The previous adapter's listener is removed before the new adapter is
    /// assigned, nothing it publishes afterwards reaches the manager.
    fn activate(self: &Rc<Self>, next: Option<Rc<dyn Adapter>>) {
        let previous = self.active.borrow_mut().take();
        if let Some(previous) = previous {
            previous.adapter.events().off(previous.listener);
        }

        let generation = self.generation.get() + 1;
        self.generation.set(generation);

        let active = next.map(|adapter| {
            let weak = Rc::downgrade(self);
            let listener = adapter.events().on(move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_adapter_event(generation, event);
                }
            });
            Active { adapter, listener }
        });
        *self.active.borrow_mut() = active;
    }

    fn on_adapter_event(&self, generation: u64, event: &AdapterEvent) {
        if generation != self.generation.get() {
            log::trace!("dropping event of a deselected wallet: {event:?}");
            return;
        }

        match event {
            AdapterEvent::Connect(public_key) => {
                self.emit(ManagerEvent::Connect(*public_key));
                self.notify_state();
            }
            AdapterEvent::Disconnect => {
                log::debug!("wallet disconnected");
                self.emit(ManagerEvent::Disconnect);
                self.notify_state();
            }
            // never implies a disconnection, the adapter says so if it is one
            AdapterEvent::Error(error) => self.emit(ManagerEvent::Error(error.clone())),
            AdapterEvent::ReadyStateChange(_) => {}
        }
    }

    /// follow the readiness of every adapter, selected or not
    fn watch(self: &Rc<Self>, adapter: &Rc<dyn Adapter>) -> ListenerId {
        let weak = Rc::downgrade(self);
        let name = adapter.name().to_owned();
        adapter.events().on(move |event| {
            if let AdapterEvent::ReadyStateChange(ready_state) = event {
                if let Some(inner) = weak.upgrade() {
                    inner.on_ready_state_change(&name, *ready_state);
                }
            }
        })
    }

    fn on_ready_state_change(self: &Rc<Self>, name: &str, ready_state: ReadyState) {
        self.emit(ManagerEvent::ReadyStateChange {
            wallet: name.to_owned(),
            ready_state,
        });

        if ready_state.is_ready()
            && self.auto_connect.get() == AutoConnect::Pending
            && self.is_active(name)
        {
            self.spawn_auto_connect();
        }
    }

    fn spawn_auto_connect(self: &Rc<Self>) {
        self.auto_connect.set(AutoConnect::Done);
        let manager = WalletManager {
            inner: self.clone(),
        };
        (self.spawner)(Box::pin(async move {
            manager.attempt_auto_connect().await;
        }));
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.adapter.events().off(active.listener);
        }
        for (adapter, listener) in self.watchers.get_mut().drain(..) {
            adapter.events().off(listener);
        }
    }
}

/// Selects, connects and disconnects one wallet among a list of adapters.
///
/// Cloning gives another handle on the same manager.
#[derive(Clone)]
pub struct WalletManager {
    inner: Rc<Inner>,
}

/// A handle that does not keep the manager alive.
#[derive(Clone)]
pub struct WeakWalletManager(Weak<Inner>);

impl WeakWalletManager {
    pub fn upgrade(&self) -> Option<WalletManager> {
        self.0.upgrade().map(|inner| WalletManager { inner })
    }
}

impl WalletManager {
    /// Create the manager and restore the remembered selection from
    /// `storage`.
    ///
    /// A remembered wallet that is not part of `adapters` leaves the manager
    /// without a wallet. It is selected if it gets added later on (see
    /// [`WalletManager::add_adapter`]).
    pub fn new(
        adapters: impl IntoIterator<Item = Rc<dyn Adapter>>,
        storage: Rc<dyn Storage>,
        config: ManagerConfig,
        spawner: Spawner,
    ) -> Self {
        let selection = PersistedSelection::new(storage, config.storage_key.clone());
        let manager = Self {
            inner: Rc::new(Inner {
                config,
                selection,
                spawner,
                adapters: RefCell::new(Vec::new()),
                watchers: RefCell::new(Vec::new()),
                active: RefCell::new(None),
                generation: Cell::new(0),
                disconnects: Cell::new(0),
                pending_selection: RefCell::new(None),
                connecting: Cell::new(false),
                disconnecting: Cell::new(false),
                auto_connect: Cell::new(AutoConnect::Idle),
                events: EventEmitter::new(),
            }),
        };

        for adapter in adapters {
            manager.add_adapter(adapter);
        }

        if let Some(name) = manager.inner.selection.load() {
            match manager.inner.find(&name) {
                Some(adapter) => {
                    log::debug!("restoring wallet selection `{name}'");
                    manager.inner.activate(Some(adapter));
                }
                None => {
                    log::debug!("remembered wallet `{name}' is not available");
                    *manager.inner.pending_selection.borrow_mut() = Some(name);
                }
            }
        }

        if manager.inner.config.auto_connect {
            let weak = manager.downgrade();
            (manager.inner.spawner)(Box::pin(async move {
                if let Some(manager) = weak.upgrade() {
                    manager.auto_connect().await;
                }
            }));
        }

        manager
    }

    pub fn downgrade(&self) -> WeakWalletManager {
        WeakWalletManager(Rc::downgrade(&self.inner))
    }

    pub fn events(&self) -> &EventEmitter<ManagerEvent> {
        &self.inner.events
    }

    /// Add an adapter discovered after start up.
    ///
    /// Returns `false` (and ignores the adapter) if a wallet with the same
    /// name is already known.
    pub fn add_adapter(&self, adapter: Rc<dyn Adapter>) -> bool {
        let inner = &self.inner;
        let name = adapter.name().to_owned();
        if inner.find(&name).is_some() {
            log::debug!("ignoring duplicate wallet `{name}'");
            return false;
        }

        let listener = inner.watch(&adapter);
        inner
            .watchers
            .borrow_mut()
            .push((adapter.clone(), listener));
        inner.adapters.borrow_mut().push(adapter.clone());
        inner.emit(ManagerEvent::WalletAdded(name.clone()));

        let remembered = inner.pending_selection.borrow().as_deref() == Some(name.as_str());
        if remembered {
            log::debug!("remembered wallet `{name}' registered");
            inner.pending_selection.take();
            let ready = adapter.ready_state().is_ready();
            inner.activate(Some(adapter));
            inner.emit(ManagerEvent::WalletChange(Some(name)));
            inner.notify_state();

            if ready && inner.auto_connect.get() == AutoConnect::Pending {
                inner.spawn_auto_connect();
            }
        }

        true
    }

    /// Select the wallet to use (or none).
    ///
    /// A connected wallet is disconnected first, its failures are only
    /// published. The selection is remembered.
    pub async fn select_wallet(&self, name: Option<&str>) -> Result<(), WalletError> {
        let inner = &self.inner;
        let next = match name {
            None => None,
            Some(name) => match inner.find(name) {
                Some(adapter) => Some(adapter),
                None => {
                    return Err(inner.fail(WalletError::new(
                        WalletErrorKind::NotFound,
                        format!("no wallet named `{name}'"),
                    )));
                }
            },
        };

        // an explicit choice supersedes the remembered one
        inner.pending_selection.take();
        if inner.auto_connect.get() == AutoConnect::Pending {
            inner.auto_connect.set(AutoConnect::Done);
        }

        let current = inner.active_adapter();
        if current.as_ref().map(|adapter| adapter.name()) == name {
            inner.selection.store(name);
            return Ok(());
        }

        if let Some(previous) = current {
            if previous.connected() || previous.connecting() {
                log::debug!("disconnecting `{}' before switching wallet", previous.name());
                let _disconnecting = Flag::raise(&inner.disconnecting);
                inner.notify_state();
                previous.disconnect().await;
            }
        }

        inner.activate(next);
        inner.selection.store(name);
        inner.emit(ManagerEvent::WalletChange(name.map(str::to_owned)));
        inner.notify_state();
        Ok(())
    }

    /// Connect the selected wallet.
    ///
    /// Without a selected wallet this fails with
    /// [`WalletErrorKind::NotSelected`]. A connection already established or
    /// in progress makes this a no-op. Errors are also published as
    /// [`ManagerEvent::Error`].
    pub async fn connect(&self) -> Result<(), WalletError> {
        self.connect_active(false).await
    }

    /// Reconnect the remembered wallet, once.
    ///
    /// Only does something when enabled in the [`ManagerConfig`], in which
    /// case [`WalletManager::new`] already schedules it: calling it again
    /// is a no-op. If the wallet is not registered or not ready yet,
    /// the attempt happens as soon as it is. Failures are published, never
    /// returned.
    pub async fn auto_connect(&self) {
        let inner = &self.inner;
        if !inner.config.auto_connect || inner.auto_connect.get() != AutoConnect::Idle {
            return;
        }

        match inner.active_adapter() {
            None if inner.pending_selection.borrow().is_some() => {
                log::debug!("auto-connect waits for the remembered wallet to register");
                inner.auto_connect.set(AutoConnect::Pending);
            }
            None => inner.auto_connect.set(AutoConnect::Done),
            Some(adapter) if adapter.ready_state() == ReadyState::Unsupported => {
                inner.auto_connect.set(AutoConnect::Done);
            }
            Some(adapter) if !adapter.ready_state().is_ready() => {
                log::debug!("auto-connect waits for `{}' to be detected", adapter.name());
                inner.auto_connect.set(AutoConnect::Pending);
            }
            Some(_) => {
                inner.auto_connect.set(AutoConnect::Done);
                self.attempt_auto_connect().await;
            }
        }
    }

    async fn attempt_auto_connect(&self) {
        if let Err(error) = self.connect_active(true).await {
            log::warn!("auto-connect failed: {error}");
        }
    }

    async fn connect_active(&self, silent: bool) -> Result<(), WalletError> {
        let inner = &self.inner;
        let Some(adapter) = inner.active_adapter() else {
            return Err(inner.fail(WalletErrorKind::NotSelected.into()));
        };

        if inner.connecting.get()
            || inner.disconnecting.get()
            || adapter.connected()
            || adapter.connecting()
        {
            return Ok(());
        }

        let ready_state = adapter.ready_state();
        if !ready_state.is_ready() {
            return Err(inner.fail(WalletError::new(
                WalletErrorKind::NotReady,
                format!("`{}' is {ready_state}", adapter.name()),
            )));
        }

        let generation = inner.generation.get();
        let disconnects = inner.disconnects.get();
        let result = {
            let _connecting = Flag::raise(&inner.connecting);
            inner.notify_state();
            if silent {
                adapter.auto_connect().await
            } else {
                adapter.connect().await
            }
        };

        if inner.generation.get() != generation && adapter.connected() {
            log::debug!(
                "disconnecting `{}', deselected while connecting",
                adapter.name()
            );
            adapter.disconnect().await;
        } else if inner.disconnects.get() != disconnects && adapter.connected() {
            log::debug!(
                "disconnecting `{}', disconnected while connecting",
                adapter.name()
            );
            adapter.disconnect().await;
        }

        inner.notify_state();
        result
    }

    /// Disconnect the selected wallet, keeping it selected.
    ///
    /// Always settles, adapter failures are only published.
    pub async fn disconnect(&self) {
        self.disconnect_active(false).await
    }

    /// Disconnect and forget the selected wallet.
    pub async fn disconnect_and_forget(&self) {
        self.disconnect_active(true).await
    }

    async fn disconnect_active(&self, forget: bool) {
        let inner = &self.inner;

        if let Some(adapter) = inner.active_adapter() {
            inner.disconnects.set(inner.disconnects.get() + 1);
            if !inner.disconnecting.get() {
                {
                    let _disconnecting = Flag::raise(&inner.disconnecting);
                    inner.notify_state();
                    adapter.disconnect().await;
                }
                inner.notify_state();
            }
        }

        if forget {
            inner.pending_selection.take();
            inner.auto_connect.set(AutoConnect::Done);
            inner.selection.store(None);
            if inner.active_adapter().is_some() {
                inner.activate(None);
                inner.emit(ManagerEvent::WalletChange(None));
                inner.notify_state();
            }
        }
    }

    /// The selected adapter, if it declares `capability` and is connected.
    ///
    /// # Panics
    ///
    /// If the selected adapter does not support `capability`.
    fn capable_adapter(&self, capability: Capability) -> Result<Rc<dyn Adapter>, WalletError> {
        let adapter = self.inner.active_adapter();

        if let Some(adapter) = &adapter {
            if !adapter.capabilities().supports(capability) {
                unsupported(adapter.name(), capability);
            }
        }

        match adapter {
            Some(adapter) if self.inner.state() == LifecycleState::Connected => Ok(adapter),
            _ => Err(self.inner.fail(WalletError::new(
                WalletErrorKind::NotConnected,
                format!("cannot {capability} without a connected wallet"),
            ))),
        }
    }

    fn check_version(
        &self,
        adapter: &dyn Adapter,
        version: TransactionVersion,
        kind: WalletErrorKind,
    ) -> Result<(), WalletError> {
        if adapter.capabilities().supports_version(version) {
            Ok(())
        } else {
            Err(self.inner.fail(WalletError::new(
                kind,
                format!(
                    "`{}' does not support {version:?} transactions",
                    adapter.name()
                ),
            )))
        }
    }

    /// # Panics
    ///
    /// If the selected wallet cannot sign transactions, check
    /// [`WalletManager::supports`] first.
    pub async fn sign_transaction(
        &self,
        transaction: Transaction,
    ) -> Result<Transaction, WalletError> {
        let adapter = self.capable_adapter(Capability::SignTransaction)?;
        self.check_version(
            &*adapter,
            transaction.version(),
            WalletErrorKind::SignTransaction,
        )?;
        adapter.sign_transaction(transaction).await
    }

    /// # Panics
    ///
    /// If the selected wallet cannot sign multiple transactions.
    pub async fn sign_all_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError> {
        let adapter = self.capable_adapter(Capability::SignAllTransactions)?;
        for transaction in &transactions {
            self.check_version(
                &*adapter,
                transaction.version(),
                WalletErrorKind::SignTransaction,
            )?;
        }
        adapter.sign_all_transactions(transactions).await
    }

    /// # Panics
    ///
    /// If the selected wallet cannot sign messages.
    pub async fn sign_message(&self, message: &[u8]) -> Result<Signature, WalletError> {
        let adapter = self.capable_adapter(Capability::SignMessage)?;
        adapter.sign_message(message).await
    }

    /// # Panics
    ///
    /// If the selected wallet cannot send transactions.
    pub async fn send_transaction(
        &self,
        transaction: Transaction,
        connection: &dyn Connection,
        options: &SendOptions,
    ) -> Result<Signature, WalletError> {
        let adapter = self.capable_adapter(Capability::SendTransaction)?;
        self.check_version(
            &*adapter,
            transaction.version(),
            WalletErrorKind::SendTransaction,
        )?;
        adapter
            .send_transaction(transaction, connection, options)
            .await
    }

    /// whether the selected wallet declares `capability`
    pub fn supports(&self, capability: Capability) -> bool {
        self.inner
            .active_adapter()
            .is_some_and(|adapter| adapter.capabilities().supports(capability))
    }

    pub fn adapter(&self) -> Option<Rc<dyn Adapter>> {
        self.inner.active_adapter()
    }

    pub fn wallet(&self) -> Option<WalletInfo> {
        self.inner
            .active_adapter()
            .map(|adapter| WalletInfo::of(&*adapter))
    }

    pub fn wallets(&self) -> Vec<WalletInfo> {
        let adapters = self.inner.adapters.borrow().clone();
        adapters
            .iter()
            .map(|adapter| WalletInfo::of(&**adapter))
            .collect()
    }

    /// Only set while [`LifecycleState::Connected`].
    pub fn public_key(&self) -> Option<PublicKey> {
        if self.inner.state() == LifecycleState::Connected {
            self.inner
                .active_adapter()
                .and_then(|adapter| adapter.public_key())
        } else {
            None
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state().connection_state()
    }

    pub fn connected(&self) -> bool {
        self.state() == LifecycleState::Connected
    }

    pub fn connecting(&self) -> bool {
        self.state() == LifecycleState::Connecting
    }

    pub fn disconnecting(&self) -> bool {
        self.state() == LifecycleState::Disconnecting
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            wallet: self.wallet(),
            wallets: self.wallets(),
            public_key: self.public_key(),
            state: self.state(),
        }
    }
}
