use super::{Adapter, AdapterEvent, AdapterState, Capabilities, ReadyState};
use crate::{
    error::{WalletError, WalletErrorKind},
    event::{EventEmitter, ListenerId},
    key::{PublicKey, Signature},
    ready::{DetectionHost, lazy_ready_state},
    transaction::{Connection, SendOptions, Transaction},
};
use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

/// Produces the real adapter, typically by importing the wallet's SDK.
pub type AdapterLoader = Box<dyn Fn() -> LocalBoxFuture<'static, Result<Rc<dyn Adapter>, WalletError>>>;

/// An adapter whose implementation is only loaded when connecting.
///
/// It is [`ReadyState::Loadable`] wherever a page is available. A failing
/// load is reported as a [`WalletErrorKind::Load`] error, connection errors
/// of the loaded adapter are forwarded untouched.
pub struct LazyAdapter {
    name: String,
    icon: String,
    url: String,
    capabilities: Capabilities,
    loader: AdapterLoader,
    state: Rc<AdapterState>,
    loaded: RefCell<Option<(Rc<dyn Adapter>, ListenerId)>>,
}

impl LazyAdapter {
    pub fn new(
        name: impl Into<String>,
        icon: impl Into<String>,
        url: impl Into<String>,
        capabilities: Capabilities,
        host: &dyn DetectionHost,
        loader: AdapterLoader,
    ) -> Self {
        Self {
            name: name.into(),
            icon: icon.into(),
            url: url.into(),
            capabilities,
            loader,
            state: Rc::new(AdapterState::new(lazy_ready_state(host))),
            loaded: RefCell::new(None),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.borrow().is_some()
    }

    async fn load(&self) -> Result<Rc<dyn Adapter>, WalletError> {
        if let Some((adapter, _)) = &*self.loaded.borrow() {
            return Ok(adapter.clone());
        }

        let adapter = (self.loader)()
            .await
            .map_err(|error| error.with_kind(WalletErrorKind::Load))?;

        let listener = forward_events(Rc::downgrade(&self.state), adapter.events());
        log::debug!("wallet adapter `{}' loaded", self.name);
        *self.loaded.borrow_mut() = Some((adapter.clone(), listener));
        Ok(adapter)
    }

    fn loaded_adapter(&self) -> Result<Rc<dyn Adapter>, WalletError> {
        match &*self.loaded.borrow() {
            Some((adapter, _)) if self.state.connected() => Ok(adapter.clone()),
            _ => Err(self
                .state
                .fail(WalletError::from(WalletErrorKind::NotConnected))),
        }
    }

    /// Load the SDK and connect it, without prompting when `silent`.
    async fn connect_with(&self, silent: bool) -> Result<(), WalletError> {
        let Some(_connecting) = self.state.begin_connect() else {
            return Ok(());
        };

        if !self.state.ready_state().is_ready() {
            return Err(self.state.fail(WalletError::new(
                WalletErrorKind::NotReady,
                format!("`{}' is {}", self.name, self.state.ready_state()),
            )));
        }

        let adapter = self.load().await.map_err(|error| self.state.fail(error))?;

        // the loaded adapter publishes its own errors, forwarded above
        if silent {
            adapter.auto_connect().await?;
        } else {
            adapter.connect().await?;
        }

        let Some(public_key) = adapter.public_key() else {
            return Err(self.state.fail(WalletError::new(
                WalletErrorKind::Account,
                "the wallet connected without an account",
            )));
        };

        self.state.set_connected(public_key);
        Ok(())
    }
}

/// Errors are republished as they are, disconnection and account changes
/// update our own state. The initial `Connect` is ignored: `connect` sets
/// the key once the loaded adapter is done.
fn forward_events(state: Weak<AdapterState>, events: &EventEmitter<AdapterEvent>) -> ListenerId {
    events.on(move |event| {
        let Some(state) = state.upgrade() else {
            return;
        };
        match event {
            AdapterEvent::Error(error) => state.report(error.clone()),
            AdapterEvent::Disconnect => state.set_disconnected(),
            AdapterEvent::Connect(public_key) if state.connected() => {
                state.set_connected(*public_key)
            }
            AdapterEvent::Connect(_) | AdapterEvent::ReadyStateChange(_) => {}
        }
    })
}

impl Drop for LazyAdapter {
    fn drop(&mut self) {
        if let Some((adapter, listener)) = self.loaded.get_mut().take() {
            adapter.events().off(listener);
        }
    }
}

#[async_trait(?Send)]
impl Adapter for LazyAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn icon(&self) -> &str {
        &self.icon
    }

    fn url(&self) -> &str {
        &self.url
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
        self.connect_with(false).await
    }

    async fn auto_connect(&self) -> Result<(), WalletError> {
        self.connect_with(true).await
    }

    async fn disconnect(&self) {
        let adapter = self
            .loaded
            .borrow()
            .as_ref()
            .map(|(adapter, _)| adapter.clone());
        if let Some(adapter) = adapter {
            adapter.disconnect().await;
        }
        self.state.set_disconnected();
    }

    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, WalletError> {
        self.loaded_adapter()?.sign_transaction(transaction).await
    }

    async fn sign_all_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError> {
        self.loaded_adapter()?
            .sign_all_transactions(transactions)
            .await
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, WalletError> {
        self.loaded_adapter()?.sign_message(message).await
    }

    async fn send_transaction(
        &self,
        transaction: Transaction,
        connection: &dyn Connection,
        options: &SendOptions,
    ) -> Result<Signature, WalletError> {
        self.loaded_adapter()?
            .send_transaction(transaction, connection, options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ready::testing::FakeHost, testing::MockAdapter};
    use futures::{FutureExt as _, executor::block_on};
    use std::cell::Cell;

    fn lazy(loads: Rc<Cell<u32>>, inner: Option<Rc<MockAdapter>>) -> LazyAdapter {
        LazyAdapter::new(
            "Lazy",
            "data:image/svg+xml;base64,",
            "https://example.com",
            Capabilities::all(),
            &FakeHost::default(),
            Box::new(move || {
                loads.set(loads.get() + 1);
                let inner = inner.clone();
                async move {
                    match inner {
                        Some(adapter) => Ok(adapter as Rc<dyn Adapter>),
                        None => Err(WalletError::new(
                            WalletErrorKind::Connection,
                            "failed to fetch dynamically imported module",
                        )),
                    }
                }
                .boxed_local()
            }),
        )
    }

    #[test]
    fn loadable_until_connected() {
        let loads = Rc::new(Cell::new(0));
        let inner = Rc::new(MockAdapter::installed("Inner"));
        let adapter = lazy(loads.clone(), Some(inner.clone()));

        assert_eq!(adapter.ready_state(), ReadyState::Loadable);
        assert!(!adapter.is_loaded());

        block_on(adapter.connect()).unwrap();
        assert_eq!(adapter.public_key(), Some(inner.key()));
        assert_eq!(loads.get(), 1);

        // the loaded adapter is kept
        block_on(adapter.disconnect());
        block_on(adapter.connect()).unwrap();
        assert_eq!(loads.get(), 1);
        assert_eq!(inner.connect_calls(), 2);
    }

    #[test]
    fn load_failure_is_a_load_error() {
        let loads = Rc::new(Cell::new(0));
        let adapter = lazy(loads.clone(), None);
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        adapter.events().on(move |event| {
            if let AdapterEvent::Error(error) = event {
                sink.borrow_mut().push(error.kind());
            }
        });

        let error = block_on(adapter.connect()).unwrap_err();

        assert_eq!(error.kind(), WalletErrorKind::Load);
        assert_eq!(*errors.borrow(), vec![WalletErrorKind::Load]);
        assert!(!adapter.connecting());
        assert!(!adapter.connected());
    }

    #[test]
    fn auto_connect_stays_silent_once_loaded() {
        let loads = Rc::new(Cell::new(0));
        let inner = Rc::new(MockAdapter::installed("Inner"));
        let adapter = lazy(loads.clone(), Some(inner.clone()));

        block_on(adapter.auto_connect()).unwrap();

        assert_eq!(loads.get(), 1);
        assert_eq!(inner.silent_connects(), 1);
        assert_eq!(adapter.public_key(), Some(inner.key()));
    }

    #[test]
    fn vendor_disconnect_is_forwarded() {
        let inner = Rc::new(MockAdapter::installed("Inner"));
        let adapter = lazy(Rc::new(Cell::new(0)), Some(inner.clone()));
        block_on(adapter.connect()).unwrap();

        inner.vendor_disconnect();

        assert!(!adapter.connected());
    }

    #[test]
    fn unsupported_without_a_page() {
        let adapter = LazyAdapter::new(
            "Lazy",
            "",
            "",
            Capabilities::default(),
            &FakeHost::unsupported(),
            Box::new(|| {
                async { Err::<Rc<dyn Adapter>, _>(WalletError::from(WalletErrorKind::Load)) }
                    .boxed_local()
            }),
        );
        assert_eq!(adapter.ready_state(), ReadyState::Unsupported);

        let error = block_on(adapter.connect()).unwrap_err();
        assert_eq!(error.kind(), WalletErrorKind::NotReady);
    }
}
