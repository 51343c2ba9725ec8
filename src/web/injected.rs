use super::{bytes_of, looks_like_provider, property, provider_at, public_key_of, release};
use crate::{
    adapter::{
        Adapter, AdapterEvent, AdapterState, Capabilities, Capability, ReadyState, sign_and_send,
        unsupported,
    },
    config::DetectorConfig,
    error::{ProviderError, WalletError, WalletErrorKind},
    event::EventEmitter,
    ffi::InjectedProvider,
    key::{PublicKey, Signature},
    ready::{DetectionHandle, DetectionHost, initial_ready_state, scope_polling_detect},
    transaction::{Connection, SendOptions, Transaction},
};
use async_trait::async_trait;
use js_sys::{Array, Uint8Array};
use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};
use wasm_bindgen::{JsCast as _, JsValue, closure::Closure};

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectOptions {
    only_if_trusted: bool,
}

/// Listeners registered on the provider while connected.
struct ProviderListeners {
    provider: InjectedProvider,
    disconnect: Closure<dyn FnMut()>,
    account_changed: Closure<dyn FnMut(JsValue)>,
}

impl ProviderListeners {
    fn attach(provider: InjectedProvider, state: Weak<AdapterState>) -> Self {
        let disconnect = {
            let state = state.clone();
            Closure::<dyn FnMut()>::new(move || {
                if let Some(state) = state.upgrade() {
                    state.set_disconnected();
                }
            })
        };
        let account_changed = Closure::<dyn FnMut(JsValue)>::new(move |public_key: JsValue| {
            let Some(state) = state.upgrade() else {
                return;
            };
            match public_key_of(&public_key) {
                Some(public_key) => state.set_connected(public_key),
                // the wallet switched to an account the page was not
                // approved for
                None => state.set_disconnected(),
            }
        });

        provider.on("disconnect", disconnect.as_ref().unchecked_ref());
        provider.on("accountChanged", account_changed.as_ref().unchecked_ref());

        Self {
            provider,
            disconnect,
            account_changed,
        }
    }

    fn detach(self) {
        self.provider
            .remove_listener("disconnect", self.disconnect.as_ref().unchecked_ref());
        self.provider.remove_listener(
            "accountChanged",
            self.account_changed.as_ref().unchecked_ref(),
        );
        release(self.disconnect);
        release(self.account_changed);
    }
}

/// [`Adapter`] for a provider injected under `window` by a browser
/// extension.
///
/// The provider is looked for with the scoped polling detection: the adapter
/// becomes [`ReadyState::Installed`] once something that looks like a
/// provider shows up at `path`.
pub struct InjectedAdapter {
    name: String,
    icon: String,
    url: String,
    path: String,
    capabilities: Capabilities,
    state: Rc<AdapterState>,
    listeners: RefCell<Option<ProviderListeners>>,
    detection: DetectionHandle,
}

impl InjectedAdapter {
    /// `path` is where the provider gets injected, relative to `window`
    /// (e.g. `"phantom.solana"`).
    pub fn new(
        name: impl Into<String>,
        icon: impl Into<String>,
        url: impl Into<String>,
        path: impl Into<String>,
        capabilities: Capabilities,
        host: &dyn DetectionHost,
        config: DetectorConfig,
    ) -> Self {
        let name = name.into();
        let path = path.into();
        let state = Rc::new(AdapterState::new(initial_ready_state(host)));

        let detection = {
            let path = path.clone();
            let weak = Rc::downgrade(&state);
            let name = name.clone();
            scope_polling_detect(
                host,
                config,
                move || provider_at(&path).is_some_and(|provider| looks_like_provider(&provider)),
                move || {
                    log::debug!("wallet `{name}' detected");
                    if let Some(state) = weak.upgrade() {
                        state.set_ready_state(ReadyState::Installed);
                    }
                },
            )
        };

        Self {
            name,
            icon: icon.into(),
            url: url.into(),
            path,
            capabilities,
            state,
            listeners: RefCell::new(None),
            detection,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// whether the provider is still being looked for
    pub fn is_detecting(&self) -> bool {
        self.detection.is_polling()
    }

    fn provider(&self) -> Option<InjectedProvider> {
        provider_at(&self.path)
            .filter(looks_like_provider)
            .map(|provider| provider.unchecked_into())
    }

    fn connected_provider(&self, kind: WalletErrorKind) -> Result<InjectedProvider, WalletError> {
        if !self.state.connected() {
            return Err(self.state.fail(WalletError::new(
                WalletErrorKind::NotConnected,
                format!("`{}' is not connected", self.name),
            )));
        }
        self.provider().ok_or_else(|| {
            self.state.fail(WalletError::new(
                kind,
                format!("the provider of `{}' went away", self.name),
            ))
        })
    }

    fn detach_listeners(&self) {
        let listeners = self.listeners.borrow_mut().take();
        if let Some(listeners) = listeners {
            listeners.detach();
        }
    }

    async fn connect_with(&self, only_if_trusted: bool) -> Result<(), WalletError> {
        let Some(_connecting) = self.state.begin_connect() else {
            return Ok(());
        };

        let ready_state = self.state.ready_state();
        if ready_state != ReadyState::Installed {
            return Err(self.state.fail(WalletError::new(
                WalletErrorKind::NotReady,
                format!("`{}' is {ready_state}", self.name),
            )));
        }
        let Some(provider) = self.provider() else {
            return Err(self.state.fail(WalletError::new(
                WalletErrorKind::NotInstalled,
                format!("nothing found at `window.{}'", self.path),
            )));
        };

        let options = serde_wasm_bindgen::to_value(&ConnectOptions { only_if_trusted })
            .map_err(|error| {
                self.state.fail(WalletError::new(
                    WalletErrorKind::Connection,
                    format!("Couldn't encode the connect options: {error}"),
                ))
            })?;

        let result = provider
            .connect(options)
            .await
            .map_err(|error| {
                self.state
                    .fail(ProviderError::from_js(WalletErrorKind::Connection, error))
            })?;

        // some providers resolve with `{ publicKey }`, others only update
        // their own `publicKey`
        let public_key = public_key_of(&property(&result, "publicKey"))
            .or_else(|| public_key_of(&provider.public_key()));
        let Some(public_key) = public_key else {
            return Err(self.state.fail(WalletError::new(
                WalletErrorKind::PublicKey,
                "the wallet connected without a valid public key",
            )));
        };

        self.detach_listeners();
        let listeners = ProviderListeners::attach(provider, Rc::downgrade(&self.state));
        *self.listeners.borrow_mut() = Some(listeners);

        self.state.set_connected(public_key);
        Ok(())
    }
}

impl Drop for InjectedAdapter {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.get_mut().take() {
            listeners.detach();
        }
    }
}

#[async_trait(?Send)]
impl Adapter for InjectedAdapter {
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
        self.detach_listeners();

        if let Some(provider) = self.provider() {
            if let Err(error) = provider.disconnect().await {
                self.state.report(ProviderError::from_js(
                    WalletErrorKind::Disconnection,
                    error,
                ));
            }
        }

        self.state.set_disconnected();
    }

    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, WalletError> {
        if !self.capabilities.sign_transaction {
            unsupported(&self.name, Capability::SignTransaction);
        }
        let provider = self.connected_provider(WalletErrorKind::SignTransaction)?;

        let signed = provider
            .sign_transaction(Uint8Array::from(transaction.as_bytes()))
            .await
            .map_err(|error| {
                self.state
                    .fail(ProviderError::from_js(WalletErrorKind::SignTransaction, error))
            })?;

        let bytes = bytes_of(&signed).ok_or_else(|| {
            self.state.fail(WalletError::new(
                WalletErrorKind::SignTransaction,
                format!("Unexpected signed transaction: {signed:?}"),
            ))
        })?;
        Ok(transaction.with_bytes(bytes))
    }

    async fn sign_all_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError> {
        if !self.capabilities.sign_all_transactions {
            unsupported(&self.name, Capability::SignAllTransactions);
        }
        let provider = self.connected_provider(WalletErrorKind::SignTransaction)?;

        let unsigned: Array = transactions
            .iter()
            .map(|transaction| Uint8Array::from(transaction.as_bytes()))
            .collect();
        let signed = provider
            .sign_all_transactions(unsigned)
            .await
            .map_err(|error| {
                self.state
                    .fail(ProviderError::from_js(WalletErrorKind::SignTransaction, error))
            })?;

        let signed: Option<Vec<Vec<u8>>> = signed
            .dyn_ref::<Array>()
            .and_then(|signed| signed.iter().map(|value| bytes_of(&value)).collect());
        match signed {
            Some(signed) if signed.len() == transactions.len() => Ok(transactions
                .iter()
                .zip(signed)
                .map(|(transaction, bytes)| transaction.with_bytes(bytes))
                .collect()),
            _ => Err(self.state.fail(WalletError::new(
                WalletErrorKind::SignTransaction,
                "Unexpected signed transactions",
            ))),
        }
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, WalletError> {
        if !self.capabilities.sign_message {
            unsupported(&self.name, Capability::SignMessage);
        }
        let provider = self.connected_provider(WalletErrorKind::SignMessage)?;

        let signed = provider
            .sign_message(Uint8Array::from(message))
            .await
            .map_err(|error| {
                self.state
                    .fail(ProviderError::from_js(WalletErrorKind::SignMessage, error))
            })?;

        let signature = property(&signed, "signature");
        bytes_of(&signature)
            .or_else(|| bytes_of(&signed))
            .ok_or_else(|| {
                WalletError::new(
                    WalletErrorKind::SignMessage,
                    format!("Unexpected signed message: {signed:?}"),
                )
            })
            .and_then(|bytes| Signature::try_from(bytes.as_slice()))
            .map_err(|error| self.state.fail(error))
    }

    async fn send_transaction(
        &self,
        transaction: Transaction,
        connection: &dyn Connection,
        options: &SendOptions,
    ) -> Result<Signature, WalletError> {
        if !self.capabilities.send_transaction {
            unsupported(&self.name, Capability::SendTransaction);
        }
        let provider = self.connected_provider(WalletErrorKind::SendTransaction)?;

        if !property(provider.as_ref(), "signAndSendTransaction").is_function() {
            return sign_and_send(self, transaction, connection, options).await;
        }

        let js_options = serde_wasm_bindgen::to_value(options).map_err(|error| {
            self.state.fail(WalletError::new(
                WalletErrorKind::SendTransaction,
                format!("Couldn't encode the send options: {error}"),
            ))
        })?;
        let sent = provider
            .sign_and_send_transaction(Uint8Array::from(transaction.as_bytes()), js_options)
            .await
            .map_err(|error| {
                self.state
                    .fail(ProviderError::from_js(WalletErrorKind::SendTransaction, error))
            })?;

        property(&sent, "signature")
            .as_string()
            .ok_or_else(|| {
                WalletError::new(
                    WalletErrorKind::SendTransaction,
                    format!("Unexpected response: {sent:?}"),
                )
            })
            .and_then(|signature| signature.parse())
            .map_err(|error| self.state.fail(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ready::testing::FakeHost;
    use futures::executor::block_on;

    fn phantom(host: &FakeHost) -> InjectedAdapter {
        InjectedAdapter::new(
            "Phantom",
            "data:image/svg+xml;base64,",
            "https://phantom.app",
            "phantom.solana",
            Capabilities::all(),
            host,
            DetectorConfig::default(),
        )
    }

    #[test]
    fn stops_looking_after_the_configured_attempts() {
        let host = FakeHost::default();
        let adapter = phantom(&host);
        assert_eq!(adapter.ready_state(), ReadyState::NotDetected);
        assert!(adapter.is_detecting());

        for _ in 0..3 {
            host.tick();
        }

        assert_eq!(host.active_intervals(), 0);
        assert_eq!(adapter.ready_state(), ReadyState::NotDetected);
        assert_eq!(adapter.path(), "phantom.solana");
    }

    #[test]
    fn undetected_wallet_cannot_connect() {
        let host = FakeHost::default();
        let adapter = phantom(&host);

        let error = block_on(adapter.connect()).unwrap_err();

        assert_eq!(error.kind(), WalletErrorKind::NotReady);
        assert!(!adapter.connecting());
    }

    #[test]
    fn unsupported_host_schedules_nothing() {
        let host = FakeHost::unsupported();
        let adapter = phantom(&host);

        assert_eq!(adapter.ready_state(), ReadyState::Unsupported);
        assert!(!adapter.is_detecting());
        assert_eq!(host.active_intervals(), 0);
        assert_eq!(host.active_page_listeners(), 0);
    }
}
