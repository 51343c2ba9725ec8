/*!
Window events of the wallet standard.

On start up the page dispatches `wallet-standard:app-ready` carrying a
`register` API, wallets loaded before the page call it. Wallets loaded after
dispatch `wallet-standard:register-wallet` with a callback we answer with the
same API.
*/

use super::{bytes_of, call_method, property, release, window};
use crate::{
    error::{ProviderError, WalletError, WalletErrorKind},
    event::Cancel,
    ffi::{JsStandardAccount, JsStandardWallet},
    key::{PublicKey, Signature},
    standard::{
        CONNECT, DISCONNECT, EVENTS, SIGN_AND_SEND_TRANSACTION, SIGN_MESSAGE, SIGN_TRANSACTION,
        StandardAccount, StandardChange, StandardFeature, StandardWallet, StandardWalletRegistry,
    },
    transaction::{SendOptions, Transaction, TransactionVersion},
};
use async_trait::async_trait;
use js_sys::{Array, Function, Object, Reflect, Uint8Array};
use std::{collections::BTreeSet, rc::Rc};
use wasm_bindgen::{JsCast as _, JsValue, closure::Closure};
use web_sys::{CustomEvent, CustomEventInit, Event};

pub const APP_READY_EVENT: &str = "wallet-standard:app-ready";
pub const REGISTER_WALLET_EVENT: &str = "wallet-standard:register-wallet";

/// the chain transactions are signed for when none is configured
pub const DEFAULT_CHAIN: &str = "solana:mainnet";

/// A [`StandardWallet`] living in the page.
#[derive(Clone)]
pub struct BrowserStandardWallet {
    wallet: JsStandardWallet,
    chain: String,
}

impl BrowserStandardWallet {
    pub fn new(wallet: JsStandardWallet, chain: impl Into<String>) -> Self {
        Self {
            wallet,
            chain: chain.into(),
        }
    }

    fn feature(&self, name: &str) -> JsValue {
        property(self.wallet.features().as_ref(), name)
    }

    fn js_account(&self, account: &StandardAccount) -> Option<JsStandardAccount> {
        self.wallet
            .accounts()
            .iter()
            .map(|account| account.unchecked_into::<JsStandardAccount>())
            .find(|candidate| candidate.address() == account.address)
    }

    /// Build the input object of the signing features: `{ account, chain,
    /// ... }` plus `extra`.
    fn input(
        &self,
        account: &StandardAccount,
        kind: WalletErrorKind,
        extra: &[(&str, JsValue)],
    ) -> Result<JsValue, WalletError> {
        let js_account = self.js_account(account).ok_or_else(|| {
            WalletError::new(
                WalletErrorKind::Account,
                format!("`{}' no longer holds {}", self.wallet.name(), account.address),
            )
        })?;

        let input = Object::new();
        let fields = [
            ("account", JsValue::from(js_account)),
            ("chain", JsValue::from_str(&self.chain)),
        ];
        for (key, value) in fields.iter().chain(extra) {
            Reflect::set(&input, &JsValue::from_str(key), value)
                .map_err(|error| ProviderError::from_js(kind, error))?;
        }
        Ok(input.into())
    }

    /// Call `method` of `feature` with `args`, the signing features resolve
    /// to one output per input.
    async fn call_feature(
        &self,
        feature: &str,
        method: &str,
        args: &[JsValue],
        kind: WalletErrorKind,
    ) -> Result<JsValue, WalletError> {
        call_method(&self.feature(feature), method, args)
            .await
            .map_err(|error| ProviderError::from_js(kind, error))
    }

    async fn first_output(
        &self,
        feature: &str,
        method: &str,
        input: JsValue,
        kind: WalletErrorKind,
    ) -> Result<JsValue, WalletError> {
        let outputs = self.call_feature(feature, method, &[input], kind).await?;
        outputs
            .dyn_ref::<Array>()
            .map(|outputs| outputs.get(0))
            .filter(|output| !output.is_undefined())
            .ok_or_else(|| WalletError::new(kind, format!("Unexpected `{method}' output: {outputs:?}")))
    }
}

fn parse_account(value: JsValue) -> Option<StandardAccount> {
    let account = value.unchecked_into::<JsStandardAccount>();
    let public_key = PublicKey::try_from(account.public_key().to_vec().as_slice());

    match public_key {
        Ok(public_key) => Some(StandardAccount {
            address: account.address(),
            public_key,
        }),
        Err(error) => {
            log::warn!("ignoring wallet account `{}': {error}", account.address());
            None
        }
    }
}

fn parse_accounts(value: &JsValue) -> Vec<StandardAccount> {
    value
        .dyn_ref::<Array>()
        .map(|accounts| accounts.iter().filter_map(parse_account).collect())
        .unwrap_or_default()
}

/// `["legacy", 0]` in the wallet's declaration
fn parse_versions(value: &JsValue) -> Option<BTreeSet<TransactionVersion>> {
    let versions = value.dyn_ref::<Array>()?;
    Some(
        versions
            .iter()
            .filter_map(|version| match (version.as_string(), version.as_f64()) {
                (Some(name), _) if name == "legacy" => Some(TransactionVersion::Legacy),
                (_, Some(number)) if number == 0.0 => Some(TransactionVersion::V0),
                _ => None,
            })
            .collect(),
    )
}

fn parse_features(features: &Object) -> Vec<StandardFeature> {
    Object::keys(features)
        .iter()
        .filter_map(|name| name.as_string())
        .map(|name| {
            let feature = property(features.as_ref(), &name);
            StandardFeature {
                version: property(&feature, "version").as_string().unwrap_or_default(),
                supported_transaction_versions: parse_versions(&property(
                    &feature,
                    "supportedTransactionVersions",
                )),
                name,
            }
        })
        .collect()
}

#[async_trait(?Send)]
impl StandardWallet for BrowserStandardWallet {
    fn name(&self) -> String {
        self.wallet.name()
    }

    fn icon(&self) -> String {
        self.wallet.icon()
    }

    fn version(&self) -> String {
        self.wallet.version()
    }

    fn features(&self) -> Vec<StandardFeature> {
        parse_features(&self.wallet.features())
    }

    fn accounts(&self) -> Vec<StandardAccount> {
        parse_accounts(self.wallet.accounts().as_ref())
    }

    async fn connect(&self, silent: bool) -> Result<Vec<StandardAccount>, WalletError> {
        let input = Object::new();
        Reflect::set(&input, &JsValue::from_str("silent"), &JsValue::from_bool(silent))
            .map_err(|error| ProviderError::from_js(WalletErrorKind::Connection, error))?;

        let output = self
            .call_feature(CONNECT, "connect", &[input.into()], WalletErrorKind::Connection)
            .await?;
        Ok(parse_accounts(&property(&output, "accounts")))
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.call_feature(DISCONNECT, "disconnect", &[], WalletErrorKind::Disconnection)
            .await
            .map(|_| ())
    }

    fn on_change(&self, listener: Box<dyn Fn(&StandardChange)>) -> Cancel {
        let closure = Closure::<dyn FnMut(JsValue)>::new(move |properties: JsValue| {
            let accounts = property(&properties, "accounts");
            let features = property(&properties, "features");
            listener(&StandardChange {
                accounts: (!accounts.is_undefined()).then(|| parse_accounts(&accounts)),
                features: features.dyn_ref::<Object>().map(parse_features),
            });
        });

        let on = property(&self.feature(EVENTS), "on").dyn_into::<Function>();
        let off = on.and_then(|on| {
            on.call2(
                &self.feature(EVENTS),
                &JsValue::from_str("change"),
                closure.as_ref(),
            )
        });

        match off {
            Ok(off) => Cancel::new(move || {
                if let Some(off) = off.dyn_ref::<Function>() {
                    // nothing to undo if the wallet already forgot us
                    let _ = off.call0(&JsValue::UNDEFINED);
                }
                release(closure);
            }),
            Err(error) => {
                log::warn!(
                    "couldn't subscribe to the changes of `{}': {error:?}",
                    self.wallet.name()
                );
                Cancel::noop()
            }
        }
    }

    async fn sign_transaction(
        &self,
        account: &StandardAccount,
        transaction: &Transaction,
    ) -> Result<Transaction, WalletError> {
        let kind = WalletErrorKind::SignTransaction;
        let input = self.input(
            account,
            kind,
            &[(
                "transaction",
                Uint8Array::from(transaction.as_bytes()).into(),
            )],
        )?;

        let output = self
            .first_output(SIGN_TRANSACTION, "signTransaction", input, kind)
            .await?;
        let signed = bytes_of(&property(&output, "signedTransaction"))
            .ok_or_else(|| WalletError::new(kind, "missing `signedTransaction'"))?;
        Ok(transaction.with_bytes(signed))
    }

    async fn sign_and_send_transaction(
        &self,
        account: &StandardAccount,
        transaction: &Transaction,
        options: &SendOptions,
    ) -> Result<Signature, WalletError> {
        let kind = WalletErrorKind::SendTransaction;
        let options = serde_wasm_bindgen::to_value(options).map_err(|error| {
            WalletError::new(kind, format!("Couldn't encode the send options: {error}"))
        })?;
        let input = self.input(
            account,
            kind,
            &[
                (
                    "transaction",
                    Uint8Array::from(transaction.as_bytes()).into(),
                ),
                ("options", options),
            ],
        )?;

        let output = self
            .first_output(SIGN_AND_SEND_TRANSACTION, "signAndSendTransaction", input, kind)
            .await?;
        let signature = bytes_of(&property(&output, "signature"))
            .ok_or_else(|| WalletError::new(kind, "missing `signature'"))?;
        Signature::try_from(signature.as_slice()).map_err(|error| error.with_kind(kind))
    }

    async fn sign_message(
        &self,
        account: &StandardAccount,
        message: &[u8],
    ) -> Result<Signature, WalletError> {
        let kind = WalletErrorKind::SignMessage;
        let input = self.input(
            account,
            kind,
            &[("message", Uint8Array::from(message).into())],
        )?;

        let output = self
            .first_output(SIGN_MESSAGE, "signMessage", input, kind)
            .await?;
        let signature = bytes_of(&property(&output, "signature"))
            .ok_or_else(|| WalletError::new(kind, "missing `signature'"))?;
        Signature::try_from(signature.as_slice())
    }
}

/// Feed the wallets announced in the page to `registry`.
///
/// Dispatches `wallet-standard:app-ready` and listens to
/// `wallet-standard:register-wallet` until the returned [`Cancel`] runs.
/// Wallets sign transactions for `chain` (e.g. [`DEFAULT_CHAIN`]).
pub fn listen_for_wallets(
    registry: Rc<StandardWalletRegistry>,
    chain: &str,
) -> Result<Cancel, WalletError> {
    let Some(window) = window() else {
        log::debug!("not in a browser page, no standard wallet will register");
        return Ok(Cancel::noop());
    };
    let fail = |error: JsValue| ProviderError::from_js(WalletErrorKind::NotReady, error);

    let chain = chain.to_owned();
    let register = Closure::<dyn FnMut(Array)>::new(move |wallets: Array| {
        for wallet in wallets.iter() {
            let wallet = BrowserStandardWallet::new(wallet.unchecked_into(), chain.clone());
            registry.register(Rc::new(wallet));
        }
    });

    // wallets call `register(...wallets)` and expect an unregister function
    // back, which we do not support
    let variadic = Function::new_with_args(
        "register",
        "return function (...wallets) { register(wallets); return function () {}; };",
    );
    let api = Object::new();
    Reflect::set(
        &api,
        &JsValue::from_str("register"),
        &variadic.call1(&JsValue::UNDEFINED, register.as_ref()).map_err(fail)?,
    )
    .map_err(fail)?;

    let callback_api = api.clone();
    let on_register = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
        let callback = event
            .dyn_ref::<CustomEvent>()
            .and_then(|event| event.detail().dyn_into::<Function>().ok());
        match callback {
            Some(callback) => {
                if let Err(error) = callback.call1(&JsValue::UNDEFINED, &callback_api) {
                    log::warn!("a wallet failed to register: {error:?}");
                }
            }
            None => log::warn!("ignoring malformed `{REGISTER_WALLET_EVENT}' event"),
        }
    });
    window
        .add_event_listener_with_callback(
            REGISTER_WALLET_EVENT,
            on_register.as_ref().unchecked_ref(),
        )
        .map_err(fail)?;

    let init = CustomEventInit::new();
    init.set_detail(&api);
    let app_ready = CustomEvent::new_with_event_init_dict(APP_READY_EVENT, &init).map_err(fail)?;
    window.dispatch_event(&app_ready).map_err(fail)?;

    Ok(Cancel::new(move || {
        if let Some(window) = super::window() {
            // nothing to undo if the page is going away
            let _ = window.remove_event_listener_with_callback(
                REGISTER_WALLET_EVENT,
                on_register.as_ref().unchecked_ref(),
            );
        }
        release(on_register);
        release(register);
    }))
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn nothing_to_listen_to_off_the_web() {
        let registry = Rc::new(StandardWalletRegistry::new());
        let cancel = listen_for_wallets(registry.clone(), DEFAULT_CHAIN).unwrap();
        cancel.cancel();
        assert!(registry.adapters().is_empty());
    }
}
