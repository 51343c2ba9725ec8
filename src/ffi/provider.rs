use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    /// A provider object injected by a browser extension somewhere under
    /// `window`, e.g. `window.phantom.solana`.
    ///
    /// Transactions cross the boundary serialized, as `Uint8Array`s.
    #[derive(Clone, PartialEq)]
    pub type InjectedProvider;

    /// The connected account, `null` while disconnected. Depending on the
    /// wallet this is a base58 string, a `Uint8Array` or an object with a
    /// `toBytes` method.
    #[wasm_bindgen(method, getter, js_name = "publicKey")]
    pub fn public_key(this: &InjectedProvider) -> JsValue;

    #[wasm_bindgen(method, getter, js_name = "isConnected")]
    pub fn is_connected(this: &InjectedProvider) -> Option<bool>;

    /// Prompts the user unless `options` is `{ onlyIfTrusted: true }`, in
    /// which case it fails if the page was not approved before.
    #[wasm_bindgen(method, catch)]
    pub async fn connect(this: &InjectedProvider, options: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch)]
    pub async fn disconnect(this: &InjectedProvider) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch, js_name = "signTransaction")]
    pub async fn sign_transaction(
        this: &InjectedProvider,
        transaction: js_sys::Uint8Array,
    ) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch, js_name = "signAllTransactions")]
    pub async fn sign_all_transactions(
        this: &InjectedProvider,
        transactions: js_sys::Array,
    ) -> Result<JsValue, JsValue>;

    /// Resolves to `{ signature: Uint8Array }`.
    #[wasm_bindgen(method, catch, js_name = "signMessage")]
    pub async fn sign_message(
        this: &InjectedProvider,
        message: js_sys::Uint8Array,
    ) -> Result<JsValue, JsValue>;

    /// Resolves to `{ signature: string }`, base58 encoded.
    #[wasm_bindgen(method, catch, js_name = "signAndSendTransaction")]
    pub async fn sign_and_send_transaction(
        this: &InjectedProvider,
        transaction: js_sys::Uint8Array,
        options: JsValue,
    ) -> Result<JsValue, JsValue>;

    /// `"connect"`, `"disconnect"` or `"accountChanged"`.
    #[wasm_bindgen(method)]
    pub fn on(this: &InjectedProvider, event: &str, listener: &js_sys::Function);

    #[wasm_bindgen(method, js_name = "removeListener")]
    pub fn remove_listener(this: &InjectedProvider, event: &str, listener: &js_sys::Function);
}
