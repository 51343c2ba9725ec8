use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    /// A wallet registered through the `wallet-standard:register-wallet`
    /// window event.
    #[derive(Clone, PartialEq)]
    pub type JsStandardWallet;

    /// A name for the wallet, unique among the registered wallets.
    #[wasm_bindgen(method, getter)]
    pub fn name(this: &JsStandardWallet) -> String;

    /// The version of the wallet standard the wallet implements.
    #[wasm_bindgen(method, getter)]
    pub fn version(this: &JsStandardWallet) -> String;

    /// A data URI of the wallet's icon.
    #[wasm_bindgen(method, getter)]
    pub fn icon(this: &JsStandardWallet) -> String;

    /// The features, keyed by feature name (e.g. `"standard:connect"`).
    /// Each value holds the feature's `version` and its methods.
    #[wasm_bindgen(method, getter)]
    pub fn features(this: &JsStandardWallet) -> js_sys::Object;

    /// Array of [`JsStandardAccount`] the page is authorized to use.
    #[wasm_bindgen(method, getter)]
    pub fn accounts(this: &JsStandardWallet) -> js_sys::Array;

    #[derive(Clone, PartialEq)]
    pub type JsStandardAccount;

    #[wasm_bindgen(method, getter)]
    pub fn address(this: &JsStandardAccount) -> String;

    #[wasm_bindgen(method, getter, js_name = "publicKey")]
    pub fn public_key(this: &JsStandardAccount) -> js_sys::Uint8Array;
}
