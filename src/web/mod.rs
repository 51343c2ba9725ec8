/*!
The browser side: page readiness, `localStorage`, injected providers and
standard wallets.

Everything here degrades to "nothing available" when not running in a page,
so the rest of the crate (and its tests) run natively.
*/

mod host;
mod injected;
pub mod standard;
mod storage;

pub use self::{host::BrowserHost, injected::InjectedAdapter, storage::LocalStorage};
use crate::{key::PublicKey, manager::Spawner};
use futures::future::LocalBoxFuture;
use js_sys::{Function, Promise, Reflect, Uint8Array};
use std::rc::Rc;
use wasm_bindgen::{JsCast as _, JsValue, closure::Closure};
use wasm_bindgen_futures::JsFuture;

/// `window`, only in a browser page.
pub(crate) fn window() -> Option<web_sys::Window> {
    if cfg!(target_arch = "wasm32") {
        web_sys::window()
    } else {
        None
    }
}

/// The closure may be the one currently running (an interval cancelled from
/// its own tick, a listener removing itself), it is released on the next
/// turn of the event loop.
pub(crate) fn release<T: ?Sized + 'static>(closure: Closure<T>) {
    wasm_bindgen_futures::spawn_local(async move { drop(closure) });
}

/// [`Spawner`] running the tasks on the page's event loop.
pub fn spawner() -> Spawner {
    Rc::new(|future: LocalBoxFuture<'static, ()>| {
        wasm_bindgen_futures::spawn_local(future)
    })
}

/// attempt to find the object at `path` (e.g. `"phantom.solana"`) from
/// `window`
///
/// Extensions may inject their provider after our code ran, look again
/// later if this returns `None`.
pub fn provider_at(path: &str) -> Option<JsValue> {
    let mut value: JsValue = window()?.into();

    for segment in path.split('.') {
        value = Reflect::get(&value, &JsValue::from_str(segment)).ok()?;
        if !value.is_object() {
            return None;
        }
    }

    Some(value)
}

/// Whether `value` has the methods [`InjectedAdapter`] relies on.
pub fn looks_like_provider(value: &JsValue) -> bool {
    if !value.is_object() {
        return false;
    }

    let has_function_property = |prop: &str| property(value, prop).is_function();

    has_function_property("connect") && has_function_property("disconnect") && has_function_property("on")
}

pub(crate) fn property(target: &JsValue, key: &str) -> JsValue {
    Reflect::get(target, &JsValue::from_str(key)).unwrap_or_default()
}

/// Call `target[method](...args)`, awaiting the result if it is a promise.
pub(crate) async fn call_method(
    target: &JsValue,
    method: &str,
    args: &[JsValue],
) -> Result<JsValue, JsValue> {
    let function = property(target, method)
        .dyn_into::<Function>()
        .map_err(|_| JsValue::from_str(&format!("`{method}' is not a function")))?;

    let result = function.apply(target, &args.iter().collect::<js_sys::Array>())?;

    match result.dyn_into::<Promise>() {
        Ok(promise) => JsFuture::from(promise).await,
        Err(result) => Ok(result),
    }
}

/// The bytes of a `Uint8Array`, or of anything with a `serialize()` method
/// returning one (transaction objects).
pub(crate) fn bytes_of(value: &JsValue) -> Option<Vec<u8>> {
    if let Some(array) = value.dyn_ref::<Uint8Array>() {
        return Some(array.to_vec());
    }

    let serialize = property(value, "serialize").dyn_into::<Function>().ok()?;
    let serialized = serialize.call0(value).ok()?;
    serialized.dyn_ref::<Uint8Array>().map(Uint8Array::to_vec)
}

/// Providers expose keys as base58 strings, raw bytes or key objects.
pub(crate) fn public_key_of(value: &JsValue) -> Option<PublicKey> {
    if value.is_null() || value.is_undefined() {
        return None;
    }
    if let Some(encoded) = value.as_string() {
        return encoded.parse().ok();
    }
    if let Some(bytes) = bytes_of(value) {
        return PublicKey::try_from(bytes.as_slice()).ok();
    }

    let to_bytes = property(value, "toBytes").dyn_into::<Function>().ok()?;
    let bytes = to_bytes.call0(value).ok()?;
    let bytes = bytes.dyn_ref::<Uint8Array>()?.to_vec();
    PublicKey::try_from(bytes.as_slice()).ok()
}
