use super::{release, window};
use crate::{event::Cancel, ready::DetectionHost};
use gloo_timers::callback::Interval;
use std::rc::Rc;
use wasm_bindgen::{JsCast as _, closure::Closure};
use web_sys::{AddEventListenerOptions, EventTarget};

/// [`DetectionHost`] of a browser page: a [`gloo_timers`] interval and the
/// document loading events.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserHost;

impl DetectionHost for BrowserHost {
    fn is_supported(&self) -> bool {
        window().is_some()
    }

    fn set_interval(&self, interval_ms: u32, callback: Box<dyn FnMut()>) -> Cancel {
        if window().is_none() {
            return Cancel::noop();
        }
        let interval = Interval::new(interval_ms, callback);
        Cancel::new(move || release(interval.cancel()))
    }

    fn on_page_ready(&self, callback: Rc<dyn Fn()>) -> Cancel {
        let Some(window) = window() else {
            return Cancel::noop();
        };
        let Some(document) = window.document() else {
            return Cancel::noop();
        };

        let closure = Closure::<dyn FnMut()>::new(move || callback());
        let function: js_sys::Function = closure.as_ref().unchecked_ref::<js_sys::Function>().clone();

        let mut targets: Vec<(EventTarget, &'static str)> = Vec::new();
        match document.ready_state().as_str() {
            "loading" => {
                targets.push((document.clone().into(), "DOMContentLoaded"));
                targets.push((document.into(), "readystatechange"));
                targets.push((window.into(), "load"));
            }
            "interactive" => {
                targets.push((document.into(), "readystatechange"));
                targets.push((window.into(), "load"));
            }
            _ => {}
        }

        let options = AddEventListenerOptions::new();
        options.set_once(true);
        for (target, event) in &targets {
            if let Err(error) = target.add_event_listener_with_callback_and_add_event_listener_options(
                event, &function, &options,
            ) {
                log::warn!("couldn't listen to `{event}': {error:?}");
            }
        }

        Cancel::new(move || {
            for (target, event) in &targets {
                // nothing to undo if the listener already went
                let _ = target.remove_event_listener_with_callback(event, &function);
            }
            release(closure);
        })
    }
}
