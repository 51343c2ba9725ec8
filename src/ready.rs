/*!
Readiness detection.

Wallets injected by browser extensions show up at some point during page
load, not necessarily before our code runs. [`scope_polling_detect`] keeps
looking for them for a bounded amount of time, [`lazy_ready_state`] is for
adapters that import their SDK on `connect`.

The environment is reached through a [`DetectionHost`] so the strategies
can be driven by hand in tests, see [`BrowserHost`](crate::BrowserHost) for
the real one.
*/

use crate::{adapter::ReadyState, config::DetectorConfig, event::Cancel};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

pub trait DetectionHost {
    /// `false` outside of a browser page (server side rendering, workers,
    /// native tests): nothing will ever be detected there.
    fn is_supported(&self) -> bool;

    /// run `callback` every `interval_ms` until cancelled
    fn set_interval(&self, interval_ms: u32, callback: Box<dyn FnMut()>) -> Cancel;

    /// run `callback` on the document `readystatechange` and
    /// `DOMContentLoaded` events and on the window `load` event, for the
    /// ones that did not happen yet
    fn on_page_ready(&self, callback: Rc<dyn Fn()>) -> Cancel;
}

/// Starting state for an adapter whose provider is injected in the page.
pub fn initial_ready_state(host: &dyn DetectionHost) -> ReadyState {
    if host.is_supported() {
        ReadyState::NotDetected
    } else {
        ReadyState::Unsupported
    }
}

/// Adapters importing their SDK on demand are loadable wherever a page is.
pub fn lazy_ready_state(host: &dyn DetectionHost) -> ReadyState {
    if host.is_supported() {
        ReadyState::Loadable
    } else {
        ReadyState::Unsupported
    }
}

struct Detection {
    predicate: Box<dyn Fn() -> bool>,
    on_detected: RefCell<Option<Box<dyn FnOnce()>>>,
    attempts: u32,
    ticks: Cell<u32>,
    done: Cell<bool>,
    interval: RefCell<Option<Cancel>>,
    page_ready: RefCell<Option<Cancel>>,
}

impl Detection {
    fn check(&self) -> bool {
        if self.done.get() {
            return true;
        }
        if !(self.predicate)() {
            return false;
        }

        self.done.set(true);
        self.stop();
        let on_detected = self.on_detected.borrow_mut().take();
        if let Some(on_detected) = on_detected {
            on_detected();
        }
        true
    }

    fn tick(&self) {
        if self.check() {
            return;
        }

        let ticks = self.ticks.get() + 1;
        self.ticks.set(ticks);
        if ticks >= self.attempts {
            log::debug!("wallet not detected after {ticks} attempts, stop polling");
            let interval = self.interval.borrow_mut().take();
            drop(interval);
        }
    }

    fn stop(&self) {
        let interval = self.interval.borrow_mut().take();
        let page_ready = self.page_ready.borrow_mut().take();
        drop(interval);
        drop(page_ready);
    }
}

/// Keeps a running detection alive, dropping it stops the detection.
pub struct DetectionHandle(Option<Rc<Detection>>);

impl DetectionHandle {
    pub fn is_detected(&self) -> bool {
        self.0.as_ref().is_some_and(|detection| detection.done.get())
    }

    /// whether a timer or a page event may still detect the wallet
    pub fn is_polling(&self) -> bool {
        self.0.as_ref().is_some_and(|detection| {
            detection.interval.borrow().is_some() || detection.page_ready.borrow().is_some()
        })
    }

    pub fn stop(&self) {
        if let Some(detection) = &self.0 {
            detection.stop();
        }
    }
}

/// Look for a wallet until `predicate` holds.
///
/// The predicate is evaluated right away, on every page readiness event and
/// every `config.interval_ms` for at most `config.attempts` ticks.
/// `on_detected` is called at most once. Nothing is scheduled on an
/// unsupported host.
pub fn scope_polling_detect(
    host: &dyn DetectionHost,
    config: DetectorConfig,
    predicate: impl Fn() -> bool + 'static,
    on_detected: impl FnOnce() + 'static,
) -> DetectionHandle {
    if !host.is_supported() {
        return DetectionHandle(None);
    }

    let detection = Rc::new(Detection {
        predicate: Box::new(predicate),
        on_detected: RefCell::new(Some(Box::new(on_detected))),
        attempts: config.attempts,
        ticks: Cell::new(0),
        done: Cell::new(false),
        interval: RefCell::new(None),
        page_ready: RefCell::new(None),
    });

    if detection.check() {
        return DetectionHandle(Some(detection));
    }

    if config.attempts > 0 {
        let weak = Rc::downgrade(&detection);
        let interval = host.set_interval(
            config.interval_ms,
            Box::new(move || {
                if let Some(detection) = weak.upgrade() {
                    detection.tick();
                }
            }),
        );
        *detection.interval.borrow_mut() = Some(interval);
    }

    let weak = Rc::downgrade(&detection);
    let page_ready = host.on_page_ready(Rc::new(move || {
        if let Some(detection) = weak.upgrade() {
            detection.check();
        }
    }));
    *detection.page_ready.borrow_mut() = Some(page_ready);

    DetectionHandle(Some(detection))
}
