//! DOM subscriptions and redraw timers
//!
//! Every subscription is a guard that unregisters itself on drop, so tearing
//! down a session cannot leave callbacks pointing at freed state.

use std::cell::Cell;
use std::rc::Rc;

use inksign_core::ScheduleRequest;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{AddEventListenerOptions, Element, Event, EventTarget, ResizeObserver, Window};

pub fn window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("No window available"))
}

/// High resolution timestamp in ms
pub fn now() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or_else(js_sys::Date::now)
}

/// `addEventListener` registration, removed on drop
pub struct EventListener {
    target: EventTarget,
    event: &'static str,
    capture: bool,
    callback: Closure<dyn FnMut(Event)>,
}

impl EventListener {
    pub fn new(
        target: &EventTarget,
        event: &'static str,
        handler: impl FnMut(Event) + 'static,
    ) -> Result<Self, JsValue> {
        Self::with_options(target, event, false, false, handler)
    }

    /// Capturing, passive listener, e.g. for `scroll` on any ancestor
    pub fn passive_capture(
        target: &EventTarget,
        event: &'static str,
        handler: impl FnMut(Event) + 'static,
    ) -> Result<Self, JsValue> {
        Self::with_options(target, event, true, true, handler)
    }

    fn with_options(
        target: &EventTarget,
        event: &'static str,
        capture: bool,
        passive: bool,
        handler: impl FnMut(Event) + 'static,
    ) -> Result<Self, JsValue> {
        let callback = Closure::wrap(Box::new(handler) as Box<dyn FnMut(Event)>);
        let options = AddEventListenerOptions::new();
        options.set_capture(capture);
        options.set_passive(passive);
        target.add_event_listener_with_callback_and_add_event_listener_options(
            event,
            callback.as_ref().unchecked_ref(),
            &options,
        )?;
        Ok(Self {
            target: target.clone(),
            event,
            capture,
            callback,
        })
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        let removed = self.target.remove_event_listener_with_callback_and_bool(
            self.event,
            self.callback.as_ref().unchecked_ref(),
            self.capture,
        );
        if let Err(e) = removed {
            web_sys::console::warn_2(&format!("Failed to remove {} listener", self.event).into(), &e);
        }
    }
}

/// `ResizeObserver` over a set of elements, disconnected on drop
pub struct ResizeWatch {
    observer: ResizeObserver,
    _callback: Closure<dyn FnMut(js_sys::Array)>,
}

impl ResizeWatch {
    pub fn new(handler: impl FnMut() + 'static) -> Result<Self, JsValue> {
        let mut handler = handler;
        let callback = Closure::wrap(Box::new(move |_entries: js_sys::Array| handler())
            as Box<dyn FnMut(js_sys::Array)>);
        let observer = ResizeObserver::new(callback.as_ref().unchecked_ref())?;
        Ok(Self {
            observer,
            _callback: callback,
        })
    }

    pub fn observe(&self, element: &Element) {
        self.observer.observe(element);
    }

    pub fn unobserve(&self, element: &Element) {
        self.observer.unobserve(element);
    }
}

impl Drop for ResizeWatch {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

enum Armed {
    Frame(i32),
    Timer(i32),
}

/// Arms `requestAnimationFrame` / `setTimeout` as the scheduler asks.
/// Pending callbacks are cancelled on drop.
pub struct FrameLoop {
    on_frame: Closure<dyn FnMut(f64)>,
    on_timer: Closure<dyn FnMut()>,
    armed: Rc<Cell<Option<Armed>>>,
}

impl FrameLoop {
    pub fn new(
        mut frame: impl FnMut(f64) + 'static,
        mut timer: impl FnMut() + 'static,
    ) -> Self {
        let armed: Rc<Cell<Option<Armed>>> = Rc::new(Cell::new(None));
        let armed_frame = Rc::clone(&armed);
        let on_frame = Closure::wrap(Box::new(move |ts: f64| {
            armed_frame.set(None);
            frame(ts);
        }) as Box<dyn FnMut(f64)>);
        let armed_timer = Rc::clone(&armed);
        let on_timer = Closure::wrap(Box::new(move || {
            armed_timer.set(None);
            timer();
        }) as Box<dyn FnMut()>);
        Self {
            on_frame,
            on_timer,
            armed,
        }
    }

    pub fn arm(&self, request: ScheduleRequest) -> Result<(), JsValue> {
        let window = window()?;
        match request {
            ScheduleRequest::Nothing => {}
            ScheduleRequest::RequestFrame => {
                let handle = window.request_animation_frame(self.on_frame.as_ref().unchecked_ref())?;
                self.armed.set(Some(Armed::Frame(handle)));
            }
            ScheduleRequest::Timeout { delay_ms } => {
                let handle = window.set_timeout_with_callback_and_timeout_and_arguments_0(
                    self.on_timer.as_ref().unchecked_ref(),
                    delay_ms.ceil() as i32,
                )?;
                self.armed.set(Some(Armed::Timer(handle)));
            }
        }
        Ok(())
    }

    pub fn cancel(&self) {
        let Some(window) = web_sys::window() else {
            return;
        };
        match self.armed.take() {
            Some(Armed::Frame(handle)) => {
                if let Err(e) = window.cancel_animation_frame(handle) {
                    web_sys::console::warn_2(&"Failed to cancel frame".into(), &e);
                }
            }
            Some(Armed::Timer(handle)) => window.clear_timeout_with_handle(handle),
            None => {}
        }
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.cancel();
    }
}
