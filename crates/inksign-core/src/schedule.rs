//! Redraw coalescing
//!
//! Any number of redraw requests between two animation frames collapse into
//! one paint. Requests arriving shortly after a paint are held back by a
//! trailing debounce, so a burst ends with exactly one extra paint.
//!
//! The scheduler owns no timers. It tells the host what to arm
//! (`requestAnimationFrame` or `setTimeout`) and the host calls back in.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedrawReason {
    AnnotationsChanged,
    SelectionChanged,
    WindowResized,
    Scrolled,
    ImageResized,
    ImageDecoded,
    PageChanged,
}

impl RedrawReason {
    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of reasons accumulated since the last paint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedrawReasons(u8);

impl RedrawReasons {
    pub fn insert(&mut self, reason: RedrawReason) {
        self.0 |= reason.bit();
    }

    pub fn contains(&self, reason: RedrawReason) -> bool {
        self.0 & reason.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn merge(&mut self, other: RedrawReasons) {
        self.0 |= other.0;
    }

    /// True when the overlay surface has to be re-laid out before painting
    pub fn needs_layout(&self) -> bool {
        self.contains(RedrawReason::WindowResized)
            || self.contains(RedrawReason::Scrolled)
            || self.contains(RedrawReason::ImageResized)
            || self.contains(RedrawReason::PageChanged)
    }
}

/// What the host should arm after a request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduleRequest {
    /// Something is already armed
    Nothing,
    RequestFrame,
    /// Arm a timer; call [`RedrawScheduler::on_timer`] when it fires
    Timeout { delay_ms: f64 },
}

#[derive(Debug, Clone)]
pub struct RedrawScheduler {
    debounce_ms: f64,
    frame_pending: bool,
    timer_pending: bool,
    last_paint: Option<f64>,
    reasons: RedrawReasons,
}

impl RedrawScheduler {
    pub fn new(debounce_ms: f64) -> Self {
        Self {
            debounce_ms: debounce_ms.max(0.0),
            frame_pending: false,
            timer_pending: false,
            last_paint: None,
            reasons: RedrawReasons::default(),
        }
    }

    pub fn is_frame_pending(&self) -> bool {
        self.frame_pending
    }

    pub fn is_idle(&self) -> bool {
        !self.frame_pending && !self.timer_pending
    }

    /// Ask for a repaint at time `now` (ms)
    pub fn request(&mut self, reason: RedrawReason, now: f64) -> ScheduleRequest {
        let mut reasons = RedrawReasons::default();
        reasons.insert(reason);
        self.request_all(reasons, now)
    }

    pub fn request_all(&mut self, reasons: RedrawReasons, now: f64) -> ScheduleRequest {
        if reasons.is_empty() {
            return ScheduleRequest::Nothing;
        }
        self.reasons.merge(reasons);
        if self.frame_pending || self.timer_pending {
            return ScheduleRequest::Nothing;
        }

        match self.last_paint {
            Some(last) if now - last < self.debounce_ms => {
                self.timer_pending = true;
                ScheduleRequest::Timeout {
                    delay_ms: self.debounce_ms - (now - last),
                }
            }
            _ => {
                self.frame_pending = true;
                ScheduleRequest::RequestFrame
            }
        }
    }

    /// The debounce timer fired
    pub fn on_timer(&mut self) -> ScheduleRequest {
        self.timer_pending = false;
        if self.frame_pending || self.reasons.is_empty() {
            return ScheduleRequest::Nothing;
        }
        self.frame_pending = true;
        ScheduleRequest::RequestFrame
    }

    /// An animation frame arrived. Returns the reasons to paint for, or
    /// `None` when the frame was not ours.
    pub fn on_frame(&mut self, now: f64) -> Option<RedrawReasons> {
        if !self.frame_pending {
            return None;
        }
        self.frame_pending = false;
        self.last_paint = Some(now);
        Some(std::mem::take(&mut self.reasons))
    }

    /// Forget armed callbacks, e.g. when the overlay is torn down
    pub fn reset(&mut self) {
        self.frame_pending = false;
        self.timer_pending = false;
        self.reasons = RedrawReasons::default();
    }
}

impl Default for RedrawScheduler {
    fn default() -> Self {
        Self::new(16.0)
    }
}
