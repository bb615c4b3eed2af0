//! Autosave policy: dirty tracking plus the debounced save schedule.
//!
//! Every mutation marks the relevant dirty flag and reschedules the single
//! pending timer, so a burst of edits produces exactly one save, timed from
//! the last edit. A failed save leaves the flags set; the next trigger
//! retries. At most one save is in flight as a matter of scheduling
//! discipline, not a lock.

use std::time::{Duration, Instant};

use crate::debounce::Debouncer;

/// Quiet period between the last edit and the autosave.
pub const AUTOSAVE_QUIET: Duration = Duration::from_millis(1500);

#[derive(Debug)]
pub struct AutosaveBridge {
    debounce: Debouncer,
    text_dirty: bool,
    ink_dirty: bool,
    /// Unix timestamp of the last successful save.
    last_saved_at: Option<i64>,
}

impl Default for AutosaveBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl AutosaveBridge {
    pub fn new() -> Self {
        Self::with_quiet_period(AUTOSAVE_QUIET)
    }

    pub fn with_quiet_period(quiet: Duration) -> Self {
        Self {
            debounce: Debouncer::new(quiet),
            text_dirty: false,
            ink_dirty: false,
            last_saved_at: None,
        }
    }

    pub fn set_quiet_period(&mut self, quiet: Duration) {
        self.debounce.set_quiet_period(quiet);
    }

    /// Text, title or layout changed.
    pub fn mark_text_dirty(&mut self, now: Instant) {
        self.text_dirty = true;
        self.debounce.schedule(now);
    }

    /// A stroke was committed, undone, redone or cleared.
    pub fn mark_ink_dirty(&mut self, now: Instant) {
        self.ink_dirty = true;
        self.debounce.schedule(now);
    }

    /// Reschedule without marking anything dirty (e.g. a resize that only
    /// needs the pending save pushed back).
    pub fn trigger(&mut self, now: Instant) {
        if self.is_dirty() {
            self.debounce.schedule(now);
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.text_dirty || self.ink_dirty
    }

    pub fn text_dirty(&self) -> bool {
        self.text_dirty
    }

    pub fn ink_dirty(&self) -> bool {
        self.ink_dirty
    }

    /// Whether a flush is required before switching notes or closing: any
    /// dirty state or a pending timer.
    pub fn needs_flush(&self) -> bool {
        self.is_dirty() || self.debounce.is_pending()
    }

    /// Whether the debounced save should run now. Consumes the deadline.
    pub fn save_due(&mut self, now: Instant) -> bool {
        self.debounce.fire_if_due(now) && self.is_dirty()
    }

    /// A save succeeded: clear both dirty flags and any pending timer.
    pub fn mark_saved(&mut self, timestamp: i64) {
        self.text_dirty = false;
        self.ink_dirty = false;
        self.debounce.cancel();
        self.last_saved_at = Some(timestamp);
    }

    /// Reset for a freshly loaded note.
    pub fn reset(&mut self) {
        self.text_dirty = false;
        self.ink_dirty = false;
        self.debounce.cancel();
        self.last_saved_at = None;
    }

    pub fn last_saved_at(&self) -> Option<i64> {
        self.last_saved_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_of_edits_yields_one_save_from_last_edit() {
        let start = Instant::now();
        let mut bridge = AutosaveBridge::new();

        // Five edits 100ms apart, all inside the quiet window.
        for i in 0..5 {
            bridge.mark_text_dirty(start + Duration::from_millis(100 * i));
        }
        let last_edit = start + Duration::from_millis(400);

        // Not due one quiet period after the first edit.
        assert!(!bridge.save_due(start + AUTOSAVE_QUIET));
        // Due one quiet period after the last edit.
        assert!(bridge.save_due(last_edit + AUTOSAVE_QUIET));
        // And only once.
        assert!(!bridge.save_due(last_edit + AUTOSAVE_QUIET * 2));
    }

    #[test]
    fn save_clears_dirty_state() {
        let start = Instant::now();
        let mut bridge = AutosaveBridge::new();
        bridge.mark_ink_dirty(start);
        bridge.mark_text_dirty(start);
        assert!(bridge.needs_flush());

        bridge.mark_saved(1_700_000_000);
        assert!(!bridge.is_dirty());
        assert!(!bridge.needs_flush());
        assert_eq!(bridge.last_saved_at(), Some(1_700_000_000));
    }

    #[test]
    fn failed_save_keeps_flags_for_retry() {
        let start = Instant::now();
        let mut bridge = AutosaveBridge::new();
        bridge.mark_ink_dirty(start);

        assert!(bridge.save_due(start + AUTOSAVE_QUIET));
        // Save failed: nothing cleared. The next trigger schedules a retry.
        assert!(bridge.is_dirty());
        bridge.trigger(start + AUTOSAVE_QUIET);
        assert!(bridge.save_due(start + AUTOSAVE_QUIET * 2));
    }

    #[test]
    fn timer_without_dirty_state_does_not_save() {
        let start = Instant::now();
        let mut bridge = AutosaveBridge::new();
        bridge.mark_text_dirty(start);
        bridge.mark_saved(1);
        // Deadline was cancelled by the save.
        assert!(!bridge.save_due(start + AUTOSAVE_QUIET * 4));
    }

    #[test]
    fn trigger_without_dirty_state_is_inert() {
        let start = Instant::now();
        let mut bridge = AutosaveBridge::new();
        bridge.trigger(start);
        assert!(!bridge.needs_flush());
    }
}
