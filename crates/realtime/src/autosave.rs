//! Autosave coordination.
//!
//! Tracks the unsaved-state flag and decides when the session persists.
//! The coordinator holds no I/O of its own: the session drives it with
//! local-edit notifications, fires the save when the deadline expires,
//! and reports completions back. At most one persistence call is in
//! flight at a time; manual saves are rejected while one is.
//!
//! Every local edit advances a generation counter, and a completing save
//! only clears the unsaved flag when its snapshot generation is still
//! current. A success that raced with a newer edit leaves the flag set
//! and reschedules the autosave so the newer content is not stranded.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{SyncError, SyncResult};

/// User-visible save status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    /// Nothing to report.
    Idle,
    /// A manual save is in flight.
    Saving,
    /// An automatic save is in flight.
    AutoSaving,
    /// The last save succeeded; lingers briefly, then clears.
    Saved,
    /// The last save failed; clears on the next save attempt.
    SaveFailed,
}

/// What initiated a save.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveTrigger {
    Manual,
    Auto,
}

#[derive(Clone, Copy, Debug)]
struct InFlight {
    generation: u64,
    trigger: SaveTrigger,
}

/// Decides when to persist and tracks the unsaved-state flag.
#[derive(Debug)]
pub struct AutosaveCoordinator {
    delay: Duration,
    saved_notice: Duration,
    dirty: bool,
    generation: u64,
    in_flight: Option<InFlight>,
    save_at: Option<Instant>,
    notice_at: Option<Instant>,
    status: SaveStatus,
}

impl AutosaveCoordinator {
    /// Create a coordinator with the given autosave delay and
    /// saved-notice linger.
    pub fn new(delay: Duration, saved_notice: Duration) -> Self {
        Self {
            delay,
            saved_notice,
            dirty: false,
            generation: 0,
            in_flight: None,
            save_at: None,
            notice_at: None,
            status: SaveStatus::Idle,
        }
    }

    /// Whether there are unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether a save is currently in flight.
    pub fn is_saving(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Current user-visible status.
    pub fn status(&self) -> SaveStatus {
        self.status
    }

    /// Edit generation; advances on every local change.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When the autosave fires, if scheduled.
    pub fn save_deadline(&self) -> Option<Instant> {
        self.save_at
    }

    /// When the "Saved" notice clears, if showing.
    pub fn notice_deadline(&self) -> Option<Instant> {
        self.notice_at
    }

    /// Record a local change: set the unsaved flag, advance the
    /// generation, and restart the autosave debounce unless a save is
    /// already in flight.
    pub fn note_local_edit(&mut self) {
        self.dirty = true;
        self.generation += 1;
        if self.in_flight.is_none() {
            self.save_at = Some(Instant::now() + self.delay);
        }
    }

    /// The autosave deadline expired. Returns whether a save should be
    /// issued now.
    pub fn autosave_due(&mut self) -> bool {
        self.save_at = None;
        self.dirty && self.in_flight.is_none()
    }

    /// Begin a save. Fails with [`SyncError::SaveInFlight`] if one is
    /// already outstanding; otherwise returns the generation snapshot to
    /// hand back at completion.
    pub fn begin(&mut self, trigger: SaveTrigger) -> SyncResult<u64> {
        if self.in_flight.is_some() {
            return Err(SyncError::SaveInFlight);
        }
        self.in_flight = Some(InFlight {
            generation: self.generation,
            trigger,
        });
        self.save_at = None;
        self.notice_at = None;
        self.status = match trigger {
            SaveTrigger::Manual => SaveStatus::Saving,
            SaveTrigger::Auto => SaveStatus::AutoSaving,
        };
        Ok(self.generation)
    }

    /// A save completed successfully. Clears the unsaved flag only when
    /// no newer edit advanced the generation since the save began;
    /// returns whether it was cleared.
    pub fn complete_success(&mut self, saved_generation: u64) -> bool {
        self.in_flight = None;
        if saved_generation == self.generation {
            self.dirty = false;
            self.status = SaveStatus::Saved;
            self.notice_at = Some(Instant::now() + self.saved_notice);
            true
        } else {
            // A newer edit exists; the persisted snapshot is already
            // stale. Keep the flag and let the autosave pick it up.
            tracing::debug!(
                saved_generation,
                current = self.generation,
                "save completed against a stale generation"
            );
            self.status = SaveStatus::Idle;
            self.save_at = Some(Instant::now() + self.delay);
            false
        }
    }

    /// A save failed. The unsaved flag stays set and nothing is retried
    /// automatically; the next edit restarts the cycle.
    pub fn complete_failure(&mut self) {
        self.in_flight = None;
        self.status = SaveStatus::SaveFailed;
    }

    /// The saved-notice linger expired.
    pub fn notice_elapsed(&mut self) {
        self.notice_at = None;
        if self.status == SaveStatus::Saved {
            self.status = SaveStatus::Idle;
        }
    }

    /// Cancel all pending deadlines.
    pub fn cancel(&mut self) {
        self.save_at = None;
        self.notice_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> AutosaveCoordinator {
        AutosaveCoordinator::new(Duration::from_millis(3000), Duration::from_millis(2000))
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_edit_schedules_autosave() {
        let mut autosave = coordinator();
        assert!(!autosave.is_dirty());

        autosave.note_local_edit();
        assert!(autosave.is_dirty());
        assert_eq!(
            autosave.save_deadline().unwrap() - Instant::now(),
            Duration::from_millis(3000)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_restart_the_debounce() {
        let mut autosave = coordinator();
        autosave.note_local_edit();
        let first = autosave.save_deadline().unwrap();

        tokio::time::advance(Duration::from_millis(1000)).await;
        autosave.note_local_edit();
        assert_eq!(
            autosave.save_deadline().unwrap() - first,
            Duration::from_millis(1000)
        );
    }

    #[tokio::test]
    async fn test_successful_save_clears_dirty() {
        let mut autosave = coordinator();
        autosave.note_local_edit();

        assert!(autosave.autosave_due());
        let generation = autosave.begin(SaveTrigger::Auto).unwrap();
        assert_eq!(autosave.status(), SaveStatus::AutoSaving);

        assert!(autosave.complete_success(generation));
        assert!(!autosave.is_dirty());
        assert_eq!(autosave.status(), SaveStatus::Saved);
        assert!(autosave.notice_deadline().is_some());
    }

    #[tokio::test]
    async fn test_stale_success_keeps_dirty_and_reschedules() {
        let mut autosave = coordinator();
        autosave.note_local_edit();
        let generation = autosave.begin(SaveTrigger::Auto).unwrap();

        // A newer edit lands while the save is in flight. It must not
        // restart the debounce (a save is outstanding)...
        autosave.note_local_edit();
        assert!(autosave.save_deadline().is_none());

        // ...and the completing save must not clear the flag.
        assert!(!autosave.complete_success(generation));
        assert!(autosave.is_dirty());
        assert_eq!(autosave.status(), SaveStatus::Idle);
        // The newer content gets a fresh autosave deadline.
        assert!(autosave.save_deadline().is_some());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_dirty_without_retry() {
        let mut autosave = coordinator();
        autosave.note_local_edit();
        autosave.autosave_due();
        autosave.begin(SaveTrigger::Auto).unwrap();

        autosave.complete_failure();
        assert!(autosave.is_dirty());
        assert_eq!(autosave.status(), SaveStatus::SaveFailed);
        // No automatic retry is scheduled.
        assert!(autosave.save_deadline().is_none());

        // The next edit restarts the cycle.
        autosave.note_local_edit();
        assert!(autosave.save_deadline().is_some());
    }

    #[tokio::test]
    async fn test_second_save_rejected_while_in_flight() {
        let mut autosave = coordinator();
        autosave.note_local_edit();
        autosave.begin(SaveTrigger::Manual).unwrap();
        assert_eq!(autosave.status(), SaveStatus::Saving);

        assert!(matches!(
            autosave.begin(SaveTrigger::Auto),
            Err(SyncError::SaveInFlight)
        ));
        assert!(matches!(
            autosave.begin(SaveTrigger::Manual),
            Err(SyncError::SaveInFlight)
        ));
    }

    #[tokio::test]
    async fn test_autosave_due_is_false_when_clean_or_saving() {
        let mut autosave = coordinator();
        assert!(!autosave.autosave_due());

        autosave.note_local_edit();
        autosave.begin(SaveTrigger::Manual).unwrap();
        assert!(!autosave.autosave_due());
    }

    #[tokio::test]
    async fn test_saved_notice_clears_to_idle() {
        let mut autosave = coordinator();
        autosave.note_local_edit();
        let generation = autosave.begin(SaveTrigger::Auto).unwrap();
        autosave.complete_success(generation);
        assert_eq!(autosave.status(), SaveStatus::Saved);

        autosave.notice_elapsed();
        assert_eq!(autosave.status(), SaveStatus::Idle);
        assert!(autosave.notice_deadline().is_none());
    }

    #[tokio::test]
    async fn test_cancel_clears_deadlines() {
        let mut autosave = coordinator();
        autosave.note_local_edit();
        assert!(autosave.save_deadline().is_some());

        autosave.cancel();
        assert!(autosave.save_deadline().is_none());
        assert!(autosave.notice_deadline().is_none());
    }
}
