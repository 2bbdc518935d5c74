use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sous_events::EventStreamHub;
use sous_protocol::{
    AdvanceCause, Clock, EndCause, NextStep, RecipeId, SessionEvent, SessionEventRecord,
    SessionRecord, SessionState, SessionTable, SystemClock,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const MS_PER_SECOND: u64 = 1_000;

/// How `last_tick_ms` moves when a tick is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickPolicy {
    /// `last_tick_ms = now`; the sub-second part of each delta is dropped.
    #[default]
    Truncate,
    /// `last_tick_ms += whole seconds consumed`; the sub-second part stays
    /// pending and is counted by a later tick.
    CarryRemainder,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub tick_policy: TickPolicy,
}

/// Result of a start command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The recipe already owns the session; nothing changed.
    AlreadyActive,
    /// A different recipe owns the session; nothing changed.
    Rejected { active: RecipeId },
}

/// Why a command left the table untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    NoSession,
    NotRunning,
    AlreadyRunning,
    StepNotExpired,
    /// The caller observed a different step than the record is on.
    StaleStep { observed: usize, current: usize },
    BelowThreshold { elapsed_ms: u64 },
    MissingNextStep,
}

/// Outcome of every mutating command other than start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied(SessionEvent),
    Ignored(Ignored),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn event(&self) -> Option<&SessionEvent> {
        match self {
            Self::Applied(event) => Some(event),
            Self::Ignored(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    table: SessionTable,
    sequence: u64,
}

/// Authoritative holder of the [`SessionTable`].
///
/// Clones share one table. Every command takes the table lock exactly once,
/// so no caller can observe a transition half-applied and all mutations of a
/// record are applied in one total order.
#[derive(Clone)]
pub struct SessionStore {
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    events: EventStreamHub,
    inner: Arc<Mutex<StoreInner>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(
            StoreConfig::default(),
            Arc::new(SystemClock),
            EventStreamHub::default(),
        )
    }
}

impl SessionStore {
    pub fn new(config: StoreConfig, clock: Arc<dyn Clock>, events: EventStreamHub) -> Self {
        Self {
            config,
            clock,
            events,
            inner: Arc::new(Mutex::new(StoreInner::default())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEventRecord> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> SessionTable {
        self.inner.lock().table.clone()
    }

    pub fn record(&self, recipe_id: &RecipeId) -> Option<SessionRecord> {
        self.inner.lock().table.record(recipe_id).cloned()
    }

    pub fn active_recipe_id(&self) -> Option<RecipeId> {
        self.inner.lock().table.active_recipe_id.clone()
    }

    pub fn active_record(&self) -> Option<(RecipeId, SessionRecord)> {
        let inner = self.inner.lock();
        inner
            .table
            .active_record()
            .map(|(id, record)| (id.clone(), record.clone()))
    }

    pub fn state(&self, recipe_id: &RecipeId) -> SessionState {
        self.inner.lock().table.state(recipe_id)
    }

    pub fn start(
        &self,
        recipe_id: &RecipeId,
        total_duration_seconds: u64,
        first_step_duration_seconds: u64,
    ) -> StartOutcome {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();

        match inner.table.active_recipe_id.clone() {
            Some(active) if active != *recipe_id => {
                warn!(
                    recipe_id = %recipe_id,
                    active = %active,
                    "start refused: another session is active"
                );
                self.emit(
                    &mut inner,
                    now,
                    SessionEvent::StartRejected {
                        requested: recipe_id.clone(),
                        active: active.clone(),
                    },
                );
                return StartOutcome::Rejected { active };
            }
            Some(_) if inner.table.by_recipe_id.contains_key(recipe_id) => {
                debug!(recipe_id = %recipe_id, "start ignored: session already active");
                return StartOutcome::AlreadyActive;
            }
            _ => {}
        }

        let record = SessionRecord {
            current_step_index: 0,
            is_running: true,
            step_remaining_seconds: first_step_duration_seconds,
            overall_remaining_seconds: total_duration_seconds.max(first_step_duration_seconds),
            last_tick_ms: Some(now),
        };
        let event = SessionEvent::Started {
            recipe_id: recipe_id.clone(),
            step_remaining_seconds: record.step_remaining_seconds,
            overall_remaining_seconds: record.overall_remaining_seconds,
        };
        inner.table.active_recipe_id = Some(recipe_id.clone());
        inner.table.by_recipe_id.insert(recipe_id.clone(), record);
        self.emit(&mut inner, now, event);

        info!(
            recipe_id = %recipe_id,
            total_duration_seconds,
            first_step_duration_seconds,
            "session started"
        );
        StartOutcome::Started
    }

    /// Freezes the countdown. `last_tick_ms` is left as it was.
    pub fn pause(&self, recipe_id: &RecipeId) -> Transition {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();
        let Some(record) = inner.table.by_recipe_id.get_mut(recipe_id) else {
            return Transition::Ignored(Ignored::NoSession);
        };
        if !record.is_running {
            return Transition::Ignored(Ignored::NotRunning);
        }
        record.is_running = false;
        info!(recipe_id = %recipe_id, step = record.current_step_index, "session paused");
        let event = SessionEvent::Paused {
            recipe_id: recipe_id.clone(),
        };
        Transition::Applied(self.emit(&mut inner, now, event))
    }

    /// Restarts the countdown from now; time spent paused is never counted.
    pub fn resume(&self, recipe_id: &RecipeId) -> Transition {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();
        let Some(record) = inner.table.by_recipe_id.get_mut(recipe_id) else {
            return Transition::Ignored(Ignored::NoSession);
        };
        if record.is_running {
            return Transition::Ignored(Ignored::AlreadyRunning);
        }
        record.is_running = true;
        record.last_tick_ms = Some(now);
        info!(recipe_id = %recipe_id, step = record.current_step_index, "session resumed");
        let event = SessionEvent::Resumed {
            recipe_id: recipe_id.clone(),
        };
        Transition::Applied(self.emit(&mut inner, now, event))
    }

    /// Applies `floor(elapsed_ms / 1000)` seconds to a running record.
    pub fn tick(&self, recipe_id: &RecipeId, elapsed_ms: u64) -> Transition {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();
        self.tick_locked(&mut inner, recipe_id, elapsed_ms, now)
    }

    /// Measures elapsed time against the stored `last_tick_ms` and ticks if
    /// at least `min_elapsed_ms` has passed, all under one lock.
    ///
    /// Thresholds below one second are raised to one second: a tick that
    /// consumes zero whole seconds would still restamp `last_tick_ms` and
    /// lose the time measured so far.
    ///
    /// Concurrent callers are serialized: the second one measures against
    /// the timestamp the first one just wrote, so time is counted once.
    pub fn tick_elapsed(&self, recipe_id: &RecipeId, min_elapsed_ms: u64) -> Transition {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();
        let Some(record) = inner.table.by_recipe_id.get(recipe_id) else {
            return Transition::Ignored(Ignored::NoSession);
        };
        if !record.is_running {
            return Transition::Ignored(Ignored::NotRunning);
        }
        let elapsed_ms = now.saturating_sub(record.last_tick_ms.unwrap_or(now));
        if elapsed_ms < min_elapsed_ms.max(MS_PER_SECOND) {
            return Transition::Ignored(Ignored::BelowThreshold { elapsed_ms });
        }
        self.tick_locked(&mut inner, recipe_id, elapsed_ms, now)
    }

    /// Moves onto the next step once the current one has run out.
    pub fn advance_step(&self, recipe_id: &RecipeId, next: NextStep) -> Transition {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();
        let Some(record) = inner.table.by_recipe_id.get(recipe_id) else {
            return Transition::Ignored(Ignored::NoSession);
        };
        if !record.is_step_expired() {
            return Transition::Ignored(Ignored::StepNotExpired);
        }
        self.enter_next_step(&mut inner, recipe_id, next, AdvanceCause::Expired, now)
    }

    /// Ends the current step early: ends the session on the last step,
    /// otherwise enters `next` exactly as a natural expiry would.
    pub fn stop_current_step(
        &self,
        recipe_id: &RecipeId,
        is_last_step: bool,
        next: Option<NextStep>,
    ) -> Transition {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();
        self.stop_locked(&mut inner, recipe_id, None, is_last_step, next, now)
    }

    /// [`Self::stop_current_step`], applied only while the record is still on
    /// `observed_step_index`. Lets an operator skip the step they were shown
    /// without racing a driver that has just advanced past it.
    pub fn stop_observed_step(
        &self,
        recipe_id: &RecipeId,
        observed_step_index: usize,
        is_last_step: bool,
        next: Option<NextStep>,
    ) -> Transition {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();
        self.stop_locked(
            &mut inner,
            recipe_id,
            Some(observed_step_index),
            is_last_step,
            next,
            now,
        )
    }

    /// Atomic check-and-advance used by timer drivers.
    ///
    /// Applies only if the record is running, still on `observed_step_index`
    /// and has no time left. `next == None` means the expired step was the
    /// last one and the session ends. Whichever observer gets here first wins;
    /// later ones see a different step (or no record) and do nothing.
    pub fn advance_if_expired(
        &self,
        recipe_id: &RecipeId,
        observed_step_index: usize,
        next: Option<NextStep>,
    ) -> Transition {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();
        let Some(record) = inner.table.by_recipe_id.get(recipe_id) else {
            return Transition::Ignored(Ignored::NoSession);
        };
        if !record.is_running {
            return Transition::Ignored(Ignored::NotRunning);
        }
        if record.current_step_index != observed_step_index {
            return Transition::Ignored(Ignored::StaleStep {
                observed: observed_step_index,
                current: record.current_step_index,
            });
        }
        if !record.is_step_expired() {
            return Transition::Ignored(Ignored::StepNotExpired);
        }
        match next {
            Some(next) => {
                self.enter_next_step(&mut inner, recipe_id, next, AdvanceCause::Expired, now)
            }
            None => self.remove_locked(&mut inner, recipe_id, EndCause::Completed, now),
        }
    }

    /// Removes the record and releases the active slot. Idempotent.
    pub fn end_session(&self, recipe_id: &RecipeId) -> Transition {
        let mut inner = self.inner.lock();
        let now = self.clock.now_ms();
        self.remove_locked(&mut inner, recipe_id, EndCause::Abandoned, now)
    }

    fn stop_locked(
        &self,
        inner: &mut StoreInner,
        recipe_id: &RecipeId,
        observed_step_index: Option<usize>,
        is_last_step: bool,
        next: Option<NextStep>,
        now: u64,
    ) -> Transition {
        let Some(record) = inner.table.by_recipe_id.get(recipe_id) else {
            return Transition::Ignored(Ignored::NoSession);
        };
        if let Some(observed) = observed_step_index
            && observed != record.current_step_index
        {
            return Transition::Ignored(Ignored::StaleStep {
                observed,
                current: record.current_step_index,
            });
        }
        if is_last_step {
            return self.remove_locked(inner, recipe_id, EndCause::Stopped, now);
        }
        match next {
            Some(next) => self.enter_next_step(inner, recipe_id, next, AdvanceCause::Skipped, now),
            None => {
                warn!(recipe_id = %recipe_id, "stop ignored: no next step supplied");
                Transition::Ignored(Ignored::MissingNextStep)
            }
        }
    }

    fn tick_locked(
        &self,
        inner: &mut StoreInner,
        recipe_id: &RecipeId,
        elapsed_ms: u64,
        now: u64,
    ) -> Transition {
        let Some(record) = inner.table.by_recipe_id.get_mut(recipe_id) else {
            return Transition::Ignored(Ignored::NoSession);
        };
        if !record.is_running {
            return Transition::Ignored(Ignored::NotRunning);
        }

        let elapsed_seconds = elapsed_ms / MS_PER_SECOND;
        record.step_remaining_seconds = record.step_remaining_seconds.saturating_sub(elapsed_seconds);
        record.overall_remaining_seconds = record
            .overall_remaining_seconds
            .saturating_sub(elapsed_seconds);
        record.last_tick_ms = Some(match self.config.tick_policy {
            TickPolicy::Truncate => now,
            TickPolicy::CarryRemainder => record.last_tick_ms.map_or(now, |last| {
                last.saturating_add(elapsed_seconds * MS_PER_SECOND).min(now)
            }),
        });

        debug!(
            recipe_id = %recipe_id,
            elapsed_ms,
            elapsed_seconds,
            step_remaining_seconds = record.step_remaining_seconds,
            overall_remaining_seconds = record.overall_remaining_seconds,
            "session ticked"
        );
        let event = SessionEvent::Ticked {
            recipe_id: recipe_id.clone(),
            elapsed_seconds,
            step_remaining_seconds: record.step_remaining_seconds,
            overall_remaining_seconds: record.overall_remaining_seconds,
        };
        Transition::Applied(self.emit(inner, now, event))
    }

    fn enter_next_step(
        &self,
        inner: &mut StoreInner,
        recipe_id: &RecipeId,
        next: NextStep,
        cause: AdvanceCause,
        now: u64,
    ) -> Transition {
        let Some(record) = inner.table.by_recipe_id.get_mut(recipe_id) else {
            return Transition::Ignored(Ignored::NoSession);
        };
        if next.overall_remaining_seconds < next.duration_seconds {
            warn!(
                recipe_id = %recipe_id,
                overall_remaining_seconds = next.overall_remaining_seconds,
                duration_seconds = next.duration_seconds,
                "overall remaining below step duration; raising to step duration"
            );
        }
        record.current_step_index += 1;
        record.step_remaining_seconds = next.duration_seconds;
        record.overall_remaining_seconds = next.overall_remaining_seconds.max(next.duration_seconds);
        record.is_running = true;
        record.last_tick_ms = Some(now);

        info!(
            recipe_id = %recipe_id,
            step = record.current_step_index,
            cause = ?cause,
            step_remaining_seconds = record.step_remaining_seconds,
            "session advanced to next step"
        );
        let event = SessionEvent::StepAdvanced {
            recipe_id: recipe_id.clone(),
            step_index: record.current_step_index,
            step_remaining_seconds: record.step_remaining_seconds,
            overall_remaining_seconds: record.overall_remaining_seconds,
            cause,
        };
        Transition::Applied(self.emit(inner, now, event))
    }

    fn remove_locked(
        &self,
        inner: &mut StoreInner,
        recipe_id: &RecipeId,
        cause: EndCause,
        now: u64,
    ) -> Transition {
        let removed = inner.table.by_recipe_id.remove(recipe_id).is_some();
        let was_active = inner.table.active_recipe_id.as_ref() == Some(recipe_id);
        if was_active {
            inner.table.active_recipe_id = None;
        }
        if !removed && !was_active {
            return Transition::Ignored(Ignored::NoSession);
        }

        info!(recipe_id = %recipe_id, cause = ?cause, "session ended");
        let event = SessionEvent::Ended {
            recipe_id: recipe_id.clone(),
            cause,
        };
        Transition::Applied(self.emit(inner, now, event))
    }

    /// Publishes while the lock is held so subscribers see store order.
    fn emit(&self, inner: &mut StoreInner, now: u64, event: SessionEvent) -> SessionEvent {
        inner.sequence += 1;
        self.events.publish(SessionEventRecord {
            at_ms: now,
            sequence: inner.sequence,
            event: event.clone(),
        });
        event
    }
}
