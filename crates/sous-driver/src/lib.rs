//! Timer driver: the polling observer that turns wall-clock time into
//! session store commands.
//!
//! Any number of drivers may watch the same session. Each poll measures
//! elapsed time against the timestamp stored in the record (never against a
//! driver-local clock) and goes through the store's atomic
//! `tick_elapsed` / `advance_if_expired` commands, so concurrent drivers
//! neither double-count time nor double-advance a step.

mod catalog;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sous_protocol::{ObserverId, RecipeCatalog, RecipeId, SessionEvent};
use sous_store::{Ignored, SessionStore, Transition};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, trace, warn};

pub use catalog::InMemoryRecipeCatalog;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Delay between polls.
    pub poll_interval_ms: u64,
    /// Minimum elapsed time before a tick is submitted. The store never
    /// ticks on less than one second, so smaller values behave as 1000.
    pub tick_threshold_ms: u64,
}

impl DriverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            tick_threshold_ms: 1_000,
        }
    }
}

/// Which session an observer drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverTarget {
    /// Whatever session is currently active (a background mini player).
    ActiveSession,
    /// One recipe's session only (a full-screen cooking view).
    Recipe(RecipeId),
}

/// What a single poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// No session to drive.
    Idle,
    Paused {
        recipe_id: RecipeId,
    },
    /// Running, but less than the tick threshold has elapsed.
    Waiting {
        recipe_id: RecipeId,
        elapsed_ms: u64,
    },
    Ticked {
        recipe_id: RecipeId,
        elapsed_seconds: u64,
        step_remaining_seconds: u64,
    },
    Advanced {
        recipe_id: RecipeId,
        step_index: usize,
    },
    Ended {
        recipe_id: RecipeId,
    },
    /// The step ran out but the recipe could not be looked up.
    RecipeMissing {
        recipe_id: RecipeId,
    },
    /// The store answered the tick with something other than a tick, a
    /// threshold miss or a state change; nothing further was attempted.
    Unexpected {
        recipe_id: RecipeId,
        transition: Transition,
    },
}

#[derive(Clone)]
pub struct TimerDriver {
    id: ObserverId,
    store: SessionStore,
    catalog: Arc<dyn RecipeCatalog>,
    target: ObserverTarget,
    config: DriverConfig,
}

impl TimerDriver {
    pub fn new(
        store: SessionStore,
        catalog: Arc<dyn RecipeCatalog>,
        target: ObserverTarget,
        config: DriverConfig,
    ) -> Self {
        Self {
            id: ObserverId::new_uuid(),
            store,
            catalog,
            target,
            config,
        }
    }

    fn resolve_target(&self) -> Option<RecipeId> {
        match &self.target {
            ObserverTarget::ActiveSession => self.store.active_recipe_id(),
            ObserverTarget::Recipe(recipe_id) => Some(recipe_id.clone()),
        }
    }

    /// One observation: tick if enough time has passed, then advance or end
    /// the session if the current step has run out.
    pub fn poll_once(&self) -> PollOutcome {
        let Some(recipe_id) = self.resolve_target() else {
            return PollOutcome::Idle;
        };
        let Some(record) = self.store.record(&recipe_id) else {
            return PollOutcome::Idle;
        };
        if !record.is_running {
            return PollOutcome::Paused { recipe_id };
        }

        let outcome = match self
            .store
            .tick_elapsed(&recipe_id, self.config.tick_threshold_ms)
        {
            Transition::Applied(SessionEvent::Ticked {
                elapsed_seconds,
                step_remaining_seconds,
                ..
            }) => PollOutcome::Ticked {
                recipe_id: recipe_id.clone(),
                elapsed_seconds,
                step_remaining_seconds,
            },
            Transition::Ignored(Ignored::BelowThreshold { elapsed_ms }) => PollOutcome::Waiting {
                recipe_id: recipe_id.clone(),
                elapsed_ms,
            },
            Transition::Ignored(Ignored::NotRunning) => return PollOutcome::Paused { recipe_id },
            Transition::Ignored(Ignored::NoSession) => return PollOutcome::Idle,
            transition @ (Transition::Applied(_)
            | Transition::Ignored(
                Ignored::AlreadyRunning
                | Ignored::StepNotExpired
                | Ignored::StaleStep { .. }
                | Ignored::MissingNextStep,
            )) => {
                warn!(observer = %self.id, recipe_id = %recipe_id, ?transition, "unexpected tick result");
                return PollOutcome::Unexpected {
                    recipe_id,
                    transition,
                };
            }
        };

        // Expiry is checked against fresh state: another observer may have
        // ticked or advanced since the record above was read.
        let Some(record) = self.store.record(&recipe_id) else {
            return PollOutcome::Idle;
        };
        if !(record.is_running && record.is_step_expired()) {
            return outcome;
        }

        let Some(recipe) = self.catalog.recipe(&recipe_id) else {
            warn!(observer = %self.id, recipe_id = %recipe_id, "step expired but recipe is unknown");
            return PollOutcome::RecipeMissing { recipe_id };
        };
        let next = recipe.next_step(record.current_step_index);
        match self
            .store
            .advance_if_expired(&recipe_id, record.current_step_index, next)
        {
            Transition::Applied(SessionEvent::StepAdvanced { step_index, .. }) => {
                PollOutcome::Advanced {
                    recipe_id,
                    step_index,
                }
            }
            Transition::Applied(SessionEvent::Ended { .. }) => PollOutcome::Ended { recipe_id },
            // Lost the race to another observer.
            _ => outcome,
        }
    }

    /// Starts polling on the current tokio runtime.
    pub fn spawn(self) -> DriverHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let id = self.id.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.poll_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(observer = %self.id, target = ?self.target, "timer observer started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let outcome = self.poll_once();
                        trace!(observer = %self.id, ?outcome, "poll");
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!(observer = %self.id, "timer observer stopped");
        });

        DriverHandle {
            id,
            stop: stop_tx,
            task: Some(task),
        }
    }
}

/// Owner of a running observer. Stopping (or dropping) it only stops the
/// polling; the session itself is left untouched.
#[derive(Debug)]
pub struct DriverHandle {
    id: ObserverId,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl DriverHandle {
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signals the observer to stop and waits for its task to exit.
    pub async fn stop(mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take()
            && let Err(error) = task.await
        {
            warn!(observer = %self.id, %error, "timer observer task failed");
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}
