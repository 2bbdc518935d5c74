//! Guided cooking session kernel.
//!
//! [`CookingKernel`] is the explicitly owned handle that UI collaborators and
//! timer observers share. It derives every store argument from the recipe
//! catalog so callers never compute step durations themselves.

pub mod view;

use std::sync::Arc;

use sous_driver::{DriverConfig, DriverHandle, InMemoryRecipeCatalog, ObserverTarget, TimerDriver};
use sous_events::{DEFAULT_EVENT_BUFFER, EventStreamHub};
use sous_protocol::{
    Clock, Recipe, RecipeCatalog, RecipeId, SessionError, SessionEventRecord, SessionRecord,
    SessionResult, SessionState, SessionTable, SystemClock,
};
use sous_store::{Ignored, SessionStore, StartOutcome, StoreConfig, Transition};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

pub use view::{MinuteAnnouncer, SessionView, format_clock, progress_percent};

pub struct KernelBuilder {
    clock: Arc<dyn Clock>,
    store_config: StoreConfig,
    driver_config: DriverConfig,
    event_buffer: usize,
    catalog: Option<Arc<dyn RecipeCatalog>>,
    recipes: Vec<Recipe>,
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            store_config: StoreConfig::default(),
            driver_config: DriverConfig::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            catalog: None,
            recipes: Vec::new(),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store_config(mut self, store_config: StoreConfig) -> Self {
        self.store_config = store_config;
        self
    }

    pub fn driver_config(mut self, driver_config: DriverConfig) -> Self {
        self.driver_config = driver_config;
        self
    }

    pub fn event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }

    /// Uses an external catalog. Recipes added with [`Self::recipe`] are
    /// ignored when one is set.
    pub fn catalog(mut self, catalog: Arc<dyn RecipeCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Seeds the built-in in-memory catalog.
    pub fn recipe(mut self, recipe: Recipe) -> Self {
        self.recipes.push(recipe);
        self
    }

    pub fn build(self) -> CookingKernel {
        let events = EventStreamHub::new(self.event_buffer);
        let store = SessionStore::new(self.store_config, self.clock, events);
        let catalog: Arc<dyn RecipeCatalog> = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(InMemoryRecipeCatalog::new(self.recipes)),
        };

        CookingKernel {
            store,
            catalog,
            driver_config: self.driver_config,
        }
    }
}

#[derive(Clone)]
pub struct CookingKernel {
    store: SessionStore,
    catalog: Arc<dyn RecipeCatalog>,
    driver_config: DriverConfig,
}

impl CookingKernel {
    pub fn builder() -> KernelBuilder {
        KernelBuilder::new()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    fn recipe(&self, recipe_id: &RecipeId) -> SessionResult<Recipe> {
        self.catalog
            .recipe(recipe_id)
            .ok_or_else(|| SessionError::RecipeNotFound(recipe_id.clone()))
    }

    /// Starts a session for `recipe_id` with durations taken from the recipe.
    ///
    /// A refusal because another recipe is active is reported as
    /// [`SessionError::AnotherSessionActive`] so it can be shown to the
    /// operator; the session table is unchanged in that case.
    #[instrument(skip(self), fields(recipe_id = %recipe_id))]
    pub fn start_recipe(&self, recipe_id: &RecipeId) -> SessionResult<StartOutcome> {
        let recipe = self.recipe(recipe_id)?;
        recipe
            .validate()
            .map_err(|source| SessionError::InvalidRecipe {
                recipe_id: recipe_id.clone(),
                source,
            })?;

        match self.store.start(
            recipe_id,
            recipe.total_duration_seconds(),
            recipe.step_duration_seconds(0),
        ) {
            StartOutcome::Rejected { active } => {
                warn!(active = %active, "another session is active");
                Err(SessionError::AnotherSessionActive { active })
            }
            outcome => {
                info!(
                    steps = recipe.step_count(),
                    total_seconds = recipe.total_duration_seconds(),
                    ?outcome,
                    "cooking session requested"
                );
                Ok(outcome)
            }
        }
    }

    #[instrument(skip(self), fields(recipe_id = %recipe_id))]
    pub fn pause(&self, recipe_id: &RecipeId) -> Transition {
        self.store.pause(recipe_id)
    }

    #[instrument(skip(self), fields(recipe_id = %recipe_id))]
    pub fn resume(&self, recipe_id: &RecipeId) -> Transition {
        self.store.resume(recipe_id)
    }

    /// Pauses a running session or resumes a paused one.
    #[instrument(skip(self), fields(recipe_id = %recipe_id))]
    pub fn toggle_pause(&self, recipe_id: &RecipeId) -> Transition {
        match self.store.state(recipe_id) {
            SessionState::Running => self.store.pause(recipe_id),
            SessionState::Paused => self.store.resume(recipe_id),
            SessionState::Absent => Transition::Ignored(Ignored::NoSession),
        }
    }

    /// Stops the current step early: moves to the next step, or ends the
    /// session when the current step is the last one.
    #[instrument(skip(self), fields(recipe_id = %recipe_id))]
    pub fn skip_step(&self, recipe_id: &RecipeId) -> SessionResult<Transition> {
        let Some(record) = self.store.record(recipe_id) else {
            return Ok(Transition::Ignored(Ignored::NoSession));
        };
        let recipe = self.recipe(recipe_id)?;
        let index = record.current_step_index;
        Ok(self.store.stop_observed_step(
            recipe_id,
            index,
            recipe.is_last_step(index),
            recipe.next_step(index),
        ))
    }

    #[instrument(skip(self), fields(recipe_id = %recipe_id))]
    pub fn end_session(&self, recipe_id: &RecipeId) -> Transition {
        self.store.end_session(recipe_id)
    }

    pub fn snapshot(&self) -> SessionTable {
        self.store.snapshot()
    }

    pub fn active_recipe_id(&self) -> Option<RecipeId> {
        self.store.active_recipe_id()
    }

    pub fn record(&self, recipe_id: &RecipeId) -> Option<SessionRecord> {
        self.store.record(recipe_id)
    }

    /// Display projection of one recipe's session, if it has one.
    pub fn view(&self, recipe_id: &RecipeId) -> Option<SessionView> {
        let record = self.store.record(recipe_id)?;
        let recipe = self.catalog.recipe(recipe_id)?;
        Some(SessionView::new(&recipe, &record))
    }

    pub fn active_view(&self) -> Option<SessionView> {
        let (recipe_id, record) = self.store.active_record()?;
        let recipe = self.catalog.recipe(&recipe_id)?;
        Some(SessionView::new(&recipe, &record))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEventRecord> {
        self.store.subscribe()
    }

    /// A timer observer bound to this kernel, not yet polling.
    pub fn observer(&self, target: ObserverTarget) -> TimerDriver {
        TimerDriver::new(
            self.store.clone(),
            self.catalog.clone(),
            target,
            self.driver_config.clone(),
        )
    }

    /// Spawns a polling observer on the current tokio runtime.
    #[instrument(skip(self))]
    pub fn attach_observer(&self, target: ObserverTarget) -> DriverHandle {
        self.observer(target).spawn()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Result;
    use sous_driver::ObserverTarget;
    use sous_protocol::{
        AdvanceCause, EndCause, ManualClock, Recipe, RecipeError, RecipeId, SessionError,
        SessionEvent, SessionState, Step,
    };
    use sous_store::{Ignored, StartOutcome, Transition};

    use crate::{CookingKernel, KernelBuilder};

    const T0: u64 = 1_700_000_000_000;

    fn soup_recipe() -> Recipe {
        Recipe::new(
            "soup",
            "Soup",
            vec![Step::new("sweat onions", 5), Step::new("simmer", 10)],
        )
    }

    fn kernel() -> (CookingKernel, ManualClock) {
        let clock = ManualClock::new(T0);
        let kernel = KernelBuilder::new()
            .clock(Arc::new(clock.clone()))
            .recipe(soup_recipe())
            .recipe(Recipe::new("bread", "Bread", vec![Step::new("knead", 10)]))
            .recipe(Recipe::new("broken", "Broken", vec![]))
            .build();
        (kernel, clock)
    }

    fn soup() -> RecipeId {
        RecipeId::from_string("soup")
    }

    #[test]
    fn start_recipe_derives_durations() -> Result<()> {
        let (kernel, _) = kernel();
        assert_eq!(kernel.start_recipe(&soup())?, StartOutcome::Started);
        let record = kernel.record(&soup()).unwrap();
        assert_eq!(record.step_remaining_seconds, 300);
        assert_eq!(record.overall_remaining_seconds, 900);
        assert_eq!(kernel.start_recipe(&soup())?, StartOutcome::AlreadyActive);
        Ok(())
    }

    #[test]
    fn second_session_is_surfaced_to_the_operator() -> Result<()> {
        let (kernel, _) = kernel();
        kernel.start_recipe(&soup())?;
        let before = kernel.snapshot();

        let error = kernel
            .start_recipe(&"bread".into())
            .expect_err("bread must not start while soup is active");
        assert_eq!(error, SessionError::AnotherSessionActive { active: soup() });
        assert_eq!(error.to_string(), "another session is active: soup");
        assert_eq!(kernel.snapshot(), before);
        Ok(())
    }

    #[test]
    fn unknown_and_invalid_recipes_are_rejected() {
        let (kernel, _) = kernel();
        assert_eq!(
            kernel.start_recipe(&"ghost".into()),
            Err(SessionError::RecipeNotFound("ghost".into()))
        );
        assert_eq!(
            kernel.start_recipe(&"broken".into()),
            Err(SessionError::InvalidRecipe {
                recipe_id: "broken".into(),
                source: RecipeError::NoSteps,
            })
        );
        assert!(kernel.snapshot().is_empty());
    }

    #[test]
    fn toggle_pause_flips_state() -> Result<()> {
        let (kernel, _) = kernel();
        assert_eq!(
            kernel.toggle_pause(&soup()),
            Transition::Ignored(Ignored::NoSession)
        );
        kernel.start_recipe(&soup())?;
        assert!(kernel.toggle_pause(&soup()).is_applied());
        assert_eq!(kernel.store().state(&soup()), SessionState::Paused);
        assert!(kernel.toggle_pause(&soup()).is_applied());
        assert_eq!(kernel.store().state(&soup()), SessionState::Running);
        Ok(())
    }

    #[test]
    fn skip_step_moves_forward_then_ends() -> Result<()> {
        let (kernel, clock) = kernel();
        kernel.start_recipe(&soup())?;
        clock.advance_ms(42_000);

        let skipped = kernel.skip_step(&soup())?;
        assert!(matches!(
            skipped,
            Transition::Applied(SessionEvent::StepAdvanced {
                step_index: 1,
                step_remaining_seconds: 600,
                overall_remaining_seconds: 600,
                cause: AdvanceCause::Skipped,
                ..
            })
        ));

        let ended = kernel.skip_step(&soup())?;
        assert!(matches!(
            ended,
            Transition::Applied(SessionEvent::Ended {
                cause: EndCause::Stopped,
                ..
            })
        ));
        assert!(kernel.snapshot().is_empty());
        assert_eq!(
            kernel.skip_step(&soup())?,
            Transition::Ignored(Ignored::NoSession)
        );
        Ok(())
    }

    #[test]
    fn paused_skip_behaves_like_running_skip() -> Result<()> {
        let (kernel, _) = kernel();
        kernel.start_recipe(&soup())?;
        let _ = kernel.pause(&soup());
        let _ = kernel.skip_step(&soup())?;
        let record = kernel.record(&soup()).unwrap();
        assert_eq!(record.current_step_index, 1);
        assert!(record.is_running);
        Ok(())
    }

    #[test]
    fn views_follow_the_session() -> Result<()> {
        let (kernel, clock) = kernel();
        assert!(kernel.active_view().is_none());
        kernel.start_recipe(&soup())?;

        clock.advance_ms(150_000);
        let _ = kernel.observer(ObserverTarget::ActiveSession).poll_once();

        let view = kernel.active_view().unwrap();
        assert_eq!(view.recipe_id, soup());
        assert_eq!(view.step_progress_percent, 50);
        assert_eq!(view.summary(), "Step 1 of 2 · 02:30");
        assert_eq!(kernel.view(&soup()), Some(view));
        assert!(kernel.view(&"bread".into()).is_none());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn observers_complete_a_session_and_publish_events() -> Result<()> {
        let (kernel, clock) = kernel();
        let mut events = kernel.subscribe_events();
        kernel.start_recipe(&soup())?;

        let player = kernel.attach_observer(ObserverTarget::ActiveSession);
        let view = kernel.attach_observer(ObserverTarget::Recipe(soup()));

        clock.advance_ms(300_000);
        tokio::time::sleep(Duration::from_millis(300)).await;
        clock.advance_ms(600_000);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(kernel.snapshot().is_empty());

        player.stop().await;
        view.stop().await;

        let mut advanced = 0;
        let mut ended = Vec::new();
        while let Ok(record) = events.try_recv() {
            match record.event {
                SessionEvent::StepAdvanced { .. } => advanced += 1,
                SessionEvent::Ended { cause, .. } => ended.push(cause),
                _ => {}
            }
        }
        assert_eq!(advanced, 1);
        assert_eq!(ended, vec![EndCause::Completed]);
        Ok(())
    }

    #[test]
    fn events_serialize_for_collaborators() -> Result<()> {
        let (kernel, _) = kernel();
        let mut events = kernel.subscribe_events();
        kernel.start_recipe(&soup())?;
        let record = events.try_recv()?;
        let json = serde_json::to_value(&record)?;
        assert_eq!(json["type"], "started");
        assert_eq!(json["recipe_id"], "soup");
        assert_eq!(json["overall_remaining_seconds"], 900);
        Ok(())
    }
}
