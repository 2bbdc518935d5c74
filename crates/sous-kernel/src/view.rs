//! Read-only projections for UI collaborators.
//!
//! Views are computed from a recipe and a session record on demand; nothing
//! here feeds back into the store.

use serde::Serialize;
use sous_protocol::{Recipe, RecipeId, SECONDS_PER_MINUTE, SessionRecord, SessionState};

/// `MM:SS`; minutes are not wrapped into hours.
pub fn format_clock(seconds: u64) -> String {
    format!(
        "{:02}:{:02}",
        seconds / SECONDS_PER_MINUTE,
        seconds % SECONDS_PER_MINUTE
    )
}

/// `round(elapsed / total * 100)`, 0 for an empty total.
pub fn progress_percent(elapsed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let elapsed = elapsed.min(total);
    let rounded = (elapsed * 200 + total) / (total * 2);
    u8::try_from(rounded).unwrap_or(100)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub recipe_id: RecipeId,
    pub title: String,
    /// 1-based, for display.
    pub step_number: usize,
    pub step_count: usize,
    pub step_description: String,
    pub state: SessionState,
    pub step_duration_seconds: u64,
    pub step_remaining_seconds: u64,
    pub total_duration_seconds: u64,
    pub overall_remaining_seconds: u64,
    pub step_progress_percent: u8,
    pub overall_progress_percent: u8,
}

impl SessionView {
    pub fn new(recipe: &Recipe, record: &SessionRecord) -> Self {
        let index = record.current_step_index;
        let step_duration_seconds = recipe.step_duration_seconds(index);
        let total_duration_seconds = recipe.total_duration_seconds();
        let step_elapsed = step_duration_seconds.saturating_sub(record.step_remaining_seconds);
        let overall_elapsed =
            total_duration_seconds.saturating_sub(record.overall_remaining_seconds);

        Self {
            recipe_id: recipe.id.clone(),
            title: recipe.title.clone(),
            step_number: index + 1,
            step_count: recipe.step_count(),
            step_description: recipe
                .steps
                .get(index)
                .map(|step| step.description.clone())
                .unwrap_or_default(),
            state: record.state(),
            step_duration_seconds,
            step_remaining_seconds: record.step_remaining_seconds,
            total_duration_seconds,
            overall_remaining_seconds: record.overall_remaining_seconds,
            step_progress_percent: progress_percent(step_elapsed, step_duration_seconds),
            overall_progress_percent: progress_percent(overall_elapsed, total_duration_seconds),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn is_last_step(&self) -> bool {
        self.step_number >= self.step_count
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_running() { "Running" } else { "Paused" }
    }

    /// e.g. `Step 1 of 2 · 04:59`
    pub fn summary(&self) -> String {
        format!(
            "Step {} of {} · {}",
            self.step_number,
            self.step_count,
            format_clock(self.step_remaining_seconds)
        )
    }
}

/// Produces an accessibility announcement whenever the whole number of
/// minutes left in the current step changes while the session is running.
#[derive(Debug, Default)]
pub struct MinuteAnnouncer {
    last_minute: Option<u64>,
}

impl MinuteAnnouncer {
    pub fn observe(&mut self, view: &SessionView) -> Option<String> {
        if !view.is_running() {
            self.last_minute = None;
            return None;
        }

        let minutes = view.step_remaining_seconds / SECONDS_PER_MINUTE;
        let previous = self.last_minute.replace(minutes);
        match previous {
            Some(previous) if previous != minutes => Some(announcement(minutes)),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.last_minute = None;
    }
}

fn announcement(minutes: u64) -> String {
    match minutes {
        0 => "Step time remaining: less than 1 minute".to_owned(),
        1 => "Step time remaining: 1 minute".to_owned(),
        n => format!("Step time remaining: {n} minutes"),
    }
}

#[cfg(test)]
mod tests {
    use sous_protocol::{Recipe, SessionRecord, Step};

    use super::*;

    fn recipe() -> Recipe {
        Recipe::new(
            "soup",
            "Soup",
            vec![Step::new("sweat onions", 5), Step::new("simmer", 10)],
        )
    }

    fn record(index: usize, step: u64, overall: u64, running: bool) -> SessionRecord {
        SessionRecord {
            current_step_index: index,
            is_running: running,
            step_remaining_seconds: step,
            overall_remaining_seconds: overall,
            last_tick_ms: None,
        }
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(299), "04:59");
        assert_eq!(format_clock(6_000), "100:00");
    }

    #[test]
    fn progress_rounds_half_up() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(1, 200), 1);
        assert_eq!(progress_percent(1, 300), 0);
        assert_eq!(progress_percent(150, 300), 50);
        assert_eq!(progress_percent(500, 300), 100);
    }

    #[test]
    fn view_derives_progress_from_recipe() {
        let view = SessionView::new(&recipe(), &record(0, 150, 750, true));
        assert_eq!(view.step_number, 1);
        assert_eq!(view.step_count, 2);
        assert_eq!(view.step_description, "sweat onions");
        assert_eq!(view.step_progress_percent, 50);
        assert_eq!(view.overall_progress_percent, 17);
        assert_eq!(view.summary(), "Step 1 of 2 · 02:30");
        assert_eq!(view.status_label(), "Running");
        assert!(!view.is_last_step());

        let last = SessionView::new(&recipe(), &record(1, 600, 600, false));
        assert!(last.is_last_step());
        assert_eq!(last.status_label(), "Paused");
        assert_eq!(last.step_progress_percent, 0);
    }

    #[test]
    fn announcer_speaks_on_minute_changes_only() {
        let recipe = recipe();
        let mut announcer = MinuteAnnouncer::default();

        let at = |step: u64, running: bool| {
            SessionView::new(&recipe, &record(0, step, step + 600, running))
        };

        assert_eq!(announcer.observe(&at(300, true)), None);
        assert_eq!(
            announcer.observe(&at(290, true)),
            Some("Step time remaining: 4 minutes".to_owned())
        );
        assert_eq!(announcer.observe(&at(250, true)), None);
        assert_eq!(
            announcer.observe(&at(119, true)),
            Some("Step time remaining: 1 minute".to_owned())
        );

        // Pausing forgets the last minute, so resuming is silent.
        assert_eq!(announcer.observe(&at(100, false)), None);
        assert_eq!(announcer.observe(&at(59, true)), None);
        assert_eq!(announcer.observe(&at(30, true)), None);
        assert_eq!(announcer.observe(&at(0, true)), None);

        announcer.reset();
        assert_eq!(announcer.observe(&at(200, true)), None);
        assert_eq!(
            announcer.observe(&at(30, true)),
            Some("Step time remaining: less than 1 minute".to_owned())
        );
    }
}
