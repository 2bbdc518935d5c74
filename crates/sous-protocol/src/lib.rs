//! # sous-protocol — shared contract for the cooking session core
//!
//! Types and ports that the session store, the timer driver and any UI
//! collaborator agree on. Deliberately free of runtime dependencies (no tokio,
//! no locks) so it can be used as a pure contract crate.
//!
//! ## Module Overview
//!
//! - [`ids`] — typed ID wrappers (RecipeId, ObserverId)
//! - [`recipe`] — Recipe / Step and the duration arithmetic derived from them
//! - [`session`] — SessionRecord, SessionTable, SessionState
//! - [`event`] — SessionEvent emitted for every applied transition
//! - [`clock`] — wall-clock port plus manual and scaled clocks
//! - [`ports`] — RecipeCatalog boundary
//! - [`error`] — RecipeError, SessionError

pub mod clock;
pub mod error;
pub mod event;
pub mod ids;
pub mod ports;
pub mod recipe;
pub mod session;

pub use clock::{Clock, ManualClock, ScaledClock, SystemClock};
pub use error::{RecipeError, SessionError, SessionResult};
pub use event::{AdvanceCause, EndCause, SessionEvent, SessionEventRecord};
pub use ids::{ObserverId, RecipeId};
pub use ports::RecipeCatalog;
pub use recipe::{NextStep, Recipe, SECONDS_PER_MINUTE, Step};
pub use session::{SessionRecord, SessionState, SessionTable};
