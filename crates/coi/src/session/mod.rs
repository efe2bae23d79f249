//! Session lifecycle, metadata, and status events.

mod events;
mod lifecycle;
mod models;
mod store;

pub use events::{launch_script, parse_events, saw_ready, StatusEvent, EVENTS_PATH};
pub use lifecycle::{ResumeOutcome, SessionManager, SetupOptions, SetupResult};
pub use models::{generate_session_id, LaunchKind, SessionMetadata};
pub use store::SessionStore;
