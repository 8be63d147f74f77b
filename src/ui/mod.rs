pub mod crew_progress;
pub mod icons;

pub use crew_progress::{CrewUI, TaskProgress, UiMode, format_duration};
