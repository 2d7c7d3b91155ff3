pub mod icons;
pub mod progress;

pub use progress::{BatchUI, UiMode, format_duration};
