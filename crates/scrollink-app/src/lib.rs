//! Scrollink Application
//!
//! A headless participant: it mounts an engine on a Vello surface, joins a
//! relay room, scribbles scripted strokes and persists what it completes.

mod app;
mod frames;
mod script;

pub use app::{App, AppConfig, RunSummary};
pub use frames::IntervalFrames;
pub use script::ScribbleScript;
