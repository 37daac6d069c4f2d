//! Playback polling and the local progress clock.

pub mod poller;
pub mod progress;

pub use poller::{spawn, PollerHandle};
pub use progress::TrackWatcher;
