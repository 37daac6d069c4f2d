use crate::lyrics::LyricsData;
use crate::spotify::{PlayerState, Track};

use super::actions::Action;

#[derive(Debug, Clone)]
pub enum Event {
    Input(Action),
    Player(PlayerEvent),
    Network(NetworkEvent),
}

#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// Locally interpolated position.
    Progress { progress_ms: u64 },
}

#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// `None`: no active device.
    PlayerState(Option<PlayerState>),
    Queue(Vec<Track>),
    LyricsLoaded { track_id: String, lyrics: LyricsData },
    /// A transport command finished; `error` is set when it failed.
    CommandDone {
        action: Action,
        error: Option<String>,
        fatal: bool,
    },
    /// Polling stopped for good; the message says why.
    SessionEnded(String),
}
