use crate::lyrics::{LrcLine, LyricsData};
use crate::spotify::{PlayerState, Track};

/// What the watch loop knows, rebuilt from poller events.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    /// Last server report; replaced wholesale on every successful poll.
    pub player: Option<PlayerState>,
    pub queue: Vec<Track>,
    /// Interpolated, not authoritative.
    pub progress_ms: u64,
    pub lyrics: Option<LyricsData>,
    /// Track the current `lyrics` (or pending fetch) belongs to.
    pub lyrics_track_id: Option<String>,
    pub lyrics_loading: bool,
    pub active_line: Option<usize>,
    pub session_ended: Option<String>,
    pub should_quit: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.player.as_ref()?.item.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.player.as_ref().is_some_and(|p| p.is_playing)
    }

    /// Forget lyrics and start waiting for `track_id`'s.
    pub fn expect_lyrics(&mut self, track_id: &str) {
        self.lyrics = None;
        self.lyrics_loading = true;
        self.lyrics_track_id = Some(track_id.to_string());
        self.active_line = None;
    }

    /// Applies lyrics if they still belong to the current track.
    pub fn set_lyrics(&mut self, track_id: &str, lyrics: LyricsData) -> bool {
        if self.lyrics_track_id.as_deref() != Some(track_id) {
            return false;
        }
        self.lyrics = Some(lyrics);
        self.lyrics_loading = false;
        self.active_line = None;
        true
    }

    /// Updates progress; returns the synced line that just became active.
    pub fn advance(&mut self, progress_ms: u64) -> Option<&LrcLine> {
        self.progress_ms = progress_ms;
        let lyrics = self.lyrics.as_ref()?;
        let index = lyrics.active_index(progress_ms as f64 / 1000.0);
        if index == self.active_line {
            return None;
        }
        self.active_line = index;
        lyrics.synced.as_ref()?.get(index?)
    }
}
