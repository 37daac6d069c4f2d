use crate::spotify::{PlayerState, Track};

/// Progress at `now_ms` given the last server report.
///
/// Paused playback stays pinned to the reported value; a clock that went
/// backwards never rewinds past it.
pub fn interpolate(server_progress_ms: u64, server_timestamp_ms: i64, now_ms: i64, is_playing: bool) -> u64 {
    if !is_playing {
        return server_progress_ms;
    }
    let elapsed = now_ms.saturating_sub(server_timestamp_ms).max(0) as u64;
    server_progress_ms.saturating_add(elapsed)
}

/// Last authoritative server snapshot; only the poller writes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressClock {
    pub progress_ms: u64,
    pub fetched_at_ms: i64,
    pub is_playing: bool,
    pub duration_ms: Option<u64>,
}

impl ProgressClock {
    pub fn from_state(state: Option<&PlayerState>, now_ms: i64) -> Self {
        match state {
            Some(s) => Self {
                progress_ms: s.progress_ms,
                fetched_at_ms: now_ms,
                is_playing: s.is_playing,
                duration_ms: s.item.as_ref().map(|t| t.duration_ms),
            },
            None => Self {
                fetched_at_ms: now_ms,
                ..Self::default()
            },
        }
    }

    /// Interpolated progress, never beyond the track's end.
    pub fn at(&self, now_ms: i64) -> u64 {
        let p = interpolate(self.progress_ms, self.fetched_at_ms, now_ms, self.is_playing);
        match self.duration_ms {
            Some(d) => p.min(d),
            None => p,
        }
    }
}

/// Remembers the last item id so each distinct track is reported once.
#[derive(Debug, Clone, Default)]
pub struct TrackWatcher {
    last_id: Option<String>,
}

impl TrackWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the track when its id differs from the last one seen. An empty
    /// item (ad, no device) does not reset the memory, so the same track coming
    /// back is not reported again.
    pub fn observe<'a>(&mut self, item: Option<&'a Track>) -> Option<&'a Track> {
        let track = item?;
        if self.last_id.as_deref() == Some(track.id.as_str()) {
            return None;
        }
        self.last_id = Some(track.id.clone());
        Some(track)
    }
}
