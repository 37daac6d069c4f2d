//! Lyrics module for fetching and displaying synchronized lyrics
//!
//! This module provides:
//! - LRCLIB API client for fetching lyrics
//! - LRC format parser for synchronized lyrics
//! - Data structures for lyrics display

pub mod lrclib;
pub mod parser;

pub use lrclib::LrclibClient;
pub use parser::{LrcLine, LyricsData};

use crate::spotify::Track;

/// Get lyrics for a track
pub async fn fetch_for_track(client: &LrclibClient, track: &Track) -> LyricsData {
    client
        .fetch_lyrics(
            &track.name,
            track.primary_artist(),
            &track.album.name,
            track.duration_ms,
        )
        .await
}
