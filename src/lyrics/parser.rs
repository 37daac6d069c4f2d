//! LRC format parser
//!
//! Parses synchronized lyrics in LRC format:
//! [mm:ss.hh]Lyrics line here
//!
//! Example:
//! [00:12.34]Hello world
//! [00:15.00]Another line

use serde::{Deserialize, Serialize};

/// A single line of lyrics with timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LrcLine {
    /// `"{source line index}-{time}"`, unique within one parse
    pub id: String,
    /// Seconds from start
    pub time: f64,
    pub text: String,
}

/// Lyrics for one track. Both halves empty means nothing was found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LyricsData {
    pub plain: Option<String>,
    pub synced: Option<Vec<LrcLine>>,
}

impl LyricsData {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_synced(&self) -> bool {
        self.synced.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.plain.is_none() && self.synced.as_ref().is_none_or(|l| l.is_empty())
    }

    /// Index of the last synced line at or before `seconds`.
    pub fn active_index(&self, seconds: f64) -> Option<usize> {
        let lines = self.synced.as_ref()?;
        lines.partition_point(|l| l.time <= seconds).checked_sub(1)
    }
}

/// Parses `[MM:SS.hh]text` lines. Anything else is dropped, as are lines
/// whose text is empty once trimmed. Output is sorted by time.
pub fn parse_lrc(content: &str) -> Vec<LrcLine> {
    let mut lines: Vec<LrcLine> = content
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let (time, rest) = parse_timed_line(line)?;
            let text = rest.trim();
            if text.is_empty() {
                return None;
            }
            Some(LrcLine {
                id: format!("{index}-{time}"),
                time,
                text: text.to_string(),
            })
        })
        .collect();

    // Stable, so equal timestamps keep source order.
    lines.sort_by(|a, b| a.time.total_cmp(&b.time));
    lines
}

/// `[MM:SS.hh]` with exactly two digits per field, then the remainder.
fn parse_timed_line(line: &str) -> Option<(f64, &str)> {
    let rest = line.strip_prefix('[')?;
    let (stamp, text) = rest.split_once(']')?;
    let (min, rest) = stamp.split_once(':')?;
    let (sec, hundredths) = rest.split_once('.')?;

    let min = two_digits(min)?;
    let sec = two_digits(sec)?;
    let hundredths = two_digits(hundredths)?;
    let time = f64::from(min) * 60.0 + f64::from(sec) + f64::from(hundredths) / 100.0;
    Some((time, text))
}

fn two_digits(s: &str) -> Option<u32> {
    if s.len() != 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
