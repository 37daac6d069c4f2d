use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    /// Largest first, as Spotify returns them.
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TrackWire")]
pub struct Track {
    /// Catalogue id; for local files the `uri`, or name and duration.
    pub id: String,
    pub name: String,
    pub artists: Vec<Artist>,
    pub album: Album,
    pub duration_ms: u64,
}

/// `id` is `null` for local files.
#[derive(Deserialize)]
struct TrackWire {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
    album: Album,
    #[serde(default, deserialize_with = "null_as_zero")]
    duration_ms: u64,
}

impl From<TrackWire> for Track {
    fn from(w: TrackWire) -> Self {
        let id = w
            .id
            .filter(|id| !id.is_empty())
            .or(w.uri.filter(|uri| !uri.is_empty()))
            .unwrap_or_else(|| format!("local:{}:{}", w.name, w.duration_ms));
        Self {
            id,
            name: w.name,
            artists: w.artists,
            album: w.album,
            duration_ms: w.duration_ms,
        }
    }
}

fn null_as_zero<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(Option::<u64>::deserialize(d)?.unwrap_or(0))
}

impl Track {
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(|a| a.name.as_str()).unwrap_or("")
    }

    pub fn cover_url(&self) -> Option<&str> {
        self.album.images.first().map(|i| i.url.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub is_playing: bool,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub progress_ms: u64,
    /// `null` for ads, local files without metadata, or nothing loaded.
    #[serde(default)]
    pub item: Option<Track>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueResponse {
    #[serde(default, deserialize_with = "tracks_only")]
    pub queue: Vec<Track>,
}

/// Podcast episodes share the queue with tracks; keep only what parses as a track.
fn tracks_only<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Track>, D::Error> {
    let raw = Option::<Vec<serde_json::Value>>::deserialize(d)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

pub fn format_ms(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_state_from_api_shape() {
        let raw = serde_json::json!({
            "is_playing": true,
            "progress_ms": 42_000,
            "device": { "name": "Kitchen" },
            "item": {
                "id": "4uLU6hMCjMI75M1A2tKUQC",
                "name": "Never Gonna Give You Up",
                "artists": [{ "name": "Rick Astley", "id": "x" }],
                "album": {
                    "name": "Whenever You Need Somebody",
                    "images": [{ "url": "https://i.scdn.co/image/a", "width": 640, "height": 640 }]
                },
                "duration_ms": 213_573
            }
        });
        let state: PlayerState = serde_json::from_value(raw).unwrap();
        let track = state.item.unwrap();
        assert_eq!(track.primary_artist(), "Rick Astley");
        assert_eq!(track.cover_url(), Some("https://i.scdn.co/image/a"));
        assert_eq!(format_ms(track.duration_ms), "3:33");
    }

    #[test]
    fn test_null_item_and_missing_queue() {
        let state: PlayerState =
            serde_json::from_str(r#"{"is_playing":false,"progress_ms":0,"item":null}"#).unwrap();
        assert!(state.item.is_none());

        let q: QueueResponse = serde_json::from_str(r#"{"currently_playing":null}"#).unwrap();
        assert!(q.queue.is_empty());
        let q: QueueResponse = serde_json::from_str(r#"{"queue":null}"#).unwrap();
        assert!(q.queue.is_empty());
    }

    #[test]
    fn test_local_file_item_decodes_with_fallback_id() {
        let state: PlayerState = serde_json::from_str(
            r#"{"is_playing":true,"progress_ms":null,"item":{"id":null,"uri":"spotify:local:Me:Local:My+Local+Song:200","name":"My Local Song","is_local":true,"artists":[{"name":"Me"}],"album":{"name":"Local","images":[]},"duration_ms":200000}}"#,
        )
        .unwrap();
        assert_eq!(state.progress_ms, 0);
        let track = state.item.unwrap();
        assert_eq!(track.id, "spotify:local:Me:Local:My+Local+Song:200");
        assert_eq!(track.name, "My Local Song");

        let bare: Track = serde_json::from_str(
            r#"{"id":null,"name":"Demo","album":{"name":"Local"},"duration_ms":90000}"#,
        )
        .unwrap();
        assert_eq!(bare.id, "local:Demo:90000");
    }

    #[test]
    fn test_queue_skips_episodes() {
        let raw = serde_json::json!({
            "queue": [
                { "id": "ep", "name": "Episode 12", "duration_ms": 1, "show": { "name": "Pod" } },
                { "id": "t1", "name": "Song", "artists": [], "album": { "name": "LP" }, "duration_ms": 1000 }
            ]
        });
        let q: QueueResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(q.queue.len(), 1);
        assert_eq!(q.queue[0].id, "t1");
    }
}
