//! LRCLIB API client
//!
//! LRCLIB is a free lyrics API that provides synchronized (LRC format) lyrics.
//! API Documentation: https://lrclib.net/docs

use super::parser::{parse_lrc, LyricsData};
use crate::error::Error;
use crate::http::{HttpRequest, HttpTransport};
use serde::Deserialize;
use std::sync::Arc;

/// LRCLIB `/get` response, only the fields we use
#[derive(Debug, Deserialize, Clone)]
pub struct LrclibResponse {
    #[serde(rename = "plainLyrics")]
    pub plain_lyrics: Option<String>,
    #[serde(rename = "syncedLyrics")]
    pub synced_lyrics: Option<String>,
}

/// LRCLIB API client
#[derive(Clone)]
pub struct LrclibClient {
    http: Arc<dyn HttpTransport>,
    base_url: String,
}

impl LrclibClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://lrclib.net/api";

    pub fn new(http: Arc<dyn HttpTransport>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Looks up lyrics by track metadata. Never fails: anything short of a
    /// usable response yields [`LyricsData::empty`].
    pub async fn fetch_lyrics(
        &self,
        track_name: &str,
        artist_name: &str,
        album_name: &str,
        duration_ms: u64,
    ) -> LyricsData {
        match self.get_exact(track_name, artist_name, album_name, duration_ms).await {
            Ok(resp) => into_lyrics(resp),
            Err(e) => {
                tracing::debug!(track = track_name, error = %e, "no lyrics");
                LyricsData::empty()
            }
        }
    }

    pub fn lookup_url(
        &self,
        track_name: &str,
        artist_name: &str,
        album_name: &str,
        duration_ms: u64,
    ) -> String {
        let duration_secs = duration_ms as f64 / 1000.0;
        format!(
            "{}/get?track_name={}&artist_name={}&album_name={}&duration={}",
            self.base_url,
            urlencoding::encode(track_name),
            urlencoding::encode(artist_name),
            urlencoding::encode(album_name),
            duration_secs
        )
    }

    async fn get_exact(
        &self,
        track_name: &str,
        artist_name: &str,
        album_name: &str,
        duration_ms: u64,
    ) -> Result<LrclibResponse, Error> {
        let url = self.lookup_url(track_name, artist_name, album_name, duration_ms);
        let resp = self
            .http
            .send(HttpRequest::get(url))
            .await
            .map_err(|e| Error::Network(format!("{e:#}")))?;

        if !resp.is_success() {
            return Err(Error::Upstream {
                endpoint: "lrclib /get".to_string(),
                status: resp.status,
            });
        }
        serde_json::from_slice(&resp.body).map_err(|source| Error::Decode {
            endpoint: "lrclib /get".to_string(),
            source,
        })
    }
}

fn into_lyrics(resp: LrclibResponse) -> LyricsData {
    let plain = resp.plain_lyrics.filter(|p| !p.trim().is_empty());
    let synced = resp
        .synced_lyrics
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_lrc(&s));
    LyricsData { plain, synced }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::{json, status, FakeTransport};

    fn client(http: FakeTransport) -> (LrclibClient, Arc<FakeTransport>) {
        let http = Arc::new(http);
        (LrclibClient::new(http.clone(), "https://lrclib.test/api/"), http)
    }

    #[test]
    fn test_lookup_url_encodes_params_and_seconds() {
        let (c, _) = client(FakeTransport::new(|_| Ok(status(404))));
        assert_eq!(
            c.lookup_url("Bohemian Rhapsody", "Queen", "A Night at the Opera", 354_320),
            "https://lrclib.test/api/get?track_name=Bohemian%20Rhapsody&artist_name=Queen&album_name=A%20Night%20at%20the%20Opera&duration=354.32"
        );
        assert!(c.lookup_url("a", "b", "c", 215_000).ends_with("&duration=215"));
    }

    #[tokio::test]
    async fn test_synced_and_plain() {
        let (c, _) = client(FakeTransport::new(|_| {
            Ok(json(
                200,
                serde_json::json!({
                    "id": 1,
                    "trackName": "t",
                    "plainLyrics": "Hello\nWorld",
                    "syncedLyrics": "[00:01.50]Hello\n[00:03.00]World"
                }),
            ))
        }));
        let data = c.fetch_lyrics("t", "a", "al", 1000).await;
        assert!(data.is_synced());
        assert_eq!(data.synced.as_ref().unwrap().len(), 2);
        assert_eq!(data.plain.as_deref(), Some("Hello\nWorld"));
    }

    #[tokio::test]
    async fn test_plain_only_falls_back() {
        let (c, _) = client(FakeTransport::new(|_| {
            Ok(json(200, serde_json::json!({ "plainLyrics": "la la", "syncedLyrics": null })))
        }));
        let data = c.fetch_lyrics("t", "a", "al", 1000).await;
        assert!(!data.is_synced());
        assert_eq!(data.plain.as_deref(), Some("la la"));
    }

    #[tokio::test]
    async fn test_failures_degrade_to_empty() {
        let (c, http) = client(FakeTransport::new(|_| Ok(status(404))));
        assert!(c.fetch_lyrics("t", "a", "al", 1000).await.is_empty());
        assert_eq!(http.requests().len(), 1);

        let (c, _) = client(FakeTransport::new(|_| Err(anyhow::anyhow!("offline"))));
        assert_eq!(c.fetch_lyrics("t", "a", "al", 1000).await, LyricsData::empty());

        let (c, _) = client(FakeTransport::new(|_| {
            Ok(crate::http::HttpResponse { status: 200, body: b"<html>".to_vec() })
        }));
        assert!(c.fetch_lyrics("t", "a", "al", 1000).await.is_empty());
    }
}
