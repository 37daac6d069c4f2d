use super::models::{PlayerState, QueueResponse, Track};
use crate::auth::CredentialManager;
use crate::error::{Error, Result};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Result of sending one request with one token.
enum Attempt {
    Done(HttpResponse),
    AuthFailure,
}

/// Bearer-authenticated client for the Web API player endpoints.
#[derive(Clone)]
pub struct SpotifyClient {
    auth: CredentialManager,
    http: Arc<dyn HttpTransport>,
    base_url: String,
}

impl SpotifyClient {
    pub fn new(auth: CredentialManager, http: Arc<dyn HttpTransport>, base_url: impl Into<String>) -> Self {
        Self {
            auth,
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn auth(&self) -> &CredentialManager {
        &self.auth
    }

    /// Sends `method endpoint` with a valid token. A 401 triggers exactly one
    /// refresh and one retry; a second 401 (or a failed refresh) logs out.
    ///
    /// `Ok(None)` for 204 and empty bodies.
    pub async fn request(&self, method: Method, endpoint: &str) -> Result<Option<serde_json::Value>> {
        let url = format!("{}{}", self.base_url, endpoint);
        let token = self
            .auth
            .get_valid_token()
            .await
            .ok_or(Error::Unauthenticated)?;

        let resp = match self.attempt(method.clone(), &url, token).await? {
            Attempt::Done(resp) => resp,
            Attempt::AuthFailure => {
                tracing::debug!(endpoint, "got 401, refreshing token once");
                let Some(fresh) = self.auth.refresh().await else {
                    return Err(self.expire(endpoint));
                };
                match self.attempt(method, &url, fresh).await? {
                    Attempt::Done(resp) => resp,
                    Attempt::AuthFailure => return Err(self.expire(endpoint)),
                }
            }
        };
        decode_body(endpoint, resp)
    }

    /// `None` when no device is active.
    pub async fn player_state(&self) -> Result<Option<PlayerState>> {
        self.get_json("/me/player").await
    }

    pub async fn queue(&self) -> Result<Vec<Track>> {
        let queue: Option<QueueResponse> = self.get_json("/me/player/queue").await?;
        Ok(queue.map(|q| q.queue).unwrap_or_default())
    }

    pub async fn play(&self) -> Result<()> {
        self.request(Method::PUT, "/me/player/play").await.map(drop)
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(Method::PUT, "/me/player/pause").await.map(drop)
    }

    pub async fn next(&self) -> Result<()> {
        self.request(Method::POST, "/me/player/next").await.map(drop)
    }

    pub async fn previous(&self) -> Result<()> {
        self.request(Method::POST, "/me/player/previous").await.map(drop)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Option<T>> {
        match self.request(Method::GET, endpoint).await? {
            Some(v) => serde_json::from_value(v)
                .map(Some)
                .map_err(|source| Error::Decode {
                    endpoint: endpoint.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    async fn attempt(&self, method: Method, url: &str, token: String) -> Result<Attempt> {
        let req = HttpRequest::new(method, url).bearer(token);
        let resp = self
            .http
            .send(req)
            .await
            .map_err(|e| Error::Network(format!("{e:#}")))?;
        if resp.status == 401 {
            Ok(Attempt::AuthFailure)
        } else {
            Ok(Attempt::Done(resp))
        }
    }

    fn expire(&self, endpoint: &str) -> Error {
        tracing::warn!(endpoint, "session could not be recovered");
        self.auth.logout();
        Error::SessionExpired
    }
}

fn decode_body(endpoint: &str, resp: HttpResponse) -> Result<Option<serde_json::Value>> {
    if resp.status == 204 {
        return Ok(None);
    }
    if !resp.is_success() {
        return Err(Error::Upstream {
            endpoint: endpoint.to_string(),
            status: resp.status,
        });
    }
    if resp.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(&resp.body)
        .map(Some)
        .map_err(|source| Error::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
}
