use super::pkce;
use super::store::{self, CredentialStore};
use crate::clock::Clock;
use crate::config::SpotifyConfig;
use crate::error::{Error, Result};
use crate::http::{HttpRequest, HttpTransport};
use anyhow::Context;
use reqwest::{Method, Url};
use serde::Deserialize;
use std::sync::Arc;

/// Refresh this long before the stored expiry.
pub const EXPIRY_BUFFER_MS: i64 = 300_000;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    /// Seconds.
    expires_in: Option<i64>,
}

/// Owns the OAuth PKCE flow and the persisted token set.
///
/// Every failure on the token endpoint is logged and reported as `None`;
/// callers decide whether that means "log in again" or "keep the old token".
#[derive(Clone)]
pub struct CredentialManager {
    cfg: SpotifyConfig,
    store: Arc<dyn CredentialStore>,
    http: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
}

impl CredentialManager {
    pub fn new(
        cfg: SpotifyConfig,
        store: Arc<dyn CredentialStore>,
        http: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cfg,
            store,
            http,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn redirect_uri(&self) -> &str {
        &self.cfg.redirect_uri
    }

    /// Starts a login: stores a fresh verifier (replacing any earlier one) and
    /// returns the authorization URL the user has to open.
    pub fn begin_auth(&self) -> anyhow::Result<Url> {
        let verifier = pkce::generate_verifier(pkce::VERIFIER_LEN);
        let challenge = pkce::challenge_for(&verifier);
        self.store
            .set(store::CODE_VERIFIER, &verifier)
            .context("store PKCE verifier")?;

        let url = Url::parse_with_params(
            &self.cfg.authorize_url,
            &[
                ("client_id", self.cfg.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.cfg.redirect_uri.as_str()),
                ("scope", self.cfg.scopes.as_str()),
                ("code_challenge_method", "S256"),
                ("code_challenge", challenge.as_str()),
            ],
        )
        .with_context(|| format!("parse authorize url {}", self.cfg.authorize_url))?;
        tracing::debug!("authorization url prepared");
        Ok(url)
    }

    /// Trades an authorization code for tokens. The verifier is consumed
    /// whether or not the exchange succeeds.
    pub async fn exchange_code(&self, code: &str) -> Result<Option<String>> {
        let verifier = self.read(store::CODE_VERIFIER).ok_or(Error::MissingVerifier)?;
        self.delete(store::CODE_VERIFIER);

        let form = [
            ("client_id", self.cfg.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.cfg.redirect_uri.as_str()),
            ("code_verifier", verifier.as_str()),
        ];
        let Some(tokens) = self.token_request(&form).await else {
            return Ok(None);
        };
        tracing::info!("authorization code exchanged");
        Ok(Some(self.persist(tokens)))
    }

    pub async fn refresh(&self) -> Option<String> {
        let refresh_token = self.read(store::REFRESH_TOKEN)?;
        let form = [
            ("client_id", self.cfg.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ];
        let tokens = self.token_request(&form).await?;
        tracing::debug!(rotated = tokens.refresh_token.is_some(), "access token refreshed");
        Some(self.persist(tokens))
    }

    /// Stored token, refreshed first when it is within [`EXPIRY_BUFFER_MS`]
    /// of expiring. Falls back to the old token while it is still valid.
    pub async fn get_valid_token(&self) -> Option<String> {
        let Some(token) = self.read(store::ACCESS_TOKEN) else {
            if self.read(store::REFRESH_TOKEN).is_some() {
                tracing::debug!("no access token stored, trying refresh token");
                return self.refresh().await;
            }
            return None;
        };

        let Some(expires_at) = self.expires_at() else {
            return Some(token);
        };

        let now = self.clock.now_ms();
        if now < expires_at - EXPIRY_BUFFER_MS {
            return Some(token);
        }

        if let Some(fresh) = self.refresh().await {
            return Some(fresh);
        }
        if now < expires_at {
            tracing::warn!(remaining_ms = expires_at - now, "refresh failed, using old token");
            Some(token)
        } else {
            None
        }
    }

    /// Non-refreshing read for quick "are we logged in" checks.
    pub fn stored_token(&self) -> Option<String> {
        self.read(store::ACCESS_TOKEN)
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.read(store::EXPIRES_AT)?.parse().ok()
    }

    pub fn logout(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %format!("{e:#}"), "clear credential store");
        }
        tracing::info!("logged out; run `landscape login` to sign in again");
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Option<TokenResponse> {
        let req = HttpRequest::new(Method::POST, self.cfg.token_url.clone())
            .form(form.iter().copied());

        let resp = match self.http.send(req).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "token endpoint unreachable");
                return None;
            }
        };
        if !resp.is_success() {
            tracing::warn!(status = resp.status, "token endpoint rejected request");
            return None;
        }
        match serde_json::from_slice::<TokenResponse>(&resp.body) {
            Ok(tokens) if tokens.access_token.is_some() => Some(tokens),
            Ok(_) => {
                tracing::warn!("token response without access_token");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "decode token response");
                None
            }
        }
    }

    /// Writes a token response and returns the access token.
    fn persist(&self, tokens: TokenResponse) -> String {
        let access = tokens.access_token.unwrap_or_default();
        self.write(store::ACCESS_TOKEN, &access);
        match tokens.expires_in {
            Some(secs) => {
                let expires_at = self.clock.now_ms() + secs * 1000;
                self.write(store::EXPIRES_AT, &expires_at.to_string());
            }
            // An expiry from an older token must not outlive it.
            None => self.delete(store::EXPIRES_AT),
        }
        if let Some(refresh) = tokens.refresh_token {
            self.write(store::REFRESH_TOKEN, &refresh);
        }
        access
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(v) => v.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::warn!(key, error = %format!("{e:#}"), "read credential store");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            tracing::warn!(key, error = %format!("{e:#}"), "write credential store");
        }
    }

    fn delete(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            tracing::warn!(key, error = %format!("{e:#}"), "remove from credential store");
        }
    }
}
