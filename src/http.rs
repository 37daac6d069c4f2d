//! Thin HTTP seam shared by the token, playback and lyrics clients.

use anyhow::Context;
use futures::future::BoxFuture;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Method;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    /// Sent as `application/x-www-form-urlencoded` when present.
    pub form: Option<Vec<(String, String)>>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            bearer: None,
            form: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn form<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.form = Some(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// An `Err` means no response arrived at all (DNS, connect, timeout, ...).
pub trait HttpTransport: Send + Sync {
    fn send(&self, req: HttpRequest) -> BoxFuture<'_, anyhow::Result<HttpResponse>>;
}

pub fn encode_form(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    const USER_AGENT: &'static str = concat!("landscape/", env!("CARGO_PKG_VERSION"));

    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(Self::USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("build reqwest client")?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, req: HttpRequest) -> BoxFuture<'_, anyhow::Result<HttpResponse>> {
        Box::pin(async move {
            let mut builder = self.client.request(req.method.clone(), &req.url);
            if let Some(token) = &req.bearer {
                let value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .context("bearer header")?;
                builder = builder.header(AUTHORIZATION, value);
            }
            match &req.form {
                Some(pairs) => {
                    builder = builder
                        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                        .body(encode_form(pairs));
                }
                // Spotify answers 411 to a bodyless PUT/POST without a length.
                None if req.method != Method::GET => {
                    builder = builder.header(CONTENT_LENGTH, 0);
                }
                None => {}
            }

            let response = builder
                .send()
                .await
                .with_context(|| format!("{} {}", req.method, req.url))?;
            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .with_context(|| format!("read body of {}", req.url))?
                .to_vec();
            Ok(HttpResponse { status, body })
        })
    }
}
