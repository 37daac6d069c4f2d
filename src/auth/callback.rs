//! One-shot HTTP listener for the OAuth redirect.

use anyhow::Context;
use reqwest::Url;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const SUCCESS_PAGE: &str = r#"<!doctype html>
<html>
<head><title>landscape</title></head>
<body><h1>Logged in.</h1><p>You can close this window.</p><script>window.close();</script></body>
</html>
"#;

const FAILURE_PAGE: &str = r#"<!doctype html>
<html>
<head><title>landscape</title></head>
<body><h1>Login failed.</h1><p>Check the terminal and try again.</p></body>
</html>
"#;

/// Outcome of one request hitting the listener.
#[derive(Debug, PartialEq, Eq)]
enum Callback {
    Code(String),
    Denied(String),
    /// Right path, no `code` parameter.
    Empty,
    /// Favicon requests and the like.
    OtherPath,
}

/// Waits for the browser to come back to `redirect_uri` and returns the
/// authorization code it carries.
pub async fn wait_for_code(redirect_uri: &str) -> anyhow::Result<String> {
    let redirect = Url::parse(redirect_uri).with_context(|| format!("parse {redirect_uri}"))?;
    let host = redirect.host_str().context("redirect uri has no host")?;
    let port = redirect
        .port_or_known_default()
        .context("redirect uri has no port")?;
    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("bind {host}:{port}"))?;
    tracing::info!(%host, port, "waiting for authorization callback");

    loop {
        let (stream, peer) = listener.accept().await.context("accept callback")?;
        tracing::debug!(%peer, "callback connection");
        match serve_one(stream, redirect.path()).await {
            Ok(Callback::Code(code)) => return Ok(code),
            Ok(Callback::Denied(reason)) => anyhow::bail!("authorization denied: {reason}"),
            Ok(Callback::Empty) => anyhow::bail!("callback carried no authorization code"),
            Ok(Callback::OtherPath) => continue,
            Err(e) => tracing::debug!(error = %format!("{e:#}"), "bad callback request"),
        }
    }
}

async fn serve_one(stream: TcpStream, path: &str) -> anyhow::Result<Callback> {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();
    let request_line = lines
        .next_line()
        .await
        .context("read request line")?
        .context("empty request")?;

    let outcome = parse_request_line(&request_line, path)?;
    let (status, body) = match &outcome {
        Callback::Code(_) => ("200 OK", SUCCESS_PAGE),
        Callback::OtherPath => ("404 Not Found", ""),
        Callback::Denied(_) | Callback::Empty => ("400 Bad Request", FAILURE_PAGE),
    };
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    writer
        .write_all(response.as_bytes())
        .await
        .context("write callback response")?;
    let _ = writer.shutdown().await;
    Ok(outcome)
}

fn parse_request_line(line: &str, expected_path: &str) -> anyhow::Result<Callback> {
    let mut parts = line.split_whitespace();
    let method = parts.next().context("missing method")?;
    let target = parts.next().context("missing request target")?;
    if method != "GET" {
        return Ok(Callback::OtherPath);
    }

    let url = Url::parse(&format!("http://callback.invalid{target}"))
        .with_context(|| format!("parse request target {target}"))?;
    if url.path() != expected_path {
        return Ok(Callback::OtherPath);
    }

    let mut code = None;
    let mut error = None;
    for (k, v) in url.query_pairs() {
        match k.as_ref() {
            "code" => code = Some(v.into_owned()),
            "error" => error = Some(v.into_owned()),
            _ => {}
        }
    }
    Ok(match (code, error) {
        (_, Some(e)) => Callback::Denied(e),
        (Some(c), None) if !c.is_empty() => Callback::Code(c),
        _ => Callback::Empty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_code() {
        assert_eq!(
            parse_request_line("GET /callback?code=AQB%2Bx&state=s HTTP/1.1", "/callback").unwrap(),
            Callback::Code("AQB+x".into())
        );
    }

    #[test]
    fn test_parse_denied_and_empty() {
        assert_eq!(
            parse_request_line("GET /callback?error=access_denied HTTP/1.1", "/callback").unwrap(),
            Callback::Denied("access_denied".into())
        );
        assert_eq!(
            parse_request_line("GET /callback HTTP/1.1", "/callback").unwrap(),
            Callback::Empty
        );
    }

    #[test]
    fn test_other_paths_are_ignored() {
        assert_eq!(
            parse_request_line("GET /favicon.ico HTTP/1.1", "/callback").unwrap(),
            Callback::OtherPath
        );
        assert!(parse_request_line("", "/callback").is_err());
    }

    #[tokio::test]
    async fn test_wait_for_code_over_tcp() {
        let free_port = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = free_port.local_addr().unwrap().port();
        drop(free_port);

        let redirect = format!("http://127.0.0.1:{port}/callback");
        let waiter = tokio::spawn(async move { wait_for_code(&redirect).await });

        let mut stream = loop {
            match TcpStream::connect(("127.0.0.1", port)).await {
                Ok(s) => break s,
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        };
        stream
            .write_all(b"GET /callback?code=abc HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();

        let code = waiter.await.unwrap().unwrap();
        assert_eq!(code, "abc");
    }
}
