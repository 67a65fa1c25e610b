// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Database clients that points are written through.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::point::DataPoint;
use crate::store::DatabaseTarget;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("write rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Writes a batch of points to one database target.
#[async_trait]
pub trait PointSink: Send + Sync {
    async fn write_points(
        &self,
        target: &DatabaseTarget,
        points: &[DataPoint],
    ) -> Result<(), WriteError>;
}

/// InfluxDB 1.x `/write` endpoint client using line protocol.
///
/// One HTTP client (and connection pool) is shared by all targets; each
/// target's host, port, credentials and database are applied per request.
#[derive(Clone)]
pub struct HttpSink {
    client: reqwest::Client,
}

impl HttpSink {
    /// `timeout` bounds each write request end to end.
    pub fn new(timeout: Duration) -> Result<Self, WriteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// `host` may be a bare name or a URL. The target's port is appended
    /// only when the host does not carry one already.
    fn write_url(target: &DatabaseTarget) -> String {
        let host = target.host.trim().trim_end_matches('/');
        let (scheme, rest) = host.split_once("://").unwrap_or(("http", host));
        let (authority, path) = match rest.find('/') {
            Some(i) => rest.split_at(i),
            None => (rest, ""),
        };
        // IPv6 literals carry colons inside the brackets.
        let after_brackets = authority.rsplit_once(']').map_or(authority, |(_, tail)| tail);

        if after_brackets.contains(':') {
            format!("{scheme}://{authority}{path}/write")
        } else {
            format!("{scheme}://{authority}:{}{path}/write", target.port)
        }
    }
}

#[async_trait]
impl PointSink for HttpSink {
    async fn write_points(
        &self,
        target: &DatabaseTarget,
        points: &[DataPoint],
    ) -> Result<(), WriteError> {
        let body = points
            .iter()
            .map(DataPoint::to_line_protocol)
            .collect::<Vec<_>>()
            .join("\n");

        let response = self
            .client
            .post(Self::write_url(target))
            .query(&[("db", target.dbname.as_str()), ("precision", "u")])
            .basic_auth(&target.user, Some(&target.password))
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(WriteError::Rejected {
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::normalize;
    use chrono::Utc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn target(port: u16) -> DatabaseTarget {
        DatabaseTarget {
            host: "127.0.0.1".into(),
            port,
            user: "writer".into(),
            password: "secret".into(),
            dbname: "mqtt".into(),
            name: "local".into(),
        }
    }

    /// Accept one request, answer it with `status_line`, and return the raw
    /// request text.
    async fn serve_once(listener: TcpListener, status_line: &'static str, reply: &'static str) -> String {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + content_length {
                    break;
                }
            }
        }

        let response = format!(
            "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
            reply.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[test]
    fn test_write_url() {
        assert_eq!(HttpSink::write_url(&target(8086)), "http://127.0.0.1:8086/write");

        let mut https = target(8086);
        https.host = "https://influx.example/".into();
        assert_eq!(HttpSink::write_url(&https), "https://influx.example:8086/write");
    }

    #[test]
    fn test_write_url_keeps_explicit_port() {
        let mut t = target(8086);

        t.host = "https://influx:8443".into();
        assert_eq!(HttpSink::write_url(&t), "https://influx:8443/write");

        t.host = "influx:9999".into();
        assert_eq!(HttpSink::write_url(&t), "http://influx:9999/write");

        t.host = "http://proxy.local/influx/".into();
        assert_eq!(HttpSink::write_url(&t), "http://proxy.local:8086/influx/write");

        t.host = "[::1]".into();
        assert_eq!(HttpSink::write_url(&t), "http://[::1]:8086/write");

        t.host = "http://[::1]:8087".into();
        assert_eq!(HttpSink::write_url(&t), "http://[::1]:8087/write");
    }

    #[tokio::test]
    async fn test_write_sends_line_protocol() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(serve_once(listener, "HTTP/1.1 204 No Content", ""));

        let sink = HttpSink::new(Duration::from_secs(5)).unwrap();
        let point = DataPoint::build("sensors/temp", normalize(b"21.5"), Utc::now());
        sink.write_points(&target(port), &[point.clone()]).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /write?db=mqtt&precision=u HTTP/1.1"));
        // base64("writer:secret")
        assert!(request.contains("d3JpdGVyOnNlY3JldA=="));
        assert!(request.ends_with(&point.to_line_protocol()));
    }

    #[tokio::test]
    async fn test_rejected_write() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(serve_once(
            listener,
            "HTTP/1.1 401 Unauthorized",
            "{\"error\":\"authorization failed\"}",
        ));

        let sink = HttpSink::new(Duration::from_secs(5)).unwrap();
        let point = DataPoint::build("a", normalize(b"1"), Utc::now());
        let err = sink.write_points(&target(port), &[point]).await.unwrap_err();
        server.await.unwrap();

        match err {
            WriteError::Rejected { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("authorization failed"));
            }
            other => panic!("Expected Rejected, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_target() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let sink = HttpSink::new(Duration::from_secs(5)).unwrap();
        let point = DataPoint::build("a", normalize(b"1"), Utc::now());
        let err = sink.write_points(&target(port), &[point]).await.unwrap_err();
        assert!(matches!(err, WriteError::Http(_)));
    }
}
