// filestream-core - Streaming file I/O for mobile
// Copyright (C) 2025 filestream-core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! HTTP transport seam
//!
//! The downloader issues one GET per hop and follows redirects itself, so a
//! transport must surface 3xx responses instead of following them.
//! [`ReqwestTransport`] is the default; tests plug in scripted transports.

use crate::config::DownloadConfig;
use crate::error::{Result, StreamError};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::collections::HashMap;
use url::Url;

/// Response body as a stream of chunks
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// One GET request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: Url,
    pub headers: HashMap<String, String>,
}

/// Response head plus the unread body
pub struct HttpResponse {
    pub status: u16,

    /// Header names lowercased
    pub headers: HashMap<String, String>,

    /// `Content-Length` of this response, if sent
    pub content_length: Option<u64>,

    pub body: BodyStream,
}

impl HttpResponse {
    /// Header lookup by lowercase name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 307 | 308)
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Blocking-free network request capability used by the downloader
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request` and return once the response head is available
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Default transport backed by reqwest, with automatic redirects disabled
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.get(request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(StreamError::from))
            .boxed();

        Ok(HttpResponse {
            status,
            headers,
            content_length,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[test]
    fn test_status_classes() {
        let response = HttpResponse {
            status: 308,
            headers: HashMap::from([("location".to_string(), "/next".to_string())]),
            content_length: None,
            body: stream::empty().boxed(),
        };
        assert!(response.is_redirect());
        assert!(!response.is_success());
        assert_eq!(response.header("location"), Some("/next"));
    }

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new(&DownloadConfig::default()).is_ok());
    }
}
