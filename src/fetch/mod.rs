//! HTTP fetching with rate limit handling.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::config::FetchConfig;

/// Errors that can occur during fetching.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Rate limited fetching {url}, retry after {retry_after_secs}s")]
    RateLimited { url: String, retry_after_secs: u64 },

    #[error("HTTP {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A fetched response body.
#[derive(Debug, Clone)]
pub struct FetchedDoc {
    pub url: Url,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// HTTP client wrapper. A 429 response is retried once after waiting
/// out the server's Retry-After; a second 429 surfaces as an error.
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Client for raw file and page downloads.
    pub fn plain(config: &FetchConfig) -> Result<Self, FetchError> {
        Self::build(config, None)
    }

    /// Client for the GitHub API, authenticated when a token is given.
    pub fn github(config: &FetchConfig, token: Option<String>) -> Result<Self, FetchError> {
        Self::build(config, token)
    }

    fn build(config: &FetchConfig, token: Option<String>) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("landscape-harvester/0.1")),
        );

        if let Some(token) = token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, value);
            }
            headers.insert(
                ACCEPT,
                HeaderValue::from_static("application/vnd.github+json"),
            );
            headers.insert(
                "X-GitHub-Api-Version",
                HeaderValue::from_static("2022-11-28"),
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }

    /// Fetch a URL with no query parameters.
    pub async fn fetch(&self, url: &Url) -> Result<FetchedDoc, FetchError> {
        self.fetch_with_params(url, &[]).await
    }

    /// Fetch a URL, retrying once if the server rate limits us.
    pub async fn fetch_with_params(
        &self,
        url: &Url,
        params: &[(&str, String)],
    ) -> Result<FetchedDoc, FetchError> {
        match self.fetch_inner(url, params).await {
            Err(FetchError::RateLimited {
                retry_after_secs, ..
            }) => {
                warn!(
                    "Rate limited fetching {}, retrying in {}s",
                    url, retry_after_secs
                );
                tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
                self.fetch_inner(url, params).await
            }
            other => other,
        }
    }

    /// Fetch a URL and deserialize the response body.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let doc = self.fetch_with_params(url, params).await?;
        Ok(serde_json::from_slice(&doc.body)?)
    }

    async fn fetch_inner(
        &self,
        url: &Url,
        params: &[(&str, String)],
    ) -> Result<FetchedDoc, FetchError> {
        let mut request = self.client.get(url.as_str());
        if !params.is_empty() {
            request = request.query(params);
        }
        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(FetchError::RateLimited {
                url: url.to_string(),
                retry_after_secs,
            });
        }

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response.bytes().await?.to_vec();

        Ok(FetchedDoc {
            url: url.clone(),
            body,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> FetchConfig {
        FetchConfig {
            timeout_secs: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/readme.md"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("# Hello", "text/markdown"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::plain(&test_config()).unwrap();
        let url = Url::parse(&format!("{}/readme.md", server.uri())).unwrap();
        let doc = fetcher.fetch(&url).await.unwrap();

        assert_eq!(doc.body, b"# Hello");
        assert_eq!(doc.content_type.as_deref(), Some("text/markdown"));
    }

    #[tokio::test]
    async fn test_fetch_http_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = Fetcher::plain(&test_config()).unwrap();
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let result = fetcher.fetch(&url).await;

        assert!(matches!(
            result,
            Err(FetchError::HttpStatus { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::plain(&test_config()).unwrap();
        let url = Url::parse(&format!("{}/limited", server.uri())).unwrap();

        let started = std::time::Instant::now();
        let doc = fetcher.fetch(&url).await.unwrap();

        assert_eq!(doc.body, b"ok");
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_persistent_rate_limit_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .expect(2)
            .mount(&server)
            .await;

        let fetcher = Fetcher::plain(&test_config()).unwrap();
        let url = Url::parse(&format!("{}/limited", server.uri())).unwrap();
        let result = fetcher.fetch(&url).await;

        assert!(matches!(
            result,
            Err(FetchError::RateLimited {
                retry_after_secs: 0,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_github_client_sends_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher =
            Fetcher::github(&test_config(), Some("test-token".to_string())).unwrap();
        let url = Url::parse(&format!("{}/repos/foo/bar", server.uri())).unwrap();

        fetcher.fetch(&url).await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_json_with_params() {
        #[derive(Deserialize)]
        struct Page {
            items: Vec<String>,
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"items": ["a", "b"]}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::plain(&test_config()).unwrap();
        let url = Url::parse(&format!("{}/search", server.uri())).unwrap();
        let page: Page = fetcher
            .fetch_json(&url, &[("page", "2".to_string())])
            .await
            .unwrap();

        assert_eq!(page.items, vec!["a", "b"]);
    }
}
