//! Repository reachability probe
//!
//! Issues an HTTP HEAD request against the tracked repository, following
//! redirects. Only a final `200 OK` counts as reachable.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use crate::Error;

/// Maximum number of redirects followed before giving up
const MAX_REDIRECTS: usize = 10;

/// Result of a reachability probe
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reachability {
    /// Whether the repository answered `200 OK`
    pub reachable: bool,
    /// Status line or transport-level cause
    pub detail: String,
}

impl Reachability {
    /// A reachable result
    pub fn reachable(detail: impl Into<String>) -> Self {
        Self {
            reachable: true,
            detail: detail.into(),
        }
    }

    /// An unreachable result
    pub fn unreachable(detail: impl Into<String>) -> Self {
        Self {
            reachable: false,
            detail: detail.into(),
        }
    }
}

/// Checks whether a source repository can be reached
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RepositoryProbe: Send + Sync {
    /// Probe the repository
    ///
    /// Transport failures and non-200 responses are `Ok` with
    /// `reachable == false`. The future may be dropped at any point to
    /// abandon the request.
    async fn probe(&self, url: &Url) -> Result<Reachability, Error>;
}

/// [`RepositoryProbe`] backed by a shared `reqwest` client
#[derive(Clone, Debug)]
pub struct HttpRepositoryProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpRepositoryProbe {
    /// Build a probe whose requests are bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .redirect(Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::internal_with_context("probe", format!("failed to create HTTP client: {}", e))
            })?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl RepositoryProbe for HttpRepositoryProbe {
    async fn probe(&self, url: &Url) -> Result<Reachability, Error> {
        let result = match self.client.head(url.clone()).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                Reachability::reachable(format!("HTTP {}", response.status()))
            }
            Ok(response) => Reachability::unreachable(format!("HTTP {}", response.status())),
            Err(e) if e.is_timeout() => {
                Reachability::unreachable(format!("timed out after {:?}", self.timeout))
            }
            Err(e) if e.is_redirect() => {
                Reachability::unreachable(format!("too many redirects: {}", e))
            }
            Err(e) => Reachability::unreachable(format!("request failed: {}", e)),
        };

        debug!(url = %url, reachable = result.reachable, detail = %result.detail, "repository probed");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn probe() -> HttpRepositoryProbe {
        HttpRepositoryProbe::new(Duration::from_secs(2)).unwrap()
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    /// Story: A repository answering 200 to HEAD is reachable
    #[tokio::test]
    async fn story_head_200_is_reachable() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/org/app"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let result = probe().probe(&url(&server, "/org/app")).await.unwrap();
        assert!(result.reachable);
        assert!(result.detail.contains("200"));
    }

    /// Story: A missing repository is unreachable, not an error
    #[tokio::test]
    async fn story_head_404_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = probe().probe(&url(&server, "/org/gone")).await.unwrap();
        assert!(!result.reachable);
        assert!(result.detail.contains("404"));
    }

    #[tokio::test]
    async fn test_redirects_are_followed() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("Location", format!("{}/new", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let result = probe().probe(&url(&server, "/old")).await.unwrap();
        assert!(result.reachable);
    }

    #[tokio::test]
    async fn test_other_success_codes_are_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let result = probe().probe(&url(&server, "/")).await.unwrap();
        assert!(!result.reachable);
    }

    #[tokio::test]
    async fn test_slow_repository_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let probe = HttpRepositoryProbe::new(Duration::from_millis(200)).unwrap();
        let result = probe.probe(&url(&server, "/")).await.unwrap();
        assert!(!result.reachable);
        assert!(result.detail.contains("timed out"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        let result = probe()
            .probe(&Url::parse("http://127.0.0.1:1/repo").unwrap())
            .await
            .unwrap();
        assert!(!result.reachable);
        assert!(result.detail.starts_with("request failed"));
    }
}
