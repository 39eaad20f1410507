//! HTTP client for the analysis service with timeout and failure
//! classification.
//!
//! Failure classes drive the queue's retry policy: transport faults,
//! timeouts, and 5xx responses are retryable; 4xx responses are
//! unrecoverable and bypass retry entirely.

use std::time::Duration;

use async_trait::async_trait;

use crate::normalize::{self, Analysis, RawAnalysis};

/// Default hard timeout for one analysis call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Failure classification for an analysis call.
///
/// Exactly two classes by design: the queue's backoff machinery consumes
/// this distinction directly instead of inspecting flags on an error
/// object.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Transient: service unavailable, 5xx, timeout, connection failure.
    /// Re-raise to the queue so backoff reschedules the job.
    #[error("retryable analysis failure: {0}")]
    Retryable(String),

    /// Permanent: 4xx or a malformed success body. Retrying cannot help.
    #[error("unrecoverable analysis failure: {0}")]
    Unrecoverable(String),
}

impl AnalysisError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::Retryable(_))
    }

    /// Classify a non-2xx HTTP status.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("analysis service returned {status}: {body}");
        if (400..500).contains(&status) {
            AnalysisError::Unrecoverable(detail)
        } else {
            AnalysisError::Retryable(detail)
        }
    }
}

/// Configuration for the analysis client.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Base URL of the analysis service, e.g. `http://analysis:9000`.
    pub endpoint: String,
    /// Hard timeout for one call (default: 90 s).
    pub timeout: Duration,
}

impl AnalysisConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                  | Required | Default |
    /// |--------------------------|----------|---------|
    /// | `ANALYSIS_ENDPOINT`      | **yes**  | --      |
    /// | `ANALYSIS_TIMEOUT_SECS`  | no       | `90`    |
    ///
    /// # Panics
    ///
    /// Panics if `ANALYSIS_ENDPOINT` is not set.
    pub fn from_env() -> Self {
        let endpoint = std::env::var("ANALYSIS_ENDPOINT")
            .expect("ANALYSIS_ENDPOINT must be set in the environment");

        let timeout_secs: u64 = std::env::var("ANALYSIS_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_TIMEOUT.as_secs().to_string())
            .parse()
            .expect("ANALYSIS_TIMEOUT_SECS must be a valid u64");

        Self {
            endpoint,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// Seam for the worker: anything that can analyze a sneaker image.
///
/// The production implementation is [`AnalysisClient`]; tests substitute
/// scripted stubs.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, image_url: &str, category: &str) -> Result<Analysis, AnalysisError>;
}

/// HTTP client for a single analysis service endpoint.
pub struct AnalysisClient {
    client: reqwest::Client,
    endpoint: String,
}

impl AnalysisClient {
    /// Create a client with the timeout baked into the underlying
    /// connection pool. Panics on TLS/backend misconfiguration, which is
    /// a startup-time failure by construction.
    pub fn new(config: AnalysisConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build analysis HTTP client");
        Self {
            client,
            endpoint: config.endpoint,
        }
    }

    /// Map a transport-level failure to its retry class.
    ///
    /// Timeouts and connection failures (refused, DNS) are transient.
    /// Anything else at this layer (request build, redirect policy) is
    /// treated the same way: the service was never reached, so retrying
    /// is safe.
    fn classify_transport(e: reqwest::Error) -> AnalysisError {
        if e.is_timeout() {
            AnalysisError::Retryable(format!("analysis request timed out: {e}"))
        } else {
            AnalysisError::Retryable(format!("analysis request failed: {e}"))
        }
    }
}

#[async_trait]
impl AnalysisService for AnalysisClient {
    /// Submit one image for analysis and return the normalized result.
    async fn analyze(&self, image_url: &str, category: &str) -> Result<Analysis, AnalysisError> {
        let body = serde_json::json!({
            "image_url": image_url,
            "category": category,
        });

        let response = self
            .client
            .post(format!("{}/analyze", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(Self::classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AnalysisError::from_status(status.as_u16(), &body));
        }

        // A 2xx body that does not parse is a contract violation, not a
        // transient fault; retrying will not heal it.
        let raw: RawAnalysis = response.json().await.map_err(|e| {
            AnalysisError::Unrecoverable(format!("malformed analysis response: {e}"))
        })?;

        Ok(normalize::normalize(raw))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::AiField;
    use assert_matches::assert_matches;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    /// Spin up a loopback analysis service returning a fixed response.
    async fn serve(
        status: StatusCode,
        body: serde_json::Value,
    ) -> (String, tokio::task::JoinHandle<()>) {
        let app = Router::new().route(
            "/analyze",
            post(move || {
                let body = body.clone();
                async move { (status, Json(body)) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        (format!("http://{addr}"), handle)
    }

    fn client_for(endpoint: String) -> AnalysisClient {
        AnalysisClient::new(AnalysisConfig {
            endpoint,
            timeout: Duration::from_secs(5),
        })
    }

    #[test]
    fn status_classification() {
        assert_matches!(
            AnalysisError::from_status(503, "down"),
            AnalysisError::Retryable(_)
        );
        assert_matches!(
            AnalysisError::from_status(500, "boom"),
            AnalysisError::Retryable(_)
        );
        assert_matches!(
            AnalysisError::from_status(422, "bad image"),
            AnalysisError::Unrecoverable(_)
        );
        assert_matches!(
            AnalysisError::from_status(404, "gone"),
            AnalysisError::Unrecoverable(_)
        );
    }

    #[tokio::test]
    async fn successful_call_returns_normalized_result() {
        let (endpoint, server) = serve(
            StatusCode::OK,
            serde_json::json!({"brand": "Nike", "model": "Air Max"}),
        )
        .await;

        let analysis = client_for(endpoint)
            .analyze("https://x/y.jpg", "sneaker")
            .await
            .expect("analysis should succeed");

        assert_eq!(
            analysis.metadata.brand,
            Some(AiField {
                value: "Nike".into(),
                confidence: 0.8,
            })
        );
        server.abort();
    }

    #[tokio::test]
    async fn http_422_is_unrecoverable() {
        let (endpoint, server) = serve(
            StatusCode::UNPROCESSABLE_ENTITY,
            serde_json::json!({"error": "unsupported image"}),
        )
        .await;

        let err = client_for(endpoint)
            .analyze("https://x/y.jpg", "sneaker")
            .await
            .expect_err("422 must fail");
        assert_matches!(err, AnalysisError::Unrecoverable(_));
        assert!(!err.is_retryable());
        server.abort();
    }

    #[tokio::test]
    async fn http_503_is_retryable() {
        let (endpoint, server) =
            serve(StatusCode::SERVICE_UNAVAILABLE, serde_json::json!({})).await;

        let err = client_for(endpoint)
            .analyze("https://x/y.jpg", "sneaker")
            .await
            .expect_err("503 must fail");
        assert!(err.is_retryable());
        server.abort();
    }

    #[tokio::test]
    async fn connection_refused_is_retryable() {
        // Nothing listens on this port.
        let err = client_for("http://127.0.0.1:1".to_string())
            .analyze("https://x/y.jpg", "sneaker")
            .await
            .expect_err("connection must fail");
        assert!(err.is_retryable());
    }
}
