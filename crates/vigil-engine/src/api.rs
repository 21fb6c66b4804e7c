//! Acknowledge/resolve calls against the external alerts API.
//!
//! The engine's responsibility ends at flagging or removing the local
//! notification once the call settles. Failures map to a distinct
//! [`ActionFailure`] per status class: 401 redirects to login, 403 is a
//! permission denial, 404 means the alert is already gone server-side and
//! is treated as success locally, and 5xx/network failures are transient
//! with a retry affordance.

use std::time::Duration;

use tracing::debug;

use vigil_core::{ActionFailure, Result, VigilError};

/// Default request timeout for alert actions.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the alerts REST API.
#[derive(Debug, Clone)]
pub struct AlertsApi {
    client: reqwest::Client,
    base_url: String,
}

impl AlertsApi {
    /// Create a client for the given API base, e.g.
    /// `http://127.0.0.1:8000/api/alerts`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Acknowledge an alert: `POST {base}/{id}/acknowledge`.
    pub async fn acknowledge(&self, alert_id: &str) -> Result<()> {
        self.post_action(alert_id, "acknowledge").await
    }

    /// Resolve an alert: `POST {base}/{id}/resolve`.
    pub async fn resolve(&self, alert_id: &str) -> Result<()> {
        self.post_action(alert_id, "resolve").await
    }

    async fn post_action(&self, alert_id: &str, action: &str) -> Result<()> {
        let url = format!("{}/{}/{}", self.base_url, alert_id, action);
        debug!(alert_id, action, "alert action request");

        let response = self.client.post(&url).send().await.map_err(|e| {
            VigilError::ActionFailed {
                alert_id: alert_id.to_string(),
                failure: ActionFailure::Transient(e.to_string()),
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(VigilError::ActionFailed {
            alert_id: alert_id.to_string(),
            failure: ActionFailure::from_status(status.as_u16(), &body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn api_against(server: &MockServer) -> AlertsApi {
        AlertsApi::new(format!("{}/api/alerts", server.uri()))
    }

    fn failure_of(err: VigilError) -> ActionFailure {
        match err {
            VigilError::ActionFailed { failure, .. } => failure,
            other => panic!("expected ActionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_acknowledge_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/alerts/a1/acknowledge"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": true})),
            )
            .mount(&server)
            .await;

        let api = api_against(&server).await;
        assert!(api.acknowledge("a1").await.is_ok());
    }

    #[tokio::test]
    async fn test_resolve_hits_resolve_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/alerts/a1/resolve"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let api = api_against(&server).await;
        assert!(api.resolve("a1").await.is_ok());
    }

    #[tokio::test]
    async fn test_session_expired_maps_to_401() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let api = api_against(&server).await;
        let failure = failure_of(api.acknowledge("a1").await.unwrap_err());
        assert_eq!(failure, ActionFailure::SessionExpired);
    }

    #[tokio::test]
    async fn test_permission_denied_maps_to_403() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let api = api_against(&server).await;
        let failure = failure_of(api.acknowledge("a1").await.unwrap_err());
        assert_eq!(failure, ActionFailure::PermissionDenied);
    }

    #[tokio::test]
    async fn test_missing_alert_counts_as_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let api = api_against(&server).await;
        let failure = failure_of(api.resolve("gone").await.unwrap_err());
        assert_eq!(failure, ActionFailure::AlreadyGone);
        assert!(failure.counts_as_success());
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let api = api_against(&server).await;
        let failure = failure_of(api.acknowledge("a1").await.unwrap_err());
        assert!(failure.is_retryable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        // Nothing is listening on this port
        let api = AlertsApi::new("http://127.0.0.1:1/api/alerts");
        let failure = failure_of(api.acknowledge("a1").await.unwrap_err());
        assert!(failure.is_retryable());
    }
}
