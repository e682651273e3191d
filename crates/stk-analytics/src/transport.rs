//! HTTP transport for sending events.

use crate::types::TrackerEvent;
use crate::Error;
use tracing::debug;

/// HTTP transport for sending batches to the ingest endpoint.
///
/// No request timeout is set; the platform default applies.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new() -> Result<Self, Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }

    /// POST a batch as a JSON array. Any non-2xx status is a failure.
    pub async fn send(&self, endpoint: &str, events: &[TrackerEvent]) -> Result<(), Error> {
        debug!(endpoint = %endpoint, event_count = events.len(), "sending events");

        let body = serde_json::to_vec(events)?;

        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".into());
            return Err(Error::Delivery {
                status: status.as_u16(),
                body,
            });
        }

        debug!(event_count = events.len(), "events sent successfully");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_posts_json_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/log"))
            .and(header("Content-Type", "application/json"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        transport
            .send(&format!("{}/log", server.uri()), &[])
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_non_success_status_is_delivery_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let err = transport.send(&server.uri(), &[]).await.unwrap_err();

        match err {
            Error::Delivery { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "busy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_http_error() {
        let transport = HttpTransport::new().unwrap();
        let err = transport
            .send("http://127.0.0.1:9/log", &[])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Http(_)));
    }
}
