//! Outcome evaluator backed by a real HTTP enrollment endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use rollcall_retry::OutcomeCode;

use super::{EvaluatorError, OutcomeEvaluator};

#[derive(Debug, Serialize)]
struct EvaluateRequest<'a> {
    key: &'a str,
}

/// POSTs `{"key": ...}` to `url` and classifies the response status.
///
/// Any HTTP response is an outcome (see [`OutcomeCode::from_status`]); only a
/// failure to get a response is an error.
#[derive(Debug, Clone)]
pub struct HttpOutcomeEvaluator {
    client: reqwest::Client,
    url: String,
}

impl HttpOutcomeEvaluator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, EvaluatorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EvaluatorError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl OutcomeEvaluator for HttpOutcomeEvaluator {
    async fn evaluate(&self, key: &str) -> Result<OutcomeCode, EvaluatorError> {
        let response = self
            .client
            .post(&self.url)
            .json(&EvaluateRequest { key })
            .send()
            .await
            .map_err(|e| EvaluatorError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let outcome = OutcomeCode::from_status(status);
        debug!(url = %self.url, status, outcome = %outcome, "enrollment call answered");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP server answering every request with `status_line`.
    async fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            let _ = socket.write_all(response.as_bytes()).await;
        });
        format!("http://{addr}/enroll")
    }

    #[tokio::test]
    async fn maps_response_status_to_outcome() {
        for (status_line, expected) in [
            ("200 OK", OutcomeCode::Success),
            ("409 Conflict", OutcomeCode::Conflict),
            ("503 Service Unavailable", OutcomeCode::ServerError),
            ("422 Unprocessable Entity", OutcomeCode::InvalidInput),
        ] {
            let url = serve_once(status_line).await;
            let evaluator = HttpOutcomeEvaluator::new(url, Duration::from_secs(5)).unwrap();
            assert_eq!(evaluator.evaluate("STU-7").await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let evaluator = HttpOutcomeEvaluator::new("http://127.0.0.1:9/enroll", Duration::from_millis(500)).unwrap();
        let err = evaluator.evaluate("STU-100").await.unwrap_err();
        assert!(matches!(err, EvaluatorError::Transport(_)));
    }
}
