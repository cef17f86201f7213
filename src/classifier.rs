//! Remote label classification.
//!
//! The service takes one pose as `{"landmarks": [{x, y, z?}, ...]}` and
//! answers `{"alphabet": "<symbol>"}`. A missing or blank `alphabet` means the
//! service saw no letter in the pose.

use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use crate::landmark::{Landmark, Pose};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

#[async_trait]
pub trait LabelClassifier: Send + Sync {
    /// Classify one pose; `Ok(None)` when the service returns no label
    async fn classify(&self, pose: &Pose) -> Result<Option<String>, ClassifierError>;
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    landmarks: &'a [Landmark],
}

#[derive(Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    alphabet: Option<String>,
}

/// HTTP client for the classification endpoint
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LabelClassifier for HttpClassifier {
    async fn classify(&self, pose: &Pose) -> Result<Option<String>, ClassifierError> {
        let request = ClassifyRequest {
            landmarks: pose.landmarks(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body = response.bytes().await?;
        trace!("Classifier response: {}", String::from_utf8_lossy(&body));

        let decoded: ClassifyResponse = serde_json::from_slice(&body)
            .map_err(|e| ClassifierError::Decode(e.to_string()))?;

        let label = decoded
            .alphabet
            .map(|alphabet| alphabet.trim().to_string())
            .filter(|alphabet| !alphabet.is_empty());

        debug!("Classifier returned {:?}", label);
        Ok(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::test_pose;
    use axum::extract::State;
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    #[derive(Clone)]
    struct StubState {
        status: StatusCode,
        body: &'static str,
        delay: Duration,
        requests: mpsc::UnboundedSender<serde_json::Value>,
    }

    async fn predict_handler(
        State(stub): State<StubState>,
        Json(request): Json<serde_json::Value>,
    ) -> impl IntoResponse {
        let _ = stub.requests.send(request);
        tokio::time::sleep(stub.delay).await;
        (
            stub.status,
            [(header::CONTENT_TYPE, "application/json")],
            stub.body,
        )
    }

    /// Classification service answering every `/predict` with `status` and
    /// `body`; request bodies are forwarded to the returned channel
    async fn stub_server(
        status: StatusCode,
        body: &'static str,
        delay: Duration,
    ) -> (String, mpsc::UnboundedReceiver<serde_json::Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (requests, rx) = mpsc::unbounded_channel();

        let app = Router::new()
            .route("/predict", post(predict_handler))
            .with_state(StubState {
                status,
                body,
                delay,
                requests,
            });

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        (format!("http://{}/predict", addr), rx)
    }

    fn classifier_for(endpoint: String, timeout_ms: u64) -> HttpClassifier {
        HttpClassifier::from_config(&ClassifierConfig {
            endpoint,
            cooldown_ms: 200,
            timeout_ms,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_classify_returns_alphabet() {
        let (endpoint, mut requests) =
            stub_server(StatusCode::OK, r#"{"alphabet":"B"}"#, Duration::ZERO).await;
        let classifier = classifier_for(endpoint, 2000);

        let label = classifier.classify(&test_pose(0.0)).await.unwrap();
        assert_eq!(label.as_deref(), Some("B"));

        let sent = requests.recv().await.unwrap();
        let landmarks = sent["landmarks"].as_array().unwrap();
        assert_eq!(landmarks.len(), 21);
        assert!(landmarks[0]["x"].is_number());
    }

    #[tokio::test]
    async fn test_missing_or_blank_alphabet_is_no_label() {
        let (endpoint, _requests) = stub_server(StatusCode::OK, r#"{"score":0.2}"#, Duration::ZERO).await;
        let classifier = classifier_for(endpoint, 2000);
        assert_eq!(classifier.classify(&test_pose(0.0)).await.unwrap(), None);

        let (endpoint, _requests) =
            stub_server(StatusCode::OK, r#"{"alphabet":"  "}"#, Duration::ZERO).await;
        let classifier = classifier_for(endpoint, 2000);
        assert_eq!(classifier.classify(&test_pose(0.0)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_service_error_status() {
        let (endpoint, _requests) =
            stub_server(StatusCode::SERVICE_UNAVAILABLE, "{}", Duration::ZERO).await;
        let classifier = classifier_for(endpoint, 2000);

        assert_eq!(
            classifier.classify(&test_pose(0.0)).await,
            Err(ClassifierError::Status(503))
        );
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        let (endpoint, _requests) = stub_server(StatusCode::OK, "<html>", Duration::ZERO).await;
        let classifier = classifier_for(endpoint, 2000);

        assert!(matches!(
            classifier.classify(&test_pose(0.0)).await,
            Err(ClassifierError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let (endpoint, _requests) =
            stub_server(StatusCode::OK, r#"{"alphabet":"A"}"#, Duration::from_secs(5)).await;
        let classifier = classifier_for(endpoint, 100);

        assert_eq!(
            classifier.classify(&test_pose(0.0)).await,
            Err(ClassifierError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let classifier = classifier_for(format!("http://{}/predict", addr), 2000);
        assert!(matches!(
            classifier.classify(&test_pose(0.0)).await,
            Err(ClassifierError::Transport(_))
        ));
    }
}
