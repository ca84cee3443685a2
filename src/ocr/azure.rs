//! Azure AI Vision provider (Image Analysis 4.0 REST API).

use super::{
    AnalysisError, ImageMetadata, OcrBlock, OcrLine, OcrProvider, OcrResult, OcrWord, Point,
    ReadResult, VisualFeature,
};
use crate::config::VisionConfig;
use serde::Deserialize;
use serde_json::Number;
use std::time::Duration;
use tracing::{debug, info};

const ANALYZE_PATH: &str = "/computervision/imageanalysis:analyze";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

pub struct AzureVisionProvider {
    endpoint: String,
    key: String,
    api_version: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl AzureVisionProvider {
    pub fn new(client: reqwest::Client, config: &VisionConfig) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            key: config.key.clone(),
            api_version: config.api_version.clone(),
            timeout: config.timeout,
            client,
        }
    }

    fn analyze_url(&self) -> String {
        format!("{}{}", self.endpoint, ANALYZE_PATH)
    }

    fn transport_error(&self, err: reqwest::Error) -> AnalysisError {
        if err.is_timeout() {
            AnalysisError::Timeout(self.timeout)
        } else {
            AnalysisError::Transport(err.to_string())
        }
    }
}

// ── Azure API response types ────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureAnalyzeResponse {
    model_version: String,
    metadata: AzureMetadata,
    #[serde(default)]
    read_result: Option<AzureReadResult>,
}

#[derive(Deserialize)]
struct AzureMetadata {
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct AzureReadResult {
    #[serde(default)]
    blocks: Vec<AzureBlock>,
}

#[derive(Deserialize)]
struct AzureBlock {
    #[serde(default)]
    lines: Vec<AzureLine>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureLine {
    text: String,
    #[serde(default)]
    bounding_polygon: Vec<AzurePoint>,
    #[serde(default)]
    words: Vec<AzureWord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureWord {
    text: String,
    #[serde(default)]
    bounding_polygon: Vec<AzurePoint>,
    confidence: f64,
}

#[derive(Deserialize)]
struct AzurePoint {
    x: Number,
    y: Number,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn convert_points(points: Vec<AzurePoint>) -> Vec<Point> {
    points.into_iter().map(|p| Point { x: p.x, y: p.y }).collect()
}

impl From<AzureAnalyzeResponse> for OcrResult {
    fn from(resp: AzureAnalyzeResponse) -> Self {
        let read = resp.read_result.map(|read| ReadResult {
            blocks: read
                .blocks
                .into_iter()
                .map(|block| OcrBlock {
                    lines: block
                        .lines
                        .into_iter()
                        .map(|line| OcrLine {
                            text: line.text,
                            bounding_polygon: convert_points(line.bounding_polygon),
                            words: line
                                .words
                                .into_iter()
                                .map(|word| OcrWord {
                                    text: word.text,
                                    bounding_polygon: convert_points(word.bounding_polygon),
                                    confidence: word.confidence,
                                })
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
        });

        OcrResult {
            model_version: resp.model_version,
            metadata: ImageMetadata {
                width: resp.metadata.width,
                height: resp.metadata.height,
            },
            read,
        }
    }
}

/// Build a `Rejected` error from a non-success reply, using the
/// `{"error": {"code", "message"}}` envelope when the service sent one.
fn rejection(status: u16, body: &str) -> AnalysisError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => AnalysisError::Rejected {
            status,
            code: envelope.error.code,
            message: envelope.error.message.unwrap_or_else(|| body.to_string()),
        },
        Err(_) => AnalysisError::Rejected {
            status,
            code: None,
            message: body.to_string(),
        },
    }
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrProvider for AzureVisionProvider {
    fn name(&self) -> &str {
        "azure_vision"
    }

    async fn analyze(
        &self,
        image: &[u8],
        features: &[VisualFeature],
    ) -> Result<OcrResult, AnalysisError> {
        let features = features
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(",");

        info!(
            "AzureVisionProvider: analyzing {} bytes (features={})",
            image.len(),
            features
        );

        let resp = self
            .client
            .post(self.analyze_url())
            .query(&[
                ("api-version", self.api_version.as_str()),
                ("features", features.as_str()),
            ])
            .header(KEY_HEADER, &self.key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .timeout(self.timeout)
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let raw_text = resp.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(rejection(status.as_u16(), &raw_text));
        }

        debug!(
            "AzureVisionProvider: raw response ({} bytes): {}",
            raw_text.len(),
            raw_text.chars().take(500).collect::<String>()
        );

        let parsed: AzureAnalyzeResponse = serde_json::from_str(&raw_text)
            .map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;

        Ok(parsed.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
    use axum::Router;
    use std::sync::{Arc, Mutex};

    const SAMPLE: &str = r#"{
        "modelVersion": "2023-10-01",
        "metadata": { "width": 10, "height": 20 },
        "readResult": {
            "blocks": [
                { "lines": [
                    {
                        "text": "HELLO",
                        "boundingPolygon": [{"x":0,"y":0},{"x":50,"y":0},{"x":50,"y":10},{"x":0,"y":10}],
                        "words": [
                            {
                                "text": "HELLO",
                                "boundingPolygon": [{"x":0,"y":0},{"x":50,"y":0},{"x":50,"y":10},{"x":0,"y":10}],
                                "confidence": 0.99
                            }
                        ]
                    }
                ] },
                { "lines": [
                    { "text": "WORLD", "boundingPolygon": [{"x":1.5,"y":12}], "words": [] }
                ] }
            ]
        }
    }"#;

    struct Seen {
        method: Method,
        path: String,
        query: String,
        key: Option<String>,
        content_type: Option<String>,
        body: Vec<u8>,
    }

    /// Serve a fake vision endpoint on a loopback port and record what it receives.
    async fn fake_vision(
        status: StatusCode,
        reply: &'static str,
        delay: Duration,
    ) -> (String, Arc<Mutex<Vec<Seen>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let app = Router::new().fallback(
            move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
                let sink = sink.clone();
                async move {
                    let header_value = |name: &str| {
                        headers
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string)
                    };
                    sink.lock().unwrap().push(Seen {
                        method,
                        path: uri.path().to_string(),
                        query: uri.query().unwrap_or_default().to_string(),
                        key: header_value(KEY_HEADER),
                        content_type: header_value("content-type"),
                        body: body.to_vec(),
                    });
                    tokio::time::sleep(delay).await;
                    (status, [(header::CONTENT_TYPE, "application/json")], reply)
                }
            },
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/", addr), seen)
    }

    fn provider(endpoint: &str, timeout: Duration) -> AzureVisionProvider {
        let config = VisionConfig {
            endpoint: endpoint.to_string(),
            key: "test-key".to_string(),
            api_version: "2024-02-01".to_string(),
            timeout,
        };
        AzureVisionProvider::new(reqwest::Client::new(), &config)
    }

    #[tokio::test]
    async fn test_sends_image_with_key_and_read_feature() {
        let (endpoint, seen) = fake_vision(StatusCode::OK, SAMPLE, Duration::ZERO).await;
        let provider = provider(&endpoint, Duration::from_secs(5));

        let result = provider
            .analyze(b"\x89PNG fake", &[VisualFeature::Read])
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let req = &seen[0];
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.path, "/computervision/imageanalysis:analyze");
        assert!(req.query.contains("api-version=2024-02-01"));
        assert!(req.query.contains("features=read"));
        assert_eq!(req.key.as_deref(), Some("test-key"));
        assert_eq!(req.content_type.as_deref(), Some("application/octet-stream"));
        assert_eq!(req.body, b"\x89PNG fake");

        assert_eq!(result.model_version, "2023-10-01");
        assert_eq!(result.metadata, ImageMetadata { width: 10, height: 20 });
    }

    #[tokio::test]
    async fn test_parses_blocks_in_order() {
        let (endpoint, _) = fake_vision(StatusCode::OK, SAMPLE, Duration::ZERO).await;
        let result = provider(&endpoint, Duration::from_secs(5))
            .analyze(b"img", &[VisualFeature::Read])
            .await
            .unwrap();

        let read = result.read.unwrap();
        assert_eq!(read.blocks.len(), 2);
        assert_eq!(read.blocks[0].lines[0].text, "HELLO");
        assert_eq!(read.blocks[0].lines[0].words[0].confidence, 0.99);
        assert_eq!(read.blocks[0].lines[0].bounding_polygon.len(), 4);
        assert_eq!(read.blocks[1].lines[0].text, "WORLD");

        let point = &read.blocks[1].lines[0].bounding_polygon[0];
        assert_eq!(point.x.as_f64(), Some(1.5));
        assert_eq!(point.y.as_u64(), Some(12));
    }

    #[tokio::test]
    async fn test_missing_read_result() {
        let body = r#"{"modelVersion":"2023-10-01","metadata":{"width":3,"height":4}}"#;
        let (endpoint, _) = fake_vision(StatusCode::OK, body, Duration::ZERO).await;
        let result = provider(&endpoint, Duration::from_secs(5))
            .analyze(b"img", &[VisualFeature::Read])
            .await
            .unwrap();

        assert!(result.read.is_none());
        assert_eq!(result.metadata.width, 3);
    }

    #[tokio::test]
    async fn test_rejection_carries_status_and_code() {
        let body = r#"{"error":{"code":"InvalidRequest","message":"Image format is not valid."}}"#;
        let (endpoint, _) = fake_vision(StatusCode::BAD_REQUEST, body, Duration::ZERO).await;
        let err = provider(&endpoint, Duration::from_secs(5))
            .analyze(b"not an image", &[VisualFeature::Read])
            .await
            .unwrap_err();

        match err {
            AnalysisError::Rejected { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code.as_deref(), Some("InvalidRequest"));
                assert_eq!(message, "Image format is not valid.");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejection_without_envelope() {
        let (endpoint, _) =
            fake_vision(StatusCode::UNAUTHORIZED, "access denied", Duration::ZERO).await;
        let err = provider(&endpoint, Duration::from_secs(5))
            .analyze(b"img", &[VisualFeature::Read])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::Rejected { status: 401, code: None, ref message } if message == "access denied"
        ));
    }

    #[tokio::test]
    async fn test_invalid_success_body() {
        let (endpoint, _) = fake_vision(StatusCode::OK, "{\"unexpected\":true}", Duration::ZERO).await;
        let err = provider(&endpoint, Duration::from_secs(5))
            .analyze(b"img", &[VisualFeature::Read])
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let (endpoint, _) = fake_vision(StatusCode::OK, SAMPLE, Duration::from_secs(5)).await;
        let err = provider(&endpoint, Duration::from_millis(100))
            .analyze(b"img", &[VisualFeature::Read])
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Timeout(d) if d == Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = provider(&format!("http://{}", addr), Duration::from_secs(5))
            .analyze(b"img", &[VisualFeature::Read])
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Transport(_)));
    }
}
