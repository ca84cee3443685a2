//! OCR provider abstraction.
//!
//! Defines the [`OcrProvider`] trait and the provider-neutral result types so
//! the remote vision service can be swapped for a test double.

pub mod azure;

use serde_json::Number;
use std::time::Duration;
use thiserror::Error;

/// Visual features a provider can be asked to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisualFeature {
    /// Printed and handwritten text recognition.
    Read,
}

impl VisualFeature {
    /// Name used in the provider's `features` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
        }
    }
}

/// A polygon vertex. Coordinates keep the numeric form the provider used.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub x: Number,
    pub y: Number,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub bounding_polygon: Vec<Point>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrLine {
    pub text: String,
    pub bounding_polygon: Vec<Point>,
    pub words: Vec<OcrWord>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OcrBlock {
    pub lines: Vec<OcrLine>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadResult {
    pub blocks: Vec<OcrBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
}

/// Unified analysis result returned by every provider.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrResult {
    pub model_version: String,
    pub metadata: ImageMetadata,
    /// `None` when the provider found no readable text region.
    pub read: Option<ReadResult>,
}

/// Failure of a provider call.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The provider answered with a non-success status.
    #[error("vision service rejected the request ({status}): {message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// The provider could not be reached or the connection broke.
    #[error("vision service unreachable: {0}")]
    Transport(String),
    /// The provider answered 2xx with a body we cannot interpret.
    #[error("vision service returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("vision service did not answer within {0:?}")]
    Timeout(Duration),
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn analyze(
        &self,
        image: &[u8],
        features: &[VisualFeature],
    ) -> Result<OcrResult, AnalysisError>;
}
