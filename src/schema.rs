//! Response payload returned by `POST /analyze_image`.

use crate::ocr::{OcrResult, Point};
use serde::Serialize;
use serde_json::Number;

/// A polygon vertex serialized as a two-element `[x, y]` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coordinate(pub Number, pub Number);

impl From<&Point> for Coordinate {
    fn from(p: &Point) -> Self {
        Coordinate(p.x.clone(), p.y.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzeResponse {
    pub image_height: u32,
    pub image_width: u32,
    pub model_version: String,
    pub ocr_results: OcrResults,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrResults {
    pub text_lines: Vec<TextLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextLine {
    pub text: String,
    pub bounding_box: Vec<Coordinate>,
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Word {
    pub text: String,
    pub bounding_polygon: Vec<Coordinate>,
    pub confidence: f64,
}

fn polygon(points: &[Point]) -> Vec<Coordinate> {
    points.iter().map(Coordinate::from).collect()
}

impl From<&OcrResult> for AnalyzeResponse {
    /// Flatten every read block into one list of lines, keeping provider order.
    fn from(result: &OcrResult) -> Self {
        let text_lines = result
            .read
            .iter()
            .flat_map(|read| read.blocks.iter())
            .flat_map(|block| block.lines.iter())
            .map(|line| TextLine {
                text: line.text.clone(),
                bounding_box: polygon(&line.bounding_polygon),
                words: line
                    .words
                    .iter()
                    .map(|word| Word {
                        text: word.text.clone(),
                        bounding_polygon: polygon(&word.bounding_polygon),
                        confidence: word.confidence,
                    })
                    .collect(),
            })
            .collect();

        AnalyzeResponse {
            image_height: result.metadata.height,
            image_width: result.metadata.width,
            model_version: result.model_version.clone(),
            ocr_results: OcrResults { text_lines },
        }
    }
}
