//! Client for the external classifier service: a REST surface for batch
//! submission/polling/education, plus a WebSocket push subscription for the
//! detection verdict.

pub mod http;
pub mod ws;

use serde::Deserialize;

use crate::model::{ClassifierResult, Severity};

/// Response shape for `GET /educate/<base-id>`.
#[derive(Debug, Clone, Deserialize)]
pub struct EducationResponse {
    pub frames: Vec<String>,
    pub explanation: String,
    pub indicators: Vec<String>,
    pub detection_summary: EducationSummary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EducationSummary {
    pub is_ai: bool,
    pub confidence: f64,
    pub severity: Severity,
}

impl EducationResponse {
    pub fn summary_as_result(&self) -> ClassifierResult {
        ClassifierResult {
            is_ai: self.detection_summary.is_ai,
            confidence: self.detection_summary.confidence,
            severity: self.detection_summary.severity,
            reasons: Vec::new(),
        }
    }
}
