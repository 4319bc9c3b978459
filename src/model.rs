//! Wire and domain types shared across the sensor intake, session, classifier,
//! and overlay components.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A location message as produced by the in-page observer and decoded by the
/// sensor intake server.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationMessage {
    pub site: String,
    pub dpr: f64,
    #[serde(rename = "windowScreenX")]
    pub window_screen_x: i32,
    #[serde(rename = "windowScreenY")]
    pub window_screen_y: i32,
    pub post: Option<PostLocation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostLocation {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub visibility: f64,
}

/// A screen-space rectangle in CSS pixels, already including the browser
/// window's offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl From<&PostLocation> for ScreenRect {
    fn from(p: &PostLocation) -> Self {
        ScreenRect {
            x: p.x,
            y: p.y,
            w: p.w,
            h: p.h,
        }
    }
}

/// Splits a full post id (`post_<n>_<epoch-ms>`) into its base id
/// (`post_<n>`). Falls back to the whole string if it doesn't match the
/// expected shape, so a malformed id never panics the caller.
pub fn base_post_id(full_id: &str) -> String {
    let mut parts = full_id.splitn(3, '_');
    match (parts.next(), parts.next()) {
        (Some("post"), Some(n)) if n.chars().all(|c| c.is_ascii_digit()) && !n.is_empty() => {
            format!("post_{n}")
        }
        _ => full_id.to_string(),
    }
}

/// Extracts the base post id from a frame filename
/// (`<full-id>_frame<counter>_<epoch-ms>.jpg`).
pub fn base_id_from_filename(filename: &str) -> Option<String> {
    let stem = filename.strip_suffix(".jpg").unwrap_or(filename);
    let idx = stem.find("_frame")?;
    Some(base_post_id(&stem[..idx]))
}

pub fn make_frame_filename(full_post_id: &str, counter: u32, epoch_ms: u64) -> String {
    format!("{full_post_id}_frame{counter}_{epoch_ms}.jpg")
}

pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Severity bucket attached to a classifier verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Uncertain,
}

/// The UI-facing label computed from `is_ai`/`confidence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Analyzing,
    LikelyReal,
    Unclear,
    PossiblyAi,
    LikelyAi,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::Analyzing => "Analyzing…",
            Label::LikelyReal => "Likely Real",
            Label::Unclear => "Unclear",
            Label::PossiblyAi => "Possibly AI",
            Label::LikelyAi => "Likely AI",
        }
    }

    pub fn is_analyzing(self) -> bool {
        matches!(self, Label::Analyzing)
    }
}

/// Total function mapping `(is_ai, confidence)` to a label. Boundaries are
/// inclusive on the lower end (`>=`).
pub fn label(is_ai: bool, confidence: f64) -> Label {
    if confidence < 0.60 {
        Label::Unclear
    } else if is_ai && confidence >= 0.80 {
        Label::LikelyAi
    } else if is_ai {
        Label::PossiblyAi
    } else {
        Label::LikelyReal
    }
}

/// The classifier's raw payload shape, shared by the REST GET and the
/// WebSocket push.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierResult {
    pub is_ai: bool,
    pub confidence: f64,
    pub severity: Severity,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// A fully resolved verdict for a post: the classifier's raw result plus the
/// derived label.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub post_id: String,
    pub is_ai: bool,
    pub confidence: f64,
    pub severity: Severity,
    pub reasons: Vec<String>,
    pub label: Label,
}

impl Verdict {
    pub fn from_result(post_id: impl Into<String>, result: ClassifierResult) -> Self {
        let label = label(result.is_ai, result.confidence);
        Verdict {
            post_id: post_id.into(),
            is_ai: result.is_ai,
            confidence: result.confidence,
            severity: result.severity,
            reasons: result.reasons,
            label,
        }
    }

    /// The placeholder verdict shown while a session is Arming/Capturing.
    pub fn analyzing(post_id: impl Into<String>) -> Self {
        Verdict {
            post_id: post_id.into(),
            is_ai: false,
            confidence: 0.0,
            severity: Severity::Uncertain,
            reasons: Vec::new(),
            label: Label::Analyzing,
        }
    }
}

/// The single record the overlay surface renders.
#[derive(Debug, Clone)]
pub struct OverlayState {
    pub visible: bool,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub label: Label,
    pub score: f64,
    pub post_id: String,
    pub show_debug_box: bool,
}

impl OverlayState {
    pub fn hidden() -> Self {
        OverlayState {
            visible: false,
            x: 0.0,
            y: 0.0,
            w: 0.0,
            h: 0.0,
            label: Label::Analyzing,
            score: 0.0,
            post_id: String::new(),
            show_debug_box: false,
        }
    }
}

/// Commands flowing from the session manager to the overlay surface, as a
/// single closed variant type rather than separate callback shapes.
#[derive(Debug, Clone)]
pub enum OverlayCommand {
    Show(OverlayState),
    Hide,
    SetDebug(bool),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_post_id_strips_creation_timestamp() {
        assert_eq!(base_post_id("post_1_1000"), "post_1");
        assert_eq!(base_post_id("post_42_1771200000000"), "post_42");
    }

    #[test]
    fn base_post_id_passes_through_unrecognized_ids() {
        assert_eq!(base_post_id("weird-id"), "weird-id");
    }

    #[test]
    fn filename_round_trip_recovers_base_id() {
        let full = "post_7_1700000000000";
        let filename = make_frame_filename(full, 2, 1700000001234);
        assert_eq!(
            base_id_from_filename(&filename).as_deref(),
            Some(base_post_id(full).as_str())
        );
    }

    #[test]
    fn label_matches_table_at_every_boundary() {
        assert_eq!(label(true, 0.59).as_str(), "Unclear");
        assert_eq!(label(false, 0.59).as_str(), "Unclear");
        assert_eq!(label(false, 0.60).as_str(), "Likely Real");
        assert_eq!(label(true, 0.60).as_str(), "Possibly AI");
        assert_eq!(label(true, 0.79).as_str(), "Possibly AI");
        assert_eq!(label(true, 0.80).as_str(), "Likely AI");
    }

    #[test]
    fn label_is_monotone_for_real_content() {
        // Increasing confidence while is_ai is false never yields an AI label.
        for c in [0.0, 0.3, 0.6, 0.8, 1.0] {
            let l = label(false, c);
            assert!(!matches!(l, Label::LikelyAi | Label::PossiblyAi));
        }
    }
}
