use super::key::UiStateKey;
use crate::engine::{
    AnalysisResult, FramingStatus, LightingStatus, ProcessingStatus, ScanningSide, ScanningStatus,
};
use serde::{Deserialize, Serialize};

/// "Skip images with ..." toggles. A disabled toggle turns the matching
/// detection rule off, so the frame falls through to later rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    pub skip_images_with_blur: bool,
    pub skip_images_with_glare: bool,
    pub skip_images_with_inadequate_lighting: bool,
    pub skip_images_occluded_by_hand: bool,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            skip_images_with_blur: true,
            skip_images_with_glare: true,
            skip_images_with_inadequate_lighting: true,
            skip_images_occluded_by_hand: true,
        }
    }
}

struct Rule {
    name: &'static str,
    eval: fn(&AnalysisResult, &ClassifierSettings) -> Option<UiStateKey>,
}

fn document_scanned(r: &AnalysisResult, _: &ClassifierSettings) -> Option<UiStateKey> {
    (r.scanning_status == ScanningStatus::DocumentScanned).then_some(UiStateKey::DocumentCaptured)
}

fn unsupported(r: &AnalysisResult, _: &ClassifierSettings) -> Option<UiStateKey> {
    r.processing_status
        .is_unsupported()
        .then_some(UiStateKey::UnsupportedDocument)
}

fn side_scanned(r: &AnalysisResult, _: &ClassifierSettings) -> Option<UiStateKey> {
    (r.scanning_status == ScanningStatus::SideScanned).then_some(UiStateKey::SideCaptured)
}

fn framing(r: &AnalysisResult, _: &ClassifierSettings) -> Option<UiStateKey> {
    match r.framing {
        FramingStatus::CameraTooClose => Some(UiStateKey::DocumentTooClose),
        FramingStatus::CameraTooFar => Some(UiStateKey::DocumentTooFar),
        FramingStatus::CameraAngleTooSteep => Some(UiStateKey::CameraAngleTooSteep),
        FramingStatus::DocumentTooCloseToCameraEdge => Some(UiStateKey::DocumentTooCloseToFrameEdge),
        _ => None,
    }
}

fn glare(r: &AnalysisResult, s: &ClassifierSettings) -> Option<UiStateKey> {
    (s.skip_images_with_glare && r.glare.is_detected()).then_some(UiStateKey::GlareDetected)
}

fn lighting(r: &AnalysisResult, s: &ClassifierSettings) -> Option<UiStateKey> {
    if !s.skip_images_with_inadequate_lighting {
        return None;
    }
    match r.lighting {
        LightingStatus::TooDark => Some(UiStateKey::TooDark),
        LightingStatus::TooBright => Some(UiStateKey::TooBright),
        _ => None,
    }
}

// Several distinct causes share one observable state
fn occlusion(r: &AnalysisResult, s: &ClassifierSettings) -> Option<UiStateKey> {
    let occluded = r.framing == FramingStatus::DocumentPartiallyVisible
        || r.occlusion.is_detected()
        || (s.skip_images_occluded_by_hand && r.hand.is_detected())
        || r.processing_status.needs_repositioning();
    occluded.then_some(UiStateKey::Occluded)
}

fn blur(r: &AnalysisResult, s: &ClassifierSettings) -> Option<UiStateKey> {
    (s.skip_images_with_blur && r.blur.is_detected()).then_some(UiStateKey::BlurDetected)
}

fn wrong_side(r: &AnalysisResult, _: &ClassifierSettings) -> Option<UiStateKey> {
    (r.processing_status == ProcessingStatus::ScanningWrongSide).then_some(UiStateKey::WrongSide)
}

fn barcode(r: &AnalysisResult, _: &ClassifierSettings) -> Option<UiStateKey> {
    (r.scanning_status == ScanningStatus::ScanningBarcodeInProgress)
        .then_some(UiStateKey::BarcodeScanInProgress)
}

fn sensing_side(r: &AnalysisResult, _: &ClassifierSettings) -> Option<UiStateKey> {
    if r.scanning_status != ScanningStatus::ScanningSideInProgress {
        return None;
    }
    Some(match r.scanning_side {
        ScanningSide::First => UiStateKey::SensingFront,
        ScanningSide::Second => UiStateKey::SensingBack,
    })
}

// Order is business priority. First match wins.
const RULES: &[Rule] = &[
    Rule { name: "document_scanned", eval: document_scanned },
    Rule { name: "unsupported", eval: unsupported },
    Rule { name: "side_scanned", eval: side_scanned },
    Rule { name: "framing", eval: framing },
    Rule { name: "glare", eval: glare },
    Rule { name: "lighting", eval: lighting },
    Rule { name: "occlusion", eval: occlusion },
    Rule { name: "blur", eval: blur },
    Rule { name: "wrong_side", eval: wrong_side },
    Rule { name: "barcode", eval: barcode },
    Rule { name: "sensing_side", eval: sensing_side },
];

/// Map one analysis result to exactly one UI state key.
///
/// Total and deterministic: when no rule matches the front sensing key is
/// returned.
pub fn classify(result: &AnalysisResult, settings: &ClassifierSettings) -> UiStateKey {
    RULES
        .iter()
        .find_map(|rule| (rule.eval)(result, settings))
        .unwrap_or(UiStateKey::SensingFront)
}

/// Name of the rule that decided `result`, for diagnostics
pub fn matching_rule(result: &AnalysisResult, settings: &ClassifierSettings) -> &'static str {
    RULES
        .iter()
        .find(|rule| (rule.eval)(result, settings).is_some())
        .map(|rule| rule.name)
        .unwrap_or("fallback")
}
