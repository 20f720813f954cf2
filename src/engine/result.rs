use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Overall outcome the engine reports for one processed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingStatus {
    #[default]
    Success,
    DetectionFailed,
    ImagePreprocessingFailed,
    StabilityTestFailed,
    ScanningWrongSide,
    FieldIdentificationFailed,
    MandatoryFieldMissing,
    InvalidCharactersFound,
    ImageReturnFailed,
    BarcodeRecognitionFailed,
    MrzParsingFailed,
    DocumentFiltered,
    UnsupportedDocument,
    AwaitingOtherSide,
    NotScanned,
}

impl ProcessingStatus {
    /// The document was rejected outright
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::UnsupportedDocument | ProcessingStatus::DocumentFiltered
        )
    }

    /// Statuses the user fixes by repositioning the document
    pub fn needs_repositioning(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::MandatoryFieldMissing
                | ProcessingStatus::FieldIdentificationFailed
                | ProcessingStatus::InvalidCharactersFound
                | ProcessingStatus::ImageReturnFailed
        )
    }
}

/// Document detection and framing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FramingStatus {
    #[default]
    Failed,
    Success,
    CameraTooFar,
    CameraTooClose,
    CameraAngleTooSteep,
    DocumentTooCloseToCameraEdge,
    DocumentPartiallyVisible,
}

/// Result of a single boolean detector (blur, glare, occlusion, hand)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionState {
    #[default]
    NotAvailable,
    NotDetected,
    Detected,
}

impl DetectionState {
    pub fn is_detected(&self) -> bool {
        matches!(self, DetectionState::Detected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LightingStatus {
    #[default]
    NotAvailable,
    Normal,
    TooDark,
    TooBright,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanningSide {
    #[default]
    First,
    Second,
}

/// Progress of the multi-side scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanningStatus {
    #[default]
    NotStarted,
    ScanningSideInProgress,
    ScanningBarcodeInProgress,
    SideScanned,
    DocumentScanned,
}

/// Classification of the document the engine believes it is looking at
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentClassInfo {
    pub country: Option<String>,
    pub region: Option<String>,
    pub document_type: Option<String>,
}

impl DocumentClassInfo {
    /// Country and type are both known, so a class filter can be applied
    pub fn is_fully_known(&self) -> bool {
        self.country.is_some() && self.document_type.is_some()
    }
}

/// Per-frame output of the recognition engine. Missing fields in serialized
/// form take their defaults so replay files can stay terse.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisResult {
    pub processing_status: ProcessingStatus,
    pub framing: FramingStatus,
    pub blur: DetectionState,
    pub glare: DetectionState,
    pub occlusion: DetectionState,
    pub hand: DetectionState,
    pub lighting: LightingStatus,
    pub scanning_side: ScanningSide,
    pub document_class: DocumentClassInfo,
    pub scanning_status: ScanningStatus,
}

/// Final extraction result, available once the document is fully scanned
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FinalResult {
    pub document_class: DocumentClassInfo,
    pub fields: BTreeMap<String, String>,
}
