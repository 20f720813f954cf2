use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Guidance states shown to the user while scanning a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UiStateKey {
    SensingFront,
    SensingBack,
    DocumentTooClose,
    DocumentTooFar,
    CameraAngleTooSteep,
    DocumentTooCloseToFrameEdge,
    GlareDetected,
    TooDark,
    TooBright,
    Occluded,
    BlurDetected,
    WrongSide,
    BarcodeScanInProgress,
    SideCaptured,
    DocumentCaptured,
    UnsupportedDocument,
}

impl UiStateKey {
    pub const ALL: [UiStateKey; 16] = [
        UiStateKey::SensingFront,
        UiStateKey::SensingBack,
        UiStateKey::DocumentTooClose,
        UiStateKey::DocumentTooFar,
        UiStateKey::CameraAngleTooSteep,
        UiStateKey::DocumentTooCloseToFrameEdge,
        UiStateKey::GlareDetected,
        UiStateKey::TooDark,
        UiStateKey::TooBright,
        UiStateKey::Occluded,
        UiStateKey::BlurDetected,
        UiStateKey::WrongSide,
        UiStateKey::BarcodeScanInProgress,
        UiStateKey::SideCaptured,
        UiStateKey::DocumentCaptured,
        UiStateKey::UnsupportedDocument,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UiStateKey::SensingFront => "SENSING_FRONT",
            UiStateKey::SensingBack => "SENSING_BACK",
            UiStateKey::DocumentTooClose => "DOCUMENT_TOO_CLOSE",
            UiStateKey::DocumentTooFar => "DOCUMENT_TOO_FAR",
            UiStateKey::CameraAngleTooSteep => "CAMERA_ANGLE_TOO_STEEP",
            UiStateKey::DocumentTooCloseToFrameEdge => "DOCUMENT_TOO_CLOSE_TO_FRAME_EDGE",
            UiStateKey::GlareDetected => "GLARE_DETECTED",
            UiStateKey::TooDark => "TOO_DARK",
            UiStateKey::TooBright => "TOO_BRIGHT",
            UiStateKey::Occluded => "OCCLUDED",
            UiStateKey::BlurDetected => "BLUR_DETECTED",
            UiStateKey::WrongSide => "WRONG_SIDE",
            UiStateKey::BarcodeScanInProgress => "BARCODE_SCAN_IN_PROGRESS",
            UiStateKey::SideCaptured => "SIDE_CAPTURED",
            UiStateKey::DocumentCaptured => "DOCUMENT_CAPTURED",
            UiStateKey::UnsupportedDocument => "UNSUPPORTED_DOCUMENT",
        }
    }

    /// States after which frame capture pauses for a transition
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            UiStateKey::SideCaptured | UiStateKey::DocumentCaptured | UiStateKey::UnsupportedDocument
        )
    }
}

impl fmt::Display for UiStateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static presentation rules for one UI state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UiStateDescriptor<K> {
    pub key: K,
    /// Minimum time the state stays on screen once shown
    pub min_duration_ms: u64,
    /// One-shot state: shown exactly once, bypassing scoring
    #[serde(default)]
    pub single_emit: bool,
    /// Starting weight of events for this state (defaults to 1.0)
    #[serde(default)]
    pub initial_weight: Option<f64>,
}

impl<K> UiStateDescriptor<K> {
    pub fn new(key: K, min_duration_ms: u64) -> Self {
        Self {
            key,
            min_duration_ms,
            single_emit: false,
            initial_weight: None,
        }
    }

    pub fn single_emit(mut self) -> Self {
        self.single_emit = true;
        self
    }

    pub fn with_initial_weight(mut self, weight: f64) -> Self {
        self.initial_weight = Some(weight);
        self
    }

    pub fn weight(&self) -> f64 {
        self.initial_weight.unwrap_or(1.0)
    }
}

/// Descriptors in declaration order. The order doubles as the stabilizer's
/// tie-break: on equal scores the key declared first wins.
#[derive(Debug, Clone)]
pub struct DescriptorMap<K> {
    descriptors: Vec<UiStateDescriptor<K>>,
    index: HashMap<K, usize>,
}

impl<K: Copy + Eq + Hash> DescriptorMap<K> {
    /// Later duplicates of a key replace the earlier descriptor but keep its position
    pub fn new(descriptors: Vec<UiStateDescriptor<K>>) -> Self {
        let mut ordered: Vec<UiStateDescriptor<K>> = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            match index.get(&descriptor.key) {
                Some(&position) => ordered[position] = descriptor,
                None => {
                    index.insert(descriptor.key, ordered.len());
                    ordered.push(descriptor);
                }
            }
        }
        Self {
            descriptors: ordered,
            index,
        }
    }

    pub fn get(&self, key: &K) -> Option<&UiStateDescriptor<K>> {
        self.index.get(key).map(|&i| &self.descriptors[i])
    }

    /// Declaration position of `key`
    pub fn position(&self, key: &K) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UiStateDescriptor<K>> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Descriptor map for the document scanning flow
pub fn default_descriptors() -> DescriptorMap<UiStateKey> {
    use UiStateKey::*;

    DescriptorMap::new(vec![
        UiStateDescriptor::new(SensingFront, 1000),
        UiStateDescriptor::new(SensingBack, 1000),
        UiStateDescriptor::new(DocumentTooClose, 1500),
        UiStateDescriptor::new(DocumentTooFar, 1500),
        UiStateDescriptor::new(CameraAngleTooSteep, 1500),
        UiStateDescriptor::new(DocumentTooCloseToFrameEdge, 1500),
        UiStateDescriptor::new(GlareDetected, 1500),
        UiStateDescriptor::new(TooDark, 1500),
        UiStateDescriptor::new(TooBright, 1500),
        UiStateDescriptor::new(Occluded, 1500),
        UiStateDescriptor::new(BlurDetected, 1500),
        UiStateDescriptor::new(WrongSide, 1500),
        UiStateDescriptor::new(BarcodeScanInProgress, 1500),
        UiStateDescriptor::new(SideCaptured, 2000).single_emit(),
        UiStateDescriptor::new(DocumentCaptured, 3000).single_emit(),
        UiStateDescriptor::new(UnsupportedDocument, 3000).single_emit(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_descriptors_cover_every_key() {
        let map = default_descriptors();
        assert_eq!(map.len(), UiStateKey::ALL.len());
        for key in UiStateKey::ALL {
            assert!(map.contains(&key), "missing descriptor for {}", key);
        }
        assert!(map.get(&UiStateKey::DocumentCaptured).unwrap().single_emit);
        assert!(!map.get(&UiStateKey::BlurDetected).unwrap().single_emit);
    }

    #[test]
    fn test_duplicate_keeps_first_position() {
        let map = DescriptorMap::new(vec![
            UiStateDescriptor::new("a", 100),
            UiStateDescriptor::new("b", 100),
            UiStateDescriptor::new("a", 500),
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(map.position(&"a"), Some(0));
        assert_eq!(map.get(&"a").unwrap().min_duration_ms, 500);
    }

    #[test]
    fn test_key_serialization() {
        let json = serde_json::to_string(&UiStateKey::DocumentTooCloseToFrameEdge).unwrap();
        assert_eq!(json, "\"DOCUMENT_TOO_CLOSE_TO_FRAME_EDGE\"");
        assert_eq!(UiStateKey::SideCaptured.to_string(), "SIDE_CAPTURED");
    }

    #[test]
    fn test_descriptor_weight_default() {
        let d = UiStateDescriptor::new(UiStateKey::Occluded, 10);
        assert_eq!(d.weight(), 1.0);
        assert_eq!(d.with_initial_weight(2.5).weight(), 2.5);
    }
}
