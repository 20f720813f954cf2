use super::{AnalysisResult, FinalResult, ProcessOutcome, RecognitionEngine, ScanningStatus};
use crate::error::{DocscanError, EngineError, Result};
use crate::frame::ImageData;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, trace};

/// One line of a replay file: an analysis result plus any fields the
/// document would yield once fully scanned.
#[derive(Debug, Clone, Deserialize)]
struct ReplayEntry {
    #[serde(flatten)]
    result: AnalysisResult,
    #[serde(default)]
    fields: BTreeMap<String, String>,
}

struct ReplayState {
    cursor: usize,
    fields: BTreeMap<String, String>,
    scanned: Option<FinalResult>,
}

/// Recognition engine that replays a scripted sequence of analysis results.
///
/// Each `process` call returns the next entry; once the script is exhausted
/// the last entry repeats. The transferred image is always handed back.
pub struct ReplayEngine {
    entries: Vec<ReplayEntry>,
    latency: Duration,
    state: Mutex<ReplayState>,
}

impl ReplayEngine {
    /// Create an engine from in-memory results
    pub fn new(results: Vec<AnalysisResult>) -> Self {
        let entries = results
            .into_iter()
            .map(|result| ReplayEntry {
                result,
                fields: BTreeMap::new(),
            })
            .collect();
        Self::from_entries(entries)
    }

    fn from_entries(entries: Vec<ReplayEntry>) -> Self {
        Self {
            entries,
            latency: Duration::ZERO,
            state: Mutex::new(ReplayState {
                cursor: 0,
                fields: BTreeMap::new(),
                scanned: None,
            }),
        }
    }

    /// Simulate per-frame processing time
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Parse newline-delimited JSON. Blank lines and `#` comments are skipped.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            entries.push(serde_json::from_str::<ReplayEntry>(trimmed)?);
        }

        if entries.is_empty() {
            return Err(DocscanError::component("replay_engine", "Replay script is empty"));
        }

        info!("Loaded replay script with {} entries", entries.len());
        Ok(Self::from_entries(entries))
    }

    /// Load a replay script from a `.jsonl` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        debug!("Reading replay script from {}", path.as_ref().display());
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RecognitionEngine for ReplayEngine {
    async fn process(&self, image: ImageData) -> std::result::Result<ProcessOutcome, EngineError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.state.lock();
        let index = state.cursor.min(self.entries.len().saturating_sub(1));
        let entry = self.entries.get(index).ok_or_else(|| EngineError::Processing {
            details: "replay script is empty".to_string(),
        })?;
        state.cursor = state.cursor.saturating_add(1);

        state
            .fields
            .extend(entry.fields.iter().map(|(k, v)| (k.clone(), v.clone())));

        if entry.result.scanning_status == ScanningStatus::DocumentScanned && state.scanned.is_none() {
            state.scanned = Some(FinalResult {
                document_class: entry.result.document_class.clone(),
                fields: state.fields.clone(),
            });
        }

        trace!(
            "Replayed entry {} for {}x{} frame: {:?}",
            index,
            image.width,
            image.height,
            entry.result.scanning_status
        );

        Ok(ProcessOutcome {
            result: entry.result.clone(),
            image: Some(image),
        })
    }

    async fn get_result(&self) -> std::result::Result<FinalResult, EngineError> {
        self.state
            .lock()
            .scanned
            .clone()
            .ok_or(EngineError::ResultNotReady)
    }

    async fn reset(&self) -> std::result::Result<(), EngineError> {
        let mut state = self.state.lock();
        state.cursor = 0;
        state.fields.clear();
        state.scanned = None;
        debug!("Replay engine reset");
        Ok(())
    }
}
