use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DETECTION_KIND: &str = "trash_detection";

#[derive(Debug, Clone, Serialize)]
pub struct ModelCatalogEntry {
    pub kind: String,
    pub versions: Vec<String>,
}

/// Lists the versions that carry a `metadata.json`, whether or not their
/// weights have been downloaded yet.
pub fn inspect_models_dir(base_dir: impl AsRef<Path>) -> Vec<ModelCatalogEntry> {
    let kind_dir = base_dir.as_ref().join(DETECTION_KIND);
    let mut versions: Vec<String> = fs::read_dir(&kind_dir)
        .map(|read| {
            read.flatten()
                .filter(|entry| entry.path().join("metadata.json").is_file())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    versions.sort();
    vec![ModelCatalogEntry { kind: DETECTION_KIND.to_string(), versions }]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputSpec {
    pub name: String,
    pub shape: Vec<i64>,
    pub layout: String,
    pub mean: Option<Vec<f32>>,
    pub std: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelMetadata {
    pub name: String,
    pub version: String,
    pub url: String,
    pub sha256: String,
    pub inputs: Vec<InputSpec>,
    pub license: String,
    #[serde(default)]
    pub accuracy: Option<f64>,
    /// Class names by class index; COCO when absent.
    #[serde(default)]
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSelection {
    pub kind: String,
    pub version: String,
    pub path: String,
    pub metadata: ModelMetadata,
}

const WEIGHT_FILES: [&str; 3] = ["model.onnx", "model.ort", "model"];

/// A version directory with readable metadata and a weights file.
struct Candidate {
    version: String,
    metadata: ModelMetadata,
    weights: PathBuf,
}

impl Candidate {
    fn from_dir(dir: &Path) -> Option<Self> {
        let raw = fs::read_to_string(dir.join("metadata.json")).ok()?;
        let metadata: ModelMetadata = serde_json::from_str(&raw).ok()?;
        let weights = WEIGHT_FILES.iter().map(|f| dir.join(f)).find(|p| p.is_file())?;
        let version = dir.file_name()?.to_string_lossy().into_owned();
        Some(Self { version, metadata, weights })
    }

    fn rank(&self, other: &Self) -> Ordering {
        let acc = |c: &Self| c.metadata.accuracy.unwrap_or(f64::NEG_INFINITY);
        acc(self)
            .total_cmp(&acc(other))
            .then_with(|| self.version.cmp(&other.version))
    }
}

/// Best detection model on disk: highest accuracy, then highest version.
pub fn select_best_model(base_dir: impl AsRef<Path>) -> Option<ModelSelection> {
    let kind_dir = base_dir.as_ref().join(DETECTION_KIND);
    let best = fs::read_dir(&kind_dir)
        .ok()?
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_dir()))
        .filter_map(|entry| Candidate::from_dir(&entry.path()))
        .max_by(|a, b| a.rank(b))?;
    Some(ModelSelection {
        kind: DETECTION_KIND.to_string(),
        version: best.version,
        path: best.weights.to_string_lossy().into_owned(),
        metadata: best.metadata,
    })
}
