use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use image::imageops::FilterType;
use image::RgbImage;
use serde::Deserialize;

use super::types::{ClassifierProvider, LocalClassifier, RawPrediction};
use super::ClassifierError;
use crate::pipeline::source::LeafImage;

/// ViT input resolution.
pub const CLASSIFIER_INPUT_SIZE: u32 = 224;

/// ViT image-processor normalization (per channel).
const VIT_MEAN: f32 = 0.5;
const VIT_STD: f32 = 0.5;

pub const MODEL_FILE: &str = "model.onnx";
pub const LABEL_CONFIG_FILE: &str = "config.json";

// ═══════════════════════════════════════════════════════════
// ONNX classifier (feature `onnx-classifier`)
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx-classifier")]
mod onnx {
    use super::*;
    use ort::session::Session;
    use std::sync::Mutex;

    /// ViT crop-disease classifier running on ONNX Runtime.
    ///
    /// Requires two files in the model directory:
    /// - `model.onnx`: exported image classification model
    /// - `config.json`: HuggingFace config carrying `id2label`
    ///
    /// Uses interior mutability (Mutex) because ort::Session::run requires `&mut self`.
    pub struct OnnxCropClassifier {
        session: Mutex<Session>,
        labels: Vec<String>,
    }

    impl OnnxCropClassifier {
        pub fn load(model_dir: &Path) -> Result<Self, ClassifierError> {
            let model_path = model_dir.join(MODEL_FILE);
            let config_path = model_dir.join(LABEL_CONFIG_FILE);

            if !model_path.exists() {
                return Err(ClassifierError::ModelNotFound(model_path));
            }
            if !config_path.exists() {
                return Err(ClassifierError::ModelNotFound(config_path));
            }

            let labels = load_label_config(&config_path)?;

            let session = Session::builder()
                .map_err(|e: ort::Error| ClassifierError::ModelInit(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e: ort::Error| ClassifierError::ModelInit(e.to_string()))?
                .commit_from_file(&model_path)
                .map_err(|e: ort::Error| ClassifierError::ModelInit(format!("ONNX load failed: {e}")))?;

            tracing::info!(
                labels = labels.len(),
                "ONNX crop classifier loaded from {}",
                model_dir.display()
            );

            Ok(Self {
                session: Mutex::new(session),
                labels,
            })
        }

        fn infer(&self, image: &RgbImage) -> Result<Vec<f32>, ClassifierError> {
            use ort::value::TensorRef;

            let size = CLASSIFIER_INPUT_SIZE as usize;
            let input = ndarray::Array4::from_shape_vec((1, 3, size, size), pixel_values(image))
                .map_err(|e| ClassifierError::Inference(e.to_string()))?;
            let tensor = TensorRef::from_array_view(&input)
                .map_err(|e| ClassifierError::Inference(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| ClassifierError::Inference("Session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(|e| ClassifierError::Inference(format!("ONNX inference failed: {e}")))?;

            // Output shape: [1, num_labels]
            let (shape, logits) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| ClassifierError::Inference(format!("Output extraction: {e}")))?;

            if shape.len() != 2 || shape[0] != 1 {
                return Err(ClassifierError::Inference(format!(
                    "Unexpected output shape: {shape:?}, expected [1, num_labels]"
                )));
            }

            Ok(logits.to_vec())
        }
    }

    impl LocalClassifier for OnnxCropClassifier {
        fn classify(&self, image: &LeafImage) -> Result<RawPrediction, ClassifierError> {
            let _span = tracing::info_span!("classify_leaf").entered();
            let logits = self.infer(image.rgb())?;
            let index = argmax(&logits)
                .ok_or_else(|| ClassifierError::Inference("Empty logits".into()))?;

            let label = self
                .labels
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("Class {index}"));

            tracing::debug!(index, label = %label, "Classifier prediction");
            Ok(RawPrediction(label))
        }
    }
}

#[cfg(feature = "onnx-classifier")]
pub use onnx::OnnxCropClassifier;

// ═══════════════════════════════════════════════════════════
// Pure helper functions
// ═══════════════════════════════════════════════════════════

/// Resize to the model resolution and lay out as normalized NCHW floats.
pub fn pixel_values(image: &RgbImage) -> Vec<f32> {
    let size = CLASSIFIER_INPUT_SIZE;
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
    let plane = (size * size) as usize;

    let mut values = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = (y * size + x) as usize;
        for channel in 0..3 {
            values[channel * plane + offset] =
                (pixel[channel] as f32 / 255.0 - VIT_MEAN) / VIT_STD;
        }
    }
    values
}

/// Index of the largest logit. NaN never wins.
pub fn argmax(logits: &[f32]) -> Option<usize> {
    logits
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
}

#[derive(Debug, Deserialize)]
struct LabelConfig {
    id2label: HashMap<String, String>,
}

/// Parse `id2label` from a HuggingFace model config into index order.
pub fn parse_label_config(json: &str) -> Result<Vec<String>, ClassifierError> {
    let config: LabelConfig =
        serde_json::from_str(json).map_err(|e| ClassifierError::LabelConfig(e.to_string()))?;

    let mut labels = vec![None; config.id2label.len()];
    for (key, label) in config.id2label {
        let index: usize = key
            .parse()
            .map_err(|_| ClassifierError::LabelConfig(format!("Non-numeric label id '{key}'")))?;
        let slot = labels.get_mut(index).ok_or_else(|| {
            ClassifierError::LabelConfig(format!("Label id {index} out of range"))
        })?;
        *slot = Some(label);
    }

    labels
        .into_iter()
        .enumerate()
        .map(|(i, l)| l.ok_or_else(|| ClassifierError::LabelConfig(format!("Missing label id {i}"))))
        .collect()
}

pub fn load_label_config(path: &Path) -> Result<Vec<String>, ClassifierError> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| ClassifierError::LabelConfig(format!("{}: {e}", path.display())))?;
    parse_label_config(&json)
}

// ──── Providers ────

/// Loads the classifier from disk on first use and keeps it for the life
/// of the process. A failed load is cached too.
pub struct CachedClassifierProvider {
    model_dir: PathBuf,
    loaded: OnceLock<Option<Arc<dyn LocalClassifier>>>,
}

impl CachedClassifierProvider {
    pub fn new(model_dir: PathBuf) -> Self {
        Self {
            model_dir,
            loaded: OnceLock::new(),
        }
    }
}

impl ClassifierProvider for CachedClassifierProvider {
    fn acquire(&self) -> Option<Arc<dyn LocalClassifier>> {
        self.loaded
            .get_or_init(|| load_classifier(&self.model_dir))
            .clone()
    }
}

#[cfg(feature = "onnx-classifier")]
fn load_classifier(model_dir: &Path) -> Option<Arc<dyn LocalClassifier>> {
    match OnnxCropClassifier::load(model_dir) {
        Ok(classifier) => Some(Arc::new(classifier)),
        Err(e) => {
            tracing::warn!(error = %e, "Local classifier unavailable");
            None
        }
    }
}

#[cfg(not(feature = "onnx-classifier"))]
fn load_classifier(model_dir: &Path) -> Option<Arc<dyn LocalClassifier>> {
    tracing::warn!(
        model_dir = %model_dir.display(),
        "Local classifier unavailable: built without the onnx-classifier feature"
    );
    None
}

/// Provider with a fixed answer. Used by tests and when the classifier is
/// switched off.
pub struct StaticClassifierProvider {
    classifier: Option<Arc<dyn LocalClassifier>>,
}

impl StaticClassifierProvider {
    pub fn available(classifier: Arc<dyn LocalClassifier>) -> Self {
        Self {
            classifier: Some(classifier),
        }
    }

    pub fn unavailable() -> Self {
        Self { classifier: None }
    }
}

impl ClassifierProvider for StaticClassifierProvider {
    fn acquire(&self) -> Option<Arc<dyn LocalClassifier>> {
        self.classifier.clone()
    }
}

/// Mock classifier for testing. Returns a fixed label and counts calls.
pub struct MockClassifier {
    reply: Result<String, String>,
    calls: AtomicUsize,
}

impl MockClassifier {
    pub fn new(label: &str) -> Self {
        Self {
            reply: Ok(label.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LocalClassifier for MockClassifier {
    fn classify(&self, _image: &LeafImage) -> Result<RawPrediction, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Ok(label) => Ok(RawPrediction(label.clone())),
            Err(message) => Err(ClassifierError::Inference(message.clone())),
        }
    }
}
