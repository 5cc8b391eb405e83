use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Leafdoc";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default Gemini endpoint and model used for crop identification and narration.
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Default local Ollama instance and vision model.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llava";

/// Per-call timeout for remote vision requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Get the application data directory
/// ~/Leafdoc/ on all platforms. Falls back to the working directory
/// when no home directory can be determined (containers, CI).
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the models directory (ONNX classifier, etc.)
pub fn models_dir() -> PathBuf {
    app_data_dir().join("models")
}

/// Get the crop disease classifier directory (`model.onnx` + `config.json`)
pub fn classifier_model_dir() -> PathBuf {
    models_dir().join("crop-disease-vit")
}

/// Directory where camera captures are written.
pub fn captures_dir() -> PathBuf {
    app_data_dir().join("captures")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "info,leafdoc=debug"
    } else {
        "warn,leafdoc=info"
    }
}

/// Which remote vision-language service answers crop and disease prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisionBackend {
    Gemini {
        base_url: String,
        api_key: String,
        model: String,
    },
    Ollama {
        base_url: String,
        model: String,
    },
}

impl VisionBackend {
    pub fn model(&self) -> &str {
        match self {
            Self::Gemini { model, .. } | Self::Ollama { model, .. } => model,
        }
    }
}

/// Configuration for one `PlantAnalyzer`.
///
/// Built once at startup and passed to constructors. Nothing in the
/// pipeline reads process-wide settings on its own.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub backend: VisionBackend,
    pub classifier_dir: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY is not set; export it or select LEAFDOC_VISION_BACKEND=ollama")]
    MissingApiKey,

    #[error("Unknown vision backend '{0}' (expected 'gemini' or 'ollama')")]
    UnknownBackend(String),

    #[error("Invalid timeout '{0}': expected whole seconds")]
    InvalidTimeout(String),
}

impl AnalyzerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Recognised keys: `LEAFDOC_VISION_BACKEND`, `GEMINI_API_KEY`,
    /// `LEAFDOC_GEMINI_URL`, `LEAFDOC_GEMINI_MODEL`, `LEAFDOC_OLLAMA_URL`,
    /// `LEAFDOC_OLLAMA_MODEL`, `LEAFDOC_CLASSIFIER_DIR`, `LEAFDOC_TIMEOUT_SECS`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend_name = non_empty("LEAFDOC_VISION_BACKEND")
            .unwrap_or_else(|| "gemini".to_string())
            .to_lowercase();

        let backend = match backend_name.as_str() {
            "gemini" => VisionBackend::Gemini {
                base_url: non_empty("LEAFDOC_GEMINI_URL")
                    .unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string()),
                api_key: non_empty("GEMINI_API_KEY").ok_or(ConfigError::MissingApiKey)?,
                model: non_empty("LEAFDOC_GEMINI_MODEL")
                    .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            },
            "ollama" => VisionBackend::Ollama {
                base_url: non_empty("LEAFDOC_OLLAMA_URL")
                    .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
                model: non_empty("LEAFDOC_OLLAMA_MODEL")
                    .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            },
            other => return Err(ConfigError::UnknownBackend(other.to_string())),
        };

        let classifier_dir = non_empty("LEAFDOC_CLASSIFIER_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(classifier_model_dir);

        let timeout_secs = match non_empty("LEAFDOC_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout(raw))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            backend,
            classifier_dir,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}
