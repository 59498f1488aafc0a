use likeness_core::EngineOptions;
use likeness_remote::RemoteConfig;
use std::path::PathBuf;
use std::time::Duration;

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one `<label>.jpg` per enrolled identity.
    pub gallery_dir: PathBuf,
    /// Base URL of the DeepFace-compatible face service.
    pub service_url: String,
    /// Recognition model the service verifies with.
    pub model_name: String,
    /// Face detector backend the service uses.
    pub detector_backend: String,
    /// Keep going when the service finds no face instead of failing.
    pub tolerant: bool,
    /// Per-request timeout for the face service.
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration from `LIKENESS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("likeness");

        let defaults = RemoteConfig::default();

        Self {
            gallery_dir: lookup("LIKENESS_GALLERY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("gallery")),
            service_url: lookup("LIKENESS_SERVICE_URL").unwrap_or(defaults.base_url),
            model_name: lookup("LIKENESS_MODEL_NAME").unwrap_or(defaults.model_name),
            detector_backend: lookup("LIKENESS_DETECTOR_BACKEND")
                .unwrap_or(defaults.detector_backend),
            tolerant: lookup("LIKENESS_TOLERANT").map(|v| v != "0").unwrap_or(true),
            timeout_secs: parse_or(lookup("LIKENESS_TIMEOUT_SECS"), defaults.timeout.as_secs()),
        }
    }

    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            base_url: self.service_url.clone(),
            model_name: self.model_name.clone(),
            detector_backend: self.detector_backend.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            tolerant: self.tolerant,
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
