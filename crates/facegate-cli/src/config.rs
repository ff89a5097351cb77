use facegate_core::ScanPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the FaceNet-512 ONNX model.
    pub model_path: PathBuf,
    /// Path to the SQLite gallery database.
    pub db_path: PathBuf,
    /// Cosine similarity a match must strictly exceed.
    pub similarity_threshold: f32,
    /// Bound on a single inference call; `0` disables the timeout.
    pub inference_timeout_secs: u64,
    /// ONNX Runtime intra-op threads.
    pub intra_threads: usize,
    pub scan_policy: ScanPolicy,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACEGATE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facegate_core::default_model_dir());

        let model_path = std::env::var("FACEGATE_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| model_dir.join(facegate_core::MODEL_FILE_NAME));

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegate");

        let db_path = std::env::var("FACEGATE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("gallery.db"));

        let scan_policy = match std::env::var("FACEGATE_SCAN_POLICY") {
            Ok(raw) => raw.parse().unwrap_or_else(|err| {
                tracing::warn!(%err, "falling back to strict scan policy");
                ScanPolicy::Strict
            }),
            Err(_) => ScanPolicy::Strict,
        };

        Self {
            model_path,
            db_path,
            similarity_threshold: env_parse(
                "FACEGATE_SIMILARITY_THRESHOLD",
                facegate_core::DEFAULT_THRESHOLD,
            ),
            inference_timeout_secs: env_parse("FACEGATE_INFERENCE_TIMEOUT_SECS", 10),
            intra_threads: env_parse("FACEGATE_INTRA_THREADS", 2),
            scan_policy,
        }
    }

    pub fn inference_timeout(&self) -> Option<Duration> {
        (self.inference_timeout_secs > 0).then(|| Duration::from_secs(self.inference_timeout_secs))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
