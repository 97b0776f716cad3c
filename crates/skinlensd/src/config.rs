use serde::Deserialize;
use skinlens_core::{CascadeParams, DecisionPolicy, FacePolicy, LoadOptions};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MODEL_FILE: &str = "skin_model.onnx";
const DEFAULT_CASCADE_FILE: &str = "seeta_fd_frontal_v1.0.bin";
const DEFAULT_STATIC_DIR: &str = "frontend";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_INTRA_THREADS: usize = 2;

/// Daemon configuration: optional TOML file, then `SKINLENS_*` environment overrides.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:8000).
    pub bind: SocketAddr,
    /// Directory containing the ONNX classifier and the cascade model.
    pub model_dir: PathBuf,
    pub model_file: String,
    pub cascade_file: String,
    /// Directory served under `/static`; `index.html` there backs `GET /`.
    pub static_dir: PathBuf,
    pub face_policy: FacePolicy,
    pub cascade: CascadeParams,
    pub decision: DecisionPolicy,
    /// Largest accepted request body.
    pub max_upload_bytes: usize,
    /// ONNX Runtime intra-op threads.
    pub intra_threads: usize,
}

/// Shape of the TOML file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    bind: Option<SocketAddr>,
    model_dir: Option<PathBuf>,
    model_file: Option<String>,
    cascade_file: Option<String>,
    static_dir: Option<PathBuf>,
    face_policy: Option<FacePolicy>,
    confidence_floor: Option<f32>,
    advisory_low: Option<f32>,
    advisory_high: Option<f32>,
    max_upload_bytes: Option<usize>,
    intra_threads: Option<usize>,
    cascade: Option<CascadeParams>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid {key}={value:?}: {reason}")]
    Env { key: &'static str, value: String, reason: String },
    #[error("advisory band is empty: low {low} > high {high}")]
    AdvisoryBand { low: f32, high: f32 },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            model_dir: skinlens_core::default_model_dir(),
            model_file: DEFAULT_MODEL_FILE.to_string(),
            cascade_file: DEFAULT_CASCADE_FILE.to_string(),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            face_policy: FacePolicy::default(),
            cascade: CascadeParams::default(),
            decision: DecisionPolicy::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            intra_threads: DEFAULT_INTRA_THREADS,
        }
    }
}

impl Config {
    /// Load from `SKINLENS_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("SKINLENS_CONFIG") {
            config.apply_file(Path::new(&path))?;
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        self.apply_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn apply_toml(&mut self, text: &str) -> Result<(), toml::de::Error> {
        let file: FileConfig = toml::from_str(text)?;
        if let Some(v) = file.bind {
            self.bind = v;
        }
        if let Some(v) = file.model_dir {
            self.model_dir = v;
        }
        if let Some(v) = file.model_file {
            self.model_file = v;
        }
        if let Some(v) = file.cascade_file {
            self.cascade_file = v;
        }
        if let Some(v) = file.static_dir {
            self.static_dir = v;
        }
        if let Some(v) = file.face_policy {
            self.face_policy = v;
        }
        if let Some(v) = file.confidence_floor {
            self.decision.confidence_floor = v;
        }
        if let Some(v) = file.advisory_low {
            self.decision.advisory_low = v;
        }
        if let Some(v) = file.advisory_high {
            self.decision.advisory_high = v;
        }
        if let Some(v) = file.max_upload_bytes {
            self.max_upload_bytes = v;
        }
        if let Some(v) = file.intra_threads {
            self.intra_threads = v;
        }
        if let Some(v) = file.cascade {
            self.cascade = v;
        }
        Ok(())
    }

    /// Apply `SKINLENS_*` overrides read through `get`.
    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = env_parse(&get, "SKINLENS_BIND")? {
            self.bind = v;
        }
        if let Some(v) = get("SKINLENS_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = get("SKINLENS_MODEL_FILE") {
            self.model_file = v;
        }
        if let Some(v) = get("SKINLENS_CASCADE_FILE") {
            self.cascade_file = v;
        }
        if let Some(v) = get("SKINLENS_STATIC_DIR") {
            self.static_dir = PathBuf::from(v);
        }
        if let Some(v) = env_parse(&get, "SKINLENS_FACE_POLICY")? {
            self.face_policy = v;
        }
        if let Some(v) = env_parse(&get, "SKINLENS_CONFIDENCE_FLOOR")? {
            self.decision.confidence_floor = v;
        }
        if let Some(v) = env_parse(&get, "SKINLENS_ADVISORY_LOW")? {
            self.decision.advisory_low = v;
        }
        if let Some(v) = env_parse(&get, "SKINLENS_ADVISORY_HIGH")? {
            self.decision.advisory_high = v;
        }
        if let Some(v) = env_parse(&get, "SKINLENS_MAX_UPLOAD_BYTES")? {
            self.max_upload_bytes = v;
        }
        if let Some(v) = env_parse(&get, "SKINLENS_INTRA_THREADS")? {
            self.intra_threads = v;
        }
        if let Some(v) = env_parse(&get, "SKINLENS_SCALE_FACTOR")? {
            self.cascade.scale_factor = v;
        }
        if let Some(v) = env_parse(&get, "SKINLENS_MIN_NEIGHBORS")? {
            self.cascade.min_neighbors = v;
        }
        if let Some(v) = env_parse(&get, "SKINLENS_MIN_FACE_SIZE")? {
            self.cascade.min_size = v;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.decision;
        if d.advisory_low > d.advisory_high {
            return Err(ConfigError::AdvisoryBand {
                low: d.advisory_low,
                high: d.advisory_high,
            });
        }
        Ok(())
    }

    /// Path to the ONNX classifier.
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_file)
    }

    /// Path to the SeetaFace cascade model.
    pub fn cascade_path(&self) -> PathBuf {
        self.model_dir.join(&self.cascade_file)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            model_path: self.model_path(),
            cascade_path: self.cascade_path(),
            face_policy: self.face_policy,
            cascade: self.cascade,
            decision: self.decision,
            intra_threads: self.intra_threads,
        }
    }
}

fn env_parse<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Env { key, reason: e.to_string(), value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.bind.port(), 8000);
        assert_eq!(c.model_path(), PathBuf::from("model/skin_model.onnx"));
        assert_eq!(c.cascade_path(), PathBuf::from("model/seeta_fd_frontal_v1.0.bin"));
        assert_eq!(c.face_policy, FacePolicy::Fallback);
        assert_eq!(c.decision, DecisionPolicy::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut c = Config::default();
        c.apply_env(env(&[
            ("SKINLENS_BIND", "127.0.0.1:9090"),
            ("SKINLENS_MODEL_DIR", "/srv/models"),
            ("SKINLENS_FACE_POLICY", "require"),
            ("SKINLENS_CONFIDENCE_FLOOR", "0.3"),
            ("SKINLENS_MIN_FACE_SIZE", "80"),
        ]))
        .unwrap();
        assert_eq!(c.bind.port(), 9090);
        assert_eq!(c.model_path(), PathBuf::from("/srv/models/skin_model.onnx"));
        assert_eq!(c.face_policy, FacePolicy::Require);
        assert!((c.decision.confidence_floor - 0.3).abs() < 1e-6);
        assert_eq!(c.cascade.min_size, 80);
    }

    #[test]
    fn test_env_bad_value() {
        let mut c = Config::default();
        let err = c.apply_env(env(&[("SKINLENS_CONFIDENCE_FLOOR", "high")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { key: "SKINLENS_CONFIDENCE_FLOOR", .. }));
    }

    #[test]
    fn test_toml_then_env() {
        let mut c = Config::default();
        c.apply_toml(
            r#"
            model_dir = "/opt/skinlens"
            face_policy = "skip"
            advisory_high = 0.65

            [cascade]
            scale_factor = 1.2
            min_neighbors = 5
            min_size = 40
            "#,
        )
        .unwrap();
        c.apply_env(env(&[("SKINLENS_FACE_POLICY", "fallback")])).unwrap();

        assert_eq!(c.model_dir, PathBuf::from("/opt/skinlens"));
        assert_eq!(c.face_policy, FacePolicy::Fallback);
        assert!((c.decision.advisory_high - 0.65).abs() < 1e-6);
        assert_eq!(c.cascade.min_neighbors, 5);
    }

    #[test]
    fn test_toml_unknown_key_rejected() {
        let mut c = Config::default();
        assert!(c.apply_toml("modle_dir = \"typo\"").is_err());
    }

    #[test]
    fn test_validate_band() {
        let mut c = Config::default();
        c.decision.advisory_low = 0.7;
        c.decision.advisory_high = 0.5;
        assert!(matches!(c.validate(), Err(ConfigError::AdvisoryBand { .. })));
    }
}
