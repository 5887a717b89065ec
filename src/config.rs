use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub noise: NoiseConfig,
    pub text: TextConfig,
    pub stt: SttConfig,
    pub store: StoreConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    /// Samples per capture block.
    pub block_size: usize,
    /// Frame queue capacity between capture and the pipeline.
    pub queue_capacity: usize,
}

/// Voice-activity gate configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VadConfig {
    pub enabled: bool,
    /// 0 (permissive) to 3 (aggressive silence rejection).
    pub aggressiveness: u8,
}

/// Noise reduction configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NoiseConfig {
    pub enabled: bool,
    /// Fraction of the calibrated noise magnitude to subtract (0.0–1.0).
    pub strength: f32,
    /// Leading frames used to build the noise profile.
    pub calibration_frames: usize,
}

/// Text post-processing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextConfig {
    pub punctuation: bool,
    pub emergency_detection: bool,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub model_path: PathBuf,
}

/// Transcript store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            block_size: defaults::BLOCK_SIZE,
            queue_capacity: defaults::QUEUE_CAPACITY,
        }
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            aggressiveness: defaults::VAD_AGGRESSIVENESS,
        }
    }
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: defaults::SUPPRESSION_STRENGTH,
            calibration_frames: defaults::CALIBRATION_FRAMES,
        }
    }
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            punctuation: true,
            emergency_detection: true,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(defaults::MODEL_DIR),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(defaults::STORE_FILE),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't
    /// exist. Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - ECOUTE_MODEL → stt.model_path
    /// - ECOUTE_AUDIO_DEVICE → audio.device
    /// - ECOUTE_STORE → store.path
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("ECOUTE_MODEL")
            && !model.is_empty()
        {
            self.stt.model_path = PathBuf::from(model);
        }

        if let Ok(device) = std::env::var("ECOUTE_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(store) = std::env::var("ECOUTE_STORE")
            && !store.is_empty()
        {
            self.store.path = PathBuf::from(store);
        }

        self
    }

    /// Write the configuration back to a TOML file, creating parent
    /// directories as needed.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/ecoute/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ecoute")
            .join("config.toml")
    }
}

/// Plain snapshot of the four runtime feature switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggles {
    pub vad: bool,
    pub noise_reduction: bool,
    pub punctuation: bool,
    pub emergency_detection: bool,
}

/// Shared handle to the runtime feature switches.
///
/// A control surface (CLI, future API) writes individual flags; the pipeline
/// worker copies a [`Toggles`] snapshot once per frame. Reads and writes are
/// not linearized — a write may take effect one frame late, which is
/// acceptable for these switches.
#[derive(Debug, Default)]
pub struct SharedToggles {
    vad: AtomicBool,
    noise_reduction: AtomicBool,
    punctuation: AtomicBool,
    emergency_detection: AtomicBool,
}

impl SharedToggles {
    /// Build from the static configuration, wrapped for sharing.
    pub fn from_config(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            vad: AtomicBool::new(config.vad.enabled),
            noise_reduction: AtomicBool::new(config.noise.enabled),
            punctuation: AtomicBool::new(config.text.punctuation),
            emergency_detection: AtomicBool::new(config.text.emergency_detection),
        })
    }

    /// Copy the current switch values.
    pub fn snapshot(&self) -> Toggles {
        Toggles {
            vad: self.vad.load(Ordering::Relaxed),
            noise_reduction: self.noise_reduction.load(Ordering::Relaxed),
            punctuation: self.punctuation.load(Ordering::Relaxed),
            emergency_detection: self.emergency_detection.load(Ordering::Relaxed),
        }
    }

    pub fn set_vad(&self, enabled: bool) {
        self.vad.store(enabled, Ordering::Relaxed);
    }

    pub fn set_noise_reduction(&self, enabled: bool) {
        self.noise_reduction.store(enabled, Ordering::Relaxed);
    }

    pub fn set_punctuation(&self, enabled: bool) {
        self.punctuation.store(enabled, Ordering::Relaxed);
    }

    pub fn set_emergency_detection(&self, enabled: bool) {
        self.emergency_detection.store(enabled, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_ecoute_env() {
        remove_env("ECOUTE_MODEL");
        remove_env("ECOUTE_AUDIO_DEVICE");
        remove_env("ECOUTE_STORE");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.block_size, 8000);
        assert_eq!(config.audio.queue_capacity, 10);

        assert!(config.vad.enabled);
        assert_eq!(config.vad.aggressiveness, 2);

        assert!(config.noise.enabled);
        assert_eq!(config.noise.strength, 0.8);
        assert_eq!(config.noise.calibration_frames, 10);

        assert!(config.text.punctuation);
        assert!(config.text.emergency_detection);

        assert_eq!(
            config.stt.model_path,
            PathBuf::from("models/vosk-model-small-fr-0.22")
        );
        assert_eq!(config.store.path, PathBuf::from("transcriptions.db"));
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [audio]
            device = "hw:0,0"
            sample_rate = 16000
            block_size = 4000
            queue_capacity = 20

            [vad]
            enabled = false
            aggressiveness = 3

            [noise]
            strength = 0.5

            [stt]
            model_path = "/opt/models/fr"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.audio.device, Some("hw:0,0".to_string()));
        assert_eq!(config.audio.block_size, 4000);
        assert_eq!(config.audio.queue_capacity, 20);
        assert!(!config.vad.enabled);
        assert_eq!(config.vad.aggressiveness, 3);
        assert_eq!(config.noise.strength, 0.5);
        assert_eq!(config.stt.model_path, PathBuf::from("/opt/models/fr"));
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [text]
            punctuation = false
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert!(!config.text.punctuation);
        assert!(config.text.emergency_detection);
        assert_eq!(config.audio.sample_rate, 16000);
        assert!(config.vad.enabled);
    }

    #[test]
    fn test_env_override_model() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_ecoute_env();

        set_env("ECOUTE_MODEL", "/srv/models/fr-large");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.stt.model_path, PathBuf::from("/srv/models/fr-large"));

        clear_ecoute_env();
    }

    #[test]
    fn test_env_override_device_and_store() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_ecoute_env();

        set_env("ECOUTE_AUDIO_DEVICE", "pulse");
        set_env("ECOUTE_STORE", "/var/lib/ecoute/history.db");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.audio.device, Some("pulse".to_string()));
        assert_eq!(config.store.path, PathBuf::from("/var/lib/ecoute/history.db"));

        clear_ecoute_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_ecoute_env();

        set_env("ECOUTE_MODEL", "");
        let config = Config::default().with_env_overrides();

        assert_eq!(
            config.stt.model_path,
            PathBuf::from("models/vosk-model-small-fr-0.22")
        );

        clear_ecoute_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [audio
            device = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());

        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_ecoute_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_errors_on_invalid_toml() {
        let invalid_toml = r#"
            [audio
            device = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.vad.aggressiveness = 3;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_toggles_snapshot_reflects_config() {
        let mut config = Config::default();
        config.vad.enabled = false;
        config.text.punctuation = false;

        let toggles = SharedToggles::from_config(&config);
        let snap = toggles.snapshot();

        assert!(!snap.vad);
        assert!(snap.noise_reduction);
        assert!(!snap.punctuation);
        assert!(snap.emergency_detection);
    }

    #[test]
    fn test_toggles_writes_visible_in_next_snapshot() {
        let toggles = SharedToggles::from_config(&Config::default());

        toggles.set_noise_reduction(false);
        toggles.set_emergency_detection(false);

        let snap = toggles.snapshot();
        assert!(!snap.noise_reduction);
        assert!(!snap.emergency_detection);
        assert!(snap.vad);
    }
}
