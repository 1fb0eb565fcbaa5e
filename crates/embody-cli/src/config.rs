//! Configuration Vault – reads/writes `~/.embody/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use embody_runtime::{BehaviorConfig, NavigationConfig, VoiceConfig, WanderConfig};

/// Persisted user configuration stored in `~/.embody/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name the agent answers to; its own chat lines are ignored.
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// Base URL of the OpenAI-compatible model server.
    #[serde(default = "default_model_url")]
    pub model_url: String,

    /// Text generation model (e.g. "llama3", "gpt-4o").
    #[serde(default = "default_model")]
    pub active_model: String,

    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    #[serde(default = "default_speech_model")]
    pub speech_model: String,

    #[serde(default = "default_speech_voice")]
    pub speech_voice: String,

    /// Bearer token for the model server (stored as plain text; the file is
    /// written owner-only).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    /// Seconds after which a stuck activity lock is force-released.
    #[serde(default = "default_max_lock_secs")]
    pub max_lock_secs: u64,

    #[serde(default)]
    pub behavior: BehaviorSettings,

    #[serde(default)]
    pub navigation: NavigationSettings,

    #[serde(default)]
    pub voice: VoiceSettings,
}

/// `[behavior]` table: idle loop pacing and wander parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorSettings {
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    pub repeat_window: usize,
    pub wander_interval_ms: u64,
    pub wander_max_distance: f32,
    pub wander_duration_ms: u64,
}

impl Default for BehaviorSettings {
    fn default() -> Self {
        Self {
            min_interval_ms: 15_000,
            max_interval_ms: 30_000,
            repeat_window: 5,
            wander_interval_ms: 3_000,
            wander_max_distance: 5.0,
            wander_duration_ms: 20_000,
        }
    }
}

/// `[navigation]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationSettings {
    pub tick_ms: u64,
    pub stop_distance: f32,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            stop_distance: 1.0,
        }
    }
}

/// `[voice]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    pub loudness_threshold: f32,
    pub silence_ms: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            loudness_threshold: 500.0,
            silence_ms: 1_500,
            sample_rate: 48_000,
            channels: 1,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("agent_name", &self.agent_name)
            .field("model_url", &self.model_url)
            .field("active_model", &self.active_model)
            .field("transcription_model", &self.transcription_model)
            .field("speech_model", &self.speech_model)
            .field("speech_voice", &self.speech_voice)
            .field(
                "api_key",
                if self.api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("max_lock_secs", &self.max_lock_secs)
            .field("behavior", &self.behavior)
            .field("navigation", &self.navigation)
            .field("voice", &self.voice)
            .finish()
    }
}

fn default_agent_name() -> String {
    "Embody".to_string()
}
fn default_model_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3".to_string()
}
fn default_transcription_model() -> String {
    "whisper-1".to_string()
}
fn default_speech_model() -> String {
    "tts-1".to_string()
}
fn default_speech_voice() -> String {
    "alloy".to_string()
}
fn default_max_lock_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_name: default_agent_name(),
            model_url: default_model_url(),
            active_model: default_model(),
            transcription_model: default_transcription_model(),
            speech_model: default_speech_model(),
            speech_voice: default_speech_voice(),
            api_key: String::new(),
            max_lock_secs: default_max_lock_secs(),
            behavior: BehaviorSettings::default(),
            navigation: NavigationSettings::default(),
            voice: VoiceSettings::default(),
        }
    }
}

impl Config {
    pub fn max_lock_duration(&self) -> Duration {
        Duration::from_secs(self.max_lock_secs.max(1))
    }

    pub fn behavior_config(&self) -> BehaviorConfig {
        let b = &self.behavior;
        BehaviorConfig {
            min_interval: Duration::from_millis(b.min_interval_ms),
            max_interval: Duration::from_millis(b.max_interval_ms),
            repeat_window: b.repeat_window,
            wander: WanderConfig {
                interval: Duration::from_millis(b.wander_interval_ms),
                max_distance: b.wander_max_distance,
                duration: Duration::from_millis(b.wander_duration_ms),
            },
        }
    }

    pub fn navigation_config(&self) -> NavigationConfig {
        NavigationConfig {
            // A zero tick would spin the navigation loop.
            tick_interval: Duration::from_millis(self.navigation.tick_ms.max(1)),
            stop_distance: self.navigation.stop_distance,
            ..NavigationConfig::default()
        }
    }

    pub fn voice_config(&self) -> VoiceConfig {
        VoiceConfig {
            loudness_threshold: self.voice.loudness_threshold,
            silence_window: Duration::from_millis(self.voice.silence_ms),
            sample_rate: self.voice.sample_rate,
            channels: self.voice.channels,
        }
    }
}

/// Return the path to `~/.embody/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".embody").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `EMBODY_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `EMBODY_MODEL_URL` | `model_url` |
/// | `EMBODY_MODEL` | `active_model` |
/// | `EMBODY_API_KEY` | `api_key` |
/// | `EMBODY_AGENT_NAME` | `agent_name` |
/// | `EMBODY_MAX_LOCK_SECS` | `max_lock_secs` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("EMBODY_MODEL_URL") {
        cfg.model_url = v;
    }
    if let Ok(v) = std::env::var("EMBODY_MODEL") {
        cfg.active_model = v;
    }
    if let Ok(v) = std::env::var("EMBODY_API_KEY") {
        cfg.api_key = v;
    }
    if let Ok(v) = std::env::var("EMBODY_AGENT_NAME")
        && !v.trim().is_empty() {
            cfg.agent_name = v;
        }
    if let Ok(v) = std::env::var("EMBODY_MAX_LOCK_SECS")
        && let Ok(secs) = v.parse::<u64>() {
            cfg.max_lock_secs = secs;
        }
}

/// Save the config to disk, creating `~/.embody/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
