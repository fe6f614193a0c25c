//! Application configuration for vidkb.
//!
//! User config lives at `~/.vidkb/vidkb.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VidkbError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "vidkb.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".vidkb";

// ---------------------------------------------------------------------------
// Config structs (matching vidkb.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub download: DownloadConfig,

    #[serde(default)]
    pub transcribe: TranscribeConfig,

    #[serde(default)]
    pub summarize: SummarizeConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where downloaded media lands.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// One JSON file per item lives here.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            checkpoint_dir: default_checkpoint_dir(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}
fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

/// `[download]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// yt-dlp executable (name on PATH or absolute path).
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,

    /// Hard limit for one media download.
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,

    /// Hard limit for metadata probes and page scrapes.
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: default_ytdlp_path(),
            timeout_secs: default_download_timeout(),
            metadata_timeout_secs: default_metadata_timeout(),
        }
    }
}

fn default_ytdlp_path() -> String {
    "yt-dlp".into()
}
fn default_download_timeout() -> u64 {
    600
}
fn default_metadata_timeout() -> u64 {
    60
}

/// `[transcribe]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeConfig {
    /// Base URL of the OpenAI-compatible Whisper server.
    #[serde(default = "default_whisper_url")]
    pub server_url: String,

    #[serde(default = "default_whisper_model")]
    pub model: String,

    /// Language hint. Empty means auto-detect.
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_transcribe_timeout")]
    pub timeout_secs: u64,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            server_url: default_whisper_url(),
            model: default_whisper_model(),
            language: default_language(),
            timeout_secs: default_transcribe_timeout(),
        }
    }
}

impl TranscribeConfig {
    /// Language hint, `None` when auto-detecting.
    pub fn language_hint(&self) -> Option<&str> {
        let lang = self.language.trim();
        (!lang.is_empty()).then_some(lang)
    }
}

fn default_whisper_url() -> String {
    "http://localhost:8000".into()
}
fn default_whisper_model() -> String {
    "Systran/faster-whisper-small".into()
}
fn default_language() -> String {
    "zh".into()
}
fn default_transcribe_timeout() -> u64 {
    1800
}

/// `[summarize]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeConfig {
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// Transcript text beyond this many chars is cut before prompting.
    #[serde(default = "default_max_transcript_chars")]
    pub max_transcript_chars: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_num_predict")]
    pub num_predict: u32,

    #[serde(default = "default_summarize_timeout")]
    pub timeout_secs: u64,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            model: default_ollama_model(),
            max_transcript_chars: default_max_transcript_chars(),
            temperature: default_temperature(),
            num_predict: default_num_predict(),
            timeout_secs: default_summarize_timeout(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}
fn default_ollama_model() -> String {
    "qwen2.5:7b-instruct-q4_K_M".into()
}
fn default_max_transcript_chars() -> usize {
    5000
}
fn default_temperature() -> f32 {
    0.3
}
fn default_num_predict() -> u32 {
    1000
}
fn default_summarize_timeout() -> u64 {
    600
}

/// `[archive]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Name of the env var holding the Notion integration token (never store the token itself).
    #[serde(default = "default_notion_token_env")]
    pub notion_token_env: String,

    /// Name of the env var holding the Notion database id.
    #[serde(default = "default_notion_database_env")]
    pub notion_database_env: String,

    /// CSV file used when Notion is not configured or unreachable.
    #[serde(default = "default_export_path")]
    pub export_path: PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            notion_token_env: default_notion_token_env(),
            notion_database_env: default_notion_database_env(),
            export_path: default_export_path(),
        }
    }
}

fn default_notion_token_env() -> String {
    "NOTION_TOKEN".into()
}
fn default_notion_database_env() -> String {
    "NOTION_DATABASE_ID".into()
}
fn default_export_path() -> PathBuf {
    PathBuf::from("knowledge_base.csv")
}

/// Notion credentials resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotionCredentials {
    pub token: String,
    pub database_id: String,
}

impl ArchiveConfig {
    /// Read both Notion env vars. `None` unless both are set and non-empty.
    pub fn notion_credentials(&self) -> Option<NotionCredentials> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Some(NotionCredentials {
            token: read(&self.notion_token_env)?,
            database_id: read(&self.notion_database_env)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.vidkb/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| VidkbError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.vidkb/vidkb.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| VidkbError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| VidkbError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Write a default config file at `path` (or the default location).
/// Refuses to overwrite an existing file. Returns the path written.
pub fn init_config(path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if path.exists() {
        return Err(VidkbError::config(format!(
            "{} already exists",
            path.display()
        )));
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| VidkbError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| VidkbError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| VidkbError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

impl AppConfig {
    /// Reject values that would make every item fail.
    pub fn validate(&self) -> Result<()> {
        if self.download.timeout_secs == 0 || self.download.metadata_timeout_secs == 0 {
            return Err(VidkbError::config("download timeouts must be > 0"));
        }
        if self.summarize.max_transcript_chars == 0 {
            return Err(VidkbError::config("summarize.max_transcript_chars must be > 0"));
        }
        for (key, value) in [
            ("transcribe.server_url", &self.transcribe.server_url),
            ("summarize.ollama_url", &self.summarize.ollama_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| VidkbError::config(format!("{key} is not a valid URL: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("vidkb-config-{}", uuid::Uuid::now_v7()))
            .join(name)
    }

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("checkpoint_dir"));
        assert!(toml_str.contains("NOTION_TOKEN"));
        assert!(toml_str.contains("qwen2.5:7b-instruct-q4_K_M"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.download.timeout_secs, 600);
        assert_eq!(parsed.summarize.max_transcript_chars, 5000);
        assert_eq!(parsed.archive.notion_database_env, "NOTION_DATABASE_ID");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml_str = r#"
[paths]
checkpoint_dir = "/var/lib/vidkb/state"

[transcribe]
language = ""
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.paths.checkpoint_dir, PathBuf::from("/var/lib/vidkb/state"));
        assert_eq!(config.paths.download_dir, PathBuf::from("downloads"));
        assert_eq!(config.transcribe.language_hint(), None);
        assert_eq!(config.summarize.num_predict, 1000);
    }

    #[test]
    fn init_then_load() {
        let path = temp_path("vidkb.toml");
        let written = init_config(Some(&path)).expect("init");
        assert_eq!(written, path);
        let loaded = load_config_from(&path).expect("load");
        assert_eq!(loaded.transcribe.model, "Systran/faster-whisper-small");

        let again = init_config(Some(&path));
        assert!(again.is_err());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn invalid_values_rejected() {
        let path = temp_path("bad.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[summarize]\nollama_url = \"not a url\"\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("summarize.ollama_url"));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn notion_credentials_need_both_vars() {
        let mut config = ArchiveConfig::default();
        // Unique names so no real environment leaks in
        config.notion_token_env = "VIDKB_TEST_MISSING_TOKEN_81723".into();
        config.notion_database_env = "VIDKB_TEST_MISSING_DB_81723".into();
        assert!(config.notion_credentials().is_none());
    }
}
