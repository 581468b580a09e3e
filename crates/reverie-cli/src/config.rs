//! Configuration Vault – reads/writes `~/.reverie/config.toml`.

use reverie_types::{ProviderKind, RetrievalWeights};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use zeroize::Zeroize;

/// Persisted user configuration stored in `~/.reverie/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Preferred embedding provider (head of the fallback chain).
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,

    /// Base URL of the Ollama instance.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Local embedding model served by Ollama.
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,

    /// Output dimensionality of `ollama_model`.
    #[serde(default = "default_ollama_dimension")]
    pub ollama_dimension: usize,

    /// OpenAI API key (stored as plain text – users should restrict file
    /// permissions on `~/.reverie/config.toml`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub openai_api_key: String,

    /// Maximum number of embedding vectors kept in the cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Pacing applied to network embedding calls.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Default blend weights for `/recall`.
    #[serde(default)]
    pub weights: RetrievalWeights,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field("ollama_url", &self.ollama_url)
            .field("ollama_model", &self.ollama_model)
            .field("ollama_dimension", &self.ollama_dimension)
            .field(
                "openai_api_key",
                if self.openai_api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("cache_capacity", &self.cache_capacity)
            .field("requests_per_second", &self.requests_per_second)
            .field("weights", &self.weights)
            .finish()
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        // Wipe the key from memory once the config goes out of scope.
        self.openai_api_key.zeroize();
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::Ollama
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_ollama_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_ollama_dimension() -> usize {
    768
}
fn default_cache_capacity() -> usize {
    1024
}
fn default_requests_per_second() -> u32 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            ollama_url: default_ollama_url(),
            ollama_model: default_ollama_model(),
            ollama_dimension: default_ollama_dimension(),
            openai_api_key: String::new(),
            cache_capacity: default_cache_capacity(),
            requests_per_second: default_requests_per_second(),
            weights: RetrievalWeights::default(),
        }
    }
}

/// Return the path to `~/.reverie/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".reverie").join("config.toml")
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
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `REVERIE_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `REVERIE_PROVIDER` | `provider` |
/// | `REVERIE_OLLAMA_URL` | `ollama_url` |
/// | `REVERIE_OLLAMA_MODEL` | `ollama_model` |
/// | `REVERIE_OPENAI_API_KEY` | `openai_api_key` |
/// | `REVERIE_CACHE_CAPACITY` | `cache_capacity` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("REVERIE_PROVIDER")
        && let Ok(kind) = v.parse::<ProviderKind>() {
            cfg.provider = kind;
        }
    if let Ok(v) = std::env::var("REVERIE_OLLAMA_URL") {
        cfg.ollama_url = v;
    }
    if let Ok(v) = std::env::var("REVERIE_OLLAMA_MODEL") {
        cfg.ollama_model = v;
    }
    if let Ok(v) = std::env::var("REVERIE_OPENAI_API_KEY") {
        cfg.openai_api_key = v;
    }
    if let Ok(v) = std::env::var("REVERIE_CACHE_CAPACITY")
        && let Ok(capacity) = v.parse::<usize>() {
            cfg.cache_capacity = capacity;
        }
}

/// Save the config to disk, creating `~/.reverie/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Restrict the config directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Write the file with owner-only read/write (rw-------) on Unix.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_debug_redacts_api_key() {
        let mut cfg = Config::default();
        cfg.openai_api_key = "sk-super-secret".to_string();
        let debug_str = format!("{:?}", cfg);
        assert!(!debug_str.contains("sk-super-secret"), "key must not appear in debug output");
        assert!(debug_str.contains("<redacted>"), "debug output must show <redacted> for a set key");
    }

    #[test]
    fn config_debug_shows_not_set_for_empty_key() {
        let cfg = Config::default();
        let debug_str = format!("{:?}", cfg);
        assert!(debug_str.contains("<not set>"), "empty API key must show <not set> in debug output");
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let file_meta = std::fs::metadata(&path).expect("file metadata");
        let file_mode = file_meta.permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        let dir_mode = dir_meta.permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.ollama_model, "nomic-embed-text");
        assert_eq!(loaded.ollama_dimension, 768);
        assert_eq!(loaded.cache_capacity, 1024);
        assert_eq!(loaded.requests_per_second, 10);
    }

    #[test]
    fn config_path_points_to_reverie_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".reverie"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let result = load_from(&path).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn apply_env_overrides_changes_ollama_url() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("REVERIE_OLLAMA_URL", "http://agent-host:11434") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.ollama_url, "http://agent-host:11434");
        unsafe { std::env::remove_var("REVERIE_OLLAMA_URL") };
    }

    #[test]
    fn apply_env_overrides_changes_provider() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("REVERIE_PROVIDER", "offline") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.provider, ProviderKind::Offline);
        unsafe { std::env::remove_var("REVERIE_PROVIDER") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_provider() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("REVERIE_PROVIDER", "not-a-provider") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.provider, ProviderKind::Ollama);
        unsafe { std::env::remove_var("REVERIE_PROVIDER") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_capacity() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("REVERIE_CACHE_CAPACITY", "not-a-number") };
        let mut cfg = Config::default();
        let original = cfg.cache_capacity;
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.cache_capacity, original);
        unsafe { std::env::remove_var("REVERIE_CACHE_CAPACITY") };
    }

    #[test]
    fn weights_default_when_absent_from_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "provider = \"offline\"\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.provider, ProviderKind::Offline);
        assert_eq!(loaded.weights, RetrievalWeights::default());
    }
}
