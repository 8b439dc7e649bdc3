use crate::env::Environment;
use anyhow::{Context, Result, anyhow};
use log::LevelFilter;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

// ── Final (merged) config types ──

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct PromptConfig {
    /// Shown while nobody is logged in.
    pub anonymous: String,
    /// Shown to a logged-in user; `{user}` is replaced with the name.
    pub authenticated: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            anonymous: "$ ".to_string(),
            authenticated: "{user}:$ ".to_string(),
        }
    }
}

impl PromptConfig {
    pub fn render(&self, identity: Option<&str>) -> String {
        match identity {
            Some(user) => self.authenticated.replace("{user}", user),
            None => self.anonymous.clone(),
        }
    }
}

/// Where users and history live between runs.
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
        }
    }
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    prompt: PromptOverlay,
    #[serde(default)]
    storage: StorageOverlay,
    #[serde(default)]
    logging: LoggingOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct PromptOverlay {
    anonymous: Option<String>,
    authenticated: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StorageOverlay {
    backend: Option<Backend>,
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingOverlay {
    level: Option<String>,
    file: Option<PathBuf>,
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Load configuration with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Merge user overlay from ~/.config/mysh/config.toml (if exists)
    /// 3. Merge the file given on the command line (if any)
    ///
    /// A broken user overlay is reported and skipped; a broken explicit file
    /// is an error.
    pub fn load(env: &Environment, explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();
        if let Some(overlay) = Self::load_user_overlay(env) {
            config.apply_overlay(overlay);
        }
        if let Some(path) = explicit {
            let path = env.resolve(path);
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path.display()))?;
            let overlay = toml::from_str(&content)
                .with_context(|| format!("parsing config {}", path.display()))?;
            config.apply_overlay(overlay);
        }
        Ok(config)
    }

    fn load_user_overlay(env: &Environment) -> Option<ConfigOverlay> {
        let path = env.home_dir()?.join(".config/mysh/config.toml");
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                eprintln!("mysh: config parse error: {e}");
                None
            }
        }
    }

    /// Apply an overlay on top of this config: every key present wins.
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        let p = overlay.prompt;
        if let Some(v) = p.anonymous {
            self.prompt.anonymous = v;
        }
        if let Some(v) = p.authenticated {
            self.prompt.authenticated = v;
        }

        let s = overlay.storage;
        if let Some(v) = s.backend {
            self.storage.backend = v;
        }
        if s.data_dir.is_some() {
            self.storage.data_dir = s.data_dir;
        }

        let l = overlay.logging;
        if let Some(v) = l.level {
            self.logging.level = v;
        }
        if l.file.is_some() {
            self.logging.file = l.file;
        }
    }

    /// Directory holding the persisted users and history.
    pub fn data_dir(&self, env: &Environment) -> PathBuf {
        match &self.storage.data_dir {
            Some(dir) => env.resolve(dir),
            None => match env.home_dir() {
                Some(home) => home.join(".local/share/mysh"),
                None => env.current_dir.join(".mysh"),
            },
        }
    }

    pub fn log_file(&self, env: &Environment) -> PathBuf {
        match &self.logging.file {
            Some(file) => env.resolve(file),
            None => self.data_dir(env).join("mysh.log"),
        }
    }

    pub fn log_level(&self) -> Result<LevelFilter> {
        self.logging
            .level
            .parse()
            .map_err(|_| anyhow!("invalid log level {:?}", self.logging.level))
    }
}
