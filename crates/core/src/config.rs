use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8181
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Page configuration file; defaults to `<base>/pages.json`.
    #[serde(default)]
    pub pages_file: Option<String>,
    /// Cookie table file; defaults to `<base>/cookies.json`.
    #[serde(default)]
    pub cookies_file: Option<String>,
    /// Root directory holding one folder per capture round; defaults to
    /// `<base>/screenshots`.
    #[serde(default)]
    pub capture_dir: Option<String>,
    /// Renderer engine name; the page model's `engine` field wins when set.
    #[serde(default)]
    pub engine: Option<String>,
    /// Script handed to the engine binary for each capture.
    #[serde(default = "default_render_script")]
    pub render_script: String,
    /// A renderer running past this is killed and the job counted as failed.
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,
    #[serde(default = "default_thumb_height")]
    pub thumb_height: u32,
}

fn default_render_script() -> String {
    "captureScript.js".to_string()
}

fn default_render_timeout_secs() -> u64 {
    120
}

fn default_thumb_height() -> u32 {
    200
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            pages_file: None,
            cookies_file: None,
            capture_dir: None,
            engine: None,
            render_script: default_render_script(),
            render_timeout_secs: default_render_timeout_secs(),
            thumb_height: default_thumb_height(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    /// When set, log lines are copied to this file and served by `/log`.
    #[serde(default)]
    pub log_file: Option<String>,
    /// Run a comparison of the first two environments right after startup.
    #[serde(default)]
    pub start_compare: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let path = paths.config_file();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn pages_file(&self, paths: &Paths) -> PathBuf {
        self.capture
            .pages_file
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| paths.pages_file())
    }

    pub fn cookies_file(&self, paths: &Paths) -> PathBuf {
        self.capture
            .cookies_file
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| paths.cookies_file())
    }

    pub fn capture_dir(&self, paths: &Paths) -> PathBuf {
        self.capture
            .capture_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| paths.capture_dir())
    }

    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.log_file.as_ref().map(PathBuf::from)
    }
}
