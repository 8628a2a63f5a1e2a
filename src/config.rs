use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{RenderError, Result, Viewport};

/// Port used when neither the config file, `PORT`, nor `--port` sets one.
pub const DEFAULT_PORT: u16 = 3000;

/// Maximum accepted JSON body for `/render-pdf` (10 MB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Environment variable holding the listen port.
pub const PORT_ENV: &str = "PORT";
/// Environment variable pointing at a Chrome/Chromium executable.
pub const CHROME_PATH_ENV: &str = "CHROME_PATH";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Name reported by `/health`.
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub launch: LaunchMode,
    pub max_body_bytes: usize,
    /// URL schemes accepted for render targets.
    pub allowed_schemes: Vec<String>,
    pub viewport: Viewport,
    pub timeouts: Timeouts,
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "pdf-renderer".to_string(),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            launch: LaunchMode::Eager,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            viewport: Viewport::default(),
            timeouts: Timeouts::default(),
            engine: EngineConfig::default(),
        }
    }
}

/// When the shared browser is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// At service start; a failure aborts start-up.
    Eager,
    /// On the first render request.
    Lazy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub navigation: Duration,
    #[serde(with = "humantime_serde")]
    pub fonts: Duration,
    /// Grace period for terminating the browser on shutdown.
    #[serde(with = "humantime_serde")]
    pub shutdown: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            fonts: Duration::from_secs(10),
            shutdown: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Headless Chrome/Chromium over the DevTools protocol.
    Chromium,
    /// Deterministic in-process engine for smoke runs without a browser.
    Scripted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Browser binary; autodetected when unset.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    /// Chrome's sandbox usually has to be disabled inside containers.
    pub sandbox: bool,
    /// Extra command line switches passed to the browser.
    pub args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Chromium,
            executable: None,
            headless: true,
            sandbox: true,
            args: Vec::new(),
        }
    }
}

impl Config {
    /// Load a TOML config file, or the built-in defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|e| {
                    RenderError::Config(format!("Failed to read config {}: {}", path.display(), e))
                })?;
                Self::from_toml(&raw).map_err(|e| match e {
                    RenderError::Config(msg) => {
                        RenderError::Config(format!("{} ({})", msg, path.display()))
                    }
                    other => other,
                })
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| RenderError::Config(format!("Invalid config: {}", e)))
    }

    /// Overlay values taken from the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(PORT_ENV).filter(|v| !v.trim().is_empty()) {
            self.port = raw.trim().parse().map_err(|_| {
                RenderError::Config(format!("{} must be a port number, got {:?}", PORT_ENV, raw))
            })?;
        }
        if let Some(raw) = lookup(CHROME_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            self.engine.executable = Some(PathBuf::from(raw));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(RenderError::Config("service_name must not be empty".to_string()));
        }
        if self.max_body_bytes == 0 {
            return Err(RenderError::Config("max_body_bytes must be positive".to_string()));
        }
        if self.allowed_schemes.is_empty() {
            return Err(RenderError::Config(
                "allowed_schemes must list at least one scheme".to_string(),
            ));
        }
        self.viewport
            .validate()
            .map_err(|e| RenderError::Config(e.to_string()))?;
        for (name, value) in [
            ("timeouts.navigation", self.timeouts.navigation),
            ("timeouts.fonts", self.timeouts.fonts),
            ("timeouts.shutdown", self.timeouts.shutdown),
        ] {
            if value.is_zero() {
                return Err(RenderError::Config(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
