//! Console configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/pendant-console/console.toml`
//! - Windows: `%APPDATA%/pendant-console/console.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use pendant_device_client::ClientConfig;
use pendant_firmware_update::Language;
use serde::{Deserialize, Serialize};

/// Console configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Base URL of the pendant controller.
    #[serde(default = "default_device_url")]
    pub device_url: String,

    /// Language of operator messages.
    #[serde(default)]
    pub language: Language,

    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// `Cookie` header value of an authenticated session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<String>,
}

fn default_device_url() -> String {
    "http://192.168.4.1".into()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            device_url: default_device_url(),
            language: Language::default(),
            request_timeout_secs: default_timeout_secs(),
            session_cookie: None,
        }
    }
}

impl ConsoleConfig {
    /// Loads configuration from `path` (or the default location), creating
    /// a default file if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };
        Self::load_from(&path)
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: ConsoleConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = ConsoleConfig::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Writes the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // May hold a session cookie.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// HTTP client settings derived from this configuration.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.device_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            session_cookie: self.session_cookie.clone(),
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("pendant-console")
            .join("console.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata)
            .join("pendant-console")
            .join("console.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/pendant-console/console.toml"))
    }
}
