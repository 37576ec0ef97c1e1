//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/keel/cli.toml`
//! - Windows: `%APPDATA%/keel/cli.toml`
//!
//! ```toml
//! store_root = "/srv/keel"
//!
//! [transfer]
//! default_part_size = 16777216
//! worker_threads = 8
//! ```

use std::path::{Path, PathBuf};

use keel_transfer::TransferConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Directory holding one subdirectory per bucket.
    #[serde(default = "default_store_root")]
    pub store_root: String,

    /// Part sizing, batching and pool settings.
    #[serde(default)]
    pub transfer: TransferConfig,
}

fn default_store_root() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("keel")
        .display()
        .to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            store_root: default_store_root(),
            transfer: TransferConfig::default(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from `path` (or the platform path), writing the
    /// defaults there first if the file does not exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => config_path()?,
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: CliConfig = toml::from_str(&content)?;
            config.transfer.validate()?;
            Ok(config)
        } else {
            let config = CliConfig::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("keel").join("cli.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home).join(".config").join("keel").join("cli.toml"))
    }
}
