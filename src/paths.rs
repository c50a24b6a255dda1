//! Application path management for portable and installed modes.
//!
//! - **Portable mode**: a `.portable` marker next to the executable keeps the
//!   config, device database and logs in that directory.
//! - **Installed mode** (default): data lives in the platform data directory
//!   under `Amp Link`.

use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name in installed mode
const APP_NAME: &str = "Amp Link";

/// Application paths for config, state, and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Path to the state directory (sled database)
    pub state_dir: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// In debug builds a `config.yaml` in the working directory wins, so
    /// `cargo run` picks up the project's config.
    ///
    /// Called before logging is initialized, hence eprintln.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join("config.yaml").exists() {
                eprintln!("[paths] DEV mode (config.yaml in {})", cwd.display());
                return Self::portable(&cwd);
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] PORTABLE mode (.portable marker found)");
            return Self::portable(&exe_dir);
        }

        let app_data = dirs::data_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: no platform data dir, falling back to exe dir");
                exe_dir.clone()
            })
            .join(APP_NAME);

        #[cfg(debug_assertions)]
        eprintln!("[paths] INSTALLED mode (data dir: {})", app_data.display());

        Self {
            config: app_data.join("config.yaml"),
            state_dir: app_data.join("state"),
            logs_dir: app_data.join("logs"),
            is_portable: false,
        }
    }

    /// Everything under `base`
    pub fn portable(base: &Path) -> Self {
        Self {
            config: base.join("config.yaml"),
            state_dir: base.join(".state"),
            logs_dir: base.join("logs"),
            is_portable: true,
        }
    }

    /// Use `config` instead of the detected config file
    pub fn with_config(mut self, config: PathBuf) -> Self {
        self.config = config;
        self
    }

    /// Ensure the state and log directories exist
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [&self.state_dir, &self.logs_dir] {
            if !dir.exists() {
                debug!("Creating directory: {}", dir.display());
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }

    /// Device database path (within state_dir)
    pub fn sled_db_path(&self) -> PathBuf {
        self.state_dir.join("devices.sled")
    }
}
