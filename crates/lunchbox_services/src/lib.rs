//! Lunchbox Services Layer
//!
//! Platform-facing services. Currently settings loading.

pub mod settings;

pub use settings::{BatchSettings, Settings, SettingsError};

use std::path::Path;
use tracing::info;

/// Load settings from `path`, or fall back to defaults when none is given.
pub fn init_services(path: Option<&Path>) -> Result<Settings, SettingsError> {
    let settings = match path {
        Some(path) => {
            let settings = Settings::load(path)?;
            info!(path = %path.display(), "settings loaded");
            settings
        }
        None => {
            info!("no settings file given, using defaults");
            Settings::default()
        }
    };
    Ok(settings)
}
