pub mod app_config;
pub mod bloggers;
pub mod config;
pub mod notes;

pub use app_config::{AppConfig, Environment};
pub use bloggers::{DiscoveredBlogger, ProgressUpdate, ScrapeStatus, DEFAULT_NOTES_TARGET};
pub use config::{load_app_config, load_app_config_from_env};
pub use notes::{note_url, profile_url, NormalizedNote, NoteKind};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid scrape status: {0}")]
    InvalidScrapeStatus(String),
    #[error("invalid note type: {0}")]
    InvalidNoteKind(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
