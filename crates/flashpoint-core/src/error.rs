use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlashpointError {
    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("configuration file {path} is incorrectly formed: {source}")]
    ConfigMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error("'{0}' not found on PATH")]
    CommandNotFound(String),

    #[error("command failed: {command}\n{output}")]
    Subprocess { command: String, output: String },

    #[error("platform API request failed: {0}")]
    Transport(String),

    #[error("platform API credentials unavailable: {0} (run `heroku login` or set HEROKU_API_KEY)")]
    Auth(String),

    #[error("platform API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("registry {path} is corrupt at line {line}: {reason}")]
    RegistryCorruption {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("[{app}] {step} failed: {source}")]
    Step {
        app: String,
        step: &'static str,
        #[source]
        source: Box<FlashpointError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl FlashpointError {
    /// Transport failures worth retrying: connection problems and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            FlashpointError::Transport(_) => true,
            FlashpointError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FlashpointError>;
