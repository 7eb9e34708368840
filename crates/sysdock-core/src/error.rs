use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Target process not running: {0}")]
    TargetNotRunning(String),

    #[error("Failed to enumerate processes: {0}")]
    EnumerationFailed(String),

    #[error("Failed to open process: {0}")]
    ProcessOpenFailed(String),

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    RegionReadFailed { address: u64, message: String },

    #[error("Failed to write process memory at address {address:#x}: {message}")]
    PatchWriteFailed { address: u64, message: String },

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// An I/O error for a file that does not exist. Stores treat it as empty.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// Whether the run can carry on with the next patch group after this error.
    ///
    /// Only a failed process enumeration stops the whole run.
    pub fn is_group_local(&self) -> bool {
        !matches!(self, Error::EnumerationFailed(_))
    }
}
