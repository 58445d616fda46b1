use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a failed envelope.
    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Server response had no data")]
    EmptyResponse,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("A timer is already running")]
    TimerAlreadyRunning,

    #[error("No timer is running")]
    NoActiveTimer,

    #[error("Unknown category: {0}")]
    UnknownCategory(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TrackerError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TrackerError::Api { status: 401, .. })
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;
