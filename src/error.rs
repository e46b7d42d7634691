//! Top-level error types for the bridge.

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    StateStore(#[from] StateStoreError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Nudge(#[from] NudgeError),

    #[error(transparent)]
    Sse(#[from] SseError),

    #[error(transparent)]
    Daemon(#[from] DaemonError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// StateStore load/persist errors.
#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    /// Persisted state on disk could not be parsed. Fatal: halts startup.
    #[error("fatal_config: state file at {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },

    #[error("failed to persist state to {path}: {source}")]
    Persist {
        path: String,
        source: std::io::Error,
    },
}

/// Router resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("invalid_argument: agent identity must not be empty")]
    EmptyAgent,

    #[error("invalid_argument: no default channel configured")]
    NoDefault,
}

/// Nudge delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum NudgeError {
    #[error("invalid_argument: agent identity must not be empty")]
    EmptyAgent,

    #[error("not_found: agent '{agent}' has no bead on record")]
    AgentNotFound { agent: String },

    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("bad_response: coop returned an unparseable delivered flag: {0}")]
    BadResponse(String),

    #[error("busy: agent '{agent}' stayed busy after {attempts} attempts")]
    Busy { agent: String, attempts: u32 },
}

/// SSE stream errors (all non-fatal; the reconnect loop logs and retries).
#[derive(Debug, thiserror::Error)]
pub enum SseError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("bad_response: {0}")]
    BadResponse(String),

    #[error("upstream_status: daemon SSE endpoint returned {0}")]
    UpstreamStatus(reqwest::StatusCode),
}

/// Daemon REST client errors.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("bad_response: {0}")]
    BadResponse(String),

    #[error("not_found: {0}")]
    NotFound(String),

    #[error("upstream_status: daemon returned {status} for {path}")]
    UpstreamStatus {
        status: reqwest::StatusCode,
        path: String,
    },
}

/// Chat transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("not_found: {0}")]
    NotFound(String),

    #[error("bad_response: {0}")]
    BadResponse(String),
}
