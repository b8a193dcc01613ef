use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoutaError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Max iterations reached after {0} rounds")]
    MaxIterations(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml_bw::Error),
}

impl RoutaError {
    /// Stable taxonomy tag used in wire-facing error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::AccessDenied(_) => "ACCESS_DENIED",
            Self::BadInput(_) | Self::Json(_) | Self::Yaml(_) => "BAD_INPUT",
            Self::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            Self::Upstream(_) | Self::Io(_) => "UPSTREAM_ERROR",
            Self::Cancelled(_) => "CANCELLED",
            Self::MaxIterations(_) => "MAX_ITERATIONS",
        }
    }

    /// Whether the caller may reasonably retry the failed operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, RoutaError>;
