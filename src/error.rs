use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Calendar not found: no calendar named '{0}' is visible to this account")]
    CalendarNotFound(String),

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Calendar service error during {operation}{}: {message}", status_suffix(.status))]
    RemoteService {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    /// Quota exhaustion reported on a status that is otherwise fatal, such
    /// as Google's 403 `rateLimitExceeded`.
    #[error("Rate limited during {operation} (HTTP {status}): {message}")]
    RateLimited {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("No such date: {year}-{month:02}-{day:02}")]
    DateConstruction { year: i32, month: u32, day: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sync worker failed: {0}")]
    Worker(String),
}

impl AppError {
    pub fn auth<S: Into<String>>(msg: S) -> Self {
        Self::Auth(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn parse<S: Into<String>>(line: usize, msg: S) -> Self {
        Self::Parse {
            line,
            message: msg.into(),
        }
    }

    pub fn remote<O: Into<String>, S: Into<String>>(operation: O, status: Option<u16>, msg: S) -> Self {
        Self::RemoteService {
            operation: operation.into(),
            status,
            message: msg.into(),
        }
    }

    /// Transient failures worth another attempt: rate limits, 5xx, timeouts
    /// and connection problems. Authorization, not-found and malformed
    /// requests are fatal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RemoteService { status, .. } => match status {
                Some(code) => *code == 408 || *code == 429 || (500..=599).contains(code),
                None => true,
            },
            Self::RateLimited { .. } => true,
            Self::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Auth(_)
            | Self::CalendarNotFound(_)
            | Self::Parse { .. }
            | Self::DateConstruction { .. }
            | Self::Config(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Worker(_) => false,
        }
    }

    /// The remote resource no longer exists (404 / 410).
    pub fn is_gone(&self) -> bool {
        matches!(
            self,
            Self::RemoteService {
                status: Some(404) | Some(410),
                ..
            }
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}
