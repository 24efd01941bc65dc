//! Error types for meterwise-core
//!
//! The engine itself never fails; these cover the store and the external
//! collaborators (AI coach, OCR), plus the load report used for graceful
//! degradation.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for meterwise operations
#[derive(Error, Debug)]
pub enum CoreError {
    // ===================
    // IO Errors
    // ===================
    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    // ===================
    // Parse Errors
    // ===================
    #[error("Failed to parse JSON in {path}: {message}")]
    JsonParse {
        path: PathBuf,
        message: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize {path}")]
    JsonSerialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // ===================
    // Store Errors
    // ===================
    #[error("Reading not found: {id}")]
    ReadingNotFound { id: u64 },

    #[error("Invalid reading value: {value} (expected a finite, non-negative kWh counter)")]
    InvalidReading { value: f64 },

    // ===================
    // Config Errors
    // ===================
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Data directory not found")]
    DataDirNotFound,

    // ===================
    // Collaborator Errors
    // ===================
    #[error("{provider} API key is not configured")]
    MissingApiKey { provider: &'static str },

    #[error("{provider} rate limit reached, try again later")]
    RateLimited { provider: &'static str },

    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: &'static str },

    #[error("Unexpected {provider} payload: {message}")]
    MalformedPayload {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} request failed with status {status}: {message}")]
    Provider {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{provider} request failed")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl CoreError {
    /// Stable machine-readable tag for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::FileRead { .. } => "FILE_READ",
            CoreError::FileWrite { .. } => "FILE_WRITE",
            CoreError::FileNotFound { .. } => "FILE_NOT_FOUND",
            CoreError::JsonParse { .. } => "JSON_PARSE",
            CoreError::JsonSerialize { .. } => "JSON_SERIALIZE",
            CoreError::ReadingNotFound { .. } => "READING_NOT_FOUND",
            CoreError::InvalidReading { .. } => "INVALID_READING",
            CoreError::InvalidConfig { .. } => "INVALID_CONFIG",
            CoreError::DataDirNotFound => "DATA_DIR_NOT_FOUND",
            CoreError::MissingApiKey { .. } => "MISSING_API_KEY",
            CoreError::RateLimited { .. } => "RATE_LIMITED",
            CoreError::EmptyResponse { .. } => "EMPTY_RESPONSE",
            CoreError::MalformedPayload { .. } => "MALFORMED_PAYLOAD",
            CoreError::Provider { .. } => "PROVIDER_ERROR",
            CoreError::Http { .. } => "NETWORK_ERROR",
        }
    }

    /// Map a non-success HTTP status to the matching error
    pub(crate) fn from_status(provider: &'static str, status: u16, body: &str) -> Self {
        match status {
            429 => CoreError::RateLimited { provider },
            _ => CoreError::Provider {
                provider,
                status,
                message: truncate(body, 200),
            },
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let mut out: String = trimmed.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}

/// Severity of a load problem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Expected on a fresh data directory (missing file)
    Warning,
    /// File present but unusable, defaults used instead
    Error,
    /// Data directory itself unusable
    Fatal,
}

/// One problem met while loading a data file
#[derive(Debug, Clone)]
pub struct LoadError {
    /// Which file: `readings`, `settings`, `chat` or `data_dir`
    pub source: String,
    pub message: String,
    pub severity: ErrorSeverity,
    /// Hint printed under the message
    pub suggestion: Option<String>,
}

impl LoadError {
    fn new(severity: ErrorSeverity, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            severity,
            suggestion: None,
        }
    }

    pub fn warning(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorSeverity::Warning, source, message)
    }

    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorSeverity::Error, source, message)
    }

    pub fn fatal(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorSeverity::Fatal, source, message)
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Load error for a failed file read, with a hint matching the cause
    pub fn from_core_error(source: impl Into<String>, error: &CoreError) -> Self {
        let (message, suggestion) = match error {
            CoreError::FileNotFound { path } => (
                format!("File not found: {}", path.display()),
                Some("It will be created on the next save".to_string()),
            ),
            CoreError::FileRead { path, .. } => (
                format!("Cannot read file: {}", path.display()),
                Some(format!("Check permissions: chmod +r {}", path.display())),
            ),
            CoreError::JsonParse { path, message, .. } => (
                format!("Unreadable data in {}: {}", path.display(), message),
                Some(format!(
                    "Fix it by hand (`jq . {}`) or delete it to start from defaults",
                    path.display()
                )),
            ),
            CoreError::DataDirNotFound => (
                "Data directory not found".to_string(),
                Some("Pass --data-dir or set METERWISE_DATA_DIR".to_string()),
            ),
            _ => (error.to_string(), None),
        };

        Self {
            suggestion,
            ..Self::error(source, message)
        }
    }
}

/// Outcome of [`ReadingStore::initial_load`](crate::store::ReadingStore::initial_load)
///
/// Loading never fails: missing or unreadable files fall back to defaults
/// and are listed in `errors`.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub errors: Vec<LoadError>,
    pub readings_loaded: bool,
    pub settings_loaded: bool,
    pub chat_loaded: bool,
    /// Readings kept after validation
    pub reading_count: usize,
    /// Readings dropped for a non-finite or negative value
    pub readings_skipped: usize,
}

impl LoadReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: LoadError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, source: impl Into<String>, message: impl Into<String>) {
        self.errors.push(LoadError::warning(source, message));
    }

    pub fn has_fatal_errors(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.severity == ErrorSeverity::Fatal)
    }

    /// Everything worse than a warning
    pub fn problems(&self) -> impl Iterator<Item = &LoadError> {
        self.errors
            .iter()
            .filter(|e| e.severity != ErrorSeverity::Warning)
    }

    /// (warnings, errors, fatal)
    pub fn error_count(&self) -> (usize, usize, usize) {
        let count = |severity| self.errors.iter().filter(|e| e.severity == severity).count();
        (
            count(ErrorSeverity::Warning),
            count(ErrorSeverity::Error),
            count(ErrorSeverity::Fatal),
        )
    }
}

/// Whether the store runs on what is on disk or on defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedState {
    Healthy,
    /// These files were unusable and their defaults are in memory
    PartialData {
        missing: Vec<String>,
        reason: String,
    },
}

impl DegradedState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, DegradedState::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        !self.is_healthy()
    }
}
