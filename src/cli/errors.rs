//! CLI-specific error types

use std::fmt;
use std::io;

use crate::view::ViewError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdin/stdout, fixture files)
    IoError,
    /// Invalid input on stdin
    InputError,
    /// The view request failed
    ViewFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "LAYERVIEW_CLI_CONFIG_ERROR",
            Self::IoError => "LAYERVIEW_CLI_IO_ERROR",
            Self::InputError => "LAYERVIEW_CLI_INPUT_ERROR",
            Self::ViewFailed => "LAYERVIEW_CLI_VIEW_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn input_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InputError, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ViewError> for CliError {
    fn from(e: ViewError) -> Self {
        match e {
            ViewError::Configuration(msg) => Self::config_error(msg),
            other => {
                let code = other.root_cause().code();
                Self::new(CliErrorCode::ViewFailed, format!("{}: {}", code, other))
            }
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
