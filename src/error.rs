//! Error types and utilities for the stratix settings engine.

use std::path::{Path, PathBuf};

/// Result type alias for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Comprehensive error types for settings operations.
///
/// Errors fall into three families: authoring errors (a programming
/// mistake in the embedding application, only possible at startup),
/// user configuration errors (bad file content, bad assignments), and
/// I/O errors from the file realization and rewrite paths.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A file that was expected to exist is missing
    #[error("file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    /// A file exists but could not be read
    #[error("file not readable: {}: {source}", .path.display())]
    NotReadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file parsing failed
    #[error("parse error at {file}, line {line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    /// A `$name` reference in a value could not be resolved
    #[error("could not resolve `${reference}` in `{value}`")]
    Interpolation { reference: String, value: String },

    /// Assignment to a setting name that was never defined
    #[error("unknown setting: {name}")]
    UnknownSetting { name: String },

    /// A value could not be coerced to its setting's type
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },

    /// Write attempted against a read-only setting
    #[error("setting {name} is read-only")]
    ReadOnly { name: String },

    /// Startup-time mistake in the embedding application
    #[error("settings authoring error: {0}")]
    Authoring(String),

    /// A stale temporary file is blocking a locked rewrite
    #[error("refusing to replace {}: temporary file from a previous write still present", .path.display())]
    StaleTempFile { path: PathBuf },

    /// The final rename of an atomic rewrite failed; the target is intact
    #[error("could not replace {}: {source}", .path.display())]
    Rename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One or more provisioning intents failed during realization
    #[error("could not realize settings: {}", .0.join("; "))]
    Realization(Vec<String>),
}

impl SettingsError {
    /// Creates a new parse error carrying file and line context.
    pub fn parse(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    /// Creates a new interpolation error for an unresolved reference.
    pub fn interpolation(reference: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Interpolation {
            reference: reference.into(),
            value: value.into(),
        }
    }

    /// Creates a new unknown-setting error.
    pub fn unknown_setting(name: impl Into<String>) -> Self {
        Self::UnknownSetting { name: name.into() }
    }

    /// Creates a new read-only violation error.
    pub fn read_only(name: impl Into<String>) -> Self {
        Self::ReadOnly { name: name.into() }
    }

    /// Creates a new invalid-value error.
    pub fn invalid_value(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a new authoring error.
    pub fn authoring(message: impl Into<String>) -> Self {
        Self::Authoring(message.into())
    }

    /// Creates a new aggregate realization error from individual failures.
    pub fn realization(failures: Vec<String>) -> Self {
        Self::Realization(failures)
    }

    /// Wraps an IO error from opening `path`, distinguishing a missing
    /// file from an unreadable one.
    pub fn from_open(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound {
                path: path.to_path_buf(),
            },
            _ => Self::NotReadable {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// Returns true if this error is an authoring error.
    pub fn is_authoring(&self) -> bool {
        matches!(self, SettingsError::Authoring(_))
    }

    /// Returns true if this error carries parse (file/line) context.
    pub fn is_parse(&self) -> bool {
        matches!(self, SettingsError::Parse { .. })
    }

    /// Returns true if this error is a read-only violation.
    pub fn is_read_only(&self) -> bool {
        matches!(self, SettingsError::ReadOnly { .. })
    }

    /// Returns true if this error came out of the IO layer.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            SettingsError::Io(_)
                | SettingsError::NotFound { .. }
                | SettingsError::NotReadable { .. }
                | SettingsError::Rename { .. }
        )
    }
}
