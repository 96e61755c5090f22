//! Error handling for the command gate

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// Result type for gate operations
pub type GateResult<T> = Result<T, GateError>;

/// Shell lexing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A single or double quote was opened but never closed
    UnterminatedQuote(char),

    /// `$(`, `<(`, `>(` or a backtick was opened but never closed
    UnterminatedSubstitution,

    /// `${` was opened but never closed
    UnterminatedExpansion,

    /// The input ends with a lone backslash
    TrailingEscape,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedQuote(q) => write!(f, "unterminated {} quote", q),
            Self::UnterminatedSubstitution => write!(f, "unterminated command substitution"),
            Self::UnterminatedExpansion => write!(f, "unterminated parameter expansion"),
            Self::TrailingEscape => write!(f, "no character after trailing backslash"),
        }
    }
}

impl Error for ParseError {}

/// Failures at the profile builder boundary
#[derive(Debug)]
pub enum ProfileError {
    /// Reading or writing a project file failed
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A persisted profile could not be decoded
    InvalidProfile {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A project-level allowlist file could not be decoded
    InvalidAllowlist {
        path: PathBuf,
        message: String,
    },

    /// Any other analyzer failure
    Analyzer(String),
}

impl ProfileError {
    /// Create an I/O error for a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a generic analyzer error
    pub fn analyzer(message: impl Into<String>) -> Self {
        Self::Analyzer(message.into())
    }
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "I/O error on {}: {}", path.display(), source),
            Self::InvalidProfile { path, source } => {
                write!(f, "Invalid security profile {}: {}", path.display(), source)
            }
            Self::InvalidAllowlist { path, message } => {
                write!(f, "Invalid allowlist {}: {}", path.display(), message)
            }
            Self::Analyzer(msg) => write!(f, "Project analysis failed: {}", msg),
        }
    }
}

impl Error for ProfileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::InvalidProfile { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failures of the secret scanner collaborator
#[derive(Debug)]
pub enum ScanError {
    /// The scanner (or git) cannot be used here
    Unavailable(String),

    /// IO error
    Io(std::io::Error),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "Secret scanner unavailable: {}", msg),
            Self::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl Error for ScanError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ScanError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

/// Command gate error types
#[derive(Debug)]
pub enum GateError {
    /// Command text could not be lexed
    Parse(ParseError),

    /// Profile resolution failed
    Profile(ProfileError),

    /// Invalid configuration
    InvalidConfiguration(String),

    /// Validator registration failed
    RegistrationFailed(String),

    /// Serialization/deserialization error
    SerializationError(serde_json::Error),

    /// IO error
    IoError(std::io::Error),
}

impl GateError {
    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "Could not parse command: {}", e),
            Self::Profile(e) => write!(f, "{}", e),
            Self::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            Self::RegistrationFailed(msg) => write!(f, "Validator registration failed: {}", msg),
            Self::SerializationError(e) => write!(f, "Serialization error: {}", e),
            Self::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl Error for GateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::Profile(e) => Some(e),
            Self::SerializationError(e) => Some(e),
            Self::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for GateError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<ProfileError> for GateError {
    fn from(error: ProfileError) -> Self {
        Self::Profile(error)
    }
}

impl From<serde_json::Error> for GateError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerializationError(error)
    }
}

impl From<std::io::Error> for GateError {
    fn from(error: std::io::Error) -> Self {
        Self::IoError(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GateError::from(ParseError::UnterminatedQuote('"'));
        assert_eq!(err.to_string(), "Could not parse command: unterminated \" quote");

        let err = ProfileError::analyzer("no marker files");
        assert_eq!(err.to_string(), "Project analysis failed: no marker files");
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let gate_err: GateError = json_err.into();
        assert!(matches!(gate_err, GateError::SerializationError(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "git");
        let scan_err: ScanError = io_err.into();
        assert!(scan_err.source().is_some());
    }
}
