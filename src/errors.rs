//! Error types for conversion, registration and configuration
//!
//! `load` never produces one of these: a failed load is a recoverable
//! `None`. Everything that crosses the boundary as a raised error
//! (`cast`, `call`, `cast_from_host`) uses [`CastError`].

use crate::host::HostError;
use crate::policy::ReturnValuePolicy;
use std::path::PathBuf;
use thiserror::Error;

pub type CastResult<T> = Result<T, CastError>;

/// Conversion error raised across the native/host boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CastError {
    #[error("Unregistered type : {type_name}")]
    UnregisteredType { type_name: String },

    #[error("return_value_policy = copy, but the object of type {type_name} is non-copyable!")]
    NonCopyable { type_name: String },

    #[error("Unable to cast host object to native type {type_name}")]
    Load { type_name: String },

    #[error("return_value_policy = {policy} cannot be applied to a borrowed {type_name}")]
    InvalidPolicy {
        policy: ReturnValuePolicy,
        type_name: String,
    },

    #[error("call(): unable to convert argument {index} to a host object: {source}")]
    Argument {
        index: usize,
        #[source]
        source: Box<CastError>,
    },

    #[error("Type {type_name} is already registered")]
    DuplicateType { type_name: String },

    #[error(transparent)]
    Host(#[from] HostError),
}

impl CastError {
    pub fn unregistered(type_name: impl Into<String>) -> Self {
        Self::UnregisteredType { type_name: type_name.into() }
    }

    pub fn load(type_name: impl Into<String>) -> Self {
        Self::Load { type_name: type_name.into() }
    }

    /// Name of the native type the error is about, if any
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Self::UnregisteredType { type_name }
            | Self::NonCopyable { type_name }
            | Self::Load { type_name }
            | Self::InvalidPolicy { type_name, .. }
            | Self::DuplicateType { type_name } => Some(type_name),
            Self::Argument { source, .. } => source.type_name(),
            Self::Host(_) => None,
        }
    }
}

/// Failure to read or parse a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported config format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostErrorKind;

    #[test]
    fn test_unregistered_message_names_type() {
        let err = CastError::unregistered("app::Widget");
        assert_eq!(err.to_string(), "Unregistered type : app::Widget");
        assert_eq!(err.type_name(), Some("app::Widget"));
    }

    #[test]
    fn test_argument_error_keeps_source() {
        let err = CastError::Argument {
            index: 1,
            source: Box::new(CastError::NonCopyable { type_name: "Pool".into() }),
        };
        assert!(err.to_string().contains("argument 1"));
        assert_eq!(err.type_name(), Some("Pool"));
    }

    #[test]
    fn test_host_error_is_transparent() {
        let err: CastError = HostError::new(HostErrorKind::Overflow, "too big").into();
        assert_eq!(err.to_string(), "OverflowError: too big");
        assert_eq!(err.type_name(), None);
    }
}
