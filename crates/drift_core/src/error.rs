//! Error taxonomy shared by every subsystem of the engine.

use thiserror::Error;

/// Errors raised while configuring or running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// A required configuration key is absent or empty.
    #[error("missing parameter {key}")]
    MissingParameter { key: String },

    /// A configuration value could not be parsed or failed validation.
    #[error("invalid value {value:?} for parameter {key}: {reason}")]
    InvalidParameter {
        key: String,
        value: String,
        reason: String,
    },

    /// No factory is registered for the configured type tag.
    #[error("unknown {kind} type {tag:?} in block {block}")]
    UnknownType {
        kind: &'static str,
        tag: String,
        block: String,
    },

    /// A registered block failed while loading its parameters.
    #[error("failed to instantiate block {block}: {source}")]
    Instantiation {
        block: String,
        #[source]
        source: Box<SimError>,
    },

    #[error("release error: {0}")]
    Release(String),

    #[error("zone {zone}: {reason}")]
    Zone { zone: String, reason: String },

    #[error("action {action}: {reason}")]
    Action { action: String, reason: String },

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("output error: {0}")]
    Output(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingParameter { key: key.into() }
    }

    pub fn invalid(
        key: impl Into<String>,
        value: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            key: key.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn zone(zone: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Zone {
            zone: zone.into(),
            reason: reason.into(),
        }
    }

    pub fn action(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Action {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an error raised while a configured block was being built.
    pub fn instantiation(block: impl Into<String>, source: SimError) -> Self {
        Self::Instantiation {
            block: block.into(),
            source: Box::new(source),
        }
    }
}

pub type SimResult<T> = std::result::Result<T, SimError>;
