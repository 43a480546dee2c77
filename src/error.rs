use std::path::PathBuf;

use thiserror::Error;

use crate::otg::teardown::TeardownStep;

/// Library-wide error type
#[derive(Error, Debug)]
pub enum GadgetError {
    #[error("Failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Function {function} is not registered in gadget {gadget}")]
    PrerequisiteMissing { gadget: String, function: String },

    #[error("Configuration {config} is not registered in gadget {gadget}")]
    UnknownConfig { gadget: String, config: String },

    #[error("Binding {binding} already exists in configuration {config}")]
    DuplicateBinding { config: String, binding: String },

    #[error(
        "Teardown of gadget {gadget} stopped at {step} after {completed} completed steps: {source}"
    )]
    PartialTeardown {
        gadget: String,
        step: TeardownStep,
        completed: usize,
        #[source]
        source: Box<GadgetError>,
    },

    #[error("No USB Device Controller (UDC) found")]
    NoController,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GadgetError {
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// The teardown step that failed, if this is a teardown failure
    pub fn teardown_step(&self) -> Option<&TeardownStep> {
        match self {
            Self::PartialTeardown { step, .. } => Some(step),
            _ => None,
        }
    }
}

/// Result type alias for gadget operations
pub type Result<T> = std::result::Result<T, GadgetError>;
