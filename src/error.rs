//! Error types shared across the control stack. None of these terminate a
//! task: callers log them and hold the last good output.

use crate::messages::Mode;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BusError {
    #[error("node '{node}' already subscribes to '{topic}'")]
    DuplicateSubscription { node: String, topic: &'static str },

    #[error("node '{node}' already publishes '{topic}'")]
    DuplicatePublication { node: String, topic: &'static str },

    #[error("topic '{0}' is registered with a different message type")]
    TypeMismatch(&'static str),

    #[error("refusing to publish non-finite message on '{0}'")]
    NonFinite(&'static str),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ArbiterError {
    #[error("cannot arm until a mode is selected")]
    ArmWithoutMode,

    #[error("mode '{0}' is not supported by this vehicle")]
    UnsupportedMode(Mode),
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("{output}[{index}] not finite: {value}")]
pub struct NumericError {
    pub output: &'static str,
    pub index: usize,
    pub value: f64,
}

impl NumericError {
    /// Returns the first non-finite component of `values`, labelled `output`.
    pub fn check(output: &'static str, values: &[f64]) -> Result<(), NumericError> {
        match values.iter().position(|v| !v.is_finite()) {
            Some(index) => Err(NumericError { output, index, value: values[index] }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("failed to spawn task '{name}': {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("task init failed: {0}")]
    Init(#[from] BusError),
}
