use reqwest::StatusCode;
use serde_json::Error as JsonError;

use super::single_flight::Abandoned;

// 所有变体都是字符串化的，singleflight 需要把同一个结果 clone 给每个等待者
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ScalingError {
    #[error("function {0} not found")]
    NotFound(String),

    #[error("HTTP error ({0}): {1}")]
    HttpError(StatusCode, String),

    #[error("request to provider failed: {0}")]
    Transport(String),

    #[error("JSON parse error: {0}")]
    JsonError(String),

    #[error("unable to scale function [{function}], err: {reason}")]
    ScaleFailed { function: String, reason: String },

    #[error("function {function} not ready after {attempts} polls")]
    PollTimeout { function: String, attempts: u64 },

    #[error("{0}")]
    Abandoned(String),
}

impl From<JsonError> for ScalingError {
    fn from(err: JsonError) -> Self {
        ScalingError::JsonError(err.to_string())
    }
}

impl From<reqwest::Error> for ScalingError {
    fn from(err: reqwest::Error) -> Self {
        ScalingError::Transport(err.to_string())
    }
}

impl From<Abandoned> for ScalingError {
    fn from(err: Abandoned) -> Self {
        ScalingError::Abandoned(err.to_string())
    }
}

impl ScalingError {
    /// Provider was reachable but the function does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ScalingError::NotFound(_))
    }
}
