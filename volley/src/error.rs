use std::time::Duration;

use thiserror::Error;

/// Invalid run setup. Raised before any virtual user starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("virtual_users must be greater than 0")]
    NoVirtualUsers,
    #[error("check `{0}` is registered more than once")]
    DuplicateCheck(String),
    #[error("invalid url template `{template}`: {reason}")]
    Template { template: String, reason: String },
    #[error("error parsing env var {name}: {reason}")]
    Env { name: String, reason: String },
}

/// Failure to get a response for a single request.
///
/// Recovered locally by the virtual user: the iteration is recorded with every
/// check failed and the loop carries on.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timed out waiting for response after {0:?}")]
    Timeout(Duration),
    /// A timeout configured on the underlying client fired; its length is not known here.
    #[error("timed out waiting for response")]
    ClientTimeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("transport panicked while sending the request")]
    Panicked,
    #[error("{0}")]
    Other(String),
}

/// A predicate could not be evaluated. Only the check that raised it fails.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{0}")]
    Failed(String),
    #[error("invalid json body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("check panicked")]
    Panicked,
}

/// The parameter strategy could not produce a value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("empty integer range [{min}, {max}]")]
    EmptyRange { min: i64, max: i64 },
    #[error("cannot choose from an empty set")]
    EmptyChoice,
    #[error("scripted parameters exhausted")]
    Exhausted,
    #[error("no value supplied for placeholder `{0}`")]
    UnknownPlaceholder(String),
}

/// Errors returned by the run entry points.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build runtime: {0}")]
    Runtime(#[from] std::io::Error),
}
