// ============================================================================
// spark-dom - Errors
// Failures at the smallest scope: one element operation, one config key
// ============================================================================
//
// None of these escape `Conditions::when_state` / `Conditions::apply`: the
// orchestrator turns them into `[Component]`-prefixed log lines and moves on
// to the next key or element.
// ============================================================================

use thiserror::Error;

/// A failed operation on one element.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("invalid attribute name: {name:?}")]
    InvalidAttributeName { name: String },

    #[error("element <{tag}> has no method {method:?}")]
    MissingMethod { tag: String, method: String },

    #[error("property {name:?} rejected value: {reason}")]
    PropertyRejected { name: String, reason: String },

    #[error("{message}")]
    Other { message: String },
}

impl DomError {
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// One configuration key that could not be applied to one element.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("{handler}: expected {expected} for key {key:?}, got {found}")]
    InvalidValue {
        handler: String,
        key: String,
        expected: &'static str,
        found: String,
    },

    #[error("no handler accepts key {key:?}")]
    Unhandled { key: String },

    #[error("element operation failed: {0}")]
    Dom(#[from] DomError),
}

impl ApplyError {
    #[must_use]
    pub fn invalid(
        handler: impl Into<String>,
        key: impl Into<String>,
        expected: &'static str,
        found: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidValue {
            handler: handler.into(),
            key: key.into(),
            expected,
            found: found.to_string(),
        }
    }
}

/// A condition table or configuration object with the wrong shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("condition table must be an object, got {found}")]
    TableNotObject { found: String },

    #[error("condition {condition:?} must map to an object, got {found}")]
    BranchNotObject { condition: String, found: String },

    #[error("configuration must be an object, got {found}")]
    ConfigNotObject { found: String },

    #[error("index key {key:?} must map to an object, got {found}")]
    IndexNotObject { key: String, found: String },

    #[error("selector is empty")]
    EmptySelector,

    #[error("no element resolver configured for selector {selector:?}")]
    NoResolver { selector: String },
}

/// A value getter that could not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("value source failed: {message}")]
    Failed { message: String },
}

impl SourceError {
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}
