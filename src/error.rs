//! Typed errors for each layer, and the top-level error returned by the engines.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("model {model} has an empty kind name")]
    EmptyName { model: String },
    #[error("model {model} declares no fields")]
    NoFields { model: String },
    #[error("invalid tag '{tag}' on field {field}: {reason}")]
    InvalidTag { field: String, tag: String, reason: String },
    #[error("unknown tag option '{option}' on field {field}")]
    UnknownOption { field: String, option: String },
    #[error("duplicate field name '{0}'")]
    DuplicateField(String),
    #[error("duplicate primary key: {first} and {second}")]
    DuplicatePrimaryKey { first: String, second: String },
    #[error("primary key {field} must be a string, found {found}")]
    PrimaryKeyNotString { field: String, found: String },
}

/// Failures reported by a [`crate::store::Store`] collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: String, name: String },
    #[error("conflict on {kind} '{name}': {message}")]
    Conflict { kind: String, name: String, message: String },
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        StoreError::NotFound { kind: kind.into(), name: name.into() }
    }

    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        StoreError::AlreadyExists { kind: kind.into(), name: name.into() }
    }

    pub fn conflict(kind: impl Into<String>, name: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Conflict { kind: kind.into(), name: name.into(), message: message.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("page must be greater than or equal to 0, got {0}")]
    Page(i64),
    #[error("limit must be between 0 and 1000, got {0}")]
    Limit(i64),
    #[error("invalid filter on '{field}': {reason}")]
    Filter { field: String, reason: String },
    #[error("invalid selector '{input}': {reason}")]
    Selector { input: String, reason: String },
    #[error("invalid query string: {0}")]
    Parse(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("timed out after {waited:?} waiting for {pending:?} to be served")]
    Timeout { waited: Duration, pending: Vec<String> },
    #[error("cancelled while waiting for resource definitions")]
    Cancelled,
}

/// Migration phase a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    GenerateDefinitions,
    InstallDefinitions,
    EnsureDefinitions,
    ApplyAccessControl,
    DeleteDefinitions,
    DeleteAccessControl,
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MigrationStep::GenerateDefinitions => "generate resource definitions",
            MigrationStep::InstallDefinitions => "install resource definitions",
            MigrationStep::EnsureDefinitions => "ensure resource definitions",
            MigrationStep::ApplyAccessControl => "apply access control",
            MigrationStep::DeleteDefinitions => "delete resource definitions",
            MigrationStep::DeleteAccessControl => "delete access control",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum CrdbError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Readiness(#[from] ReadinessError),
    #[error("unable to {op} {target}: {source}")]
    Store {
        op: &'static str,
        target: String,
        #[source]
        source: StoreError,
    },
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },
    #[error("model {0} cannot be converted to a resource definition")]
    InvalidModel(String),
    #[error("mapping: {0}")]
    Mapping(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("mutate function cannot change object identity: expected {expected}, got {actual}")]
    MutateContract { expected: String, actual: String },
    #[error("unable to {step}: {source}")]
    Migration {
        step: MigrationStep,
        #[source]
        source: Box<CrdbError>,
    },
}

impl CrdbError {
    pub fn store(op: &'static str, target: impl Into<String>, source: StoreError) -> Self {
        CrdbError::Store { op, target: target.into(), source }
    }

    pub fn in_step(self, step: MigrationStep) -> Self {
        CrdbError::Migration { step, source: Box::new(self) }
    }

    /// The innermost store failure, looking through migration wrapping.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            CrdbError::Store { source, .. } => Some(source),
            CrdbError::Migration { source, .. } => source.store_error(),
            _ => None,
        }
    }

    /// The readiness failure, looking through migration wrapping.
    pub fn readiness_error(&self) -> Option<&ReadinessError> {
        match self {
            CrdbError::Readiness(e) => Some(e),
            CrdbError::Migration { source, .. } => source.readiness_error(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CrdbError::NotFound { .. }) || self.store_error().is_some_and(StoreError::is_not_found)
    }

    pub fn is_conflict(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_conflict)
    }

    pub fn is_already_exists(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_already_exists)
    }
}
