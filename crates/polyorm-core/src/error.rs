use std::error::Error as StdError;
use thiserror::Error as ThisError;

///
/// SearchError
///
/// Filter compilation failures. Always raised before any backend call is
/// made; never retried, since they indicate a caller bug.
///

#[derive(Debug, ThisError)]
pub enum SearchError {
    #[error("approximate-match filters are not supported by any backend")]
    ApproximateMatchUnsupported,

    #[error("unknown column '{attribute}' in table or child table of '{table}'")]
    UnknownColumn { attribute: String, table: String },

    #[error("cannot parse raw filter '{raw}': {reason}")]
    MalformedRaw { raw: String, reason: String },

    #[error("filter node references no attribute")]
    MissingAttribute,

    #[error("sub-filter applied to non-composite attribute '{attribute}'")]
    InvalidSubFilter { attribute: String },

    #[error("filter is empty")]
    EmptyFilter,

    #[error("no object class selects a storage table")]
    MissingObjectClass,
}

///
/// DriverError
///
/// Opaque fault reported by a backend driver. Wrapped with key/expression
/// context before it reaches a caller.
///

#[derive(Debug, ThisError)]
#[error("backend driver fault: {0}")]
pub struct DriverError(pub String);

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

///
/// OperationError
///
/// Failures at the operation-service boundary. The entry manager translates
/// these into the caller-facing taxonomy below, attaching the key and the
/// compiled expression where available.
///

#[derive(Debug, ThisError)]
pub enum OperationError {
    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("duplicate entry '{0}'")]
    Duplicate(String),

    #[error("entry '{0}' not found")]
    NotFound(String),

    #[error("{0}")]
    Unsupported(String),
}

///
/// EntryPersistenceError
///
/// Failure materializing, finding, or exporting an entry. Carries the key
/// and, where applicable, the compiled expression for diagnosability.
///

#[derive(Debug, ThisError)]
#[error("entry persistence failed for key '{key}': {message}")]
pub struct EntryPersistenceError {
    pub key: String,
    pub expression: Option<String>,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl EntryPersistenceError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            expression: None,
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

///
/// EntryDeleteError
///

#[derive(Debug, ThisError)]
#[error("failed to delete entry '{key}'")]
pub struct EntryDeleteError {
    pub key: String,
    pub object_classes: Vec<String>,
    #[source]
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl EntryDeleteError {
    pub fn new(key: impl Into<String>, object_classes: &[String]) -> Self {
        Self {
            key: key.into(),
            object_classes: object_classes.to_vec(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

///
/// MappingError
///
/// Structural precondition violated before any backend work starts.
///

#[derive(Debug, ThisError)]
pub enum MappingError {
    #[error("base key is empty")]
    MissingBaseKey,

    #[error("object classes are required for this operation")]
    MissingObjectClasses,

    #[error("malformed key '{key}': {reason}")]
    MalformedKey { key: String, reason: String },

    #[error("entity conversion failed: {0}")]
    Conversion(String),
}

///
/// UnsupportedOperationError
///

#[derive(Debug, ThisError)]
pub enum UnsupportedOperationError {
    #[error("replacing the type discriminator is not supported by this backend")]
    DiscriminatorReplacement,

    #[error("dynamic schema modifications are not supported")]
    DynamicSchema,

    #[error("unmodeled modification type: {0}")]
    UnknownModification(String),

    #[error("{0}")]
    Other(String),
}

///
/// AuthenticationError
///
/// Credential resolution/verification fault. The message carries the key
/// only; the candidate credential is never captured.
///

#[derive(Debug, ThisError)]
#[error("failed to authenticate entry '{key}'")]
pub struct AuthenticationError {
    pub key: String,
    #[source]
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl AuthenticationError {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

///
/// PersistenceError
///
/// Caller-facing error surface of the entry manager.
///

#[derive(Debug, ThisError)]
pub enum PersistenceError {
    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("entry '{key}' not found")]
    EntryNotFound { key: String },

    #[error(transparent)]
    Persistence(#[from] EntryPersistenceError),

    #[error(transparent)]
    Delete(#[from] EntryDeleteError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedOperationError),

    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
}

impl PersistenceError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::EntryNotFound { .. })
    }
}
