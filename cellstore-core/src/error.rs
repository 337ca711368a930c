//! Error types for store construction, reads, writes and actions.

use thiserror::Error;

use crate::graph::FieldKind;

/// Boxed error raised by a user-supplied getter or action.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while building or using a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A derived field was re-entered while it was already being computed.
    #[error("cyclic dependency while computing `{field}`: {}", path.join(" -> "))]
    CyclicDependency {
        /// The field whose re-entry was detected
        field: String,
        /// Fields on the evaluation stack, outermost first, ending at `field`
        path: Vec<String>,
    },

    /// An action (or batch write) targeted a key that is not a base field.
    #[error("`{origin}` targeted `{key}`, which is not a base field")]
    InvalidActionTarget {
        /// The action or operation that produced the update
        origin: String,
        /// The offending key
        key: String,
    },

    /// The key is not declared on the store.
    #[error("unknown field `{0}`")]
    UnknownField(String),

    /// The operation does not apply to this kind of field.
    #[error("field `{field}` is declared as {actual}, expected {expected}")]
    WrongKind {
        /// The field key
        field: String,
        /// Kind required by the operation
        expected: FieldKind,
        /// Kind the field was declared with
        actual: FieldKind,
    },

    /// The same key was declared twice in one definition.
    #[error("duplicate field `{0}` in store definition")]
    DuplicateField(String),

    /// The definition has more fields than a `FieldId` can address.
    #[error("store definition has {0} fields, at most {max} are supported", max = u32::MAX)]
    TooManyFields(usize),

    /// An action was invoked with the wrong number of arguments.
    #[error("action `{action}` expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        /// The action key
        action: String,
        /// Declared arity
        expected: usize,
        /// Number of arguments passed
        actual: usize,
    },

    /// A bridge accessor was used before its store was built, or after it was dropped.
    #[error("store accessor is not attached to a live store")]
    Detached,

    /// A field value could not be converted to the requested type.
    #[error("field `{field}` could not be decoded: {source}")]
    Decode {
        /// The field key
        field: String,
        /// Conversion failure
        source: serde_json::Error,
    },

    /// A JSON document (options or snapshot) could not be parsed or produced.
    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure raised by a user getter or action, passed through as-is.
    #[error("{0}")]
    User(BoxError),
}

impl StoreError {
    /// Wrap an error raised by user code.
    pub fn user<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        StoreError::User(error.into())
    }

    /// The user error carried by this value, if any.
    pub fn user_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            StoreError::User(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }

    /// Returns true for cyclic dependency failures.
    pub fn is_cycle(&self) -> bool {
        matches!(self, StoreError::CyclicDependency { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
