//! Error types and result definitions for the CDC engine.
//!
//! Provides a single error type with classification and captured diagnostic
//! metadata. The [`ErrorKind`] of a [`CdcError`] is what drives retry
//! decisions: the mapping to transient/fatal (connector) and
//! transient/permanent (publisher) classes lives in [`crate::policy`].

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for CDC operations using [`CdcError`] as the error
/// type.
pub type CdcResult<T> = Result<T, CdcError>;

/// Main error type for CDC operations.
///
/// Carries a classification [`ErrorKind`], a static description, optional
/// dynamic detail, an optional source error, and the callsite where it was
/// created.
#[derive(Debug, Clone)]
pub struct CdcError {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Specific categories of errors that can occur during CDC operations.
///
/// Kinds are organized by functional area; the grouping into transient and
/// non-transient classes is done by [`crate::policy`], not here.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Source connector errors
    SourceConnectionFailed,
    SourceIoError,
    SourceAuthenticationError,
    SourceSchemaError,
    SourceQueryFailed,

    // Broker publisher errors
    BrokerUnreachable,
    BrokerBackpressure,
    MessageRejected,
    InvalidTopic,

    // Configuration errors
    ConfigError,
    ValidationError,

    // Data errors
    SerializationError,
    ConversionError,

    // State and workflow errors
    InvalidState,
    CaptureWorkerPanic,

    // IO errors
    IoError,

    // Unknown / uncategorized
    Unknown,
}

impl CdcError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> &Backtrace {
        self.backtrace.as_ref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Attaches an originating [`error::Error`] to this error and returns the
    /// modified instance. The stored source is exposed via
    /// [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Creates a [`CdcError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        CdcError {
            kind,
            description,
            detail,
            source,
            location: Location::caller(),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }
}

impl PartialEq for CdcError {
    fn eq(&self, other: &CdcError) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Display for CdcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.kind,
            self.description,
            self.location.file(),
            self.location.line(),
            self.location.column()
        )?;

        if let Some(detail) = self.detail.as_deref() {
            write!(f, "\n  Detail: {detail}")?;
        }

        Ok(())
    }
}

impl error::Error for CdcError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

/// Creates a [`CdcError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for CdcError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> CdcError {
        CdcError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`CdcError`] from an error kind, static description, and dynamic
/// detail.
impl<D> From<(ErrorKind, &'static str, D)> for CdcError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> CdcError {
        CdcError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Converts [`std::io::Error`] to [`CdcError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for CdcError {
    #[track_caller]
    fn from(err: std::io::Error) -> CdcError {
        let detail = err.to_string();
        CdcError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`serde_json::Error`] to [`CdcError`] with
/// [`ErrorKind::SerializationError`].
impl From<serde_json::Error> for CdcError {
    #[track_caller]
    fn from(err: serde_json::Error) -> CdcError {
        let detail = err.to_string();
        CdcError::from_components(
            ErrorKind::SerializationError,
            Cow::Borrowed("JSON serialization failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`tokio_postgres::Error`] to [`CdcError`] with the appropriate
/// error kind.
///
/// Maps errors based on Postgres SQLSTATE codes so that connection-level
/// failures classify as transient while credential and schema problems
/// classify as fatal.
impl From<tokio_postgres::Error> for CdcError {
    #[track_caller]
    fn from(err: tokio_postgres::Error) -> CdcError {
        use tokio_postgres::error::SqlState;

        let (kind, description) = match err.code() {
            Some(sqlstate) => match *sqlstate {
                // Connection errors (08xxx) and resource exhaustion (53xxx)
                SqlState::CONNECTION_EXCEPTION
                | SqlState::CONNECTION_DOES_NOT_EXIST
                | SqlState::CONNECTION_FAILURE
                | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
                | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION
                | SqlState::TOO_MANY_CONNECTIONS
                | SqlState::CANNOT_CONNECT_NOW
                | SqlState::ADMIN_SHUTDOWN
                | SqlState::CRASH_SHUTDOWN => (
                    ErrorKind::SourceConnectionFailed,
                    "Postgres connection failed",
                ),

                // Authentication errors (28xxx)
                SqlState::INVALID_AUTHORIZATION_SPECIFICATION | SqlState::INVALID_PASSWORD => (
                    ErrorKind::SourceAuthenticationError,
                    "Postgres authentication failed",
                ),

                // Schema/object not found errors (42xxx)
                SqlState::UNDEFINED_TABLE
                | SqlState::UNDEFINED_COLUMN
                | SqlState::UNDEFINED_SCHEMA => (
                    ErrorKind::SourceSchemaError,
                    "Postgres schema object not found",
                ),

                // I/O and corruption errors
                SqlState::IO_ERROR | SqlState::DISK_FULL | SqlState::DATA_CORRUPTED => {
                    (ErrorKind::SourceIoError, "Postgres I/O error")
                }

                _ => (ErrorKind::SourceQueryFailed, "Postgres query failed"),
            },
            // No SQL state means the failure happened below the protocol,
            // which is a connection issue.
            None => (
                ErrorKind::SourceConnectionFailed,
                "Postgres connection failed",
            ),
        };

        let detail = err.to_string();
        CdcError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`reqwest::Error`] to [`CdcError`].
///
/// Transport-level failures (connect, timeout) map to
/// [`ErrorKind::BrokerUnreachable`]; response-status classification is done
/// by the webhook publisher, which sees the status code directly.
impl From<reqwest::Error> for CdcError {
    #[track_caller]
    fn from(err: reqwest::Error) -> CdcError {
        let kind = if err.is_builder() {
            ErrorKind::ConfigError
        } else {
            ErrorKind::BrokerUnreachable
        };

        let detail = err.to_string();
        CdcError::from_components(
            kind,
            Cow::Borrowed("Broker request failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
