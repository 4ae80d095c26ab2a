//! Error types for sync runs.
//!
//! Every failure is a [`SyncError`] carrying an [`ErrorKind`]. Kinds are grouped into
//! the three stages of a run through [`ErrorKind::stage`]: configuration loading is fatal
//! for the run, while planning and execution failures are recorded per table-pair.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use tablesync_postgres::types::IdentifierError;

/// Convenient result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Stage of a run in which an error arose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStage {
    /// The spec set could not be loaded. Aborts the run before any table-pair starts.
    ConfigLoad,
    /// A spec could not be turned into a reconciliation plan. Fails only that table-pair.
    Planning,
    /// The target rejected the reconciliation. Fails only that table-pair.
    Execution,
}

impl fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorStage::ConfigLoad => f.write_str("config load"),
            ErrorStage::Planning => f.write_str("planning"),
            ErrorStage::Execution => f.write_str("execution"),
        }
    }
}

/// Specific categories of errors that can occur during a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration loading
    ConfigStoreUnreachable,
    MalformedSpec,
    DuplicateTargetTable,

    // Planning
    SourceIsTarget,

    // Execution
    TargetConnectionFailed,
    TargetQueryFailed,
    TargetTableMissing,
    TargetSchemaError,
    ConstraintViolation,
    ConversionError,
    LockTimeout,
    OperationCanceled,
    TransactionFailed,
    PermissionDenied,
    AuthenticationError,

    Unknown,

    #[cfg(feature = "failpoints")]
    FailpointTriggered,
}

impl ErrorKind {
    pub fn stage(&self) -> ErrorStage {
        match self {
            ErrorKind::ConfigStoreUnreachable
            | ErrorKind::MalformedSpec
            | ErrorKind::DuplicateTargetTable => ErrorStage::ConfigLoad,
            ErrorKind::SourceIsTarget => ErrorStage::Planning,
            _ => ErrorStage::Execution,
        }
    }
}

#[derive(Debug)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Backtrace,
}

/// Main error type of the engine.
///
/// Cheap to clone, the payload is shared.
#[derive(Debug, Clone)]
pub struct SyncError {
    payload: Arc<ErrorPayload>,
}

impl SyncError {
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        SyncError {
            payload: Arc::new(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Backtrace::capture(),
            }),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    pub fn stage(&self) -> ErrorStage {
        self.payload.kind.stage()
    }

    pub fn description(&self) -> &str {
        &self.payload.description
    }

    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.payload.backtrace
    }

    /// Attaches the originating error, exposed through [`error::Error::source`].
    ///
    /// Only takes effect while the error has not been cloned yet.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let Some(payload) = Arc::get_mut(&mut self.payload) {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// One-line rendering without location or backtrace, used for outcome records.
    pub fn summary(&self) -> String {
        match self.detail() {
            Some(detail) => format!("[{:?}] {}: {}", self.kind(), self.description(), detail),
            None => format!("[{:?}] {}", self.kind(), self.description()),
        }
    }
}

impl PartialEq for SyncError {
    fn eq(&self, other: &SyncError) -> bool {
        self.kind() == other.kind()
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = self.payload.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.payload.kind,
            self.payload.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        if let Some(detail) = self.detail() {
            for (index, line) in detail.lines().enumerate() {
                if index == 0 {
                    write!(f, "\n  Detail: {line}")?;
                } else {
                    write!(f, "\n    {line}")?;
                }
            }
        }

        Ok(())
    }
}

impl error::Error for SyncError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

impl From<(ErrorKind, &'static str)> for SyncError {
    #[track_caller]
    fn from((kind, description): (ErrorKind, &'static str)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(description), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for SyncError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, description, detail): (ErrorKind, &'static str, D)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(description), Some(detail.into()), None)
    }
}

impl From<IdentifierError> for SyncError {
    #[track_caller]
    fn from(err: IdentifierError) -> SyncError {
        let detail = err.to_string();
        SyncError::from_components(
            ErrorKind::MalformedSpec,
            Cow::Borrowed("Invalid identifier in sync spec"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`sqlx::Error`] into a [`SyncError`], classifying database errors by SQLSTATE.
impl From<sqlx::Error> for SyncError {
    #[track_caller]
    fn from(err: sqlx::Error) -> SyncError {
        let (kind, description) = match &err {
            sqlx::Error::Database(db_err) => {
                classify_sqlstate(db_err.code().as_deref().unwrap_or_default())
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => (
                ErrorKind::TargetConnectionFailed,
                "Postgres connection failed",
            ),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => (
                ErrorKind::ConversionError,
                "Postgres value decoding failed",
            ),
            sqlx::Error::ColumnNotFound(_) | sqlx::Error::TypeNotFound { .. } => (
                ErrorKind::TargetSchemaError,
                "Postgres result did not match the expected shape",
            ),
            _ => (ErrorKind::Unknown, "Postgres operation failed"),
        };

        let detail = err.to_string();
        SyncError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps a Postgres SQLSTATE code to an error kind and description.
fn classify_sqlstate(code: &str) -> (ErrorKind, &'static str) {
    match code {
        "42P01" => (ErrorKind::TargetTableMissing, "Postgres table does not exist"),
        "42703" | "42804" | "42P10" => (
            ErrorKind::TargetSchemaError,
            "Postgres column missing or mismatched",
        ),
        "42501" => (ErrorKind::PermissionDenied, "Postgres permission denied"),
        "55P03" => (ErrorKind::LockTimeout, "Postgres lock not available"),
        "57014" => (ErrorKind::OperationCanceled, "Postgres statement canceled"),
        "40001" | "40P01" => (
            ErrorKind::TransactionFailed,
            "Postgres transaction rolled back",
        ),
        code if code.starts_with("23") => (
            ErrorKind::ConstraintViolation,
            "Postgres constraint violation",
        ),
        code if code.starts_with("22") => (
            ErrorKind::ConversionError,
            "Postgres data conversion failed",
        ),
        code if code.starts_with("28") => (
            ErrorKind::AuthenticationError,
            "Postgres authentication failed",
        ),
        code if code.starts_with("08") || code.starts_with("53") || code.starts_with("57P") => (
            ErrorKind::TargetConnectionFailed,
            "Postgres connection failed",
        ),
        _ => (ErrorKind::TargetQueryFailed, "Postgres statement failed"),
    }
}
