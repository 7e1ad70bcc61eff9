//! Errors this crate can emit.
use crate::cid::PartCid;
use crate::receipt::Receipt;

use serde::Serialize;
use std::fmt::{self, Display, Formatter};

/// A specialized `Result` type for this crate.
pub type Result<T, E = Error> = ::std::result::Result<T, E>;

/// The value returned in this crate when an error occurs.
#[derive(Debug, Clone, thiserror::Error)]
#[error(transparent)]
pub struct Error(pub(crate) ErrorRepr);

impl Error {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match &self.0 {
            ErrorRepr::Cancelled => ErrorKind::Cancelled,
            ErrorRepr::BadFetch { .. } => ErrorKind::BadFetch,
            ErrorRepr::Register { .. } => ErrorKind::Register,
            ErrorRepr::Copy { .. } => ErrorKind::Copy,
            ErrorRepr::Protocol { .. } => ErrorKind::Protocol,
            ErrorRepr::Bind { .. } => ErrorKind::Bind,
            ErrorRepr::SomePartsFailed { .. } => ErrorKind::SomePartsFailed,
        }
    }

    pub(crate) fn cancelled() -> Self {
        Self(ErrorRepr::Cancelled)
    }

    pub(crate) fn bad_fetch(part: PartCid, message: impl Into<String>) -> Self {
        Self(ErrorRepr::BadFetch {
            part,
            message: message.into(),
        })
    }

    pub(crate) fn register(part: PartCid, message: impl Into<String>) -> Self {
        Self(ErrorRepr::Register {
            part,
            message: message.into(),
        })
    }

    pub(crate) fn copy(part: PartCid, status: Option<u16>, message: impl Into<String>) -> Self {
        Self(ErrorRepr::Copy {
            part,
            status,
            message: message.into(),
        })
    }

    pub(crate) fn protocol(part: PartCid, message: impl Into<String>) -> Self {
        Self(ErrorRepr::Protocol {
            part,
            message: message.into(),
        })
    }

    pub(crate) fn bind(message: impl Into<String>) -> Self {
        Self(ErrorRepr::Bind {
            message: message.into(),
        })
    }

    pub(crate) fn some_parts_failed(failed: usize, total: usize) -> Self {
        Self(ErrorRepr::SomePartsFailed { failed, total })
    }

    /// Render this error as the `{"name": ..., "message": ...}` shape used in
    /// the `cause` field of an outcome's JSON serialization.
    pub fn to_cause_json(&self) -> CauseJson {
        CauseJson::from(self)
    }
}

/// The category of the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A cancellation token fired while this item was in flight.
    Cancelled,
    /// The part fetcher returned a bad response (missing/invalid
    /// `content-length`, non-2xx status, or a transport failure).
    BadFetch,
    /// The `register-part` invocation's receipt was `Err`, or sending it
    /// failed.
    Register,
    /// The byte pass-through `PUT` to the destination's upload URL did not
    /// return a 2xx response.
    Copy,
    /// The `register-part` receipt's `Ok.status` was neither `done` nor
    /// `upload`.
    Protocol,
    /// The `register-upload` invocation's receipt was `Err`, or sending it
    /// failed.
    Bind,
    /// One or more parts of an upload failed; this is the aggregate cause on
    /// the upload-level outcome.
    SomePartsFailed,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cancelled => "cancelled",
            Self::BadFetch => "bad_fetch",
            Self::Register => "register",
            Self::Copy => "copy",
            Self::Protocol => "protocol",
            Self::Bind => "bind",
            Self::SomePartsFailed => "some_parts_failed",
        };
        write!(f, "{s}")
    }
}

/// Internal error representation, free to change at will.
#[derive(Debug, Clone, thiserror::Error)]
pub(crate) enum ErrorRepr {
    #[error("migration cancelled")]
    Cancelled,
    #[error("fetching part {part} failed: {message}")]
    BadFetch { part: PartCid, message: String },
    #[error("registering part {part} failed: {message}")]
    Register { part: PartCid, message: String },
    #[error("copying part {part} to destination failed: {message}")]
    Copy {
        part: PartCid,
        status: Option<u16>,
        message: String,
    },
    #[error("unexpected register-part status for part {part}: {message}")]
    Protocol { part: PartCid, message: String },
    #[error("binding upload failed: {message}")]
    Bind { message: String },
    #[error("{failed} of {total} parts failed")]
    SomePartsFailed { failed: usize, total: usize },
}

/// A failure cause carrying its originating receipt, when one exists.
///
/// Attached to a [`crate::model::PartFailure`] so that the outcome's JSON
/// serialization can surface both the error and the receipt (if the
/// destination did answer, just with an `Err` result).
#[derive(Debug, Clone)]
pub struct Cause {
    pub(crate) error: Error,
    pub(crate) receipt: Option<Receipt<serde_json::Value>>,
}

impl Cause {
    pub(crate) fn new(error: Error) -> Self {
        Self {
            error,
            receipt: None,
        }
    }

    pub(crate) fn with_receipt(error: Error, receipt: Receipt<serde_json::Value>) -> Self {
        Self {
            error,
            receipt: Some(receipt),
        }
    }

    /// The underlying error.
    pub fn error(&self) -> &Error {
        &self.error
    }
}

/// The JSON shape of a `cause` field: `{"name": ..., "message": ...}`, with
/// extra structured fields flattened in for some error kinds.
#[derive(Debug, Clone, Serialize)]
pub struct CauseJson {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl From<&Error> for CauseJson {
    fn from(value: &Error) -> Self {
        let (failed, total) = match &value.0 {
            ErrorRepr::SomePartsFailed { failed, total } => (Some(*failed), Some(*total)),
            _ => (None, None),
        };
        let status = match &value.0 {
            ErrorRepr::Copy { status, .. } => *status,
            _ => None,
        };
        Self {
            name: value.kind().to_string(),
            message: value.0.to_string(),
            failed,
            total,
            status,
        }
    }
}
