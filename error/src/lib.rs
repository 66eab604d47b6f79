//! Underlying error types used over the whole framework.
//!
//! Success is expressed as `Ok(())`; every failure carries an [`ErrorKind`]
//! classifying it and a human-readable reason. Reasons are stored as
//! `Cow<'static, str>` so that code on the real-time path can raise errors
//! from static strings without allocating.

use std::borrow::Cow;

use derive_more::Display;
use thiserror::Error;

/// A list specifying the categories of framework errors.
///
/// It is used with the [`Error`] struct; the discriminants map one-to-one to
/// the return codes surfaced through message replies.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The operation could not be completed; state is left consistent.
    Fatal,

    /// A caller-supplied argument is invalid.
    Parameters,

    /// The addressed entity was not found.
    UnsupportedFeature,

    /// A bounded wait expired.
    Timeout,

    /// Message protocol misuse.
    Communication,

    /// An operating-system primitive failed.
    Os,

    /// The configuration is inconsistent at setup.
    Initialisation,
}

/// The framework error type: a kind plus a reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {reason}")]
pub struct Error {
    kind: ErrorKind,
    reason: Cow<'static, str>,
}

/// Alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates an error of the given kind.
    pub fn new<R>(kind: ErrorKind, reason: R) -> Self
    where
        R: Into<Cow<'static, str>>,
    {
        Error {
            kind,
            reason: reason.into(),
        }
    }

    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Shorthand for an [`ErrorKind::Fatal`] error.
    pub fn fatal<R: Into<Cow<'static, str>>>(reason: R) -> Self {
        Self::new(ErrorKind::Fatal, reason)
    }

    /// Shorthand for an [`ErrorKind::Parameters`] error.
    pub fn parameters<R: Into<Cow<'static, str>>>(reason: R) -> Self {
        Self::new(ErrorKind::Parameters, reason)
    }

    /// Shorthand for an [`ErrorKind::UnsupportedFeature`] error.
    pub fn unsupported<R: Into<Cow<'static, str>>>(reason: R) -> Self {
        Self::new(ErrorKind::UnsupportedFeature, reason)
    }

    /// Shorthand for an [`ErrorKind::Timeout`] error.
    pub fn timeout<R: Into<Cow<'static, str>>>(reason: R) -> Self {
        Self::new(ErrorKind::Timeout, reason)
    }

    /// Shorthand for an [`ErrorKind::Communication`] error.
    pub fn communication<R: Into<Cow<'static, str>>>(reason: R) -> Self {
        Self::new(ErrorKind::Communication, reason)
    }

    /// Shorthand for an [`ErrorKind::Os`] error.
    pub fn os<R: Into<Cow<'static, str>>>(reason: R) -> Self {
        Self::new(ErrorKind::Os, reason)
    }

    /// Shorthand for an [`ErrorKind::Initialisation`] error.
    pub fn initialisation<R: Into<Cow<'static, str>>>(reason: R) -> Self {
        Self::new(ErrorKind::Initialisation, reason)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            reason: Cow::Borrowed(""),
        }
    }
}
