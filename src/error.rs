use std::fmt;

use thiserror::Error as ThisError;

/// Category of failure, independent of where it happened.
///
/// Syntax-class kinds come out of the token reader, the rest out of the
/// typed conversion layer. Programmer misuse (cursor arithmetic out of
/// range, attaching an already-parented node, contract downcast failure)
/// is not represented here: it panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
#[non_exhaustive]
pub enum ErrorKind {
    #[error("malformed input")]
    Syntax,
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("maximum depth exceeded")]
    DepthExceeded,
    #[error("trailing comma not allowed")]
    TrailingComma,
    #[error("comments not allowed")]
    CommentDisallowed,
    #[error("type mismatch")]
    TypeMismatch,
    #[error("missing required member")]
    MissingRequiredMember,
    #[error("unknown member")]
    UnknownMember,
    #[error("duplicate member")]
    DuplicateMember,
    #[error("operation not supported")]
    NotSupported,
    #[error("invalid number")]
    NumberFormat,
    #[error("unrecognized type discriminator")]
    UnrecognizedDiscriminator,
    #[error("i/o error")]
    Io,
}

/// Error raised by parsing, document access, or typed conversion.
///
/// Carries the byte offset into the input (when known) and the property
/// path of the value being processed (when the stack engine was active),
/// so a caller can reconstruct where in the data the failure occurred.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    offset: Option<usize>,
    path: Option<String>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            offset: None,
            path: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Byte offset into the input where the error was detected, if known.
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    /// Property path (`$.users[3].name` form) active when the error was
    /// raised, if the conversion engine was running.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub(crate) fn with_offset(mut self, offset: usize) -> Self {
        if self.offset.is_none() {
            self.offset = Some(offset);
        }
        self
    }

    /// Shift a buffer-relative offset to an absolute one. Used when a value
    /// was re-parsed out of a sub-slice of the input.
    pub(crate) fn rebased(mut self, base: usize) -> Self {
        self.offset = Some(base + self.offset.unwrap_or(0));
        self
    }

    pub(crate) fn with_path(mut self, path: impl Into<String>) -> Self {
        if self.path.is_none() {
            self.path = Some(path.into());
        }
        self
    }

    pub(crate) fn syntax(message: impl Into<String>, offset: usize) -> Self {
        Self::new(ErrorKind::Syntax, message).with_offset(offset)
    }

    pub(crate) fn unexpected_end(offset: usize) -> Self {
        Self::new(ErrorKind::UnexpectedEnd, "input ended inside a value").with_offset(offset)
    }

    pub(crate) fn depth_exceeded(max_depth: usize) -> Self {
        Self::new(
            ErrorKind::DepthExceeded,
            format!("nesting deeper than the configured maximum of {max_depth}"),
        )
    }

    pub(crate) fn trailing_comma(offset: usize) -> Self {
        Self::new(
            ErrorKind::TrailingComma,
            "trailing comma before a closing bracket",
        )
        .with_offset(offset)
    }

    pub(crate) fn comment_disallowed(offset: usize) -> Self {
        Self::new(
            ErrorKind::CommentDisallowed,
            "comment encountered while comments are disallowed",
        )
        .with_offset(offset)
    }

    pub(crate) fn type_mismatch(expected: &str, found: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::TypeMismatch,
            format!("expected {expected}, found {found}"),
        )
    }

    pub(crate) fn missing_required_member(type_name: &str, member: &str) -> Self {
        Self::new(
            ErrorKind::MissingRequiredMember,
            format!("member `{member}` of `{type_name}` is required but never appeared"),
        )
    }

    pub(crate) fn unknown_member(type_name: &str, member: &str) -> Self {
        Self::new(
            ErrorKind::UnknownMember,
            format!("`{type_name}` has no member named `{member}`"),
        )
    }

    pub(crate) fn duplicate_member(member: &str) -> Self {
        Self::new(
            ErrorKind::DuplicateMember,
            format!("member `{member}` appeared more than once"),
        )
    }

    pub(crate) fn not_supported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotSupported, message)
    }

    pub(crate) fn number_format(raw: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::NumberFormat,
            format!("`{raw}` is not representable in the target numeric type"),
        )
    }

    pub(crate) fn unrecognized_discriminator(type_name: &str, tag: &str) -> Self {
        Self::new(
            ErrorKind::UnrecognizedDiscriminator,
            format!("`{tag}` does not name a known variant of `{type_name}`"),
        )
    }

    pub(crate) fn io(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, err.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(path) = &self.path {
            write!(f, " at {path}")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " (byte {offset})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
