//! Diagnostic error type shared by every part of the bank file library.
//!
//! A [`Diagnostic`] carries a fixed [`ErrorKind`] tag, a message set where it
//! was raised, the source location of that site and an ordered list of
//! comments appended by callers as the error travels up the stack. A staged
//! comment can be built incrementally with `write!` before it is committed.

use std::fmt::{self, Write as _};
use std::io;
use std::panic::Location;
use std::sync::Arc;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Diagnostic>;

/// Category of a [`Diagnostic`]. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad channel, sample, telescope slot or packet index.
    IndexOutOfBounds,
    /// `get` on a bank the packet does not hold.
    BankNotPresent,
    /// A record was serialized before all required slots were filled.
    IncompleteRecord,
    /// Open, read or write failure.
    FileIo,
    /// Checksum mismatch, malformed structure or failed decompression.
    Corruption,
    /// Malformed arguments or configuration.
    Usage,
}

impl ErrorKind {
    /// Stable name printed as the diagnostic type.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::IndexOutOfBounds => "IndexOutOfBounds",
            ErrorKind::BankNotPresent => "BankNotPresent",
            ErrorKind::IncompleteRecord => "IncompleteRecord",
            ErrorKind::FileIo => "FileIO",
            ErrorKind::Corruption => "Corruption",
            ErrorKind::Usage => "Usage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Structured, accumulating error.
#[derive(Debug, Error)]
#[error("{}", render_total(.kind, .message, .location, .comments, .staged))]
pub struct Diagnostic {
    kind: ErrorKind,
    message: String,
    location: Option<&'static Location<'static>>,
    comments: Vec<String>,
    staged: String,
    #[source]
    cause: Option<Arc<io::Error>>,
}

fn render_total(
    kind: &ErrorKind,
    message: &str,
    location: &Option<&'static Location<'static>>,
    comments: &[String],
    staged: &str,
) -> String {
    let mut out = kind.name().to_string();
    if !message.is_empty() {
        let _ = write!(out, ": {message}");
    }
    if let Some(loc) = location {
        let _ = write!(out, ": thrown in {} on line {}", loc.file(), loc.line());
    }
    for comment in comments {
        let _ = write!(out, ": {comment}");
    }
    if !staged.is_empty() {
        let _ = write!(out, ": {staged}");
    }
    out
}

impl Diagnostic {
    /// New diagnostic; the caller's source location becomes the throw site.
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: Some(Location::caller()),
            comments: Vec::new(),
            staged: String::new(),
            cause: None,
        }
    }

    /// New diagnostic without a throw site.
    pub fn unlocated(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            comments: Vec::new(),
            staged: String::new(),
            cause: None,
        }
    }

    #[track_caller]
    pub fn index_out_of_bounds(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IndexOutOfBounds, message)
    }

    #[track_caller]
    pub fn bank_not_present(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BankNotPresent, message)
    }

    #[track_caller]
    pub fn incomplete_record(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IncompleteRecord, message)
    }

    #[track_caller]
    pub fn file_io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FileIo, message)
    }

    #[track_caller]
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Corruption, message)
    }

    #[track_caller]
    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Usage, message)
    }

    /// Bounds check helper: `IndexOutOfBounds` unless `index < len`.
    #[track_caller]
    pub(crate) fn check_index(what: &str, index: usize, len: usize) -> Result<()> {
        if index < len {
            Ok(())
        } else {
            Err(Self::index_out_of_bounds(format!(
                "{what} index {index} out of range (size {len})"
            )))
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Throw site, if one was recorded.
    #[must_use]
    pub fn location(&self) -> Option<&'static Location<'static>> {
        self.location
    }

    /// Overwrite the throw site (used when re-raising from a helper).
    pub fn set_location(&mut self, location: &'static Location<'static>) {
        self.location = Some(location);
    }

    /// Committed comments followed by the staged comment, if any.
    #[must_use]
    pub fn comments(&self) -> Vec<String> {
        let mut out = self.comments.clone();
        if !self.staged.is_empty() {
            out.push(self.staged.clone());
        }
        out
    }

    /// Commit the staged comment into the log. Empty staged text is dropped.
    pub fn commit_comment(&mut self) {
        if !self.staged.is_empty() {
            self.comments.push(std::mem::take(&mut self.staged));
        }
    }

    /// Append a complete comment. Any staged text is committed first.
    pub fn add_comment(&mut self, comment: impl Into<String>) {
        self.commit_comment();
        self.comments.push(comment.into());
    }

    /// Builder form of [`Diagnostic::add_comment`].
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.add_comment(comment);
        self
    }

    /// Multi-line rendering for top-level handlers.
    #[must_use]
    pub fn report(&self) -> String {
        let mut out = format!("Exception: {}: {}\n", self.kind, self.message);
        if let Some(loc) = self.location {
            let _ = writeln!(out, "Code location: {}:{}", loc.file(), loc.line());
        }
        if let Some(cause) = &self.cause {
            let _ = writeln!(out, "Caused by: {cause}");
        }
        for comment in self.comments() {
            let _ = writeln!(out, "{comment}");
        }
        out
    }

    fn with_cause(mut self, cause: io::Error) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }
}

/// Copies hold the staged comment as a committed one.
impl Clone for Diagnostic {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            location: self.location,
            comments: self.comments(),
            staged: String::new(),
            cause: self.cause.clone(),
        }
    }
}

/// Writes go to the staged comment.
impl fmt::Write for Diagnostic {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.staged.push_str(s);
        Ok(())
    }
}

impl From<io::Error> for Diagnostic {
    #[track_caller]
    fn from(err: io::Error) -> Self {
        let kind = if err.kind() == io::ErrorKind::UnexpectedEof {
            ErrorKind::Corruption
        } else {
            ErrorKind::FileIo
        };
        Self::new(kind, err.to_string()).with_cause(err)
    }
}

/// Breadcrumbs for errors propagated with `?`.
pub trait ResultExt<T> {
    /// Append `comment` to the diagnostic on the error path.
    fn comment(self, comment: &str) -> Result<T>;

    /// Append a lazily built comment on the error path.
    fn with_comment<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: Into<Diagnostic>> ResultExt<T> for std::result::Result<T, E> {
    fn comment(self, comment: &str) -> Result<T> {
        self.map_err(|e| e.into().with_comment(comment))
    }

    fn with_comment<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.into().with_comment(f()))
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write;

    use super::*;

    #[test]
    fn comments_keep_insertion_order_with_staged_last() {
        let mut diag = Diagnostic::corruption("bad trailer");
        diag.add_comment("first");
        diag.add_comment("second");
        write!(diag, "while reading packet {}", 7).unwrap();
        assert_eq!(
            diag.comments(),
            vec!["first", "second", "while reading packet 7"]
        );
    }

    #[test]
    fn add_comment_commits_staged_text_first() {
        let mut diag = Diagnostic::usage("x");
        write!(diag, "partial").unwrap();
        write!(diag, " text").unwrap();
        diag.add_comment("after");
        assert_eq!(diag.comments(), vec!["partial text", "after"]);
    }

    #[test]
    fn clone_commits_staged_comment() {
        let mut diag = Diagnostic::file_io("disk full");
        write!(diag, "staged").unwrap();
        let copy = diag.clone();
        assert_eq!(copy.comments(), vec!["staged"]);
        assert_eq!(copy.kind(), ErrorKind::FileIo);
        let mut copy = copy;
        copy.add_comment("later");
        assert_eq!(copy.comments(), vec!["staged", "later"]);
    }

    #[test]
    fn track_caller_records_throw_site() {
        let diag = Diagnostic::index_out_of_bounds("channel 9");
        let loc = diag.location().unwrap();
        assert!(loc.file().ends_with("error.rs"));
        assert!(Diagnostic::unlocated(ErrorKind::Usage, "x").location().is_none());
    }

    #[test]
    fn display_renders_total_and_report_is_multiline() {
        let mut diag = Diagnostic::unlocated(ErrorKind::Corruption, "checksum mismatch");
        diag.add_comment("In verify_checksum");
        assert_eq!(
            diag.to_string(),
            "Corruption: checksum mismatch: In verify_checksum"
        );
        let report = diag.report();
        assert!(report.starts_with("Exception: Corruption: checksum mismatch\n"));
        assert!(report.ends_with("In verify_checksum\n"));
    }

    #[test]
    fn io_errors_map_to_file_io_or_corruption() {
        let diag: Diagnostic = io::Error::new(io::ErrorKind::NotFound, "nope").into();
        assert_eq!(diag.kind(), ErrorKind::FileIo);
        assert!(std::error::Error::source(&diag).is_some());
        let diag: Diagnostic = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert_eq!(diag.kind(), ErrorKind::Corruption);
    }

    #[test]
    fn result_ext_appends_breadcrumbs() {
        let res: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        let err = res
            .comment("opening run file")
            .with_comment(|| format!("run {}", 400))
            .unwrap_err();
        assert_eq!(err.comments(), vec!["opening run file", "run 400"]);
    }
}
