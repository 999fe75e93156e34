// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tagged error type shared by every conductor crate.
//!
//! Each error carries the operation that produced it (`op`), a coarse kind
//! used for control flow, and an optional source.  Wrapping preserves the
//! innermost kind so callers can match on `kind()` anywhere in the chain.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input or a violated precondition.
    Invalid,
    /// A missing row or an unknown tool.
    NotFound,
    /// Sandbox escape or a forbidden operation.
    NotAuthorized,
    /// Timeout, cancellation, or an unreachable collaborator.
    Unavailable,
    /// A hard limit was hit: max steps, context window.
    ResourceExhausted,
    /// Marshaling failures and unexpected I/O.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Invalid => "invalid",
            Self::NotFound => "not-found",
            Self::NotAuthorized => "not-authorized",
            Self::Unavailable => "unavailable",
            Self::ResourceExhausted => "resource-exhausted",
            Self::Internal => "internal",
        };
        f.write_str(tag)
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    op: &'static str,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(op: &'static str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            op,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        op: &'static str,
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            kind,
            op,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Wrap an error from a lower layer, preserving its kind.
    ///
    /// The wrapping op is prepended to the display chain, producing a trace
    /// like `runtime.run_inference: store.update_conversation: [not-found] …`.
    pub fn wrap(op: &'static str, err: Error) -> Self {
        Self {
            kind: err.kind,
            op,
            message: String::new(),
            source: Some(Box::new(err)),
        }
    }

    /// Wrap a foreign error as `internal`.
    pub fn internal(
        op: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            kind: ErrorKind::Internal,
            op,
            message: String::new(),
            source: Some(source.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn op(&self) -> &'static str {
        self.op
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        if !self.message.is_empty() {
            write!(f, ": [{}] {}", self.kind, self.message)?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_error_displays_op_kind_and_message() {
        let err = Error::new("mux.call_tool", ErrorKind::NotFound, "unknown tool: frobnicate");
        let text = err.to_string();
        assert!(text.contains("mux.call_tool"));
        assert!(text.contains("not-found"));
        assert!(text.contains("frobnicate"));
    }

    #[test]
    fn wrap_preserves_the_inner_kind() {
        let inner = Error::new("store.get_conversation", ErrorKind::NotFound, "no such row");
        let outer = Error::wrap("runtime.new_conversation_instance", inner);
        assert_eq!(outer.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn wrap_chains_operation_tags_in_display() {
        let inner = Error::new("shell.resolve", ErrorKind::NotAuthorized, "workdir escapes root");
        let outer = Error::wrap("mux.call_tool", inner);
        let text = outer.to_string();
        assert!(text.starts_with("mux.call_tool"));
        assert!(text.contains("shell.resolve"));
    }

    #[test]
    fn internal_wraps_foreign_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = Error::internal("hooks.run_hook", io);
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("pipe closed"));
    }

    #[test]
    fn source_chain_is_walkable() {
        let inner = Error::new("a", ErrorKind::Invalid, "root cause");
        let outer = Error::wrap("b", inner);
        let source = std::error::Error::source(&outer).expect("must have a source");
        assert!(source.to_string().contains("root cause"));
    }
}
