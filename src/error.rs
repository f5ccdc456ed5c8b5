//! Error taxonomy and non-fatal diagnostics.
//!
//! Hard errors stop the document they occur in. Everything else degrades the
//! rendered output and is recorded as a [`Diagnostic`].

use std::fmt;

use crate::ast::BlockKind;

/// Expression syntax errors and structural block errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected character {found:?} at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("expected {expected}, got {found}")]
    Unexpected { expected: String, found: String },

    #[error("unclosed {kind} block opened by {header:?}")]
    UnclosedBlock { kind: BlockKind, header: String },

    #[error("end{found} closes a {open} block opened by {header:?}")]
    MismatchedClose {
        open: BlockKind,
        found: BlockKind,
        header: String,
    },
}

/// Expression evaluation failures. The renderer never propagates these.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("syntax error: {0}")]
    Syntax(#[from] ParseError),

    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,
}

/// Failure of the content source collaborator.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("path escapes the content root: {0}")]
    OutsideRoot(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of one document in the include tree.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to fetch {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: FetchError,
    },

    #[error("structural error in {path}: {source}")]
    Structure {
        path: String,
        #[source]
        source: ParseError,
    },

    #[error("include cycle: {}", chain.join(" -> "))]
    IncludeCycle { chain: Vec<String> },

    #[error("include depth limit {limit} exceeded at {path}")]
    DepthExceeded { path: String, limit: usize },

    #[error("invalid include directive {0:?}")]
    InvalidInclude(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// An expression could not be evaluated; the directive rendered empty.
    Evaluation,
    /// An `endfor`/`endif` without an open block was ignored.
    UnmatchedClose,
    /// A `for` header was not `name in expr`; its block was dropped.
    MalformedBlock,
    /// A `for` block iterated over something that is not a sequence or count.
    UnsupportedIterable,
    /// A nested include failed and was spliced as empty text.
    Include,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::Evaluation => "evaluation",
            DiagnosticKind::UnmatchedClose => "unmatched-close",
            DiagnosticKind::MalformedBlock => "malformed-block",
            DiagnosticKind::UnsupportedIterable => "unsupported-iterable",
            DiagnosticKind::Include => "include",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Collected non-fatal diagnostics for one render call.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic and emit it as a warning.
    pub fn push(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%kind, "{}", message);
        self.entries.push(Diagnostic { kind, message });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
