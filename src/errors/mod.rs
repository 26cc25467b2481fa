use std::cell::RefCell;
use std::{fmt, io};

use colored::*;

use crate::span::Source;

pub type AsterResult<T = ()> = Result<T, AsterError>;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AsterErrorKind {
    Type,
    BrokenProtocol,
    Internal,
    IO,
    Unknown,
}

impl fmt::Display for AsterErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AsterErrorKind::Type => "type error",
                AsterErrorKind::BrokenProtocol => "broken protocol",
                AsterErrorKind::Internal => "internal error",
                AsterErrorKind::IO => "i/o error",
                AsterErrorKind::Unknown => "unknown error",
            }
        )
    }
}

#[derive(Clone, Debug)]
pub struct AsterError {
    pub msg: String,
    pub src: Vec<Source>,
    pub kind: AsterErrorKind,
}

impl AsterError {
    pub fn new<S: ToString>(kind: AsterErrorKind, msg: S, src: Source) -> AsterError {
        AsterError {
            msg: msg.to_string(),
            src: vec![src],
            kind,
        }
    }

    pub fn emit(self) {
        let kind = format!("{}:", self.kind);
        eprintln!("{} {}", kind.bold().red(), self.msg.bold());
        for src in self.src {
            eprintln!(" {} {}", "-->".bold(), src);
        }
        eprintln!()
    }
}

impl fmt::Display for AsterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.msg)
    }
}

impl From<AsterError> for Vec<AsterError> {
    fn from(err: AsterError) -> Vec<AsterError> {
        vec![err]
    }
}

impl From<io::Error> for AsterError {
    fn from(err: io::Error) -> AsterError {
        AsterError {
            msg: err.to_string(),
            src: vec![],
            kind: AsterErrorKind::IO,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Severity::Error => "error",
                Severity::Warning => "warning",
            }
        )
    }
}

/// A single user-facing diagnostic collected during solution application.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub msg: String,
    pub src: Source,
}

impl Diagnostic {
    pub fn emit(&self) {
        let prefix = format!("{}:", self.severity);
        let prefix = match self.severity {
            Severity::Error => prefix.bold().red(),
            Severity::Warning => prefix.bold().yellow(),
        };
        eprintln!("{} {}", prefix, self.msg.bold());
        eprintln!(" {} {}", "-->".bold(), self.src);
        eprintln!()
    }
}

/// Sink for the diagnostics produced while applying a solution. Application is
/// single-threaded, so interior mutability keeps the borrow story simple for
/// the deeply recursive rewriter.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: RefCell<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics {
            entries: RefCell::new(vec![]),
        }
    }

    pub fn error<S: ToString>(&self, msg: S, src: Source) {
        self.push(Severity::Error, msg, src)
    }

    pub fn warn<S: ToString>(&self, msg: S, src: Source) {
        self.push(Severity::Warning, msg, src)
    }

    fn push<S: ToString>(&self, severity: Severity, msg: S, src: Source) {
        let diag = Diagnostic {
            severity,
            msg: msg.to_string(),
            src,
        };
        log::debug!("diagnostic: {} {}", severity, diag.msg);
        self.entries.borrow_mut().push(diag);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        self.entries.borrow_mut().drain(..).collect()
    }

    pub fn emit_all(&self) {
        for diag in self.entries.borrow().iter() {
            diag.emit();
        }
    }
}
