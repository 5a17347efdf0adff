//! Error types shared by the front end, the compiler and the host model.

use thiserror::Error;

use crate::processor::lexer::Span;

/// Source text could not be turned into a syntax tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({line}:{column})")]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
    /// 1-based line of `span.start`.
    pub line: usize,
    /// 1-based column of `span.start`, counted in chars.
    pub column: usize,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            line: 0,
            column: 0,
        }
    }

    /// Fill in line/column once the full source is known.
    pub fn locate(mut self, source: &str) -> Self {
        let upto = &source[..self.span.start.min(source.len())];
        self.line = upto.matches('\n').count() + 1;
        self.column = match upto.rfind('\n') {
            Some(nl) => upto[nl + 1..].chars().count() + 1,
            None => upto.chars().count() + 1,
        };
        self
    }
}

/// Failure reported by a [`crate::processor::resolver::ModuleLoader`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct LoadError(pub String);

impl From<SyntaxError> for LoadError {
    fn from(err: SyntaxError) -> Self {
        LoadError(format!("SyntaxError: {err}"))
    }
}

/// Static RAM analysis could not parse one of the scripts it visited.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{filename}: SyntaxError: {source}")]
pub struct RamCalcError {
    pub filename: String,
    pub source: SyntaxError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("error loading {hostname}/{filename}: {message}")]
    Load {
        hostname: String,
        filename: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("{filename} belongs to {owner}, not {host}")]
    WrongHost {
        filename: String,
        owner: String,
        host: String,
    },
    #[error("cannot delete {filename} while it is running")]
    ScriptRunning { filename: String },
    #[error("no script named {filename} on {host}")]
    NotFound { filename: String, host: String },
    #[error("invalid script filename `{0}`")]
    InvalidFilename(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CostTableError {
    #[error("cost of `{path}` must be a finite non-negative number, got {cost}")]
    InvalidCost { path: String, cost: f64 },
    #[error("max cost {max} is below the base cost {base}")]
    MaxBelowBase { base: f64, max: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_line_and_column() {
        let src = "let a = 1;\nlet b = @;\n";
        let err = SyntaxError::new("unexpected character `@`", Span::new(19, 20)).locate(src);
        assert_eq!((err.line, err.column), (2, 9));
        assert_eq!(err.to_string(), "unexpected character `@` (2:9)");
    }
}
