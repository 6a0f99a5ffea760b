use std::fmt;
use std::path::{Path, PathBuf};

use crate::line::Line;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_IMPORT_FILE: &str = "VJP-ERR-IMPORT-001";
pub const ERR_IMPORT_DIRECTORY: &str = "VJP-ERR-IMPORT-002";
pub const ERR_UNIT_NAME: &str = "VJP-ERR-UNIT-001";
pub const ERR_UNIT_DUPLICATE: &str = "VJP-ERR-UNIT-002";
pub const ERR_UNIT_PLACEMENT: &str = "VJP-ERR-UNIT-003";
pub const ERR_CONTINUATION: &str = "VJP-ERR-SYNTAX-001";
pub const ERR_MODIFIER_CONFLICT: &str = "VJP-ERR-SYNTAX-002";
pub const ERR_IDENTIFIER: &str = "VJP-ERR-SYNTAX-003";
pub const ERR_ORPHAN_BRANCH: &str = "VJP-ERR-SYNTAX-004";
pub const ERR_ORPHAN_BREAK: &str = "VJP-ERR-SYNTAX-005";
pub const ERR_ORPHAN_LOCAL: &str = "VJP-ERR-SYNTAX-006";
pub const ERR_MACRO_PLACEMENT: &str = "VJP-ERR-MACRO-001";
pub const ERR_MACRO_NESTED: &str = "VJP-ERR-MACRO-002";
pub const ERR_MACRO_DUPLICATE: &str = "VJP-ERR-MACRO-003";
pub const ERR_MACRO_PARAMS: &str = "VJP-ERR-MACRO-004";
pub const ERR_MACRO_UNKNOWN: &str = "VJP-ERR-MACRO-005";
pub const ERR_MACRO_ARITY: &str = "VJP-ERR-MACRO-006";
pub const ERR_MACRO_RECURSION: &str = "VJP-ERR-MACRO-007";
pub const ERR_MACRO_BODY: &str = "VJP-ERR-MACRO-008";
pub const ERR_ALIAS: &str = "VJP-ERR-ALIAS-001";
pub const ERR_TABLE_SCHEMA: &str = "VJP-ERR-TABLE-001";
pub const ERR_TABLE_SHAPE: &str = "VJP-ERR-TABLE-002";
pub const ERR_TABLE_VALUE: &str = "VJP-ERR-TABLE-003";
pub const ERR_TABLE_NULL: &str = "VJP-ERR-TABLE-004";
pub const ERR_TABLE_BOUND: &str = "VJP-ERR-TABLE-005";
pub const ERR_TABLE_UNIQUE: &str = "VJP-ERR-TABLE-006";

// ═══════════════════════════════════════════════════════════════════════════════
// SYNTAX ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// The single diagnostic every validation failure is reported through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub code: &'static str,
    pub file: PathBuf,
    /// 1-based; `None` for file-level errors.
    pub line: Option<u32>,
    pub text: Option<String>,
    pub message: String,
}

impl SyntaxError {
    pub fn new(code: &'static str, file: &Path, line: Option<u32>, message: impl Into<String>) -> Self {
        SyntaxError {
            code,
            file: file.to_path_buf(),
            line,
            text: None,
            message: message.into(),
        }
    }

    /// Error located at a line record, carrying its text as context.
    pub fn at(code: &'static str, line: &Line, message: impl Into<String>) -> Self {
        SyntaxError {
            code,
            file: line.pos.file.to_path_buf(),
            line: line.pos.line,
            text: Some(line.text.trim().to_string()),
            message: message.into(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => writeln!(f, "File \"{}\", line {}", self.file.display(), line)?,
            None => writeln!(f, "File \"{}\"", self.file.display())?,
        }
        if let Some(text) = &self.text {
            if !text.is_empty() {
                writeln!(f, "    {}", text)?;
            }
        }
        write!(f, "{} [{}]", self.message, self.code)
    }
}

impl std::error::Error for SyntaxError {}

pub type Result<T> = std::result::Result<T, SyntaxError>;

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILE ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("{0}")]
    Syntax(#[from] SyntaxError),

    #[error("failed to read \"{}\": {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write \"{}\": {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize build report: {0}")]
    Report(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_line() {
        let err = SyntaxError::new(ERR_MACRO_UNKNOWN, Path::new("a.jp"), Some(3), "Unknown macro FOO")
            .with_text("FOO!()");
        let rendered = err.to_string();
        assert!(rendered.starts_with("File \"a.jp\", line 3"));
        assert!(rendered.contains("FOO!()"));
        assert!(rendered.ends_with("Unknown macro FOO [VJP-ERR-MACRO-005]"));
    }

    #[test]
    fn test_display_file_level() {
        let err = SyntaxError::new(ERR_UNIT_NAME, Path::new("9bad.jpl"), None, "Illegal unit name");
        assert!(err.to_string().starts_with("File \"9bad.jpl\"\n"));
    }
}
