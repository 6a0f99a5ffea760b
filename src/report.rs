use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::{CompileContext, UnitKind};
use crate::error::CompileError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub path: PathBuf,
    pub kind: UnitKind,
}

/// Summary of one compile run, written with `--report`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileReport {
    pub entry: PathBuf,
    pub output: PathBuf,
    pub files: Vec<FileReport>,
    pub libraries: Vec<String>,
    pub systems: Vec<String>,
    pub data: Vec<String>,
    pub macro_count: usize,
    pub alias_count: usize,
    pub line_count: usize,
}

impl CompileReport {
    pub fn new(ctx: &CompileContext, entry: &Path, output: &Path, line_count: usize) -> Self {
        CompileReport {
            entry: entry.to_path_buf(),
            output: output.to_path_buf(),
            files: ctx
                .files
                .iter()
                .map(|(path, entry)| FileReport {
                    path: path.clone(),
                    kind: entry.kind,
                })
                .collect(),
            libraries: ctx.libraries.clone(),
            systems: ctx.systems.clone(),
            data: ctx.data.clone(),
            macro_count: ctx.macros.len(),
            alias_count: ctx.aliases.len(),
            line_count,
        }
    }

    pub fn to_json(&self) -> Result<String, CompileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), CompileError> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|source| CompileError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_camel_case() {
        let mut ctx = CompileContext::default();
        ctx.files.insert(PathBuf::from("/m/main.jp"), UnitKind::Source);
        ctx.systems.push("Damage".to_string());
        let report = CompileReport::new(&ctx, Path::new("/m/main.jp"), Path::new("/m/main.j"), 12);
        let json = report.to_json().unwrap();
        assert!(json.contains("\"macroCount\": 0"));
        assert!(json.contains("\"lineCount\": 12"));
        assert!(json.contains("\"kind\": \"source\""));

        let back: CompileReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
