//! Import graph discovery.
//!
//! Resolves `import` statements to files, registers newly seen files in the
//! compile context and loads unit sources, auto-wrapping single-unit files.

use lazy_static::lazy_static;
use regex::Regex;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::alias::IDENT_RE;
use crate::context::{CompileContext, UnitKind};
use crate::error::{CompileError, Result, SyntaxError, ERR_IMPORT_DIRECTORY, ERR_IMPORT_FILE, ERR_UNIT_NAME};
use crate::line::{Line, INDENT};

lazy_static! {
    static ref IMPORT_RE: Regex = Regex::new(
        r"^\s*(?:when\s+(?P<when>[A-Za-z0-9_.-]+)\s+)?import\s+(?P<path>[A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]+)*)(?P<mass>\.\*\*?)?\s*$"
    )
    .unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// PATHS
// ═══════════════════════════════════════════════════════════════════════════════

/// Absolute, canonical identity for a source path.
pub fn normalize_path(path: &Path) -> PathBuf {
    let unified = PathBuf::from(path.to_string_lossy().replace('\\', "/"));
    match fs::canonicalize(&unified) {
        Ok(canonical) => canonical,
        Err(_) if unified.is_absolute() => unified,
        Err(_) => std::env::current_dir()
            .map(|cwd| cwd.join(&unified))
            .unwrap_or(unified),
    }
}

fn with_extension_appended(base: &Path, ext: &str) -> PathBuf {
    let mut raw: OsString = base.as_os_str().to_owned();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}

/// Recognised unit files under `dir`, sorted by name.
fn find_unit_files(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .follow_links(true)
        .sort_by_file_name();

    walker
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| UnitKind::from_path(path).is_some())
        .collect()
}

/// Whether every component of `path` is listed, spelled exactly so, in its
/// parent directory. A case-insensitive lookup can resolve a path whose
/// spelling is not on disk.
fn spelled_on_disk(path: &Path) -> bool {
    path.ancestors().all(|p| match (p.parent(), p.file_name()) {
        (Some(parent), Some(name)) => fs::read_dir(parent)
            .map(|mut entries| entries.any(|e| e.map_or(false, |e| e.file_name() == name)))
            .unwrap_or(false),
        _ => true,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// IMPORT PASS
// ═══════════════════════════════════════════════════════════════════════════════

/// Register a file; returns `true` when it was not known before.
pub fn register_file(ctx: &mut CompileContext, path: &Path) -> bool {
    let path = normalize_path(path);
    if ctx.files.contains(&path) {
        return false;
    }
    if let Some(existing) = ctx.files.case_variant(&path) {
        if !(spelled_on_disk(&path) && spelled_on_disk(existing)) {
            warn!(
                "\"{}\" differs only in case from \"{}\"; using the first",
                path.display(),
                existing.display()
            );
            return false;
        }
    }
    let Some(kind) = UnitKind::from_path(&path) else {
        return false;
    };
    debug!("discovered {} ({:?})", path.display(), kind);
    ctx.files.insert(path, kind)
}

/// Collection pass: resolve and register imports, dropping the statements.
pub fn process(ctx: &mut CompileContext, file: &Path, lines: Vec<Line>) -> Result<Vec<Line>> {
    let base_dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut out = Vec::with_capacity(lines.len());

    for line in lines {
        let Some(caps) = IMPORT_RE.captures(&line.text) else {
            out.push(line);
            continue;
        };

        if let Some(flag) = caps.name("when") {
            if !ctx.arguments.contains(flag.as_str()) {
                debug!("skipping import gated on {}", flag.as_str());
                continue;
            }
        }

        let target = base_dir.join(caps["path"].replace('.', "/"));
        let paths = match caps.name("mass").map(|m| m.as_str()) {
            None => vec![resolve_single(&target, &line)?],
            Some(mass) => {
                if !target.is_dir() {
                    return Err(SyntaxError::at(
                        ERR_IMPORT_DIRECTORY,
                        &line,
                        format!("No such directory \"{}\"", target.display()),
                    ));
                }
                find_unit_files(&target, mass == ".**")
            }
        };

        for path in paths {
            register_file(ctx, &path);
        }
    }
    Ok(out)
}

fn resolve_single(target: &Path, line: &Line) -> Result<PathBuf> {
    UnitKind::EXTENSIONS
        .iter()
        .map(|(ext, _)| with_extension_appended(target, ext))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            SyntaxError::at(
                ERR_IMPORT_FILE,
                line,
                format!("No such file \"{}\"", target.display()),
            )
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
// UNIT LOADING
// ═══════════════════════════════════════════════════════════════════════════════

pub fn read_source(path: &Path) -> std::result::Result<String, CompileError> {
    fs::read_to_string(path).map_err(|source| CompileError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Line records for a unit, wrapped in a named block for single-unit kinds.
pub fn unit_lines(path: &Path, kind: UnitKind, source: &str) -> Result<Vec<Line>> {
    let file: Rc<Path> = Rc::from(path);
    let lines = Line::from_source(&file, source);
    let Some(keyword) = kind.wrapper_keyword() else {
        return Ok(lines);
    };

    let name = unit_name(path)?;
    let mut wrapped = Vec::with_capacity(lines.len() + 1);
    wrapped.push(Line::new(
        format!("{} {}:", keyword, name),
        crate::line::SourcePos::new(file.clone(), None),
    ));
    for line in lines {
        let text = if line.text.trim().is_empty() {
            String::new()
        } else {
            format!("{}{}", INDENT, line.text)
        };
        wrapped.push(line.derive(text));
    }
    Ok(wrapped)
}

/// Block name derived from the file stem.
pub fn unit_name(path: &Path) -> Result<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    if !IDENT_RE.is_match(&stem) {
        return Err(SyntaxError::new(
            ERR_UNIT_NAME,
            path,
            None,
            format!("Illegal unit name \"{}\" derived from file name", stem),
        ));
    }
    Ok(stem)
}
