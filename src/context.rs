//! Per-run compile state threaded through every pass.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::alias::AliasTable;
use crate::macros::MacroRegistry;

// ═══════════════════════════════════════════════════════════════════════════════
// UNIT KINDS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitKind {
    /// Plain DSL file.
    Source,
    /// Output-language file copied verbatim.
    PassThrough,
    /// Single-unit files auto-wrapped in a block named after the file.
    Library,
    System,
    Data,
    Content,
    /// Spreadsheet compiled into a data library.
    Table,
}

impl UnitKind {
    /// Lookup order for extension-less import targets.
    pub const EXTENSIONS: [(&'static str, UnitKind); 7] = [
        ("jp", UnitKind::Source),
        ("jpl", UnitKind::Library),
        ("jps", UnitKind::System),
        ("jpd", UnitKind::Data),
        ("jpc", UnitKind::Content),
        ("j", UnitKind::PassThrough),
        ("csv", UnitKind::Table),
    ];

    pub fn from_path(path: &Path) -> Option<UnitKind> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::EXTENSIONS
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, kind)| *kind)
    }

    /// Block keyword used when auto-wrapping a single-unit file.
    pub fn wrapper_keyword(self) -> Option<&'static str> {
        match self {
            UnitKind::Library => Some("library"),
            UnitKind::System => Some("system"),
            UnitKind::Data => Some("data"),
            UnitKind::Content => Some("content"),
            _ => None,
        }
    }

    /// Whether the DSL passes run over this unit.
    pub fn is_lowered(self) -> bool {
        !matches!(self, UnitKind::PassThrough | UnitKind::Table)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE GRAPH
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Discovered,
    Collected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub kind: UnitKind,
    pub state: FileState,
}

/// Discovered files keyed by canonical path, in discovery order.
#[derive(Debug, Default)]
pub struct FileGraph {
    files: IndexMap<PathBuf, FileEntry>,
}

impl FileGraph {
    /// Returns `false` when the path was already known.
    pub fn insert(&mut self, path: PathBuf, kind: UnitKind) -> bool {
        if self.files.contains_key(&path) {
            return false;
        }
        self.files.insert(
            path,
            FileEntry {
                kind,
                state: FileState::Discovered,
            },
        );
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Known path equal to `path` ignoring ASCII case, if any.
    pub fn case_variant(&self, path: &Path) -> Option<&Path> {
        let wanted = path.to_string_lossy().to_lowercase();
        self.files
            .keys()
            .find(|p| p.to_string_lossy().to_lowercase() == wanted)
            .map(|p| p.as_path())
    }

    pub fn pending(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|(_, e)| e.state == FileState::Discovered)
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn mark_collected(&mut self, path: &Path) {
        if let Some(entry) = self.files.get_mut(path) {
            entry.state = FileState::Collected;
        }
    }

    pub fn kind(&self, path: &Path) -> Option<UnitKind> {
        self.files.get(path).map(|e| e.kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &FileEntry)> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INVOCATION ARGUMENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// `key=value` tokens and bare flags from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arguments(BTreeMap<String, Option<String>>);

impl Arguments {
    pub fn parse<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = Arguments::default();
        for token in tokens {
            let token = token.as_ref();
            match token.split_once('=') {
                Some((key, value)) => args.0.insert(key.to_string(), Some(value.to_string())),
                None => args.0.insert(token.to_string(), None),
            };
        }
        args
    }

    /// A flag or a named argument counts as present.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_deref())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYNTHETIC NAMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Collision-checked generator for anonymous block and init-function names.
#[derive(Debug, Default)]
pub struct NameGenerator {
    issued: HashSet<String>,
    counter: u64,
}

impl NameGenerator {
    /// `prefix` + 16 uppercase hex digits derived from the seed and a run
    /// counter. Names reserved with [`NameGenerator::reserve`] are skipped.
    pub fn fresh(&mut self, prefix: &str, seed: &str) -> String {
        loop {
            self.counter += 1;
            let mut hasher = Sha256::new();
            hasher.update(seed.as_bytes());
            hasher.update(self.counter.to_le_bytes());
            let digest = format!("{:X}", hasher.finalize());
            let name = format!("{}{}", prefix, &digest[..16]);
            if self.issued.insert(name.clone()) {
                return name;
            }
        }
    }

    pub fn reserve(&mut self, name: &str) {
        self.issued.insert(name.to_string());
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILE CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct CompileContext {
    pub files: FileGraph,
    pub arguments: Arguments,
    /// Plain `library` unit names, in registration order.
    pub libraries: Vec<String>,
    pub systems: Vec<String>,
    pub data: Vec<String>,
    pub macros: MacroRegistry,
    pub aliases: AliasTable,
    pub names: NameGenerator,
}

impl CompileContext {
    pub fn new(arguments: Arguments) -> Self {
        CompileContext {
            arguments,
            ..Default::default()
        }
    }

    pub fn has_unit(&self, name: &str) -> bool {
        self.libraries.iter().any(|n| n == name)
            || self.systems.iter().any(|n| n == name)
            || self.data.iter().any(|n| n == name)
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }
}
