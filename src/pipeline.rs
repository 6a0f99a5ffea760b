//! Pipeline orchestration.
//!
//! Collection runs file by file until the import graph stops growing, so
//! every macro and alias is known before lowering starts. Lowering then runs
//! pass by pass across all files in discovery order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info};

use crate::context::{Arguments, CompileContext, UnitKind};
use crate::discovery::{self, normalize_path, read_source, register_file};
use crate::error::{CompileError, Result, SyntaxError, ERR_IMPORT_FILE, ERR_UNIT_DUPLICATE};
use crate::line::Line;
use crate::report::CompileReport;
use crate::units::{DATA_AGGREGATE, LIBS_AGGREGATE};
use crate::{alias, control, declare, hoist, interpolate, macros, modifier, normalize};
use crate::{statements, table, units, variables};

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS / OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    /// Flags and `key=value` pairs from the command line.
    #[serde(default)]
    pub arguments: Arguments,
    /// Defaults to the entry path with a `.j` extension.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

#[derive(Debug)]
pub struct CompileOutput {
    pub path: PathBuf,
    pub text: String,
    pub report: CompileReport,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASSES
// ═══════════════════════════════════════════════════════════════════════════════

pub type PassFn = fn(&mut CompileContext, &Path, Vec<Line>) -> Result<Vec<Line>>;

pub struct Pass {
    pub name: &'static str,
    pub run: PassFn,
}

/// Per-file passes run as each DSL file is first loaded.
pub fn collection_passes() -> Vec<Pass> {
    vec![
        Pass { name: "comments", run: |_, _, l| normalize::strip_comments(l) },
        Pass { name: "continuations", run: |_, _, l| normalize::join_continuations(l) },
        Pass { name: "imports", run: discovery::process },
        Pass { name: "non-portable", run: |_, _, l| normalize::escape_non_portable(l) },
        Pass { name: "units", run: units::register },
        Pass { name: "aliases", run: |ctx, _, l| alias::register(ctx, l) },
        Pass { name: "macro-definitions", run: |ctx, _, l| macros::register(ctx, l) },
    ]
}

/// Passes run over every lowered file once collection has finished.
/// Interpolation runs first so expressions inside `{…}` reach the keyword and
/// `_exists` passes as unquoted code.
pub fn lowering_passes() -> Vec<Pass> {
    vec![
        Pass { name: "macro-expansion", run: |ctx, _, l| macros::expand(ctx, l) },
        Pass { name: "interpolation", run: |_, _, l| interpolate::expand(l) },
        Pass { name: "modifiers", run: |_, _, l| modifier::lower(l) },
        Pass { name: "types", run: |ctx, _, l| declare::lower_types(ctx, l) },
        Pass { name: "init", run: |ctx, _, l| units::lower_init(ctx, l) },
        Pass { name: "requires", run: |_, _, l| units::tag_requires(l) },
        Pass { name: "content", run: |_, _, l| units::lower_content(l) },
        Pass { name: "libraries", run: |ctx, _, l| units::lower_library(ctx, l) },
        Pass { name: "natives", run: |ctx, _, l| declare::lower_natives(ctx, l) },
        Pass { name: "functions", run: |ctx, _, l| declare::lower_functions(ctx, l) },
        Pass { name: "variables", run: |ctx, _, l| variables::lower(ctx, l) },
        Pass { name: "loops", run: |_, _, l| control::lower_loops(l) },
        Pass { name: "conditionals", run: |ctx, _, l| control::lower_conditionals(ctx, l) },
        Pass { name: "keywords", run: |_, _, l| statements::substitute(l) },
        Pass { name: "statements", run: |_, _, l| statements::prefix(l) },
        Pass { name: "hoisting", run: |_, _, l| hoist::lower(l) },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

fn collect_file(
    ctx: &mut CompileContext,
    path: &Path,
    kind: UnitKind,
    passes: &[Pass],
) -> std::result::Result<Vec<Line>, CompileError> {
    let source = read_source(path)?;
    match kind {
        UnitKind::PassThrough => Ok(Line::from_source(&Rc::from(path), &source)),
        UnitKind::Table => {
            let lines = table::compile(path, &source)?;
            let name = discovery::unit_name(path)?;
            if ctx.has_unit(&name) {
                return Err(SyntaxError::new(
                    ERR_UNIT_DUPLICATE,
                    path,
                    None,
                    format!("Unit \"{}\" is already defined", name),
                )
                .into());
            }
            ctx.names.reserve(&name);
            ctx.data.push(name);
            Ok(lines)
        }
        _ => {
            let mut lines = discovery::unit_lines(path, kind, &source)?;
            for pass in passes {
                lines = (pass.run)(ctx, path, lines)?;
            }
            Ok(lines)
        }
    }
}

/// Load every reachable file, growing the graph as imports are resolved.
pub fn collect(ctx: &mut CompileContext) -> std::result::Result<IndexMap<PathBuf, Vec<Line>>, CompileError> {
    let passes = collection_passes();
    let mut units: IndexMap<PathBuf, Vec<Line>> = IndexMap::new();

    loop {
        let pending = ctx.files.pending();
        if pending.is_empty() {
            break;
        }
        for path in pending {
            let Some(kind) = ctx.files.kind(&path) else {
                continue;
            };
            debug!("collecting {} ({:?})", path.display(), kind);
            let lines = collect_file(ctx, &path, kind, &passes)?;
            ctx.files.mark_collected(&path);
            units.insert(path, lines);
        }
    }
    Ok(units)
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOWERING
// ═══════════════════════════════════════════════════════════════════════════════

pub fn lower(ctx: &mut CompileContext, units: &mut IndexMap<PathBuf, Vec<Line>>) -> Result<()> {
    let lowered: Vec<PathBuf> = units
        .keys()
        .filter(|p| ctx.files.kind(p).map_or(false, UnitKind::is_lowered))
        .cloned()
        .collect();

    for pass in lowering_passes() {
        debug!(pass = pass.name, files = lowered.len(), "running pass");
        for path in &lowered {
            let Some(slot) = units.get_mut(path) else {
                continue;
            };
            let lines = std::mem::take(slot);
            *slot = (pass.run)(ctx, path, lines)?;
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// MERGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Aggregation blocks followed by every file in discovery order.
pub fn merge(ctx: &CompileContext, units: &IndexMap<PathBuf, Vec<Line>>) -> Vec<String> {
    let mut out = Vec::new();

    if !ctx.systems.is_empty() || ctx.has_data() {
        let mut header = format!("library {}", LIBS_AGGREGATE);
        if !ctx.libraries.is_empty() {
            header.push_str(" requires ");
            header.push_str(&ctx.libraries.join(", "));
        }
        out.push(header);
        out.push("endlibrary".to_string());
    }
    if ctx.has_data() {
        out.push(format!(
            "library {} requires {}, {}",
            DATA_AGGREGATE,
            LIBS_AGGREGATE,
            ctx.data.join(", ")
        ));
        out.push("endlibrary".to_string());
    }

    for lines in units.values() {
        out.extend(lines.iter().map(|l| l.text.clone()));
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Compile the program rooted at `entry` without touching the output file.
pub fn compile(entry: &Path, options: &CompileOptions) -> std::result::Result<CompileOutput, CompileError> {
    let mut ctx = CompileContext::new(options.arguments.clone());
    let entry = normalize_path(entry);
    if !register_file(&mut ctx, &entry) {
        return Err(SyntaxError::new(ERR_IMPORT_FILE, &entry, None, "Unrecognised source file").into());
    }

    let mut units = collect(&mut ctx)?;
    info!(
        files = ctx.files.len(),
        macros = ctx.macros.len(),
        aliases = ctx.aliases.len(),
        "collection finished"
    );
    lower(&mut ctx, &mut units)?;

    let lines = merge(&ctx, &units);
    let mut text = lines.join("\n");
    text.push('\n');

    let path = options
        .output
        .clone()
        .unwrap_or_else(|| entry.with_extension("j"));
    let report = CompileReport::new(&ctx, &entry, &path, lines.len());
    Ok(CompileOutput { path, text, report })
}

pub fn write_output(output: &CompileOutput) -> std::result::Result<(), CompileError> {
    fs::write(&output.path, &output.text).map_err(|source| CompileError::Write {
        path: output.path.clone(),
        source,
    })?;
    info!("wrote {}", output.path.display());
    Ok(())
}

/// Compile and write the merged program.
pub fn build(entry: &Path, options: &CompileOptions) -> std::result::Result<CompileOutput, CompileError> {
    let output = compile(entry, options)?;
    write_output(&output)?;
    Ok(output)
}
