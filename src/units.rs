//! Grouping constructs: unit registration, `init:` blocks, `uses`, and the
//! library/system/data and content/scope wrappers.
//!
//! Library and scope headers depend on their bodies (initializer clause,
//! requires list), so both wrappers record the header index when the block
//! opens and insert the finished header once the block closes.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

use crate::alias::IDENT_RE;
use crate::block::{terminator, BlockStack};
use crate::context::CompileContext;
use crate::error::{
    Result, SyntaxError, ERR_IDENTIFIER, ERR_UNIT_DUPLICATE, ERR_UNIT_NAME, ERR_UNIT_PLACEMENT,
};
use crate::line::{indent_for, Line, Tag};

pub const LIBS_AGGREGATE: &str = "VJPLIBS";
pub const DATA_AGGREGATE: &str = "VJPDATA";

lazy_static! {
    static ref UNIT_RE: Regex = Regex::new(
        r"^(?P<indent> *)(?P<kind>library|system|data|content|scope)(?:\s+(?P<name>[^\s:]+))?\s*:\s*$"
    )
    .unwrap();
    static ref INIT_RE: Regex = Regex::new(r"^(?P<indent> *)init\s*:\s*$").unwrap();
    static ref USES_RE: Regex = Regex::new(
        r"^(?P<indent> *)uses(?P<optional>\s+optional)?\s+(?P<name>[A-Za-z0-9_-][A-Za-z0-9_.-]*)\s*$"
    )
    .unwrap();
    static ref INIT_HEADER_RE: Regex =
        Regex::new(r"^ *private function\s+(?P<name>[A-Za-z0-9_]+)\s+").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Library,
    System,
    Data,
    Content,
}

impl GroupKind {
    fn parse(word: &str) -> GroupKind {
        match word {
            "library" => GroupKind::Library,
            "system" => GroupKind::System,
            "data" => GroupKind::Data,
            _ => GroupKind::Content,
        }
    }
}

/// `(kind, name, depth)` when the line opens a grouping construct.
pub fn group_header(line: &Line) -> Option<(GroupKind, Option<String>, usize)> {
    let caps = UNIT_RE.captures(&line.text)?;
    Some((
        GroupKind::parse(&caps["kind"]),
        caps.name("name").map(|m| m.as_str().to_string()),
        caps["indent"].len() / 4,
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRATION (collection stage)
// ═══════════════════════════════════════════════════════════════════════════════

/// Record unit names and give anonymous content blocks a generated name.
pub fn register(ctx: &mut CompileContext, file: &Path, lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let Some((kind, name, depth)) = group_header(&line) else {
            out.push(line);
            continue;
        };

        let name = match (kind, name) {
            (_, Some(name)) => name,
            (GroupKind::Content, None) => {
                let seed = format!("{}:{:?}", file.display(), line.pos.line);
                ctx.names.fresh("VJPS", &seed)
            }
            (_, None) => {
                return Err(SyntaxError::at(ERR_UNIT_NAME, &line, "Unit block requires a name"));
            }
        };
        if !IDENT_RE.is_match(&name) {
            return Err(SyntaxError::at(
                ERR_IDENTIFIER,
                &line,
                format!("Illegal unit name \"{}\"", name),
            ));
        }

        if kind != GroupKind::Content {
            if depth != 0 {
                return Err(SyntaxError::at(
                    ERR_UNIT_PLACEMENT,
                    &line,
                    "Library, system and data blocks must be top-level",
                ));
            }
            if ctx.has_unit(&name) {
                return Err(SyntaxError::at(
                    ERR_UNIT_DUPLICATE,
                    &line,
                    format!("Unit \"{}\" is already defined", name),
                ));
            }
            match kind {
                GroupKind::Library => ctx.libraries.push(name.clone()),
                GroupKind::System => ctx.systems.push(name.clone()),
                _ => ctx.data.push(name.clone()),
            }
        }
        ctx.names.reserve(&name);

        let keyword = match kind {
            GroupKind::Library => "library",
            GroupKind::System => "system",
            GroupKind::Data => "data",
            GroupKind::Content => {
                if line.text.trim_start().starts_with("scope") {
                    "scope"
                } else {
                    "content"
                }
            }
        };
        let text = format!("{}{} {}:", indent_for(depth), keyword, name);
        out.push(line.derive(text));
    }
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// INIT BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

/// `init:` → anonymous private function; the wrappers wire it into `onInit`.
pub fn lower_init(ctx: &mut CompileContext, lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out = Vec::with_capacity(lines.len());
    let mut stack: BlockStack<()> = BlockStack::new();

    for line in lines {
        let depth = line.depth();
        for frame in stack.close_to(depth) {
            out.push(terminator(&line, frame.depth, "endfunction"));
        }

        if let Some(caps) = INIT_RE.captures(&line.text) {
            let seed = format!("{}:{:?}", line.pos.file.display(), line.pos.line);
            let name = ctx.names.fresh("VJPI", &seed);
            stack.push((), depth, out.len());
            let header = format!(
                "{}private function {} takes nothing returns nothing",
                &caps["indent"], name
            );
            out.push(line.synthetic(header).with_tag(Tag::InitFunction));
            continue;
        }

        if stack.is_empty() {
            out.push(line);
        } else {
            out.push(line.with_tag(Tag::FunctionBody));
        }
    }

    if let Some(anchor) = out.last().cloned() {
        for frame in stack.close_all() {
            out.push(terminator(&anchor, frame.depth, "endfunction"));
        }
    }
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// REQUIRES
// ═══════════════════════════════════════════════════════════════════════════════

/// `uses [optional] NAME` → pending requirement tag on the line.
pub fn tag_requires(lines: Vec<Line>) -> Result<Vec<Line>> {
    Ok(lines
        .into_iter()
        .map(|line| match USES_RE.captures(&line.text) {
            Some(caps) => {
                let entry = if caps.name("optional").is_some() {
                    format!("optional {}", &caps["name"])
                } else {
                    caps["name"].to_string()
                };
                line.with_tag(Tag::Require(entry))
            }
            None => line,
        })
        .collect())
}

fn init_name(line: &Line) -> Option<String> {
    if !line.has(&Tag::InitFunction) || line.has(&Tag::InitClaimed) {
        return None;
    }
    INIT_HEADER_RE
        .captures(&line.text)
        .map(|caps| caps["name"].to_string())
}

/// Private `onInit` calling every collected init function.
fn emit_on_init(anchor: &Line, depth: usize, inits: &[String], body_tag: Tag, out: &mut Vec<Line>) {
    out.push(
        anchor
            .synthetic(format!(
                "{}private function onInit takes nothing returns nothing",
                indent_for(depth + 1)
            ))
            .with_tag(body_tag.clone()),
    );
    for name in inits {
        out.push(
            anchor
                .synthetic(format!("{}call {}()", indent_for(depth + 2), name))
                .with_tag(body_tag.clone())
                .with_tag(Tag::FunctionBody),
        );
    }
    out.push(
        anchor
            .synthetic(format!("{}endfunction", indent_for(depth + 1)))
            .with_tag(body_tag),
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTENT / SCOPE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct ContentFrame {
    name: String,
    inits: Vec<String>,
}

fn finish_content(frame: crate::block::Frame<ContentFrame>, anchor: &Line, out: &mut Vec<Line>) {
    let indent = indent_for(frame.depth);
    let header = if frame.kind.inits.is_empty() {
        format!("{}scope {}", indent, frame.kind.name)
    } else {
        emit_on_init(anchor, frame.depth, &frame.kind.inits, Tag::ContentBody, out);
        format!("{}scope {} initializer onInit", indent, frame.kind.name)
    };
    out.insert(frame.cursor, anchor.synthetic(header));
    out.push(terminator(anchor, frame.depth, "endscope"));
}

/// `content N:` / `scope N:` → `scope N [initializer onInit]` … `endscope`.
pub fn lower_content(lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out = Vec::with_capacity(lines.len());
    let mut stack: BlockStack<ContentFrame> = BlockStack::new();

    for mut line in lines {
        for frame in stack.close_to(line.depth()) {
            finish_content(frame, &line, &mut out);
        }

        if let Some((GroupKind::Content, Some(name), depth)) = group_header(&line) {
            stack.push(
                ContentFrame {
                    name,
                    inits: Vec::new(),
                },
                depth,
                out.len(),
            );
            continue;
        }

        if let Some(frame) = stack.top_mut() {
            if line.tags.require().is_some() {
                return Err(SyntaxError::at(
                    ERR_UNIT_PLACEMENT,
                    &line,
                    "uses is only allowed directly inside a library",
                ));
            }
            if let Some(name) = init_name(&line) {
                frame.kind.inits.push(name);
                line.tags.insert(Tag::InitClaimed);
            }
            line.tags.insert(Tag::ContentBody);
        }
        out.push(line);
    }

    if let Some(anchor) = out.last().cloned() {
        for frame in stack.close_all() {
            finish_content(frame, &anchor, &mut out);
        }
    }
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIBRARY / SYSTEM / DATA
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct LibraryFrame {
    name: String,
    kind: GroupKind,
    inits: Vec<String>,
    requires: Vec<String>,
}

fn finish_library(
    ctx: &CompileContext,
    frame: crate::block::Frame<LibraryFrame>,
    anchor: &Line,
    out: &mut Vec<Line>,
) {
    let lib = frame.kind;
    let mut requires = Vec::new();
    match lib.kind {
        GroupKind::System => {
            requires.push(LIBS_AGGREGATE.to_string());
            if ctx.has_data() {
                requires.push(DATA_AGGREGATE.to_string());
            }
        }
        GroupKind::Data => requires.push(LIBS_AGGREGATE.to_string()),
        _ => {}
    }
    requires.extend(lib.requires);

    let mut header = format!("library {}", lib.name);
    if !lib.inits.is_empty() {
        header.push_str(" initializer onInit");
        emit_on_init(anchor, 0, &lib.inits, Tag::LibraryBody, out);
    }
    if !requires.is_empty() {
        header.push_str(" requires ");
        header.push_str(&requires.join(", "));
    }
    out.insert(frame.cursor, anchor.synthetic(header));
    out.push(terminator(anchor, 0, "endlibrary"));
}

/// Top-level `library|system|data N:` → `library N …` … `endlibrary`.
pub fn lower_library(ctx: &mut CompileContext, lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out = Vec::with_capacity(lines.len());
    let mut stack: BlockStack<LibraryFrame> = BlockStack::new();

    for mut line in lines {
        for frame in stack.close_to(line.depth()) {
            finish_library(ctx, frame, &line, &mut out);
        }

        if let Some((kind, Some(name), 0)) = group_header(&line) {
            if kind != GroupKind::Content {
                stack.push(
                    LibraryFrame {
                        name,
                        kind,
                        inits: Vec::new(),
                        requires: Vec::new(),
                    },
                    0,
                    out.len(),
                );
                continue;
            }
        }

        let init = init_name(&line);
        match stack.top_mut() {
            Some(frame) => {
                if let Some(require) = line.tags.require() {
                    frame.kind.requires.push(require.to_string());
                    continue;
                }
                if let Some(name) = init {
                    frame.kind.inits.push(name);
                    line.tags.insert(Tag::InitClaimed);
                }
                line.tags.insert(Tag::LibraryBody);
            }
            None => {
                if line.tags.require().is_some() {
                    return Err(SyntaxError::at(
                        ERR_UNIT_PLACEMENT,
                        &line,
                        "uses is only allowed inside a library",
                    ));
                }
                if init.is_some() {
                    return Err(SyntaxError::at(
                        ERR_UNIT_PLACEMENT,
                        &line,
                        "init block must be inside a library or content block",
                    ));
                }
            }
        }
        out.push(line);
    }

    if let Some(anchor) = out.last().cloned() {
        for frame in stack.close_all() {
            finish_library(ctx, frame, &anchor, &mut out);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::{test_lines, texts};

    fn lowered(ctx: &mut CompileContext, src: &str) -> Vec<String> {
        let lines = register(ctx, Path::new("test.jp"), test_lines(src)).unwrap();
        let lines = lower_init(ctx, lines).unwrap();
        let lines = tag_requires(lines).unwrap();
        let lines = lower_content(lines).unwrap();
        let lines = lower_library(ctx, lines).unwrap();
        texts(&lines).into_iter().map(String::from).collect()
    }

    #[test]
    fn test_register_names_units_and_anonymous_content() {
        let mut ctx = CompileContext::default();
        let out = register(&mut ctx, Path::new("a.jp"), test_lines("library A:\nsystem S:\ncontent:\n    x()")).unwrap();
        assert_eq!(ctx.libraries, vec!["A"]);
        assert_eq!(ctx.systems, vec!["S"]);
        assert!(out[2].text.starts_with("content VJPS"));
        assert!(out[2].text.ends_with(':'));
    }

    #[test]
    fn test_register_rejects_duplicates_and_nested_libraries() {
        let mut ctx = CompileContext::default();
        let err = register(&mut ctx, Path::new("a.jp"), test_lines("library A:\nlibrary A:")).unwrap_err();
        assert_eq!(err.code, ERR_UNIT_DUPLICATE);

        let mut ctx = CompileContext::default();
        let err = register(&mut ctx, Path::new("a.jp"), test_lines("library A:\n    library B:")).unwrap_err();
        assert_eq!(err.code, ERR_UNIT_PLACEMENT);
    }

    #[test]
    fn test_library_with_init_and_requires() {
        let mut ctx = CompileContext::default();
        let out = lowered(&mut ctx, "library A:\n    uses B\n    uses optional C\n    init:\n        go()");
        assert!(out[0].starts_with("library A initializer onInit requires B, optional C"));
        assert!(out[1].starts_with("    private function VJPI"));
        assert_eq!(out[2], "        go()");
        assert_eq!(out[3], "    endfunction");
        assert_eq!(out[4], "    private function onInit takes nothing returns nothing");
        assert!(out[5].starts_with("        call VJPI"));
        assert_eq!(out[6], "    endfunction");
        assert_eq!(out[7], "endlibrary");
    }

    #[test]
    fn test_plain_library_header_has_no_clauses() {
        let mut ctx = CompileContext::default();
        let out = lowered(&mut ctx, "library A:\n    foo()\nbar()");
        assert_eq!(out, vec!["library A", "    foo()", "endlibrary", "bar()"]);
    }

    #[test]
    fn test_system_requires_aggregates() {
        let mut ctx = CompileContext::default();
        ctx.data.push("Items".to_string());
        let out = lowered(&mut ctx, "system S:\n    foo()");
        assert_eq!(out[0], "library S requires VJPLIBS, VJPDATA");

        let mut ctx = CompileContext::default();
        let out = lowered(&mut ctx, "data D:\n    foo()");
        assert_eq!(out[0], "library D requires VJPLIBS");
    }

    #[test]
    fn test_content_claims_its_own_init() {
        let mut ctx = CompileContext::default();
        let out = lowered(&mut ctx, "library A:\n    content B:\n        init:\n            go()\n    foo()");
        assert_eq!(out[0], "library A");
        assert_eq!(out[1], "    scope B initializer onInit");
        assert!(out.iter().any(|l| l == "    endscope"));
        assert!(!out[0].contains("initializer"));
    }

    #[test]
    fn test_init_outside_group_is_error() {
        let mut ctx = CompileContext::default();
        let lines = lower_init(&mut ctx, test_lines("init:\n    go()")).unwrap();
        let err = lower_library(&mut ctx, lines).unwrap_err();
        assert_eq!(err.code, ERR_UNIT_PLACEMENT);
    }

    #[test]
    fn test_uses_inside_content_is_error() {
        let lines = tag_requires(test_lines("content C:\n    uses X")).unwrap();
        assert!(lower_content(lines).is_err());
    }
}
