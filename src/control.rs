//! Control flow: loops, conditionals and static existence checks.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::block::{close_with, terminator, BlockStack};
use crate::context::CompileContext;
use crate::error::{Result, SyntaxError, ERR_ORPHAN_BRANCH, ERR_ORPHAN_BREAK};
use crate::line::{indent_for, Line};
use crate::normalize::map_code;

lazy_static! {
    static ref LOOP_RE: Regex = Regex::new(r"^(?P<indent> *)loop\s*:\s*$").unwrap();
    static ref WHILE_RE: Regex =
        Regex::new(r"^(?P<indent> *)(?P<kind>while|until)\s+(?P<cond>.+?)\s*:\s*$").unwrap();
    static ref BREAK_RE: Regex = Regex::new(r"^(?P<indent> *)break\s*$").unwrap();
    static ref IF_RE: Regex =
        Regex::new(r"^(?P<indent> *)(?P<static>static\s+)?if\s+(?P<cond>.+?)\s*:\s*$").unwrap();
    static ref ELSEIF_RE: Regex =
        Regex::new(r"^(?P<indent> *)elseif\s+(?P<cond>.+?)\s*:\s*$").unwrap();
    static ref ELSE_RE: Regex = Regex::new(r"^(?P<indent> *)else\s*:\s*$").unwrap();
    static ref DECLARED_RE: Regex = Regex::new(
        r"^\s*(?:(?:private|public)\s+)?(?:constant\s+)?(?:function|native)\s+(?P<name>[A-Za-z][A-Za-z0-9_]*)\s+takes\b"
    )
    .unwrap();
    static ref FN_EXISTS_RE: Regex =
        Regex::new(r"\b(?P<name>[A-Za-z][A-Za-z0-9_]*)\(\)_exists\b").unwrap();
    static ref ARG_EXISTS_RE: Regex =
        Regex::new(r"\[(?P<key>[A-Za-z0-9_.-]+)\]_exists\b").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOOPS
// ═══════════════════════════════════════════════════════════════════════════════

/// `loop:`, `while C:` and `until C:` → `loop` … `endloop`; `break` → `exitwhen true`.
pub fn lower_loops(lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out = Vec::with_capacity(lines.len());
    let mut stack: BlockStack<()> = BlockStack::new();

    for line in lines {
        let depth = line.depth();
        close_with(&mut stack, depth, &line, &mut out, |_| "endloop");

        if let Some(caps) = LOOP_RE.captures(&line.text) {
            stack.push((), depth, out.len());
            out.push(line.derive(format!("{}loop", &caps["indent"])));
            continue;
        }

        if let Some(caps) = WHILE_RE.captures(&line.text) {
            let indent = &caps["indent"];
            let exit = match &caps["kind"] {
                "while" => format!("exitwhen not ({})", &caps["cond"]),
                _ => format!("exitwhen {}", &caps["cond"]),
            };
            stack.push((), depth, out.len());
            out.push(line.derive(format!("{}loop", indent)));
            out.push(line.derive(format!("{}{}", indent_for(depth + 1), exit)));
            continue;
        }

        if let Some(caps) = BREAK_RE.captures(&line.text) {
            if stack.is_empty() {
                return Err(SyntaxError::at(ERR_ORPHAN_BREAK, &line, "break outside of a loop"));
            }
            out.push(line.derive(format!("{}exitwhen true", &caps["indent"])));
            continue;
        }

        out.push(line);
    }

    if let Some(anchor) = out.last().cloned() {
        close_with(&mut stack, 0, &anchor, &mut out, |_| "endloop");
    }
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONDITIONALS
// ═══════════════════════════════════════════════════════════════════════════════

/// Every function and native declared in the file, scanned up front so a
/// check may precede the declaration.
fn declared_functions(lines: &[Line]) -> HashSet<String> {
    lines
        .iter()
        .filter_map(|l| DECLARED_RE.captures(&l.text))
        .map(|caps| caps["name"].to_string())
        .collect()
}

fn resolve_exists(ctx: &CompileContext, declared: &HashSet<String>, code: &str) -> String {
    let code = FN_EXISTS_RE.replace_all(code, |caps: &regex::Captures| {
        declared.contains(&caps["name"]).to_string()
    });
    ARG_EXISTS_RE
        .replace_all(&code, |caps: &regex::Captures| {
            ctx.arguments.contains(&caps["key"]).to_string()
        })
        .into_owned()
}

fn orphan(line: &Line, keyword: &str) -> SyntaxError {
    SyntaxError::at(
        ERR_ORPHAN_BRANCH,
        line,
        format!("{} without a matching if at the same indentation", keyword),
    )
}

/// `[static ]if` / `elseif` / `else` blocks → `then` forms and `endif`.
pub fn lower_conditionals(ctx: &mut CompileContext, lines: Vec<Line>) -> Result<Vec<Line>> {
    let declared = declared_functions(&lines);
    let mut out = Vec::with_capacity(lines.len());
    let mut stack: BlockStack<()> = BlockStack::new();

    for line in lines {
        let depth = line.depth();
        let line = if line.text.contains("_exists") {
            let text = map_code(&line.text, |code| resolve_exists(ctx, &declared, code));
            line.derive(text)
        } else {
            line
        };

        if let Some(caps) = IF_RE.captures(&line.text) {
            close_with(&mut stack, depth, &line, &mut out, |_| "endif");
            let keyword = if caps.name("static").is_some() { "static if" } else { "if" };
            stack.push((), depth, out.len());
            out.push(line.derive(format!("{}{} {} then", &caps["indent"], keyword, &caps["cond"])));
            continue;
        }

        let branch = ELSEIF_RE
            .captures(&line.text)
            .map(|caps| format!("elseif {} then", &caps["cond"]))
            .or_else(|| ELSE_RE.is_match(&line.text).then(|| "else".to_string()));
        if let Some(branch) = branch {
            for frame in stack.close_above(depth) {
                out.push(terminator(&line, frame.depth, "endif"));
            }
            if stack.top().map(|f| f.depth) != Some(depth) {
                return Err(orphan(&line, branch.split(' ').next().unwrap_or("else")));
            }
            out.push(line.derive(format!("{}{}", indent_for(depth), branch)));
            continue;
        }

        close_with(&mut stack, depth, &line, &mut out, |_| "endif");
        out.push(line);
    }

    if let Some(anchor) = out.last().cloned() {
        close_with(&mut stack, 0, &anchor, &mut out, |_| "endif");
    }
    Ok(out)
}
