//! Declarations: `type`, `native` and function blocks.

use lazy_static::lazy_static;
use regex::Regex;

use crate::block::{close_with, BlockStack};
use crate::context::CompileContext;
use crate::error::{Result, SyntaxError, ERR_ALIAS};
use crate::line::{Line, Tag, Visibility};
use crate::modifier;
use crate::statements::is_reserved;

lazy_static! {
    static ref TYPE_RE: Regex = Regex::new(
        r"^(?P<indent> *)(?:(?P<modifier>api|global)\s+)?type\s+(?P<name>[A-Za-z][A-Za-z0-9_]*)(?:\s+extends\s+(?P<extends>[A-Za-z][A-Za-z0-9_]*))?\s*$"
    )
    .unwrap();
    static ref NATIVE_RE: Regex = Regex::new(
        r"^(?P<indent> *)native\s+(?P<name>[A-Za-z][A-Za-z0-9_]*)\s*\((?P<takes>[^)]*)\)(?:\s*->\s*(?P<returns>[A-Za-z][A-Za-z0-9_]*))?\s*$"
    )
    .unwrap();
    static ref FUNCTION_RE: Regex = Regex::new(
        r"^(?P<indent> *)(?:(?P<modifier>api|global)\s+)?(?P<name>[A-Za-z][A-Za-z0-9_]*)\s*\((?P<takes>[^)]*)\)(?:\s*->\s*(?P<returns>[A-Za-z][A-Za-z0-9_]*))?\s*:\s*$"
    )
    .unwrap();
}

fn signature(
    ctx: &CompileContext,
    line: &Line,
    takes: &str,
    returns: Option<&str>,
) -> Result<(String, String)> {
    let takes = ctx
        .aliases
        .resolve_params(takes)
        .map_err(|msg| SyntaxError::at(ERR_ALIAS, line, msg))?;
    let returns = match returns {
        Some(ty) => ctx
            .aliases
            .resolve(ty)
            .map_err(|msg| SyntaxError::at(ERR_ALIAS, line, msg))?,
        None => "nothing".to_string(),
    };
    Ok((takes, returns))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TYPE
// ═══════════════════════════════════════════════════════════════════════════════

/// `type N extends E` → `struct N[ extends array]` … `endstruct`.
pub fn lower_types(ctx: &mut CompileContext, lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let Some(caps) = TYPE_RE.captures(&line.text) else {
            out.push(line);
            continue;
        };
        let vis = modifier::effective(&line, caps.name("modifier").map(|m| m.as_str()))?;
        let base = match caps.name("extends") {
            Some(ty) => ctx
                .aliases
                .resolve(ty.as_str())
                .map_err(|msg| SyntaxError::at(ERR_ALIAS, &line, msg))?,
            None => String::new(),
        };
        let extends = if base == "handle" { "" } else { " extends array" };
        let indent = &caps["indent"];
        out.push(line.derive(format!(
            "{}{}struct {}{}",
            indent,
            Visibility::prefix(vis),
            &caps["name"],
            extends
        )));
        out.push(line.synthetic(format!("{}endstruct", indent)));
    }
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NATIVE
// ═══════════════════════════════════════════════════════════════════════════════

/// `native N(params) -> R` → `native N takes P returns R`.
pub fn lower_natives(ctx: &mut CompileContext, lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let Some(caps) = NATIVE_RE.captures(&line.text) else {
            out.push(line);
            continue;
        };
        let (takes, returns) = signature(ctx, &line, &caps["takes"], caps.name("returns").map(|m| m.as_str()))?;
        let text = format!("{}native {} takes {} returns {}", &caps["indent"], &caps["name"], takes, returns);
        out.push(line.derive(text).with_tag(Tag::Native));
    }
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FUNCTION
// ═══════════════════════════════════════════════════════════════════════════════

/// `[api|global] N(params) -> R:` → `<vis>function N takes P returns R`.
pub fn lower_functions(ctx: &mut CompileContext, lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out = Vec::with_capacity(lines.len());
    let mut stack: BlockStack<()> = BlockStack::new();

    for line in lines {
        close_with(&mut stack, line.depth(), &line, &mut out, |_| "endfunction");

        if let Some(caps) = FUNCTION_RE.captures(&line.text) {
            let name = &caps["name"];
            if !is_reserved(name) {
                let vis = modifier::effective(&line, caps.name("modifier").map(|m| m.as_str()))?;
                let (takes, returns) =
                    signature(ctx, &line, &caps["takes"], caps.name("returns").map(|m| m.as_str()))?;
                let text = format!(
                    "{}{}function {} takes {} returns {}",
                    &caps["indent"],
                    Visibility::prefix(vis),
                    name,
                    takes,
                    returns
                );
                stack.push((), line.depth(), out.len());
                out.push(line.derive(text));
                continue;
            }
        }

        if stack.is_empty() {
            out.push(line);
        } else {
            out.push(line.with_tag(Tag::FunctionBody));
        }
    }

    if let Some(anchor) = out.last().cloned() {
        close_with(&mut stack, 0, &anchor, &mut out, |_| "endfunction");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::{test_lines, texts};

    #[test]
    fn test_type_lowering() {
        let mut ctx = CompileContext::default();
        ctx.aliases.define("unitref", "handle").unwrap();
        let out = lower_types(&mut ctx, test_lines("api type Hero extends integer\ntype Ref extends unitref\ntype Bare")).unwrap();
        assert_eq!(
            texts(&out),
            vec![
                "public struct Hero extends array",
                "endstruct",
                "private struct Ref",
                "endstruct",
                "private struct Bare extends array",
                "endstruct",
            ]
        );
    }

    #[test]
    fn test_native_lowering() {
        let mut ctx = CompileContext::default();
        ctx.aliases.define("unitid", "integer").unwrap();
        let out = lower_natives(&mut ctx, test_lines("native GetId(unitid u) -> unitid\nnative Tick()")).unwrap();
        assert_eq!(out[0].text, "native GetId takes integer u returns integer");
        assert_eq!(out[1].text, "native Tick takes nothing returns nothing");
        assert!(out[0].has(&Tag::Native));
    }

    #[test]
    fn test_function_block_and_body_tags() {
        let mut ctx = CompileContext::default();
        let src = "library A:\n    api f(integer a, real b) -> real:\n        return b\n    g():\n        x()\n    y = 1";
        let out = lower_functions(&mut ctx, test_lines(src)).unwrap();
        assert_eq!(
            texts(&out),
            vec![
                "library A:",
                "    public function f takes integer a, real b returns real",
                "        return b",
                "    endfunction",
                "    private function g takes nothing returns nothing",
                "        x()",
                "    endfunction",
                "    y = 1",
            ]
        );
        assert!(out[2].has(&Tag::FunctionBody));
        assert!(!out[7].has(&Tag::FunctionBody));
    }

    #[test]
    fn test_reserved_words_are_not_functions() {
        let mut ctx = CompileContext::default();
        let out = lower_functions(&mut ctx, test_lines("if (x):\n    y()")).unwrap();
        assert_eq!(texts(&out), vec!["if (x):", "    y()"]);
    }

    #[test]
    fn test_statement_and_block_modifier_conflict() {
        let mut ctx = CompileContext::default();
        let line = test_lines("api f():").remove(0).with_tag(Tag::Modifier(Visibility::Api));
        assert!(lower_functions(&mut ctx, vec![line]).is_err());
    }
}
