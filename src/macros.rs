//! Macro engine.
//!
//! Definitions are collected from every file before any invocation is
//! expanded, so a macro can be used ahead of (or without importing) the file
//! that defines it once both are in the graph.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::alias::IDENT_RE;
use crate::block::BlockStack;
use crate::context::CompileContext;
use crate::error::{
    Result, SyntaxError, ERR_MACRO_ARITY, ERR_MACRO_BODY, ERR_MACRO_DUPLICATE, ERR_MACRO_NESTED,
    ERR_MACRO_PARAMS, ERR_MACRO_PLACEMENT, ERR_MACRO_RECURSION, ERR_MACRO_UNKNOWN,
};
use crate::line::{indent_for, Line, INDENT_WIDTH};
use crate::normalize::segments;
use crate::units::group_header;

pub const MAX_EXPANSION_DEPTH: usize = 32;

lazy_static! {
    static ref MACRO_DEF_RE: Regex = Regex::new(
        r"^(?P<indent> *)macro\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\((?P<params>[^)]*)\)\s*:\s*$"
    )
    .unwrap();
    static ref INVOKE_RE: Regex = Regex::new(
        r"^(?P<indent> *)(?P<name>(?:[A-Za-z][A-Za-z0-9_]*\.)?[A-Za-z_][A-Za-z0-9_]*)!\((?P<args>.*)\)\s*$"
    )
    .unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDef {
    /// `Group.NAME`
    pub name: String,
    pub params: Vec<String>,
    /// Body text re-based to depth zero.
    pub body: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MacroRegistry {
    defs: HashMap<String, MacroDef>,
}

impl MacroRegistry {
    pub fn define(&mut self, def: MacroDef) -> std::result::Result<(), String> {
        if self.defs.contains_key(&def.name) {
            return Err(format!("Macro \"{}\" is already defined", def.name));
        }
        self.defs.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn get(&self, qualified: &str) -> Option<&MacroDef> {
        self.defs.get(qualified)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

fn parse_params(raw: &str) -> std::result::Result<Vec<String>, String> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut seen = HashSet::new();
    let mut params = Vec::new();
    for param in raw.split(',').map(str::trim) {
        if !IDENT_RE.is_match(param) {
            return Err(format!("Illegal macro parameter \"{}\"", param));
        }
        if !seen.insert(param) {
            return Err(format!("Duplicate macro parameter \"{}\"", param));
        }
        params.push(param.to_string());
    }
    Ok(params)
}

/// Innermost-first names of the grouping constructs enclosing a line.
fn enclosing(groups: &BlockStack<String>) -> Vec<String> {
    groups.iter().rev().map(|f| f.kind.clone()).collect()
}

fn track_group(groups: &mut BlockStack<String>, line: &Line) {
    groups.close_to(line.depth());
    if let Some((_, Some(name), depth)) = group_header(line) {
        groups.push(name, depth, 0);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRATION (collection stage)
// ═══════════════════════════════════════════════════════════════════════════════

struct Pending {
    def: MacroDef,
    depth: usize,
    header: Line,
}

fn finish(ctx: &mut CompileContext, pending: Pending) -> Result<()> {
    if pending.def.body.is_empty() {
        return Err(SyntaxError::at(ERR_MACRO_BODY, &pending.header, "Macro body is empty"));
    }
    debug!("registered macro {}", pending.def.name);
    ctx.macros
        .define(pending.def)
        .map_err(|msg| SyntaxError::at(ERR_MACRO_DUPLICATE, &pending.header, msg))
}

/// Record `macro NAME(params):` definitions and drop them from the stream.
pub fn register(ctx: &mut CompileContext, lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out = Vec::with_capacity(lines.len());
    let mut groups: BlockStack<String> = BlockStack::new();
    let mut pending: Option<Pending> = None;

    for line in lines {
        let depth = line.depth();

        if let Some(current) = pending.as_mut() {
            if depth > current.depth {
                if MACRO_DEF_RE.is_match(&line.text) {
                    return Err(SyntaxError::at(
                        ERR_MACRO_NESTED,
                        &line,
                        "Macro definitions cannot be nested",
                    ));
                }
                let strip = (current.depth + 1) * INDENT_WIDTH;
                current.def.body.push(line.text[strip..].to_string());
                continue;
            }
            if let Some(done) = pending.take() {
                finish(ctx, done)?;
            }
        }

        track_group(&mut groups, &line);

        if let Some(caps) = MACRO_DEF_RE.captures(&line.text) {
            let Some(group) = groups.top().map(|f| f.kind.clone()) else {
                return Err(SyntaxError::at(
                    ERR_MACRO_PLACEMENT,
                    &line,
                    "Macros must be defined inside a library, system, data or content block",
                ));
            };
            let params = parse_params(&caps["params"])
                .map_err(|msg| SyntaxError::at(ERR_MACRO_PARAMS, &line, msg))?;
            pending = Some(Pending {
                def: MacroDef {
                    name: format!("{}.{}", group, &caps["name"]),
                    params,
                    body: Vec::new(),
                },
                depth,
                header: line,
            });
            continue;
        }

        out.push(line);
    }

    if let Some(done) = pending {
        finish(ctx, done)?;
    }
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPANSION (lowering stage)
// ═══════════════════════════════════════════════════════════════════════════════

/// Split on commas outside quotes and brackets; quoted arguments are unwrapped.
pub fn split_args(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    for (seg, quoted) in segments(raw) {
        if quoted {
            current.push_str(seg);
            continue;
        }
        for c in seg.chars() {
            match c {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                ',' if depth == 0 => {
                    args.push(std::mem::take(&mut current));
                    continue;
                }
                _ => {}
            }
            current.push(c);
        }
    }
    args.push(current);
    args.into_iter().map(|a| unwrap_quotes(a.trim())).collect()
}

fn unwrap_quotes(arg: &str) -> String {
    let wrapped = arg.len() >= 2
        && ((arg.starts_with('"') && arg.ends_with('"'))
            || (arg.starts_with('\'') && arg.ends_with('\'')));
    if wrapped && segments(arg).len() == 1 {
        arg[1..arg.len() - 1].to_string()
    } else {
        arg.to_string()
    }
}

fn lookup<'a>(ctx: &'a CompileContext, name: &str, groups: &[String]) -> Option<&'a MacroDef> {
    if !name.contains('.') {
        for group in groups {
            if let Some(def) = ctx.macros.get(&format!("{}.{}", group, name)) {
                return Some(def);
            }
        }
    }
    ctx.macros.get(name)
}

fn expand_line(
    ctx: &CompileContext,
    groups: &[String],
    line: Line,
    level: usize,
    out: &mut Vec<Line>,
) -> Result<()> {
    let Some(caps) = INVOKE_RE.captures(&line.text) else {
        out.push(line);
        return Ok(());
    };
    if groups.is_empty() {
        return Err(SyntaxError::at(
            ERR_MACRO_PLACEMENT,
            &line,
            "Macros can only be invoked inside a library, system, data or content block",
        ));
    }
    if level >= MAX_EXPANSION_DEPTH {
        return Err(SyntaxError::at(
            ERR_MACRO_RECURSION,
            &line,
            format!("Macro expansion deeper than {} levels", MAX_EXPANSION_DEPTH),
        ));
    }

    let name = &caps["name"];
    let def = lookup(ctx, name, groups)
        .ok_or_else(|| SyntaxError::at(ERR_MACRO_UNKNOWN, &line, format!("Unknown macro \"{}\"", name)))?;
    let args = split_args(&caps["args"]);
    if args.len() != def.params.len() {
        return Err(SyntaxError::at(
            ERR_MACRO_ARITY,
            &line,
            format!(
                "Macro \"{}\" takes {} argument(s), {} given",
                def.name,
                def.params.len(),
                args.len()
            ),
        ));
    }

    let indent = indent_for(line.depth());
    for body in &def.body {
        let text = format!("{}{}", indent, substitute_params(body, &def.params, &args));
        expand_line(ctx, groups, line.derive(text), level + 1, out)?;
    }
    Ok(())
}

/// Replace each `$param$` in one left-to-right scan; argument text is never
/// rescanned.
fn substitute_params(body: &str, params: &[String], args: &[String]) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(start) = rest.find('$') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let matched = after.find('$').and_then(|end| {
            let name = &after[..end];
            params.iter().position(|p| p == name).map(|i| (i, end))
        });
        match matched {
            Some((i, end)) => {
                out.push_str(&args[i]);
                rest = &after[end + 1..];
            }
            None => {
                out.push('$');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Replace `NAME!(args)` statements with their substituted bodies.
pub fn expand(ctx: &mut CompileContext, lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out = Vec::with_capacity(lines.len());
    let mut groups: BlockStack<String> = BlockStack::new();
    for line in lines {
        track_group(&mut groups, &line);
        let scope = enclosing(&groups);
        expand_line(ctx, &scope, line, 0, &mut out)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::{test_lines, texts};

    fn setup(src: &str) -> (CompileContext, Vec<Line>) {
        let mut ctx = CompileContext::default();
        let lines = register(&mut ctx, test_lines(src)).unwrap();
        (ctx, lines)
    }

    #[test]
    fn test_definition_removed_and_qualified() {
        let (ctx, lines) = setup("library A:\n    macro LOG(msg):\n        print($msg$)\n    foo()");
        assert_eq!(texts(&lines), vec!["library A:", "    foo()"]);
        let def = ctx.macros.get("A.LOG").unwrap();
        assert_eq!(def.params, vec!["msg"]);
        assert_eq!(def.body, vec!["print($msg$)"]);
    }

    #[test]
    fn test_expansion_substitutes_and_reindents() {
        let src = "library A:\n    macro SET(name, v):\n        $name$ = $v$\n        if $name$ > 0:\n            go()\n    f():\n        SET!(x, g(1, 2))";
        let (mut ctx, lines) = setup(src);
        let out = expand(&mut ctx, lines).unwrap();
        assert_eq!(
            texts(&out),
            vec!["library A:", "    f():", "        x = g(1, 2)", "        if x > 0:", "            go()"]
        );
        assert_eq!(out[2].pos.line, Some(7));
    }

    #[test]
    fn test_arguments_are_not_substituted_again() {
        let src = "library A:\n    macro PAIR(a, b):\n        f($a$, $b$)\n    PAIR!(\"$b$\", 2)";
        let (mut ctx, lines) = setup(src);
        let out = expand(&mut ctx, lines).unwrap();
        assert_eq!(out[1].text, "    f($b$, 2)");

        let params = vec!["y".to_string()];
        assert_eq!(substitute_params("$x$y$ + $", &params, &["1".to_string()]), "$x1 + $");
    }

    #[test]
    fn test_zero_argument_macro_is_stable() {
        let src = "library A:\n    macro TICK():\n        n++\n    f():\n        TICK!()\n        TICK!()";
        let (mut ctx, lines) = setup(src);
        let out = expand(&mut ctx, lines).unwrap();
        assert_eq!(out[2].text, out[3].text);
    }

    #[test]
    fn test_qualified_invocation_from_another_group() {
        let src = "library A:\n    macro ONE():\n        one()\nlibrary B:\n    A.ONE!()";
        let (mut ctx, lines) = setup(src);
        let out = expand(&mut ctx, lines).unwrap();
        assert_eq!(out[2].text, "    one()");
    }

    #[test]
    fn test_nested_invocation_expands() {
        let src = "library A:\n    macro INNER(v):\n        use($v$)\n    macro OUTER(v):\n        INNER!($v$)\n    OUTER!(z)";
        let (mut ctx, lines) = setup(src);
        let out = expand(&mut ctx, lines).unwrap();
        assert_eq!(out[1].text, "    use(z)");
    }

    #[test]
    fn test_recursion_limit() {
        let src = "library A:\n    macro LOOP():\n        LOOP!()\n    LOOP!()";
        let (mut ctx, lines) = setup(src);
        let err = expand(&mut ctx, lines).unwrap_err();
        assert_eq!(err.code, ERR_MACRO_RECURSION);
    }

    #[test]
    fn test_definition_errors() {
        let mut ctx = CompileContext::default();
        let err = register(&mut ctx, test_lines("macro A():\n    x()")).unwrap_err();
        assert_eq!(err.code, ERR_MACRO_PLACEMENT);

        let err = register(&mut ctx, test_lines("library L:\n    macro A():\n        macro B():\n            x()")).unwrap_err();
        assert_eq!(err.code, ERR_MACRO_NESTED);

        let err = register(&mut ctx, test_lines("library L:\n    macro A(x, x):\n        x()")).unwrap_err();
        assert_eq!(err.code, ERR_MACRO_PARAMS);

        let err = register(&mut ctx, test_lines("library L:\n    macro A():\nfoo()")).unwrap_err();
        assert_eq!(err.code, ERR_MACRO_BODY);

        let mut ctx = CompileContext::default();
        let err = register(&mut ctx, test_lines("library L:\n    macro A():\n        x()\n    macro A():\n        y()")).unwrap_err();
        assert_eq!(err.code, ERR_MACRO_DUPLICATE);
    }

    #[test]
    fn test_invocation_errors() {
        let (mut ctx, lines) = setup("library A:\n    macro ONE(a):\n        one($a$)\n    ONE!()\n");
        assert_eq!(expand(&mut ctx, lines).unwrap_err().code, ERR_MACRO_ARITY);

        let (mut ctx, lines) = setup("library A:\n    NOPE!()");
        assert_eq!(expand(&mut ctx, lines).unwrap_err().code, ERR_MACRO_UNKNOWN);

        let (mut ctx, lines) = setup("foo()\nNOPE!()");
        assert_eq!(expand(&mut ctx, lines).unwrap_err().code, ERR_MACRO_PLACEMENT);
    }

    #[test]
    fn test_split_args_respects_quotes_and_brackets() {
        assert_eq!(split_args(r#"a, f(b, c), "d, e", [1, 2]"#), vec!["a", "f(b, c)", "d, e", "[1, 2]"]);
        assert!(split_args("  ").is_empty());
    }
}
