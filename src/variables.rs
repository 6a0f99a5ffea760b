//! Variable declarations: `[api|global] TYPE [*]NAME [= VALUE]`.
//!
//! Inside a function body a declaration becomes a `local`; anywhere else it
//! is promoted into a `globals` block opened lazily at the declaration's
//! depth and closed on dedent.

use lazy_static::lazy_static;
use regex::Regex;

use crate::block::{close_with, BlockStack};
use crate::context::CompileContext;
use crate::error::{Result, SyntaxError, ERR_ALIAS};
use crate::line::{indent_for, Line, Tag, Visibility};
use crate::modifier;
use crate::statements::is_reserved;

lazy_static! {
    static ref VARIABLE_RE: Regex = Regex::new(
        r"^(?P<indent> *)(?:(?P<modifier>api|global)\s+)?(?P<type>[A-Za-z][A-Za-z0-9_]*)\s+(?P<mutable>\*)?(?P<name>[A-Za-z][A-Za-z0-9_]*)(?:\s*=\s*(?P<value>.*?))?\s*$"
    )
    .unwrap();
    static ref ARRAY_VALUE_RE: Regex = Regex::new(r"^\[[^\]]*\]$").unwrap();
    static ref TABLE_VALUE_RE: Regex = Regex::new(r"^\{[^}]*\}$").unwrap();
}

#[derive(Debug)]
struct Declaration {
    vis: Option<Visibility>,
    ty: String,
    name: String,
    mutable: bool,
    value: Option<String>,
}

impl Declaration {
    /// `[constant ]TYPE [array ]NAME[ = VALUE]` without any leading keyword.
    fn render(&self) -> String {
        match self.value.as_deref() {
            None => format!("{} {}", self.ty, self.name),
            Some(v) if ARRAY_VALUE_RE.is_match(v) => format!("{} array {}", self.ty, self.name),
            Some(v) => {
                let value = if TABLE_VALUE_RE.is_match(v) {
                    "InitHashtable()"
                } else if self.ty == "integer" && (v == "None" || v == "null") {
                    "0"
                } else {
                    v
                };
                let constant = if self.mutable { "" } else { "constant " };
                format!("{}{} {} = {}", constant, self.ty, self.name, value)
            }
        }
    }
}

fn parse(ctx: &CompileContext, line: &Line) -> Result<Option<Declaration>> {
    let Some(caps) = VARIABLE_RE.captures(&line.text) else {
        return Ok(None);
    };
    let ty = &caps["type"];
    if is_reserved(ty) {
        return Ok(None);
    }
    let vis = modifier::effective(line, caps.name("modifier").map(|m| m.as_str()))?;
    let ty = ctx
        .aliases
        .resolve(ty)
        .map_err(|msg| SyntaxError::at(ERR_ALIAS, line, msg))?;
    Ok(Some(Declaration {
        vis,
        ty,
        name: caps["name"].to_string(),
        mutable: caps.name("mutable").is_some(),
        value: caps
            .name("value")
            .map(|m| m.as_str().to_string())
            .filter(|v| !v.is_empty()),
    }))
}

pub fn lower(ctx: &mut CompileContext, lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out = Vec::with_capacity(lines.len());
    let mut globals: BlockStack<()> = BlockStack::new();

    for line in lines {
        let depth = line.depth();
        let decl = parse(ctx, &line)?;

        if decl.is_some() && !line.has(&Tag::FunctionBody) {
            close_with(&mut globals, depth + 1, &line, &mut out, |_| "endglobals");
            if globals.top().map_or(true, |f| f.depth != depth) {
                close_with(&mut globals, 0, &line, &mut out, |_| "endglobals");
                globals.push((), depth, out.len());
                out.push(
                    line.synthetic(format!("{}globals", indent_for(depth)))
                        .with_tag(Tag::GlobalBlock),
                );
            }
        } else {
            close_with(&mut globals, depth, &line, &mut out, |_| "endglobals");
        }

        let Some(decl) = decl else {
            out.push(line);
            continue;
        };

        let text = if line.has(&Tag::FunctionBody) {
            format!("{}local {}", indent_for(depth), decl.render())
        } else {
            format!(
                "{}{}{}",
                indent_for(depth + 1),
                Visibility::prefix(decl.vis),
                decl.render()
            )
        };
        let lowered = line.derive(text);
        if line.has(&Tag::FunctionBody) {
            out.push(lowered);
        } else {
            out.push(lowered.with_tag(Tag::GlobalBlock));
        }
    }

    if let Some(anchor) = out.last().cloned() {
        close_with(&mut globals, 0, &anchor, &mut out, |_| "endglobals");
    }
    Ok(out)
}
