//! `api:` / `global:` visibility blocks.

use lazy_static::lazy_static;
use regex::Regex;

use crate::block::BlockStack;
use crate::error::{Result, SyntaxError, ERR_MODIFIER_CONFLICT};
use crate::line::{Line, Tag, Visibility, INDENT_WIDTH};

lazy_static! {
    static ref MODIFIER_BLOCK_RE: Regex =
        Regex::new(r"^(?P<indent> *)(?P<modifier>api|global)\s*:\s*$").unwrap();
}

/// Tag every line of a modifier block and dedent it one level; the header
/// itself is dropped.
pub fn lower(lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out = Vec::with_capacity(lines.len());
    let mut stack: BlockStack<Visibility> = BlockStack::new();

    for line in lines {
        stack.close_to(line.depth());

        if let Some(caps) = MODIFIER_BLOCK_RE.captures(&line.text) {
            if !stack.is_empty() {
                return Err(SyntaxError::at(
                    ERR_MODIFIER_CONFLICT,
                    &line,
                    "Modifier blocks cannot be nested",
                ));
            }
            if let Some(vis) = Visibility::parse(&caps["modifier"]) {
                stack.push(vis, line.depth(), out.len());
            }
            continue;
        }

        match stack.top() {
            Some(frame) => {
                let vis = frame.kind;
                let text = line.text[INDENT_WIDTH..].to_string();
                out.push(line.derive(text).with_tag(Tag::Modifier(vis)));
            }
            None => out.push(line),
        }
    }
    Ok(out)
}

/// Effective visibility of a declaration: the statement's own modifier word
/// or the one inherited from a block, never both.
pub fn effective(line: &Line, stated: Option<&str>) -> Result<Option<Visibility>> {
    let inherited = line.tags.modifier();
    let stated = stated.and_then(Visibility::parse);
    match (inherited, stated) {
        (Some(block), Some(own)) => Err(SyntaxError::at(
            ERR_MODIFIER_CONFLICT,
            line,
            format!("Modifier {:?} conflicts with enclosing {:?} block", own, block).to_lowercase(),
        )),
        (block, own) => Ok(block.or(own)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::{test_lines, texts};

    #[test]
    fn test_block_dedents_and_tags() {
        let out = lower(test_lines("library A:\n    api:\n        f():\n            x()\n    g():")).unwrap();
        assert_eq!(texts(&out), vec!["library A:", "    f():", "        x()", "    g():"]);
        assert_eq!(out[1].tags.modifier(), Some(Visibility::Api));
        assert_eq!(out[2].tags.modifier(), Some(Visibility::Api));
        assert_eq!(out[3].tags.modifier(), None);
    }

    #[test]
    fn test_nested_blocks_rejected() {
        let err = lower(test_lines("api:\n    global:\n        x()")).unwrap_err();
        assert_eq!(err.code, ERR_MODIFIER_CONFLICT);
    }

    #[test]
    fn test_effective_visibility_conflict() {
        let line = test_lines("api f():").remove(0).with_tag(Tag::Modifier(Visibility::Global));
        assert!(effective(&line, Some("api")).is_err());
        assert_eq!(effective(&line, None).unwrap(), Some(Visibility::Global));
        let plain = test_lines("f():").remove(0);
        assert_eq!(effective(&plain, Some("api")).unwrap(), Some(Visibility::Api));
        assert_eq!(effective(&plain, None).unwrap(), None);
    }
}
