//! Local-variable hoisting.
//!
//! The output language only accepts `local` declarations at the top of a
//! function. Each function frame keeps a hoist cursor pointing at the last
//! line of its declaration prefix; declarations found later are moved there
//! and leave a `set` behind when they carried an initializer.

use lazy_static::lazy_static;
use regex::Regex;

use crate::block::BlockStack;
use crate::error::{Result, SyntaxError, ERR_ORPHAN_LOCAL};
use crate::line::{indent_for, Line};

lazy_static! {
    static ref FUNCTION_HEADER_RE: Regex = Regex::new(
        r"^(?P<indent> *)(?:(?:private|public)\s+)?function\s+[A-Za-z][A-Za-z0-9_]*\s+takes\b"
    )
    .unwrap();
    static ref LOCAL_RE: Regex = Regex::new(
        r"^(?P<indent> *)local\s+(?P<constant>constant\s+)?(?P<type>[A-Za-z][A-Za-z0-9_]*)\s+(?:(?P<array>array)\s+)?(?P<name>[A-Za-z][A-Za-z0-9_]*)(?:\s*=\s*(?P<value>.*?))?\s*$"
    )
    .unwrap();
}

pub fn lower(lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out: Vec<Line> = Vec::with_capacity(lines.len());
    // Frame cursor: index of the last line of the declaration prefix.
    let mut stack: BlockStack<()> = BlockStack::new();

    for line in lines {
        let depth = line.depth();
        stack.close_to(depth);

        if FUNCTION_HEADER_RE.is_match(&line.text) {
            stack.push((), depth, out.len());
            out.push(line);
            continue;
        }

        let Some(caps) = LOCAL_RE.captures(&line.text) else {
            out.push(line);
            continue;
        };
        let Some(frame) = stack.top_mut() else {
            return Err(SyntaxError::at(ERR_ORPHAN_LOCAL, &line, "local declared outside of a function"));
        };

        if out.len() == frame.cursor + 1 {
            frame.cursor += 1;
            out.push(line);
            continue;
        }

        let constant = caps.name("constant").is_some();
        let value = caps.name("value").map(|m| m.as_str()).filter(|v| !v.is_empty());
        let mut decl = format!("{}local ", indent_for(frame.depth + 1));
        if constant {
            decl.push_str("constant ");
        }
        decl.push_str(&caps["type"]);
        if caps.name("array").is_some() {
            decl.push_str(" array");
        }
        decl.push(' ');
        decl.push_str(&caps["name"]);
        if let (true, Some(v)) = (constant, value) {
            decl.push_str(" = ");
            decl.push_str(v);
        }

        frame.cursor += 1;
        out.insert(frame.cursor, line.derive(decl));
        if let (false, Some(v)) = (constant, value) {
            out.push(line.derive(format!("{}set {} = {}", &caps["indent"], &caps["name"], v)));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::{test_lines, texts};

    #[test]
    fn test_hoists_interleaved_declarations() {
        let src = "private function f takes nothing returns nothing\n    call a()\n    local integer d1 = 1\n    call b()\n    local real d2\n    call c()\n    local unit d3 = u\nendfunction";
        let out = lower(test_lines(src)).unwrap();
        assert_eq!(
            texts(&out),
            vec![
                "private function f takes nothing returns nothing",
                "    local integer d1",
                "    local real d2",
                "    local unit d3",
                "    call a()",
                "    set d1 = 1",
                "    call b()",
                "    call c()",
                "    set d3 = u",
                "endfunction",
            ]
        );
    }

    #[test]
    fn test_leading_declarations_stay_in_place() {
        let src = "function f takes nothing returns nothing\n    local integer a = 1\n    local constant real b = 2.0\n    call x()\n    local constant integer c = 3";
        let out = lower(test_lines(src)).unwrap();
        assert_eq!(
            texts(&out),
            vec![
                "function f takes nothing returns nothing",
                "    local integer a = 1",
                "    local constant real b = 2.0",
                "    local constant integer c = 3",
                "    call x()",
            ]
        );
    }

    #[test]
    fn test_nested_block_declaration_hoists_to_function_top() {
        let src = "library A\n    public function f takes nothing returns nothing\n        loop\n            local integer i = 0\n        endloop\n    endfunction";
        let out = lower(test_lines(src)).unwrap();
        assert_eq!(out[2].text, "        local integer i");
        assert_eq!(out[4].text, "            set i = 0");
    }

    #[test]
    fn test_local_outside_function() {
        let err = lower(test_lines("local integer x")).unwrap_err();
        assert_eq!(err.code, ERR_ORPHAN_LOCAL);
    }
}
