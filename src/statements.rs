//! Statement-level rewrites: keyword substitution and `call`/`set` prefixing.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Result;
use crate::line::{Line, Tag};
use crate::normalize::map_code;

/// Words that start a statement of their own and never name a function,
/// variable type or call target.
pub const RESERVED_WORDS: [&str; 51] = [
    "alias", "and", "api", "array", "break", "call", "constant", "content", "data", "debug",
    "else", "elseif", "endfunction", "endglobals", "endif", "endlibrary", "endloop", "endscope",
    "endstruct", "exitwhen", "extends", "function", "global", "globals", "if", "import", "init",
    "library", "local", "loop", "macro", "native", "not", "or", "pass", "private", "public",
    "requires", "return", "returns", "scope", "set", "static", "struct", "system", "takes", "then",
    "type", "until", "uses", "while",
];

pub fn is_reserved(word: &str) -> bool {
    RESERVED_WORDS.contains(&word)
}

fn first_word(text: &str) -> &str {
    let trimmed = text.trim_start();
    let end = trimmed
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(trimmed.len());
    &trimmed[..end]
}

lazy_static! {
    static ref NONE_RE: Regex = Regex::new(r"\bNone\b").unwrap();
    static ref TRUE_RE: Regex = Regex::new(r"\bTrue\b").unwrap();
    static ref FALSE_RE: Regex = Regex::new(r"\bFalse\b").unwrap();
    static ref AND_RE: Regex = Regex::new(r"\s*&&\s*").unwrap();
    static ref OR_RE: Regex = Regex::new(r"\s*\|\|\s*").unwrap();
    static ref PASS_RE: Regex = Regex::new(r"^\s*pass\s*$").unwrap();
    static ref CALL_RE: Regex =
        Regex::new(r"^(?P<indent> *)(?P<call>[A-Za-z][A-Za-z0-9_.\[\]]*\s*\(.*\))\s*$").unwrap();
    static ref ASSIGN_RE: Regex = Regex::new(
        r"^(?P<indent> *)(?P<name>[A-Za-z][A-Za-z0-9_.\[\]]*)\s*(?P<op>\+\+|--|\*\*|//|!!|\+=|-=|\*=|/=|=)\s*(?P<value>.*?)\s*$"
    )
    .unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEYWORDS
// ═══════════════════════════════════════════════════════════════════════════════

fn substitute_keywords(code: &str) -> String {
    let code = NONE_RE.replace_all(code, "null");
    let code = TRUE_RE.replace_all(&code, "true");
    let code = FALSE_RE.replace_all(&code, "false");
    let code = AND_RE.replace_all(&code, " and ");
    OR_RE.replace_all(&code, " or ").into_owned()
}

/// Literal and operator spellings of the DSL mapped to the output language.
pub fn substitute(lines: Vec<Line>) -> Result<Vec<Line>> {
    Ok(lines
        .into_iter()
        .filter(|line| !PASS_RE.is_match(&line.text))
        .map(|line| {
            let text = map_code(&line.text, substitute_keywords);
            if text == line.text {
                line
            } else {
                line.derive(text)
            }
        })
        .collect())
}

// ═══════════════════════════════════════════════════════════════════════════════
// CALL / SET PREFIX
// ═══════════════════════════════════════════════════════════════════════════════

fn assignment(name: &str, op: &str, value: &str) -> Option<String> {
    let rhs = match (op, value.is_empty()) {
        ("=", false) => value.to_string(),
        ("++", true) => format!("{} + 1", name),
        ("--", true) => format!("{} - 1", name),
        ("**", true) => format!("{} * 2", name),
        ("//", true) => format!("{} / 2", name),
        ("!!", true) => format!("not {}", name),
        ("+=", false) => format!("{} + {}", name, value),
        ("-=", false) => format!("{} - {}", name, value),
        ("*=", false) => format!("{} * {}", name, value),
        ("/=", false) => format!("{} / {}", name, value),
        _ => return None,
    };
    Some(format!("set {} = {}", name, rhs))
}

/// Inside function bodies: bare calls gain `call`, assignments gain `set`.
pub fn prefix(lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        if !line.has(&Tag::FunctionBody) || is_reserved(first_word(&line.text)) {
            out.push(line);
            continue;
        }

        if let Some(caps) = CALL_RE.captures(&line.text) {
            let text = format!("{}call {}", &caps["indent"], &caps["call"]);
            out.push(line.derive(text));
            continue;
        }

        let rewritten = ASSIGN_RE.captures(&line.text).and_then(|caps| {
            assignment(&caps["name"], &caps["op"], &caps["value"])
                .map(|stmt| format!("{}{}", &caps["indent"], stmt))
        });
        match rewritten {
            Some(text) => out.push(line.derive(text)),
            None => out.push(line),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::{test_lines, texts};

    fn body(src: &str) -> Vec<Line> {
        test_lines(src)
            .into_iter()
            .map(|l| l.with_tag(Tag::FunctionBody))
            .collect()
    }

    #[test]
    fn test_keyword_substitution_skips_strings() {
        let src = "x = None\nif True && a||b:\n    pass\ns = \"None && True\"";
        let out = substitute(test_lines(src)).unwrap();
        assert_eq!(
            texts(&out),
            vec!["x = null", "if true and a or b:", "s = \"None && True\""]
        );
    }

    #[test]
    fn test_call_and_set_prefixes() {
        let src = "    DoThing(1, 2)\n    Unit.kill(u)\n    x = 1\n    hp[i] += dmg\n    n++\n    n--\n    n**\n    n//\n    flag!!\n    v -= 2\n    v *= 3\n    v /= 4";
        let out = prefix(body(src)).unwrap();
        assert_eq!(
            texts(&out),
            vec![
                "    call DoThing(1, 2)",
                "    call Unit.kill(u)",
                "    set x = 1",
                "    set hp[i] = hp[i] + dmg",
                "    set n = n + 1",
                "    set n = n - 1",
                "    set n = n * 2",
                "    set n = n / 2",
                "    set flag = not flag",
                "    set v = v - 2",
                "    set v = v * 3",
                "    set v = v / 4",
            ]
        );
    }

    #[test]
    fn test_reserved_and_non_function_lines_untouched() {
        let out = prefix(body("    return f(x)\n    set y = 2\n    exitwhen true")).unwrap();
        assert_eq!(texts(&out), vec!["    return f(x)", "    set y = 2", "    exitwhen true"]);

        let out = prefix(test_lines("x = 1\nf()")).unwrap();
        assert_eq!(texts(&out), vec!["x = 1", "f()"]);
    }

    #[test]
    fn test_reserved_word_lookup() {
        assert!(is_reserved("while"));
        assert!(is_reserved("if"));
        assert!(!is_reserved("Damage"));
    }
}
