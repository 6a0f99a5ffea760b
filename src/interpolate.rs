//! `f"…"` / `f'…'` string interpolation.
//!
//! The innermost literal on a line is rewritten first, so an interpolation
//! nested inside another's expression is already plain concatenation when the
//! outer one is processed.

use crate::error::Result;
use crate::line::Line;

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// An `f` directly before a quote, not ending a longer identifier.
fn starts_fstring(chars: &[char], i: usize) -> bool {
    chars[i] == 'f'
        && matches!(chars.get(i + 1), Some('"') | Some('\''))
        && (i == 0 || !is_ident_char(chars[i - 1]))
}

/// Index of the quote closing the plain literal opened at `open`.
fn literal_end(chars: &[char], open: usize) -> Option<usize> {
    let quote = chars[open];
    let mut i = open + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Walk code from `i`, skipping plain literals and recording every f-string
/// span. Inside braces, stops at the `}` that closes the expression.
fn scan_code(chars: &[char], mut i: usize, in_braces: bool, found: &mut Vec<(usize, usize)>) -> Option<usize> {
    let mut depth = 0usize;
    while i < chars.len() {
        if starts_fstring(chars, i) {
            let end = fstring_end(chars, i + 1, found)?;
            found.push((i, end));
            i = end + 1;
            continue;
        }
        match chars[i] {
            '"' | '\'' => i = literal_end(chars, i)? + 1,
            '{' => {
                depth += 1;
                i += 1;
            }
            '}' if in_braces && depth == 0 => return Some(i),
            '}' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            _ => i += 1,
        }
    }
    if in_braces {
        None
    } else {
        Some(i)
    }
}

/// Index of the quote closing the f-string whose opening quote is at `open`.
fn fstring_end(chars: &[char], open: usize, found: &mut Vec<(usize, usize)>) -> Option<usize> {
    let quote = chars[open];
    let mut i = open + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '{' if chars.get(i + 1) == Some(&'{') => i += 2,
            '}' if chars.get(i + 1) == Some(&'}') => i += 2,
            '{' => i = scan_code(chars, i + 1, true, found)? + 1,
            c if c == quote => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// `(start, end)` char indices of every `f"…"` literal outside plain string
/// literals; `end` is the closing quote.
fn spans(chars: &[char]) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    scan_code(chars, 0, false, &mut found);
    found
}

/// Index of the bracket closing the one at `open`.
fn matching_close(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    let mut i = open;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) => {
                if c == '\\' {
                    i += 1;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' => depth += 1,
                ')' | ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Identifier, number, call, index or fully parenthesized expression.
fn is_simple_operand(expr: &str) -> bool {
    let chars: Vec<char> = expr.chars().collect();
    if chars.is_empty() {
        return false;
    }
    let head = chars
        .iter()
        .take_while(|c| c.is_ascii_alphanumeric() || **c == '_' || **c == '.')
        .count();
    if head == chars.len() {
        return true;
    }
    match chars[head] {
        '(' | '[' => matching_close(&chars, head) == Some(chars.len() - 1),
        '"' if head == 0 => matching_close_quote(&chars) == Some(chars.len() - 1),
        _ => false,
    }
}

fn matching_close_quote(chars: &[char]) -> Option<usize> {
    let mut i = 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '"' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn quote_literal(lit: &str) -> String {
    let mut out = String::from("\"");
    let mut chars = lit.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\'') => out.push('\''),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn operand(expr: &str) -> String {
    if is_simple_operand(expr) {
        expr.to_string()
    } else {
        format!("({})", expr)
    }
}

/// Concatenation for the body of one literal, plus the number of operands.
fn expand_body(body: &str) -> (String, usize) {
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                literal.extend(chars[i..chars.len().min(i + 2)].iter());
                i += 2;
            }
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '{' => {
                if !literal.is_empty() {
                    parts.push(quote_literal(&std::mem::take(&mut literal)));
                }
                let end = scan_code(&chars, i + 1, true, &mut Vec::new()).unwrap_or(chars.len());
                let expr: String = chars[i + 1..end].iter().collect();
                parts.push(operand(expr.trim()));
                i = end + 1;
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    if !literal.is_empty() {
        parts.push(quote_literal(&literal));
    }
    if parts.is_empty() {
        return ("\"\"".to_string(), 1);
    }
    let count = parts.len();
    (parts.join(" + "), count)
}

/// Whether the literal already stands alone as an argument or operand.
fn stands_alone(before: &str, after: &str) -> bool {
    let before = before.trim_end();
    let after = after.trim_start();
    let open = before.ends_with('(') || before.ends_with(',');
    let close = after.starts_with(')') || after.starts_with(',');
    if open && close {
        return true;
    }
    after.is_empty()
        && (before.ends_with('=')
            || before == "return"
            || before.ends_with(" return"))
}

fn expand_line(text: &str) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    loop {
        let Some((start, end)) = spans(&chars).into_iter().min_by_key(|(s, e)| e - s) else {
            break;
        };
        let body: String = chars[start + 2..end].iter().collect();
        let (expanded, operands) = expand_body(&body);
        let before: String = chars[..start].iter().collect();
        let after: String = chars[end + 1..].iter().collect();
        let replacement = if operands == 1 || stands_alone(&before, &after) {
            expanded
        } else {
            format!("({})", expanded)
        };
        let tail = chars.split_off(end + 1);
        chars.truncate(start);
        chars.extend(replacement.chars());
        chars.extend(tail);
    }
    chars.into_iter().collect()
}

pub fn expand(lines: Vec<Line>) -> Result<Vec<Line>> {
    Ok(lines
        .into_iter()
        .map(|line| {
            if !line.text.contains("f\"") && !line.text.contains("f'") {
                return line;
            }
            let text = expand_line(&line.text);
            line.derive(text)
        })
        .collect())
}
