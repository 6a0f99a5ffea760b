//! Normalizer passes: comments and blank lines, line continuation, and
//! non-portable characters.

use crate::error::{Result, SyntaxError, ERR_CONTINUATION};
use crate::line::{Line, INDENT};

// ═══════════════════════════════════════════════════════════════════════════════
// QUOTE-AWARE SCANNING
// ═══════════════════════════════════════════════════════════════════════════════

/// Split `text` into `(segment, quoted)` runs. Both `"…"` strings and `'…'`
/// rawcodes count as quoted; backslash escapes are honoured inside them.
pub fn segments(text: &str) -> Vec<(&str, bool)> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'"' || c == b'\'' {
            if start < i {
                out.push((&text[start..i], false));
            }
            let quote = c;
            let open = i;
            i += 1;
            while i < bytes.len() && bytes[i] != quote {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            let end = (i + 1).min(bytes.len());
            out.push((&text[open..end], true));
            i = end;
            start = end;
            continue;
        }
        i += 1;
    }
    if start < bytes.len() {
        out.push((&text[start..], false));
    }
    out
}

/// Rewrite only the unquoted parts of a line.
pub fn map_code(text: &str, mut f: impl FnMut(&str) -> String) -> String {
    segments(text)
        .into_iter()
        .map(|(seg, quoted)| if quoted { seg.to_string() } else { f(seg) })
        .collect()
}

/// Byte offset of the first `needle` outside quotes.
fn find_unquoted(text: &str, needle: char) -> Option<usize> {
    let mut offset = 0;
    for (seg, quoted) in segments(text) {
        if !quoted {
            if let Some(i) = seg.find(needle) {
                return Some(offset + i);
            }
        }
        offset += seg.len();
    }
    None
}

/// Net `(`/`[` nesting of the unquoted parts.
fn bracket_balance(text: &str) -> i32 {
    segments(text)
        .into_iter()
        .filter(|(_, quoted)| !quoted)
        .flat_map(|(seg, _)| seg.chars())
        .map(|c| match c {
            '(' | '[' => 1,
            ')' | ']' => -1,
            _ => 0,
        })
        .sum()
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Drop `#` comments, `"""` blocks and blank lines; expand leading tabs.
pub fn strip_comments(lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out = Vec::with_capacity(lines.len());
    let mut in_block = false;
    for line in lines {
        if line.text.trim() == "\"\"\"" {
            in_block = !in_block;
            continue;
        }
        if in_block {
            continue;
        }
        let body = line.text.trim_start_matches(|c| c == ' ' || c == '\t');
        let lead = &line.text[..line.text.len() - body.len()];
        let mut text = format!("{}{}", lead.replace('\t', INDENT), body);
        if let Some(at) = find_unquoted(&text, '#') {
            text.truncate(at);
        }
        let text = text.trim_end();
        if text.trim().is_empty() {
            continue;
        }
        out.push(line.derive(text));
    }
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// LINE CONTINUATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Join `\`-terminated lines and lines with open brackets onto one line.
pub fn join_continuations(lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out: Vec<Line> = Vec::with_capacity(lines.len());
    let mut pending: Option<(Line, i32)> = None;

    for line in lines {
        let mut joined = match pending.take() {
            Some((head, _)) => {
                let text = format!("{} {}", head.text.trim_end(), line.text.trim());
                head.derive(text)
            }
            None => line,
        };

        let explicit = joined.text.ends_with('\\');
        if explicit {
            joined.text.pop();
        }
        let balance = bracket_balance(&joined.text);

        if explicit || balance > 0 {
            pending = Some((joined, balance));
        } else {
            out.push(joined);
        }
    }

    if let Some((line, depth)) = pending {
        if depth > 0 {
            return Err(SyntaxError::at(ERR_CONTINUATION, &line, "Unclosed bracket at end of file"));
        }
        let text = line.text.trim_end().to_string();
        out.push(line.derive(text));
    }
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NON-PORTABLE CHARACTERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Replace non-ASCII runs outside literals with `U_XXXX` identifier fragments.
pub fn escape_non_portable(lines: Vec<Line>) -> Result<Vec<Line>> {
    Ok(lines
        .into_iter()
        .map(|line| {
            if line.text.is_ascii() {
                return line;
            }
            let text = map_code(&line.text, escape_run);
            line.derive(text)
        })
        .collect())
}

fn escape_run(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut in_run = false;
    for c in code.chars() {
        if c.is_ascii() {
            in_run = false;
            out.push(c);
        } else {
            if !in_run {
                out.push('U');
                in_run = true;
            }
            out.push_str(&format!("_{:04X}", c as u32));
        }
    }
    out
}
