//! Type aliases: `alias NAME = TYPE`.
//!
//! Aliases are registered during collection so every file sees every alias,
//! then resolved wherever a type appears in a declaration.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::context::CompileContext;
use crate::error::{Result, SyntaxError, ERR_ALIAS, ERR_IDENTIFIER};
use crate::line::Line;

lazy_static! {
    static ref ALIAS_RE: Regex =
        Regex::new(r"^\s*alias\s+(?P<name>\S+)\s*=\s*(?P<target>\S+)\s*$").unwrap();
    pub static ref IDENT_RE: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap();
}

pub const BUILTIN_TYPES: [&str; 7] = ["integer", "real", "boolean", "string", "code", "handle", "nothing"];

#[derive(Debug, Default)]
pub struct AliasTable {
    targets: HashMap<String, String>,
}

impl AliasTable {
    pub fn define(&mut self, name: &str, target: &str) -> std::result::Result<(), String> {
        if !IDENT_RE.is_match(name) || BUILTIN_TYPES.contains(&name) {
            return Err(format!("Illegal alias name \"{}\"", name));
        }
        if !IDENT_RE.is_match(target) {
            return Err(format!("Illegal alias target \"{}\"", target));
        }
        match self.targets.get(name) {
            Some(existing) if existing != target => Err(format!(
                "Alias \"{}\" already refers to \"{}\"",
                name, existing
            )),
            _ => {
                self.targets.insert(name.to_string(), target.to_string());
                Ok(())
            }
        }
    }

    /// Follow the alias chain to a concrete type name.
    pub fn resolve(&self, ty: &str) -> std::result::Result<String, String> {
        let mut current = ty;
        let mut steps = 0;
        while let Some(next) = self.targets.get(current) {
            steps += 1;
            if steps > self.targets.len() {
                return Err(format!("Alias cycle through \"{}\"", ty));
            }
            current = next;
        }
        Ok(current.to_string())
    }

    /// Resolve every type in a `type name, type name` parameter list.
    pub fn resolve_params(&self, params: &str) -> std::result::Result<String, String> {
        if params.trim().is_empty() || params.trim() == "nothing" {
            return Ok("nothing".to_string());
        }
        let mut resolved = Vec::new();
        for param in params.split(',') {
            let mut words = param.split_whitespace();
            match (words.next(), words.next(), words.next()) {
                (Some(ty), Some(name), None) => {
                    resolved.push(format!("{} {}", self.resolve(ty)?, name));
                }
                _ => return Err(format!("Malformed parameter \"{}\"", param.trim())),
            }
        }
        Ok(resolved.join(", "))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Collection pass: record alias declarations and drop them from the stream.
pub fn register(ctx: &mut CompileContext, lines: Vec<Line>) -> Result<Vec<Line>> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        if let Some(caps) = ALIAS_RE.captures(&line.text) {
            let name = &caps["name"];
            let code = if IDENT_RE.is_match(name) { ERR_ALIAS } else { ERR_IDENTIFIER };
            ctx.aliases
                .define(name, &caps["target"])
                .map_err(|msg| SyntaxError::at(code, &line, msg))?;
            continue;
        }
        out.push(line);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::test_lines;

    #[test]
    fn test_register_and_resolve_chain() {
        let mut ctx = CompileContext::default();
        let out = register(&mut ctx, test_lines("alias unitid = integer\nalias heroid = unitid\nfoo()")).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(ctx.aliases.resolve("heroid").unwrap(), "integer");
        assert_eq!(ctx.aliases.resolve("real").unwrap(), "real");
    }

    #[test]
    fn test_builtin_alias_is_illegal() {
        let mut ctx = CompileContext::default();
        let err = register(&mut ctx, test_lines("alias integer = real")).unwrap_err();
        assert_eq!(err.code, ERR_ALIAS);
        let err = register(&mut ctx, test_lines("alias 9lives = real")).unwrap_err();
        assert_eq!(err.code, ERR_IDENTIFIER);
    }

    #[test]
    fn test_conflicting_redefinition() {
        let mut table = AliasTable::default();
        table.define("a", "integer").unwrap();
        table.define("a", "integer").unwrap();
        assert!(table.define("a", "real").is_err());
    }

    #[test]
    fn test_cycle_detected() {
        let mut table = AliasTable::default();
        table.define("a", "b").unwrap();
        table.define("b", "a").unwrap();
        assert!(table.resolve("a").is_err());
    }

    #[test]
    fn test_resolve_params() {
        let mut table = AliasTable::default();
        table.define("unitid", "integer").unwrap();
        assert_eq!(table.resolve_params("unitid u, real x").unwrap(), "integer u, real x");
        assert_eq!(table.resolve_params("").unwrap(), "nothing");
        assert!(table.resolve_params("integer").is_err());
    }
}
