//! Line records shared by every pass.
//!
//! A pass consumes a `Vec<Line>` and produces a fresh one. Tags never leak
//! forward on their own: a rewritten line keeps its tags only when it is built
//! with [`Line::derive`], synthesized lines start empty.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::rc::Rc;

pub const INDENT: &str = "    ";
pub const INDENT_WIDTH: usize = 4;

// ═══════════════════════════════════════════════════════════════════════════════
// VISIBILITY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Api,
    Global,
}

impl Visibility {
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "api" => Some(Visibility::Api),
            "global" => Some(Visibility::Global),
            _ => None,
        }
    }

    /// Output-language prefix; absence of any modifier means `private `.
    pub fn prefix(vis: Option<Visibility>) -> &'static str {
        match vis {
            Some(Visibility::Api) => "public ",
            Some(Visibility::Global) => "",
            None => "private ",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TAGS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tag {
    /// Line sits inside a function or init body.
    FunctionBody,
    /// Header of a synthesized init function.
    InitFunction,
    /// Init function already wired into a content initializer.
    InitClaimed,
    LibraryBody,
    ContentBody,
    GlobalBlock,
    Native,
    /// Visibility inherited from an enclosing `api:`/`global:` block.
    Modifier(Visibility),
    /// Pending `requires` entry, e.g. `optional Foo`.
    Require(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(BTreeSet<Tag>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: Tag) {
        self.0.insert(tag);
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.0.contains(tag)
    }

    pub fn modifier(&self) -> Option<Visibility> {
        self.0.iter().find_map(|t| match t {
            Tag::Modifier(v) => Some(*v),
            _ => None,
        })
    }

    pub fn require(&self) -> Option<&str> {
        self.0.iter().find_map(|t| match t {
            Tag::Require(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LINE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    pub file: Rc<Path>,
    /// 1-based; `None` for lines synthesized without a source counterpart.
    pub line: Option<u32>,
}

impl SourcePos {
    pub fn new(file: Rc<Path>, line: Option<u32>) -> Self {
        SourcePos { file, line }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    pub tags: Tags,
    pub pos: SourcePos,
}

impl Line {
    pub fn new(text: impl Into<String>, pos: SourcePos) -> Self {
        Line {
            text: text.into(),
            tags: Tags::new(),
            pos,
        }
    }

    /// Split file contents into numbered line records.
    pub fn from_source(file: &Rc<Path>, source: &str) -> Vec<Line> {
        source
            .lines()
            .enumerate()
            .map(|(i, text)| Line::new(text, SourcePos::new(file.clone(), Some(i as u32 + 1))))
            .collect()
    }

    /// Same tags and position, new text.
    pub fn derive(&self, text: impl Into<String>) -> Line {
        Line {
            text: text.into(),
            tags: self.tags.clone(),
            pos: self.pos.clone(),
        }
    }

    /// Same position, new text, no tags.
    pub fn synthetic(&self, text: impl Into<String>) -> Line {
        Line::new(text, self.pos.clone())
    }

    pub fn with_tag(mut self, tag: Tag) -> Line {
        self.tags.insert(tag);
        self
    }

    pub fn depth(&self) -> usize {
        depth_of(&self.text)
    }

    pub fn has(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }
}

pub fn depth_of(text: &str) -> usize {
    (text.len() - text.trim_start_matches(' ').len()) / INDENT_WIDTH
}

pub fn indent_for(depth: usize) -> String {
    INDENT.repeat(depth)
}

/// Join a pass result back into plain text lines.
pub fn texts(lines: &[Line]) -> Vec<&str> {
    lines.iter().map(|l| l.text.as_str()).collect()
}

#[cfg(test)]
pub(crate) fn test_lines(source: &str) -> Vec<Line> {
    let file: Rc<Path> = Rc::from(Path::new("test.jp"));
    Line::from_source(&file, source)
}
