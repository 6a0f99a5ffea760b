//! Indentation-scope stack shared by every block-lowering pass.
//!
//! Passes pop before they interpret a line: any frame opened at a depth
//! greater than or equal to the line's depth is closed first, innermost
//! first. Whatever is still open at end of input is force-closed the same way.

use crate::line::{indent_for, Line};

#[derive(Debug, Clone)]
pub struct Frame<K> {
    pub kind: K,
    /// Depth of the opening line.
    pub depth: usize,
    /// Output index recorded at open time, used for retroactive headers.
    pub cursor: usize,
}

#[derive(Debug, Clone)]
pub struct BlockStack<K> {
    frames: Vec<Frame<K>>,
}

impl<K> Default for BlockStack<K> {
    fn default() -> Self {
        BlockStack { frames: Vec::new() }
    }
}

impl<K> BlockStack<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: K, depth: usize, cursor: usize) {
        self.frames.push(Frame {
            kind,
            depth,
            cursor,
        });
    }

    /// Pop every frame opened at `depth` or deeper, innermost first.
    pub fn close_to(&mut self, depth: usize) -> Vec<Frame<K>> {
        self.pop_while(|f| f.depth >= depth)
    }

    /// Pop every frame opened strictly deeper than `depth`.
    pub fn close_above(&mut self, depth: usize) -> Vec<Frame<K>> {
        self.pop_while(|f| f.depth > depth)
    }

    pub fn close_all(&mut self) -> Vec<Frame<K>> {
        self.pop_while(|_| true)
    }

    fn pop_while(&mut self, pred: impl Fn(&Frame<K>) -> bool) -> Vec<Frame<K>> {
        let mut closed = Vec::new();
        while let Some(top) = self.frames.last() {
            if !pred(top) {
                break;
            }
            if let Some(frame) = self.frames.pop() {
                closed.push(frame);
            }
        }
        closed
    }

    pub fn top(&self) -> Option<&Frame<K>> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame<K>> {
        self.frames.last_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Frame<K>> {
        self.frames.iter()
    }
}

/// Closing line for a frame, emitted at the frame's own depth.
pub fn terminator(anchor: &Line, depth: usize, keyword: &str) -> Line {
    anchor.synthetic(format!("{}{}", indent_for(depth), keyword))
}

/// Pop frames for `line` and append one terminator per closed frame.
pub fn close_with<K>(
    stack: &mut BlockStack<K>,
    depth: usize,
    anchor: &Line,
    out: &mut Vec<Line>,
    keyword: impl Fn(&K) -> &'static str,
) {
    for frame in stack.close_to(depth) {
        out.push(terminator(anchor, frame.depth, keyword(&frame.kind)));
    }
}
