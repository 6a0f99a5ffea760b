//! # jassplus
//!
//! Source-to-source compiler from an indentation-based scripting dialect to
//! vJASS.
//!
//! ## Pipeline
//!
//! 1. **Collection**: each file reachable from the entry is loaded once,
//!    stripped of comments, joined across continuations, has its imports
//!    resolved and its unit names, aliases and macro definitions registered.
//!    Collection completes for the whole graph before anything is lowered.
//! 2. **Lowering**: ordered rewriting passes run across every file. Each pass
//!    is a line-at-a-time state machine over a [`block::BlockStack`].
//! 3. **Merge**: aggregation libraries (`VJPLIBS`, `VJPDATA`) are prepended
//!    when system or data units exist, then every file follows in discovery
//!    order.
//!
//! All state for one run lives in [`context::CompileContext`]. The first
//! failing check aborts the run with an [`error::SyntaxError`].

mod alias;
mod block;
mod context;
mod control;
mod declare;
mod discovery;
mod error;
mod hoist;
mod interpolate;
mod line;
mod macros;
mod modifier;
mod normalize;
mod pipeline;
mod report;
mod statements;
mod table;
mod units;
mod variables;

#[cfg(test)]
mod pipeline_tests;

pub use context::{Arguments, UnitKind};
pub use error::{CompileError, SyntaxError};
pub use pipeline::{build, compile, write_output, CompileOptions, CompileOutput};
pub use report::{CompileReport, FileReport};
