//! Script host for the covered language
//!
//! A small Lua-flavoured language: a lexer that keeps comment and long
//! string tokens with exact line spans, a recursive-descent parser and a
//! tree-walking interpreter exposing a per-line execution hook.
//!
//! ```text
//! source ──► lexer ──► tokens ──► parser ──► Chunk ──► Interpreter
//!                        │                    │            │
//!                        └── line classes     └── analyzer └── ExecutionHook
//! ```

pub mod ast;
mod interp;
mod lexer;
mod parser;
pub mod token;
mod value;

pub use ast::Chunk;
pub use interp::{
    stack_size, ExecutionHook, Interpreter, InterpreterOptions, NoopHook, MAX_CALL_DEPTH,
};
pub use lexer::tokenize;
pub use parser::{line_count, parse};
pub use token::{Span, Token, TokenKind};
pub use value::{Builtin, Table, Value};
