//! Embeddable runtime for a small dynamically typed scripting language.
//! Source text is lexed, parsed into an AST and evaluated by a tree walker
//! against a chain of scopes; hosts add native functions to the global scope
//! and receive output through two sinks.

pub mod ast;
pub mod context;
pub mod diagnostics;
pub mod environment;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod runtime;
mod stack;
pub mod stdlib;
pub mod value;

pub use context::{ExecutionContext, InterpreterConfig, OutputSinks, ReturnMode, SharedBuffer};
pub use diagnostics::{Diagnostic, DiagnosticKind, ScriptError, SourceSpan};
pub use parser::parse;
pub use repl::Repl;
pub use runtime::Interpreter;
pub use value::{Arity, NativeCall, Value};
