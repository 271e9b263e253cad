//! Execution core of a small indentation-sensitive scripting language:
//! a pull-based lexer with explicit `Indent`/`Dedent` tokens, a dynamic
//! value model with single-inheritance classes and dunder dispatch, and a
//! tree-walking AST executor.
//!
//! The surface parser is an external collaborator: it consumes [`lexer`]
//! tokens, builds [`ast`] nodes and hands the root statement to
//! [`interpreter::run_program`], which executes it against a
//! [`runtime::Closure`] and writes `print` output through a
//! [`runtime::Context`].
pub mod ast;
pub mod interpreter;
pub mod lexer;
pub mod runtime;
pub mod token;
