//! byre compiler: the MOO language front end
//!
//! Turns verb source into the abstract syntax the evaluator walks. There is
//! no bytecode stage: the evaluator is a tree walker, so "compiling" is
//! lexing, parsing, and a validation pass (loop labels, fork restrictions,
//! read-only variables).

pub mod ast;
pub mod disasm;
pub mod lexer;
pub mod parser;

pub use ast::{Arg, Codes, ExceptArm, Expr, Program, ScatterKind, ScatterTarget, Stmt, StmtKind};
pub use parser::{compile, CompileErrors};
