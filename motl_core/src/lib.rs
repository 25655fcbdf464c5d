//! `motl_core` is the core library for the motl model-to-text transformation
//! engine. It parses MTL template source into a module AST and executes it
//! against input models, producing text artifacts while preserving
//! hand-edited regions across regenerations.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Template source
//!   → Lexer (dual-mode: literal text ↔ [directive] tokens)
//!   → Parser (recursive descent over the token stream, builds the Module AST)
//!   → Interpreter (statement executor + expression evaluator)
//!   → Writer stack (buffered sinks with auto-indent at line starts)
//!   → Output strategy (in-memory map or atomic file-system commits)
//! ```
//!
//! ## Key Types
//!
//! - [`Module`] — The parsed template artifact: templates, queries, macros.
//! - [`Statement`] — The closed set of executable statement variants.
//! - [`ExecutionContext`] — Per-run state: variable scopes, indentation
//!   stack, writer stack, registered models, protected-area manager.
//! - [`ProtectedAreaManager`] — Extracts marker-delimited regions from
//!   existing outputs and re-splices them during regeneration.
//! - [`OutputStrategy`] — Pluggable destination for completed writers.
//! - [`GenerateOptions`] / [`GenerationResult`] — Configuration and outcome
//!   of one `generate` run.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use motl_core::GenerateOptions;
//! use motl_core::InMemoryStrategy;
//!
//! let module = motl_core::parse("[module hello('demo')][template greet()]Hello[/template]")
//! 	.expect("valid template source");
//! let strategy = Arc::new(InMemoryStrategy::new());
//! let result = motl_core::generate(Arc::new(module), GenerateOptions::new(), strategy)
//! 	.expect("generation succeeds");
//! assert_eq!(result.stdout, "Hello");
//! ```

pub use ast::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use eval::*;
pub use expr::*;
pub use indent::*;
pub use interpreter::*;
pub use model::*;
pub use parser::parse;
pub use position::*;
pub use printer::print_module;
pub use protected::*;
pub use strategy::*;
pub use tokens::*;
pub use value::*;
pub use writer::*;

pub mod ast;
pub mod config;
pub mod context;
mod error;
pub mod eval;
pub mod expr;
pub mod indent;
pub mod interpreter;
pub(crate) mod lexer;
pub mod model;
mod parser;
mod position;
mod printer;
pub mod protected;
pub mod strategy;
pub(crate) mod tokens;
pub mod value;
pub mod writer;

#[cfg(test)]
mod __fixtures;
#[cfg(test)]
mod __tests;
