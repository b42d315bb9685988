//! # pysast-core
//!
//! Core of the pysast security analyzer for Python-like source code.
//!
//! This crate provides:
//!
//! - [`Lexer`] and [`Parser`], an indentation-aware front end that recovers
//!   from errors instead of stopping at the first one
//! - the [`ast`] module with [`walk`], [`find_all`] and [`find_first`]
//! - [`TaintTracker`] for intraprocedural source-to-sink checks
//! - the [`Rule`] trait and the concurrent [`RuleEngine`]
//! - the lock-guarded [`Reporter`] with text, JSON and XML exports
//! - [`Analyzer`] for configured, per-file analysis
//!
//! ## Example
//!
//! ```ignore
//! use pysast_core::{Analyzer, RuleEngine};
//! use std::sync::Arc;
//!
//! let engine = Arc::new(RuleEngine::new().with_rule(MyRule));
//! let analyzer = Analyzer::builder().engine(engine).build()?;
//!
//! let report = analyzer.analyze_source("user = input()\nprint(user)\n", "app.py");
//! for finding in &report.findings {
//!     println!("{finding}");
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod analyzer;
mod config;
mod engine;
mod reporter;
mod rule;
mod types;

pub mod ast;
pub mod declarative;
pub mod lexer;
pub mod parser;
pub mod taint;
pub mod token;

/// Utility modules for rule implementations.
pub mod utils;

pub use analyzer::{Analyzer, AnalyzerBuilder, AnalyzerError};
pub use ast::{find_all, find_first, function_scopes, walk, Node, NodeKind, Program, Scope, Span};
pub use config::{AnalyzerConfig, Config, ConfigError, RuleConfig};
pub use engine::{RuleEngine, RunOutcome};
pub use lexer::{LexError, Lexer};
pub use parser::{lex_and_parse, ParseError, Parser};
pub use reporter::{Reporter, ADHOC_RULE};
pub use rule::{Rule, RuleBox, RuleError};
pub use taint::{TaintConfig, TaintTracker};
pub use token::{Token, TokenKind};
pub use types::{AnalysisResult, FileFailure, FileReport, Finding, Location, Severity};
pub use utils::allowance::{AllowCheck, Suppressions};
