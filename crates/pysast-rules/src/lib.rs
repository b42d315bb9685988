//! # pysast-rules
//!
//! Built-in security rules for pysast.
//!
//! ## Available Rules
//!
//! | Code | Name | Description |
//! |------|------|-------------|
//! | PS001 | `sql-injection` | SQL queries built by concatenation or formatting |
//! | PS002 | `xss` | User input written to HTML output without escaping |
//! | PS003 | `csrf` | State-changing handlers without CSRF protection |
//! | PS004 | `ssrf` | Requests to internal hosts, odd ports or user-chosen URLs |
//! | PS005 | `file-inclusion` | Includes and opens of relative, remote or user-chosen paths |
//! | PS006 | `sensitive-info` | Hard-coded credentials, provider tokens, high-entropy secrets |
//! | PS007 | `dangerous-io` | Shell execution, file deletion and file writes |
//!
//! ## Usage
//!
//! ```ignore
//! use pysast_core::Analyzer;
//! use pysast_rules::default_engine;
//! use std::sync::Arc;
//!
//! let analyzer = Analyzer::builder()
//!     .engine(Arc::new(default_engine()))
//!     .rules(["sql-injection", "xss"])
//!     .build()?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod common;
mod presets;

pub mod csrf;
pub mod dangerous_io;
pub mod file_inclusion;
pub mod sensitive_info;
pub mod sql_injection;
pub mod ssrf;
pub mod xss;

pub use csrf::Csrf;
pub use dangerous_io::DangerousIo;
pub use file_inclusion::FileInclusion;
pub use presets::{
    all_rules, default_engine, engine_from_config, minimal_rules, recommended_rules,
    rules_from_config, strict_rules, Preset, RuleName, UnknownRuleName,
};
pub use sensitive_info::SensitiveInfo;
pub use sql_injection::SqlInjection;
pub use ssrf::Ssrf;
pub use xss::Xss;

/// Re-export core types for convenience.
pub use pysast_core::{Finding, Rule, Severity};
