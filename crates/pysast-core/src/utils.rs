//! Utility functions shared by the analyzer and rule implementations.

pub mod allowance;
pub mod text;

#[doc(inline)]
pub use allowance::{check_allow_with_reason, AllowCheck, Suppressions};
#[doc(inline)]
pub use text::{shannon_entropy, truncate};
