//! Version range engine
//!
//! Parses version range expressions and selects matching versions from a
//! candidate set.
//!
//! ```text
//! "[1.0, 2.0) || 3.*" ──▶ lexer ──▶ range parser ──▶ VersionRange
//!                                                      │
//!                         candidates ──────────────────┴──▶ select / matches
//! ```
//!
//! # Modules
//!
//! - [`number`]: `Version` with arbitrary arity and arbitrary-precision components
//! - [`lexer`]: Tokenizer for range expressions
//! - [`range`]: `VersionRange` parsing, matching and selection
//! - [`error`]: Parse errors

pub mod error;
pub mod lexer;
pub mod number;
pub mod range;

pub use error::VersionParseError;
pub use number::Version;
pub use range::{Bound, VersionRange};
