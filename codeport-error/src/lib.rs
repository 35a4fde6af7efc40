//! # codeport-error
//!
//! Unified error handling for codeport, in the OpenDAL style.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what went wrong (e.g., CompileFailed, InferenceFailed)
//! - **ErrorStatus**: Whether trying again later could help (Permanent, Temporary)
//! - **Error Context**: Key-value pairs that point at the cause
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use codeport_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::CompileFailed, "g++ exited with status 1")
//!         .with_operation("runner::compile")
//!         .with_context("source", "optimized.cpp")
//!         .with_context("compiler", "g++"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, codeport_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using codeport Error
pub type Result<T> = std::result::Result<T, Error>;
