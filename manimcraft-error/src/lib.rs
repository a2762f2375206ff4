//! # manimcraft-error
//!
//! Unified error handling for manimcraft, following OpenDAL's error handling practices.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., RenderFailed, InferenceFailed)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use manimcraft_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::RenderFailed, "NameError: name 'Circl' is not defined")
//!         .with_operation("renderer::render")
//!         .with_context("script", "outputs.py")
//!         .with_context("attempt", "2"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, manimcraft_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using manimcraft Error
pub type Result<T> = std::result::Result<T, Error>;
