//! secret-exec - Launch a program with its secrets in the environment.
//!
//! Secrets are read either from a directory of one-file-per-variable
//! mounts or from a Google Cloud Secret Manager version holding a flat JSON
//! object. They become the target's environment and the current process is
//! replaced by the target.

pub mod config;
pub mod env;
pub mod error;
pub mod launcher;
pub mod run;
pub mod source;

pub use error::{Error, ErrorKind, Result};
