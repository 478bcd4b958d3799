//! Secret sources.
//!
//! - [`files`]: a directory tree of one-file-per-variable secrets
//! - [`api`]: remote secret versions behind the [`SecretFetcher`] trait
//! - [`gcp`]: the Google Cloud Secret Manager implementation of that trait

pub mod api;
pub mod files;
pub mod gcp;

pub use api::{access_secret, verify_checksum, SecretFetcher, SecretPayload, SecretReference, SecretVersion};
pub use files::read_secret_files;
pub use gcp::SecretManagerClient;
