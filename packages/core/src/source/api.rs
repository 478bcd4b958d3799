//! API-mode secret reading.
//!
//! A [`SecretReference`] names one version of a remote secret. Any
//! [`SecretFetcher`] can resolve it; [`access_secret`] adds the integrity
//! check every payload must pass before anyone looks at it.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use tracing::debug;

/// Which version of a secret to read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SecretVersion {
    /// The most recent enabled version.
    #[default]
    Latest,
    /// An explicit numeric revision.
    Revision(u64),
    /// Any other version alias.
    Alias(String),
}

impl SecretVersion {
    /// Parse a version selector. `latest` and canonical numbers get their
    /// own variants; anything else, `007` included, is kept verbatim as an
    /// alias so the request names exactly what was asked for.
    pub fn parse(selector: &str) -> Self {
        let selector = selector.trim();
        if selector == "latest" {
            return Self::Latest;
        }

        match selector.parse::<u64>() {
            Ok(revision) if revision.to_string() == selector => Self::Revision(revision),
            _ => Self::Alias(selector.to_string()),
        }
    }
}

impl fmt::Display for SecretVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Revision(revision) => write!(f, "{}", revision),
            Self::Alias(alias) => f.write_str(alias),
        }
    }
}

/// Fully qualified pointer to one secret version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretReference {
    project: String,
    secret: String,
    version: SecretVersion,
}

impl SecretReference {
    /// # Errors
    ///
    /// Returns [`Error::MissingParameter`] when the project or secret name
    /// is empty.
    pub fn new(
        project: impl Into<String>,
        secret: impl Into<String>,
        version: SecretVersion,
    ) -> Result<Self> {
        let project = project.into();
        let secret = secret.into();

        if project.trim().is_empty() {
            return Err(Error::MissingParameter("project"));
        }
        if secret.trim().is_empty() {
            return Err(Error::MissingParameter("secret-name"));
        }

        Ok(Self {
            project,
            secret,
            version,
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn version(&self) -> &SecretVersion {
        &self.version
    }

    /// Resource path, e.g. `projects/acme/secrets/app-env/versions/latest`.
    pub fn resource_name(&self) -> String {
        format!(
            "projects/{}/secrets/{}/versions/{}",
            self.project, self.secret, self.version
        )
    }
}

impl fmt::Display for SecretReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resource_name())
    }
}

/// What the remote store hands back for one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretPayload {
    /// Resolved version resource name (`latest` becomes a concrete number).
    pub name: String,
    /// Raw payload bytes.
    pub data: Vec<u8>,
    /// Server-computed CRC32C of `data`, if the server sent one.
    pub data_crc32c: Option<i64>,
}

/// Anything that can fetch a secret version.
#[async_trait]
pub trait SecretFetcher: Send + Sync {
    async fn fetch(&self, reference: &SecretReference) -> Result<SecretPayload>;
}

/// Check the payload against its server-side CRC32C (Castagnoli).
///
/// # Errors
///
/// [`Error::MissingChecksum`] when no checksum was sent,
/// [`Error::ChecksumMismatch`] when it does not match.
pub fn verify_checksum(payload: &SecretPayload) -> Result<()> {
    let expected = payload
        .data_crc32c
        .ok_or_else(|| Error::MissingChecksum(payload.name.clone()))?;

    let actual = crc32c::crc32c(&payload.data);
    if i64::from(actual) != expected {
        return Err(Error::ChecksumMismatch {
            name: payload.name.clone(),
            expected,
            actual,
        });
    }

    Ok(())
}

/// Fetch a secret version and return its bytes once the checksum holds.
pub async fn access_secret<F>(fetcher: &F, reference: &SecretReference) -> Result<Vec<u8>>
where
    F: SecretFetcher + ?Sized,
{
    let payload = fetcher.fetch(reference).await?;
    verify_checksum(&payload)?;

    debug!(
        requested = %reference,
        resolved = %payload.name,
        bytes = payload.data.len(),
        "secret version accessed"
    );

    Ok(payload.data)
}
