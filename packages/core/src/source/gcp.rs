//! Google Cloud Secret Manager client.
//!
//! Talks to the REST `versions:access` endpoint with an OAuth2 bearer token.
//!
//! # Credentials
//!
//! Tokens are looked up in this order:
//!
//! 1. An explicit token set with [`SecretManagerClient::with_access_token`]
//! 2. `$GOOGLE_OAUTH_ACCESS_TOKEN`
//! 3. The GCE/GKE metadata server (`$GCE_METADATA_HOST` overrides the host)
//! 4. `gcloud auth print-access-token`, when `gcloud` is on `PATH`

use crate::error::{Error, Result};
use crate::source::api::{SecretFetcher, SecretPayload, SecretReference};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, warn};

/// Default Secret Manager API base URL.
pub const DEFAULT_API_BASE: &str = "https://secretmanager.googleapis.com/v1";

const TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";
const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
const METADATA_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Secret Manager client.
pub struct SecretManagerClient {
    /// HTTP client.
    client: Client,

    /// API base URL.
    api_base: String,

    /// Token to use instead of the lookup chain.
    access_token: Option<String>,
}

impl SecretManagerClient {
    /// Create a client with no request deadline.
    pub fn new() -> Result<Self> {
        Self::with_timeout(None)
    }

    /// Create a client whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Api(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            access_token: None,
        })
    }

    /// Set the API base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Use a fixed access token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = &self.access_token {
            return Ok(token.clone());
        }

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            let token = token.trim();
            if !token.is_empty() {
                debug!("using access token from ${}", TOKEN_ENV);
                return Ok(token.to_string());
            }
        }

        match self.metadata_token().await {
            Ok(token) => {
                debug!("using access token from metadata server");
                return Ok(token);
            }
            Err(e) => debug!("metadata server unavailable: {}", e),
        }

        gcloud_token()
    }

    async fn metadata_token(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct MetadataToken {
            access_token: String,
        }

        let host =
            std::env::var(METADATA_HOST_ENV).unwrap_or_else(|_| DEFAULT_METADATA_HOST.to_string());
        let url = format!(
            "http://{}/computeMetadata/v1/instance/service-accounts/default/token",
            host
        );

        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .timeout(METADATA_PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Credentials(format!("metadata request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Credentials(format!(
                "metadata server returned {}",
                response.status()
            )));
        }

        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| Error::Credentials(format!("invalid metadata token response: {}", e)))?;

        Ok(token.access_token)
    }
}

#[async_trait]
impl SecretFetcher for SecretManagerClient {
    async fn fetch(&self, reference: &SecretReference) -> Result<SecretPayload> {
        let token = self.access_token().await?;
        let url = format!("{}/{}:access", self.api_base, reference.resource_name());

        debug!(secret = %reference, "requesting secret version");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::Api(format!("request for {} failed: {}", reference, e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Api(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Api(format!(
                "{} returned {}: {}",
                reference,
                status,
                api_error_message(&body)
            )));
        }

        decode_access_response(&body)
    }
}

#[derive(Deserialize)]
struct AccessSecretVersionResponse {
    name: String,
    payload: Option<WirePayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePayload {
    #[serde(default)]
    data: String,
    data_crc32c: Option<WireInt64>,
}

/// Proto3 JSON renders int64 as a string, but plain numbers are accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireInt64 {
    Text(String),
    Number(i64),
}

impl WireInt64 {
    fn value(&self) -> Result<i64> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => s
                .parse()
                .map_err(|_| Error::Api(format!("invalid dataCrc32c value '{}'", s))),
        }
    }
}

/// Decode a `versions:access` response body.
pub fn decode_access_response(body: &[u8]) -> Result<SecretPayload> {
    let response: AccessSecretVersionResponse = serde_json::from_slice(body)
        .map_err(|e| Error::Api(format!("unexpected response from Secret Manager: {}", e)))?;

    let payload = response
        .payload
        .ok_or_else(|| Error::Api(format!("response for {} has no payload", response.name)))?;

    let data = base64::engine::general_purpose::STANDARD
        .decode(payload.data.as_bytes())
        .map_err(|e| Error::Api(format!("payload is not valid base64: {}", e)))?;

    let data_crc32c = payload
        .data_crc32c
        .as_ref()
        .map(WireInt64::value)
        .transpose()?;

    Ok(SecretPayload {
        name: response.name,
        data,
        data_crc32c,
    })
}

/// Pull the human-readable message out of a Google API error body.
fn api_error_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            if text.trim().is_empty() {
                "Unknown error".to_string()
            } else {
                text.trim().to_string()
            }
        }
    }
}

/// Ask the gcloud CLI for a token.
fn gcloud_token() -> Result<String> {
    let gcloud = which::which("gcloud").map_err(|_| {
        Error::Credentials(format!(
            "set ${}, run on Google Cloud, or install the gcloud CLI",
            TOKEN_ENV
        ))
    })?;

    let output = Command::new(&gcloud)
        .arg("auth")
        .arg("print-access-token")
        .output()
        .map_err(|e| Error::Credentials(format!("failed to execute gcloud: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("gcloud auth print-access-token failed");
        return Err(Error::Credentials(format!(
            "gcloud auth print-access-token failed: {}",
            if stderr.trim().is_empty() {
                "Unknown error"
            } else {
                stderr.trim()
            }
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(Error::Credentials(
            "gcloud returned an empty access token".to_string(),
        ));
    }

    debug!("using access token from gcloud");
    Ok(token)
}
