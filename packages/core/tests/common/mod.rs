//! Common testing utilities for secret-exec integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use secret_exec::source::{SecretFetcher, SecretPayload, SecretReference};
use secret_exec::Result;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Test context that manages temporary files and directories.
pub struct TestContext {
    /// Path to temporary directory
    pub temp_path: PathBuf,
    /// The temporary directory (kept to prevent early deletion)
    _temp_dir: TempDir,
}

impl TestContext {
    /// Create a new test context with a temporary directory.
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = TempDir::new()?;
        let temp_path = temp_dir.path().to_path_buf();

        Ok(Self {
            temp_path,
            _temp_dir: temp_dir,
        })
    }

    /// Create a file with content, creating parent directories as needed.
    pub fn create_file(&self, name: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let file_path = self.temp_path.join(name);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&file_path)?;
        file.write_all(content)?;
        Ok(file_path)
    }

    /// Create a secrets directory holding one file per secret.
    pub fn create_secrets_dir(
        &self,
        name: &str,
        secrets: &[(impl AsRef<str>, impl AsRef<str>)],
    ) -> anyhow::Result<PathBuf> {
        let dir = self.temp_path.join(name);
        fs::create_dir_all(&dir)?;
        for (key, value) in secrets {
            fs::write(dir.join(key.as_ref()), value.as_ref())?;
        }
        Ok(dir)
    }

    /// Get the path to a file in the temp directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_path.join(name)
    }
}

/// Build a flat JSON secret payload.
pub fn json_payload(secrets: &[(impl AsRef<str>, impl AsRef<str>)]) -> Vec<u8> {
    let mut json_data = serde_json::Map::new();
    for (key, value) in secrets {
        json_data.insert(key.as_ref().to_string(), serde_json::json!(value.as_ref()));
    }

    serde_json::to_vec(&json_data).unwrap()
}

/// CRC32C as Secret Manager reports it.
pub fn crc32c_of(data: &[u8]) -> i64 {
    i64::from(crc32c::crc32c(data))
}

/// A `versions:access` response body for `data`.
pub fn access_response(name: &str, data: &[u8], crc: Option<i64>) -> String {
    let mut payload = serde_json::json!({
        "data": base64::engine::general_purpose::STANDARD.encode(data),
    });
    if let Some(crc) = crc {
        payload["dataCrc32c"] = serde_json::json!(crc.to_string());
    }

    serde_json::json!({ "name": name, "payload": payload }).to_string()
}

/// In-memory secret store standing in for Secret Manager.
#[derive(Default)]
pub struct StaticFetcher {
    payloads: HashMap<String, SecretPayload>,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `data` with a correct checksum.
    pub fn with_secret(self, reference: &SecretReference, data: &[u8]) -> Self {
        let crc = crc32c_of(data);
        self.with_payload(reference, data, Some(crc))
    }

    /// Serve `data` with whatever checksum the test wants.
    pub fn with_payload(
        mut self,
        reference: &SecretReference,
        data: &[u8],
        crc: Option<i64>,
    ) -> Self {
        self.payloads.insert(
            reference.resource_name(),
            SecretPayload {
                name: reference.resource_name(),
                data: data.to_vec(),
                data_crc32c: crc,
            },
        );
        self
    }

    /// Resource names requested so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecretFetcher for StaticFetcher {
    async fn fetch(&self, reference: &SecretReference) -> Result<SecretPayload> {
        let name = reference.resource_name();
        self.requests.lock().unwrap().push(name.clone());

        self.payloads
            .get(&name)
            .cloned()
            .ok_or_else(|| secret_exec::Error::Api(format!("{} returned 404 Not Found", name)))
    }
}

/// Request captured by [`serve_once`].
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: String,
}

/// Serve a single HTTP response on a local port.
///
/// Returns the base URL and a handle resolving to the captured request.
pub async fn serve_once(
    status: &'static str,
    body: String,
) -> (String, tokio::task::JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let request = String::from_utf8_lossy(&buf).to_string();
        let (request_line, headers) = request.split_once("\r\n").unwrap_or((request.as_str(), ""));
        let captured = CapturedRequest {
            request_line: request_line.to_string(),
            headers: headers.to_string(),
        };

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();

        captured
    });

    (format!("http://{}/v1", addr), handle)
}

/// Parse `env` output into a map.
pub fn parse_env_output(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Map of owned OS strings for comparing environment sets.
pub fn os_map(pairs: &[(&str, &str)]) -> HashMap<OsString, OsString> {
    pairs
        .iter()
        .map(|(k, v)| (OsString::from(*k), OsString::from(*v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_payload() {
        let output = json_payload(&[("KEY1", "value1"), ("KEY2", "value2")]);
        let json: serde_json::Value = serde_json::from_slice(&output).unwrap();

        assert_eq!(json["KEY1"], "value1");
        assert_eq!(json["KEY2"], "value2");
    }

    #[test]
    fn test_test_context_create_file() {
        let ctx = TestContext::new().unwrap();
        let file_path = ctx.create_file("nested/test.txt", b"Hello, World!").unwrap();

        assert!(file_path.exists());
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "Hello, World!");
    }
}
