//! S3-compatible HTTP object store.

use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::{Client, Url};

use crate::error::{Error, Result};
use crate::options::RemoteOptions;
use crate::release::credentials::Credentials;

use super::sigv4::{self, SigningRequest};
use super::ObjectStore;

/// Path-style S3 client: objects live at `{endpoint}/{bucket}/{key}`.
///
/// Requests are signed with Signature V4 and never retried. With `gzip`
/// set, bodies are compressed and sent with `Content-Encoding: gzip`.
pub struct S3Store {
    client: Client,
    endpoint: Url,
    bucket: String,
    region: String,
    acl: Option<String>,
    gzip: bool,
    credentials: Credentials,
}

impl S3Store {
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL or the HTTP client
    /// cannot be created.
    pub fn new(remote: &RemoteOptions, credentials: Credentials) -> Result<Self> {
        let endpoint = Url::parse(&remote.endpoint).map_err(|e| {
            Error::Config(format!("invalid remote_endpoint '{}': {}", remote.endpoint, e))
        })?;
        if endpoint.host_str().is_none() {
            return Err(Error::Config(format!(
                "remote_endpoint '{}' has no host",
                remote.endpoint
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Adapter {
                project: "s3".to_string(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint,
            bucket: remote.bucket.clone(),
            region: remote.region.clone(),
            acl: remote.acl.clone(),
            gzip: remote.gzip,
            credentials,
        })
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    fn canonical_uri(&self, key: &str) -> String {
        let base = self.endpoint.path().trim_end_matches('/');
        sigv4::uri_encode_path(&format!("{}/{}/{}", base, self.bucket, key))
    }

    pub fn object_url(&self, key: &str) -> String {
        let mut origin = self.endpoint.origin().ascii_serialization();
        origin.push_str(&self.canonical_uri(key));
        origin
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let body = if self.gzip { gzip(&body)? } else { body };
        let payload_hash = sigv4::sha256_hex(&body);
        let canonical_uri = self.canonical_uri(key);

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        if self.gzip {
            headers.insert("content-encoding".to_string(), "gzip".to_string());
        }
        headers.insert("host".to_string(), self.host_header());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        if let Some(acl) = &self.acl {
            headers.insert("x-amz-acl".to_string(), acl.clone());
        }
        if let Some(token) = &self.credentials.session_token {
            headers.insert("x-amz-security-token".to_string(), token.clone());
        }

        let signature = sigv4::sign(
            &SigningRequest {
                method: "PUT",
                canonical_uri: &canonical_uri,
                headers: headers.clone(),
                payload_hash: &payload_hash,
            },
            &self.credentials.access_key_id,
            &self.credentials.secret_access_key,
            &self.region,
            Utc::now(),
        );

        let url = self.object_url(key);
        let mut builder = self.client.put(&url).body(body);
        for (name, value) in headers.iter().filter(|(name, _)| name.as_str() != "host") {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = builder
            .header("x-amz-date", &signature.amz_date)
            .header("authorization", &signature.authorization);

        let response = builder.send().await.map_err(|e| Error::Adapter {
            project: "s3".to_string(),
            message: format!("Upload of '{}' failed: {}", key, e),
        })?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            Err(Error::Adapter {
                project: "s3".to_string(),
                message: format!("Upload of '{}' failed with status {}: {}", key, status, text),
            })
        }
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.endpoint.as_str().trim_end_matches('/'), self.bucket)
    }
}

fn gzip(body: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
    encoder.write_all(body)?;
    Ok(encoder.finish()?)
}
