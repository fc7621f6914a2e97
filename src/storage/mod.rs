//! Object storage for generated recipe images and narration audio.
//!
//! Objects are PUT straight to an S3 bucket with AWS Signature Version 4 and served
//! back through the bucket's public URL.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::StorageConfig;
use crate::errors::AppError;

type HmacSha256 = Hmac<Sha256>;

const CACHE_CONTROL: &str = "public, max-age=2592000";
const SERVICE: &str = "s3";

/// Storage failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object storage not configured")]
    NotConfigured,

    #[error("Invalid source link: {0}")]
    InvalidSource(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Storage returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to sign request: {0}")]
    Signing(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        tracing::error!("Storage error: {}", err);
        match err {
            StorageError::NotConfigured => AppError::Internal(err.to_string()),
            _ => AppError::Upstream(format!("Failed to upload to storage: {}", err)),
        }
    }
}

/// One image to copy into the bucket.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub source_url: String,
    pub user_id: String,
    /// Object key in the bucket
    pub location: String,
}

/// Outcome of an image upload; `location` is the public URL only when `uploaded`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadResult {
    pub location: String,
    pub uploaded: bool,
}

/// AWS SigV4 request signer for one region.
#[derive(Debug, Clone)]
struct Signer {
    access_key_id: String,
    secret_access_key: String,
    region: String,
}

impl Signer {
    /// `Authorization` header value for a request without query string.
    ///
    /// `headers` must hold every header to sign with lower-case names, `host` included.
    fn authorization(
        &self,
        method: &str,
        canonical_uri: &str,
        headers: &BTreeMap<String, String>,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/{}/aws4_request", date, self.region, SERVICE);

        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
            .collect();
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method, canonical_uri, canonical_headers, signed_headers, payload_hash
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let k_date = hmac_sha256(
            format!("AWS4{}", self.secret_access_key).as_bytes(),
            date.as_bytes(),
        )?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

        Ok(format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.access_key_id, scope, signed_headers, signature
        ))
    }
}

/// S3 bucket client.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    client: reqwest::Client,
    signer: Option<Signer>,
    bucket: Option<String>,
    endpoint: Option<String>,
    public_base: String,
}

impl ObjectStore {
    pub fn new(config: &StorageConfig) -> Self {
        let signer = match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => Some(Signer {
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                region: config.region.clone(),
            }),
            _ => None,
        };

        let bucket = config.bucket.clone();
        let endpoint = config.endpoint.clone().or_else(|| {
            bucket
                .as_ref()
                .map(|b| format!("https://{}.s3.{}.amazonaws.com", b, config.region))
        });
        let public_base = config.public_url.clone().unwrap_or_else(|| {
            format!(
                "https://{}.s3.amazonaws.com",
                bucket.as_deref().unwrap_or_default()
            )
        });

        Self {
            client: reqwest::Client::new(),
            signer,
            bucket,
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.signer.is_some() && self.bucket.is_some() && self.endpoint.is_some()
    }

    /// Public URL clients load `key` from.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    /// Upload an object and return its public URL.
    pub async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        tagging: Option<&str>,
    ) -> Result<String, StorageError> {
        let (Some(signer), Some(endpoint)) = (&self.signer, &self.endpoint) else {
            return Err(StorageError::NotConfigured);
        };
        if self.bucket.is_none() {
            return Err(StorageError::NotConfigured);
        }

        let url = reqwest::Url::parse(&format!("{}/{}", endpoint, encode_key(key)))
            .map_err(|e| StorageError::InvalidSource(e.to_string()))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(StorageError::InvalidSource(endpoint.clone())),
        };

        let now = Utc::now();
        let payload_hash = sha256_hex(&body);

        let mut headers = BTreeMap::new();
        headers.insert("cache-control".to_string(), CACHE_CONTROL.to_string());
        headers.insert("content-type".to_string(), content_type.to_string());
        headers.insert("host".to_string(), host);
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        headers.insert(
            "x-amz-date".to_string(),
            now.format("%Y%m%dT%H%M%SZ").to_string(),
        );
        if let Some(tagging) = tagging {
            headers.insert("x-amz-tagging".to_string(), tagging.to_string());
        }

        let authorization =
            signer.authorization("PUT", url.path(), &headers, &payload_hash, now)?;

        let mut request = self
            .client
            .put(url.clone())
            .header("authorization", authorization)
            .body(body);
        for (name, value) in &headers {
            if name != "host" {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(key, "Uploaded object");
        Ok(self.public_url(key))
    }

    /// Copy a generated image into the bucket.
    ///
    /// Never fails: any problem is logged and reported as `uploaded: false` with the key.
    pub async fn upload_image_from_url(
        &self,
        source_url: &str,
        user_id: &str,
        location: &str,
    ) -> UploadResult {
        match self.copy_image(source_url, user_id, location).await {
            Ok(url) => UploadResult {
                location: url,
                uploaded: true,
            },
            Err(err) => {
                let preview: String = source_url.chars().take(50).collect();
                tracing::error!(location, source = %preview, error = %err, "Error uploading image");
                UploadResult {
                    location: location.to_string(),
                    uploaded: false,
                }
            }
        }
    }

    /// Upload a batch of images concurrently; results keep input order.
    pub async fn upload_images(&self, batch: &[ImageUpload]) -> Vec<UploadResult> {
        join_all(batch.iter().map(|image| {
            self.upload_image_from_url(&image.source_url, &image.user_id, &image.location)
        }))
        .await
    }

    /// Upload narration audio under `audio/<file_name>` and return its public URL.
    pub async fn upload_audio(
        &self,
        audio: Vec<u8>,
        file_name: &str,
    ) -> Result<String, StorageError> {
        self.put_object(&format!("audio/{}", file_name), audio, "audio/mpeg", None)
            .await
    }

    async fn copy_image(
        &self,
        source_url: &str,
        user_id: &str,
        location: &str,
    ) -> Result<String, StorageError> {
        if !self.is_configured() {
            return Err(StorageError::NotConfigured);
        }
        if !(source_url.starts_with("http://") || source_url.starts_with("https://")) {
            return Err(StorageError::InvalidSource(source_url.to_string()));
        }

        let bytes = self
            .client
            .get(source_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        self.put_object(
            location,
            bytes.to_vec(),
            "image/png",
            Some(&format!("userId={}", user_id)),
        )
        .await
    }
}

/// Percent-encode an object key for the request path, keeping `/` separators.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn sha256_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| {
        tracing::error!(error = %e, key_len = key.len(), "Failed to initialise HMAC");
        StorageError::Signing(e.to_string())
    })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
