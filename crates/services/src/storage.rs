use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use crewdeck_config::StorageSettings;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

/// S3 caps a DeleteObjects request at this many keys.
const MAX_KEYS_PER_DELETE: usize = 1000;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage API error: {0}")]
    Api(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A stored object, addressed by bucket and key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub bucket: String,
    pub path: String,
}

impl FileRef {
    /// Parses the `bucket` and `path` query parameters off an asset URL;
    /// None unless both are present and non-empty.
    pub fn from_url(url: &str) -> Option<Self> {
        let (_, query) = url.split_once('?')?;

        let mut bucket = None;
        let mut path = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("bucket", v)) => bucket = Some(percent_decode(v)),
                Some(("path", v)) => path = Some(percent_decode(v)),
                _ => {}
            }
        }

        match (bucket, path) {
            (Some(bucket), Some(path)) if !bucket.is_empty() && !path.is_empty() => {
                Some(FileRef { bucket, path })
            }
            _ => None,
        }
    }
}

/// Talks to an S3-compatible store (MinIO in dev) with hand-rolled
/// Signature V4: presigned PUT/GET URLs for browser transfers and batched
/// DeleteObjects for cleanup.
pub struct StorageService {
    settings: StorageSettings,
    client: reqwest::Client,
}

impl StorageService {
    pub fn new(settings: &StorageSettings) -> Self {
        Self {
            settings: settings.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub fn presign_put(&self, bucket: &str, key: &str, expires_secs: u64) -> String {
        self.presign("PUT", bucket, key, expires_secs, Utc::now())
    }

    pub fn presign_get(&self, bucket: &str, key: &str, expires_secs: u64) -> String {
        self.presign("GET", bucket, key, expires_secs, Utc::now())
    }

    /// Best-effort batched cleanup: one DeleteObjects call per bucket per
    /// chunk of 1000 keys. Failures are logged and swallowed; the caller's
    /// record deletion has already happened.
    pub async fn delete_files(&self, refs: &[FileRef]) {
        for (bucket, keys) in group_by_bucket(refs) {
            for chunk in keys.chunks(MAX_KEYS_PER_DELETE) {
                match self.delete_batch(&bucket, chunk).await {
                    Ok(()) => {
                        debug!(bucket = %bucket, keys = chunk.len(), "Deleted storage objects");
                    }
                    Err(e) => {
                        warn!(
                            bucket = %bucket,
                            keys = chunk.len(),
                            error = %e,
                            "Batched storage delete failed"
                        );
                    }
                }
            }
        }
    }

    async fn delete_batch(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError> {
        let body = delete_request_body(keys);
        let payload_sha = Sha256::digest(body.as_bytes());
        let payload_hex = hex::encode(payload_sha);
        let checksum_b64 = BASE64.encode(payload_sha);

        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/s3/aws4_request", self.settings.region);

        let canonical_request = format!(
            "POST\n/{bucket}\ndelete=\nhost:{host}\nx-amz-checksum-sha256:{checksum_b64}\nx-amz-content-sha256:{payload_hex}\nx-amz-date:{amz_date}\n\nhost;x-amz-checksum-sha256;x-amz-content-sha256;x-amz-date\n{payload_hex}",
            host = self.host(),
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );
        let signature = hex::encode(hmac_sha256(&self.signing_key(&date), string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders=host;x-amz-checksum-sha256;x-amz-content-sha256;x-amz-date, Signature={signature}",
            self.settings.access_key,
        );

        let url = format!("{}/{bucket}?delete", self.endpoint());
        let resp = self
            .client
            .post(&url)
            .header("authorization", authorization)
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_hex)
            .header("x-amz-checksum-sha256", checksum_b64)
            .header("content-type", "application/xml")
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(StorageError::Api(format!("{status}: {text}")));
        }
        Ok(())
    }

    fn presign(
        &self,
        method: &str,
        bucket: &str,
        key: &str,
        expires_secs: u64,
        now: chrono::DateTime<Utc>,
    ) -> String {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/s3/aws4_request", self.settings.region);
        let credential = format!("{}/{scope}", self.settings.access_key);

        let encoded_key = encode_key(key);
        let query = format!(
            "X-Amz-Algorithm=AWS4-HMAC-SHA256&X-Amz-Credential={}&X-Amz-Date={amz_date}&X-Amz-Expires={expires_secs}&X-Amz-SignedHeaders=host",
            urlencoding::encode(&credential),
        );

        let canonical_request = format!(
            "{method}\n/{bucket}/{encoded_key}\n{query}\nhost:{host}\n\nhost\nUNSIGNED-PAYLOAD",
            host = self.host(),
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );
        let signature = hex::encode(hmac_sha256(&self.signing_key(&date), string_to_sign.as_bytes()));

        format!(
            "{}/{bucket}/{encoded_key}?{query}&X-Amz-Signature={signature}",
            self.endpoint(),
        )
    }

    fn signing_key(&self, date: &str) -> Vec<u8> {
        let k_secret = format!("AWS4{}", self.settings.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date.as_bytes());
        let k_region = hmac_sha256(&k_date, self.settings.region.as_bytes());
        let k_service = hmac_sha256(&k_region, b"s3");
        hmac_sha256(&k_service, b"aws4_request")
    }

    fn endpoint(&self) -> &str {
        self.settings.endpoint.trim_end_matches('/')
    }

    fn host(&self) -> &str {
        self.endpoint()
            .split("://")
            .nth(1)
            .unwrap_or(self.endpoint())
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).expect("HMAC-SHA256 accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Percent-encodes an object key per path segment, keeping the `/`
/// separators literal as the canonical form requires.
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn percent_decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Groups refs per bucket with sorted, deduplicated keys.
fn group_by_bucket(refs: &[FileRef]) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for r in refs {
        groups.entry(r.bucket.clone()).or_default().push(r.path.clone());
    }
    for keys in groups.values_mut() {
        keys.sort();
        keys.dedup();
    }
    groups
}

fn delete_request_body(keys: &[String]) -> String {
    let mut body = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Delete>");
    for key in keys {
        body.push_str("<Object><Key>");
        body.push_str(&xml_escape(key));
        body.push_str("</Key></Object>");
    }
    body.push_str("<Quiet>true</Quiet></Delete>");
    body
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
