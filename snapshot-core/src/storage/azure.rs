//! Azure Blob Storage writer.
//!
//! Speaks the Put Blob REST operation directly over reqwest, authorized either
//! with the account key (Shared Key) or a shared access signature taken from a
//! standard storage connection string.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{
    Client,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use sha2::Sha256;
use std::{collections::HashMap, time::Duration};
use url::Url;

use crate::model::BlobLocation;
use crate::provider::truncate_body;

use super::BlobStore;

/// Account used by the local storage emulator.
pub const DEV_STORAGE_ACCOUNT: &str = "devstoreaccount1";
/// Well-known, public key of the local storage emulator.
pub const DEV_STORAGE_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

const API_VERSION: &str = "2021-08-06";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    SharedKey { account: String, key: Vec<u8> },
    /// Query string without the leading `?`.
    Sas(String),
}

/// Parsed storage connection string, reduced to what the blob service needs.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub blob_endpoint: Url,
    pub credential: Credential,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::SharedKey { account, .. } => f
                .debug_struct("SharedKey")
                .field("account", account)
                .finish_non_exhaustive(),
            Credential::Sas(_) => f.write_str("Sas(<redacted>)"),
        }
    }
}

impl std::fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionString")
            .field("blob_endpoint", &self.blob_endpoint.as_str())
            .field("credential", &self.credential)
            .finish()
    }
}

impl ConnectionString {
    /// Parse `Key=Value;Key=Value` pairs. Keys are case-insensitive; values may contain `=`.
    ///
    /// Error messages never echo values, since they are secrets.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut fields: HashMap<String, String> = HashMap::new();

        for (i, part) in raw.split(';').map(str::trim).enumerate() {
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| anyhow!("Malformed connection string: segment {} has no '='", i + 1))?;
            fields.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        if fields
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return Self::development();
        }

        let account = fields.get("accountname").filter(|a| !a.is_empty());

        let blob_endpoint = match fields.get("blobendpoint") {
            Some(endpoint) => Url::parse(endpoint).context("BlobEndpoint is not a valid URL")?,
            None => {
                let account = account.ok_or_else(|| {
                    anyhow!("Connection string has neither BlobEndpoint nor AccountName")
                })?;
                let protocol = fields
                    .get("defaultendpointsprotocol")
                    .map(String::as_str)
                    .unwrap_or("https");
                let suffix = fields
                    .get("endpointsuffix")
                    .map(String::as_str)
                    .unwrap_or("core.windows.net");

                Url::parse(&format!("{protocol}://{account}.blob.{suffix}"))
                    .context("Could not build blob endpoint from AccountName")?
            }
        };

        let credential = if let Some(key) = fields.get("accountkey") {
            let account = account
                .ok_or_else(|| anyhow!("Connection string has AccountKey but no AccountName"))?;
            let key = STANDARD
                .decode(key)
                .context("AccountKey in connection string is not valid base64")?;
            Credential::SharedKey { account: account.clone(), key }
        } else if let Some(sas) = fields.get("sharedaccesssignature") {
            Credential::Sas(sas.trim_start_matches('?').to_string())
        } else {
            bail!("Connection string has neither AccountKey nor SharedAccessSignature");
        };

        Ok(Self { blob_endpoint, credential })
    }

    fn development() -> Result<Self> {
        Ok(Self {
            blob_endpoint: Url::parse(DEV_BLOB_ENDPOINT)?,
            credential: Credential::SharedKey {
                account: DEV_STORAGE_ACCOUNT.to_string(),
                key: STANDARD.decode(DEV_STORAGE_KEY)?,
            },
        })
    }

    /// Full URL of a blob, one percent-encoded path segment per `/` in the name.
    pub fn blob_url(&self, location: &BlobLocation) -> Result<Url> {
        let mut url = self.blob_endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("Blob endpoint cannot be used as a base URL"))?;
            segments
                .pop_if_empty()
                .push(&location.container)
                .extend(location.name.split('/'));
        }

        if let Credential::Sas(sas) = &self.credential {
            url.set_query(Some(sas));
        }

        Ok(url)
    }
}

#[derive(Debug, Clone)]
pub struct AzureBlobStore {
    connection: ConnectionString,
    http: Client,
}

impl AzureBlobStore {
    pub fn new(connection: ConnectionString) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build blob storage HTTP client")?;

        Ok(Self { connection, http })
    }

    pub fn from_connection_string(raw: &str) -> Result<Self> {
        Self::new(ConnectionString::parse(raw).context("Invalid storage connection string")?)
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn put(&self, location: &BlobLocation, body: Vec<u8>, content_type: &str) -> Result<()> {
        let url = self.connection.blob_url(location)?;
        let date = rfc1123(Utc::now());

        let ms_headers = [
            ("x-ms-blob-type", "BlockBlob"),
            ("x-ms-date", date.as_str()),
            ("x-ms-version", API_VERSION),
        ];

        let mut req = self.http.put(url.clone()).header(CONTENT_TYPE, content_type);
        for (name, value) in ms_headers {
            req = req.header(name, value);
        }

        if let Credential::SharedKey { account, key } = &self.connection.credential {
            let to_sign =
                string_to_sign("PUT", body.len(), content_type, &ms_headers, account, &url);
            let signature = sign(key, &to_sign)?;
            req = req.header(AUTHORIZATION, format!("SharedKey {account}:{signature}"));
        }

        tracing::debug!("Uploading {} bytes to {}", body.len(), location);

        let res = req
            .body(body)
            .send()
            .await
            // SAS tokens live in the query string.
            .map_err(|e| e.without_url())
            .with_context(|| format!("Failed to send Put Blob request for {location}"))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Put Blob for {} failed with status {}: {}",
                location,
                status,
                truncate_body(&body),
            ));
        }

        Ok(())
    }
}

fn rfc1123(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Shared Key string-to-sign for the blob service.
fn string_to_sign(
    verb: &str,
    content_length: usize,
    content_type: &str,
    ms_headers: &[(&str, &str)],
    account: &str,
    url: &Url,
) -> String {
    // Zero length is signed as an empty line.
    let length = if content_length == 0 { String::new() } else { content_length.to_string() };

    let standard = [
        verb,
        "", // Content-Encoding
        "", // Content-Language
        length.as_str(),
        "", // Content-MD5
        content_type,
        "", // Date, superseded by x-ms-date
        "", // If-Modified-Since
        "", // If-Match
        "", // If-None-Match
        "", // If-Unmodified-Since
        "", // Range
    ];
    let mut out = standard.join("\n");
    out.push('\n');

    let mut headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
        .collect();
    headers.sort();
    for (name, value) in headers {
        out.push_str(&format!("{name}:{value}\n"));
    }

    out.push_str(&format!("/{}{}", account, url.path()));

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.into_owned()))
        .collect();
    params.sort();
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (name, value) in params {
        match grouped.last_mut() {
            Some((last, values)) if *last == name => values.push(value),
            _ => grouped.push((name, vec![value])),
        }
    }
    for (name, values) in grouped {
        out.push_str(&format!("\n{}:{}", name, values.join(",")));
    }

    out
}

fn sign(key: &[u8], to_sign: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| anyhow!("Invalid storage account key: {e}"))?;
    mac.update(to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
