//! Azure Files REST client authenticated with a SAS token.
//!
//! Read: `GET {account}/{share}/{dir}/{file}?{sas}`.
//! Write: create the file with its final length (`PUT`, `x-ms-type: file`), then upload the
//! content in ranges of at most 4 MiB (`PUT ?comp=range`, `x-ms-write: update`).

use super::{FileShare, FileShareError};
use crate::config::FileShareConfig;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};

const API_VERSION: &str = "2022-11-02";
const MAX_RANGE_BYTES: usize = 4 * 1024 * 1024;

pub struct AzureFileShare {
    /// Base URL with share and inputs directory segments; None when settings are missing.
    base_url: Option<Url>,
    /// SAS query string without the leading '?'.
    sas_token: String,
    missing: Vec<&'static str>,
    client: reqwest::Client,
}

impl AzureFileShare {
    pub fn from_config(config: &FileShareConfig) -> Self {
        let mut missing = Vec::new();
        if config.storage_account_name.is_none() && config.endpoint.is_none() {
            missing.push("storageAccountName");
        }
        if config.share_name.is_none() {
            missing.push("shareName");
        }
        if config.sas_token.is_none() {
            missing.push("sasToken");
        }
        let endpoint = config.endpoint.clone().or_else(|| {
            config
                .storage_account_name
                .as_ref()
                .map(|account| format!("https://{}.file.core.windows.net", account))
        });
        let base_url = match (&endpoint, &config.share_name) {
            (Some(endpoint), Some(share)) => {
                let directory = config.inputs_path();
                build_base_url(endpoint, share, &directory)
            }
            _ => None,
        };
        if base_url.is_none() && missing.is_empty() {
            missing.push("endpoint");
        }
        Self {
            base_url,
            sas_token: config
                .sas_token
                .as_deref()
                .unwrap_or("")
                .trim_start_matches('?')
                .to_string(),
            missing,
            client: reqwest::Client::new(),
        }
    }

    /// Location for logs (never includes the SAS token).
    pub fn describe(&self) -> String {
        match &self.base_url {
            Some(url) => url.to_string(),
            None => format!("(not configured: missing {})", self.missing.join(", ")),
        }
    }

    fn file_url(&self, name: &str, extra_query: Option<&str>) -> Result<Url, FileShareError> {
        if !self.missing.is_empty() {
            return Err(FileShareError::NotConfigured(format!(
                "missing {}",
                self.missing.join(", ")
            )));
        }
        let mut url = self
            .base_url
            .clone()
            .ok_or_else(|| FileShareError::NotConfigured("invalid endpoint".to_string()))?;
        url.path_segments_mut()
            .map_err(|_| FileShareError::NotConfigured("invalid endpoint".to_string()))?
            .extend(name.split('/').filter(|s| !s.is_empty()));
        let query = match extra_query {
            Some(extra) if self.sas_token.is_empty() => extra.to_string(),
            Some(extra) => format!("{}&{}", self.sas_token, extra),
            None => self.sas_token.clone(),
        };
        url.set_query(if query.is_empty() { None } else { Some(&query) });
        Ok(url)
    }

    async fn check(res: reqwest::Response, name: &str, op: &str) -> Result<reqwest::Response, FileShareError> {
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FileShareError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(FileShareError::Api(format!("{} {}: {} {}", op, name, status, body)));
        }
        Ok(res)
    }
}

fn build_base_url(endpoint: &str, share: &str, directory: &str) -> Option<Url> {
    let mut url = Url::parse(endpoint.trim_end_matches('/')).ok()?;
    {
        let mut segments = url.path_segments_mut().ok()?;
        segments.pop_if_empty();
        segments.push(share);
        segments.extend(directory.split('/').filter(|s| !s.is_empty()));
    }
    Some(url)
}

#[async_trait]
impl FileShare for AzureFileShare {
    async fn read(&self, name: &str) -> Result<Vec<u8>, FileShareError> {
        let url = self.file_url(name, None)?;
        let res = self
            .client
            .get(url)
            .header("x-ms-version", API_VERSION)
            .send()
            .await?;
        let res = Self::check(res, name, "get").await?;
        Ok(res.bytes().await?.to_vec())
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> Result<(), FileShareError> {
        let url = self.file_url(name, None)?;
        let res = self
            .client
            .put(url)
            .header("x-ms-version", API_VERSION)
            .header("x-ms-type", "file")
            .header("x-ms-content-length", bytes.len().to_string())
            .body(Vec::new())
            .send()
            .await?;
        Self::check(res, name, "create").await?;

        let range_url = self.file_url(name, Some("comp=range"))?;
        let mut offset = 0usize;
        for chunk in bytes.chunks(MAX_RANGE_BYTES) {
            let end = offset + chunk.len() - 1;
            let res = self
                .client
                .put(range_url.clone())
                .header("x-ms-version", API_VERSION)
                .header("x-ms-write", "update")
                .header("x-ms-range", format!("bytes={}-{}", offset, end))
                .body(chunk.to_vec())
                .send()
                .await?;
            Self::check(res, name, "put range").await?;
            offset += chunk.len();
        }
        log::debug!("file share: wrote {} bytes to {}", bytes.len(), name);
        Ok(())
    }
}
