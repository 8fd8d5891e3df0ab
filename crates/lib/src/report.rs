//! Report-generation service client.
//!
//! POSTs `{ q, matricula_lider, agenda, nuevos_miembros }` with an Authorization header and
//! expects `{ "public_url": "..." }` with status 200.

use crate::config::ReportServiceConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Request body for the generation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub q: String,
    pub matricula_lider: String,
    pub agenda: Vec<String>,
    pub nuevos_miembros: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReportResponse {
    #[serde(default)]
    public_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("report service url not configured")]
    NotConfigured,
    #[error("report request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("report service error: {0}")]
    Api(String),
    #[error("report service response has no public_url")]
    MissingUrl,
}

/// Generates a report and returns its public URL.
#[async_trait]
pub trait ReportService: Send + Sync {
    async fn generate(&self, request: &ReportRequest) -> Result<String, ReportError>;
}

#[derive(Clone)]
pub struct ReportClient {
    url: Option<String>,
    authorization: Option<String>,
    client: reqwest::Client,
}

impl ReportClient {
    pub fn new(config: &ReportServiceConfig) -> Self {
        Self {
            url: config.url.clone(),
            authorization: config.auth_token.as_deref().map(authorization_value),
            client: reqwest::Client::new(),
        }
    }
}

/// `Bearer <token>` unless the configured value already names a scheme.
fn authorization_value(token: &str) -> String {
    let token = token.trim();
    if token.contains(' ') {
        token.to_string()
    } else {
        format!("Bearer {}", token)
    }
}

#[async_trait]
impl ReportService for ReportClient {
    async fn generate(&self, request: &ReportRequest) -> Result<String, ReportError> {
        let url = self.url.as_deref().ok_or(ReportError::NotConfigured)?;
        let mut req = self.client.post(url).json(request);
        if let Some(auth) = &self.authorization {
            req = req.header(reqwest::header::AUTHORIZATION, auth);
        }
        let res = req.send().await?;
        if res.status() != StatusCode::OK {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ReportError::Api(format!("{} {}", status, body)));
        }
        let data: ReportResponse = res.json().await?;
        data.public_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or(ReportError::MissingUrl)
    }
}
