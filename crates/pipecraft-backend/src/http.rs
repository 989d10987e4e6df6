//! HTTP client for the pipeline orchestration API.
//!
//! Endpoints:
//! - `GET  {base}/applications/{application}/pipelineConfigs/{name}`
//! - `POST {base}/pipelines`

use async_trait::async_trait;
use pipecraft_config::BackendSettings;
use pipecraft_core::{Error, Lookup, PipelineBackend, PipelineDocument, Result};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Errors building an HTTP backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("invalid backend URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("invalid header '{0}'")]
    InvalidHeader(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Pipeline store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
}

impl HttpBackend {
    /// Build a backend with default client settings.
    pub fn new(base_url: &str) -> std::result::Result<Self, BackendError> {
        Self::from_settings(&BackendSettings {
            url: base_url.to_string(),
            timeout_secs: None,
            headers: Vec::new(),
        })
    }

    /// Build a backend from project settings: timeout and extra headers apply
    /// to every request.
    pub fn from_settings(settings: &BackendSettings) -> std::result::Result<Self, BackendError> {
        let base = Url::parse(&settings.url).map_err(|source| BackendError::InvalidUrl {
            url: settings.url.clone(),
            source,
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &settings.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| BackendError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| BackendError::InvalidHeader(name.as_str().to_string()))?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("pipecraft/", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = settings.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        info!(url = %base, timeout_secs = ?settings.timeout_secs, "Configured HTTP backend");
        Ok(Self {
            client: builder.build()?,
            base,
        })
    }

    fn pipeline_config_url(&self, application: &str, name: &str) -> String {
        format!(
            "{}/applications/{}/pipelineConfigs/{}",
            self.base.as_str().trim_end_matches('/'),
            urlencoding::encode(application),
            urlencoding::encode(name)
        )
    }

    fn save_url(&self) -> String {
        format!("{}/pipelines", self.base.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl PipelineBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn get_pipeline(&self, application: &str, name: &str) -> Result<Lookup> {
        let lookup_error = |message: String| Error::BackendLookup {
            application: application.to_string(),
            name: name.to_string(),
            message,
        };

        let url = self.pipeline_config_url(application, name);
        debug!(url = %url, "Fetching pipeline");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| lookup_error(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Lookup::NotFound);
        }
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(lookup_error(format!("{}: {}", status, text)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| lookup_error(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Lookup::NotFound);
        }

        let value: Value = serde_json::from_str(&text).map_err(|e| lookup_error(e.to_string()))?;
        if value.is_null() {
            return Ok(Lookup::NotFound);
        }

        let document = PipelineDocument::from_value(value).map_err(|e| lookup_error(e.to_string()))?;
        Ok(Lookup::Found(document))
    }

    async fn save_pipeline(&self, document: &PipelineDocument) -> Result<()> {
        let save_error = |message: String| Error::BackendSave {
            application: document.application().unwrap_or_default().to_string(),
            name: document.name().unwrap_or_default().to_string(),
            message,
        };

        let response = self
            .client
            .post(self.save_url())
            .json(document)
            .send()
            .await
            .map_err(|e| save_error(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(save_error(format!("{}: {}", status, text)));
        }

        debug!(pipeline = %document.label(), "Backend accepted pipeline");
        Ok(())
    }
}
