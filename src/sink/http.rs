//! HTTP sink
//!
//! POSTs each record as `{"level": ..., "message": ...}` to a backend endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{LogSink, SinkError};
use crate::config::SinkConfig;
use crate::record::LogRecord;

/// Sink backed by a JSON-over-HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    endpoint: String,
}

impl HttpSink {
    /// Create a sink with a per-request timeout
    ///
    /// Fails if the HTTP client cannot be built; a client without the
    /// timeout is never substituted.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SinkError::Client)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Build the sink described by `config`; `None` if it names no endpoint
    pub fn from_config(config: &SinkConfig) -> Result<Option<Self>, SinkError> {
        config
            .endpoint
            .as_deref()
            .map(|endpoint| Self::new(endpoint, config.timeout()))
            .transpose()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LogSink for HttpSink {
    async fn forward(&self, record: LogRecord) -> Result<(), SinkError> {
        let response = self.client.post(&self.endpoint).json(&record).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SinkError::Status(status.as_u16()))
        }
    }
}
