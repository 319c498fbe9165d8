use crate::backend::{ApiBackend, ApiRequest, Method};
use crate::error::ApiError;
use crate::response::RawResponse;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

/// [`ApiBackend`] talking to the real server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
}

impl HttpBackend {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ApiBackend for HttpBackend {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, ApiError> {
        let ApiRequest {
            method,
            url,
            token,
            body,
        } = request;
        debug!(?method, %url, authenticated = token.is_some(), "Sending request");

        let mut builder = match method {
            Method::Get => self.client.get(url.clone()),
            Method::Post => self.client.post(url.clone()),
        }
        .header(CONTENT_TYPE, "application/json");
        if let Some(token) = &token {
            builder = builder.bearer_auth(token.as_str());
        }
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|err| {
            error!(?err, %url, "Request could not be sent");
            ApiError::Transport(err.to_string())
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|err| {
            error!(?err, %url, "Failed to read response body");
            ApiError::Transport(err.to_string())
        })?;
        debug!(status, %url, "Received response");

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}
