use crate::{error::ApiError, response::RawResponse, session::SessionToken};
use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub token: Option<SessionToken>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            token: None,
            body: None,
        }
    }

    pub fn post(url: Url) -> Self {
        Self {
            method: Method::Post,
            url,
            token: None,
            body: None,
        }
    }

    pub fn bearer(mut self, token: &SessionToken) -> Self {
        self.token = Some(token.clone());
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|err| ApiError::Serialization(err.to_string()))?;
        self.body = Some(body);
        Ok(self)
    }
}

/// Transport seam. `Err` means no response was received at all.
#[async_trait]
pub trait ApiBackend: Clone + Send + Sync + 'static {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, ApiError>;
}
