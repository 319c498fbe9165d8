use crate::{backend::ApiBackend, error::ConfigError};
use reqwest::Url;
use std::env;

pub const API_URL_VARIABLE: &str = "PARK_AND_RIDE_API_URL";

/// Entry point for every backend call: a base URL plus a transport.
#[derive(Debug, Clone)]
pub struct ApiClient<B: ApiBackend> {
    base_url: Url,
    backend: B,
}

impl<B: ApiBackend> ApiClient<B> {
    pub fn new(base_url: Url, backend: B) -> Self {
        Self { base_url, backend }
    }

    /// Builds a client from `PARK_AND_RIDE_API_URL`, failing when it is unset.
    pub fn from_env(backend: B) -> Result<Self, ConfigError> {
        let value =
            env::var(API_URL_VARIABLE).map_err(|_| ConfigError::MissingVariable(API_URL_VARIABLE))?;
        Ok(Self::new(parse_api_url(&value)?, backend))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url.set_query(None);
        url
    }
}

pub fn parse_api_url(value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: value.to_string(),
        reason,
    };
    let url = Url::parse(value.trim()).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(invalid(format!("unsupported scheme {scheme}"))),
    }
}
