use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Url;

use crate::{
    backend::{ApiBackend, ApiRequest},
    client::ApiClient,
    error::ApiError,
    response::RawResponse,
};

pub const BASE_URL: &str = "http://parking.test";

#[derive(Debug)]
pub struct MockApiBackendInner {
    pub calls: AtomicU64,
    pub delay_ms: AtomicU64,
    pub requests: Mutex<Vec<ApiRequest>>,
    pub responses: Mutex<HashMap<String, Result<RawResponse, ApiError>>>,
}

#[derive(Debug, Clone)]
pub struct MockApiBackend(pub Arc<MockApiBackendInner>);

impl MockApiBackendInner {
    fn new() -> Self {
        Self {
            calls: AtomicU64::default(),
            delay_ms: AtomicU64::default(),
            requests: Mutex::default(),
            responses: Mutex::default(),
        }
    }
}

impl MockApiBackend {
    pub fn new() -> Self {
        Self(Arc::new(MockApiBackendInner::new()))
    }

    /// Canned reply for every request whose URL path is `path`.
    pub fn respond(&self, path: &str, response: RawResponse) {
        self.0
            .responses
            .lock()
            .unwrap()
            .insert(path.to_string(), Ok(response));
    }

    pub fn fail(&self, path: &str, err: ApiError) {
        self.0
            .responses
            .lock()
            .unwrap()
            .insert(path.to_string(), Err(err));
    }

    pub fn delay(&self, delay: Duration) {
        self.0
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u64 {
        self.0.calls.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.url.path() == path)
            .count()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.0.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> ApiRequest {
        self.requests()
            .pop()
            .expect("no request was sent to the mock backend")
    }
}

#[async_trait]
impl ApiBackend for MockApiBackend {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, ApiError> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        let path = request.url.path().to_string();
        self.0.requests.lock().unwrap().push(request);

        let delay = self.0.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.0
            .responses
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .unwrap_or_else(|| Ok(text_response(404, "Not Found")))
    }
}

pub fn json_response(status: u16, body: serde_json::Value) -> RawResponse {
    RawResponse {
        status,
        content_type: Some("application/json".into()),
        body: body.to_string(),
    }
}

pub fn text_response(status: u16, body: &str) -> RawResponse {
    RawResponse {
        status,
        content_type: Some("text/plain; charset=utf-8".into()),
        body: body.into(),
    }
}

pub fn mock_client() -> (ApiClient<MockApiBackend>, MockApiBackend) {
    let backend = MockApiBackend::new();
    let client = ApiClient::new(Url::parse(BASE_URL).unwrap(), backend.clone());
    (client, backend)
}
