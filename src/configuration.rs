use reqwest::Url;
use std::{path::PathBuf, time::Duration};

pub trait Configuration: Clone + Send + Sync + 'static {
    fn api_url(&self) -> Url;
    fn session_file(&self) -> PathBuf;
    fn request_timeout(&self) -> Duration;
}
