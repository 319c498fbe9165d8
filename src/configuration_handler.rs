use crate::{
    cli::Cli,
    client::parse_api_url,
    configuration::Configuration,
};
use clap::{Args, Parser};
use reqwest::Url;
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Args)]
pub struct ConfigurationHandler {
    /// Base URL of the parking API
    #[arg(long, env = "PARK_AND_RIDE_API_URL", value_parser = parse_api_url)]
    api_url: Url,

    /// File holding the session token between invocations
    #[arg(
        long,
        env = "PARK_AND_RIDE_SESSION_FILE",
        default_value = ".park_and_ride_session.json"
    )]
    session_file: PathBuf,

    /// Request timeout in seconds
    #[arg(long, env = "PARK_AND_RIDE_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,
}

impl ConfigurationHandler {
    pub fn parse_arguments() -> Cli {
        Cli::parse()
    }
}

impl Configuration for ConfigurationHandler {
    fn api_url(&self) -> Url {
        self.api_url.clone()
    }

    fn session_file(&self) -> PathBuf {
        self.session_file.clone()
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
