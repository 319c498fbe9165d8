use std::process::ExitCode;

use park_and_ride::{
    cli::App, client::ApiClient, configuration::Configuration,
    configuration_handler::ConfigurationHandler, http::HttpBackend,
    session::{FileSessionStorage, Session},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = ConfigurationHandler::parse_arguments();
    let configuration = cli.configuration;

    let backend = match HttpBackend::new(configuration.request_timeout()) {
        Ok(backend) => backend,
        Err(err) => {
            error!(?err, "Failed to build HTTP client");
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let client = ApiClient::new(configuration.api_url(), backend);
    info!(api_url = %client.base_url(), "Using parking API");
    let session = Session::new(FileSessionStorage::new(configuration.session_file()));

    match App::new(client, session).run(cli.command).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
