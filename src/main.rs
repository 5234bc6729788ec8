use log::*;
use service::{config::Config, logging::Logger};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::new();

    if let Err(err) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {err}");
        return ExitCode::FAILURE;
    }

    info!(
        "Starting frontdoor gateway ({} environment)",
        config.runtime_env()
    );
    info!(
        "Auth gateway: {}, notification service: {}",
        config.auth_base_url(),
        config.notification_base_url()
    );

    let app_state = match web::AppState::new(config) {
        Ok(app_state) => app_state,
        Err(err) => {
            error!("Invalid gateway configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    match web::init_server(app_state).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Server exited with error: {err}");
            ExitCode::FAILURE
        }
    }
}
