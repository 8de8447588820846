use std::process::ExitCode;

use anomaly_agent_rs::api::DetectionServer;
use anomaly_agent_rs::config::Settings;
use anomaly_agent_rs::trace::init_logging;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("invalid configuration: {}", err.describe());
            return ExitCode::FAILURE;
        }
    };
    init_logging(&settings);

    let server = match DetectionServer::from_settings(settings) {
        Ok(server) => server,
        Err(err) => {
            error!(code = err.code(), error = %err.describe(), "startup failed");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = server.start().await {
        error!(error = %err.describe(), "server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
