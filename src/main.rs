use colored::Colorize;
use log::{error, info};
use stepwise_server::{run_server, ConfigError, ServerConfig, ServerStartError};
use thiserror::Error;

mod logging;

#[derive(Debug, Error)]
enum StepwiseError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Server(#[from] ServerStartError),
}

impl StepwiseError {
    fn hint(&self) -> &'static str {
        match self {
            StepwiseError::Config(_) => "Check the environment variables stepwise is started with.",
            StepwiseError::Server(e) => e.hint(),
        }
    }
}

async fn run() -> Result<(), StepwiseError> {
    let config = ServerConfig::from_env()?;

    info!("Starting stepwise on port {}...", config.port);
    run_server(config).await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init_logger() {
        eprintln!("Could not initialize logging: {}", e);
    }

    if let Err(error) = run().await {
        error!("{} Read the error below to troubleshoot the issue.", "stepwise failed to start!".bold().red());
        error!("{}", error);
        error!("{}", format!("Hint: {}", error.hint()).dimmed().italic());

        std::process::exit(1);
    }
}
