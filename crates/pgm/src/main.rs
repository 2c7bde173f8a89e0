mod cli;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if cli::is_informational(&e) => e.exit(),
        Err(e) => {
            cli::init_tracing(cli::LogFormat::Json);
            error!(error = %e, "arguments validation error");
            return ExitCode::FAILURE;
        }
    };
    cli::init_tracing(cli.global.log_format);

    match cli.execute().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "pgm command failed");
            ExitCode::FAILURE
        }
    }
}
