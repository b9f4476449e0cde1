//! classpulse CLI entry point

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use classpulse::{commands, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match commands::run(cli).await {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(directive) => EnvFilter::try_new(directive).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new("classpulse=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
