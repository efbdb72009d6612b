mod actions;
mod cache;
mod cli;
mod config;
mod error;
mod license;
mod process;
mod provision;
#[cfg(test)]
mod testing;
pub mod utils;

use clap::Parser;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use actions::{Console, Workflow};
use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let workflow = Workflow::from_env().with_console(cli.console());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "advinst_setup=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(log_writer(workflow.console())),
        )
        .init();

    if let Err(e) = cli.execute(&workflow).await {
        tracing::error!("{}", e);
        workflow.error(&e.to_string());
        std::process::exit(1);
    }
}

fn log_writer(console: Console) -> BoxMakeWriter {
    match console {
        Console::Stdout => BoxMakeWriter::new(std::io::stdout),
        Console::Stderr => BoxMakeWriter::new(std::io::stderr),
    }
}
