use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod client;
mod commands;
mod common;

use commands::LoginCommand;
use common::info::BUILD_INFO;

#[derive(Parser)]
#[command(
    name = "getkeys",
    about = "Temporary AWS credentials through SAML federation",
    version = env!("CARGO_PKG_VERSION"),
    author = "ktruck"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and write credentials for the requested roles
    Login(LoginCommand),
    /// Print build information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { &cli.log_level };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Login(login_cmd) => {
            print_banner();
            info!("Starting {}", BUILD_INFO.version_string());
            client::run(login_cmd).await?;
        }
        Commands::Version => {
            println!("{}", BUILD_INFO.version_string());
            println!("{}", BUILD_INFO.description);
            println!("Documentation: {}", BUILD_INFO.documentation);
        }
    }

    Ok(())
}

fn print_banner() {
    println!();
    println!("🔐 getkeys {}", BUILD_INFO.version);
    println!();
    let _ = io::stdout().flush();
}
