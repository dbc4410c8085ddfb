use anyhow::Result;
use clap::Parser;
use msgpurge::cli::{self, Args};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args);

    cli::run(args).await
}

/// `--debug` and `--verbose` win over `RUST_LOG`.
fn init_tracing(args: &Args) {
    let filter = if args.debug {
        EnvFilter::new("msgpurge=trace,info")
    } else if args.verbose {
        EnvFilter::new("msgpurge=debug,warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
