use std::process::ExitCode;

use clap::Parser;
use farmer_ingest::interfaces::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    farmer_ingest::app::init_tracing();

    let cli = Cli::parse();
    farmer_ingest::app::run(cli).await
}
