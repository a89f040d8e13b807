use clap::Parser;
use tracing::{Level, error, info};

use taxsim::api::{Cli, Command, run_http_server, run_report};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Report(args) => match run_report(&args) {
            Ok(rendered) => {
                for chart in rendered {
                    info!("{} -> {}", chart.scenario, chart.location);
                }
            }
            Err(e) => {
                error!("Report failed: {e}");
                std::process::exit(1);
            }
        },
        Command::Serve { port } => {
            if let Err(e) = run_http_server(port).await {
                error!("Server error: {e}");
                std::process::exit(1);
            }
        }
    }
}
