use clap::Parser;

use hearth_server::logging::init_logging;
use hearth_server::{run_server, Cli, ServerConfig};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = ServerConfig::from(cli);
    log::info!("Starting hearth server on {}:{}", config.host, config.port);
    log::info!("Inference server: {}", config.inference.base_url);
    log::info!("  Model: {}", config.inference.model);
    log::info!("Database: {}", config.database_path.display());
    log::debug!("Generation defaults: {:?}", config.defaults);

    run_server(config).await
}
