use clap::Parser;
use log::{info, warn};
use server::config::ServerConfig;
use server::network::Server;
use server::persistence;
use server::scheduler::RespawnScheduler;
use server::utils::timestamp_ms;
use server::worldgen;
use std::path::PathBuf;

/// Parses command-line arguments, loads the configuration and any existing
/// save, then runs the server until shutdown and writes the world back out.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on (overrides the config file)
        #[clap(short, long)]
        port: Option<u16>,
        /// Path to the server.properties config file
        #[clap(short, long, default_value = "server.properties")]
        config: PathBuf,
        /// Save name; the world is loaded from and saved to <name>.save
        #[clap(short, long, default_value = "world")]
        save: String,
    }

    env_logger::init();
    let args = Args::parse();

    let config = if args.config.exists() {
        ServerConfig::load(&args.config)?
    } else {
        info!(
            "config file {} not found, using defaults",
            args.config.display()
        );
        ServerConfig::default()
    };

    let (world, scheduler) = if persistence::save_exists(&args.save) {
        persistence::load(&args.save)?
    } else {
        let seed = if config.world_seed == 0 {
            rand::random()
        } else {
            config.world_seed
        };
        (worldgen::generate_world(seed), RespawnScheduler::new())
    };

    let port = args.port.unwrap_or(config.port);
    let address = format!("{}:{}", args.host, port);
    let mut server = Server::new(&address, config, world, scheduler).await?;
    server.run().await?;

    match persistence::save(&args.save, server.world(), server.scheduler(), timestamp_ms()) {
        Ok(path) => info!("world saved to {}", path.display()),
        Err(e) => warn!("failed to save world on shutdown: {}", e),
    }

    Ok(())
}
