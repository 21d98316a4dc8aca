// server: One replica of the replicated chat service.

use clap::{Arg, Command};
use server::Server;
use tracing::{error, info};

fn validate_replica_id(value: &str) -> Result<u32, String> {
    value
        .parse::<u32>()
        .map_err(|_| "Invalid replica id".to_owned())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("Chat Replica Server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("One replica of the primary-backup chat service")
        .arg(
            Arg::new("config")
                .help("Path to the cluster config JSON")
                .value_name("config")
                .required(true),
        )
        .arg(
            Arg::new("id")
                .help("This replica's id from the config")
                .value_name("id")
                .value_parser(validate_replica_id)
                .required(true),
        )
        .arg(
            Arg::new("log-dir")
                .help("Directory for the persistent store logs")
                .long("log-dir")
                .default_value("logs"),
        )
        .get_matches();

    let config_path: &String = matches.get_one("config").expect("required arg");
    let server_id: u32 = *matches.get_one("id").expect("required arg");
    let log_dir: &String = matches.get_one("log-dir").expect("has default");

    let cluster = match chat_wire::load_config(std::path::Path::new(config_path)) {
        Ok(cluster) => cluster,
        Err(error) => {
            eprintln!("FATAL: failed to load config: {error}");
            std::process::exit(1);
        }
    };

    let server = match Server::bind(cluster, server_id, log_dir).await {
        Ok(server) => server,
        Err(error) => {
            eprintln!("FATAL: failed to start replica: {error}");
            std::process::exit(1);
        }
    };
    let shutdown = server.shutdown_handle();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server_id, "replica starting"
    );

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            shutdown.shutdown();
        }
    });

    if let Err(err) = server.serve().await {
        error!(error = %err, "replica exited with error");
        std::process::exit(1);
    }
}
