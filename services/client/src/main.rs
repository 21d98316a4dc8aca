// client: Line-oriented chat client over the failover library.
//
// Commands:
//   create <username>        create an account (and log into it)
//   login <username>         log into an existing account
//   logoff                   log out
//   list <pattern>           list accounts matching a pattern
//   send <recipient> <text>  send a message
//   delete                   delete the logged-in account
//   quit

use clap::{Arg, Command};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let matches = Command::new("Chat Client")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Interactive client for the replicated chat service")
        .arg(
            Arg::new("config")
                .help("Path to the cluster config JSON")
                .value_name("config")
                .required(true),
        )
        .get_matches();

    let config_path: &String = matches.get_one("config").expect("required arg");
    let cluster = match chat_wire::load_config(std::path::Path::new(config_path)) {
        Ok(cluster) => cluster,
        Err(error) => {
            eprintln!("FATAL: failed to load config: {error}");
            std::process::exit(1);
        }
    };

    let (chat, mut incoming) = match client::connect(&cluster.servers).await {
        Ok(connected) => connected,
        Err(error) => {
            eprintln!("Could not connect to the service: {error}");
            std::process::exit(1);
        }
    };
    info!(primary = chat.primary_id().await, "connected");

    tokio::spawn(async move {
        while let Some(message) = incoming.recv().await {
            println!("[{}] {}", message.sender, message.message);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Connected. Type 'help' for commands.");
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        let mut parts = line.trim().splitn(3, ' ');
        let command = parts.next().unwrap_or("");
        let outcome = match command {
            "" => continue,
            "help" => {
                println!(
                    "commands: create <user> | login <user> | logoff | list <pattern> | \
                     send <recipient> <text> | delete | quit"
                );
                continue;
            }
            "quit" => break,
            "create" => match parts.next() {
                Some(username) => chat.create_account(username).await,
                None => {
                    println!("usage: create <username>");
                    continue;
                }
            },
            "login" => match parts.next() {
                Some(username) => chat.login(username).await,
                None => {
                    println!("usage: login <username>");
                    continue;
                }
            },
            "logoff" => chat.logoff().await,
            "delete" => chat.delete_account().await,
            "list" => {
                let pattern = parts.next().unwrap_or(".*");
                match chat.list_accounts(pattern).await {
                    Ok(outcome) => {
                        println!("{}", outcome.status);
                        if !outcome.accounts.is_empty() {
                            println!("{}", outcome.accounts);
                        }
                        continue;
                    }
                    Err(error) => Err(error),
                }
            }
            "send" => match (parts.next(), parts.next()) {
                (Some(recipient), Some(text)) => chat.send_msg(recipient, text).await,
                _ => {
                    println!("usage: send <recipient> <text>");
                    continue;
                }
            },
            _ => {
                println!("unknown command: {command}");
                continue;
            }
        };
        match outcome {
            Ok(status) => println!("{status}"),
            Err(error) => println!("request failed: {error}"),
        }
    }
    println!("Disconnected from server.");
}
