use std::{
    error::Error,
    net::{SocketAddr, TcpStream},
    time::Duration,
};

use clap::{Parser, Subcommand};
use fieldwire::{
    protocol::BinaryProtocol,
    service::{self, KvRequest, Operation, Status},
    transport::SocketTransport,
};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:9090")]
    address: SocketAddr,
    /// Seconds to wait for a response
    #[arg(long, default_value_t = 5)]
    timeout: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that the server is up
    Ping,
    /// Print the value stored at key
    Get { key: String },
    /// Store value at key
    Put { key: String, value: String },
    /// Remove key
    Delete { key: String },
    /// List stored keys
    Keys,
}

impl From<Command> for KvRequest {
    fn from(value: Command) -> Self {
        match value {
            Command::Ping => KvRequest::new(Operation::Ping),
            Command::Get { key } => KvRequest::new(Operation::Get).with_key(key),
            Command::Put { key, value } => {
                KvRequest::new(Operation::Put).with_key(key).with_value(value)
            }
            Command::Delete { key } => KvRequest::new(Operation::Delete).with_key(key),
            Command::Keys => KvRequest::new(Operation::Keys),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let stream = TcpStream::connect(cli.address)?;
    let transport = SocketTransport::blocking(stream, Some(Duration::from_secs(cli.timeout)))?;
    let mut protocol = BinaryProtocol::new(transport);

    let response = service::call(&mut protocol, &cli.command.into())?;

    match response.status {
        Status::Ok => {
            if let Some(value) = response.value {
                println!("{value}");
            }
            for key in response.keys {
                println!("{key}");
            }
            if let Some(message) = response.message {
                println!("{message}");
            }
        }
        Status::NotFound => eprintln!("not found"),
        Status::Error => eprintln!("error: {}", response.message.unwrap_or_default()),
        Status::Unrecognized(raw) => eprintln!("unexpected status {raw}"),
    }

    Ok(())
}
