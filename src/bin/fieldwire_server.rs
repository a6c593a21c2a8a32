use std::{
    error::Error,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use clap::Parser;
use fieldwire::{
    protocol::{BinaryLimits, BinaryProtocolFactory},
    server::{NonBlockingServer, ServerConfig},
    service::KvService,
    transport::{SocketTransportFactory, TcpServerSocket},
};
use log::info;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listen for new connections at address
    #[arg(default_value = "127.0.0.1:9090")]
    address: SocketAddr,
    /// Milliseconds to sleep when a tick found no work
    #[arg(long, default_value_t = 10)]
    poll_ms: u64,
    /// Leave further connections pending once this many clients are connected
    #[arg(long)]
    max_clients: Option<usize>,
    /// Largest accepted string, in bytes
    #[arg(long, default_value_t = BinaryLimits::default().string)]
    max_string: usize,
    /// Largest accepted container element count
    #[arg(long, default_value_t = BinaryLimits::default().container)]
    max_container: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    let limits = BinaryLimits {
        string: cli.max_string,
        container: cli.max_container,
        ..Default::default()
    };
    let config = ServerConfig {
        poll_interval: Duration::from_millis(cli.poll_ms),
        max_clients: cli.max_clients,
    };

    let mut server = NonBlockingServer::new(
        TcpServerSocket::new(cli.address),
        SocketTransportFactory,
        BinaryProtocolFactory::new(limits),
        KvService::new(),
        config,
    );

    info!("listening at {}", cli.address);
    server.serve(&shutdown)?;
    info!(
        "handled {} requests, {} keys stored",
        server.processor().handled(),
        server.processor().len()
    );
    Ok(())
}
