//! Single-threaded cooperative server.
//!
//! [`NonBlockingServer`] owns a [`Listener`], the factories that wrap accepted
//! connections into protocols, a [`Processor`] and the registry of connected
//! clients. Each call to [`process`](NonBlockingServer::process) is one tick:
//! at most one accept, then one service attempt per client in registration
//! order. Nothing in a tick waits on a client.
//!
//! A client whose transport reports end of file, is closed or timed out is
//! dropped. Any other failure is logged and the client stays registered; for
//! socket transports a request that arrives in pieces surfaces as a
//! `WouldBlock` failure and is decoded again from the start on a later tick.
use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    codec::CodecError,
    protocol::{Protocol, ProtocolError, ProtocolFactory},
    transport::{Listener, TransportError, TransportFactory},
};

mod registry;

pub use registry::ClientRegistry;

/// Handles one request per call, reading it from and answering on `protocol`.
pub trait Processor<P: Protocol + ?Sized> {
    fn process(&mut self, protocol: &mut P) -> Result<(), CodecError>;
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to listen: {0}")]
    Listen(#[source] TransportError),

    #[error("listener is not open")]
    NotListening,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Sleep between ticks that did no work.
    pub poll_interval: Duration,
    /// Connections beyond this stay pending in the listener.
    pub max_clients: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            max_clients: None,
        }
    }
}

/// Outcome of one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub accepted: usize,
    /// Clients that had a request processed.
    pub serviced: usize,
    pub removed: usize,
}

impl Tick {
    pub fn is_idle(&self) -> bool {
        self.accepted == 0 && self.serviced == 0 && self.removed == 0
    }
}

pub struct NonBlockingServer<L, TF, PF, H>
where
    L: Listener,
    TF: TransportFactory<L::Connection>,
    PF: ProtocolFactory<TF::Transport>,
    H: Processor<PF::Protocol>,
{
    listener: L,
    transports: TF,
    protocols: PF,
    processor: H,
    clients: ClientRegistry<PF::Protocol>,
    config: ServerConfig,
}

impl<L, TF, PF, H> NonBlockingServer<L, TF, PF, H>
where
    L: Listener,
    TF: TransportFactory<L::Connection>,
    PF: ProtocolFactory<TF::Transport>,
    H: Processor<PF::Protocol>,
{
    pub fn new(
        listener: L,
        transports: TF,
        protocols: PF,
        processor: H,
        config: ServerConfig,
    ) -> Self {
        Self {
            listener,
            transports,
            protocols,
            processor,
            clients: ClientRegistry::new(),
            config,
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn client_ids(&self) -> Vec<u64> {
        self.clients.ids()
    }

    pub fn processor(&self) -> &H {
        &self.processor
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listen(&mut self) -> Result<(), ServerError> {
        self.listener.listen().map_err(ServerError::Listen)
    }

    /// Run one tick: accept at most one connection, then give every client one
    /// service attempt.
    pub fn process(&mut self) -> Result<Tick, ServerError> {
        let mut tick = Tick::default();

        if self.accept()? {
            tick.accepted = 1;
        }

        let processor = &mut self.processor;
        let mut serviced = 0;
        tick.removed = self.clients.retain(|slot, protocol| match service(processor, protocol) {
            Ok(handled) => {
                if handled {
                    serviced += 1;
                }
                true
            }
            Err(e) if e.is_disconnect() => {
                debug!("client {slot} disconnected: {e}");
                protocol.transport_mut().close();
                false
            }
            Err(CodecError::Protocol(ProtocolError::Transport(TransportError::WouldBlock))) => {
                debug!("client {slot} sent a partial request");
                true
            }
            Err(e) => {
                warn!("client {slot} failed: {e}");
                true
            }
        });
        tick.serviced = serviced;

        Ok(tick)
    }

    /// Listen, then tick until `shutdown` is set. All clients are closed on
    /// the way out.
    pub fn serve(&mut self, shutdown: &AtomicBool) -> Result<(), ServerError> {
        self.listen()?;
        info!("server started");

        while !shutdown.load(Ordering::SeqCst) {
            let tick = self.process()?;
            if tick.is_idle() {
                thread::sleep(self.config.poll_interval);
            }
        }

        info!("shutting down, closing {} clients", self.clients.len());
        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        for (slot, mut protocol) in self.clients.drain() {
            let transport = protocol.transport_mut();
            if let Err(e) = transport.flush() {
                debug!("client {slot}: flush on close failed: {e}");
            }
            transport.close();
        }
        self.listener.close();
    }

    fn accept(&mut self) -> Result<bool, ServerError> {
        if let Some(max) = self.config.max_clients {
            if self.clients.len() >= max {
                return Ok(false);
            }
        }

        let connection = match self.listener.accept() {
            Ok(Some(connection)) => connection,
            Ok(None) => return Ok(false),
            Err(TransportError::NotOpen) => return Err(ServerError::NotListening),
            Err(e) => {
                warn!("accept failed: {e}");
                return Ok(false);
            }
        };

        match self.transports.transport(connection) {
            Ok(transport) => {
                let slot = self.clients.register(self.protocols.protocol(transport));
                debug!("accepted client {slot}");
                Ok(true)
            }
            Err(e) => {
                warn!("dropping connection: {e}");
                Ok(false)
            }
        }
    }
}

/// One service attempt. Returns whether a request was processed.
fn service<P, H>(processor: &mut H, protocol: &mut P) -> Result<bool, CodecError>
where
    P: Protocol,
    H: Processor<P>,
{
    if !protocol.transport_mut().is_readable().map_err(ProtocolError::from)? {
        return Ok(false);
    }
    processor.process(protocol)?;
    protocol.transport_mut().flush().map_err(ProtocolError::from)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        io::{Read, Write},
        net::{SocketAddr, TcpStream},
        time::Duration,
    };

    use crate::{
        protocol::{BinaryProtocol, BinaryProtocolFactory},
        transport::{MemoryBuffer, SocketTransportFactory, TcpServerSocket, Transport},
    };

    use super::*;

    /// Memory-backed connection that can be told the peer hung up.
    #[derive(Debug, Default)]
    struct Scripted {
        inbound: MemoryBuffer,
        outbound: Vec<u8>,
        eof: bool,
        timed_out: bool,
        open: bool,
    }

    impl Scripted {
        fn with(bytes: &[u8]) -> Self {
            Self {
                inbound: MemoryBuffer::with_bytes(bytes),
                open: true,
                ..Default::default()
            }
        }

        fn hung_up() -> Self {
            Self {
                eof: true,
                open: true,
                ..Default::default()
            }
        }

        fn timed_out(bytes: &[u8]) -> Self {
            Self {
                timed_out: true,
                ..Self::with(bytes)
            }
        }
    }

    impl Transport for Scripted {
        fn is_open(&self) -> bool {
            self.open
        }

        fn open(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
            if self.inbound.available() == 0 && self.eof {
                return Err(TransportError::EndOfFile);
            }
            if self.inbound.available() == 0 && self.timed_out {
                return Err(TransportError::TimedOut);
            }
            self.inbound.read(len)
        }

        fn write(&mut self, buf: &[u8]) -> Result<(), TransportError> {
            self.outbound.extend_from_slice(buf);
            Ok(())
        }

        fn is_readable(&mut self) -> Result<bool, TransportError> {
            Ok(self.eof || self.timed_out || self.inbound.available() > 0)
        }
    }

    #[derive(Debug, Default)]
    struct Pending(VecDeque<Scripted>);

    impl Listener for Pending {
        type Connection = Scripted;

        fn listen(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn accept(&mut self) -> Result<Option<Scripted>, TransportError> {
            Ok(self.0.pop_front())
        }
    }

    struct Direct;

    impl TransportFactory<Scripted> for Direct {
        type Transport = Scripted;

        fn transport(&self, connection: Scripted) -> Result<Scripted, TransportError> {
            Ok(connection)
        }
    }

    /// Reads a string and echoes it back.
    #[derive(Debug, Default)]
    struct Echo {
        handled: usize,
    }

    impl<P: Protocol + ?Sized> Processor<P> for Echo {
        fn process(&mut self, protocol: &mut P) -> Result<(), CodecError> {
            let message = protocol.read_string()?;
            protocol.write_string(&message)?;
            self.handled += 1;
            Ok(())
        }
    }

    fn request(message: &str) -> Vec<u8> {
        let mut protocol = BinaryProtocol::new(MemoryBuffer::new());
        protocol.write_string(message).unwrap();
        protocol.into_inner().get_buffer().to_vec()
    }

    fn server(
        pending: Vec<Scripted>,
        config: ServerConfig,
    ) -> NonBlockingServer<Pending, Direct, BinaryProtocolFactory, Echo> {
        NonBlockingServer::new(
            Pending(pending.into()),
            Direct,
            BinaryProtocolFactory::default(),
            Echo::default(),
            config,
        )
    }

    #[test]
    fn pending_connection_is_registered() {
        let mut server = server(vec![Scripted::default()], ServerConfig::default());
        assert_eq!(server.client_count(), 0);

        let tick = server.process().unwrap();

        assert_eq!(tick.accepted, 1);
        assert_eq!(server.client_count(), 1);
        assert_eq!(server.client_ids(), vec![0]);
    }

    #[test]
    fn one_accept_per_tick() {
        let pending = vec![Scripted::default(), Scripted::default(), Scripted::default()];
        let mut server = server(pending, ServerConfig::default());

        server.process().unwrap();
        assert_eq!(server.client_count(), 1);
        server.process().unwrap();
        server.process().unwrap();
        assert_eq!(server.client_count(), 3);

        let tick = server.process().unwrap();
        assert!(tick.is_idle());
    }

    #[test]
    fn hung_up_client_is_removed() {
        let pending = vec![
            Scripted::with(&request("a")),
            Scripted::hung_up(),
            Scripted::with(&request("c")),
        ];
        let mut server = server(pending, ServerConfig::default());
        for _ in 0..3 {
            server.process().unwrap();
        }
        assert_eq!(server.client_count(), 2);
        assert_eq!(server.client_ids(), vec![0, 2]);
    }

    #[test]
    fn eof_removes_exactly_one_client() {
        let mut server = server(Vec::new(), ServerConfig::default());
        server.clients.register(BinaryProtocol::new(Scripted::with(&request("a"))));
        server.clients.register(BinaryProtocol::new(Scripted::hung_up()));
        server.clients.register(BinaryProtocol::new(Scripted::default()));

        let tick = server.process().unwrap();

        assert_eq!(tick.removed, 1);
        assert_eq!(server.client_count(), 2);
    }

    #[test]
    fn timed_out_client_is_removed() {
        let mut server = server(Vec::new(), ServerConfig::default());
        server.clients.register(BinaryProtocol::new(Scripted::with(&request("a"))));
        // Length prefix arrives, the body never does.
        server.clients.register(BinaryProtocol::new(Scripted::timed_out(&[0, 0, 0, 5])));
        server.clients.register(BinaryProtocol::new(Scripted::with(&request("c"))));

        let tick = server.process().unwrap();

        assert_eq!(tick.removed, 1);
        assert_eq!(tick.serviced, 2);
        assert_eq!(server.client_ids(), vec![0, 2]);
    }

    #[test]
    fn every_client_is_attempted_each_tick() {
        let mut server = server(Vec::new(), ServerConfig::default());
        for i in 0..5 {
            let message = format!("m{i}");
            server.clients.register(BinaryProtocol::new(Scripted::with(&request(&message))));
        }

        let tick = server.process().unwrap();

        assert_eq!(tick.serviced, 5);
        assert_eq!(server.processor().handled, 5);
        for slot in server.client_ids() {
            let protocol = server.clients.get_mut(slot).unwrap();
            assert_eq!(protocol.transport().outbound, request(&format!("m{slot}")));
        }
    }

    #[test]
    fn one_request_per_client_per_tick() {
        let mut bytes = request("first");
        bytes.extend(request("second"));
        let mut server = server(Vec::new(), ServerConfig::default());
        server.clients.register(BinaryProtocol::new(Scripted::with(&bytes)));

        server.process().unwrap();
        assert_eq!(server.processor().handled, 1);
        server.process().unwrap();
        assert_eq!(server.processor().handled, 2);
    }

    #[test]
    fn malformed_request_keeps_client() {
        let mut server = server(Vec::new(), ServerConfig::default());
        server.clients.register(BinaryProtocol::new(Scripted::with(&[0xff, 0xff, 0xff, 0xff])));
        server.clients.register(BinaryProtocol::new(Scripted::with(&request("ok"))));

        let tick = server.process().unwrap();

        assert_eq!(tick.removed, 0);
        assert_eq!(tick.serviced, 1);
        assert_eq!(server.client_count(), 2);
    }

    #[test]
    fn client_limit_leaves_connections_pending() {
        let config = ServerConfig {
            max_clients: Some(1),
            ..Default::default()
        };
        let mut server = server(vec![Scripted::default(), Scripted::default()], config);

        server.process().unwrap();
        server.process().unwrap();

        assert_eq!(server.client_count(), 1);
        assert_eq!(server.listener().0.len(), 1);
    }

    #[test]
    fn serves_over_tcp() {
        let address: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut server = NonBlockingServer::new(
            TcpServerSocket::new(address),
            SocketTransportFactory,
            BinaryProtocolFactory::default(),
            Echo::default(),
            ServerConfig::default(),
        );
        server.listen().unwrap();
        let address = server.listener().local_addr().unwrap();

        let mut client = TcpStream::connect(address).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        // Send the request in two pieces across ticks.
        let bytes = request("hello");
        client.write_all(&bytes[..3]).unwrap();
        for _ in 0..20 {
            server.process().unwrap();
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(server.processor().handled, 0);

        client.write_all(&bytes[3..]).unwrap();
        for _ in 0..200 {
            server.process().unwrap();
            if server.processor().handled == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(server.processor().handled, 1);

        let mut reply = vec![0; bytes.len()];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(reply, bytes);

        drop(client);
        for _ in 0..200 {
            server.process().unwrap();
            if server.client_count() == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(server.client_count(), 0);
    }

    #[test]
    fn serve_returns_on_shutdown() {
        let shutdown = AtomicBool::new(true);
        let mut server = server(Vec::new(), ServerConfig::default());
        server.clients.register(BinaryProtocol::new(Scripted::default()));

        server.serve(&shutdown).unwrap();

        assert_eq!(server.client_count(), 0);
    }
}
