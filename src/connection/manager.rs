//! Connection Manager Implementation

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument};

use super::transport::Connection;
use crate::config::{Config, RelayMode};
use crate::process::{LaunchError, StdioHub};
use crate::relay::{
    dispatch, Destination, PeerHandle, PeerSession, Registry, SessionStats, SharedSink,
};
use crate::Result;

/// Accepts or dials peers and runs the relay for each of them
pub struct ConnectionManager {
    config: Arc<Config>,
    hub: Arc<StdioHub>,
    exec: Arc<str>,
    listener: Option<TcpListener>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ConnectionManager {
    /// Create a manager relaying to this process's own stdio
    ///
    /// `shutdown_rx` usually comes from [`crate::ShutdownCoordinator::subscribe`].
    pub fn new(config: Arc<Config>, shutdown_rx: broadcast::Receiver<()>) -> Self {
        let hub = Arc::new(StdioHub::new(Registry::new()));
        Self::with_hub(config, hub, shutdown_rx)
    }

    /// Create a manager around an existing hub
    pub fn with_hub(
        config: Arc<Config>,
        hub: Arc<StdioHub>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let exec: Arc<str> = config.effective_exec().into();

        Self {
            config,
            hub,
            exec,
            listener: None,
            shutdown_rx,
        }
    }

    /// Bind the listener without accepting yet
    pub async fn bind(&mut self, addr: &str) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to listen on {}", addr))?;
        let local_addr = listener.local_addr()?;
        self.listener = Some(listener);
        Ok(local_addr)
    }

    /// Run in the configured mode until the relay is done or shutdown is signalled
    pub async fn start(&mut self) -> Result<()> {
        let protocol = self.config.relay.protocol;
        match self.config.mode()? {
            RelayMode::Listen(addr) => {
                info!("Running server on {}://{}", protocol, addr);
                self.bind(&addr).await?;
                self.accept_connections().await
            }
            RelayMode::Connect(addr) => {
                info!("Connecting to {}://{}", protocol, addr);
                let conn = Connection::dial(protocol, &addr, self.config.relay.dial_timeout).await?;
                self.run_client(conn).await
            }
        }
    }

    /// Main connection acceptance loop
    pub async fn accept_connections(&mut self) -> Result<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Listener not initialized"))?;

        info!("Waiting for connection...");

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, addr) = accept_result.context("Failed to accept connection")?;
                    debug!("Accepted connection from {}", addr);

                    let conn = Connection::from_tcp(stream, addr);
                    let hub = Arc::clone(&self.hub);
                    let exec = Arc::clone(&self.exec);

                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(&hub, &exec, conn).await {
                            error!("Failed to launch `{}`: {}", exec, e);
                            std::process::exit(1);
                        }
                    });
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Received shutdown signal, stopping connection acceptance");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Relay a single dialed connection until it closes
    async fn run_client(&mut self, conn: Connection) -> Result<()> {
        tokio::select! {
            result = Self::handle_connection(&self.hub, &self.exec, conn) => {
                result.with_context(|| format!("Failed to launch `{}`", self.exec))?;
            }
            _ = self.shutdown_rx.recv() => {
                info!("Received shutdown signal, closing connection");
            }
        }

        Ok(())
    }

    /// Relay one peer: register it, wire up the input side, then pump the
    /// peer's bytes into the sink until it disconnects.
    ///
    /// A [`LaunchError`] means the subprocess could not be started; callers
    /// treat it as fatal.
    #[instrument(skip_all, fields(connection_id = %conn.id, peer = %conn.peer_addr))]
    pub async fn handle_connection(
        hub: &StdioHub,
        exec: &str,
        conn: Connection,
    ) -> std::result::Result<SessionStats, LaunchError> {
        let Connection {
            id,
            peer_addr,
            reader,
            writer,
        } = conn;

        let session = Arc::new(PeerSession::new(id, peer_addr));
        let peer = PeerHandle::new(
            Arc::clone(&session),
            SharedSink::from_boxed(id.to_string(), writer),
        );

        hub.registry().add(peer.clone()).await;
        info!("{} Connected!", peer_addr);

        let sink = match hub.handle_stdin(exec, &peer) {
            Ok(sink) => sink,
            Err(e) => {
                hub.registry().remove(id).await;
                return Err(e);
            }
        };

        let summary = dispatch(reader, Destination::Direct(sink)).await;
        session.add_bytes_in(summary.bytes);

        hub.registry().remove(id).await;
        if let Err(e) = peer.sink.shutdown().await {
            debug!("Failed to shut down connection to {}: {}", peer_addr, e);
        }

        info!("{} Disconnected!", peer_addr);
        session.log_stats();
        Ok(session.to_stats())
    }
}
