//! JSON-RPC 2.0 interface of the daemon.
//!
//! - `protocol`: JSON-RPC 2.0 request/response types and error codes
//! - `transport`: TCP listener with newline-delimited JSON framing
//! - `methods`: method dispatcher and handlers
//! - `client`: client used by the CLI subcommands

pub mod client;
pub mod methods;
pub mod protocol;
mod transport;

use std::net::SocketAddr;
use tokio::sync::broadcast;

use crate::core::Orchestrator;
use transport::Transport;

pub use client::{RpcClient, RpcClientError};
pub use methods::MethodHandler;
pub use protocol::{Request, Response, RpcError};
pub use transport::MAX_LINE_BYTES;

pub struct RpcServer {
    transport: Transport,
    shutdown_tx: broadcast::Sender<()>,
}

impl RpcServer {
    /// Bind the listener. Port 0 picks a free port, see `local_addr`.
    pub async fn bind(orchestrator: Orchestrator, bind_addr: SocketAddr) -> anyhow::Result<Self> {
        let handler = MethodHandler::new(orchestrator);
        let transport = Transport::bind(bind_addr, handler).await?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            transport,
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Serve until `shutdown` is called.
    pub async fn start(&self) -> anyhow::Result<()> {
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.transport.listen(shutdown_rx).await
    }

    /// Stop accepting connections and close open ones after their current
    /// request.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
